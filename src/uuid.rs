//! The Bluetooth UUID
//!
//! Bluetooth uses three widths of UUID on the air: 16-bit and 32-bit assigned numbers, and full
//! 128-bit UUIDs. A 16- or 32-bit UUID is shorthand for a 128-bit UUID formed by substituting the
//! short value into the Bluetooth Base UUID, `0000xxxx-0000-1000-8000-00805F9B34FB`. This module
//! keeps the three widths distinct (so a short UUID round-trips back to its short wire encoding)
//! while still comparing equal to the 128-bit UUID it expands to.

use core::convert::TryFrom;
use core::fmt;

/// The Bluetooth Base UUID, used to widen a 16- or 32-bit UUID to 128 bits.
const BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_00805F9B34FB;

const BASE_UUID_MASK: u128 = !(0xFFFF_FFFFu128 << 96);

/// A Bluetooth UUID, in whichever of the three Bluetooth-defined widths it was read or created
/// with.
///
/// Two `Uuid`s of different widths compare equal if one widens to the other via the Bluetooth
/// Base UUID; hashing and ordering are likewise defined on the widened 128-bit value, not on the
/// stored width.
#[derive(Clone, Copy, Debug)]
pub enum Uuid {
    Uuid16(u16),
    Uuid32(u32),
    Uuid128(u128),
}

impl Uuid {
    pub const fn from_u16(val: u16) -> Self {
        Uuid::Uuid16(val)
    }

    pub const fn from_u32(val: u32) -> Self {
        Uuid::Uuid32(val)
    }

    pub const fn from_u128(val: u128) -> Self {
        Uuid::Uuid128(val)
    }

    /// Widen this UUID to its full 128-bit form.
    pub fn as_u128(&self) -> u128 {
        match *self {
            Uuid::Uuid16(v) => BASE_UUID | ((v as u128) << 96),
            Uuid::Uuid32(v) => BASE_UUID | ((v as u128) << 96),
            Uuid::Uuid128(v) => v,
        }
    }

    /// Narrow a 128-bit UUID back down to the shortest width that round-trips, if its low bits
    /// follow the Bluetooth Base UUID pattern.
    fn shortened(val: u128) -> Uuid {
        if val & BASE_UUID_MASK == BASE_UUID & BASE_UUID_MASK {
            let short = (val >> 96) as u32;
            if short <= u16::max_value() as u32 {
                Uuid::Uuid16(short as u16)
            } else {
                Uuid::Uuid32(short)
            }
        } else {
            Uuid::Uuid128(val)
        }
    }

    /// Decode the attribute-type field of a PDU that accepts either a 2-byte or 16-byte UUID
    /// (every PDU except where the spec explicitly forbids the 32-bit form; 32-bit UUIDs never
    /// appear on the ATT wire directly, only in application-level comparisons).
    pub fn from_le_bytes(raw: &[u8]) -> Option<Uuid> {
        match raw.len() {
            2 => Some(Uuid::Uuid16(u16::from_le_bytes([raw[0], raw[1]]))),
            16 => {
                let mut bytes = [0u8; 16];
                bytes.copy_from_slice(raw);
                Some(Uuid::Uuid128(u128::from_le_bytes(bytes)))
            }
            _ => None,
        }
    }

    /// The number of bytes this UUID occupies when encoded at its current width (2 or 16; 32-bit
    /// UUIDs are never written to the wire in their own width).
    pub fn wire_width(&self) -> usize {
        match self {
            Uuid::Uuid16(_) => 2,
            Uuid::Uuid32(_) => 16,
            Uuid::Uuid128(_) => 16,
        }
    }

    /// Encode this UUID to little-endian bytes at its current width, widening a 32-bit UUID to
    /// 128 bits first since the ATT wire has no 32-bit UUID encoding.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match *self {
            Uuid::Uuid16(v) => v.to_le_bytes().to_vec(),
            Uuid::Uuid32(_) | Uuid::Uuid128(_) => self.as_u128().to_le_bytes().to_vec(),
        }
    }
}

impl From<u16> for Uuid {
    fn from(val: u16) -> Self {
        Uuid::Uuid16(val)
    }
}

impl From<u32> for Uuid {
    fn from(val: u32) -> Self {
        Uuid::Uuid32(val)
    }
}

impl From<u128> for Uuid {
    fn from(val: u128) -> Self {
        Uuid::shortened(val)
    }
}

impl TryFrom<Uuid> for u16 {
    type Error = ();

    fn try_from(uuid: Uuid) -> Result<u16, ()> {
        match uuid {
            Uuid::Uuid16(v) => Ok(v),
            Uuid::Uuid32(_) | Uuid::Uuid128(_) => match Uuid::shortened(uuid.as_u128()) {
                Uuid::Uuid16(v) => Ok(v),
                _ => Err(()),
            },
        }
    }
}

impl PartialEq for Uuid {
    fn eq(&self, other: &Uuid) -> bool {
        self.as_u128() == other.as_u128()
    }
}

impl Eq for Uuid {}

impl PartialOrd for Uuid {
    fn partial_cmp(&self, other: &Uuid) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Uuid {
    fn cmp(&self, other: &Uuid) -> core::cmp::Ordering {
        self.as_u128().cmp(&other.as_u128())
    }
}

impl core::hash::Hash for Uuid {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.as_u128().hash(state)
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Uuid::Uuid16(v) => write!(f, "{:#06x}", v),
            Uuid::Uuid32(v) => write!(f, "{:#010x}", v),
            Uuid::Uuid128(v) => {
                let b = v.to_be_bytes();
                write!(
                    f,
                    "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
                    b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
                    b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15]
                )
            }
        }
    }
}
