//! GATT record types: services, characteristics, and descriptors, as discovered, not as
//! declared. These are plain data, assembled by `crate::gatt::discovery` and held by
//! `crate::cache::Cache`; nothing here talks to a `Connection`.

use crate::uuid::Uuid;

/// The GATT Primary Service declaration UUID, `0x2800`.
pub const PRIMARY_SERVICE: Uuid = Uuid::from_u16(0x2800);
/// The GATT Secondary Service declaration UUID, `0x2801`.
pub const SECONDARY_SERVICE: Uuid = Uuid::from_u16(0x2801);
/// The GATT Characteristic declaration UUID, `0x2803`.
pub const CHARACTERISTIC_DECLARATION: Uuid = Uuid::from_u16(0x2803);
/// The Client Characteristic Configuration descriptor UUID, `0x2902`.
pub const CLIENT_CHARACTERISTIC_CONFIGURATION: Uuid = Uuid::from_u16(0x2902);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceKind {
    Primary,
    Secondary,
}

/// `{uuid, kind, start_handle, end_handle}`. Invariant: `start_handle <= end_handle`; the ranges
/// of two distinct services discovered on the same bearer never overlap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Service {
    pub uuid: Uuid,
    pub kind: ServiceKind,
    pub start_handle: u16,
    pub end_handle: u16,
}

/// The properties octet of a characteristic declaration (Vol. 3, Part G, Section 3.3.1.1).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CharacteristicProperties(pub u8);

impl CharacteristicProperties {
    pub fn broadcast(&self) -> bool {
        self.0 & 0x01 != 0
    }
    pub fn read(&self) -> bool {
        self.0 & 0x02 != 0
    }
    pub fn write_without_response(&self) -> bool {
        self.0 & 0x04 != 0
    }
    pub fn write(&self) -> bool {
        self.0 & 0x08 != 0
    }
    pub fn notify(&self) -> bool {
        self.0 & 0x10 != 0
    }
    pub fn indicate(&self) -> bool {
        self.0 & 0x20 != 0
    }
    pub fn authenticated_signed_writes(&self) -> bool {
        self.0 & 0x40 != 0
    }
    pub fn extended_properties(&self) -> bool {
        self.0 & 0x80 != 0
    }
}

/// `{uuid, properties_bitmask, declaration_handle, value_handle}`. Invariant:
/// `declaration_handle < value_handle <= enclosing_service.end_handle`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Characteristic {
    pub uuid: Uuid,
    pub properties: CharacteristicProperties,
    pub declaration_handle: u16,
    pub value_handle: u16,
}

/// `{uuid, handle}`. Invariant: `characteristic.value_handle < handle <= enclosing end handle`,
/// per `Cache::end_handle_of`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Descriptor {
    pub uuid: Uuid,
    pub handle: u16,
}

/// Names a characteristic within the cache: its enclosing service and its own UUID. The cache
/// is a tree with no parent pointers, so every lookup that needs "the enclosing service of this
/// characteristic" goes through a ref like this rather than a stored back-reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CharacteristicRef {
    pub service_uuid: Uuid,
    pub characteristic_uuid: Uuid,
}
