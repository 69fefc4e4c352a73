//! ATT error codes and the crate-level error taxonomy
//!
//! `ErrorCode` is the single byte carried in an *Error Response* PDU, straight off the wire.
//! `AttError` is everything a connection or a procedure can fail with, whether that failure
//! came from the peer (a wire `ErrorCode`) or was detected locally (a malformed PDU, a
//! protocol-violating response shape, a closed transport).

use core::fmt;

use crate::att::opcode::Method;

/// The ATT Protocol error codes, as defined in the Bluetooth Core Specification, Vol. 3, Part F,
/// Section 3.4.1.1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidHandle,
    ReadNotPermitted,
    WriteNotPermitted,
    InvalidPdu,
    InsufficientAuthentication,
    RequestNotSupported,
    InvalidOffset,
    InsufficientAuthorization,
    PrepareQueueFull,
    AttributeNotFound,
    AttributeNotLong,
    InsufficientEncryptionKeySize,
    InvalidAttributeValueLength,
    UnlikelyError,
    InsufficientEncryption,
    UnsupportedGroupType,
    InsufficientResources,
    /// Reserved, application-defined (0x80-0x9F), or common-profile (0xE0-0xFF) error codes that
    /// this crate does not assign a name to.
    Other(u8),
}

impl ErrorCode {
    pub fn from_raw(val: u8) -> ErrorCode {
        match val {
            0x01 => ErrorCode::InvalidHandle,
            0x02 => ErrorCode::ReadNotPermitted,
            0x03 => ErrorCode::WriteNotPermitted,
            0x04 => ErrorCode::InvalidPdu,
            0x05 => ErrorCode::InsufficientAuthentication,
            0x06 => ErrorCode::RequestNotSupported,
            0x07 => ErrorCode::InvalidOffset,
            0x08 => ErrorCode::InsufficientAuthorization,
            0x09 => ErrorCode::PrepareQueueFull,
            0x0A => ErrorCode::AttributeNotFound,
            0x0B => ErrorCode::AttributeNotLong,
            0x0C => ErrorCode::InsufficientEncryptionKeySize,
            0x0D => ErrorCode::InvalidAttributeValueLength,
            0x0E => ErrorCode::UnlikelyError,
            0x0F => ErrorCode::InsufficientEncryption,
            0x10 => ErrorCode::UnsupportedGroupType,
            0x11 => ErrorCode::InsufficientResources,
            other => ErrorCode::Other(other),
        }
    }

    pub fn raw(&self) -> u8 {
        match self {
            ErrorCode::InvalidHandle => 0x01,
            ErrorCode::ReadNotPermitted => 0x02,
            ErrorCode::WriteNotPermitted => 0x03,
            ErrorCode::InvalidPdu => 0x04,
            ErrorCode::InsufficientAuthentication => 0x05,
            ErrorCode::RequestNotSupported => 0x06,
            ErrorCode::InvalidOffset => 0x07,
            ErrorCode::InsufficientAuthorization => 0x08,
            ErrorCode::PrepareQueueFull => 0x09,
            ErrorCode::AttributeNotFound => 0x0A,
            ErrorCode::AttributeNotLong => 0x0B,
            ErrorCode::InsufficientEncryptionKeySize => 0x0C,
            ErrorCode::InvalidAttributeValueLength => 0x0D,
            ErrorCode::UnlikelyError => 0x0E,
            ErrorCode::InsufficientEncryption => 0x0F,
            ErrorCode::UnsupportedGroupType => 0x10,
            ErrorCode::InsufficientResources => 0x11,
            ErrorCode::Other(val) => *val,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorCode::InvalidHandle => write!(f, "invalid handle"),
            ErrorCode::ReadNotPermitted => write!(f, "read not permitted"),
            ErrorCode::WriteNotPermitted => write!(f, "write not permitted"),
            ErrorCode::InvalidPdu => write!(f, "invalid PDU"),
            ErrorCode::InsufficientAuthentication => write!(f, "insufficient authentication"),
            ErrorCode::RequestNotSupported => write!(f, "request not supported"),
            ErrorCode::InvalidOffset => write!(f, "invalid offset"),
            ErrorCode::InsufficientAuthorization => write!(f, "insufficient authorization"),
            ErrorCode::PrepareQueueFull => write!(f, "prepare queue full"),
            ErrorCode::AttributeNotFound => write!(f, "attribute not found"),
            ErrorCode::AttributeNotLong => write!(f, "attribute not long"),
            ErrorCode::InsufficientEncryptionKeySize => write!(f, "insufficient encryption key size"),
            ErrorCode::InvalidAttributeValueLength => write!(f, "invalid attribute value length"),
            ErrorCode::UnlikelyError => write!(f, "unlikely error"),
            ErrorCode::InsufficientEncryption => write!(f, "insufficient encryption"),
            ErrorCode::UnsupportedGroupType => write!(f, "unsupported group type"),
            ErrorCode::InsufficientResources => write!(f, "insufficient resources"),
            ErrorCode::Other(val) => write!(f, "error code {:#04x}", val),
        }
    }
}

/// Everything a `Connection` or a GATT procedure can fail with.
#[derive(Debug)]
pub enum AttError {
    /// The peer sent an Error Response for our request.
    ErrorResponse {
        request_opcode: u8,
        handle: u16,
        code: ErrorCode,
    },
    /// A PDU could not be decoded at all (bad length, bad format byte, unknown opcode).
    Malformed,
    /// A PDU decoded fine but its shape violates the protocol in context (a pagination cycle, a
    /// reliable-write echo mismatch, an unexpected response opcode).
    InvalidResponse,
    /// A long write is already in progress on this bearer.
    InLongWrite,
    /// Notification/indication registration was attempted on a characteristic with no Client
    /// Characteristic Configuration descriptor.
    ClientConfigurationMissing,
    /// The transport reached EOF or errored; the bearer is no longer usable.
    TransportClosed,
    /// A requested MTU was below the ATT minimum of 23.
    MtuTooSmall,
}

impl AttError {
    /// The method the peer's `ErrorResponse` names as having failed, if this is a wire error and
    /// that opcode is one this crate recognizes.
    pub fn failed_request(&self) -> Option<Method> {
        use core::convert::TryFrom;
        match self {
            AttError::ErrorResponse { request_opcode, .. } => Method::try_from(*request_opcode).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for AttError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AttError::ErrorResponse { request_opcode, handle, code } => write!(
                f,
                "error response to opcode {:#04x} for handle {:#06x}: {}",
                request_opcode, handle, code
            ),
            AttError::Malformed => write!(f, "malformed PDU"),
            AttError::InvalidResponse => write!(f, "response shape is valid but violates the protocol"),
            AttError::InLongWrite => write!(f, "a long write is already in progress on this bearer"),
            AttError::ClientConfigurationMissing => {
                write!(f, "characteristic has no client characteristic configuration descriptor")
            }
            AttError::TransportClosed => write!(f, "transport closed"),
            AttError::MtuTooSmall => write!(f, "requested MTU is below the ATT minimum of 23"),
        }
    }
}

impl std::error::Error for AttError {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn error_code_round_trips_named_values() {
        for raw in 0x01u8..=0x11 {
            let code = ErrorCode::from_raw(raw);
            assert_eq!(code.raw(), raw);
        }
    }

    #[test]
    fn unnamed_error_code_is_preserved() {
        let code = ErrorCode::from_raw(0x80);
        assert_eq!(code, ErrorCode::Other(0x80));
        assert_eq!(code.raw(), 0x80);
    }
}
