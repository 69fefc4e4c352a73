//! The Attribute Protocol
//!
//! The Attribute Protocol is the request/response/notification layer carrying attribute reads
//! and writes between a client and a server. This crate implements the client side only: the
//! codec (this module and its children), the connection engine (`crate::connection`), and the
//! GATT client built on top of it (`crate::gatt`).
//!
//! This is an implementation of the Attribute Protocol as defined in the Bluetooth Specification
//! (version 5.0), Vol. 3, Part F.

pub mod error;
pub mod opcode;
pub mod pdu;

pub use error::{AttError, ErrorCode};
pub use opcode::Method;
pub use pdu::{ExecuteWriteFlag, Pdu};

/// The default and minimum ATT MTU on an LE bearer, per Vol. 3, Part F, Section 3.2.8.
pub const MIN_ATT_MTU: u16 = 23;

/// The largest MTU either side may request during an MTU exchange.
pub const MAX_ATT_MTU: u16 = 517;
