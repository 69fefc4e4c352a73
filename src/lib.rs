//! A Bluetooth Low Energy host-side ATT connection engine and GATT client.
//!
//! `att` is the wire layer: PDU encoding/decoding (`att::Pdu`) and the error taxonomy
//! (`att::AttError`). `connection` is the bearer: one `Connection<T>` owns a `Transport`, the
//! current MTU, the single pending-response slot, and the outbound FIFO queue described in
//! Vol. 3, Part F. `gatt` is the client built on top: discovery, read/write procedures, and
//! notification/indication subscription, all driven through `gatt::GattClient<T>`. `cache` holds
//! what discovery has found; `model` is the plain data it's built from; `uuid` is the Bluetooth
//! UUID type threaded through all of it.
//!
//! This crate implements the client side of ATT/GATT only. It does not include HCI controller
//! management, GAP advertising, pairing/bonding, or any individual GATT profile's characteristic
//! definitions; those are collaborators outside this crate's scope.

pub mod att;
pub mod cache;
pub mod connection;
pub mod gatt;
pub mod model;
pub mod transport;
pub mod uuid;

pub use att::{AttError, ErrorCode, Pdu};
pub use cache::Cache;
pub use connection::Connection;
pub use gatt::GattClient;
pub use transport::{PairedTransport, Transport, TransportError};
pub use uuid::Uuid;
