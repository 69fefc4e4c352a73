//! The GATT client: service/characteristic/descriptor discovery, attribute I/O, and notification
//! subscription, layered over one `Connection`.
//!
//! `GattClient` itself holds nothing an ATT procedure couldn't reach through `Connection` plus a
//! handful of `Rc<RefCell<_>>` companions (the cache, the in-long-write flag, the notification
//! callback table); see `crate::connection` for why those live outside `Connection` rather than
//! as fields a completion could reach through `&mut Connection` alone.

pub mod discovery;
pub mod io;
pub mod notify;

use std::cell::{Cell, Ref, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::att::AttError;
use crate::cache::Cache;
use crate::connection::Connection;
use crate::model::{Characteristic, CharacteristicRef, Descriptor, Service};
use crate::transport::Transport;
use crate::uuid::Uuid;

pub use notify::SubscriptionKind;

/// A GATT client bound to one ATT bearer. Constructed with an empty cache; call the discovery
/// methods to populate it before reading, writing, or subscribing to anything.
pub struct GattClient<T: Transport> {
    connection: Connection<T>,
    cache: Rc<RefCell<Cache>>,
    in_long_write: Rc<Cell<bool>>,
    notify_table: notify::NotifyTable,
}

impl<T: Transport + 'static> GattClient<T> {
    pub fn new(connection: Connection<T>) -> Self {
        let mut connection = connection;
        let notify_table: notify::NotifyTable = Rc::new(RefCell::new(BTreeMap::new()));

        let handler_table = notify_table.clone();
        connection.set_notification_handler(Box::new(move |handle, value| {
            if let Some(callback) = handler_table.borrow_mut().get_mut(&handle) {
                callback(value);
            }
        }));

        let handler_table = notify_table.clone();
        connection.set_indication_handler(Box::new(move |handle, value| {
            if let Some(callback) = handler_table.borrow_mut().get_mut(&handle) {
                callback(value);
            }
        }));

        GattClient { connection, cache: Rc::new(RefCell::new(Cache::new())), in_long_write: Rc::new(Cell::new(false)), notify_table }
    }

    /// The underlying bearer, for MTU exchange, `run_read`, or anything else not wrapped here.
    pub fn connection(&mut self) -> &mut Connection<T> {
        &mut self.connection
    }

    pub fn mtu(&self) -> u16 {
        self.connection.mtu()
    }

    /// Pull and dispatch exactly one message from the bearer. See `Connection::run_read`.
    pub fn run_read(&mut self) -> Result<(), AttError> {
        self.connection.run_read()
    }

    pub fn cache(&self) -> Ref<Cache> {
        self.cache.borrow()
    }

    pub fn exchange_mtu(&mut self, client_rx_mtu: u16, completion: impl FnOnce(Result<u16, AttError>) + 'static) {
        self.connection.exchange_mtu(client_rx_mtu, move |result, _conn| completion(result));
    }

    /// Discover every primary service. Replaces the cache's entire service set on success.
    pub fn discover_primary_services(&mut self, completion: impl FnOnce(Result<Vec<Service>, AttError>) + 'static) {
        discovery::discover_primary_services(&mut self.connection, self.cache.clone(), Box::new(completion));
    }

    /// Discover primary services with a matching UUID. Upserts matches without evicting
    /// unrelated cached services.
    pub fn discover_primary_services_by_uuid(
        &mut self,
        uuid: Uuid,
        completion: impl FnOnce(Result<Vec<Service>, AttError>) + 'static,
    ) {
        discovery::discover_primary_services_by_uuid(&mut self.connection, self.cache.clone(), uuid, Box::new(completion));
    }

    /// Discover every characteristic of a previously-discovered service. Replaces that service's
    /// characteristic set on success.
    pub fn discover_characteristics(
        &mut self,
        service_uuid: Uuid,
        completion: impl FnOnce(Result<Vec<Characteristic>, AttError>) + 'static,
    ) {
        let range = self.cache.borrow().service(service_uuid).map(|s| (s.start_handle, s.end_handle));
        let (start, end) = match range {
            Some(r) => r,
            None => return completion(Err(AttError::InvalidResponse)),
        };
        discovery::discover_characteristics(&mut self.connection, self.cache.clone(), service_uuid, start, end, None, Box::new(completion));
    }

    /// Discover characteristics of a service, stopping at the first match for `target`.
    pub fn discover_characteristic_by_uuid(
        &mut self,
        service_uuid: Uuid,
        target: Uuid,
        completion: impl FnOnce(Result<Vec<Characteristic>, AttError>) + 'static,
    ) {
        let range = self.cache.borrow().service(service_uuid).map(|s| (s.start_handle, s.end_handle));
        let (start, end) = match range {
            Some(r) => r,
            None => return completion(Err(AttError::InvalidResponse)),
        };
        discovery::discover_characteristics(&mut self.connection, self.cache.clone(), service_uuid, start, end, Some(target), Box::new(completion));
    }

    /// Discover every descriptor of a previously-discovered characteristic.
    pub fn discover_descriptors(
        &mut self,
        characteristic_ref: CharacteristicRef,
        completion: impl FnOnce(Result<Vec<Descriptor>, AttError>) + 'static,
    ) {
        discovery::discover_descriptors(&mut self.connection, self.cache.clone(), characteristic_ref, Box::new(completion));
    }

    /// Read a value, automatically following up with Read Blob requests if the first response
    /// fills the whole MTU.
    pub fn read(&mut self, handle: u16, completion: impl FnOnce(Result<Vec<u8>, AttError>) + 'static) {
        io::read(&mut self.connection, handle, Box::new(completion));
    }

    /// Read a value via an explicit Read Blob sequence from offset 0.
    pub fn read_long(&mut self, handle: u16, completion: impl FnOnce(Result<Vec<u8>, AttError>) + 'static) {
        io::read_long(&mut self.connection, handle, Box::new(completion));
    }

    /// Read every attribute of type `uuid` in `[start..end]` as a handle-to-value map.
    pub fn read_by_uuid(
        &mut self,
        uuid: Uuid,
        start: u16,
        end: u16,
        completion: impl FnOnce(Result<BTreeMap<u16, Vec<u8>>, AttError>) + 'static,
    ) {
        io::read_by_uuid(&mut self.connection, uuid, start, end, Box::new(completion));
    }

    /// Read several attributes in one round trip. Requires at least two handles.
    pub fn read_multiple(&mut self, handles: Vec<u16>, completion: impl FnOnce(Result<Vec<u8>, AttError>) + 'static) {
        io::read_multiple(&mut self.connection, handles, Box::new(completion));
    }

    /// Write without a response, silently truncated to fit one PDU.
    pub fn write_command(&mut self, handle: u16, value: &[u8]) -> Result<(), AttError> {
        io::write_command(&mut self.connection, handle, value)
    }

    /// Write with a response, truncated to fit one PDU. Use `write_long` if truncation would be
    /// wrong for this value.
    pub fn write(&mut self, handle: u16, value: &[u8], completion: impl FnOnce(Result<(), AttError>) + 'static) {
        io::write(&mut self.connection, handle, value, Box::new(completion));
    }

    /// Write an arbitrarily long value via Prepare Write / Execute Write. Only one such write may
    /// be outstanding on this client at a time.
    pub fn write_long(
        &mut self,
        handle: u16,
        value: Vec<u8>,
        reliable: bool,
        completion: impl FnOnce(Result<(), AttError>) + 'static,
    ) {
        io::write_long(&mut self.connection, self.in_long_write.clone(), handle, value, reliable, Box::new(completion));
    }

    /// Subscribe to notifications or indications on a characteristic by writing its CCCD.
    pub fn subscribe(
        &mut self,
        characteristic_ref: CharacteristicRef,
        kind: SubscriptionKind,
        callback: impl FnMut(Vec<u8>) + 'static,
        completion: impl FnOnce(Result<(), AttError>) + 'static,
    ) {
        notify::set_subscription(
            &mut self.connection,
            self.cache.clone(),
            self.notify_table.clone(),
            characteristic_ref,
            Some((kind, Box::new(callback))),
            Box::new(completion),
        );
    }

    /// Disable notifications/indications on a characteristic and remove its registered callback.
    pub fn unsubscribe(&mut self, characteristic_ref: CharacteristicRef, completion: impl FnOnce(Result<(), AttError>) + 'static) {
        notify::set_subscription(&mut self.connection, self.cache.clone(), self.notify_table.clone(), characteristic_ref, None, Box::new(completion));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::att::Pdu;
    use crate::transport::PairedTransport;
    use std::cell::RefCell as StdRefCell;

    #[test]
    fn notifications_dispatch_to_the_registered_callback_by_value_handle() {
        let (client_transport, mut server_transport) = PairedTransport::pair();
        let connection = Connection::new(client_transport);
        let mut client = GattClient::new(connection);

        let received = Rc::new(StdRefCell::new(Vec::new()));

        // Seed a subscription directly in the notify table (bypassing the CCCD write) to isolate
        // dispatch behavior from `notify::set_subscription`, which has its own test coverage.
        {
            let received = received.clone();
            client.notify_table.borrow_mut().insert(7, Box::new(move |value| received.borrow_mut().push(value)));
        }

        server_transport.write_message(&Pdu::HandleValueNotification { handle: 7, value: vec![0x09] }.encode()).unwrap();
        client.run_read().unwrap();

        assert_eq!(*received.borrow(), vec![vec![0x09]]);
    }
}
