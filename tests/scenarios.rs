//! End-to-end wire scenarios, each driving a `GattClient` against a `PairedTransport` stand-in
//! for the remote server and checking the exact bytes that cross the bearer.

use std::cell::RefCell;
use std::rc::Rc;

use blueatt::att::{ExecuteWriteFlag, Pdu};
use blueatt::cache::Cache;
use blueatt::connection::Connection;
use blueatt::gatt::GattClient;
use blueatt::gatt::discovery;
use blueatt::gatt::io;
use blueatt::model::CharacteristicRef;
use blueatt::transport::PairedTransport;
use blueatt::uuid::Uuid;

#[test]
fn mtu_exchange_clamps_to_the_minimum() {
    let (client_transport, mut server_transport) = PairedTransport::pair();
    let mut connection = Connection::new(client_transport);

    let negotiated = Rc::new(RefCell::new(None));
    {
        let negotiated = negotiated.clone();
        connection.exchange_mtu(23, move |result, _| *negotiated.borrow_mut() = Some(result.unwrap()));
    }

    let on_wire = server_transport.read_message().unwrap().unwrap();
    assert_eq!(on_wire, vec![0x02, 0x17, 0x00]);

    server_transport.write_message(&[0x03, 0xB8, 0x00]).unwrap();
    connection.run_read().unwrap();

    assert_eq!(*negotiated.borrow(), Some(23));
    assert_eq!(connection.mtu(), 23);
}

#[test]
fn discover_all_primary_services_single_page_then_attribute_not_found() {
    let (client_transport, mut server_transport) = PairedTransport::pair();
    let mut connection = Connection::new(client_transport);
    let cache = Rc::new(RefCell::new(Cache::new()));
    let result = Rc::new(RefCell::new(None));

    {
        let result = result.clone();
        discovery::discover_primary_services(&mut connection, cache.clone(), Box::new(move |r| *result.borrow_mut() = Some(r)));
    }

    let on_wire = server_transport.read_message().unwrap().unwrap();
    assert_eq!(on_wire, vec![0x10, 0x01, 0x00, 0xFF, 0xFF, 0x00, 0x28]);
    server_transport
        .write_message(&[0x11, 0x06, 0x01, 0x00, 0x05, 0x00, 0x00, 0x18, 0x06, 0x00, 0x0A, 0x00, 0x01, 0x18])
        .unwrap();
    connection.run_read().unwrap();

    let on_wire = server_transport.read_message().unwrap().unwrap();
    assert_eq!(on_wire, vec![0x10, 0x0B, 0x00, 0xFF, 0xFF, 0x00, 0x28]);
    server_transport.write_message(&[0x01, 0x10, 0x0B, 0x00, 0x0A]).unwrap();
    connection.run_read().unwrap();

    let services = result.borrow_mut().take().unwrap().unwrap();
    assert_eq!(services.len(), 2);
    assert_eq!(services[0].uuid, Uuid::from_u16(0x1800));
    assert_eq!(services[0].start_handle, 1);
    assert_eq!(services[0].end_handle, 5);
    assert_eq!(services[1].uuid, Uuid::from_u16(0x1801));
    assert_eq!(services[1].start_handle, 6);
    assert_eq!(services[1].end_handle, 10);

    let cached = cache.borrow();
    assert_eq!(cached.services().count(), 2);
    assert!(cached.service(Uuid::from_u16(0x1800)).is_some());
    assert!(cached.service(Uuid::from_u16(0x1801)).is_some());
}

#[test]
fn discover_characteristics_by_uuid_terminates_on_first_match() {
    let (client_transport, mut server_transport) = PairedTransport::pair();
    let mut connection = Connection::new(client_transport);
    let cache = Rc::new(RefCell::new(Cache::new()));
    let result = Rc::new(RefCell::new(None));
    let service_uuid = Uuid::from_u16(0x1800);

    {
        let result = result.clone();
        discovery::discover_characteristics(
            &mut connection,
            cache.clone(),
            service_uuid,
            1,
            10,
            Some(Uuid::from_u16(0x2A00)),
            Box::new(move |r| *result.borrow_mut() = Some(r)),
        );
    }

    let on_wire = server_transport.read_message().unwrap().unwrap();
    assert_eq!(on_wire, vec![0x08, 0x01, 0x00, 0x0A, 0x00, 0x03, 0x28]);
    server_transport
        .write_message(&[0x09, 0x07, 0x02, 0x00, 0x0A, 0x03, 0x00, 0x00, 0x2A])
        .unwrap();
    connection.run_read().unwrap();

    let characteristics = result.borrow_mut().take().unwrap().unwrap();
    assert_eq!(characteristics.len(), 1);
    assert_eq!(characteristics[0].uuid, Uuid::from_u16(0x2A00));
    assert_eq!(characteristics[0].declaration_handle, 2);
    assert_eq!(characteristics[0].value_handle, 3);
}

#[test]
fn read_long_value_escalates_to_read_blob_and_concatenates() {
    let (client_transport, mut server_transport) = PairedTransport::pair();
    let mut connection = Connection::new(client_transport);
    let result = Rc::new(RefCell::new(None));

    {
        let result = result.clone();
        io::read(&mut connection, 5, Box::new(move |r| *result.borrow_mut() = Some(r)));
    }

    let on_wire = server_transport.read_message().unwrap().unwrap();
    assert_eq!(on_wire, vec![0x0A, 0x05, 0x00]);

    // Default (un-negotiated) MTU is 23, so a 22-byte payload (mtu - 1) signals truncation.
    let first_part = vec![0xAAu8; 22];
    let mut response = vec![0x0B];
    response.extend_from_slice(&first_part);
    server_transport.write_message(&response).unwrap();
    connection.run_read().unwrap();

    let on_wire = server_transport.read_message().unwrap().unwrap();
    assert_eq!(on_wire, vec![0x0C, 0x05, 0x00, 0x16, 0x00]);

    let second_part = vec![0xBBu8; 10];
    let mut response = vec![0x0D];
    response.extend_from_slice(&second_part);
    server_transport.write_message(&response).unwrap();
    connection.run_read().unwrap();

    let value = result.borrow_mut().take().unwrap().unwrap();
    let mut expected = first_part;
    expected.extend_from_slice(&second_part);
    assert_eq!(value, expected);
}

#[test]
fn reliable_long_write_chunks_at_mtu_minus_five_and_executes() {
    let (client_transport, mut server_transport) = PairedTransport::pair();
    let mut connection = Connection::new(client_transport);
    let in_long_write = Rc::new(std::cell::Cell::new(false));
    let result = Rc::new(RefCell::new(None));

    // MTU=23, so chunk_len = 23 - 5 = 18; a 50-byte value splits into 18/18/14.
    let value = vec![0x42u8; 50];

    {
        let result = result.clone();
        io::write_long(&mut connection, in_long_write.clone(), 9, value.clone(), true, Box::new(move |r| *result.borrow_mut() = Some(r)));
    }

    let expected_chunks = [(0u16, 18usize), (18, 18), (36, 14)];
    for (offset, len) in expected_chunks {
        let on_wire = server_transport.read_message().unwrap().unwrap();
        assert_eq!(Pdu::decode(&on_wire).unwrap(), Pdu::PrepareWriteRequest { handle: 9, offset, value: value[offset as usize..offset as usize + len].to_vec() });
        server_transport
            .write_message(&Pdu::PrepareWriteResponse { handle: 9, offset, value: value[offset as usize..offset as usize + len].to_vec() }.encode())
            .unwrap();
        connection.run_read().unwrap();
    }

    let on_wire = server_transport.read_message().unwrap().unwrap();
    assert_eq!(on_wire, vec![0x18, 0x01]);
    server_transport.write_message(&[0x19]).unwrap();
    connection.run_read().unwrap();

    assert!(result.borrow_mut().take().unwrap().is_ok());
    assert!(!in_long_write.get());
}

#[test]
fn reliable_long_write_echo_mismatch_cancels_before_reporting_the_error() {
    let (client_transport, mut server_transport) = PairedTransport::pair();
    let mut connection = Connection::new(client_transport);
    let in_long_write = Rc::new(std::cell::Cell::new(false));
    let result = Rc::new(RefCell::new(None));

    {
        let result = result.clone();
        io::write_long(&mut connection, in_long_write.clone(), 9, vec![0x01, 0x02, 0x03], true, Box::new(move |r| *result.borrow_mut() = Some(r)));
    }

    server_transport.read_message().unwrap();
    server_transport
        .write_message(&Pdu::PrepareWriteResponse { handle: 9, offset: 0, value: vec![0x01, 0x02, 0xFF] }.encode())
        .unwrap();
    connection.run_read().unwrap();

    let on_wire = server_transport.read_message().unwrap().unwrap();
    assert_eq!(Pdu::decode(&on_wire).unwrap(), Pdu::ExecuteWriteRequest { flags: ExecuteWriteFlag::Cancel });
    server_transport.write_message(&Pdu::ExecuteWriteResponse.encode()).unwrap();
    connection.run_read().unwrap();

    assert!(result.borrow_mut().take().unwrap().is_err());
}

#[test]
fn indication_is_delivered_and_confirmed_before_the_next_outbound_byte() {
    let (client_transport, mut server_transport) = PairedTransport::pair();
    let mut connection = Connection::new(client_transport);

    let received = Rc::new(RefCell::new(None));
    {
        let received = received.clone();
        connection.set_indication_handler(Box::new(move |handle, value| *received.borrow_mut() = Some((handle, value))));
    }

    server_transport.write_message(&[0x1D, 0x05, 0x00, 0x41, 0x42]).unwrap();
    connection.run_read().unwrap();

    assert_eq!(*received.borrow(), Some((5, vec![0x41, 0x42])));

    let on_wire = server_transport.read_message().unwrap().unwrap();
    assert_eq!(on_wire, vec![0x1E]);
}

#[test]
fn gatt_client_full_discovery_then_subscribe_and_receive_notification() {
    let (client_transport, mut server_transport) = PairedTransport::pair();
    let connection = Connection::new(client_transport);
    let mut client = GattClient::new(connection);

    let discovered = Rc::new(RefCell::new(None));
    {
        let discovered = discovered.clone();
        client.discover_primary_services(move |r| *discovered.borrow_mut() = Some(r));
    }
    let on_wire = server_transport.read_message().unwrap().unwrap();
    assert_eq!(on_wire, vec![0x10, 0x01, 0x00, 0xFF, 0xFF, 0x00, 0x28]);
    server_transport
        .write_message(&[0x11, 0x06, 0x01, 0x00, 0x05, 0x00, 0x00, 0x18])
        .unwrap();
    client.run_read().unwrap();
    server_transport.write_message(&[0x01, 0x10, 0x06, 0x00, 0x0A]).unwrap();
    client.run_read().unwrap();
    discovered.borrow_mut().take().unwrap().unwrap();

    let service_uuid = Uuid::from_u16(0x1800);
    let characteristic_uuid = Uuid::from_u16(0x2A00);
    let discovered = Rc::new(RefCell::new(None));
    {
        let discovered = discovered.clone();
        client.discover_characteristics(service_uuid, move |r| *discovered.borrow_mut() = Some(r));
    }
    let on_wire = server_transport.read_message().unwrap().unwrap();
    assert_eq!(on_wire, vec![0x08, 0x01, 0x00, 0x05, 0x00, 0x03, 0x28]);
    server_transport
        .write_message(&[0x09, 0x07, 0x02, 0x00, 0x10, 0x03, 0x00, 0x00, 0x2A])
        .unwrap();
    client.run_read().unwrap();
    server_transport.write_message(&[0x01, 0x08, 0x04, 0x00, 0x0A]).unwrap();
    client.run_read().unwrap();
    discovered.borrow_mut().take().unwrap().unwrap();

    let characteristic_ref = CharacteristicRef { service_uuid, characteristic_uuid };
    let descriptors_done = Rc::new(RefCell::new(None));
    {
        let descriptors_done = descriptors_done.clone();
        client.discover_descriptors(characteristic_ref, move |r| *descriptors_done.borrow_mut() = Some(r));
    }
    let on_wire = server_transport.read_message().unwrap().unwrap();
    assert_eq!(on_wire, vec![0x04, 0x04, 0x00, 0x05, 0x00]);
    server_transport.write_message(&[0x05, 0x01, 0x05, 0x00, 0x02, 0x29]).unwrap();
    client.run_read().unwrap();
    descriptors_done.borrow_mut().take().unwrap().unwrap();

    let subscribed = Rc::new(RefCell::new(None));
    let notified = Rc::new(RefCell::new(Vec::new()));
    {
        let subscribed = subscribed.clone();
        let notified = notified.clone();
        client.subscribe(
            characteristic_ref,
            blueatt::gatt::SubscriptionKind::Notification,
            move |value| notified.borrow_mut().push(value),
            move |r| *subscribed.borrow_mut() = Some(r),
        );
    }
    let on_wire = server_transport.read_message().unwrap().unwrap();
    assert_eq!(on_wire, vec![0x12, 0x05, 0x00, 0x01, 0x00]);
    server_transport.write_message(&[0x13]).unwrap();
    client.run_read().unwrap();
    subscribed.borrow_mut().take().unwrap().unwrap();

    server_transport.write_message(&[0x1B, 0x03, 0x00, 0x64]).unwrap();
    client.run_read().unwrap();

    assert_eq!(*notified.borrow(), vec![vec![0x64]]);
}
