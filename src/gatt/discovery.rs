//! Discovery procedures: primary services, characteristics, and descriptors.
//!
//! Every procedure here is a small continuation-passing loop: each response either completes the
//! procedure or re-issues the next page's request from inside the previous page's completion
//! (see `crate::connection` module docs for why that's safe without a `RefCell` around
//! `Connection` itself). The cache is mutated exactly once, when a procedure reaches a terminal
//! state, never mid-pagination.

use std::cell::RefCell;
use std::rc::Rc;

use crate::att::{AttError, ErrorCode, Pdu};
use crate::cache::Cache;
use crate::connection::Connection;
use crate::model::{
    Characteristic, CharacteristicProperties, CharacteristicRef, Descriptor, Service, ServiceKind,
    CHARACTERISTIC_DECLARATION, PRIMARY_SERVICE,
};
use crate::transport::Transport;
use crate::uuid::Uuid;

type Completion<R> = Box<dyn FnOnce(Result<R, AttError>)>;

/// Discover every primary service over the full handle range. A complete-set discovery: on
/// success the cache's services are replaced wholesale with what this call found.
pub fn discover_primary_services<T: Transport + 'static>(
    connection: &mut Connection<T>,
    cache: Rc<RefCell<Cache>>,
    completion: Completion<Vec<Service>>,
) {
    services_step(connection, cache, 0x0001, Vec::new(), completion);
}

fn services_step<T: Transport + 'static>(
    connection: &mut Connection<T>,
    cache: Rc<RefCell<Cache>>,
    start: u16,
    acc: Vec<Service>,
    completion: Completion<Vec<Service>>,
) {
    connection.send_request(
        Pdu::ReadByGroupTypeRequest { start_handle: start, end_handle: 0xFFFF, group_type: PRIMARY_SERVICE },
        Box::new(move |result, conn| match result {
            Ok(Pdu::ReadByGroupTypeResponse { data_list }) => {
                if data_list.is_empty() {
                    return completion(Err(AttError::InvalidResponse));
                }

                let mut acc = acc;
                for (start_handle, end_handle, value) in &data_list {
                    let uuid = match Uuid::from_le_bytes(value) {
                        Some(u) => u,
                        None => return completion(Err(AttError::InvalidResponse)),
                    };
                    acc.push(Service { uuid, kind: ServiceKind::Primary, start_handle: *start_handle, end_handle: *end_handle });
                }

                let last_end = data_list.last().unwrap().1;
                if last_end < start {
                    return completion(Err(AttError::InvalidResponse));
                }

                if last_end == 0xFFFF {
                    cache.borrow_mut().insert_services(acc.clone(), true);
                    completion(Ok(acc));
                } else {
                    services_step(conn, cache, last_end + 1, acc, completion);
                }
            }
            Err(AttError::ErrorResponse { code: ErrorCode::AttributeNotFound, .. }) => {
                cache.borrow_mut().insert_services(acc.clone(), true);
                completion(Ok(acc));
            }
            Err(e) => completion(Err(e)),
            Ok(_) => completion(Err(AttError::InvalidResponse)),
        }),
    );
}

/// Discover primary services matching one UUID. A partial discovery: matches are upserted, no
/// unrelated cache entry is evicted.
pub fn discover_primary_services_by_uuid<T: Transport + 'static>(
    connection: &mut Connection<T>,
    cache: Rc<RefCell<Cache>>,
    uuid: Uuid,
    completion: Completion<Vec<Service>>,
) {
    services_by_uuid_step(connection, cache, uuid, 0x0001, Vec::new(), completion);
}

fn services_by_uuid_step<T: Transport + 'static>(
    connection: &mut Connection<T>,
    cache: Rc<RefCell<Cache>>,
    uuid: Uuid,
    start: u16,
    acc: Vec<Service>,
    completion: Completion<Vec<Service>>,
) {
    let attr_type: u16 = match core::convert::TryFrom::try_from(PRIMARY_SERVICE) {
        Ok(v) => v,
        Err(_) => unreachable!("Primary Service UUID is always 16-bit"),
    };

    connection.send_request(
        Pdu::FindByTypeValueRequest {
            start_handle: start,
            end_handle: 0xFFFF,
            attr_type,
            attr_value: uuid.to_le_bytes(),
        },
        Box::new(move |result, conn| match result {
            Ok(Pdu::FindByTypeValueResponse { handles_info }) => {
                if handles_info.is_empty() {
                    return completion(Err(AttError::InvalidResponse));
                }

                let mut acc = acc;
                for (found_handle, group_end_handle) in &handles_info {
                    acc.push(Service {
                        uuid,
                        kind: ServiceKind::Primary,
                        start_handle: *found_handle,
                        end_handle: *group_end_handle,
                    });
                }

                let last_end = handles_info.last().unwrap().1;
                if last_end < start {
                    return completion(Err(AttError::InvalidResponse));
                }

                if last_end == 0xFFFF {
                    cache.borrow_mut().insert_services(acc.clone(), false);
                    completion(Ok(acc));
                } else {
                    services_by_uuid_step(conn, cache, uuid, last_end + 1, acc, completion);
                }
            }
            Err(AttError::ErrorResponse { code: ErrorCode::AttributeNotFound, .. }) => {
                cache.borrow_mut().insert_services(acc.clone(), false);
                completion(Ok(acc));
            }
            Err(e) => completion(Err(e)),
            Ok(_) => completion(Err(AttError::InvalidResponse)),
        }),
    );
}

fn parse_characteristic_declaration(declaration_handle: u16, value: &[u8]) -> Result<Characteristic, AttError> {
    if value.len() < 3 {
        return Err(AttError::InvalidResponse);
    }

    let properties = CharacteristicProperties(value[0]);
    let value_handle = u16::from_le_bytes([value[1], value[2]]);
    let uuid = Uuid::from_le_bytes(&value[3..]).ok_or(AttError::InvalidResponse)?;

    Ok(Characteristic { uuid, properties, declaration_handle, value_handle })
}

/// Discover characteristics within `[start..end]` (a service's handle range). `filter_uuid`, if
/// set, short-circuits as soon as a matching characteristic is found and the result is treated
/// as a partial discovery (no unrelated cache entry evicted); otherwise the full range is walked
/// and the result is a complete-set discovery.
pub fn discover_characteristics<T: Transport + 'static>(
    connection: &mut Connection<T>,
    cache: Rc<RefCell<Cache>>,
    service_uuid: Uuid,
    start: u16,
    end: u16,
    filter_uuid: Option<Uuid>,
    completion: Completion<Vec<Characteristic>>,
) {
    characteristics_step(connection, cache, service_uuid, start, end, filter_uuid, Vec::new(), completion);
}

fn characteristics_step<T: Transport + 'static>(
    connection: &mut Connection<T>,
    cache: Rc<RefCell<Cache>>,
    service_uuid: Uuid,
    start: u16,
    end: u16,
    filter_uuid: Option<Uuid>,
    acc: Vec<Characteristic>,
    completion: Completion<Vec<Characteristic>>,
) {
    if start > end {
        cache.borrow_mut().insert_characteristics(service_uuid, acc.clone(), filter_uuid.is_none());
        return completion(Ok(acc));
    }

    connection.send_request(
        Pdu::ReadByTypeRequest { start_handle: start, end_handle: end, attr_type: CHARACTERISTIC_DECLARATION },
        Box::new(move |result, conn| match result {
            Ok(Pdu::ReadByTypeResponse { data_list }) => {
                if data_list.is_empty() {
                    return completion(Err(AttError::InvalidResponse));
                }

                let mut acc = acc;
                for (handle, value) in &data_list {
                    let characteristic = match parse_characteristic_declaration(*handle, value) {
                        Ok(c) => c,
                        Err(e) => return completion(Err(e)),
                    };

                    if let Some(target) = filter_uuid {
                        if characteristic.uuid == target {
                            acc.push(characteristic);
                            cache.borrow_mut().insert_characteristics(service_uuid, acc.clone(), false);
                            return completion(Ok(acc));
                        }
                    }

                    acc.push(characteristic);
                }

                let last_handle = data_list.last().unwrap().0;
                if last_handle < start {
                    return completion(Err(AttError::InvalidResponse));
                }

                characteristics_step(conn, cache, service_uuid, last_handle.saturating_add(1), end, filter_uuid, acc, completion);
            }
            Err(AttError::ErrorResponse { code: ErrorCode::AttributeNotFound, .. }) => {
                cache.borrow_mut().insert_characteristics(service_uuid, acc.clone(), filter_uuid.is_none());
                completion(Ok(acc));
            }
            Err(e) => completion(Err(e)),
            Ok(_) => completion(Err(AttError::InvalidResponse)),
        }),
    );
}

/// Discover every descriptor of one characteristic. Always a complete-set scan of
/// `[char.value_handle+1 .. end_of_char]` (`Cache::end_handle_of`), so the cache's descriptor map
/// for this characteristic is replaced outright.
pub fn discover_descriptors<T: Transport + 'static>(
    connection: &mut Connection<T>,
    cache: Rc<RefCell<Cache>>,
    characteristic_ref: CharacteristicRef,
    completion: Completion<Vec<Descriptor>>,
) {
    let bounds = {
        let cache_ref = cache.borrow();
        let characteristic = match cache_ref.characteristic(characteristic_ref) {
            Some(c) => c,
            None => return completion(Err(AttError::InvalidResponse)),
        };
        let end = match cache_ref.end_handle_of(characteristic_ref) {
            Some(e) => e,
            None => return completion(Err(AttError::InvalidResponse)),
        };
        (characteristic.value_handle.saturating_add(1), end)
    };
    let (start, end) = bounds;

    if start > end {
        cache.borrow_mut().insert_descriptors(characteristic_ref, Vec::new());
        return completion(Ok(Vec::new()));
    }

    descriptors_step(connection, cache, characteristic_ref, start, end, Vec::new(), completion);
}

fn descriptors_step<T: Transport + 'static>(
    connection: &mut Connection<T>,
    cache: Rc<RefCell<Cache>>,
    characteristic_ref: CharacteristicRef,
    start: u16,
    end: u16,
    acc: Vec<Descriptor>,
    completion: Completion<Vec<Descriptor>>,
) {
    connection.send_request(
        Pdu::FindInformationRequest { start_handle: start, end_handle: end },
        Box::new(move |result, conn| match result {
            Ok(Pdu::FindInformationResponse { info }) => {
                if info.is_empty() {
                    return completion(Err(AttError::InvalidResponse));
                }

                let last_handle = info.last().unwrap().0;
                if last_handle < start {
                    return completion(Err(AttError::InvalidResponse));
                }

                let mut acc = acc;
                for (handle, uuid) in info {
                    acc.push(Descriptor { uuid, handle });
                }

                if last_handle >= end {
                    cache.borrow_mut().insert_descriptors(characteristic_ref, acc.clone());
                    completion(Ok(acc));
                } else {
                    descriptors_step(conn, cache, characteristic_ref, last_handle + 1, end, acc, completion);
                }
            }
            Err(AttError::ErrorResponse { code: ErrorCode::AttributeNotFound, .. }) => {
                cache.borrow_mut().insert_descriptors(characteristic_ref, acc.clone());
                completion(Ok(acc));
            }
            Err(e) => completion(Err(e)),
            Ok(_) => completion(Err(AttError::InvalidResponse)),
        }),
    );
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::transport::PairedTransport;
    use std::cell::RefCell as StdRefCell;

    #[test]
    fn discover_primary_services_paginates_and_stops_on_attribute_not_found() {
        let (client_transport, mut server_transport) = PairedTransport::pair();
        let mut connection = Connection::new(client_transport);
        let cache = Rc::new(StdRefCell::new(Cache::new()));
        let result = Rc::new(StdRefCell::new(None));

        {
            let result = result.clone();
            discover_primary_services(&mut connection, cache.clone(), Box::new(move |r| *result.borrow_mut() = Some(r)));
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
        assert_eq!(services[1].uuid, Uuid::from_u16(0x1801));
        assert_eq!(cache.borrow().services().count(), 2);
    }

    #[test]
    fn discover_characteristics_by_uuid_terminates_early() {
        let (client_transport, mut server_transport) = PairedTransport::pair();
        let mut connection = Connection::new(client_transport);
        let cache = Rc::new(StdRefCell::new(Cache::new()));
        let result = Rc::new(StdRefCell::new(None));

        let service_uuid = Uuid::from_u16(0x1800);

        {
            let result = result.clone();
            discover_characteristics(
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
        assert_eq!(characteristics[0].value_handle, 3);
    }
}
