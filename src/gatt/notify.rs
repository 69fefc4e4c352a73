//! Notification and indication subscription via the Client Characteristic Configuration
//! Descriptor (CCCD).
//!
//! Subscribing is just a Write Request to the CCCD handle carrying the notify/indicate bit;
//! delivery itself runs through `Connection`'s notification/indication handlers, which
//! `crate::gatt::GattClient::new` wires to dispatch by value handle into whatever callback was
//! registered here.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::att::{AttError, Pdu};
use crate::cache::Cache;
use crate::connection::Connection;
use crate::model::{CharacteristicRef, CLIENT_CHARACTERISTIC_CONFIGURATION};
use crate::transport::Transport;

pub type NotifyCallback = Box<dyn FnMut(Vec<u8>)>;
pub type NotifyTable = Rc<RefCell<BTreeMap<u16, NotifyCallback>>>;

/// Which bit to set in the CCCD when subscribing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionKind {
    Notification,
    Indication,
}

impl SubscriptionKind {
    fn bits(self) -> u16 {
        match self {
            SubscriptionKind::Notification => 0x0001,
            SubscriptionKind::Indication => 0x0002,
        }
    }
}

/// Subscribe to (or, with `subscription: None`, unsubscribe from) notifications or indications
/// on one characteristic. Fails with `ClientConfigurationMissing` if the characteristic has no
/// CCCD in the cache. Run descriptor discovery on it first.
pub fn set_subscription<T: Transport + 'static>(
    connection: &mut Connection<T>,
    cache: Rc<RefCell<Cache>>,
    notify_table: NotifyTable,
    characteristic_ref: CharacteristicRef,
    subscription: Option<(SubscriptionKind, NotifyCallback)>,
    completion: Box<dyn FnOnce(Result<(), AttError>)>,
) {
    let found = {
        let cache_ref = cache.borrow();
        let characteristic = cache_ref.characteristic(characteristic_ref);
        let cccd = cache_ref
            .descriptors_of(characteristic_ref)
            .into_iter()
            .find(|d| d.uuid == CLIENT_CHARACTERISTIC_CONFIGURATION);

        match (characteristic, cccd) {
            (Some(c), Some(d)) => Some((c.value_handle, d.handle)),
            _ => None,
        }
    };

    let (value_handle, cccd_handle) = match found {
        Some(v) => v,
        None => return completion(Err(AttError::ClientConfigurationMissing)),
    };

    let bits = subscription.as_ref().map(|(kind, _)| kind.bits()).unwrap_or(0x0000);

    connection.send_request(
        Pdu::WriteRequest { handle: cccd_handle, value: bits.to_le_bytes().to_vec() },
        Box::new(move |result, _conn| match result {
            Ok(Pdu::WriteResponse) => {
                cache.borrow_mut().update_client_config(characteristic_ref, bits);
                match subscription {
                    Some((_, callback)) => {
                        notify_table.borrow_mut().insert(value_handle, callback);
                    }
                    None => {
                        notify_table.borrow_mut().remove(&value_handle);
                    }
                }
                completion(Ok(()));
            }
            Err(e) => completion(Err(e)),
            Ok(_) => completion(Err(AttError::InvalidResponse)),
        }),
    );
}
