//! The client-side attribute cache.
//!
//! Authoritative local view of what discovery has found: services, each holding
//! characteristics, each holding descriptors plus a client-configuration shadow. The cache is a
//! tree; characteristics and descriptors are looked up by handle range rather than through a
//! stored parent pointer (see `Cache::end_handle_of`), so there is nothing here that can form a
//! cycle.
//!
//! Only a GATT client's own procedure completions mutate the cache (`crate::gatt::discovery`,
//! `crate::gatt::notify`); this module exposes no public mutation beyond what those call.

use std::collections::BTreeMap;

use crate::model::{Characteristic, CharacteristicRef, Descriptor, Service};
use crate::uuid::Uuid;

struct CharacteristicEntry {
    characteristic: Characteristic,
    descriptors: BTreeMap<Uuid, Descriptor>,
    /// The notify/indicate bits last written to this characteristic's CCCD, if any.
    client_config: Option<u16>,
}

struct ServiceEntry {
    service: Service,
    characteristics: BTreeMap<Uuid, CharacteristicEntry>,
}

#[derive(Default)]
pub struct Cache {
    services: BTreeMap<Uuid, ServiceEntry>,
}

impl Cache {
    pub fn new() -> Self {
        Cache { services: BTreeMap::new() }
    }

    /// Insert or refresh services. A `complete_set` insert (a full-range discovery) evicts every
    /// previously cached service whose UUID is absent from `list`; a partial insert (by-UUID
    /// discovery) only upserts and never evicts.
    pub fn insert_services(&mut self, list: Vec<Service>, complete_set: bool) {
        if complete_set {
            let keep: std::collections::BTreeSet<Uuid> = list.iter().map(|s| s.uuid).collect();
            self.services.retain(|uuid, _| keep.contains(uuid));
        }

        for service in list {
            self.services
                .entry(service.uuid)
                .and_modify(|entry| entry.service = service.clone())
                .or_insert_with(|| ServiceEntry { service, characteristics: BTreeMap::new() });
        }
    }

    /// Insert or refresh the characteristics of one service. Same complete-set/partial contract
    /// as `insert_services`, scoped to `service_uuid`'s own characteristic map.
    pub fn insert_characteristics(&mut self, service_uuid: Uuid, list: Vec<Characteristic>, complete_set: bool) {
        let entry = match self.services.get_mut(&service_uuid) {
            Some(e) => e,
            None => return,
        };

        if complete_set {
            let keep: std::collections::BTreeSet<Uuid> = list.iter().map(|c| c.uuid).collect();
            entry.characteristics.retain(|uuid, _| keep.contains(uuid));
        }

        for characteristic in list {
            entry
                .characteristics
                .entry(characteristic.uuid)
                .and_modify(|c| c.characteristic = characteristic.clone())
                .or_insert_with(|| CharacteristicEntry {
                    characteristic,
                    descriptors: BTreeMap::new(),
                    client_config: None,
                });
        }
    }

    /// Descriptor discovery is always a complete-set scan of one characteristic's handle range,
    /// so this always replaces that characteristic's descriptor map outright.
    pub fn insert_descriptors(&mut self, characteristic_ref: CharacteristicRef, list: Vec<Descriptor>) {
        if let Some(entry) = self.characteristic_entry_mut(characteristic_ref) {
            entry.descriptors = list.into_iter().map(|d| (d.uuid, d)).collect();
        }
    }

    /// For characteristic C in service S: the declaration handle of the next characteristic in
    /// S if one exists, else `S.end_handle`. This is the upper bound passed to descriptor
    /// discovery for C.
    pub fn end_handle_of(&self, characteristic_ref: CharacteristicRef) -> Option<u16> {
        let service_entry = self.services.get(&characteristic_ref.service_uuid)?;
        let characteristic_entry = service_entry.characteristics.get(&characteristic_ref.characteristic_uuid)?;
        let this_decl = characteristic_entry.characteristic.declaration_handle;

        let next_decl = service_entry
            .characteristics
            .values()
            .map(|c| c.characteristic.declaration_handle)
            .filter(|&decl| decl > this_decl)
            .min();

        Some(next_decl.map(|decl| decl - 1).unwrap_or(service_entry.service.end_handle))
    }

    pub fn descriptors_of(&self, characteristic_ref: CharacteristicRef) -> Vec<Descriptor> {
        self.characteristic_entry(characteristic_ref)
            .map(|e| e.descriptors.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn update_client_config(&mut self, characteristic_ref: CharacteristicRef, bits: u16) {
        if let Some(entry) = self.characteristic_entry_mut(characteristic_ref) {
            entry.client_config = Some(bits);
        }
    }

    pub fn client_config_of(&self, characteristic_ref: CharacteristicRef) -> Option<u16> {
        self.characteristic_entry(characteristic_ref)?.client_config
    }

    pub fn service(&self, uuid: Uuid) -> Option<&Service> {
        self.services.get(&uuid).map(|e| &e.service)
    }

    pub fn services(&self) -> impl Iterator<Item = &Service> {
        self.services.values().map(|e| &e.service)
    }

    pub fn characteristic(&self, characteristic_ref: CharacteristicRef) -> Option<&Characteristic> {
        self.characteristic_entry(characteristic_ref).map(|e| &e.characteristic)
    }

    pub fn characteristics_of(&self, service_uuid: Uuid) -> Vec<Characteristic> {
        self.services
            .get(&service_uuid)
            .map(|e| e.characteristics.values().map(|c| c.characteristic.clone()).collect())
            .unwrap_or_default()
    }

    fn characteristic_entry(&self, characteristic_ref: CharacteristicRef) -> Option<&CharacteristicEntry> {
        self.services.get(&characteristic_ref.service_uuid)?.characteristics.get(&characteristic_ref.characteristic_uuid)
    }

    fn characteristic_entry_mut(&mut self, characteristic_ref: CharacteristicRef) -> Option<&mut CharacteristicEntry> {
        self.services
            .get_mut(&characteristic_ref.service_uuid)?
            .characteristics
            .get_mut(&characteristic_ref.characteristic_uuid)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::ServiceKind;

    fn service(uuid: u16, start: u16, end: u16) -> Service {
        Service { uuid: Uuid::from_u16(uuid), kind: ServiceKind::Primary, start_handle: start, end_handle: end }
    }

    #[test]
    fn complete_set_insert_evicts_stale_services() {
        let mut cache = Cache::new();
        cache.insert_services(vec![service(0x1800, 1, 5), service(0x1801, 6, 10)], true);
        assert_eq!(cache.services().count(), 2);

        cache.insert_services(vec![service(0x1800, 1, 5)], true);
        assert_eq!(cache.services().count(), 1);
        assert!(cache.service(Uuid::from_u16(0x1801)).is_none());
    }

    #[test]
    fn partial_insert_never_evicts() {
        let mut cache = Cache::new();
        cache.insert_services(vec![service(0x1800, 1, 5), service(0x1801, 6, 10)], true);
        cache.insert_services(vec![service(0x180F, 11, 12)], false);
        assert_eq!(cache.services().count(), 3);
    }

    #[test]
    fn end_handle_of_uses_next_declaration_or_service_end() {
        use crate::model::{Characteristic, CharacteristicProperties};

        let mut cache = Cache::new();
        cache.insert_services(vec![service(0x1800, 1, 10)], true);
        let service_uuid = Uuid::from_u16(0x1800);
        cache.insert_characteristics(
            service_uuid,
            vec![
                Characteristic {
                    uuid: Uuid::from_u16(0x2A00),
                    properties: CharacteristicProperties(0x02),
                    declaration_handle: 2,
                    value_handle: 3,
                },
                Characteristic {
                    uuid: Uuid::from_u16(0x2A01),
                    properties: CharacteristicProperties(0x02),
                    declaration_handle: 7,
                    value_handle: 8,
                },
            ],
            true,
        );

        let first = CharacteristicRef { service_uuid, characteristic_uuid: Uuid::from_u16(0x2A00) };
        let last = CharacteristicRef { service_uuid, characteristic_uuid: Uuid::from_u16(0x2A01) };

        assert_eq!(cache.end_handle_of(first), Some(6));
        assert_eq!(cache.end_handle_of(last), Some(10));
    }
}
