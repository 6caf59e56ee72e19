//! # Endpoint Map
//!
//! Concurrent cache of known remote endpoints keyed by address name, plus the
//! check schedule drained by the discovery timer. Structural changes go through
//! the map's shard locks; each record carries its own lock. At most one `Add`
//! item per address is pending in the schedule at a time.

use crate::models::{
    CheckKind, CheckScheduleElement, EndpointDescriptor, EndpointIdentifier, EndpointRecord,
};
use crossbeam::queue::SegQueue;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct EndpointMap {
    endpoints: DashMap<String, Arc<Mutex<EndpointRecord>>>,
    schedule: SegQueue<CheckScheduleElement>,
    /// Addresses with an `Add` item waiting in `schedule`
    pending_adds: DashSet<String>,
}

impl EndpointMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the record for `address_name`
    pub fn get(&self, address_name: &str) -> Option<EndpointRecord> {
        self.endpoints
            .get(address_name)
            .map(|record| record.value().lock().clone())
    }

    pub fn contains(&self, address_name: &str) -> bool {
        self.endpoints.contains_key(address_name)
    }

    /// Insert a record for a freshly probed endpoint, or enrich the existing one.
    /// Returns true when the endpoint was not known before.
    pub fn insert_or_enrich(&self, descriptor: EndpointDescriptor) -> bool {
        let address = descriptor.identifier.address_name.clone();
        if let Some(record) = self.endpoints.get(&address) {
            record.value().lock().enrich(descriptor);
            return false;
        }

        let mut inserted = false;
        let record = self
            .endpoints
            .entry(address)
            .or_insert_with(|| {
                inserted = true;
                Arc::new(Mutex::new(EndpointRecord::detected(
                    descriptor.identifier.clone(),
                )))
            })
            .value()
            .clone();
        record.lock().enrich(descriptor);
        inserted
    }

    pub fn remove(&self, address_name: &str) -> Option<EndpointRecord> {
        self.endpoints
            .remove(address_name)
            .map(|(_, record)| record.lock().clone())
    }

    /// Record a failed probe against a cached endpoint, if it is cached
    pub fn mark_unreachable(&self, address_name: &str) {
        if let Some(record) = self.endpoints.get(address_name) {
            record.value().lock().mark_unreachable();
        }
    }

    pub fn endpoints_for_service(&self, service: &str) -> Vec<EndpointIdentifier> {
        self.endpoints
            .iter()
            .filter_map(|entry| {
                let record = entry.value().lock();
                (record.identifier.service == service).then(|| record.identifier.clone())
            })
            .collect()
    }

    pub fn addresses(&self) -> Vec<String> {
        self.endpoints.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Queue a check. An `Add` for an address that already has one pending is
    /// dropped; returns whether the element was queued.
    pub fn schedule(&self, element: CheckScheduleElement) -> bool {
        if element.kind == CheckKind::Add
            && !self
                .pending_adds
                .insert(element.identifier.address_name.clone())
        {
            return false;
        }
        self.schedule.push(element);
        true
    }

    /// Take every element currently scheduled, in scheduling order
    pub fn drain_schedule(&self) -> Vec<CheckScheduleElement> {
        let mut drained = Vec::with_capacity(self.schedule.len());
        while let Some(element) = self.schedule.pop() {
            if element.kind == CheckKind::Add {
                self.pending_adds.remove(&element.identifier.address_name);
            }
            drained.push(element);
        }
        drained
    }

    pub fn schedule_len(&self) -> usize {
        self.schedule.len()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
