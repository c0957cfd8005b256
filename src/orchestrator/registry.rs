//! Registry of running device workers
//!
//! Records are keyed by id for targeted requests and stacked by start order
//! so the most recent device can be stopped first.

use crate::device::DeviceHandle;
use crate::telemetry::DeviceKind;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug)]
pub struct DeviceRecord {
    pub id: Uuid,
    pub kind: DeviceKind,
    pub handle: DeviceHandle,
}

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    records: HashMap<Uuid, DeviceRecord>,
    // start order, most recent last
    stack: Vec<Uuid>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Adds a record on top of the stack.
    ///
    /// A record with an id already present replaces the old one, which is
    /// returned so the caller can terminate it.
    pub fn push(&mut self, record: DeviceRecord) -> Option<DeviceRecord> {
        let id = record.id;
        let replaced = self.records.insert(id, record);
        if replaced.is_some() {
            self.stack.retain(|existing| *existing != id);
        }
        self.stack.push(id);
        replaced
    }

    /// Removes the most recently started record
    pub fn pop(&mut self) -> Option<DeviceRecord> {
        let id = self.stack.pop()?;
        self.records.remove(&id)
    }

    pub fn get(&self, id: &Uuid) -> Option<&DeviceRecord> {
        self.records.get(id)
    }

    /// Looks up `id` only if it names an active device
    pub fn active(&self, id: &Uuid) -> Option<&DeviceRecord> {
        self.get(id)
            .filter(|record| record.kind == DeviceKind::Active)
    }

    /// Ids in start order
    pub fn ids(&self) -> impl Iterator<Item = &Uuid> {
        self.stack.iter()
    }

    /// Empties the registry, most recent first
    pub fn drain(&mut self) -> Vec<DeviceRecord> {
        let mut drained = Vec::with_capacity(self.stack.len());
        while let Some(record) = self.pop() {
            drained.push(record);
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceRequest;
    use crate::unit::{UnitHandle, UnitTag};
    use tokio::sync::mpsc;

    fn record(kind: DeviceKind) -> DeviceRecord {
        let id = Uuid::new_v4();
        let (tx, _rx) = mpsc::channel::<DeviceRequest>(1);
        let task = tokio::spawn(std::future::pending::<()>());
        DeviceRecord {
            id,
            kind,
            handle: UnitHandle::with_mailbox(UnitTag::Device(id), tx, task),
        }
    }

    #[tokio::test]
    async fn pop_follows_start_order() {
        let mut registry = DeviceRegistry::new();
        let a = record(DeviceKind::Passive);
        let b = record(DeviceKind::Active);
        let (a_id, b_id) = (a.id, b.id);
        registry.push(a);
        registry.push(b);
        assert_eq!(registry.len(), 2);

        assert_eq!(registry.pop().map(|r| r.id), Some(b_id));
        assert_eq!(registry.ids().copied().collect::<Vec<_>>(), vec![a_id]);
        assert!(registry.get(&a_id).is_some());
        assert!(registry.get(&b_id).is_none());

        assert_eq!(registry.pop().map(|r| r.id), Some(a_id));
        assert!(registry.pop().is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn active_lookup_checks_kind() {
        let mut registry = DeviceRegistry::new();
        let passive = record(DeviceKind::Passive);
        let active = record(DeviceKind::Active);
        let (passive_id, active_id) = (passive.id, active.id);
        registry.push(passive);
        registry.push(active);

        assert!(registry.active(&active_id).is_some());
        assert!(registry.active(&passive_id).is_none());
        assert!(registry.active(&Uuid::new_v4()).is_none());
    }

    #[tokio::test]
    async fn drain_empties_most_recent_first() {
        let mut registry = DeviceRegistry::new();
        let ids: Vec<Uuid> = (0..3)
            .map(|_| {
                let r = record(DeviceKind::Passive);
                let id = r.id;
                registry.push(r);
                id
            })
            .collect();

        let drained: Vec<Uuid> = registry.drain().into_iter().map(|r| r.id).collect();
        assert_eq!(drained, ids.into_iter().rev().collect::<Vec<_>>());
        assert!(registry.is_empty());
        assert_eq!(registry.ids().count(), 0);
    }
}
