// chkit/src/database/buffer.rs
//
// Per-model write buffer. Rows are kept as encoded TSV lines so a flush is a
// plain join; each model gets its own slot and lock.
//

use std::any::TypeId;
use std::mem;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::metrics;
use crate::schema::Model;

/// Rows taken out of the buffer, ready to be sent as one insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub table: String,
    pub lines: Vec<String>,
}

struct Slot {
    table: String,
    lines: Mutex<Vec<String>>,
}

impl Slot {
    fn take(&self) -> Option<Batch> {
        let mut lines = self.lines.lock();
        if lines.is_empty() {
            return None;
        }
        let batch = Batch {
            table: self.table.clone(),
            lines: mem::take(&mut *lines),
        };
        metrics::set_buffered_rows(&self.table, 0);
        Some(batch)
    }
}

pub struct WriteBuffer {
    threshold: usize,
    slots: DashMap<TypeId, Arc<Slot>>,
}

impl WriteBuffer {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            slots: DashMap::new(),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    fn slot<M: Model>(&self) -> Arc<Slot> {
        self.slots
            .entry(TypeId::of::<M>())
            .or_insert_with(|| {
                Arc::new(Slot {
                    table: M::table_name(),
                    lines: Mutex::new(Vec::new()),
                })
            })
            .clone()
    }

    /// Append encoded rows for `M`. Returns the whole pending batch once it
    /// reaches the threshold; the caller is responsible for sending it.
    pub fn push<M: Model>(&self, rows: Vec<String>) -> Option<Batch> {
        if rows.is_empty() {
            return None;
        }
        let slot = self.slot::<M>();
        let mut lines = slot.lines.lock();
        lines.extend(rows);
        if lines.len() >= self.threshold {
            let batch = Batch {
                table: slot.table.clone(),
                lines: mem::take(&mut *lines),
            };
            metrics::set_buffered_rows(&slot.table, 0);
            Some(batch)
        } else {
            metrics::set_buffered_rows(&slot.table, lines.len());
            None
        }
    }

    /// Take whatever is pending for the model with type id `key`.
    pub fn take(&self, key: TypeId) -> Option<Batch> {
        let slot = self.slots.get(&key).map(|s| s.value().clone())?;
        slot.take()
    }

    pub fn take_model<M: Model>(&self) -> Option<Batch> {
        self.take(TypeId::of::<M>())
    }

    /// Type ids of every model that has ever been buffered.
    pub fn keys(&self) -> Vec<TypeId> {
        self.slots.iter().map(|entry| *entry.key()).collect()
    }

    /// Total rows waiting across all models.
    pub fn pending(&self) -> usize {
        let slots: Vec<Arc<Slot>> = self.slots.iter().map(|e| e.value().clone()).collect();
        slots.iter().map(|slot| slot.lines.lock().len()).sum()
    }

    pub fn pending_for<M: Model>(&self) -> usize {
        self.slots
            .get(&TypeId::of::<M>())
            .map(|s| s.value().clone())
            .map_or(0, |slot| slot.lines.lock().len())
    }
}
