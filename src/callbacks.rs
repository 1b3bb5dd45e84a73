use std::collections::HashMap;

use tracing::debug;

use crate::env::CompiledUnit;

/// Event-name to compiled-unit mapping with deferred destruction.
///
/// A removed or replaced unit is moved into the pending set instead of being
/// dropped on the spot: a handler can re-register or replace its own event
/// from within its own invocation, and the displaced unit must outlive any
/// call that started before the removal. The pending set is flushed only at
/// safe points, when no script call can be in flight.
#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: HashMap<String, CompiledUnit>,
    pending: Vec<CompiledUnit>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&CompiledUnit> {
        self.callbacks.get(name)
    }

    /// Registers `unit` under `name`, displacing any existing entry into the
    /// pending set first. At most one unit is registered per name.
    pub fn set(&mut self, name: impl Into<String>, unit: CompiledUnit) {
        let name = name.into();
        self.remove(&name);
        debug!(callback = %name, unit = unit.unit_id(), "callback registered");
        self.callbacks.insert(name, unit);
    }

    pub fn remove(&mut self, name: &str) {
        if let Some(unit) = self.callbacks.remove(name) {
            debug!(callback = %name, unit = unit.unit_id(), "callback deferred for deletion");
            self.pending.push(unit);
        }
    }

    /// Moves every registered unit into the pending set.
    pub fn clear(&mut self) {
        self.pending.extend(self.callbacks.drain().map(|(_, unit)| unit));
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Destroys deferred units. Callers must only do this at a safe point,
    /// with no script call in flight.
    pub fn flush_pending(&mut self) {
        if !self.pending.is_empty() {
            debug!(count = self.pending.len(), "flushing deferred callback deletions");
            self.pending.clear();
        }
    }
}
