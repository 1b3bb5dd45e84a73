use std::collections::HashMap;

use crate::object::{EntityId, ScriptObject};

/// Membership sets consulted once per engine cycle: timer-driven NPCs,
/// per-tick-update NPCs, and weapons needing updates. Registration is
/// idempotent; owners must unregister an entity before destroying it.
#[derive(Default)]
pub struct PeriodicRegistries {
    timer_npcs: HashMap<EntityId, ScriptObject>,
    update_npcs: HashMap<EntityId, ScriptObject>,
    update_weapons: HashMap<EntityId, ScriptObject>,
}

impl PeriodicRegistries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_npc_timer(&mut self, npc: &ScriptObject) {
        self.timer_npcs.entry(npc.id()).or_insert_with(|| npc.clone());
    }

    pub fn unregister_npc_timer(&mut self, id: EntityId) {
        self.timer_npcs.remove(&id);
    }

    pub fn register_npc_update(&mut self, npc: &ScriptObject) {
        self.update_npcs.entry(npc.id()).or_insert_with(|| npc.clone());
    }

    pub fn unregister_npc_update(&mut self, id: EntityId) {
        self.update_npcs.remove(&id);
    }

    pub fn register_weapon_update(&mut self, weapon: &ScriptObject) {
        self.update_weapons.entry(weapon.id()).or_insert_with(|| weapon.clone());
    }

    pub fn unregister_weapon_update(&mut self, id: EntityId) {
        self.update_weapons.remove(&id);
    }

    pub fn has_npc_timer(&self, id: EntityId) -> bool {
        self.timer_npcs.contains_key(&id)
    }

    pub fn has_npc_update(&self, id: EntityId) -> bool {
        self.update_npcs.contains_key(&id)
    }

    pub fn has_weapon_update(&self, id: EntityId) -> bool {
        self.update_weapons.contains_key(&id)
    }

    // Snapshots decouple iteration from mutation: a handler unregistering
    // entities mid-pass can never skip or revisit unrelated members.

    pub fn timer_snapshot(&self) -> Vec<ScriptObject> {
        self.timer_npcs.values().cloned().collect()
    }

    pub fn update_snapshot(&self) -> Vec<ScriptObject> {
        self.update_npcs.values().cloned().collect()
    }

    pub fn weapon_snapshot(&self) -> Vec<ScriptObject> {
        self.update_weapons.values().cloned().collect()
    }

    pub fn counts(&self) -> (usize, usize, usize) {
        (self.timer_npcs.len(), self.update_npcs.len(), self.update_weapons.len())
    }

    pub fn clear(&mut self) {
        self.timer_npcs.clear();
        self.update_npcs.clear();
        self.update_weapons.clear();
    }
}
