use std::fmt;

use rhai::{Dynamic, Map};

/// Identity of a scripted entity as seen by the engine. The owning subsystem
/// (NPC/weapon/player management) allocates these and must unregister an
/// entity before destroying it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

impl EntityId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Runner,
    Npc,
    Player,
    Weapon,
}

impl EntityKind {
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Runner => "runner",
            EntityKind::Npc => "npc",
            EntityKind::Player => "player",
            EntityKind::Weapon => "weapon",
        }
    }
}

/// Native entity wrapped for the script environment: an object map shared
/// between the host and every scope it is handed to, so property writes made
/// by handlers remain visible to the host afterwards.
#[derive(Clone)]
pub struct ScriptObject {
    id: EntityId,
    kind: EntityKind,
    data: Dynamic,
}

impl ScriptObject {
    pub fn new(kind: EntityKind, id: EntityId) -> Self {
        Self { id, kind, data: Dynamic::from(Map::new()).into_shared() }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Shared handle suitable for pushing into a script scope.
    pub fn handle(&self) -> Dynamic {
        self.data.clone()
    }

    pub fn set(&self, key: &str, value: impl Into<Dynamic>) {
        // write_lock needs a mutable handle; clones of a shared Dynamic all
        // point at the same map, so locking a local clone writes through.
        let mut data = self.data.clone();
        if let Some(mut map) = data.write_lock::<Map>() {
            map.insert(key.into(), value.into());
        };
    }

    pub fn get(&self, key: &str) -> Option<Dynamic> {
        self.data.read_lock::<Map>().and_then(|map| map.get(key).cloned())
    }
}

impl fmt::Debug for ScriptObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptObject")
            .field("id", &self.id)
            .field("kind", &self.kind.label())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_handle_sees_host_properties() {
        let object = ScriptObject::new(EntityKind::Npc, EntityId::new(3));
        object.set("hearts", 3_i64);
        let clone = object.clone();
        assert_eq!(clone.get("hearts").and_then(|v| v.as_int().ok()), Some(3));
        assert!(object.get("missing").is_none());
    }

    #[test]
    fn set_through_shared_reference_overwrites_in_place() {
        let object = ScriptObject::new(EntityKind::Weapon, EntityId::new(4));
        let clone = object.clone();
        object.set("x", 5_i64);
        clone.set("x", 9_i64);
        assert_eq!(object.get("x").and_then(|v| v.as_int().ok()), Some(9));
    }
}
