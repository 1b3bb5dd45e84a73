use std::collections::HashMap;

use tracing::debug;

use crate::env::{CompiledUnit, ScriptEnv};
use crate::error::ScriptError;

struct CacheEntry {
    unit: CompiledUnit,
    refs: usize,
}

/// Deduplicates compilation of identical source. The cache key is the exact
/// wrapped source text; no normalization is applied. Each entry carries the
/// cache's own reference count, independent of the clones held by callback
/// slots, so evicting a live callback's source never invalidates the slot.
#[derive(Default)]
pub struct CompileCache {
    entries: HashMap<String, CacheEntry>,
}

impl CompileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached unit for `source` (bumping its reference count) or
    /// compiles it through the environment. Failed compiles are never cached.
    pub fn compile(
        &mut self,
        env: &mut ScriptEnv,
        source: &str,
        should_cache: bool,
    ) -> Result<CompiledUnit, ScriptError> {
        if should_cache {
            if let Some(entry) = self.entries.get_mut(source) {
                entry.refs += 1;
                debug!(
                    unit = entry.unit.unit_id(),
                    refs = entry.refs,
                    "compile cache hit"
                );
                return Ok(entry.unit.clone());
            }
        }
        let unit = env.compile(source)?;
        if should_cache {
            self.entries.insert(source.to_string(), CacheEntry { unit: unit.clone(), refs: 1 });
        }
        Ok(unit)
    }

    /// Drops one cache reference for `source`, removing the entry when the
    /// count reaches zero. Returns whether anything was dropped.
    pub fn evict(&mut self, source: &str) -> bool {
        match self.entries.get_mut(source) {
            Some(entry) => {
                entry.refs -= 1;
                if entry.refs == 0 {
                    self.entries.remove(source);
                }
                true
            }
            None => false,
        }
    }

    pub fn refs(&self, source: &str) -> Option<usize> {
        self.entries.get(source).map(|entry| entry.refs)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
