use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Tunables for the script engine. The watchdog constants bound how long a
/// single script call may run before the environment is asked to interrupt
/// it; the poll interval controls how often the watchdog wakes to check.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptConfig {
    #[serde(default = "ScriptConfig::default_watchdog_timeout_ms")]
    pub watchdog_timeout_ms: u64,
    #[serde(default = "ScriptConfig::default_watchdog_poll_ms")]
    pub watchdog_poll_ms: u64,
    /// Replaces the built-in bootstrap source when set.
    #[serde(default)]
    pub bootstrap: Option<String>,
}

impl ScriptConfig {
    fn default_watchdog_timeout_ms() -> u64 {
        5000
    }

    fn default_watchdog_poll_ms() -> u64 {
        250
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read script config {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse script config {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::warn!("script config load error: {err:?}; falling back to defaults");
                Self::default()
            }
        }
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_millis(self.watchdog_timeout_ms)
    }

    pub fn watchdog_poll_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_poll_ms)
    }
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            watchdog_timeout_ms: Self::default_watchdog_timeout_ms(),
            watchdog_poll_ms: Self::default_watchdog_poll_ms(),
            bootstrap: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply_to_missing_fields() {
        let cfg: ScriptConfig = serde_json::from_str("{}").expect("empty config should parse");
        assert_eq!(cfg.watchdog_timeout_ms, 5000);
        assert_eq!(cfg.watchdog_poll_ms, 250);
        assert!(cfg.bootstrap.is_none());
    }

    #[test]
    fn load_or_default_falls_back_on_bad_file() {
        let mut temp = tempfile::NamedTempFile::new().expect("temp config");
        write!(temp, "not json").expect("write config");
        let cfg = ScriptConfig::load_or_default(temp.path());
        assert_eq!(cfg.watchdog_timeout_ms, 5000);
    }

    #[test]
    fn load_reads_overrides() {
        let mut temp = tempfile::NamedTempFile::new().expect("temp config");
        write!(temp, r#"{{"watchdog_timeout_ms": 750, "watchdog_poll_ms": 50}}"#)
            .expect("write config");
        let cfg = ScriptConfig::load(temp.path()).expect("config should parse");
        assert_eq!(cfg.watchdog_timeout(), Duration::from_millis(750));
        assert_eq!(cfg.watchdog_poll_interval(), Duration::from_millis(50));
    }
}
