pub mod action;
pub mod cache;
pub mod callbacks;
pub mod config;
pub mod engine;
pub mod env;
pub mod error;
pub mod object;
pub mod registry;
pub mod watchdog;
pub mod wrap;

pub use config::ScriptConfig;
pub use engine::ScriptEngine;
pub use env::{CompiledUnit, ScriptArgs};
pub use error::{ScriptError, ScriptRunError};
pub use object::{EntityId, EntityKind, ScriptObject};
