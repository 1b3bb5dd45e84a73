use tracing::debug;

use crate::callbacks::CallbackRegistry;
use crate::env::{CompiledUnit, ScriptArgs};

/// A deferred invocation request: the resolved callback, its argument bundle,
/// and the event name it was built for. Building one never executes anything;
/// the caller decides when to run it through the bracketed execution path.
#[derive(Debug, Clone)]
pub struct ScriptAction {
    unit: CompiledUnit,
    args: ScriptArgs,
    name: String,
}

impl ScriptAction {
    pub fn unit(&self) -> &CompiledUnit {
        &self.unit
    }

    pub fn args(&self) -> &ScriptArgs {
        &self.args
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Resolves `name` in the callback registry and packages it with `args`.
/// Returns `None` when no callback is registered; that is a normal
/// nothing-to-do outcome, not an error.
pub fn build_action(
    registry: &CallbackRegistry,
    name: &str,
    args: ScriptArgs,
) -> Option<ScriptAction> {
    let unit = match registry.get(name) {
        Some(unit) => unit.clone(),
        None => {
            debug!(callback = %name, "no callback registered for action");
            return None;
        }
    };
    debug!(callback = %name, unit = unit.unit_id(), argc = args.len(), "action built");
    Some(ScriptAction { unit, args, name: name.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::ScriptEnv;

    #[test]
    fn build_resolves_registered_callback() {
        let mut env = ScriptEnv::new();
        let mut registry = CallbackRegistry::new();
        let unit = env.compile("n * 2").expect("compile");
        registry.set("onDoubled", unit.clone());

        let action = build_action(&registry, "onDoubled", ScriptArgs::new().with("n", 21_i64))
            .expect("action for registered callback");
        assert_eq!(action.name(), "onDoubled");
        assert!(action.unit().same_unit(&unit));
        assert_eq!(action.args().len(), 1);

        // Building did not execute; the unit still runs on demand.
        let value = env.invoke(action.unit(), action.args()).expect("deferred run");
        assert_eq!(value.as_int().expect("int result"), 42);
    }

    #[test]
    fn build_returns_none_for_unregistered_event() {
        let registry = CallbackRegistry::new();
        assert!(build_action(&registry, "onMissing", ScriptArgs::new()).is_none());
    }
}
