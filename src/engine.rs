use std::sync::Arc;

use rhai::Dynamic;
use tracing::{debug, error, warn};

use crate::action::{build_action, ScriptAction};
use crate::cache::CompileCache;
use crate::callbacks::CallbackRegistry;
use crate::config::ScriptConfig;
use crate::env::{CompiledUnit, ScriptArgs, ScriptEnv};
use crate::error::{ScriptError, ScriptRunError};
use crate::object::{EntityId, EntityKind, ScriptObject};
use crate::registry::PeriodicRegistries;
use crate::watchdog::{ExecutionBracket, Watchdog};
use crate::wrap::wrap_script;

/// Global setup code run once per successful initialize, with the wrapped
/// runner object bound into scope.
const DEFAULT_BOOTSTRAP: &str = "let server = runner;\nserver.booted = true;\n";

/// Façade owning the script environment and every lifecycle/scheduling
/// structure around it. All mutation happens on the worker thread that owns
/// this value; the watchdog thread shares only the execution bracket and the
/// environment's interrupt handle.
pub struct ScriptEngine {
    config: ScriptConfig,
    watchdog: Option<Watchdog>,
    env: Option<ScriptEnv>,
    cache: CompileCache,
    callbacks: CallbackRegistry,
    registries: PeriodicRegistries,
    bracket: Arc<ExecutionBracket>,
    bootstrap: Option<CompiledUnit>,
    runner: Option<ScriptObject>,
    initialized: bool,
}

impl ScriptEngine {
    pub fn new(config: ScriptConfig) -> Self {
        Self {
            config,
            watchdog: None,
            env: None,
            cache: CompileCache::new(),
            callbacks: CallbackRegistry::new(),
            registries: PeriodicRegistries::new(),
            bracket: Arc::new(ExecutionBracket::new()),
            bootstrap: None,
            runner: None,
            initialized: false,
        }
    }

    /// Constructs the script environment, runs the bootstrap unit with the
    /// wrapped runner object in scope, and starts the watchdog. On failure
    /// the engine stays uninitialized (the error is retrievable through
    /// `script_error`) and `cleanup` remains safe to call.
    pub fn initialize(&mut self) -> bool {
        if self.initialized {
            return true;
        }
        let mut env = ScriptEnv::new();
        let runner = ScriptObject::new(EntityKind::Runner, EntityId::new(0));
        let source =
            self.config.bootstrap.clone().unwrap_or_else(|| DEFAULT_BOOTSTRAP.to_string());
        let unit = match env.compile(&source) {
            Ok(unit) => unit,
            Err(err) => {
                error!(%err, "bootstrap compilation failed");
                self.env = Some(env);
                return false;
            }
        };
        let args = ScriptArgs::new().with(EntityKind::Runner.param(), runner.handle());
        if let Err(err) = env.invoke(&unit, &args) {
            error!(%err, "bootstrap execution failed");
            self.env = Some(env);
            return false;
        }
        let watchdog = match Watchdog::spawn(
            Arc::clone(&self.bracket),
            env.interrupt_handle(),
            self.config.watchdog_timeout(),
            self.config.watchdog_poll_interval(),
        ) {
            Ok(watchdog) => watchdog,
            Err(err) => {
                error!(%err, "watchdog spawn failed");
                self.env = Some(env);
                return false;
            }
        };
        self.env = Some(env);
        self.bootstrap = Some(unit);
        self.runner = Some(runner);
        self.watchdog = Some(watchdog);
        self.initialized = true;
        debug!("script engine initialized");
        true
    }

    /// Stops and joins the watchdog, flushes deferred deletions (safe now:
    /// the bracket is necessarily closed), and drops every compiled unit
    /// together with the environment and the wrapped runner.
    pub fn cleanup(&mut self, shut_down: bool) {
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.stop();
        }
        self.callbacks.clear();
        self.callbacks.flush_pending();
        self.cache.clear();
        self.registries.clear();
        self.bootstrap = None;
        self.runner = None;
        self.env = None;
        self.initialized = false;
        debug!(shut_down, "script engine cleaned up");
    }

    /// One engine cycle: flush deferred deletions when provably idle, then
    /// walk each periodic registry on a snapshot of its membership.
    /// `timed_call` reaches handlers as context only.
    pub fn run_scripts(&mut self, timed_call: bool) {
        if !self.initialized {
            return;
        }
        if !self.bracket.is_running() {
            self.callbacks.flush_pending();
        }
        for npc in self.registries.timer_snapshot() {
            if !self.registries.has_npc_timer(npc.id()) {
                continue;
            }
            self.execute_entity(&npc, timed_call);
        }
        for npc in self.registries.update_snapshot() {
            if !self.registries.has_npc_update(npc.id()) {
                continue;
            }
            self.execute_entity(&npc, timed_call);
        }
        for weapon in self.registries.weapon_snapshot() {
            if !self.registries.has_weapon_update(weapon.id()) {
                continue;
            }
            self.execute_entity(&weapon, timed_call);
        }
    }

    pub fn execute_npc(&mut self, npc: &ScriptObject) -> bool {
        self.execute_entity(npc, false)
    }

    pub fn execute_weapon(&mut self, weapon: &ScriptObject) -> bool {
        self.execute_entity(weapon, false)
    }

    fn execute_entity(&mut self, object: &ScriptObject, timed_call: bool) -> bool {
        let Some(event) = object.kind().execute_event() else {
            debug!(kind = object.kind().label(), "entity kind has no periodic event");
            return false;
        };
        let args = ScriptArgs::new()
            .with(object.kind().param(), object.handle())
            .with("timedCall", timed_call);
        self.execute_event(event, args).is_some()
    }

    /// Bracketed invocation of the callback registered under `name`. Returns
    /// the call's value, or `None` when no callback is registered (the error
    /// view is left untouched) or when the call failed (detail retrievable
    /// through `script_error`). Failures never unwind past this point.
    pub fn execute_event(&mut self, name: &str, args: ScriptArgs) -> Option<Dynamic> {
        let unit = self.callbacks.get(name)?.clone();
        self.invoke_bracketed(&unit, &args, name)
    }

    pub fn execute_action(&mut self, action: &ScriptAction) -> bool {
        self.invoke_bracketed(action.unit(), action.args(), action.name()).is_some()
    }

    fn invoke_bracketed(
        &mut self,
        unit: &CompiledUnit,
        args: &ScriptArgs,
        name: &str,
    ) -> Option<Dynamic> {
        let env = self.env.as_mut()?;
        let _guard = self.bracket.begin();
        match env.invoke(unit, args) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(callback = %name, %err, "script call failed");
                None
            }
        }
    }

    /// Wraps `source` for `kind` and compiles it through the cache.
    pub fn compile_cached(
        &mut self,
        kind: EntityKind,
        source: &str,
        should_cache: bool,
    ) -> Result<CompiledUnit, ScriptError> {
        let env = self
            .env
            .as_mut()
            .ok_or_else(|| ScriptError::Lifecycle("script engine not initialized".into()))?;
        let wrapped = wrap_script(kind, source);
        self.cache.compile(env, &wrapped, should_cache)
    }

    pub fn clear_cache(&mut self, kind: EntityKind, source: &str) -> bool {
        self.cache.evict(&wrap_script(kind, source))
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn set_callback(&mut self, name: impl Into<String>, unit: CompiledUnit) {
        self.callbacks.set(name, unit);
    }

    pub fn remove_callback(&mut self, name: &str) {
        self.callbacks.remove(name);
    }

    pub fn get_callback(&self, name: &str) -> Option<&CompiledUnit> {
        self.callbacks.get(name)
    }

    pub fn pending_deletions(&self) -> usize {
        self.callbacks.pending_len()
    }

    pub fn create_action(&self, name: &str, args: ScriptArgs) -> Option<ScriptAction> {
        build_action(&self.callbacks, name, args)
    }

    pub fn register_npc_timer(&mut self, npc: &ScriptObject) {
        self.registries.register_npc_timer(npc);
    }

    pub fn unregister_npc_timer(&mut self, id: EntityId) {
        self.registries.unregister_npc_timer(id);
    }

    pub fn register_npc_update(&mut self, npc: &ScriptObject) {
        self.registries.register_npc_update(npc);
    }

    pub fn unregister_npc_update(&mut self, id: EntityId) {
        self.registries.unregister_npc_update(id);
    }

    pub fn register_weapon_update(&mut self, weapon: &ScriptObject) {
        self.registries.register_weapon_update(weapon);
    }

    pub fn unregister_weapon_update(&mut self, id: EntityId) {
        self.registries.unregister_weapon_update(id);
    }

    pub fn registries(&self) -> &PeriodicRegistries {
        &self.registries
    }

    /// Last error reported by the script environment, if it exists yet.
    pub fn script_error(&self) -> Option<&ScriptRunError> {
        self.env.as_ref().map(|env| env.last_error())
    }

    pub fn runner_object(&self) -> Option<&ScriptObject> {
        self.runner.as_ref()
    }

    pub fn script_env(&self) -> Option<&ScriptEnv> {
        self.env.as_ref()
    }

    pub fn wrap_object(&self, kind: EntityKind, id: EntityId) -> ScriptObject {
        ScriptObject::new(kind, id)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}
