use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use rhai::{Dynamic, Engine, EvalAltResult, Scope, AST};
use smallvec::SmallVec;
use tracing::debug;

use crate::error::{ScriptError, ScriptRunError};

static NEXT_UNIT_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque handle to a compiled callable. Shared by the compile cache and any
/// callback slots that reference it; cloning is cheap and the underlying AST
/// lives until the last handle is dropped.
#[derive(Clone)]
pub struct CompiledUnit {
    inner: Arc<UnitInner>,
}

struct UnitInner {
    id: u64,
    ast: AST,
    fingerprint: blake3::Hash,
}

impl CompiledUnit {
    fn new(ast: AST, source: &str) -> Self {
        Self {
            inner: Arc::new(UnitInner {
                id: NEXT_UNIT_ID.fetch_add(1, Ordering::Relaxed),
                ast,
                fingerprint: blake3::hash(source.as_bytes()),
            }),
        }
    }

    pub fn unit_id(&self) -> u64 {
        self.inner.id
    }

    /// blake3 hash of the exact wrapped source this unit was compiled from.
    pub fn fingerprint(&self) -> blake3::Hash {
        self.inner.fingerprint
    }

    /// Short fingerprint prefix for log lines.
    pub fn fingerprint_hex(&self) -> String {
        self.inner.fingerprint.to_hex()[..12].to_string()
    }

    pub fn same_unit(&self, other: &CompiledUnit) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn ast(&self) -> &AST {
        &self.inner.ast
    }
}

impl std::fmt::Debug for CompiledUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledUnit")
            .field("id", &self.inner.id)
            .field("fingerprint", &self.fingerprint_hex())
            .finish()
    }
}

/// Named values bound into the scope of a single invocation. This is the
/// argument-marshalling facility of the script environment: call sites build
/// a bundle once and the environment turns it into scope bindings.
#[derive(Debug, Clone, Default)]
pub struct ScriptArgs {
    values: SmallVec<[(String, Dynamic); 4]>,
}

impl ScriptArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Dynamic>) -> Self {
        self.values.push((name.into(), value.into()));
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &(String, Dynamic)> {
        self.values.iter()
    }
}

/// Handle through which the watchdog requests interruption of the call
/// currently inside the evaluator. The request is cooperative: the engine's
/// progress hook observes the flag at its next check and terminates the call
/// from inside the interpreter.
#[derive(Clone, Default)]
pub struct InterruptHandle {
    flag: Arc<AtomicBool>,
}

impl InterruptHandle {
    pub fn request(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    pub(crate) fn clear(&self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// The script environment: owns the rhai engine, the interrupt flag polled by
/// its progress hook, and the last error raised by a compile or a call.
/// Everything here runs on the worker thread; only `InterruptHandle` crosses
/// to the watchdog.
pub struct ScriptEnv {
    engine: Engine,
    interrupt: InterruptHandle,
    last_error: ScriptRunError,
}

impl ScriptEnv {
    pub fn new() -> Self {
        let interrupt = InterruptHandle::default();
        let mut engine = Engine::new();
        engine.set_fast_operators(true);
        let flag = interrupt.clone();
        engine.on_progress(move |_| {
            if flag.is_requested() {
                Some(Dynamic::from("watchdog interrupt"))
            } else {
                None
            }
        });
        Self { engine, interrupt, last_error: ScriptRunError::default() }
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    pub fn last_error(&self) -> &ScriptRunError {
        &self.last_error
    }

    pub fn compile(&mut self, source: &str) -> Result<CompiledUnit, ScriptError> {
        match self.engine.compile(source) {
            Ok(ast) => {
                let unit = CompiledUnit::new(ast, source);
                debug!(unit = unit.unit_id(), fingerprint = %unit.fingerprint_hex(), "compiled script");
                Ok(unit)
            }
            Err(err) => {
                let message = err.to_string();
                self.last_error =
                    ScriptRunError::record(message.clone(), err.1.line(), err.1.position());
                Err(ScriptError::Compile(message))
            }
        }
    }

    /// Runs a compiled unit with the bundle bound into a fresh scope. A
    /// pending interrupt request is always cleared first so a flag raised
    /// just as the previous call finished cannot kill this one.
    pub fn invoke(
        &mut self,
        unit: &CompiledUnit,
        args: &ScriptArgs,
    ) -> Result<Dynamic, ScriptError> {
        self.interrupt.clear();
        let mut scope = Scope::new();
        for (name, value) in args.iter() {
            scope.push_dynamic(name.as_str(), value.clone());
        }
        match self.engine.eval_ast_with_scope::<Dynamic>(&mut scope, unit.ast()) {
            Ok(value) => Ok(value),
            Err(err) => {
                let message = err.to_string();
                if matches!(*err, EvalAltResult::ErrorTerminated(..)) {
                    self.last_error = ScriptRunError::record_timeout(message.clone());
                    Err(ScriptError::Timeout(message))
                } else {
                    let pos = err.position();
                    self.last_error =
                        ScriptRunError::record(message.clone(), pos.line(), pos.position());
                    Err(ScriptError::Invocation(message))
                }
            }
        }
    }
}

impl Default for ScriptEnv {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_failure_records_run_error() {
        let mut env = ScriptEnv::new();
        let err = env.compile("let = ;").expect_err("malformed source must not compile");
        assert!(matches!(err, ScriptError::Compile(_)));
        assert!(!env.last_error().is_empty());
        assert!(!env.last_error().timed_out);
    }

    #[test]
    fn fingerprint_tracks_source_text() {
        let mut env = ScriptEnv::new();
        let a = env.compile("1 + 1").expect("compile");
        let b = env.compile("1 + 1").expect("compile");
        let c = env.compile("2 + 2").expect("compile");
        assert!(!a.same_unit(&b), "separate compiles are distinct units");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn invoke_binds_argument_bundle() {
        let mut env = ScriptEnv::new();
        let unit = env.compile("a + b").expect("compile");
        let args = ScriptArgs::new().with("a", 2_i64).with("b", 3_i64);
        let value = env.invoke(&unit, &args).expect("invoke");
        assert_eq!(value.as_int().expect("int result"), 5);
    }

    #[test]
    fn runtime_failure_is_invocation_not_timeout() {
        let mut env = ScriptEnv::new();
        let unit = env.compile("missing_fn()").expect("compile");
        let err = env.invoke(&unit, &ScriptArgs::new()).expect_err("call must fail");
        assert!(matches!(err, ScriptError::Invocation(_)));
        assert!(!env.last_error().timed_out);
    }

    #[test]
    fn interrupt_request_terminates_spinning_call() {
        let mut env = ScriptEnv::new();
        let unit = env.compile("let x = 0; while true { x += 1; }").expect("compile");
        let handle = env.interrupt_handle();
        let requester = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(50));
            handle.request();
        });
        let err = env.invoke(&unit, &ScriptArgs::new()).expect_err("spin must be terminated");
        assert!(err.is_timeout());
        assert!(env.last_error().timed_out);
        requester.join().expect("requester thread");
    }

    #[test]
    fn stale_interrupt_request_does_not_kill_next_call() {
        let mut env = ScriptEnv::new();
        env.interrupt_handle().request();
        let unit = env.compile("41 + 1").expect("compile");
        let value = env.invoke(&unit, &ScriptArgs::new()).expect("stale flag must be cleared");
        assert_eq!(value.as_int().expect("int result"), 42);
    }
}
