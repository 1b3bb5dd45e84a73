use std::time::{Duration, Instant};

use merlin_server::{EntityId, EntityKind, ScriptConfig, ScriptEngine};

#[test]
fn spinning_handler_is_interrupted_within_the_watchdog_bound() {
    let mut engine = ScriptEngine::new(ScriptConfig {
        watchdog_timeout_ms: 150,
        watchdog_poll_ms: 40,
        bootstrap: None,
    });
    assert!(engine.initialize());

    let unit = engine
        .compile_cached(EntityKind::Npc, "while true { }", false)
        .expect("spin script compiles");
    engine.set_callback("onTimeout", unit);
    let npc = engine.wrap_object(EntityKind::Npc, EntityId::new(1));

    let started = Instant::now();
    let ok = engine.execute_npc(&npc);
    let elapsed = started.elapsed();

    assert!(!ok, "interrupted call must report failure");
    let error = engine.script_error().expect("error view exists");
    assert!(error.timed_out, "failure must be timeout-flavored: {error}");
    // Bound: timeout + polling interval, with generous scheduling slack.
    assert!(
        elapsed < Duration::from_secs(3),
        "interrupt took too long: {elapsed:?}"
    );

    // The engine survives the interruption and runs well-behaved scripts.
    let fine = engine
        .compile_cached(EntityKind::Npc, "me.ok = true;", false)
        .expect("follow-up script compiles");
    engine.set_callback("onTimeout", fine);
    assert!(engine.execute_npc(&npc));
    assert_eq!(npc.get("ok").and_then(|v| v.as_bool().ok()), Some(true));

    engine.cleanup(true);
}

#[test]
fn consecutive_runaway_calls_are_each_interrupted() {
    let mut engine = ScriptEngine::new(ScriptConfig {
        watchdog_timeout_ms: 100,
        watchdog_poll_ms: 50,
        bootstrap: None,
    });
    assert!(engine.initialize());

    let unit = engine
        .compile_cached(EntityKind::Npc, "while true { }", false)
        .expect("spin script compiles");
    engine.set_callback("onTimeout", unit);
    let npc = engine.wrap_object(EntityKind::Npc, EntityId::new(3));

    // Back-to-back runaways reopen the bracket faster than the watchdog
    // polls; each one must still be bounded.
    for pass in 0..2 {
        let started = Instant::now();
        assert!(!engine.execute_npc(&npc), "runaway call must fail (pass {pass})");
        let error = engine.script_error().expect("error view exists");
        assert!(error.timed_out, "pass {pass} must be timeout-flavored: {error}");
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "watchdog did not re-arm for pass {pass}"
        );
    }
    engine.cleanup(true);
}

#[test]
fn well_behaved_scripts_are_never_interrupted() {
    let mut engine = ScriptEngine::new(ScriptConfig {
        watchdog_timeout_ms: 200,
        watchdog_poll_ms: 40,
        bootstrap: None,
    });
    assert!(engine.initialize());

    let unit = engine
        .compile_cached(EntityKind::Npc, "me.count = 0; me.count += 1;", false)
        .expect("script compiles");
    engine.set_callback("onTimeout", unit);
    let npc = engine.wrap_object(EntityKind::Npc, EntityId::new(2));

    for _ in 0..20 {
        assert!(engine.execute_npc(&npc));
    }
    engine.cleanup(true);
}
