//! # Frame Synchronization Integration Test
//!
//! Runs both loops for real against the headless collaborators and checks
//! the recorded trace for the handshake's ordering guarantees.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tandem_engine::headless::{
    HeadlessRenderLog, HeadlessRendererFactory, HeadlessWindowManager, StaticSceneProvider,
    WindowWatch,
};
use tandem_engine::trace::{frame_releases, states_of};
use tandem_engine::{
    ApplicationState, CollaboratorError, Collaborators, ContextKind, ContextRegistry, Engine,
    EngineConfig, EngineError, HandshakeError, Machine, RendererKind, RendererState, Scene,
    Signal, SignalAction, TraceEvent, TraceReceiver,
};

struct Harness {
    engine: Engine,
    watch: WindowWatch,
    log: Arc<HeadlessRenderLog>,
    trace: TraceReceiver,
    registry: Arc<ContextRegistry>,
}

fn harness(
    config: EngineConfig,
    manager: HeadlessWindowManager,
    factory: HeadlessRendererFactory,
    scene: Arc<StaticSceneProvider>,
) -> Harness {
    let registry = ContextRegistry::new();
    let (trace, receiver) = tandem_engine::FrameTrace::channel();
    let watch = manager.watch();
    let log = factory.log();
    let engine = Engine::builder(config)
        .registry(Arc::clone(&registry))
        .trace(trace)
        .build(Collaborators {
            window_manager: Box::new(manager),
            renderer_factory: Arc::new(factory),
            scene_provider: scene,
        })
        .unwrap();
    Harness {
        engine,
        watch,
        log,
        trace: receiver,
        registry,
    }
}

fn arena() -> Arc<StaticSceneProvider> {
    Arc::new(StaticSceneProvider::new(Scene {
        name: "arena".into(),
        entity_count: 64,
        ..Scene::default()
    }))
}

fn closing_after(polls: u64) -> Harness {
    harness(
        EngineConfig::default(),
        HeadlessWindowManager::new().close_after_polls(polls),
        HeadlessRendererFactory::new(),
        arena(),
    )
}

fn position(events: &[TraceEvent], wanted: &TraceEvent) -> usize {
    events
        .iter()
        .position(|event| event == wanted)
        .unwrap_or_else(|| panic!("{wanted:?} not in trace"))
}

fn entered(machine: Machine, state: &'static str) -> TraceEvent {
    TraceEvent::Entered { machine, state }
}

/// Waits up to five seconds for `condition`.
fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    false
}

// ============================================================================
// ORDERING
// ============================================================================

/// Test: begin/complete releases strictly alternate, starting with begin.
#[test]
fn test_alternation_over_many_frames() {
    let h = closing_after(200);
    let report = h.engine.run().unwrap();
    let events = h.trace.drain();

    let releases = frame_releases(&events);
    assert_eq!(releases.first(), Some(&Signal::RenderBegin));
    for pair in releases.windows(2) {
        assert_ne!(pair[0], pair[1], "two consecutive {} releases", pair[0]);
    }

    let begins = releases.iter().filter(|s| **s == Signal::RenderBegin).count();
    let completes = releases.len() - begins;
    assert!(begins - completes <= 1);
    assert!((200..=201).contains(&report.frames), "frames = {}", report.frames);
    assert_eq!(report.frames, report.renderer_frames);
    assert_eq!(report.stats.frames_recorded, report.frames);
}

/// Test: one frame visits the states in the documented order.
#[test]
fn test_scenario_a_single_frame_order() {
    let h = closing_after(3);
    h.engine.run().unwrap();
    let events = h.trace.drain();

    let app = states_of(&events, Machine::Application);
    assert_eq!(
        &app[..12],
        &[
            "Initialize",
            "Start",
            "Ready",
            "Resume",
            "FrameBegin",
            "WaitRenderer",
            "FrameEnd",
            "SignalHandle",
            "Pause",
            "Resume",
            "FrameBegin",
            "WaitRenderer",
        ]
    );

    let renderer = states_of(&events, Machine::Renderer);
    assert_eq!(
        &renderer[..19],
        &[
            "Initialize",
            "Start",
            "Ready",
            "WaitFrameBegin",
            // First frame: no present target yet.
            "ValidatePipeline",
            "DestroyPipeline",
            "DestroyRenderTarget",
            "CreateRenderTarget",
            "CreatePipeline",
            "WaitECS",
            "BlockECS",
            "PerformPipeline",
            "ReleaseECS",
            "FrameEnd",
            "SignalHandle",
            "WaitFrameBegin",
            // Second frame: target still valid.
            "ValidatePipeline",
            "WaitECS",
            "BlockECS",
        ]
    );

    // The application finishes frame 1 only after the renderer performed it.
    let performed = position(&events, &entered(Machine::Renderer, "PerformPipeline"));
    let finished = position(&events, &entered(Machine::Application, "FrameEnd"));
    assert!(performed < finished);
}

/// Test: renderer_ready is released before the application leaves Start.
#[test]
fn test_startup_ordering() {
    let h = closing_after(1);
    h.engine.run().unwrap();
    let events = h.trace.drain();

    let ready = position(
        &events,
        &TraceEvent::Signal {
            kind: Signal::RendererReady,
            action: SignalAction::Released,
        },
    );
    let acquired = position(
        &events,
        &TraceEvent::Signal {
            kind: Signal::RendererReady,
            action: SignalAction::Acquired,
        },
    );
    let app_ready = position(&events, &entered(Machine::Application, "Ready"));
    let first_begin = position(
        &events,
        &TraceEvent::Signal {
            kind: Signal::RenderBegin,
            action: SignalAction::Released,
        },
    );
    assert!(ready < acquired);
    assert!(acquired < app_ready);
    assert!(app_ready < first_begin);
    assert_eq!(h.log.renderers_created(), 1);
}

/// Test: the scene published at FrameBegin is the one the renderer draws.
#[test]
fn test_renderer_draws_published_snapshot() {
    let scene = arena();
    let h = harness(
        EngineConfig::default(),
        HeadlessWindowManager::new().close_after_polls(20),
        HeadlessRendererFactory::new(),
        Arc::clone(&scene),
    );
    let report = h.engine.run().unwrap();

    assert_eq!(h.log.last_generation(), report.renderer_frames);
    assert_eq!(h.log.last_revision(), report.renderer_frames);
    assert!(scene.revisions() >= report.renderer_frames);
    assert_eq!(h.log.empty_frames(), 0);
}

/// Test: a provider with no scene still drives frames.
#[test]
fn test_frames_without_scene() {
    let h = harness(
        EngineConfig::default(),
        HeadlessWindowManager::new().close_after_polls(5),
        HeadlessRendererFactory::new(),
        Arc::new(StaticSceneProvider::empty()),
    );
    let report = h.engine.run().unwrap();
    assert_eq!(h.log.empty_frames(), report.renderer_frames);
    assert_eq!(h.log.last_revision(), 0);
}

// ============================================================================
// SHUTDOWN
// ============================================================================

/// Test: both machines reach Destroy, renderer first.
#[test]
fn test_scenario_b_shutdown_ordering() {
    let h = closing_after(10);
    let app = Arc::clone(h.engine.app_context());
    let render = Arc::clone(h.engine.render_context());

    let report = h.engine.run().unwrap();
    let events = h.trace.drain();

    assert_eq!(report.application.final_state, ApplicationState::Destroy);
    assert_eq!(report.renderer.unwrap().final_state, RendererState::Destroy);

    let renderer_destroy = position(&events, &entered(Machine::Renderer, "Destroy"));
    let app_stop = position(&events, &entered(Machine::Application, "Stop"));
    let app_destroy = position(&events, &entered(Machine::Application, "Destroy"));
    assert!(app_stop < app_destroy);
    assert!(renderer_destroy < app_destroy);

    assert!(h.watch.main_window().unwrap().is_visible());
    assert!(!app.is_alive());
    assert!(!render.is_alive());
    assert!(render.handshake().is_closed());
    assert!(!render.has_renderer());
    assert_eq!(h.log.cleanups(), 1);

    drop((app, render));
    assert!(!h.registry.is_claimed(ContextKind::Application));
    assert!(!h.registry.is_claimed(ContextKind::Render));
}

/// Test: an external shutdown stops both loops and still releases the device.
#[test]
fn test_external_shutdown() {
    let h = harness(
        EngineConfig::default(),
        HeadlessWindowManager::new(),
        HeadlessRendererFactory::new(),
        arena(),
    );
    let app = Arc::clone(h.engine.app_context());
    let running = h.engine.spawn().unwrap();

    assert!(eventually(|| app.frames() >= 5));
    running.shutdown();
    let report = running.join().unwrap();

    assert!(report.frames >= 5);
    assert!(report.renderer.is_some());
    assert_eq!(h.log.cleanups(), 1);
}

/// Test: the window closing by itself (no poll schedule) is observed.
#[test]
fn test_close_from_another_thread() {
    let h = harness(
        EngineConfig::default(),
        HeadlessWindowManager::new(),
        HeadlessRendererFactory::new(),
        arena(),
    );
    let app = Arc::clone(h.engine.app_context());
    let running = h.engine.spawn().unwrap();

    assert!(eventually(|| app.frames() >= 3));
    h.watch.request_close();
    let report = running.join().unwrap();

    assert_eq!(report.application.final_state, ApplicationState::Destroy);
    assert_eq!(report.renderer.unwrap().final_state, RendererState::Destroy);
}

// ============================================================================
// PIPELINE REBUILD
// ============================================================================

/// Test: an invalid present target triggers the rebuild chain, which rejoins at WaitECS.
#[test]
fn test_scenario_c_pipeline_invalidation() {
    let h = harness(
        EngineConfig::default(),
        HeadlessWindowManager::new().close_after_polls(12),
        HeadlessRendererFactory::new().invalidate_every(3),
        arena(),
    );
    let report = h.engine.run().unwrap();
    let renderer = states_of(&h.trace.drain(), Machine::Renderer);

    let rebuilds = renderer.iter().filter(|s| **s == "DestroyPipeline").count() as u64;
    assert!(rebuilds >= 4, "rebuilds = {rebuilds}");
    assert_eq!(rebuilds, h.log.pipelines_created());
    assert_eq!(report.pipeline_builds, h.log.pipelines_created());
    assert_eq!(h.log.targets_created(), h.log.pipelines_created());
    assert_eq!(h.log.pipelines_destroyed(), h.log.pipelines_created() - 1);

    for (i, state) in renderer.iter().enumerate() {
        if *state == "ValidatePipeline" {
            assert!(matches!(renderer[i + 1], "DestroyPipeline" | "WaitECS"));
        }
        if *state == "CreatePipeline" {
            assert_eq!(renderer[i + 1], "WaitECS");
        }
    }
}

// ============================================================================
// FAILURES
// ============================================================================

/// Test: a renderer that cannot be created shuts the engine down instead of deadlocking.
#[test]
fn test_startup_failure_does_not_deadlock() {
    let h = harness(
        EngineConfig::default(),
        HeadlessWindowManager::new(),
        HeadlessRendererFactory::new()
            .failing(CollaboratorError::DeviceCreation("no adapter".into())),
        arena(),
    );
    let err = h.engine.run().unwrap_err();
    assert!(matches!(
        err,
        EngineError::RendererStartup(CollaboratorError::DeviceCreation(_))
    ));

    let events = h.trace.drain();
    assert_eq!(
        states_of(&events, Machine::Application),
        vec!["Initialize", "Start", "Stop", "Destroy"]
    );
    assert_eq!(
        states_of(&events, Machine::Renderer),
        vec!["Initialize", "Stop", "Destroy"]
    );
    assert_eq!(h.log.cleanups(), 0);
}

/// Test: a window manager failure aborts before the renderer is spawned.
#[test]
fn test_window_creation_failure() {
    let h = harness(
        EngineConfig::default(),
        HeadlessWindowManager::new().failing(),
        HeadlessRendererFactory::new(),
        arena(),
    );
    let err = h.engine.run().unwrap_err();
    assert!(matches!(
        err,
        EngineError::Collaborator(CollaboratorError::WindowCreation(_))
    ));
    assert_eq!(h.log.renderers_created(), 0);
    assert!(states_of(&h.trace.drain(), Machine::Renderer).is_empty());
}

/// Test: a stalled renderer is reported after the timeout instead of hanging.
#[test]
fn test_stalled_renderer_times_out() {
    let config = EngineConfig::from_toml_str("[handshake]\ntimeout_ms = 50").unwrap();
    let h = harness(
        config,
        HeadlessWindowManager::new(),
        HeadlessRendererFactory::new().render_delay(Duration::from_millis(500)),
        arena(),
    );

    let started = Instant::now();
    let err = h.engine.run().unwrap_err();
    assert!(started.elapsed() < Duration::from_millis(450));
    assert!(err.is_stall());
    assert!(matches!(
        err,
        EngineError::Handshake(HandshakeError::Stalled {
            signal: Signal::RenderComplete,
            ..
        })
    ));
}

/// Test: a renderer panic closes the handshake and is reported.
#[test]
fn test_renderer_panic_is_reported() {
    let h = harness(
        EngineConfig::default(),
        HeadlessWindowManager::new(),
        HeadlessRendererFactory::new().panic_on_frame(3),
        arena(),
    );
    let render = Arc::clone(h.engine.render_context());

    match h.engine.run() {
        Err(EngineError::RendererPanicked(message)) => assert!(message.contains("frame 3")),
        other => panic!("expected renderer panic, got {other:?}"),
    }
    assert!(render.handshake().is_closed());
    assert_eq!(h.log.frames(), 2);
}

/// Test: a renderer error after startup is reported as a renderer failure.
#[test]
fn test_renderer_error_is_reported() {
    let h = harness(
        EngineConfig::default(),
        HeadlessWindowManager::new(),
        HeadlessRendererFactory::new()
            .fail_on_frame(3, CollaboratorError::Submission("device removed".into())),
        arena(),
    );
    let render = Arc::clone(h.engine.render_context());

    match h.engine.run() {
        Err(EngineError::RendererFailed(inner)) => assert!(matches!(
            *inner,
            EngineError::Collaborator(CollaboratorError::Submission(_))
        )),
        other => panic!("expected renderer failure, got {other:?}"),
    }
    assert!(render.handshake().is_closed());
    assert_eq!(h.log.frames(), 2);
    assert_eq!(h.log.cleanups(), 1);

    let events = h.trace.drain();
    assert_eq!(
        states_of(&events, Machine::Application).last(),
        Some(&"Destroy")
    );
}

/// Test: an application panic releases the renderer and both contexts.
#[test]
fn test_application_panic_releases_renderer() {
    let h = harness(
        EngineConfig::default(),
        HeadlessWindowManager::new().panic_on_poll(3),
        HeadlessRendererFactory::new(),
        arena(),
    );
    let render = Arc::clone(h.engine.render_context());
    let registry = Arc::clone(&h.registry);
    let running = h.engine.spawn().unwrap();

    match running.join() {
        Err(EngineError::ApplicationPanicked(message)) => {
            assert!(message.contains("crashed on poll 3"));
        }
        other => panic!("expected application panic, got {other:?}"),
    }
    assert!(render.handshake().is_closed());
    drop(render);

    assert!(eventually(|| {
        !registry.is_claimed(ContextKind::Application) && !registry.is_claimed(ContextKind::Render)
    }));
    assert_eq!(h.log.cleanups(), 1);

    let rebuilt = Engine::builder(EngineConfig::default())
        .registry(Arc::clone(&registry))
        .build(Collaborators {
            window_manager: Box::new(HeadlessWindowManager::new().close_after_polls(2)),
            renderer_factory: Arc::new(HeadlessRendererFactory::new()),
            scene_provider: arena(),
        })
        .unwrap();
    assert!(rebuilt.run().unwrap().frames >= 2);
}

// ============================================================================
// CONTEXTS AND PACING
// ============================================================================

/// Test: only one engine per registry until the first is dropped.
#[test]
fn test_single_instance_per_registry() {
    let build = |registry: &Arc<ContextRegistry>| {
        Engine::builder(EngineConfig::default())
            .registry(Arc::clone(registry))
            .build(Collaborators {
                window_manager: Box::new(HeadlessWindowManager::new()),
                renderer_factory: Arc::new(HeadlessRendererFactory::new()),
                scene_provider: arena(),
            })
    };

    let registry = ContextRegistry::new();
    let first = build(&registry).unwrap();
    assert!(matches!(
        build(&registry),
        Err(EngineError::ContextExists(ContextKind::Application))
    ));
    assert!(registry.is_claimed(ContextKind::Render));

    drop(first);
    assert!(build(&registry).is_ok());
}

/// Test: the [render] table reaches the renderer factory.
#[test]
fn test_render_config_reaches_renderer() {
    let config = EngineConfig::from_toml_str(
        "[render]\nkind = \"null\"\nvsync = false\nclear_color = [0.25, 0.5, 0.75, 1.0]",
    )
    .unwrap();
    let expected = config.render.clone();
    let h = harness(
        config,
        HeadlessWindowManager::new().close_after_polls(3),
        HeadlessRendererFactory::new(),
        arena(),
    );

    let report = h.engine.run().unwrap();
    assert!(report.renderer_frames >= 3);
    assert_eq!(h.log.kind(), Some(RendererKind::Null));
    assert_eq!(h.log.config(), Some(expected));
    assert!(!h.log.config().unwrap().vsync);
    assert_eq!(h.log.submissions(), 0);
}

/// Test: a minimized main window parks the application in wait_events.
#[test]
fn test_minimized_window_waits_for_events() {
    let h = harness(
        EngineConfig::default(),
        HeadlessWindowManager::new(),
        HeadlessRendererFactory::new(),
        arena(),
    );
    let watch = h.watch.clone();
    let running = h.engine.spawn().unwrap();

    assert!(eventually(|| watch.main_window().is_some()));
    watch.main_window().unwrap().set_minimized(true);
    assert!(eventually(|| watch.waits() >= 1));

    watch.request_close();
    running.join().unwrap();
    assert!(watch.waits() >= 1);
}

/// Test: target_fps paces the application loop.
#[test]
fn test_frame_pacing() {
    let config = EngineConfig::from_toml_str("[pacing]\ntarget_fps = 100").unwrap();
    let h = harness(
        config,
        HeadlessWindowManager::new().close_after_polls(5),
        HeadlessRendererFactory::new(),
        arena(),
    );

    let started = Instant::now();
    let report = h.engine.run().unwrap();
    assert!(report.frames >= 5);
    assert!(started.elapsed() >= Duration::from_millis(40));
}

/// Test: a frame budget longer than the handshake timeout does not stall the renderer.
#[test]
fn test_pacing_longer_than_timeout() {
    let config =
        EngineConfig::from_toml_str("[handshake]\ntimeout_ms = 100\n[pacing]\ntarget_fps = 5")
            .unwrap();
    let h = harness(
        config,
        HeadlessWindowManager::new().close_after_polls(3),
        HeadlessRendererFactory::new(),
        arena(),
    );

    let report = h.engine.run().unwrap();
    assert!(report.frames >= 3);
    assert_eq!(report.application.final_state, ApplicationState::Destroy);
    assert_eq!(
        report.renderer.map(|summary| summary.final_state),
        Some(RendererState::Destroy)
    );
}
