//! # TANDEM Headless Driver
//!
//! Runs both loops of the frame handshake for a fixed number of frames
//! against headless collaborators, then prints what happened.
//!
//! ```bash
//! # Defaults, 600 frames
//! ./tandem
//!
//! # From a config file, with a present target that goes stale every 100 frames
//! ./tandem configs/tandem.toml --frames 1000 --invalidate-every 100
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tandem_engine::headless::{HeadlessRendererFactory, HeadlessWindowManager, StaticSceneProvider};
use tandem_engine::{
    CollaboratorError, Collaborators, Engine, EngineConfig, EngineReport, Scene, StateId,
};

/// Headless driver for the TANDEM frame handshake
#[derive(Parser, Debug)]
#[command(name = "tandem", version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Frames to run before the main window closes
    #[arg(short, long, default_value_t = 600)]
    frames: u64,

    /// Invalidate the present target every N presents
    #[arg(long, value_name = "N")]
    invalidate_every: Option<u64>,

    /// Make renderer creation fail (exercises the startup-failure path)
    #[arg(long)]
    fail_renderer: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    println!("═══════════════════════════════════════════════════════════════════");
    println!("                      TANDEM v{}", env!("CARGO_PKG_VERSION"));
    println!("                         HEADLESS MODE");
    println!("═══════════════════════════════════════════════════════════════════");
    println!();

    let config = match &args.config {
        Some(path) => match EngineConfig::from_file(path) {
            Ok(config) => {
                println!("  Config:   {}", path.display());
                config
            }
            Err(e) => {
                eprintln!("   ✗ FATAL: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => {
            println!("  Config:   defaults");
            EngineConfig::default()
        }
    };
    println!(
        "  Renderer: {:?} (vsync {})",
        config.render.kind,
        if config.render.vsync { "on" } else { "off" }
    );
    println!("  Frames:   {}", args.frames);
    match config.handshake.timeout() {
        Some(timeout) => println!("  Timeout:  {timeout:?}"),
        None => println!("  Timeout:  none"),
    }
    println!();

    let mut factory = HeadlessRendererFactory::new();
    if let Some(every) = args.invalidate_every {
        factory = factory.invalidate_every(every);
    }
    if args.fail_renderer {
        factory = factory.failing(CollaboratorError::DeviceCreation(
            "requested by --fail-renderer".into(),
        ));
    }
    let log = factory.log();

    let collaborators = Collaborators {
        window_manager: Box::new(HeadlessWindowManager::new().close_after_polls(args.frames)),
        renderer_factory: Arc::new(factory),
        scene_provider: Arc::new(StaticSceneProvider::new(Scene {
            name: String::from("headless"),
            entity_count: 1,
            ..Scene::default()
        })),
    };

    let engine = match Engine::builder(config).build(collaborators) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("   ✗ FATAL: {e}");
            return ExitCode::FAILURE;
        }
    };

    println!("🚀 Running...");
    let started = Instant::now();
    let result = engine.run();
    let elapsed = started.elapsed();

    match result {
        Ok(report) => {
            println!("   ✓ Stopped after {elapsed:?}");
            println!();
            print_report(&report);
            println!();
            println!("  Presents:          {}", log.presents());
            println!("  Submissions:       {}", log.submissions());
            println!("  Device cleanups:   {}", log.cleanups());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("   ✗ Engine failed after {elapsed:?}: {e}");
            ExitCode::FAILURE
        }
    }
}

fn print_report(report: &EngineReport) {
    report.stats.print_summary();
    println!();
    println!("┌─ LOOPS ──────────────────────────────────────────────────────────┐");
    println!(
        "│ Application:        {} frames, ended in {}",
        report.frames,
        report.application.final_state.name()
    );
    match &report.renderer {
        Some(renderer) => println!(
            "│ Renderer:           {} frames, ended in {}",
            report.renderer_frames,
            renderer.final_state.name()
        ),
        None => println!("│ Renderer:           never started"),
    }
    println!("│ Pipeline Builds:    {}", report.pipeline_builds);
    println!("└──────────────────────────────────────────────────────────────────┘");
}
