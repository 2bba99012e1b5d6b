//! `tread-cli` – runs the engine against a scripted robot.
//!
//! 1. Initialises tracing (`RUST_LOG`, `TREAD_LOG_FORMAT`, optional OTLP).
//! 2. Loads `~/.tread/config.toml`, writing the defaults on first run.
//! 3. Builds an [`EngineContext`] and drives it at `tick_interval_ms` with
//!    frames from [`sim::SimRobot`], printing reaction and behavior changes.
//! 4. Intercepts **Ctrl-C** to publish a shutdown alert and stop cleanly.

mod config;
mod sim;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

use tread_middleware::{EventBus, Topic, TopicReceiver};
use tread_runtime::{EngineContext, RobotAction};
use tread_types::{Event, EventPayload};

fn main() {
    let _telemetry = tread_runtime::init_tracing("tread");

    print_banner();

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            match config::save(&config::Config::default()) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };

    let mut engine = match EngineContext::new(cfg.engine_config()) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("{}: {}", "Engine failed to start".red().bold(), e);
            std::process::exit(1);
        }
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(engine.bus(), shutdown.clone());

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_time().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start Tokio runtime".red().bold(), e);
            std::process::exit(1);
        }
    };

    println!(
        "  Running {} at {} ms per tick. Press {} to stop.\n",
        if cfg.sim_ticks == 0 {
            "until interrupted".to_string()
        } else {
            format!("{} ticks", cfg.sim_ticks)
        },
        cfg.tick_interval_ms,
        "Ctrl-C".bold()
    );

    runtime.block_on(run(&mut engine, &cfg, &shutdown));

    engine.shutdown();
    println!("{}", "  ✓ Engine stopped.".green());
}

// ─────────────────────────────────────────────────────────────────────────────
// Tick loop
// ─────────────────────────────────────────────────────────────────────────────

async fn run(engine: &mut EngineContext, cfg: &config::Config, shutdown: &AtomicBool) {
    let bus = engine.bus();
    let mut reactions = bus.subscribe_to(Topic::Reactions);
    let mut behaviors = bus.subscribe_to(Topic::Behaviors);
    let mut vision = bus.subscribe_to(Topic::Vision);

    let mut robot = sim::SimRobot::new(cfg.tick_interval_ms, cfg.camera.width, cfg.camera.height);
    let mut interval = tokio::time::interval(Duration::from_millis(cfg.tick_interval_ms.max(1)));

    while !shutdown.load(Ordering::SeqCst) && (cfg.sim_ticks == 0 || robot.tick() < cfg.sim_ticks) {
        interval.tick().await;

        let frame = robot.step();
        engine.robot_mut().set_pose(frame.body_yaw_rad, frame.head_angle_rad);
        for s in &frame.imu {
            engine.handle_imu_data(frame.image_id, s.rate_x, s.rate_y, s.rate_z, s.line2_number);
        }
        for event in frame.events {
            engine.handle_engine_event(event);
        }
        if let Err(e) = engine.set_next_image(&frame.image, frame.image_id, frame.timestamp) {
            warn!(error = %e, image_id = frame.image_id, "image rejected");
        }

        engine.tick();

        for action in engine.robot_mut().drain_actions() {
            print_action(robot.tick(), &action);
        }
        drain_and_print(robot.tick(), &mut reactions);
        drain_and_print(robot.tick(), &mut behaviors);
        drain_and_print(robot.tick(), &mut vision);
    }

    info!(ticks = robot.tick(), "tick loop finished");
}

fn drain_and_print(tick: u64, rx: &mut TopicReceiver) {
    while let Some(event) = rx.try_recv() {
        print_event(tick, &event);
    }
}

fn print_event(tick: u64, event: &Event) {
    let stamp = format!("[{tick:>5}]").dimmed();
    match &event.payload {
        EventPayload::ReactionTriggerTransition { old, new } => println!(
            "{stamp} {} {} → {}",
            "reaction".magenta().bold(),
            old.map_or_else(|| "none".to_string(), |t| t.to_string()),
            new.map_or_else(|| "none".to_string(), |t| t.to_string()).bold()
        ),
        EventPayload::BehaviorTransition { old, new } => println!(
            "{stamp} {} {} → {}",
            "behavior".cyan().bold(),
            old.as_deref().unwrap_or("none"),
            new.as_deref().unwrap_or("none").bold()
        ),
        EventPayload::Illumination { image_id, mean_intensity } => {
            // One line per second of frames is plenty.
            if image_id % 16 == 0 {
                println!(
                    "{stamp} {} image {image_id} mean {mean_intensity:.1}",
                    "vision".blue()
                );
            }
        }
        other => println!("{stamp} {:?}", other),
    }
}

fn print_action(tick: u64, action: &RobotAction) {
    let stamp = format!("[{tick:>5}]").dimmed();
    match action {
        RobotAction::StopAllMotors => println!("{stamp} {}", "motors stopped".yellow()),
        other => println!("{stamp} {} {:?}", "action".green(), other),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Ctrl-C
// ─────────────────────────────────────────────────────────────────────────────

fn install_ctrlc_handler(bus: EventBus, shutdown: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping engine …".yellow().bold());

        let _ = bus.publish_to(
            Topic::SystemAlerts,
            Event::new(
                "tread-cli",
                EventPayload::SystemFault {
                    component: "cli".to_string(),
                    message: "operator interrupt".to_string(),
                },
            ),
        );

        shutdown.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; Ctrl-C will abort immediately");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"  ______                __"#.bold().cyan());
    println!("{}", r#" /_  __/_______  ____ _/ /"#.bold().cyan());
    println!("{}", r#"  / / / ___/ _ \/ __ `/ __/"#.bold().cyan());
    println!("{}", r#" / / / /  /  __/ /_/ / /_/"#.bold().cyan());
    println!("{}", r#"/_/ /_/   \___/\__,_/\__,_/"#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Tread".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Robot engine: reactions, behaviors, rolling-shutter correction");
    println!();
}
