//! focaltrack - finger-tracked ultrasound haptics
//!
//! Main entry point for the CLI application.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use focaltrack::{
    camera::SyntheticCamera,
    config::Config,
    driver::Driver,
    geometry::{Geometry, LayoutPreset},
    haptics::{create_link, Controller, LinkKind, OnLostCallback},
    mailbox::mailbox,
    tracking::{create_detector, ContactAreaLocalizer, FingertipLocalizer, Localizer, Tracker},
    viewer::GeometryViewer,
    ShutdownSignal,
};

/// focaltrack - finger-tracked focal point rendering for ultrasound haptic arrays
#[derive(Parser, Debug)]
#[command(name = "focaltrack", version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Link to the array (overrides config)
    #[arg(long, value_enum)]
    link: Option<LinkKind>,

    #[command(subcommand)]
    command: Demo,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Demo {
    /// Fingertip tracking, circle widens as the finger presses down
    Softness,
    /// Contact-area tracking, fixed-rate circle with sine modulation
    Texture,
    /// Show the viewer device layout
    Geometry {
        /// Print the device table instead of opening a window
        #[arg(long)]
        headless: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(log_level.into())
                .from_env_lossy(),
        )
        .init();

    info!("Starting {} v{}", focaltrack::NAME, focaltrack::VERSION);

    let mut config = if let Some(ref path) = args.config {
        Config::from_file(path)?
    } else {
        Config::load()?
    };

    if let Some(link) = args.link {
        config.controller.link = link;
    }

    config.validate()?;

    match args.command {
        Demo::Geometry { headless } => {
            let placements = match config.viewer.preset {
                LayoutPreset::Custom => config.geometry.devices.clone(),
                preset => preset.placements(),
            };
            GeometryViewer::from_config(&config.viewer)
                .headless(headless)
                .view(&Geometry::new(&placements))?;
            Ok(())
        }
        demo => run_demo(&config, demo),
    }
}

/// Run the tracker and driver threads until Ctrl+C / SIGTERM or either loop ends.
fn run_demo(config: &Config, demo: Demo) -> anyhow::Result<()> {
    // The runtime only serves signal handling.
    let runtime = tokio::runtime::Runtime::new()?;

    let shutdown = ShutdownSignal::new();
    let (publisher, subscriber) = mailbox();

    let driver_config = match demo {
        Demo::Softness => config.softness.driver.clone(),
        _ => config.texture.driver.clone(),
    };

    let on_lost: OnLostCallback = Box::new(|msg| {
        error!("{}", msg);
        std::process::exit(-1);
    });
    let geometry = Geometry::new(&config.geometry.placements());
    let link = create_link(config.controller.link, &config.controller.udp);
    let controller = Controller::open(geometry, link, config.controller.clone(), Some(on_lost))?;
    let driver = Driver::new(controller, driver_config);

    let (localizer, calibration): (Box<dyn Localizer>, [f64; 3]) = match demo {
        Demo::Softness => {
            let detector = create_detector(&config.landmark)?;
            (
                Box::new(FingertipLocalizer::new(detector, &config.softness.fingertip)),
                config.softness.calibration_offset,
            )
        }
        _ => (
            Box::new(ContactAreaLocalizer::new(&config.texture.contact)),
            config.texture.calibration_offset,
        ),
    };

    let source = SyntheticCamera::new(&config.camera.synthetic);
    let tracker = Tracker::new(source, localizer, calibration).with_stream(
        config.camera.width,
        config.camera.height,
        config.camera.fps,
    );

    let tracker_handle: JoinHandle<focaltrack::Result<()>> = {
        let shutdown = shutdown.clone();
        std::thread::Builder::new()
            .name("tracker".to_string())
            .spawn(move || {
                let result = tracker.run(publisher, &shutdown).map(|_| ());
                shutdown.trigger();
                result
            })?
    };

    let driver_handle: JoinHandle<focaltrack::Result<()>> = {
        let shutdown = shutdown.clone();
        std::thread::Builder::new()
            .name("driver".to_string())
            .spawn(move || {
                let result = driver.run(subscriber, &shutdown).map(|_| ());
                shutdown.trigger();
                result
            })?
    };

    info!("press ctrl+c to finish...");

    runtime.block_on(async {
        tokio::select! {
            _ = shutdown_signal() => info!("Shutdown signal received"),
            _ = wait_for_workers(&shutdown) => {}
        }
        shutdown.trigger();
    });

    let tracker_result = tracker_handle
        .join()
        .map_err(|_| anyhow::anyhow!("tracker thread panicked"))?;
    let driver_result = driver_handle
        .join()
        .map_err(|_| anyhow::anyhow!("driver thread panicked"))?;

    if let Err(ref e) = tracker_result {
        error!("Tracker failed: {}", e);
    }
    if let Err(ref e) = driver_result {
        error!("Driver failed: {}", e);
    }
    tracker_result?;
    driver_result?;

    info!("finish.");
    Ok(())
}

/// Resolve once a worker has triggered shutdown.
async fn wait_for_workers(shutdown: &ShutdownSignal) {
    let mut interval = tokio::time::interval(Duration::from_millis(50));
    while !shutdown.is_triggered() {
        interval.tick().await;
    }
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
