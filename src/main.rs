use std::collections::BTreeSet;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;

use visage_rs::config::{self, HeadConfig};
use visage_rs::experience::{ExperienceController, ExperienceEvent};
use visage_rs::motion::{MotionController, MotionEvent};
use visage_rs::servo::ServoLimits;
use visage_rs::transport::{NullTransport, SerialTransport, ServoTransport};

#[derive(Debug, Parser)]
#[command(name = "head-host", about = "Animatronic head instruction playback host")]
struct Args {
    /// Configuration file.
    #[arg(long, default_value = "head.toml")]
    config: String,

    /// Drive the real servo board over serial instead of the null
    /// transport.
    #[arg(long)]
    hardware: bool,

    /// Play a single instruction sequence and exit instead of running the
    /// experience loop.
    #[arg(long)]
    play: Option<String>,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    tracing::info!("starting head host");

    let config = if std::path::Path::new(&args.config).is_file() {
        Arc::new(config::load_config(&args.config)?)
    } else {
        tracing::warn!(path = %args.config, "config file not found, using defaults");
        Arc::new(HeadConfig::default())
    };
    tracing::info!(
        instruction_dir = %config.playback.instruction_dir.display(),
        move_time_ms = config.playback.default_move_time_ms,
        "playback configuration loaded"
    );

    let limits = Arc::new(ServoLimits::default());
    let transport: Arc<dyn ServoTransport> = if args.hardware {
        tracing::info!(port = %config.serial.port, "running with real hardware");
        Arc::new(SerialTransport::open(&config.serial.port, config.serial.baud)?)
    } else {
        tracing::info!("running with mocked hardware");
        Arc::new(NullTransport::new())
    };

    let (controller, scheduler_events) =
        MotionController::new(Arc::clone(&config), limits, Arc::clone(&transport));
    tokio::spawn(controller.clone().run(scheduler_events));

    if let Some(source) = args.play {
        play_once(&controller, &source).await?;
    } else {
        run_experience(&controller, &config).await;
    }

    controller.stop_all().await;
    transport.stop().await?;
    tracing::info!("head host shut down");
    Ok(())
}

/// One-shot playback: run a single sequence to completion (or ctrl-c).
async fn play_once(
    controller: &MotionController,
    source: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let mut events = controller.subscribe();
    controller.prepare(source, BTreeSet::new(), false).await?;
    controller.execute_all().await;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(MotionEvent::AllComplete) => break,
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                Err(_) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, stopping playback");
                controller.stop_all().await;
            }
        }
    }
    Ok(())
}

/// Full experience loop until ctrl-c. Completion events feed the state
/// machine; presence events would arrive from a detector on the same
/// channel.
async fn run_experience(controller: &MotionController, config: &HeadConfig) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let mut motion_events = controller.subscribe();
    let completions = event_tx.clone();
    tokio::spawn(async move {
        loop {
            match motion_events.recv().await {
                Ok(MotionEvent::AllComplete) => {
                    if completions.send(ExperienceEvent::SequenceComplete).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "motion event stream lagged");
                }
                Err(_) => break,
            }
        }
    });

    let experience =
        ExperienceController::new(controller.clone(), config.experience.clone());
    tokio::spawn(experience.run(event_rx));

    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to listen for shutdown signal");
    }
    tracing::info!("shutdown requested");
    drop(event_tx);
}
