//! # chord-live
//!
//! Terminal front end for the chord detector. Starts a detection session on
//! the default input device (or a synthetic progression with `--demo`) and
//! prints a line whenever the displayed chord changes.
//!
//! ## Threads
//! - **Main thread**: polls the session's latest-value channels on a timer
//! - **Worker thread**: owned by the session, runs the pipeline
//! - **Stdin thread**: waits for Enter and asks the main loop to quit

mod demo;
mod display;

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chord_core::audio::{AudioSource, CpalSource};
use chord_core::{ChordObservation, DetectionSession, DetectorConfig, PitchObservation};
use clap::Parser;
use crossbeam_channel::{after, never, select, tick, Receiver, Sender};

use display::ChangeRecord;

/// How often the main loop reads the session outputs.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[command(name = "chord-live", version, about = "Live chord detection from an audio input")]
struct Cli {
    /// JSON file with detector settings; missing fields use defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Play a synthetic chord progression instead of capturing audio
    #[arg(long)]
    demo: bool,

    /// Print one JSON object per chord change
    #[arg(long)]
    json: bool,

    /// Stop after this many seconds instead of waiting for Enter
    #[arg(long)]
    duration: Option<f64>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => DetectorConfig::default(),
    };
    config.validate().context("invalid detector configuration")?;

    let source: Box<dyn AudioSource> = if cli.demo {
        log::info!("playing the demo progression");
        Box::new(demo::source(&config)?)
    } else {
        Box::new(CpalSource::new(&config))
    };

    let mut session = DetectionSession::new(config, source)?;
    session.start()?;
    if cli.duration.is_none() && !cli.json {
        eprintln!("Listening. Press Enter to stop.");
    }

    run(&session, cli.duration, cli.json)?;
    session.stop();
    Ok(())
}

fn load_config(path: &Path) -> Result<DetectorConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let config: DetectorConfig = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    log::info!("loaded config from {}", path.display());
    Ok(config)
}

/// Signals once when a line arrives on stdin.
///
/// The caller keeps the returned sender so that EOF on stdin leaves the
/// channel open instead of reading as a quit request.
fn spawn_stdin_watcher() -> Result<(Sender<()>, Receiver<()>)> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let watcher_tx = tx.clone();
    thread::Builder::new()
        .name("stdin-watcher".into())
        .spawn(move || {
            let mut line = String::new();
            if matches!(std::io::stdin().lock().read_line(&mut line), Ok(n) if n > 0) {
                let _ = watcher_tx.send(());
            }
        })
        .context("failed to spawn stdin watcher")?;
    Ok((tx, rx))
}

/// Prints chord changes until Enter or the deadline.
fn run(session: &DetectionSession, duration: Option<f64>, json: bool) -> Result<()> {
    let chords = session.chords();
    let frames = session.visualizations();
    let (_quit_tx, quit) = spawn_stdin_watcher()?;
    let ticker = tick(POLL_INTERVAL);
    let deadline = match duration {
        Some(secs) => after(Duration::try_from_secs_f64(secs).context("invalid --duration")?),
        None => never(),
    };

    let started = Instant::now();
    let mut shown: Option<ChordObservation> = None;
    let mut pitches: Vec<PitchObservation> = Vec::new();

    loop {
        select! {
            recv(quit) -> _ => break,
            recv(deadline) -> _ => break,
            recv(ticker) -> _ => {
                if let Some(frame) = frames.try_latest().flatten() {
                    pitches = frame.pitches;
                }
                if let Some(chord) = chords.try_latest() {
                    if display::chord_changed(shown.as_ref(), chord.as_ref()) {
                        shown = chord;
                        print_change(started, shown.as_ref(), &pitches, json)?;
                    }
                }
            },
        }
    }
    Ok(())
}

fn print_change(
    started: Instant,
    chord: Option<&ChordObservation>,
    pitches: &[PitchObservation],
    json: bool,
) -> Result<()> {
    if json {
        let record = ChangeRecord {
            elapsed_secs: started.elapsed().as_secs_f64(),
            chord,
            pitches,
        };
        println!("{}", serde_json::to_string(&record)?);
    } else {
        println!("{}", display::status_line(chord, pitches));
    }
    Ok(())
}
