//! STOPme agent CLI
//!
//! Configuration management and a dry-run simulation of the feedback loop.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use stopme_agent::{
    actuator::{AudioLibrary, DryRunActuators},
    config::Config,
    core::{
        Classifier, FeatureExtractor, FeatureVector, NativeError, StereotipyTag, WindowChannels,
        FEATURE_COUNT,
    },
    transparency::create_shared_log_with_persistence,
    Pipeline, VERSION,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stopme")]
#[command(version = VERSION)]
#[command(about = "Stereotypy detection and sensory-feedback agent", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show configuration
    Config,

    /// Write the default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Check which audio feedback clips are present
    AudioCheck,

    /// Run scripted classifier tags through the dispatcher with dry-run actuators
    Simulate {
        /// Comma-separated tag codes (0=NO_CLASS, 1=NON_DANGEROUS, 2=DANGEROUS, 3=NON_STEREOTIPY)
        #[arg(long, default_value = "1,1,1,0,2,2,2,2,2,2,3")]
        tags: String,

        /// Delay between events in milliseconds
        #[arg(long, default_value = "1000")]
        interval_ms: u64,

        /// Comma-separated actuator ids
        #[arg(long, default_value = "led_sim,meta_sim")]
        actuators: String,

        /// Replay the tags until interrupted
        #[arg(long)]
        repeat: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load().context("Failed to load configuration")?;
    init_tracing(&config.log_filter);

    match cli.command {
        Commands::Config => cmd_config(&config),
        Commands::InitConfig { force } => cmd_init_config(force),
        Commands::AudioCheck => cmd_audio_check(&config),
        Commands::Simulate {
            tags,
            interval_ms,
            actuators,
            repeat,
        } => cmd_simulate(
            &config,
            &tags,
            Duration::from_millis(interval_ms),
            &actuators,
            repeat,
        ),
    }
}

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn cmd_config(config: &Config) -> anyhow::Result<()> {
    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

fn cmd_init_config(force: bool) -> anyhow::Result<()> {
    let path = Config::config_path();
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    let config = Config::default();
    config.save()?;
    config.ensure_directories()?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn cmd_audio_check(config: &Config) -> anyhow::Result<()> {
    let library = AudioLibrary::resolve(&config.audio.base_path);
    let missing = library.missing();

    println!("Audio directory: {}", library.base_path().display());
    if missing.is_empty() {
        println!("All clips present.");
        return Ok(());
    }

    println!("Missing clips:");
    for clip in &missing {
        println!("  - {}", clip.file_name());
    }
    Ok(())
}

/// Extractor stand-in for simulations: every window maps to zeros.
struct ZeroExtractor;

impl FeatureExtractor for ZeroExtractor {
    fn extract(
        &mut self,
        _channels: &WindowChannels,
        _calibrate: bool,
    ) -> Result<FeatureVector, NativeError> {
        Ok(FeatureVector::new(vec![0.0; FEATURE_COUNT]))
    }
}

/// Replays a fixed tag sequence, wrapping around at the end.
struct ScriptedClassifier {
    tags: Vec<i32>,
    next: AtomicUsize,
}

impl Classifier for ScriptedClassifier {
    fn classify(&self, _features: &FeatureVector) -> Result<i32, NativeError> {
        let i = self.next.fetch_add(1, Ordering::SeqCst);
        Ok(self.tags[i % self.tags.len()])
    }
}

fn parse_list<T: std::str::FromStr>(raw: &str) -> Result<Vec<T>, T::Err> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}

fn cmd_simulate(
    config: &Config,
    tags: &str,
    interval: Duration,
    actuators: &str,
    repeat: bool,
) -> anyhow::Result<()> {
    let tags: Vec<i32> =
        parse_list(tags).with_context(|| format!("Invalid tag list '{tags}'"))?;
    if tags.is_empty() {
        bail!("At least one tag is required");
    }
    let actuator_ids: Vec<String> = parse_list(actuators)?;

    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    println!("STOPme agent v{VERSION} - simulation");
    println!("  Tags: {tags:?}");
    println!("  Actuators: {actuator_ids:?}");
    println!("  Cooldown: {}ms", config.dispatcher.cooldown.as_millis());
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let log = create_shared_log_with_persistence(config.data_path.join("transparency.json"));
    let actuators = Arc::new(DryRunActuators::new(actuator_ids));
    let classifier = Arc::new(ScriptedClassifier {
        tags: tags.clone(),
        next: AtomicUsize::new(0),
    });

    let mut pipeline = Pipeline::new(
        config,
        Box::new(ZeroExtractor),
        classifier,
        actuators.clone(),
        log.clone(),
    );
    pipeline.start();

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    let gateway = pipeline.gateway();
    let started = Instant::now();
    let mut sent = 0usize;

    while running.load(Ordering::SeqCst) && (repeat || sent < tags.len()) {
        let window_ts = started.elapsed().as_secs_f64();
        let features = FeatureVector::new(vec![0.0; FEATURE_COUNT]);
        if let Some(event) = gateway.recognize(features, window_ts, false) {
            println!("[{:>7.2}s] {}", window_ts, StereotipyTag::from_code(event.tag));
        }
        sent += 1;
        sleep_while_running(&running, interval);
    }

    // Let the dispatcher drain what is still queued.
    let deadline = Instant::now() + config.dispatcher.poll_timeout * 2;
    while !pipeline.channel().is_empty() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    pipeline.shutdown();

    println!();
    println!("Actuations:");
    for command in actuators.history() {
        println!(
            "  {} {}",
            command.actuator_id,
            serde_json::Value::Object(command.params.to_map())
        );
    }
    println!();
    println!("{}", log.summary());

    if let Err(e) = log.save() {
        eprintln!("Warning: Could not save transparency stats: {e}");
    }
    Ok(())
}

/// Sleep for `total`, waking early once `running` is cleared.
fn sleep_while_running(running: &AtomicBool, total: Duration) {
    let step = Duration::from_millis(50);
    let deadline = Instant::now() + total;
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(step.min(deadline - now));
    }
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");
}
