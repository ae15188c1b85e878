//! Pingtone - latency sonification
//!
//! Listens for latency measurements over UDP and plays (or records) a tone
//! whose timbre follows their distribution.

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use pingtone::audio::clock::ClockHandle;
use pingtone::audio::recorder::{recording_tap, RecorderHandle};
use pingtone::audio::streamer::BlockReport;
use pingtone::net::listener::ListenerStats;
use pingtone::{AppConfig, ClockedHost, Recorder, SampleWindow, Shutdown, Streamer, UdpListener};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[cfg(feature = "playback")]
use pingtone::audio::engine::PlaybackEngine;

/// Depth of the block report channel
const REPORT_QUEUE: usize = 16;

/// How often the supervisor wakes to check for shutdown
const SUPERVISE_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// UDP address to listen on (host:port)
    #[arg(long, value_name = "ADDR")]
    listen: Option<String>,

    /// Only accept records with this tag (repeatable)
    #[arg(long = "include", value_name = "TAG")]
    include: Vec<u8>,

    /// Record the output to a WAV file (default name if PATH is omitted)
    #[arg(long, value_name = "PATH", num_args = 0..=1)]
    record: Option<Option<PathBuf>>,

    /// Config file path
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Output device name
    #[arg(long, value_name = "NAME")]
    device: Option<String>,

    /// List output devices and exit
    #[arg(long, default_value_t = false)]
    list_devices: bool,

    /// Run without an audio device, paced by a software clock
    #[arg(long, default_value_t = false)]
    headless: bool,

    /// Frames per audio block
    #[arg(long, value_name = "N")]
    block_size: Option<usize>,

    /// Upper bound on the ratio between adjacent tiers
    #[arg(long, value_name = "X")]
    ratio_ceiling: Option<f64>,

    /// Master output gain
    #[arg(long, value_name = "X")]
    gain: Option<f32>,
}

impl Args {
    /// Overlay command-line values on the loaded config
    fn apply(&self, config: &mut AppConfig) -> Result<()> {
        if let Some(ref addr) = self.listen {
            config.listen_addr = addr.clone();
        }
        if !self.include.is_empty() {
            config.include_tags = self.include.clone();
        }
        match self.record {
            Some(Some(ref path)) => config.record = Some(path.clone()),
            Some(None) => {
                let dir = std::env::current_dir().context("Failed to resolve working directory")?;
                config.record = Some(Recorder::default_path(&dir));
            }
            None => {}
        }
        if let Some(ref device) = self.device {
            config.device = Some(device.clone());
        }
        if let Some(block_size) = self.block_size {
            config.block_size = block_size;
        }
        if let Some(ratio_ceiling) = self.ratio_ceiling {
            config.ratio_ceiling = ratio_ceiling;
        }
        if let Some(gain) = self.gain {
            config.gain = gain;
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pingtone=info".parse()?)
                .add_directive("pingtone_core=info".parse()?),
        )
        .init();

    let args = Args::parse();

    if args.list_devices {
        return list_devices();
    }

    let config_path = args.config.clone().unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load(&config_path);
    args.apply(&mut config)?;
    config.validate().context("Invalid configuration")?;

    info!(
        version = pingtone::VERSION,
        build_date = pingtone::BUILD_DATE,
        "Pingtone starting"
    );

    run(config, args.headless)
}

#[cfg(feature = "playback")]
fn list_devices() -> Result<()> {
    let devices = PlaybackEngine::list_devices().context("Failed to enumerate output devices")?;
    if devices.is_empty() {
        println!("No output devices found.");
        return Ok(());
    }
    println!("Found {} output device(s):", devices.len());
    for (i, device) in devices.iter().enumerate() {
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {}. {}{}", i + 1, device.name, default_marker);
        println!("     Channels: {} out", device.output_channels);
        if !device.sample_rates.is_empty() {
            println!("     Sample rates: {:?}", device.sample_rates);
        }
    }
    Ok(())
}

#[cfg(not(feature = "playback"))]
fn list_devices() -> Result<()> {
    println!("Built without the `playback` feature; no output devices available.");
    Ok(())
}

/// Where the streamer's blocks go
enum Output {
    Clock(ClockHandle),
    #[cfg(feature = "playback")]
    Device(PlaybackEngine),
}

impl Output {
    fn stop(self) -> Result<()> {
        match self {
            Output::Clock(mut handle) => {
                if handle.join().is_none() {
                    warn!("Block clock thread panicked");
                }
            }
            #[cfg(feature = "playback")]
            Output::Device(mut engine) => engine.stop()?,
        }
        Ok(())
    }
}

#[cfg(feature = "playback")]
fn open_device(config: &AppConfig) -> Result<(PlaybackEngine, u32)> {
    let mut engine = PlaybackEngine::new(config.block_size);
    match config.device {
        Some(ref name) => engine
            .select_device(name)
            .with_context(|| format!("Failed to open output device '{}'", name))?,
        None => engine
            .select_default_device()
            .context("Failed to open default output device")?,
    }
    let rate = engine.negotiate_rate(config.sample_rate)?;
    Ok((engine, rate))
}

fn run(config: AppConfig, headless: bool) -> Result<()> {
    let shutdown = Shutdown::new();
    let ctrlc_shutdown = shutdown.clone();
    ctrlc::set_handler(move || ctrlc_shutdown.trigger())
        .context("Failed to install Ctrl+C handler")?;

    #[cfg(feature = "playback")]
    let device = if headless { None } else { Some(open_device(&config)?) };
    #[cfg(feature = "playback")]
    let sample_rate = device.as_ref().map(|(_, rate)| *rate).unwrap_or(config.sample_rate);

    #[cfg(not(feature = "playback"))]
    let sample_rate = {
        if !headless {
            info!("Built without playback support, running headless");
        }
        config.sample_rate
    };

    let mut settings = config.synth_settings();
    settings.sample_rate = sample_rate;

    // Listener
    let window = Arc::new(SampleWindow::new(config.inclusion_filter()));
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("udp-listener")
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let listener = runtime
        .block_on(UdpListener::bind(&config.listen_addr, Arc::clone(&window)))
        .context("Failed to start UDP listener")?;
    let listener_stats = listener.stats();
    let listener_task = runtime.spawn(listener.run(shutdown.listener()));

    // Synthesis
    let (report_tx, report_rx) = crossbeam_channel::bounded::<BlockReport>(REPORT_QUEUE);
    let mut streamer = Streamer::new(Arc::clone(&window), &settings)
        .context("Invalid synthesis settings")?
        .with_reports(report_tx, config.report_interval_samples());

    let mut recorder: Option<RecorderHandle> = None;
    if let Some(ref path) = config.record {
        // One second of headroom between the callback and the writer
        let (tap, drain) = recording_tap(sample_rate as usize);
        let handle = Recorder::new(path.clone(), sample_rate)
            .start(drain)
            .with_context(|| format!("Failed to start recording to {}", path.display()))?;
        streamer = streamer.with_tap(tap);
        recorder = Some(handle);
    }
    let counters = streamer.counters();

    #[cfg(feature = "playback")]
    let output = match device {
        Some((mut engine, _)) => {
            engine.start(streamer).context("Failed to start playback")?;
            Output::Device(engine)
        }
        None => Output::Clock(
            ClockedHost::new(sample_rate, config.block_size)
                .spawn(streamer, shutdown.listener())
                .context("Failed to start block clock")?,
        ),
    };
    #[cfg(not(feature = "playback"))]
    let output = Output::Clock(
        ClockedHost::new(sample_rate, config.block_size)
            .spawn(streamer, shutdown.listener())
            .context("Failed to start block clock")?,
    );

    info!(
        listen = %config.listen_addr,
        sample_rate,
        block_size = config.block_size,
        recording = config.record.is_some(),
        "Running, press Ctrl+C to stop"
    );

    supervise(&shutdown, &report_rx, &listener_stats);

    // Listener and recorder first, then release the output
    shutdown.trigger();
    if let Err(e) = runtime.block_on(listener_task) {
        warn!(error = %e, "Listener task ended abnormally");
    }
    if let Some(mut handle) = recorder {
        let samples = handle.stop().context("Failed to finalize recording")?;
        info!(path = %handle.path().display(), samples, "Recording saved");
    }
    output.stop()?;

    info!(
        samples = counters.samples_rendered(),
        tap_dropped = counters.tap_dropped(),
        received = listener_stats.received(),
        malformed = listener_stats.malformed(),
        "Pingtone stopped"
    );
    Ok(())
}

/// Log block reports until shutdown
fn supervise(
    shutdown: &Shutdown,
    reports: &crossbeam_channel::Receiver<BlockReport>,
    stats: &ListenerStats,
) {
    while !shutdown.is_triggered() {
        match reports.recv_timeout(SUPERVISE_INTERVAL) {
            Ok(report) => {
                info!(
                    block = report.block,
                    base_hz = format!("{:.1}", report.base_hz),
                    tiers = ?report.tiers.as_array(),
                    received = stats.received(),
                    malformed = stats.malformed(),
                    "Tone update"
                );
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                warn!("Audio stopped producing blocks");
                break;
            }
        }
    }
}
