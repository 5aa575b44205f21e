//! streamplay Audio Player (streamplay-ap) - command-line entry point
//!
//! Streams a file (or stdin) through [`StreamPlayer`] to the default output
//! device. Raw PCM input is fed in small fragments at a fixed interval to
//! emulate audio arriving over the network; encoded input is decoded as one
//! segment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use streamplay_ap::audio::{CpalSink, PcmDecoder, PcmEncoding, SymphoniaDecoder};
use streamplay_ap::config::CONFIG_ENV_VAR;
use streamplay_ap::{AudioFormat, Decoder, PlayerConfig, PlaybackState, PlayerEvent, StreamPlayer};
use tokio::io::AsyncReadExt;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for streamplay-ap
#[derive(Parser, Debug)]
#[command(name = "streamplay-ap")]
#[command(about = "Gapless playback of incrementally arriving audio")]
#[command(version)]
struct Args {
    /// Audio file to play, or "-" for stdin
    #[arg(required_unless_present = "list_devices")]
    input: Option<PathBuf>,

    /// Treat input as raw PCM in this encoding (s16le, f32le)
    #[arg(short, long, env = "STREAMPLAY_PCM_ENCODING")]
    encoding: Option<PcmEncoding>,

    /// Sample rate of raw PCM input
    #[arg(long, default_value = "16000")]
    sample_rate: u32,

    /// Channel count of raw PCM input
    #[arg(long, default_value = "1")]
    channels: u16,

    /// Bytes per fragment when streaming raw PCM
    #[arg(long, default_value = "3200")]
    fragment_bytes: usize,

    /// Delay between raw PCM fragments
    #[arg(long, default_value = "50")]
    fragment_interval_ms: u64,

    /// Configuration file (TOML)
    #[arg(short, long, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// Output device name (overrides the config file)
    #[arg(short, long, env = "STREAMPLAY_DEVICE")]
    device: Option<String>,

    /// Lookahead window in chunks (overrides the config file)
    #[arg(long)]
    jitter_buffer_size: Option<usize>,

    /// Output volume, 0.0 - 1.0
    #[arg(long)]
    volume: Option<f32>,

    /// Print state events to stdout as JSON lines
    #[arg(long)]
    json_events: bool,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "streamplay_ap=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!(
        "Starting streamplay-ap {} (git {}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    if args.list_devices {
        for name in CpalSink::list_devices().context("Failed to list output devices")? {
            println!("{}", name);
        }
        return Ok(());
    }

    let mut config =
        PlayerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if args.device.is_some() {
        config.device_name = args.device.clone();
    }
    if let Some(size) = args.jitter_buffer_size {
        config.jitter_buffer_size = size;
    }
    debug!("Effective configuration: {:?}", config);

    let input = args.input.clone().context("No input given")?;
    let bytes = read_input(&input).await?;
    if bytes.is_empty() {
        warn!("Input is empty");
    }

    let (decoder, format): (Box<dyn Decoder>, AudioFormat) = match args.encoding {
        Some(encoding) => {
            let format = AudioFormat::new(args.sample_rate, args.channels);
            (Box::new(PcmDecoder::new(format, encoding)), format)
        }
        None => {
            let hint = input.extension().and_then(|e| e.to_str()).map(str::to_string);
            let format = encoded_output_format(&bytes, hint.as_deref())?;
            let mut decoder = SymphoniaDecoder::new(format);
            if let Some(hint) = hint {
                decoder = decoder.with_hint(hint);
            }
            (Box::new(decoder), format)
        }
    };

    let sink = CpalSink::new(
        config.device_name.clone(),
        config.output_buffer_frames,
        config.ring_capacity_chunks,
    );
    let player = StreamPlayer::new(decoder, Box::new(sink), Some(format), config)
        .context("Failed to initialize player")?;
    info!("Player initialized ({})", player.format());

    let mut events = player.subscribe();
    if args.json_events {
        tokio::spawn(print_events(player.subscribe()));
    }
    if let Some(volume) = args.volume {
        player.set_volume(volume);
    }
    player.play();

    let playback = async {
        if args.encoding.is_some() {
            feed_fragments(
                &player,
                &bytes,
                args.fragment_bytes,
                Duration::from_millis(args.fragment_interval_ms),
            )
            .await?;
        } else {
            player.append_data(&bytes).await.context("Failed to decode input")?;
        }
        player
            .last_data_appended()
            .await
            .context("Failed to finalize stream")?;
        wait_for_end(&mut events).await
    };

    tokio::select! {
        result = playback => {
            let state = result?;
            info!("Playback ended: {}", state);
            if let PlaybackState::Error(cause) = state {
                bail!("Playback failed: {}", cause);
            }
        }
        _ = shutdown_signal() => {
            player.stop();
            let state = player.state().await.context("Player queue closed")?;
            info!("Playback interrupted ({})", state);
        }
    }

    Ok(())
}

async fn read_input(path: &Path) -> Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut bytes = Vec::new();
        tokio::io::stdin()
            .read_to_end(&mut bytes)
            .await
            .context("Failed to read stdin")?;
        info!("Read {} bytes from stdin", bytes.len());
        return Ok(bytes);
    }

    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    info!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(bytes)
}

/// Output format for encoded input: the file's own rate and up to two
/// channels, or 48kHz if the rate cannot be chunked evenly.
fn encoded_output_format(bytes: &[u8], hint: Option<&str>) -> Result<AudioFormat> {
    let probed =
        SymphoniaDecoder::probe_format(bytes, hint).context("Failed to probe input format")?;
    let channels = probed.channels.clamp(1, 2);
    let format = AudioFormat::new(probed.sample_rate, channels);

    if format.validate().is_ok() {
        Ok(format)
    } else {
        warn!("Input rate {}Hz not usable for output, resampling to 48000Hz", probed.sample_rate);
        Ok(AudioFormat::new(48_000, channels))
    }
}

async fn feed_fragments(
    player: &StreamPlayer,
    bytes: &[u8],
    fragment_bytes: usize,
    interval: Duration,
) -> Result<()> {
    let fragment_bytes = fragment_bytes.max(1);
    let mut ticker = tokio::time::interval(interval);

    for (n, fragment) in bytes.chunks(fragment_bytes).enumerate() {
        ticker.tick().await;
        player
            .append_data(fragment)
            .await
            .with_context(|| format!("Failed to append fragment {}", n))?;
    }
    debug!("All {} bytes appended", bytes.len());
    Ok(())
}

/// Wait for a terminal state
async fn wait_for_end(events: &mut broadcast::Receiver<PlayerEvent>) -> Result<PlaybackState> {
    loop {
        match events.recv().await {
            Ok(PlayerEvent::StateChanged { state, .. }) if state.is_terminal() => return Ok(state),
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Missed {} player events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => bail!("Player event channel closed"),
        }
    }
}

async fn print_events(mut events: broadcast::Receiver<PlayerEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("Failed to serialize event: {}", e),
            },
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
