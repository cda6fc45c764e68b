use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use std::{panic, process};

use anyhow::{Context, Result, bail};
use clap::{Arg, Command, value_parser};
use log::{info, warn};
use parking_lot::Mutex;

use depthlink::capture::{FramePairSynchronizer, Geometry, PixelBuffer, SyntheticCamera, SyntheticCameraConfig};
use depthlink::config::{Config, app_name, version};
use depthlink::display::{LinearRemap, RemapOutcome, remap_in_place};
use depthlink::pipeline::{RateSnapshot, ReceiverCoordinator, SenderCoordinator};
use depthlink::utils::net::webrtc::{LocalLink, WebRtcContext};
use depthlink::utils::net::{LoopbackTransport, Transport};
use depthlink::utils::string::{format_bytes, format_seconds};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

fn cli() -> Command {
    Command::new(app_name())
        .version(version())
        .author(env!("CARGO_PKG_AUTHORS"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("JSON settings file; missing fields keep their defaults.")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("transport")
                .short('t')
                .long("transport")
                .value_name("KIND")
                .help("Link between sender and receiver.")
                .value_parser(["loopback", "webrtc"])
                .ignore_case(true)
                .default_value("loopback"),
        )
        .arg(
            Arg::new("frames")
                .short('n')
                .long("frames")
                .value_name("COUNT")
                .help("Stop after this many capture ticks (runs until Ctrl-C otherwise).")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("width")
                .long("width")
                .value_name("PIXELS")
                .value_parser(value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new("height")
                .long("height")
                .value_name("PIXELS")
                .value_parser(value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new("drop-every")
                .long("drop-every")
                .value_name("N")
                .help("Mark every N-th depth frame as dropped by the camera.")
                .value_parser(value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new("remap")
                .long("remap")
                .value_name("MIN:MAX")
                .help("Rescale received depth values from MIN:MAX to 0:1 in place."),
        )
}

fn parse_range(value: &str) -> Result<(f32, f32)> {
    let (min, max) = value
        .split_once(':')
        .with_context(|| format!("Expected MIN:MAX, got '{}'", value))?;
    let min = min.trim().parse::<f32>().context("Invalid range minimum")?;
    let max = max.trim().parse::<f32>().context("Invalid range maximum")?;
    if min == max {
        bail!("Empty range {}:{}", min, max);
    }
    Ok((min, max))
}

/// Either end of the link plus whatever must be closed afterwards
enum Link {
    Loopback(Arc<LoopbackTransport>, Arc<LoopbackTransport>),
    WebRtc(LocalLink),
}

impl Link {
    async fn open(kind: &str, config: &Config) -> Result<Self> {
        match kind {
            "webrtc" => {
                let mut rtc_config = config.clone();
                rtc_config.include_loopback_candidates = true;
                let context = WebRtcContext::new(&rtc_config)?;
                let link = context
                    .connect_local_pair(CONNECT_TIMEOUT)
                    .await
                    .context("Failed to connect local peers")?;
                Ok(Link::WebRtc(link))
            }
            _ => {
                let (a, b) = LoopbackTransport::pair(config.queue_depth);
                Ok(Link::Loopback(Arc::new(a), Arc::new(b)))
            }
        }
    }

    fn ends(&self) -> (Arc<dyn Transport>, Arc<dyn Transport>) {
        match self {
            Link::Loopback(a, b) => (a.clone() as Arc<dyn Transport>, b.clone() as Arc<dyn Transport>),
            Link::WebRtc(link) => (
                Arc::new(link.sender.clone()) as Arc<dyn Transport>,
                Arc::new(link.receiver.clone()) as Arc<dyn Transport>,
            ),
        }
    }

    async fn close(&self) {
        match self {
            Link::Loopback(a, _) => a.close(),
            Link::WebRtc(link) => link.close().await,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let matches = cli().get_matches();

    // kill the process as soon as a worker thread panics
    let orig_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        orig_hook(panic_info);
        process::exit(105);
    }));

    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(width) = matches.get_one::<u32>("width") {
        config.width = *width;
    }
    if let Some(height) = matches.get_one::<u32>("height") {
        config.height = *height;
    }
    let remap = matches
        .get_one::<String>("remap")
        .map(|value| parse_range(value))
        .transpose()?;
    let transport = matches
        .get_one::<String>("transport")
        .map(|kind| kind.to_lowercase())
        .unwrap_or_else(|| "loopback".to_string());

    let camera_config = SyntheticCameraConfig {
        width: config.width,
        height: config.height,
        frame_rate: config.frame_rate,
        drop_every: matches.get_one::<u32>("drop-every").copied(),
        max_frames: matches.get_one::<u64>("frames").copied(),
    };

    run(config, camera_config, &transport, remap).await
}

async fn run(
    config: Config,
    camera_config: SyntheticCameraConfig,
    transport: &str,
    remap: Option<(f32, f32)>,
) -> Result<()> {
    info!(
        "{} {}: {}x{} @ {} fps, {:?} over {}",
        app_name(),
        version(),
        config.width,
        config.height,
        config.frame_rate,
        config.compression,
        transport
    );

    let link = Link::open(transport, &config).await?;
    let (sender_end, receiver_end) = link.ends();

    let mut receiver = ReceiverCoordinator::new(config.clone(), receiver_end);
    let last_geometry: Mutex<Option<Geometry>> = Mutex::new(None);
    receiver.reconstructor().register_listener(
        "viewer",
        Arc::new(move |buffer: &Arc<PixelBuffer>| {
            let geometry = buffer.geometry();
            let mut last = last_geometry.lock();
            if *last != Some(geometry) {
                info!("Receiving {}", geometry);
                *last = Some(geometry);
            }
            drop(last);

            if let Some((min, max)) = remap {
                match remap_in_place(buffer, LinearRemap::new(min, max, 0.0, 1.0)) {
                    RemapOutcome::Applied { .. } => {}
                    other => warn!("Remap skipped: {:?}", other),
                }
            }
        }),
    );
    receiver.launch()?;

    let synchronizer = Arc::new(FramePairSynchronizer::new());
    let mut sender = SenderCoordinator::new(config.clone(), synchronizer.clone(), sender_end);
    sender.start()?;

    let mut rates = sender.rate_updates();
    let rate_log = tokio::spawn(async move {
        while rates.changed().await.is_ok() {
            let snapshot: RateSnapshot = *rates.borrow_and_update();
            info!("Sending {}", snapshot);
        }
    });

    let started = Instant::now();
    let camera = SyntheticCamera::new(camera_config, synchronizer.clone());
    let cancel = camera.cancel_token();
    let mut capture = camera.spawn();

    let ticks = tokio::select! {
        result = &mut capture => result.context("Camera task failed")?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            cancel.cancel();
            capture.await.context("Camera task failed")?
        }
    };

    sender.stop().await?;
    // let the last messages land before tearing the receiver down
    tokio::time::sleep(Duration::from_millis(100)).await;
    receiver.stop().await?;
    link.close().await;
    rate_log.abort();

    let sent = sender.health().summary();
    let received = receiver.health().summary();
    info!(
        "{} ticks in {}: {} pairs synchronized, {} discarded",
        ticks,
        format_seconds(started.elapsed().as_secs()),
        synchronizer.ticks_emitted(),
        synchronizer.ticks_discarded()
    );
    info!(
        "Sent {} frames ({}), received {} frames ({}), {} rejected",
        sent.frames_processed,
        format_bytes(sent.bytes_processed),
        received.frames_processed,
        format_bytes(received.bytes_processed),
        received.decode_failures + received.decompress_failures
    );
    Ok(())
}
