//! `camtrack` – pose smoothing filter for a camera-based tracker.
//!
//! Reads `geometry_msgs/PoseStamped` messages in rosbridge JSON, one per line,
//! from stdin; writes a rosbridge publish envelope for every filtered pose to
//! stdout.
//!
//! ```text
//! camtrack               # run with ~/.camtrack/config.toml (or defaults)
//! camtrack init-config   # write the default config file and exit
//! ```
//!
//! Inside the process every message crosses the event bus:
//!
//! ```text
//! stdin ─▶ RosBridge::ingest_pose_stamped ─▶ Observations
//!          Observations ─▶ TrackerNode::run_until ─▶ FilteredPoses
//!          FilteredPoses ─▶ forward ─▶ stdout
//! ```

mod config;
mod telemetry;

use std::future::Future;
use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use camtrack_middleware::{
    EventBus, MAX_MESSAGE_BYTES, RosBridge, Topic, TopicReceiver, TrackerNode,
};
use camtrack_types::{Event, EventPayload};

/// Counters reported when the input stream ends.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Summary {
    received: usize,
    emitted: usize,
    skipped: usize,
    interrupted: bool,
}

/// Outcome of reading one input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Line {
    Complete,
    /// Longer than [`MAX_MESSAGE_BYTES`]; the line was consumed but not kept.
    TooLong,
}

#[tokio::main]
async fn main() -> ExitCode {
    let guard = telemetry::init_tracing("camtrack");

    let path = config::config_path();

    if std::env::args().nth(1).as_deref() == Some("init-config") {
        return match config::save_to(&config::Config::default(), &path) {
            Ok(()) => {
                info!(path = %path.display(), "default config written");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = %e, "could not write config");
                ExitCode::FAILURE
            }
        };
    }

    let cfg = match config::load_from(&path) {
        Ok(Some(cfg)) => {
            info!(path = %path.display(), "config loaded");
            cfg
        }
        Ok(None) => {
            info!(path = %path.display(), "no config file; using defaults");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            error!(error = %e, "config error");
            return ExitCode::FAILURE;
        }
    };

    let parts = EventBus::new(cfg.bus_capacity)
        .and_then(|bus| Ok((bus, cfg.build_smoother()?)));
    let (bus, smoother) = match parts {
        Ok(parts) => parts,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    let bus = Arc::new(bus);
    let bridge = RosBridge::new(bus.clone(), cfg.output_topic.clone());
    let node = TrackerNode::new(smoother, bus);

    info!(
        history_size = cfg.history_size,
        output_frame = %cfg.output_frame_id,
        output_topic = %cfg.output_topic,
        "camtrack running"
    );

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received; shutting down"),
            Err(e) => {
                warn!(error = %e, "Ctrl-C handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    let stdin = BufReader::new(tokio::io::stdin());
    match run(stdin, tokio::io::stdout(), node, bridge, shutdown).await {
        Ok((summary, _)) => {
            info!(
                received = summary.received,
                emitted = summary.emitted,
                skipped = summary.skipped,
                "input closed"
            );
            if summary.interrupted {
                // The blocking stdin read cannot be cancelled and would keep
                // the runtime from shutting down.
                drop(guard);
                std::process::exit(0);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "i/o error");
            ExitCode::FAILURE
        }
    }
}

/// Run the whole pipeline until `input` ends or `shutdown` resolves.
///
/// The tracker and the output writer run as their own tasks, subscribed to
/// the bus before the first line is read. Once input stops, observations
/// already on the bus are still filtered and written before this returns.
async fn run<R, W, F>(
    mut input: R,
    output: W,
    node: TrackerNode,
    bridge: RosBridge,
    shutdown: F,
) -> io::Result<(Summary, W)>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
    F: Future<Output = ()>,
{
    let observations = node.bus().subscribe_to(Topic::Observations);
    let filtered = node.bus().subscribe_to(Topic::FilteredPoses);

    let (input_done, input_done_rx) = oneshot::channel::<()>();
    let (tracker_done, tracker_done_rx) = oneshot::channel::<()>();

    let tracker = tokio::spawn(node.run_until(observations, async move {
        let _ = input_done_rx.await;
    }));
    let writer = tokio::spawn(forward(filtered, output, bridge.clone(), async move {
        let _ = tracker_done_rx.await;
    }));

    let mut summary = Summary::default();
    tokio::pin!(shutdown);
    let (read, interrupted) = tokio::select! {
        result = read_input(&mut input, &bridge, &mut summary) => (result, false),
        () = &mut shutdown => (Ok(()), true),
    };
    summary.interrupted = interrupted;

    let _ = input_done.send(());
    let smoother = tracker.await.map_err(io::Error::other)?;
    debug!(window = smoother.history().len(), "tracker drained");
    let _ = tracker_done.send(());
    let (output, emitted) = writer.await.map_err(io::Error::other)??;

    read?;
    summary.emitted = emitted;
    Ok((summary, output))
}

/// Publish every line of `input` on the bus. Blank lines are ignored;
/// oversized or unparseable ones are logged and counted as skipped.
async fn read_input<R>(
    input: &mut R,
    bridge: &RosBridge,
    summary: &mut Summary,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    while let Some(line) = read_capped_line(input, &mut buf).await? {
        if line == Line::TooLong {
            warn!(limit = MAX_MESSAGE_BYTES, "skipping oversized message");
            summary.skipped += 1;
            continue;
        }
        let text = String::from_utf8_lossy(&buf);
        if text.trim().is_empty() {
            continue;
        }
        match bridge.ingest_pose_stamped(&text) {
            Ok(_) => summary.received += 1,
            Err(e) => {
                warn!(error = %e, "skipping unparseable message");
                summary.skipped += 1;
            }
        }
        // Let the tracker drain the observation channel before it fills up.
        tokio::task::yield_now().await;
    }
    Ok(())
}

/// Read one `\n`-terminated line into `buf`, without the terminator.
///
/// At most [`MAX_MESSAGE_BYTES`] are ever buffered: a longer line is read to
/// its end and discarded. `Ok(None)` means end of input.
async fn read_capped_line<R>(
    input: &mut R,
    buf: &mut Vec<u8>,
) -> io::Result<Option<Line>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let mut started = false;
    let mut line = Line::Complete;
    loop {
        let available = input.fill_buf().await?;
        if available.is_empty() {
            return Ok(started.then_some(line));
        }
        started = true;

        let newline = available.iter().position(|&b| b == b'\n');
        let end = newline.unwrap_or(available.len());
        if line == Line::Complete {
            if buf.len() + end > MAX_MESSAGE_BYTES {
                line = Line::TooLong;
                buf.clear();
            } else {
                buf.extend_from_slice(&available[..end]);
            }
        }
        let used = newline.map_or(end, |i| i + 1);
        input.consume(used);

        if newline.is_some() {
            return Ok(Some(line));
        }
    }
}

/// Write every filtered pose on `rx` to `output` until `done` resolves.
///
/// Events already buffered in `rx` are written before `done` is looked at.
/// Returns the writer and the number of poses written.
async fn forward<W, F>(
    mut rx: TopicReceiver,
    mut output: W,
    bridge: RosBridge,
    done: F,
) -> io::Result<(W, usize)>
where
    W: AsyncWrite + Unpin,
    F: Future<Output = ()>,
{
    tokio::pin!(done);
    let mut emitted = 0;
    loop {
        tokio::select! {
            biased;
            result = rx.recv() => match result {
                Ok(Event { payload: EventPayload::Filtered(filtered), .. }) => {
                    match bridge.encode(&filtered) {
                        Ok(text) => {
                            output.write_all(text.as_bytes()).await?;
                            output.write_all(b"\n").await?;
                            output.flush().await?;
                            emitted += 1;
                        }
                        Err(e) => warn!(error = %e, "could not encode filtered pose"),
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => {
                    warn!(lagged_by = n, "output lagged; filtered poses dropped");
                }
                Err(RecvError::Closed) => break,
            },
            () = &mut done => break,
        }
    }
    Ok((output, emitted))
}
