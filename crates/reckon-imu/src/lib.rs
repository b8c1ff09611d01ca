pub mod angles;
pub mod calibrator;
pub mod integrator;
pub mod protocol;
pub mod session;
pub mod stats;
pub mod types;

pub use calibrator::ReferenceCalibrator;
pub use integrator::{IntegrationOutcome, MotionIntegrator};
pub use protocol::{LineParser, ProtocolError};
pub use session::{Clock, EstimateSink, FixedRateClock, LogSink, MonotonicClock, Session};
pub use stats::SessionStats;
pub use types::*;

use anyhow::{anyhow, Result};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};

/// Sinks the read loop fans estimates out to.
pub type Sinks = Vec<Box<dyn EstimateSink + Send>>;

/// Commands sent to the IMU processing task.
enum ImuCommand {
    Reset,
    Shutdown,
}

/// Client for a line-oriented IMU feed.
///
/// Reads the feed on a background task, parses lines, runs the session, and
/// publishes the latest estimate.
pub struct ImuClient {
    estimate_rx: watch::Receiver<Option<Estimate>>,
    command_tx: mpsc::UnboundedSender<ImuCommand>,
    task: Option<tokio::task::JoinHandle<SessionStats>>,
}

impl ImuClient {
    /// Connect to a TCP line feed and start processing.
    pub async fn connect_tcp(
        addr: &str,
        session: Session,
        sinks: Sinks,
        drain_to_latest: bool,
    ) -> Result<Self> {
        tracing::info!(%addr, "Connecting to IMU feed");

        let stream = TcpStream::connect(addr).await?;
        tracing::info!("Connected to IMU feed");

        Ok(Self::spawn(stream, session, sinks, drain_to_latest))
    }

    /// Start processing any byte stream carrying the line protocol.
    pub fn spawn<R>(reader: R, session: Session, sinks: Sinks, drain_to_latest: bool) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (estimate_tx, estimate_rx) = watch::channel(None);
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(imu_read_loop(
            reader,
            session,
            sinks,
            estimate_tx,
            command_rx,
            drain_to_latest,
        ));

        Self {
            estimate_rx,
            command_tx,
            task: Some(task),
        }
    }

    /// Get the latest estimate (non-blocking).
    pub fn latest(&self) -> Option<Estimate> {
        *self.estimate_rx.borrow()
    }

    /// Receiver that is notified on every new estimate.
    pub fn subscribe(&self) -> watch::Receiver<Option<Estimate>> {
        self.estimate_rx.clone()
    }

    /// Start a new session on the same feed; the next sample becomes the reference.
    pub fn reset(&self) {
        let _ = self.command_tx.send(ImuCommand::Reset);
    }

    /// Stop reading. `join` then returns promptly.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(ImuCommand::Shutdown);
    }

    /// Wait for the feed to end and return the final session statistics.
    ///
    /// The statistics are handed out once; later calls return an error.
    pub async fn join(&mut self) -> Result<SessionStats> {
        let task = self
            .task
            .as_mut()
            .ok_or_else(|| anyhow!("IMU task already joined"))?;
        // Left in place until the task finishes, so a cancelled join can be retried.
        let result = task.await;
        self.task = None;
        Ok(result?)
    }
}

/// Background task: read the feed, parse lines, run the session, publish estimates.
async fn imu_read_loop<R>(
    mut reader: R,
    mut session: Session,
    mut sinks: Sinks,
    estimate_tx: watch::Sender<Option<Estimate>>,
    mut command_rx: mpsc::UnboundedReceiver<ImuCommand>,
    drain_to_latest: bool,
) -> SessionStats
where
    R: AsyncRead + Unpin,
{
    let mut parser = LineParser::new();
    let mut buf = [0u8; 4096];

    let mut handle = |session: &mut Session, sample: Sample| {
        if let Some(estimate) = session.process(sample, &mut sinks) {
            let _ = estimate_tx.send(Some(estimate));
        }
        let seen = session.stats().samples;
        if seen > 0 && seen % 1000 == 0 {
            tracing::debug!(samples = seen, "IMU samples processed");
        }
    };

    loop {
        tokio::select! {
            // Commands first, so a reset lands before bytes that arrived after it.
            biased;

            Some(cmd) = command_rx.recv() => {
                match cmd {
                    ImuCommand::Reset => session.reset(),
                    ImuCommand::Shutdown => break,
                }
            }
            result = reader.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        tracing::info!("IMU feed closed");
                        if let Some(Ok(sample)) = parser.finish() {
                            handle(&mut session, sample);
                        }
                        break;
                    }
                    Ok(n) => {
                        parser.push_data(&buf[..n]);

                        if drain_to_latest {
                            if let Some(sample) = parser.latest_sample() {
                                handle(&mut session, sample);
                            }
                            continue;
                        }

                        // Drain all available samples.
                        while let Some(result) = parser.next_sample() {
                            match result {
                                Ok(sample) => handle(&mut session, sample),
                                Err(e) => tracing::trace!(?e, "Dropping malformed line"),
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!(?e, "IMU read error");
                        break;
                    }
                }
            }
        }
    }

    session.stats().clone()
}
