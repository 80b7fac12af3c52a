use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::constants::{PASS_BUFFER, SINK_BUFFER};
use crate::context::RunSignal;
use crate::report::{ErrorContext, Reporter};
use crate::types::RunConfig;

/// Outcome of forwarding one record to the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forward {
    Delivered,
    /// The run was cancelled before the sink took the record.
    Abandoned,
    /// The sink no longer accepts records.
    Closed,
}

/// Per-pass records carry an ack for the outcome at the shared sink.
type Relayed = (String, oneshot::Sender<Forward>);

#[derive(Debug, Clone)]
enum Route {
    Direct(mpsc::Sender<String>),
    Relay(mpsc::Sender<Relayed>),
}

impl Route {
    fn is_closed(&self) -> bool {
        match self {
            Route::Direct(tx) => tx.is_closed(),
            Route::Relay(tx) => tx.is_closed(),
        }
    }
}

/// Sole owner of the producer side of a sink.
///
/// Not `Clone`: whoever holds it is the one component allowed to close it.
/// Producers get [`SinkWriter`]s, which can send but never close.
#[derive(Debug)]
pub struct SinkHandle {
    route: Route,
}

impl SinkHandle {
    pub(crate) fn new(tx: mpsc::Sender<String>) -> Self {
        Self {
            route: Route::Direct(tx),
        }
    }

    pub fn writer(&self) -> SinkWriter {
        SinkWriter {
            route: self.route.clone(),
        }
    }

    /// Open a per-pass channel that feeds into this sink.
    ///
    /// A record sent through it resolves only once this sink took it, or
    /// gave up on it, so the sender always learns its real outcome. The
    /// forwarding task ends once the returned handle is closed and its
    /// writers are gone.
    pub fn pass_channel(&self, signal: &RunSignal) -> SinkHandle {
        let (tx, mut rx) = mpsc::channel::<Relayed>(PASS_BUFFER);
        let upstream = self.writer();
        let signal = signal.clone();

        tokio::spawn(async move {
            // Keeps draining after cancellation: every queued record gets
            // `Abandoned` back instead of vanishing with the channel.
            while let Some((record, ack)) = rx.recv().await {
                let outcome = upstream.send(record, &signal).await;
                let _ = ack.send(outcome);
            }
        });

        SinkHandle {
            route: Route::Relay(tx),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.route.is_closed()
    }

    /// Give up ownership. The consumer finishes once the last writer is gone.
    pub fn close(self) {
        drop(self.route);
    }
}

/// Producer side of a sink, shared by the workers of a pass
#[derive(Debug, Clone)]
pub struct SinkWriter {
    route: Route,
}

impl SinkWriter {
    /// Send `record`, giving up as soon as the run is cancelled.
    ///
    /// `Delivered` means the run's sink accepted the record, also when it
    /// went through a per-pass channel.
    pub async fn send(&self, record: String, signal: &RunSignal) -> Forward {
        if signal.is_cancelled() {
            return Forward::Abandoned;
        }
        match &self.route {
            Route::Direct(tx) => tokio::select! {
                biased;
                _ = signal.cancelled() => Forward::Abandoned,
                sent = tx.send(record) => match sent {
                    Ok(()) => Forward::Delivered,
                    Err(_) => Forward::Closed,
                },
            },
            Route::Relay(tx) => {
                let (ack_tx, ack_rx) = oneshot::channel();
                let queued = tokio::select! {
                    biased;
                    _ = signal.cancelled() => return Forward::Abandoned,
                    sent = tx.send((record, ack_tx)) => sent,
                };
                if queued.is_err() {
                    return Forward::Closed;
                }
                // The forwarder answers promptly once the run is cancelled.
                ack_rx.await.unwrap_or(Forward::Closed)
            }
        }
    }
}

/// Records written by a finished sink
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SinkStats {
    pub written: usize,
    pub discarded: usize,
}

/// Start the consumer task writing records to `writer`.
pub fn spawn_sink<W>(
    writer: W,
    signal: &RunSignal,
    reporter: Arc<dyn Reporter>,
) -> (SinkHandle, JoinHandle<SinkStats>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(SINK_BUFFER);
    let signal = signal.clone();
    let task = tokio::spawn(consume(rx, writer, signal, reporter));
    (SinkHandle::new(tx), task)
}

/// Open the append-only log file and start its sink.
pub async fn open_log_sink(
    path: &Path,
    signal: &RunSignal,
    reporter: Arc<dyn Reporter>,
) -> Result<(SinkHandle, JoinHandle<SinkStats>)> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("cannot open {} to write logs", path.display()))?;
    Ok(spawn_sink(BufWriter::new(file), signal, reporter))
}

/// Start the log sink when `-f` asked for one.
///
/// A log file that cannot be opened is reported and leaves the run without
/// logging; it never stops the run.
pub async fn open_optional_log_sink(
    config: &RunConfig,
    signal: &RunSignal,
    reporter: Arc<dyn Reporter>,
) -> Option<(SinkHandle, JoinHandle<SinkStats>)> {
    if !config.write_output {
        return None;
    }
    match open_log_sink(&config.log_path, signal, reporter.clone()).await {
        Ok(sink) => Some(sink),
        Err(e) => {
            reporter.report(&ErrorContext::Sink, &e);
            None
        }
    }
}

async fn write_record<W>(writer: &mut W, record: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(record.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Destination owned by the consumer task
struct LogWriter<W> {
    // Dropped after the first write error; later records are discarded.
    writer: Option<W>,
    stats: SinkStats,
    reporter: Arc<dyn Reporter>,
}

impl<W> LogWriter<W>
where
    W: AsyncWrite + Unpin,
{
    async fn write(&mut self, record: &str) {
        let Some(writer) = self.writer.as_mut() else {
            self.stats.discarded += 1;
            return;
        };
        match write_record(writer, record).await {
            Ok(()) => self.stats.written += 1,
            Err(e) => {
                self.reporter
                    .report(&ErrorContext::Sink, &e.context("logging disabled"));
                self.writer = None;
                self.stats.discarded += 1;
            }
        }
    }

    async fn finish(mut self) -> SinkStats {
        if let Some(mut writer) = self.writer.take()
            && let Err(e) = writer.shutdown().await
        {
            self.reporter
                .report(&ErrorContext::Sink, &anyhow::Error::from(e));
        }
        self.stats
    }
}

async fn consume<W>(
    mut rx: mpsc::Receiver<String>,
    writer: W,
    signal: RunSignal,
    reporter: Arc<dyn Reporter>,
) -> SinkStats
where
    W: AsyncWrite + Unpin,
{
    let mut log = LogWriter {
        writer: Some(writer),
        stats: SinkStats::default(),
        reporter,
    };

    loop {
        tokio::select! {
            biased;
            record = rx.recv() => match record {
                Some(record) => log.write(&record).await,
                None => break,
            },
            _ = signal.cancelled() => {
                // Refuse new records, keep the ones already accepted.
                rx.close();
                while let Some(record) = rx.recv().await {
                    log.write(&record).await;
                }
                break;
            }
        }
    }

    log.finish().await
}
