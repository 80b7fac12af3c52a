use anyhow::{Result, anyhow};
use std::sync::Arc;
use tokio::time::{Instant, MissedTickBehavior};

use crate::dispatcher::{Dispatcher, PassSummary};
use crate::sink::SinkHandle;
use crate::source::url_stream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    AwaitingTick,
    Running,
    Canceled,
    Done,
}

/// Totals of a whole run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub passes: usize,
    pub requests: PassSummary,
    /// The run ended on its deadline or on cancellation.
    pub canceled: bool,
}

impl RunSummary {
    fn record(&mut self, pass: &PassSummary) {
        self.passes += 1;
        self.requests.merge(pass);
    }
}

/// Runs one pass, or one pass per tick until the run is cancelled.
pub struct Scheduler {
    dispatcher: Dispatcher,
    urls: Arc<[String]>,
    state: SchedulerState,
}

impl Scheduler {
    pub fn new(dispatcher: Dispatcher, urls: Arc<[String]>) -> Self {
        Self {
            dispatcher,
            urls,
            state: SchedulerState::Idle,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Drive the run to its end. `sink` is handed to the single pass in
    /// single-pass mode and kept and closed here in repeating mode.
    pub async fn run(&mut self, sink: Option<SinkHandle>) -> Result<RunSummary> {
        if self.dispatcher.config().is_repeating() {
            self.run_repeating(sink).await
        } else {
            Ok(self.run_single(sink).await)
        }
    }

    async fn run_single(&mut self, sink: Option<SinkHandle>) -> RunSummary {
        self.state = SchedulerState::Running;
        let urls = url_stream(self.urls.clone(), self.dispatcher.signal());
        let pass = self.dispatcher.run_pass(urls, sink).await;

        let mut summary = RunSummary::default();
        summary.record(&pass);
        self.state = SchedulerState::Done;
        summary
    }

    async fn run_repeating(&mut self, sink: Option<SinkHandle>) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        if self.urls.is_empty() {
            if let Some(sink) = sink {
                sink.close();
            }
            self.state = SchedulerState::Done;
            return Ok(summary);
        }

        let rate = self.dispatcher.config().rate;
        let signal = self.dispatcher.signal().clone();
        let mut ticker = tokio::time::interval_at(Instant::now() + rate, rate);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let outcome = loop {
            self.state = SchedulerState::AwaitingTick;
            tokio::select! {
                biased;
                _ = signal.cancelled() => {
                    self.state = SchedulerState::Canceled;
                    summary.canceled = true;
                    break Ok(());
                }
                _ = ticker.tick() => {}
            }

            if let Some(sink) = &sink
                && sink.is_closed()
            {
                break Err(anyhow!("output sink closed before the run finished"));
            }

            self.state = SchedulerState::Running;
            let pass_sink = sink.as_ref().map(|s| s.pass_channel(&signal));
            let urls = url_stream(self.urls.clone(), &signal);
            let pass = self.dispatcher.run_pass(urls, pass_sink).await;
            summary.record(&pass);
        };

        if let Some(sink) = sink {
            sink.close();
        }
        self.state = SchedulerState::Done;
        outcome.map(|_| summary)
    }
}
