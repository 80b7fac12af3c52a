use anyhow::Result;
use clap::Parser;
use std::io;
use std::sync::Arc;

use reqpulse::context::RunContext;
use reqpulse::dispatcher::Dispatcher;
use reqpulse::http::{HttpRequester, build_http_client};
use reqpulse::report::{ConsoleReporter, Reporter};
use reqpulse::scheduler::Scheduler;
use reqpulse::sink::open_optional_log_sink;
use reqpulse::source::collect_targets;
use reqpulse::types::{Cli, RunConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Arc::new(RunConfig::from_cli(&cli)?);
    let reporter: Arc<dyn Reporter> = Arc::new(ConsoleReporter::new(config.colored));

    let stdin = cli.stdin.then(|| io::stdin().lock());
    let urls = collect_targets(&cli.urls, stdin);
    if urls.is_empty() {
        reporter.notice("no target URLs given");
    }

    let client = build_http_client()?;

    let ctx = RunContext::with_deadline(config.time_limit);
    ctx.cancel_on_ctrl_c();
    let signal = ctx.signal();

    let (sink, sink_task) = open_optional_log_sink(&config, &signal, reporter.clone())
        .await
        .unzip();

    let requester = Arc::new(HttpRequester::new(client));
    let dispatcher = Dispatcher::new(config.clone(), requester, reporter.clone(), signal);
    let mut scheduler = Scheduler::new(dispatcher, urls);
    let summary = scheduler.run(sink).await;

    if let Some(task) = sink_task {
        match task.await {
            Ok(stats) if stats.discarded > 0 => reporter.notice(&format!(
                "{} records appended to {}, {} discarded after a write error",
                stats.written,
                config.log_path.display(),
                stats.discarded
            )),
            Ok(stats) if stats.written > 0 => reporter.notice(&format!(
                "{} records appended to {}",
                stats.written,
                config.log_path.display()
            )),
            Ok(_) => {}
            Err(e) => reporter.notice(&format!("log writer stopped: {}", e)),
        }
    }

    let summary = summary?;
    if summary.canceled {
        reporter.notice(&format!(
            "run stopped after {} passes ({} requests, {} failed)",
            summary.passes, summary.requests.attempted, summary.requests.failed
        ));
    }

    Ok(())
}
