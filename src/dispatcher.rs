use futures::stream::{Stream, StreamExt};
use std::sync::Arc;
use tokio::task::JoinSet;

use crate::constants::PER_REQUEST_TIMEOUT;
use crate::context::RunSignal;
use crate::http::{Requester, build_request};
use crate::output::{RequestResult, format_console, format_record};
use crate::report::{ErrorContext, Reporter, Stage};
use crate::sink::{Forward, SinkHandle, SinkWriter};
use crate::types::RunConfig;

/// How a single worker ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Failed,
    Printed,
    Logged,
    Dropped,
}

/// Counters of one pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Results taken by the sink.
    pub logged: usize,
    /// Results the sink never took, because of cancellation or closing.
    pub dropped: usize,
}

impl PassSummary {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Failed => self.failed += 1,
            Outcome::Printed => self.succeeded += 1,
            Outcome::Logged => {
                self.succeeded += 1;
                self.logged += 1;
            }
            Outcome::Dropped => {
                self.succeeded += 1;
                self.dropped += 1;
            }
        }
    }

    pub fn merge(&mut self, other: &PassSummary) {
        self.attempted += other.attempted;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.logged += other.logged;
        self.dropped += other.dropped;
    }
}

/// Fans the URLs of a pass out to one task each
#[derive(Clone)]
pub struct Dispatcher {
    config: Arc<RunConfig>,
    requester: Arc<dyn Requester>,
    reporter: Arc<dyn Reporter>,
    signal: RunSignal,
}

impl Dispatcher {
    pub fn new(
        config: Arc<RunConfig>,
        requester: Arc<dyn Requester>,
        reporter: Arc<dyn Reporter>,
        signal: RunSignal,
    ) -> Self {
        Self {
            config,
            requester,
            reporter,
            signal,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn signal(&self) -> &RunSignal {
        &self.signal
    }

    /// Run one pass over `urls` and wait for every worker.
    ///
    /// The pass owns `sink` and closes it once all of its workers are done.
    pub async fn run_pass<S>(&self, urls: S, sink: Option<SinkHandle>) -> PassSummary
    where
        S: Stream<Item = String>,
    {
        let mut summary = PassSummary::default();
        let mut workers = JoinSet::new();
        let writer = sink.as_ref().map(SinkHandle::writer);

        let mut urls = std::pin::pin!(urls);
        while let Some(url) = urls.next().await {
            let worker = self.clone();
            let writer = writer.clone();
            workers.spawn(async move { worker.handle_request(url, writer).await });
            summary.attempted += 1;
        }
        drop(writer);

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(outcome) => summary.record(outcome),
                Err(e) => {
                    self.reporter.notice(&format!("worker stopped: {}", e));
                    summary.record(Outcome::Failed);
                }
            }
        }

        if let Some(sink) = sink {
            sink.close();
        }
        summary
    }

    fn fail(&self, url: &str, stage: Stage, error: &anyhow::Error) -> Outcome {
        let context = ErrorContext::Request {
            url: url.to_string(),
            stage,
        };
        self.reporter.report(&context, error);
        Outcome::Failed
    }

    async fn handle_request(&self, url: String, writer: Option<SinkWriter>) -> Outcome {
        let request = match build_request(&self.config, &url) {
            Ok(request) => request,
            Err(e) => return self.fail(&url, Stage::Build, &e),
        };

        let execute = self.requester.execute(request, self.config.show_body);
        let resp = match tokio::time::timeout(PER_REQUEST_TIMEOUT, execute).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(failure)) => return self.fail(&url, failure.stage, &failure.error),
            Err(_) => {
                let error = anyhow::anyhow!("no response within {:?}", PER_REQUEST_TIMEOUT);
                return self.fail(&url, Stage::Timeout, &error);
            }
        };

        let result = RequestResult::from_response(resp, &self.config);
        self.reporter
            .output(&format_console(&result, self.config.colored));

        let Some(writer) = writer else {
            return Outcome::Printed;
        };
        let record = format_record(&result, self.config.format);
        match writer.send(record, &self.signal).await {
            Forward::Delivered => Outcome::Logged,
            Forward::Abandoned | Forward::Closed => Outcome::Dropped,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::context::RunContext;
    use crate::http::{HttpRequester, PreparedRequest, RawResponse, RequestFailure, build_http_client};
    use crate::report::MemoryReporter;
    use crate::sink::spawn_sink;
    use crate::source::url_stream;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::sync::Mutex;
    use std::time::Duration;
    use wiremock::matchers::path;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Answers every request after `delay`, failing the URLs in `failing`.
    #[derive(Default)]
    pub(crate) struct FakeRequester {
        pub delay: Duration,
        pub failing: Vec<String>,
        pub body: Vec<u8>,
        pub calls: Mutex<Vec<String>>,
    }

    impl FakeRequester {
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Requester for FakeRequester {
        async fn execute(
            &self,
            request: PreparedRequest,
            read_body: bool,
        ) -> Result<RawResponse, RequestFailure> {
            let url = request.url.to_string();
            self.calls.lock().unwrap().push(url.clone());
            tokio::time::sleep(self.delay).await;

            if self.failing.contains(&url) {
                return Err(RequestFailure::new(
                    Stage::Send,
                    anyhow::anyhow!("connection refused"),
                ));
            }
            Ok(RawResponse {
                url,
                status: StatusCode::OK,
                body: read_body.then(|| self.body.clone()),
            })
        }
    }

    fn list(urls: &[&str]) -> Arc<[String]> {
        urls.iter().map(|s| s.to_string()).collect()
    }

    fn dispatcher(
        config: RunConfig,
        requester: Arc<dyn Requester>,
        reporter: Arc<MemoryReporter>,
        signal: RunSignal,
    ) -> Dispatcher {
        Dispatcher::new(Arc::new(config), requester, reporter, signal)
    }

    #[tokio::test]
    async fn test_pass_attempts_every_url() {
        let ctx = RunContext::with_deadline(Duration::from_secs(60));
        let requester = Arc::new(FakeRequester {
            failing: vec!["http://b/".to_string()],
            ..FakeRequester::default()
        });
        let reporter = Arc::new(MemoryReporter::default());
        let dispatcher = dispatcher(
            RunConfig::default(),
            requester.clone(),
            reporter.clone(),
            ctx.signal(),
        );

        let urls = list(&["http://a", "http://b", "http://c"]);
        let summary = dispatcher
            .run_pass(url_stream(urls, &ctx.signal()), None)
            .await;

        assert_eq!(summary.attempted, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(requester.calls().len(), 3);

        let mut outputs = reporter.outputs();
        outputs.sort();
        assert_eq!(outputs, vec!["http://a/ | 200 OK", "http://c/ | 200 OK"]);

        let errors = reporter.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].0,
            ErrorContext::Request {
                url: "http://b".to_string(),
                stage: Stage::Send
            }
        );
    }

    #[tokio::test]
    async fn test_empty_pass_completes_without_writes() {
        let ctx = RunContext::with_deadline(Duration::from_secs(60));
        let signal = ctx.signal();
        let reporter = Arc::new(MemoryReporter::default());
        let (sink, task) = spawn_sink(Vec::<u8>::new(), &signal, reporter.clone());
        let dispatcher = dispatcher(
            RunConfig::default(),
            Arc::new(FakeRequester::default()),
            reporter.clone(),
            signal.clone(),
        );

        let summary = dispatcher
            .run_pass(url_stream(list(&[]), &signal), Some(sink))
            .await;

        assert_eq!(summary, PassSummary::default());
        assert_eq!(task.await.unwrap().written, 0);
        assert!(reporter.outputs().is_empty());
    }

    #[tokio::test]
    async fn test_pass_logs_and_closes_sink() {
        let ctx = RunContext::with_deadline(Duration::from_secs(60));
        let signal = ctx.signal();
        let reporter = Arc::new(MemoryReporter::default());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requests.txt");
        let (sink, task) = crate::sink::open_log_sink(&path, &signal, reporter.clone())
            .await
            .unwrap();
        let dispatcher = dispatcher(
            RunConfig::default(),
            Arc::new(FakeRequester::default()),
            reporter,
            signal.clone(),
        );

        let summary = dispatcher
            .run_pass(url_stream(list(&["http://a", "http://b"]), &signal), Some(sink))
            .await;
        assert_eq!(summary.logged, 2);

        // Closing is the pass's job: the consumer ends on its own.
        let stats = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.written, 2);

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("http://a/ | 200 OK\n"));
        assert!(content.contains("http://b/ | 200 OK\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_request_times_out() {
        let ctx = RunContext::with_deadline(Duration::from_secs(60));
        let requester = Arc::new(FakeRequester {
            delay: Duration::from_secs(10),
            ..FakeRequester::default()
        });
        let reporter = Arc::new(MemoryReporter::default());
        let dispatcher = dispatcher(
            RunConfig::default(),
            requester,
            reporter.clone(),
            ctx.signal(),
        );

        let start = tokio::time::Instant::now();
        let summary = dispatcher
            .run_pass(url_stream(list(&["http://slow"]), &ctx.signal()), None)
            .await;

        assert_eq!(summary.failed, 1);
        assert!(start.elapsed() >= PER_REQUEST_TIMEOUT);
        assert!(start.elapsed() < Duration::from_secs(10));
        let errors = reporter.errors();
        assert_eq!(
            errors[0].0,
            ErrorContext::Request {
                url: "http://slow".to_string(),
                stage: Stage::Timeout
            }
        );
    }

    #[tokio::test]
    async fn test_build_error_does_not_stop_siblings() {
        let ctx = RunContext::with_deadline(Duration::from_secs(60));
        let reporter = Arc::new(MemoryReporter::default());
        let dispatcher = dispatcher(
            RunConfig::default(),
            Arc::new(FakeRequester::default()),
            reporter.clone(),
            ctx.signal(),
        );

        let summary = dispatcher
            .run_pass(url_stream(list(&["::bad::", "http://a"]), &ctx.signal()), None)
            .await;

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(
            reporter.errors()[0].0,
            ErrorContext::Request {
                url: "::bad::".to_string(),
                stage: Stage::Build
            }
        );
    }

    #[tokio::test]
    async fn test_forward_abandons_on_cancel() {
        let ctx = RunContext::with_deadline(Duration::from_secs(60));
        let signal = ctx.signal();
        // Room for one record and nobody reading.
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        let sink = SinkHandle::new(tx);
        let reporter = Arc::new(MemoryReporter::default());
        let dispatcher = dispatcher(
            RunConfig::default(),
            Arc::new(FakeRequester::default()),
            reporter,
            signal.clone(),
        );

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            ctx.cancel();
            ctx
        });

        // The URL stream itself is not cancelable here, so all three workers run.
        let urls = futures::stream::iter(vec![
            "http://a".to_string(),
            "http://b".to_string(),
            "http://c".to_string(),
        ]);
        let summary = tokio::time::timeout(
            Duration::from_secs(1),
            dispatcher.run_pass(urls, Some(sink)),
        )
        .await
        .unwrap();

        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.logged, 1);
        assert_eq!(summary.dropped, 2);
        drop(canceller.await.unwrap());
    }

    #[tokio::test]
    async fn test_pass_against_http_server() {
        let mock_server = MockServer::start().await;
        Mock::given(path("/list"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"[1,2,3,4]"#))
            .mount(&mock_server)
            .await;
        Mock::given(path("/text"))
            .respond_with(ResponseTemplate::new(500).set_body_string("plain failure"))
            .mount(&mock_server)
            .await;

        let ctx = RunContext::with_deadline(Duration::from_secs(60));
        let reporter = Arc::new(MemoryReporter::default());
        let config = RunConfig {
            show_body: true,
            body_limit: 2,
            ..RunConfig::default()
        };
        let requester = Arc::new(HttpRequester::new(build_http_client().unwrap()));
        let dispatcher = dispatcher(config, requester, reporter.clone(), ctx.signal());

        let urls = list(&[
            format!("{}/list", mock_server.uri()).as_str(),
            format!("{}/text", mock_server.uri()).as_str(),
        ]);
        let summary = dispatcher
            .run_pass(url_stream(urls, &ctx.signal()), None)
            .await;

        assert_eq!(summary.succeeded, 2);
        assert!(reporter.errors().is_empty());

        let outputs = reporter.outputs();
        let list_output = outputs.iter().find(|o| o.contains("/list")).unwrap();
        let (_, body) = list_output.split_once('\n').unwrap();
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(body).unwrap(),
            serde_json::json!([1, 2])
        );

        let text_output = outputs.iter().find(|o| o.contains("/text")).unwrap();
        assert!(text_output.contains("500 Internal Server Error"));
        assert!(text_output.ends_with("plain failure"));
    }
}
