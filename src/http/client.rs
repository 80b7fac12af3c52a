use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::fmt;

use crate::constants::PER_REQUEST_TIMEOUT;
use crate::http::request::PreparedRequest;
use crate::report::Stage;

/// What a worker gets back from a successful request
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub url: String,
    pub status: StatusCode,
    /// Only read when the body is going to be shown.
    pub body: Option<Vec<u8>>,
}

/// A failed request and the operation it failed in
#[derive(Debug)]
pub struct RequestFailure {
    pub stage: Stage,
    pub error: anyhow::Error,
}

impl RequestFailure {
    pub fn new(stage: Stage, error: impl Into<anyhow::Error>) -> Self {
        Self {
            stage,
            error: error.into(),
        }
    }
}

impl fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:#}", self.stage, self.error)
    }
}

/// Sends one request and reads its response.
#[async_trait]
pub trait Requester: Send + Sync {
    async fn execute(
        &self,
        request: PreparedRequest,
        read_body: bool,
    ) -> Result<RawResponse, RequestFailure>;
}

/// [`Requester`] backed by a shared reqwest client
#[derive(Debug, Clone)]
pub struct HttpRequester {
    client: Client,
}

impl HttpRequester {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Requester for HttpRequester {
    async fn execute(
        &self,
        request: PreparedRequest,
        read_body: bool,
    ) -> Result<RawResponse, RequestFailure> {
        let resp = request
            .to_builder(&self.client)
            .send()
            .await
            .map_err(|e| {
                let stage = if e.is_timeout() {
                    Stage::Timeout
                } else {
                    Stage::Send
                };
                RequestFailure::new(stage, e)
            })?;

        let url = resp.url().to_string();
        let status = resp.status();

        let body = if read_body {
            let bytes = resp
                .bytes()
                .await
                .map_err(|e| RequestFailure::new(Stage::ReadBody, e))?;
            Some(bytes.to_vec())
        } else {
            None
        };

        Ok(RawResponse { url, status, body })
    }
}

/// Build the HTTP client shared by every worker of a run
pub fn build_http_client() -> Result<Client> {
    let client = Client::builder()
        .timeout(PER_REQUEST_TIMEOUT)
        .user_agent(concat!("reqpulse/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}
