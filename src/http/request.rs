use anyhow::{Context, Result, bail};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, Url};

use crate::constants::JSON_CONTENT_TYPE;
use crate::types::RunConfig;

/// A request that passed validation and only needs sending
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub body: Option<String>,
}

impl PreparedRequest {
    /// Attach the request to `client`, setting the JSON content type when a
    /// body is present.
    pub fn to_builder(&self, client: &Client) -> reqwest::RequestBuilder {
        let mut request_builder = client.request(self.method.clone(), self.url.clone());

        if let Some(body_content) = &self.body {
            request_builder = request_builder
                .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
                .body(body_content.clone());
        }

        request_builder
    }
}

/// Build an HTTP request for `url` from the run configuration
pub fn build_request(config: &RunConfig, url: &str) -> Result<PreparedRequest> {
    let method = Method::from_bytes(config.method.as_bytes())
        .with_context(|| format!("invalid method '{}'", config.method))?;

    let url = Url::parse(url).with_context(|| format!("invalid url '{}'", url))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("unsupported scheme '{}'", url.scheme());
    }

    Ok(PreparedRequest {
        method,
        url,
        body: config.request_body.clone(),
    })
}
