pub mod client;
pub mod request;

pub use client::{HttpRequester, RawResponse, RequestFailure, Requester, build_http_client};
pub use request::{PreparedRequest, build_request};
