use futures::stream::{self, Stream, StreamExt};
use std::io::BufRead;
use std::sync::Arc;

use crate::constants::DEFAULT_SCHEME;
use crate::context::RunSignal;

/// Fresh URL sequence for one pass.
///
/// Every call starts again from the first URL. The stream ends early, without
/// error, once `signal` is cancelled.
pub fn url_stream(urls: Arc<[String]>, signal: &RunSignal) -> impl Stream<Item = String> + use<> {
    let len = urls.len();
    stream::iter(0..len)
        .map(move |i| urls[i].clone())
        .take_until(signal.cancelled_owned())
}

/// Add the default scheme to a target written without one
fn normalize_target(target: &str) -> Option<String> {
    let trimmed = target.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.contains("://") {
        Some(trimmed.to_string())
    } else {
        Some(format!("{}{}", DEFAULT_SCHEME, trimmed))
    }
}

/// Build the URL list of a run from the command line and, optionally, extra
/// lines read from `extra`.
pub fn collect_targets<R: BufRead>(args: &[String], extra: Option<R>) -> Arc<[String]> {
    let mut targets: Vec<String> = args.iter().filter_map(|a| normalize_target(a)).collect();

    if let Some(reader) = extra {
        targets.extend(
            reader
                .lines()
                .map_while(Result::ok)
                .filter_map(|line| normalize_target(&line)),
        );
    }

    targets.into()
}
