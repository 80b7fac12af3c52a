use std::time::Duration;

/// HTTP constants
pub const PER_REQUEST_TIMEOUT: Duration = Duration::from_secs(3);
pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const DEFAULT_SCHEME: &str = "http://";

/// Run constants
pub const DEFAULT_TIME_LIMIT_SECS: u64 = 10;

/// Log file names, one per record format
pub const PLAIN_LOG_FILE: &str = "requests.txt";
pub const JSON_LOG_FILE: &str = "requests.json";

/// Channel capacities
pub const SINK_BUFFER: usize = 64;
pub const PASS_BUFFER: usize = 16;
