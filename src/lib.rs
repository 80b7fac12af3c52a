pub mod constants;
pub mod context;
pub mod dispatcher;
pub mod http;
pub mod output;
pub mod report;
pub mod scheduler;
pub mod sink;
pub mod source;
pub mod types;
