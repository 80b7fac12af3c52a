pub mod formatter;

pub use formatter::{
    RenderedBody, RequestResult, format_console, format_record, format_response, render_body,
};
