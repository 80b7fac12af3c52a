use colored::*;
use std::fmt;
#[cfg(test)]
use std::sync::Mutex;

/// Operation a request failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Build,
    Send,
    Timeout,
    ReadBody,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Build => "build request",
            Stage::Send => "send request",
            Stage::Timeout => "timeout",
            Stage::ReadBody => "read body",
        };
        f.write_str(name)
    }
}

/// Where a reported error came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorContext {
    Request { url: String, stage: Stage },
    Sink,
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorContext::Request { url, stage } => write!(f, "[{}] - {}", url, stage),
            ErrorContext::Sink => f.write_str("[log file]"),
        }
    }
}

/// Console side of a run: results, errors and notices.
pub trait Reporter: Send + Sync {
    /// A formatted result, printed whole.
    fn output(&self, text: &str);

    fn report(&self, context: &ErrorContext, error: &anyhow::Error);

    fn notice(&self, message: &str);
}

/// Writes results to stdout and diagnostics to stderr.
pub struct ConsoleReporter {
    colored: bool,
}

impl ConsoleReporter {
    pub fn new(colored: bool) -> Self {
        if !colored {
            colored::control::set_override(false);
        }
        Self { colored }
    }
}

impl Reporter for ConsoleReporter {
    fn output(&self, text: &str) {
        println!("{}", text);
    }

    fn report(&self, context: &ErrorContext, error: &anyhow::Error) {
        let tag = if self.colored {
            "[Error]".red().to_string()
        } else {
            "[Error]".to_string()
        };
        eprintln!("{} {}: {:#}", tag, context, error);
    }

    fn notice(&self, message: &str) {
        eprintln!("[Info] {}", message);
    }
}

/// Keeps results and errors in memory instead of printing them.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryReporter {
    outputs: Mutex<Vec<String>>,
    errors: Mutex<Vec<(ErrorContext, String)>>,
}

#[cfg(test)]
impl MemoryReporter {
    pub fn outputs(&self) -> Vec<String> {
        self.outputs.lock().map(|o| o.clone()).unwrap_or_default()
    }

    pub fn errors(&self) -> Vec<(ErrorContext, String)> {
        self.errors.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
impl Reporter for MemoryReporter {
    fn output(&self, text: &str) {
        if let Ok(mut outputs) = self.outputs.lock() {
            outputs.push(text.to_string());
        }
    }

    fn report(&self, context: &ErrorContext, error: &anyhow::Error) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.push((context.clone(), format!("{:#}", error)));
        }
    }

    fn notice(&self, _message: &str) {}
}
