//! Structured logging utilities for Mirage components.
//!
//! Provides consistent logging with component prefixes and structured fields.

/// Component identifiers for log filtering
pub struct Component;

impl Component {
    pub const SESSION: &'static str = "SESSION";
    pub const DIR: &'static str = "DIR";
    pub const FILE: &'static str = "FILE";
    pub const REGISTRY: &'static str = "REGISTRY";
    pub const ADAPTER: &'static str = "ADAPTER";
}

/// Log levels for runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Initialize logging with the given level filter.
/// Call this once at test-session startup; `MIRAGE_LOG`/`RUST_LOG` style
/// env filters take precedence when set.
pub fn init_logging(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let filter = match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}
