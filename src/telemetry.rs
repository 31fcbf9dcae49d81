//! Tracing setup for the server.
//!
//! LOG_LEVEL is an `EnvFilter` directive string ("debug", or e.g.
//! "info,batch=debug,story=debug,tower_http=info"). LOG_FORMAT picks
//! human-readable output (default) or one JSON object per event.
//!
//! Targets used by the core: `dailyread_backend` (startup/config), `batch`
//! (provider calls and batch lifecycle), `story` (extraction and storage).

use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVES: &str = "info,batch=debug,story=info,dailyread_backend=debug,tower_http=info,axum=info";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_env_value(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));
    let format = LogFormat::from_env_value(std::env::var("LOG_FORMAT").ok().as_deref());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    match format {
        LogFormat::Json => builder.json().with_current_span(true).with_ansi(false).init(),
        LogFormat::Pretty => builder.init(),
    }

    tracing::debug!(target: "dailyread_backend", ?format, "Tracing initialized");
}
