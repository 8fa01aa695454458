//! # Logging Module
//!
//! Environment-aware console logging using the tracing ecosystem. Output goes
//! to stdout so containers capture it; set `COURIER_LOG_FORMAT=json` for one
//! JSON object per line.
//!
//! Level selection, first match wins:
//! 1. `RUST_LOG` (any `EnvFilter` directive)
//! 2. the environment name: `production` logs at `info`, everything else at
//!    `debug`
//!
//! [`init_tracing_for`] takes the environment name from a loaded
//! [`CourierConfig`], the same value [`CourierConfig::is_production`] reads.
//! [`init_tracing`] runs before any configuration exists and reads
//! `COURIER_ENV` instead.

use std::io::IsTerminal;
use std::sync::OnceLock;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::CourierConfig;

static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Environment variable naming the deployment environment
pub const ENVIRONMENT_ENV: &str = "COURIER_ENV";

/// Environment variable selecting the output format (`json` or `pretty`)
pub const LOG_FORMAT_ENV: &str = "COURIER_LOG_FORMAT";

/// Install the global subscriber, naming the environment from `COURIER_ENV`.
///
/// Safe to call more than once and from tests; if the host application has
/// already installed a subscriber it is kept.
pub fn init_tracing() {
    install(get_environment());
}

/// Install the global subscriber for the environment named in `config`.
///
/// Same once-only rules as [`init_tracing`]; whichever runs first wins.
pub fn init_tracing_for(config: &CourierConfig) {
    install(config.environment.clone());
}

fn install(environment: String) {
    TRACING_INITIALIZED.get_or_init(|| {
        let filter = std::env::var("RUST_LOG")
            .ok()
            .and_then(|directives| EnvFilter::try_new(directives).ok())
            .unwrap_or_else(|| EnvFilter::new(get_log_level(&environment)));
        let json = use_json_format(std::env::var(LOG_FORMAT_ENV).ok().as_deref());

        let layer = if json {
            fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(true)
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(std::io::stdout().is_terminal())
                .with_filter(filter)
                .boxed()
        };

        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized, keeping it");
            return;
        }

        tracing::info!(environment = %environment, json, "Console logging initialized");
    });
}

fn get_environment() -> String {
    std::env::var(ENVIRONMENT_ENV).unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> &'static str {
    if environment.eq_ignore_ascii_case("production") {
        "info"
    } else {
        "debug"
    }
}

fn use_json_format(format: Option<&str>) -> bool {
    format.is_some_and(|format| format.eq_ignore_ascii_case("json"))
}
