//! Tracing initialization shared by every binary in the workspace.
//!
//! Development builds get compact, colorized, human-readable output.
//! Release builds emit flattened JSON suitable for a log aggregator. Either
//! way a panic anywhere in the process is captured as a structured error
//! record instead of disappearing into stderr.

use std::panic;
use tracing::error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global tracing subscriber and panic hook for `service_name`.
///
/// # Panics
/// Panics if a global subscriber has already been installed.
pub fn init(service_name: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if cfg!(debug_assertions) { "debug" } else { "info" };
        format!("{service_name}={level},tower_http=warn,sqlx=warn").into()
    });

    if cfg!(debug_assertions) {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact().with_target(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().flatten_event(true))
            .init();
    }

    install_panic_hook(service_name);
}

fn install_panic_hook(service_name: &str) {
    let service_name = service_name.to_string();
    panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| info.payload().downcast_ref::<String>().map(String::as_str))
            .unwrap_or("<non-string panic payload>");

        error!(
            target: "panic",
            service = %service_name,
            location = %location,
            "panic: {payload}"
        );
    }));
}
