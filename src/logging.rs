use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default filter when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "info,canvas_lib=debug";

/// Initialize tracing with stdout and Sentry layers.
///
/// - Stdout: compact, human-readable for the dev console
/// - Sentry: captures ERROR events as issues, WARN as breadcrumbs
/// - Default level: INFO (canvas DEBUG), override via RUST_LOG env
///
/// Safe to call more than once; later calls are no-ops when a global
/// subscriber is already installed (e.g. by the embedding app).
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let stdout_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .compact();

    // Routes tracing::error!/warn! calls to Sentry automatically.
    // No-op when no Sentry client is bound.
    let sentry_layer = sentry_tracing::layer().event_filter(|meta| match *meta.level() {
        tracing::Level::ERROR => sentry_tracing::EventFilter::Event,
        tracing::Level::WARN => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    });

    let result = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(sentry_layer)
        .try_init();

    match result {
        Ok(()) => tracing::debug!("Tracing initialized"),
        Err(_) => tracing::debug!("Tracing already initialized, keeping existing subscriber"),
    }
}

/// Build Sentry client options for hosts that want crash reporting.
/// The DSN comes from the `SENTRY_DSN` build-time env; absent means disabled.
pub fn sentry_options() -> sentry::ClientOptions {
    sentry::ClientOptions {
        dsn: option_env!("SENTRY_DSN").and_then(|s| s.parse().ok()),
        release: Some(env!("CARGO_PKG_VERSION").into()),
        traces_sample_rate: 0.0,
        send_default_pii: false,
        ..Default::default()
    }
}
