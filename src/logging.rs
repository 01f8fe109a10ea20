use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const DEFAULT_FILTER: &str = "info,genblocks=debug";

/// Initialize tracing with a compact stderr layer and the Sentry layer.
///
/// - Stderr keeps stdout free for generated markup
/// - Sentry: ERROR events become issues, WARN events breadcrumbs
/// - Filter: `RUST_LOG`, falling back to [`DEFAULT_FILTER`]
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(false)
        .compact();

    // No-op when Sentry has no DSN.
    let sentry_layer = sentry_tracing::layer().event_filter(|meta| match *meta.level() {
        tracing::Level::ERROR => sentry_tracing::EventFilter::Event,
        tracing::Level::WARN => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    });

    // try_init: a second call (tests, embedding hosts) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(sentry_layer)
        .try_init();

    tracing::debug!("Tracing initialized");
}
