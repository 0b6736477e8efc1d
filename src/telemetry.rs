use tracing_subscriber::{
    fmt::format::Format, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter.
pub fn init_tracing() {
    let console_fmt =
        tracing_subscriber::fmt::layer().event_format(Format::default().compact().with_target(false));
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "plantid_web=debug,tower_http=info".into()),
        )
        .with(console_fmt)
        .init();
}
