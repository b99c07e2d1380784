use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Environment;

/// Install the global tracing subscriber. Dev gets human-readable output;
/// prod gets flattened JSON lines for log shipping. `RUST_LOG` overrides the
/// configured level.
pub fn init_tracing(log_level: &str, environment: &Environment) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match environment {
        Environment::Prod => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_file(true)
                    .with_line_number(true)
                    .json()
                    .flatten_event(true),
            )
            .init(),
        Environment::Dev => registry
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}
