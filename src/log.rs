use std::sync::OnceLock;

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static TRACER: OnceLock<()> = OnceLock::new();

/// Initializes the global tracing subscriber, writing to stderr so table
/// output on stdout stays clean. Repeated `-v` flags raise the level;
/// `RUST_LOG` overrides everything when set.
pub fn init(verbosity: u8) {
    TRACER.get_or_init(|| {
        let level = match verbosity {
            0 => Level::WARN,
            1 => Level::INFO,
            2 | 3 => Level::DEBUG,
            _ => Level::TRACE,
        };
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("kindred={level}")));

        let stderr_layer = fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(filter);

        tracing_subscriber::registry().with(stderr_layer).try_init().ok();
    });
}
