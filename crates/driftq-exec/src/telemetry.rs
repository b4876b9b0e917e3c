use tracing_log::LogTracer;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the tracing subscriber for executor binaries and tests.
///
/// Level directives come from `RUST_LOG` ("info" when unset, e.g.
/// "debug,driftq=trace"); `log` records emitted by dependencies are bridged
/// through `LogTracer`. Output goes to stdout via a compact formatter.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    let _ = LogTracer::init();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_target(true))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init();
        init();
        // Both the tracing and the bridged log paths stay usable
        tracing::info!("telemetry initialized twice");
        log::info!("log bridge still works after re-init");
    }
}
