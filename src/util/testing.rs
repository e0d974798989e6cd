//! Test logging setup shared by unit and integration tests
//!
//! Output goes through the test writer, so it only shows for failing tests
//! or with `--nocapture`. `RUST_LOG` overrides the default filter.

use std::sync::Once;

use tracing::{debug, info};
use tracing_subscriber::{
    filter::filter_fn,
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

/// Targets that drown our own output at debug level.
const NOISY_TARGETS: [&str; 1] = ["config"];

const DEFAULT_FILTER: &str = "preftree=debug,warn";

static TEST_SETUP: Once = Once::new();

pub fn init_test_setup() {
    TEST_SETUP.call_once(|| {
        setup_test_logging();
        info!("test setup complete");
    });
}

fn is_noisy(target: &str) -> bool {
    NOISY_TARGETS.iter().any(|name| target.starts_with(name))
}

fn setup_test_logging() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let module_filter = filter_fn(|metadata| !is_noisy(metadata.target()));

    let subscriber = tracing_subscriber::registry().with(
        fmt::layer()
            .with_test_writer()
            .with_target(true)
            .with_thread_names(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(module_filter)
            .with_filter(env_filter),
    );

    if tracing::dispatcher::has_been_set() {
        debug!("tracing subscriber already set");
    } else if let Err(e) = subscriber.try_init() {
        eprintln!("Error: Failed to set up logging: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_repeated_calls_when_init_then_installs_once() {
        init_test_setup();
        init_test_setup();
        assert!(tracing::dispatcher::has_been_set());
    }

    #[test]
    fn given_targets_when_filtering_then_only_config_is_noisy() {
        assert!(is_noisy("config::source"));
        assert!(!is_noisy("preftree::domain::node"));
        assert!(!is_noisy("preftree::application::binding::manager"));
    }
}
