//! Test logging setup.
//!
//! Configured from the environment so CI and local runs can turn on the
//! handle and subscription traces without code changes:
//!
//! | Variable            | Meaning                                   | Default |
//! |---------------------|-------------------------------------------|---------|
//! | `OBJREF_LOG`        | `EnvFilter` directives                    | `warn`  |
//! | `OBJREF_LOG_FORMAT` | `json` for JSON lines, anything else text | text    |

use tracing_subscriber::EnvFilter;

/// Environment variable holding the filter directives.
pub const LOG_ENV: &str = "OBJREF_LOG";
/// Environment variable selecting the output format.
pub const LOG_FORMAT_ENV: &str = "OBJREF_LOG_FORMAT";

const DEFAULT_FILTER: &str = "warn";

/// Resolved logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// `EnvFilter` directives, e.g. `objref_core=trace`.
    pub filter: String,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
}

impl LogConfig {
    /// Read the configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through a custom lookup (used by tests).
    pub fn from_lookup<F>(get_env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let filter = get_env(LOG_ENV)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());
        let json = get_env(LOG_FORMAT_ENV).is_some_and(|value| value.trim().eq_ignore_ascii_case("json"));
        Self { filter, json }
    }

    /// Install a global subscriber writing through the test harness capture.
    ///
    /// Does nothing if a global subscriber is already set.
    pub fn init(&self) {
        let filter = EnvFilter::try_new(&self.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let builder = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(filter);
        let _ = if self.json {
            builder.json().try_init()
        } else {
            builder.try_init()
        };
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            json: false,
        }
    }
}

/// Install test logging configured from the environment. Idempotent.
pub fn init_test_logging() {
    LogConfig::from_env().init();
}
