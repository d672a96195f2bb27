//! Logging configuration for minish.
//!
//! Events go to stderr. The filter comes from `MINISH_LOG` and defaults to
//! `off`, so an interactive session shows nothing unless asked to.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the filter directives.
pub const LOG_ENV: &str = "MINISH_LOG";

const DEFAULT_DIRECTIVES: &str = "off";

/// Initializes stderr logging. Calling it twice is harmless.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_from(std::env::var(LOG_ENV).ok().as_deref()))
        .with_writer(std::io::stderr)
        .try_init();
}

/// Builds the filter for the given directives, falling back to the default
/// when they are absent or malformed.
pub fn filter_from(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVES))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_is_off() {
        assert_eq!(filter_from(None).to_string(), "off");
        assert_eq!(filter_from(Some("minish=loudest")).to_string(), "off");
    }

    #[test]
    fn test_directives_are_used() {
        assert_eq!(filter_from(Some("debug")).to_string(), "debug");
        assert_eq!(filter_from(Some("minish=trace")).to_string(), "minish=trace");
    }

    #[test]
    fn test_init_twice() {
        init();
        init();
    }
}
