use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub mod formatter;

pub use formatter::*;

use crate::configs::Config;

/// Builds the filter directive from the `[logging]` section. `RUST_LOG`
/// takes precedence when set.
pub fn filter_directive(config: &Config) -> String {
    let log_level = config
        .logging
        .as_ref()
        .and_then(|l| l.level.as_deref())
        .unwrap_or("info");

    let filters = config
        .logging
        .as_ref()
        .and_then(|l| l.filters.as_deref())
        .unwrap_or("");

    if filters.is_empty() {
        format!("{},hyper=warn,reqwest=warn", log_level)
    } else {
        format!("{},hyper=warn,reqwest=warn,{}", log_level, filters)
    }
}

pub fn init(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config)));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .event_format(CustomFormatter::new(true))
        .with_ansi(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::LoggingConfig;

    #[test]
    fn test_filter_directive() {
        let mut config = Config::default();
        assert_eq!(filter_directive(&config), "info,hyper=warn,reqwest=warn");

        config.logging = Some(LoggingConfig {
            level: Some("debug".into()),
            filters: Some("sabr_ump::sabr=trace".into()),
        });
        assert_eq!(
            filter_directive(&config),
            "debug,hyper=warn,reqwest=warn,sabr_ump::sabr=trace"
        );
    }
}
