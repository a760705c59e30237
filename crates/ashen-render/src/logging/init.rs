use std::sync::Once;

/// Filter applied when neither the config nor `RUST_LOG` names one.
const DEFAULT_FILTER: &str = "info";

/// How the render layer's logger is installed.
///
/// Shader selection, pipeline-cache builds and resource creation log under
/// the `ashen_render` target; `wgpu` logs under its own crates. A filter such
/// as `"ashen_render=debug,wgpu_core=warn"` keeps backend noise down while
/// tracing uploads.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// `env_logger` filter directives. Overrides `RUST_LOG` when set.
    pub env_filter: Option<String>,
    pub write_style: env_logger::WriteStyle,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            write_style: env_logger::WriteStyle::Auto,
        }
    }
}

static INIT: Once = Once::new();

/// Installs the global logger on the first call; later calls do nothing.
///
/// A logger installed by the host application is left in place.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = resolve_filter(config.env_filter, std::env::var("RUST_LOG").ok());

        let mut builder = env_logger::Builder::new();
        builder.parse_filters(&filter).write_style(config.write_style);

        match builder.try_init() {
            Ok(()) => log::debug!("render logging on (filter `{filter}`)"),
            Err(_) => log::debug!("host logger already installed; render logs go there"),
        }
    });
}

/// Routes log output through the test harness capture at debug level.
pub fn init_test_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}

/// Explicit filter, then `RUST_LOG`, then [`DEFAULT_FILTER`].
fn resolve_filter(explicit: Option<String>, from_env: Option<String>) -> String {
    explicit
        .or(from_env)
        .filter(|f| !f.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FILTER.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_filter_beats_environment() {
        assert_eq!(
            resolve_filter(Some("ashen_render=trace".into()), Some("warn".into())),
            "ashen_render=trace"
        );
        assert_eq!(resolve_filter(None, Some("warn".into())), "warn");
        assert_eq!(resolve_filter(None, None), DEFAULT_FILTER);
        assert_eq!(resolve_filter(None, Some("  ".into())), DEFAULT_FILTER);
    }

    #[test]
    fn repeated_init_is_harmless() {
        init_test_logging();
        init_test_logging();
        init_logging(LoggingConfig::default());
        init_logging(LoggingConfig {
            env_filter: Some("warn".into()),
            ..Default::default()
        });
        log::debug!("still logging");
    }
}
