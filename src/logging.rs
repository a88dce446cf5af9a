use tracing_subscriber::EnvFilter;

/// Log level selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Installs the global fmt subscriber. `RUST_LOG` takes precedence over
/// `level` when it is set.
pub fn init_logging(level: LogLevel) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_err()
    {
        eprintln!("Warning: Logging system already initialized");
    }
}

/// Result extension for convenient error logging
pub trait ResultExt<T> {
    /// Logs the error (with its cause chain) at error level and hands the
    /// result back unchanged.
    fn log_error(self, context: Option<&str>) -> Self;
}

impl<T> ResultExt<T> for anyhow::Result<T> {
    fn log_error(self, context: Option<&str>) -> Self {
        if let Err(ref error) = self {
            match context {
                Some(ctx) => tracing::error!("{}: {:#}", ctx, error),
                None => tracing::error!("{:#}", error),
            }
        }
        self
    }
}
