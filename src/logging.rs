use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Logging configuration for the K-1 reader.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Initialize the logging system. Logs go to stderr so stdout stays clean
/// for exported records.
pub fn init_logging(config: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("k1_reader={}", config.level)));

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    let _ = Registry::default().with(env_filter).with(console_layer).try_init();
}

/// Performance logging utility for pipeline stages.
pub struct StageTimer {
    start: std::time::Instant,
    stage: String,
}

impl StageTimer {
    pub fn start(stage: impl Into<String>) -> Self {
        Self {
            start: std::time::Instant::now(),
            stage: stage.into(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Drop for StageTimer {
    fn drop(&mut self) {
        tracing::debug!("completed {}: {}ms", self.stage, self.elapsed_ms());
    }
}
