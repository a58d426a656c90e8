use cellx_core::util::env_bool;
use once_cell::sync::OnceCell;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

/// Target used by the HTTP access log lines.
pub const ACCESS_TARGET: &str = "http.access";

static ACCESS_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Minutely,
    Hourly,
    Daily,
}

impl Rotation {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "hourly" => Rotation::Hourly,
            "minutely" => Rotation::Minutely,
            _ => Rotation::Daily,
        }
    }
}

/// Rolling access-log file settings, read from `CELLX_ACCESS_LOG_*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessLogSettings {
    pub dir: String,
    pub prefix: String,
    pub rotation: Rotation,
}

impl AccessLogSettings {
    /// `None` unless `CELLX_ACCESS_LOG_ROLL` is enabled.
    pub fn from_env() -> Option<Self> {
        if env_bool("CELLX_ACCESS_LOG_ROLL") != Some(true) {
            return None;
        }
        Some(Self {
            dir: std::env::var("CELLX_ACCESS_LOG_DIR")
                .ok()
                .or_else(|| std::env::var("CELLX_LOGS_DIR").ok())
                .unwrap_or_else(|| "logs".to_string()),
            prefix: std::env::var("CELLX_ACCESS_LOG_PREFIX")
                .unwrap_or_else(|_| "http-access".into()),
            rotation: Rotation::parse(
                &std::env::var("CELLX_ACCESS_LOG_ROTATION").unwrap_or_default(),
            ),
        })
    }
}

/// Install the process-wide subscriber: console output filtered by
/// `RUST_LOG` (default `info`) plus the optional rolling access log.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(fmt::layer().with_filter(filter));

    let Some(settings) = AccessLogSettings::from_env() else {
        let _ = registry.try_init();
        return;
    };
    if std::fs::create_dir_all(&settings.dir).is_err() {
        tracing::warn!(directory = %settings.dir, "failed to create access log directory");
    }
    let writer = match settings.rotation {
        Rotation::Hourly => tracing_appender::rolling::hourly(&settings.dir, &settings.prefix),
        Rotation::Minutely => tracing_appender::rolling::minutely(&settings.dir, &settings.prefix),
        Rotation::Daily => tracing_appender::rolling::daily(&settings.dir, &settings.prefix),
    };
    let (nb, guard) = tracing_appender::non_blocking(writer);
    let _ = ACCESS_GUARD.set(guard);
    let targets = Targets::new().with_target(ACCESS_TARGET, tracing::Level::INFO);
    let access_layer = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(nb)
        .with_filter(targets);
    let _ = registry.with(access_layer).try_init();
}
