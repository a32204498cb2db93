//! Tracing bootstrap shared by the service binaries.

use once_cell::sync::OnceCell;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

/// Target the HTTP access log writes to; the rolling file layer only keeps this one.
pub const ACCESS_TARGET: &str = "http.access";

static ACCESS_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rotation {
    Minutely,
    Hourly,
    Daily,
    Never,
}

impl Rotation {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "minutely" => Rotation::Minutely,
            "hourly" => Rotation::Hourly,
            "never" => Rotation::Never,
            _ => Rotation::Daily,
        }
    }
}

/// Rolling access-log file settings, from `SKP_ACCESS_LOG_*`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessFileSettings {
    pub dir: String,
    pub prefix: String,
    pub rotation: Rotation,
}

impl AccessFileSettings {
    /// `None` unless `SKP_ACCESS_LOG_ROLL=1`.
    pub fn from_env() -> Option<Self> {
        if std::env::var("SKP_ACCESS_LOG_ROLL").ok().as_deref() != Some("1") {
            return None;
        }
        Some(Self {
            dir: std::env::var("SKP_ACCESS_LOG_DIR")
                .ok()
                .or_else(|| std::env::var("SKP_LOGS_DIR").ok())
                .unwrap_or_else(|| "logs".to_string()),
            prefix: std::env::var("SKP_ACCESS_LOG_PREFIX")
                .unwrap_or_else(|_| "http-access".into()),
            rotation: Rotation::parse(
                &std::env::var("SKP_ACCESS_LOG_ROTATION").unwrap_or_else(|_| "daily".into()),
            ),
        })
    }
}

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer();
    let registry = tracing_subscriber::registry().with(fmt_layer.with_filter(filter));

    let Some(settings) = AccessFileSettings::from_env() else {
        let _ = registry.try_init();
        return;
    };
    if std::fs::create_dir_all(&settings.dir).is_err() {
        eprintln!("failed to create access log directory {}", settings.dir);
    }
    let writer = match settings.rotation {
        Rotation::Minutely => tracing_appender::rolling::minutely(&settings.dir, &settings.prefix),
        Rotation::Hourly => tracing_appender::rolling::hourly(&settings.dir, &settings.prefix),
        Rotation::Never => tracing_appender::rolling::never(&settings.dir, &settings.prefix),
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
    tracing::info!(
        directory = %settings.dir,
        prefix = %settings.prefix,
        rotation = ?settings.rotation,
        "access log file enabled"
    );
}
