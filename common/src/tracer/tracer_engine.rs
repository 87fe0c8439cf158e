use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt};

#[derive(Default)]
pub struct TracerOptions {
    /// Used when `RUST_LOG` is not set.
    pub default_level: Option<LevelFilter>,
    pub with_ansi: bool,
}

impl TracerOptions {
    pub fn new(default_level: Option<LevelFilter>) -> Self {
        Self {
            default_level,
            with_ansi: true,
        }
    }
}

/// This object initialises the stdout tracer, given a TracerOptions struct.
pub struct TracerEngine {
    level: LevelFilter,
}

impl TracerEngine {
    /// Initialises the stdout tracer for the crate
    /// #Arguments
    /// * `options` - The caller-specified instance of TracerOptions.
    /// #Returns
    /// An instance of TracerEngine
    pub fn new(options: TracerOptions) -> Self {
        let level = options.default_level.unwrap_or(LevelFilter::INFO);

        let stdout_tracer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stdout)
            .with_ansi(options.with_ansi);

        // This filter is applied to the stdout tracer
        let log_filter = EnvFilter::builder()
            .with_default_directive(level.into())
            .from_env_lossy();

        let subscriber =
            tracing_subscriber::Registry::default().with(stdout_tracer.with_filter(log_filter));

        //  This is only called once, so will never panic
        tracing::subscriber::set_global_default(subscriber)
            .expect("tracing::subscriber::set_global_default should only be called once");

        Self { level }
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }
}
