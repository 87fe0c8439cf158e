mod tracer_engine;

pub use tracer_engine::{TracerEngine, TracerOptions};

/// Should be called at the start of each component.
/// Installs the stdout subscriber and logs which binary and module started it.
#[macro_export]
macro_rules! init_tracer {
    ($options:expr) => {{
        let tracer = $crate::tracer::TracerEngine::new($options);
        tracing::info!(
            "{} started from {}",
            env!("CARGO_BIN_NAME"),
            module_path!()
        );
        tracer
    }};
}
