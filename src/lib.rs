pub mod config;
pub mod pipeline;
pub mod pipeline_config;

pub use pipeline::extraction::{ExtractionError, ExtractionRecord};
pub use pipeline::processor::DocumentProcessor;
pub use pipeline_config::PipelineConfig;

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}
