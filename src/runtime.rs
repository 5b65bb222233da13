use std::sync::Once;

use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use ort::Result as OrtResult;

static INIT: Once = Once::new();

/// Settings for ONNX Runtime session construction.
#[derive(Debug)]
pub struct RuntimeConfig {
    /// Inter-op thread count; 0 lets ONNX Runtime decide
    pub inter_threads: usize,
    /// Intra-op thread count; 0 lets ONNX Runtime decide
    pub intra_threads: usize,
    pub optimization_level: GraphOptimizationLevel,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            inter_threads: 0,
            intra_threads: 0,
            optimization_level: GraphOptimizationLevel::Level3,
        }
    }
}

impl Clone for RuntimeConfig {
    fn clone(&self) -> Self {
        Self {
            inter_threads: self.inter_threads,
            intra_threads: self.intra_threads,
            optimization_level: copy_level(&self.optimization_level),
        }
    }
}

// GraphOptimizationLevel does not implement Clone
fn copy_level(level: &GraphOptimizationLevel) -> GraphOptimizationLevel {
    match level {
        GraphOptimizationLevel::Disable => GraphOptimizationLevel::Disable,
        GraphOptimizationLevel::Level1 => GraphOptimizationLevel::Level1,
        GraphOptimizationLevel::Level2 => GraphOptimizationLevel::Level2,
        GraphOptimizationLevel::Level3 => GraphOptimizationLevel::Level3,
        GraphOptimizationLevel::All => GraphOptimizationLevel::All,
    }
}

/// Initializes the process-wide ONNX Runtime environment exactly once.
pub fn ensure_initialized() -> OrtResult<()> {
    INIT.call_once(|| {
        assert!(
            ort::init().with_name("newscat").commit(),
            "Failed to initialize ONNX Runtime environment"
        );
    });
    Ok(())
}

/// Creates a configured session builder, initializing the environment first.
pub fn create_session_builder(config: &RuntimeConfig) -> OrtResult<SessionBuilder> {
    ensure_initialized()?;
    let mut builder = Session::builder()?;

    if config.inter_threads > 0 {
        builder = builder.with_inter_threads(config.inter_threads)?;
    }
    if config.intra_threads > 0 {
        builder = builder.with_intra_threads(config.intra_threads)?;
    }
    builder = builder.with_optimization_level(copy_level(&config.optimization_level))?;

    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_initializes_idempotently() {
        assert!(ensure_initialized().is_ok());
        assert!(ensure_initialized().is_ok());
    }

    #[test]
    fn session_builder_accepts_thread_config() {
        let config = RuntimeConfig {
            inter_threads: 2,
            intra_threads: 2,
            optimization_level: GraphOptimizationLevel::Level1,
        };
        assert!(create_session_builder(&config).is_ok());
    }
}
