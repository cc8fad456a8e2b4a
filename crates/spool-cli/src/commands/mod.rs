pub mod monitor;
pub mod serve;
pub mod worker;

use std::sync::Arc;

use spool_core::ports::TaskExecutor;
use spool_llm::{GeminiConfig, GeminiExecutor};

/// Gemini executor from the environment. Only worker processes need one.
pub(crate) fn gemini_executor() -> anyhow::Result<Arc<dyn TaskExecutor>> {
    let config = GeminiConfig::from_env()?;
    tracing::info!(model = %config.model, "using gemini executor");
    Ok(Arc::new(GeminiExecutor::new(config)?))
}
