use std::sync::Arc;

use spool_core::ports::JobStore;
use spool_core::{Dispatcher, Monitor};

/// Shared state for every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub monitor: Monitor,

    /// Pinged by `/health`.
    pub store: Arc<dyn JobStore>,
}
