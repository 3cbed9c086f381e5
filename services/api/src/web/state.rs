//! services/api/src/web/state.rs
//!
//! Defines the state shared by every CRUD handler.

use research_interview_core::ports::{Clock, StudyStore};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn StudyStore>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(store: Arc<dyn StudyStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }
}
