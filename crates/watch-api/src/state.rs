use std::sync::Arc;

use watch_core::{Checker, TargetStore};

#[derive(Clone)]
pub struct AppState {
    pub checker: Arc<Checker>,
    pub store: Arc<dyn TargetStore>,
}

impl AppState {
    pub fn new(checker: Arc<Checker>, store: Arc<dyn TargetStore>) -> Self {
        Self { checker, store }
    }
}
