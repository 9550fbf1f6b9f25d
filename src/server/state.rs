use std::sync::Arc;

use crate::config::Settings;
use crate::hub::Hub;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub hub: Hub,
}

impl AppState {
    /// Build state around an already constructed hub; the caller owns the
    /// router task and its shutdown.
    pub fn new(settings: Settings, hub: Hub) -> Self {
        Self {
            settings: Arc::new(settings),
            hub,
        }
    }
}
