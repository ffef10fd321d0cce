use crate::config::Config;
use crate::relay::Relay;
use std::sync::Arc;

// Shared state handed to every axum handler
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let relay = Relay::new().with_unreachable_notifications(config.notify_unreachable);
        Self {
            relay: Arc::new(relay),
            config: Arc::new(config),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
