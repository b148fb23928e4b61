use std::sync::Arc;
use mp4forge_core::{Config, ConversionSession, SanitizedConfig, TranscodeEngine};

use crate::api::WsBroadcaster;

/// The session type served by the API. The engine is chosen at startup.
pub type Session = ConversionSession<dyn TranscodeEngine>;

/// Shared application state
pub struct AppState {
    config: Config,
    session: Arc<Session>,
    ws_broadcaster: WsBroadcaster,
}

impl AppState {
    pub fn new(config: Config, session: Arc<Session>, ws_broadcaster: WsBroadcaster) -> Self {
        Self {
            config,
            session,
            ws_broadcaster,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn ws_broadcaster(&self) -> &WsBroadcaster {
        &self.ws_broadcaster
    }
}
