//! Application state shared across routes

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::game::RoomRegistry;
use crate::questions::{LocalAnswerKey, QuestionError, QuestionSource, RemoteQuestionService};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<RoomRegistry>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, QuestionError> {
        let config = Arc::new(config);

        // Question content: external service when configured, built-in bank otherwise
        let questions: Arc<dyn QuestionSource> = match &config.question_service_url {
            Some(url) => {
                info!(url = %url, "Using remote question service");
                Arc::new(RemoteQuestionService::new(
                    url.clone(),
                    config.question_service_timeout,
                )?)
            }
            None => {
                warn!("QUESTION_SERVICE_URL not set, using built-in answer key");
                Arc::new(LocalAnswerKey::new())
            }
        };

        let registry = Arc::new(RoomRegistry::new(Arc::new(config.game.clone()), questions));

        Ok(Self { config, registry })
    }
}
