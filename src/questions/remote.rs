//! HTTP client for an external question-generation service

use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use reqwest::Client;
use tracing::{debug, warn};

use super::{Question, QuestionError, QuestionRequest, QuestionSource, OPTION_COUNT};

/// Fetches generated questions with a single POST per game start
#[derive(Clone)]
pub struct RemoteQuestionService {
    client: Client,
    url: String,
}

impl RemoteQuestionService {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, QuestionError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn request(&self, request: QuestionRequest) -> Result<Vec<Question>, QuestionError> {
        debug!(url = %self.url, count = request.count, "Requesting questions");

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(QuestionError::Request)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(QuestionError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let questions: Vec<Question> = response.json().await.map_err(QuestionError::Parse)?;
        let total = questions.len();
        let valid: Vec<Question> = questions
            .into_iter()
            .filter(|q| usize::from(q.answer) < OPTION_COUNT)
            .collect();

        if valid.len() < total {
            warn!(dropped = total - valid.len(), "Discarded questions with bad answer index");
        }
        if valid.is_empty() {
            return Err(QuestionError::Empty);
        }
        Ok(valid)
    }
}

impl QuestionSource for RemoteQuestionService {
    fn fetch(&self, request: QuestionRequest) -> BoxFuture<'_, Result<Vec<Question>, QuestionError>> {
        self.request(request).boxed()
    }
}
