//! AI assist collaborator
//!
//! The coaching AI is an external, unreliable service: it may fail,
//! rate-limit, or hang. Every call the engine depends on carries a deadline,
//! and on timeout or error the caller receives a deterministic non-AI
//! fallback instead of blocking. The outcome is tagged with its source so the
//! user boundary can always distinguish "generated with fallback" from a
//! genuine AI result.

use async_trait::async_trait;
use coachbook_common::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Narrow seam to the AI text-generation collaborator
#[async_trait]
pub trait AssistClient: Send + Sync {
    /// Generate text for a prompt-shaped payload
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Where an assist result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistSource {
    Ai,
    Fallback,
}

/// Result of an assist call, tagged with its source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistOutcome {
    pub text: String,
    pub source: AssistSource,
}

/// Call the assist collaborator with a deadline; on timeout or failure,
/// substitute the deterministic fallback.
///
/// The fallback is part of the contract, not an error path: callers always
/// get usable text.
pub async fn assist_or_fallback<F>(
    client: &dyn AssistClient,
    prompt: &str,
    deadline: Duration,
    fallback: F,
) -> AssistOutcome
where
    F: FnOnce() -> String,
{
    match tokio::time::timeout(deadline, client.generate(prompt)).await {
        Ok(Ok(text)) => AssistOutcome {
            text,
            source: AssistSource::Ai,
        },
        Ok(Err(e)) => {
            warn!(error = %e, "Assist call failed; using deterministic fallback");
            AssistOutcome {
                text: fallback(),
                source: AssistSource::Fallback,
            }
        }
        Err(_) => {
            warn!(deadline_secs = deadline.as_secs(), "Assist call timed out; using deterministic fallback");
            AssistOutcome {
                text: fallback(),
                source: AssistSource::Fallback,
            }
        }
    }
}

#[derive(Serialize)]
struct AssistRequest<'a> {
    prompt: &'a str,
}

#[derive(Deserialize)]
struct AssistResponse {
    generated_text: String,
}

/// HTTP implementation of [`AssistClient`]
pub struct HttpAssistClient {
    http_client: Client,
    endpoint: String,
}

impl HttpAssistClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let http_client = Client::builder().build()?;
        Ok(Self {
            http_client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl AssistClient for HttpAssistClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let response: AssistResponse = self
            .http_client
            .post(&self.endpoint)
            .json(&AssistRequest { prompt })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.generated_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coachbook_common::Error;

    struct CannedAssist;

    #[async_trait]
    impl AssistClient for CannedAssist {
        async fn generate(&self, prompt: &str) -> Result<String> {
            Ok(format!("ai says: {}", prompt))
        }
    }

    struct FailingAssist;

    #[async_trait]
    impl AssistClient for FailingAssist {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Err(Error::Internal("model overloaded".to_string()))
        }
    }

    struct HangingAssist;

    #[async_trait]
    impl AssistClient for HangingAssist {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!("the deadline must fire first")
        }
    }

    #[tokio::test]
    async fn successful_calls_are_tagged_ai() {
        let outcome = assist_or_fallback(
            &CannedAssist,
            "summarize",
            Duration::from_secs(30),
            || "fallback".to_string(),
        )
        .await;
        assert_eq!(outcome.source, AssistSource::Ai);
        assert_eq!(outcome.text, "ai says: summarize");
    }

    #[tokio::test]
    async fn failures_substitute_the_fallback() {
        let outcome = assist_or_fallback(
            &FailingAssist,
            "summarize",
            Duration::from_secs(30),
            || "plain transformation".to_string(),
        )
        .await;
        assert_eq!(outcome.source, AssistSource::Fallback);
        assert_eq!(outcome.text, "plain transformation");
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_substitute_the_fallback() {
        let outcome = assist_or_fallback(
            &HangingAssist,
            "summarize",
            Duration::from_secs(20),
            || "plain transformation".to_string(),
        )
        .await;
        assert_eq!(outcome.source, AssistSource::Fallback);
    }
}
