//! HTTP record store client
//!
//! JSON REST client for the remote record store API. Authentication is a
//! bearer token supplied by the host application; multi-tenant isolation is
//! the store's responsibility, not ours.

use async_trait::async_trait;
use coachbook_common::model::{CompletionRecord, FieldKey, ResponseRecord};
use coachbook_common::{Error, Result};
use reqwest::{header, Client};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// Default timeout for record store requests
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// HTTP implementation of [`RecordStore`](super::RecordStore)
#[derive(Debug)]
pub struct HttpRecordStore {
    http_client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct CreateResponseBody<'a> {
    user_id: &'a str,
    step: u32,
    field_key: &'a FieldKey,
    value: &'a str,
    section_title: &'a str,
}

#[derive(Serialize)]
struct UpdateResponseBody<'a> {
    value: &'a str,
}

impl HttpRecordStore {
    /// Create a client for the store at `base_url`, optionally authenticated
    /// with a bearer token
    pub fn new(base_url: impl Into<String>, auth_token: Option<&str>) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        if let Some(token) = auth_token {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| Error::Config(format!("invalid auth token: {}", e)))?;
            headers.insert(header::AUTHORIZATION, value);
        }

        let http_client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl super::RecordStore for HttpRecordStore {
    async fn create_response(
        &self,
        user_id: &str,
        step: u32,
        field_key: &FieldKey,
        value: &str,
        section_title: &str,
    ) -> Result<ResponseRecord> {
        let record = self
            .http_client
            .post(self.url("/responses"))
            .json(&CreateResponseBody {
                user_id,
                step,
                field_key,
                value,
                section_title,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(record)
    }

    async fn update_response(&self, record_id: Uuid, value: &str) -> Result<ResponseRecord> {
        let record = self
            .http_client
            .patch(self.url(&format!("/responses/{}", record_id)))
            .json(&UpdateResponseBody { value })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(record)
    }

    async fn delete_response(&self, record_id: Uuid) -> Result<()> {
        self.http_client
            .delete(self.url(&format!("/responses/{}", record_id)))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn list_responses(&self, user_id: &str, step: u32) -> Result<Vec<ResponseRecord>> {
        let records = self
            .http_client
            .get(self.url("/responses"))
            .query(&[("user_id", user_id), ("step", &step.to_string())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(records)
    }

    async fn create_completion(&self, record: &CompletionRecord) -> Result<()> {
        self.http_client
            .post(self.url("/completions"))
            .json(record)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn delete_completion(&self, user_id: &str, section_title: &str) -> Result<()> {
        self.http_client
            .delete(self.url("/completions"))
            .query(&[("user_id", user_id), ("section_title", section_title)])
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn list_completions(&self, user_id: &str) -> Result<Vec<CompletionRecord>> {
        let records = self
            .http_client
            .get(self.url("/completions"))
            .query(&[("user_id", user_id)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(records)
    }
}
