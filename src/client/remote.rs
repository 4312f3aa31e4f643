use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;
use uuid::Uuid;

use super::cache::ProgressKey;
use crate::dto::progress_dto::{ProgressListResponse, ProgressResponse, SaveProgressRequest};
use crate::models::progress::ProgressRecord;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server responded {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Progress cache closed")]
    Cancelled,
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// The three progress endpoints as seen from a learner session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProgressRemote: Send + Sync {
    async fn save(&self, request: &SaveProgressRequest) -> ClientResult<ProgressRecord>;

    async fn fetch(&self, key: &ProgressKey) -> ClientResult<Option<ProgressRecord>>;

    async fn fetch_all(&self, user_id: Uuid) -> ClientResult<Vec<ProgressRecord>>;
}

#[derive(Clone)]
pub struct HttpProgressRemote {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpProgressRemote {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> ClientResult<Self> {
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)?;
        let client = Client::builder().timeout(timeout).build()?;
        let token = token.filter(|t| !t.trim().is_empty());
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    fn request(&self, method: Method, path: &str) -> ClientResult<RequestBuilder> {
        let url = self.base_url.join(path)?;
        let builder = self.client.request(method, url);
        Ok(match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    async fn send<T: DeserializeOwned>(builder: RequestBuilder) -> ClientResult<T> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status { status, body });
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl ProgressRemote for HttpProgressRemote {
    async fn save(&self, request: &SaveProgressRequest) -> ClientResult<ProgressRecord> {
        let builder = self.request(Method::POST, "progress/save")?.json(request);
        let response: ProgressResponse = Self::send(builder).await?;
        response
            .progress
            .ok_or_else(|| ClientError::Decode("save acknowledged without a record".to_string()))
    }

    async fn fetch(&self, key: &ProgressKey) -> ClientResult<Option<ProgressRecord>> {
        let builder = self.request(Method::GET, "progress/get")?.query(&[
            ("userId", key.user_id),
            ("lessonId", key.lesson_id),
            ("formationId", key.formation_id),
        ]);
        let response: ProgressResponse = Self::send(builder).await?;
        Ok(response.progress)
    }

    async fn fetch_all(&self, user_id: Uuid) -> ClientResult<Vec<ProgressRecord>> {
        let builder = self.request(Method::GET, &format!("progress/user/{user_id}"))?;
        let response: ProgressListResponse = Self::send(builder).await?;
        Ok(response.progressions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_join_under_the_base_path() {
        let remote =
            HttpProgressRemote::new("http://lms.test/api", Some("t".into()), Duration::from_secs(1))
                .unwrap();
        let url = remote.base_url.join("progress/save").unwrap();
        assert_eq!(url.as_str(), "http://lms.test/api/progress/save");
    }

    #[test]
    fn blank_token_is_dropped() {
        let remote = HttpProgressRemote::new("http://lms.test", Some("  ".into()), Duration::from_secs(1))
            .unwrap();
        assert!(remote.token.is_none());
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err = HttpProgressRemote::new("not a url", None, Duration::from_secs(1))
            .err()
            .unwrap();
        assert!(matches!(err, ClientError::Url(_)));
    }
}
