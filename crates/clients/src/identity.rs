use reqwest::{Client, Method, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use thiserror::Error;
use url::Url;

use joblane_core::types::Role;

/// Client for the external identity service. Authentication itself is the
/// service's business; this client only reads profiles and applies the
/// self-service role switch.
#[derive(Clone)]
pub struct IdentityClient {
    http: Client,
    base_url: Url,
    service_token: String,
}

impl IdentityClient {
    /// Creates a new identity client with the provided configuration.
    pub fn new(base_url: Url, service_token: impl Into<String>, http: Client) -> Self {
        Self {
            http,
            base_url,
            service_token: service_token.into(),
        }
    }

    /// Fetches the profile for a user id. `Ok(None)` means the id is
    /// unknown to the identity service.
    pub async fn fetch_user(&self, user_id: &str) -> Result<Option<UserProfile>, IdentityError> {
        let url = self.base_url.join(&format!("users/{user_id}"))?;
        let response = self.authorized_request(Method::GET, url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        parse_json::<UserProfile>(response).await.map(Some)
    }

    /// Sets the user's role. The call is idempotent: re-applying the
    /// current role succeeds without effect.
    pub async fn set_role(&self, user_id: &str, role: Role) -> Result<(), IdentityError> {
        let url = self.base_url.join(&format!("users/{user_id}/role"))?;
        let body = serde_json::json!({ "role": role.as_str() });
        let response = self
            .authorized_request(Method::PUT, url)
            .json(&body)
            .send()
            .await?;

        ensure_success(response).await
    }

    fn authorized_request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("Authorization", format!("Bearer {}", self.service_token))
    }
}

/// Profile payload returned by the identity service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
}

/// Errors produced by the identity client.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("failed to build url: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
}

async fn ensure_success(response: Response) -> Result<(), IdentityError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<unavailable>"));
        return Err(IdentityError::Status { status, body });
    }
    Ok(())
}

async fn parse_json<T>(response: Response) -> Result<T, IdentityError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<unavailable>"));
        return Err(IdentityError::Status { status, body });
    }

    Ok(response.json().await?)
}
