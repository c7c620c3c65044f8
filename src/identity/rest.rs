//! Identity provider backed by the hosted auth service's admin API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::db::rest::{endpoint, error_message};
use crate::error::IdentityError;
use crate::identity::{AccountMetadata, IdentityProvider, NewAccount};

#[derive(Serialize)]
struct CreateUserBody<'a> {
    email: &'a str,
    password: &'a str,
    email_confirm: bool,
    user_metadata: &'a AccountMetadata,
}

/// The admin API answers with the user object, or `{"user": {...}}` on
/// older deployments.
fn extract_account_id(body: &Value) -> Option<String> {
    body.get("id")
        .or_else(|| body.get("user").and_then(|u| u.get("id")))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

pub struct RestIdentityProvider {
    client: reqwest::Client,
    base: Url,
    key: SecretString,
}

impl RestIdentityProvider {
    pub fn new(base: &Url, key: &SecretString, timeout: Duration) -> Result<Self, IdentityError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IdentityError::Request(e.to_string()))?;
        Ok(Self {
            client,
            base: base.clone(),
            key: key.clone(),
        })
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, IdentityError> {
        let url = endpoint(&self.base, segments).map_err(IdentityError::Request)?;
        Ok(self
            .client
            .request(method, url)
            .header("apikey", self.key.expose_secret())
            .bearer_auth(self.key.expose_secret()))
    }
}

#[async_trait]
impl IdentityProvider for RestIdentityProvider {
    async fn create_account(&self, account: &NewAccount) -> Result<String, IdentityError> {
        let body = CreateUserBody {
            email: &account.email,
            password: account.password.expose_secret(),
            email_confirm: true,
            user_metadata: &account.metadata,
        };
        let response = self
            .request(Method::POST, &["auth", "v1", "admin", "users"])?
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(IdentityError::Rejected {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        let payload: Value = response.json().await?;
        extract_account_id(&payload)
            .ok_or_else(|| IdentityError::InvalidResponse("response carries no user id".to_string()))
    }

    async fn delete_account(&self, account_id: &str) -> Result<(), IdentityError> {
        let response = self
            .request(Method::DELETE, &["auth", "v1", "admin", "users", account_id])?
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::NOT_FOUND {
            tracing::debug!(account_id = %account_id, "identity account already gone");
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        Err(IdentityError::Rejected {
            status: status.as_u16(),
            message: error_message(&text),
        })
    }
}
