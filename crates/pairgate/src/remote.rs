//! HTTP client for the subcommands that talk to a running server.

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::api::{ApiReply, GenerateCodeRequest, StatusResponse};
use crate::error::CliError;

/// A pairing sequence includes teardown, readiness and settle waits.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(150);

pub struct RemoteClient {
    http: reqwest::Client,
    base: Url,
}

impl RemoteClient {
    pub fn new(server: &str) -> Result<Self, CliError> {
        let base = Url::parse(server).map_err(|e| CliError::Validation {
            field: "server".into(),
            reason: format!("{server}: {e}"),
        })?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| CliError::ConnectionFailed {
                url: base.to_string(),
                source,
            })?;
        Ok(Self { http, base })
    }

    fn endpoint(&self, path: &str) -> Result<Url, CliError> {
        self.base.join(path).map_err(|e| CliError::Validation {
            field: "server".into(),
            reason: e.to_string(),
        })
    }

    fn connection_error(&self, source: reqwest::Error) -> CliError {
        CliError::ConnectionFailed {
            url: self.base.to_string(),
            source,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, CliError> {
        let url = self.endpoint(path)?;
        tracing::debug!(%url, "GET");
        let response = self.http.get(url).send().await;
        self.decode(response).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, CliError> {
        let url = self.endpoint(path)?;
        tracing::debug!(%url, "POST");
        let response = self.http.post(url).json(body).send().await;
        self.decode(response).await
    }

    async fn decode<T: DeserializeOwned>(
        &self,
        response: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<T, CliError> {
        let response = response
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| self.connection_error(e))?;
        let bytes = response.bytes().await.map_err(|e| self.connection_error(e))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn status(&self) -> Result<StatusResponse, CliError> {
        self.get("/api/status").await
    }

    pub async fn generate_code(&self, phone_number: &str) -> Result<ApiReply, CliError> {
        let body = GenerateCodeRequest {
            phone_number: Some(phone_number.to_string()),
        };
        self.post("/api/generate-code", &body).await
    }

    pub async fn clear_session(&self) -> Result<ApiReply, CliError> {
        self.post("/api/clear-session", &serde_json::json!({})).await
    }
}

/// Turn a `success: false` reply into an error, keeping the server's text.
pub fn into_result(reply: ApiReply) -> Result<ApiReply, CliError> {
    if reply.success {
        return Ok(reply);
    }
    let message = reply.error.unwrap_or_else(|| "unknown error".into());
    Err(match reply.wait_time {
        Some(wait_secs) => CliError::Cooldown { message, wait_secs },
        None => CliError::Rejected { message },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_join_onto_base() {
        let client = RemoteClient::new("http://127.0.0.1:3000").ok();
        let url = client.and_then(|c| c.endpoint("/api/status").ok());
        assert_eq!(
            url.map(|u| u.to_string()).as_deref(),
            Some("http://127.0.0.1:3000/api/status")
        );
    }

    #[test]
    fn failed_replies_become_errors() {
        let cooldown = into_result(ApiReply {
            wait_time: Some(30),
            ..ApiReply::failure("Please wait 30s before requesting a new code")
        });
        assert!(matches!(cooldown, Err(CliError::Cooldown { wait_secs: 30, .. })));
        assert!(matches!(
            into_result(ApiReply::failure("not connected")),
            Err(CliError::Rejected { .. })
        ));
        assert!(into_result(ApiReply::ok()).is_ok());
    }
}
