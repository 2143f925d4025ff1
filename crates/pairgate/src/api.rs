//! JSON bodies of the HTTP API, shared by the server and the remote CLI client.

use pairgate_core::{CoreError, PairingCode, StatusSnapshot};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateCodeRequest {
    #[serde(default)]
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub to: String,
    pub message: String,
}

/// Envelope of every mutating endpoint. Failures are still HTTP 200 with
/// `success: false` and a user-facing `error`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Seconds until a new pairing attempt is allowed, on cooldown rejections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_time: Option<u64>,
}

impl ApiReply {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::ok()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn from_code(code: &PairingCode) -> Self {
        Self {
            code: Some(code.code.clone()),
            expires_in: Some(code.expires_in.as_secs()),
            ..Self::ok()
        }
    }

    pub fn from_error(err: &CoreError) -> Self {
        Self {
            wait_time: err.wait_seconds(),
            ..Self::failure(err.user_message())
        }
    }
}

/// Body of `GET /api/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: String,
    pub code: Option<String>,
    pub code_valid: bool,
    pub can_request: bool,
    pub wait_time: u64,
}

impl From<&StatusSnapshot> for StatusResponse {
    fn from(snapshot: &StatusSnapshot) -> Self {
        Self {
            status: snapshot.status.to_string(),
            code: snapshot.pairing_code.clone(),
            code_valid: snapshot.pairing_code_valid,
            can_request: snapshot.can_request_now,
            wait_time: snapshot.wait_seconds,
        }
    }
}
