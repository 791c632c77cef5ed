use crate::error::{AppError, ErrorCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Envelope `type` discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeType {
    Request,
    Response,
    Error,
    Push,
}

/// JSON wrapper for every message on the TCP stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub msg_type: EnvelopeType,
    #[serde(rename = "reqId", default, skip_serializing_if = "Option::is_none")]
    pub req_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

/// `payload.error` of an error envelope.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

/// A request that failed to decode, with whatever `reqId` could be salvaged.
#[derive(Debug)]
pub struct DecodeFailure {
    pub req_id: Option<String>,
    pub error: AppError,
}

impl Envelope {
    /// Client → server request.
    pub fn request(
        req_id: impl Into<String>,
        action: impl Into<String>,
        token: Option<String>,
        payload: Value,
    ) -> Self {
        Self {
            msg_type: EnvelopeType::Request,
            req_id: Some(req_id.into()),
            action: Some(action.into()),
            token,
            payload,
        }
    }

    /// Successful response echoing the request's id and action.
    pub fn response(req_id: Option<String>, action: Option<String>, payload: Value) -> Self {
        Self {
            msg_type: EnvelopeType::Response,
            req_id,
            action,
            token: None,
            payload,
        }
    }

    pub fn error(req_id: Option<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        let body = ErrorBody {
            code,
            message: message.into(),
        };
        Self {
            msg_type: EnvelopeType::Error,
            req_id,
            action: None,
            token: None,
            payload: json!({ "error": body }),
        }
    }

    /// Error envelope for an [`AppError`], using its client-safe message.
    pub fn from_app_error(req_id: Option<String>, err: &AppError) -> Self {
        Self::error(req_id, err.code(), err.client_message())
    }

    /// Decode a request frame.
    ///
    /// Bad UTF-8, bad JSON, a wrong shape, or a `type` other than `request`
    /// all yield a validation failure; the connection stays open.
    pub fn decode_request(bytes: &[u8]) -> Result<Envelope, DecodeFailure> {
        let raw: Value = serde_json::from_slice(bytes).map_err(|e| DecodeFailure {
            req_id: None,
            error: AppError::validation(format!("Invalid envelope: {}", e)),
        })?;

        let req_id = raw
            .get("reqId")
            .and_then(Value::as_str)
            .map(str::to_string);

        let env: Envelope = serde_json::from_value(raw).map_err(|e| DecodeFailure {
            req_id: req_id.clone(),
            error: AppError::validation(format!("Invalid envelope: {}", e)),
        })?;

        if env.msg_type != EnvelopeType::Request {
            return Err(DecodeFailure {
                req_id,
                error: AppError::validation("Invalid envelope: expected type 'request'"),
            });
        }

        Ok(env)
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// `payload.error` of an error envelope, if present.
    pub fn error_code(&self) -> Option<&str> {
        self.payload
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(Value::as_str)
    }
}
