use chrono::{DateTime, Utc};
use reqwest::{
    multipart::{Form, Part},
    Client, Response, StatusCode,
};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use requerimiento_core::{AudioAttachment, RegistroPayload};

/// Path of the registration endpoint, relative to the API base URL.
pub const REGISTRAR_PATH: &str = "registrar-requerimiento";

/// Shown when the server rejects a request without a `detail` message.
pub const FALLBACK_DETAIL: &str = "Error al registrar el requerimiento";

/// Shown for transport failures and unreadable responses.
pub const CONNECTIVITY_MESSAGE: &str = "Error de conexión con el servidor";

/// Client for the requerimiento registration endpoint.
#[derive(Clone)]
pub struct RegistroClient {
    http: Client,
    base_url: Url,
}

impl RegistroClient {
    /// Creates a client rooted at `base_url`.
    ///
    /// A missing trailing slash is added so the endpoint path is appended to
    /// the base path instead of replacing its last segment.
    pub fn new(base_url: Url, http: Client) -> Self {
        Self {
            http,
            base_url: with_trailing_slash(base_url),
        }
    }

    /// Full URL the registration POST is sent to.
    pub fn endpoint(&self) -> Result<Url, RegistroError> {
        Ok(self.base_url.join(REGISTRAR_PATH)?)
    }

    /// Sends one multipart POST with the validated record and optional voice note.
    ///
    /// There is no retry: a failed call must be re-initiated by the caller.
    pub async fn register(
        &self,
        payload: &RegistroPayload,
        audio: Option<&AudioAttachment>,
    ) -> Result<RegistroReceipt, RegistroError> {
        let url = self.endpoint()?;
        let form = build_form(payload, audio)?;

        let response = self
            .http
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(RegistroError::Transport)?;

        parse_receipt(response).await
    }
}

/// Outcome of a successful registration.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistroReceipt {
    /// Identifier the server assigned to the new record.
    pub rid: String,
    pub received_at: DateTime<Utc>,
    /// Full response document, kept for display.
    pub body: Value,
}

/// Errors produced by the registration client.
#[derive(Debug, Error)]
pub enum RegistroError {
    #[error("failed to build url: {0}")]
    Url(#[from] url::ParseError),
    #[error("failed to build audio part: {0}")]
    AudioPart(#[source] reqwest::Error),
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("server rejected request ({status}): {detail}")]
    Rejected { status: StatusCode, detail: String },
    #[error("unexpected response body: {0}")]
    InvalidResponse(String),
}

impl RegistroError {
    /// Message to surface to the person filling in the form.
    ///
    /// Server rejections are shown verbatim; every other failure maps to the
    /// generic connectivity message.
    pub fn user_message(&self) -> &str {
        match self {
            Self::Rejected { detail, .. } => detail,
            _ => CONNECTIVITY_MESSAGE,
        }
    }

    /// Metrics/log label for the failure.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Url(_) | Self::AudioPart(_) => "client",
            Self::Transport(_) => "transport",
            Self::Rejected { .. } => "rejected",
            Self::InvalidResponse(_) => "invalid_response",
        }
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn build_form(
    payload: &RegistroPayload,
    audio: Option<&AudioAttachment>,
) -> Result<Form, RegistroError> {
    let mut form = Form::new();
    for (name, value) in payload.text_parts() {
        form = form.text(name, value);
    }

    if let Some(audio) = audio {
        let part = Part::bytes(audio.bytes().to_vec())
            .file_name(audio.file_name().to_string())
            .mime_str(audio.media_type().as_str())
            .map_err(RegistroError::AudioPart)?;
        form = form.part("nota_voz", part);
    }

    Ok(form)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RidValue {
    Text(String),
    Number(serde_json::Number),
}

async fn parse_receipt(response: Response) -> Result<RegistroReceipt, RegistroError> {
    let status = response.status();
    let text = response.text().await.map_err(RegistroError::Transport)?;

    if !status.is_success() {
        return Err(RegistroError::Rejected {
            status,
            detail: extract_detail(&text),
        });
    }

    let body: Value = serde_json::from_str(&text)
        .map_err(|err| RegistroError::InvalidResponse(format!("{err}: {text}")))?;
    let rid = body
        .get("rid")
        .cloned()
        .and_then(|value| serde_json::from_value::<RidValue>(value).ok())
        .map(|rid| match rid {
            RidValue::Text(value) => value,
            RidValue::Number(value) => value.to_string(),
        })
        .ok_or_else(|| RegistroError::InvalidResponse(format!("missing rid: {text}")))?;

    Ok(RegistroReceipt {
        rid,
        received_at: Utc::now(),
        body,
    })
}

fn extract_detail(text: &str) -> String {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => match map.get("detail") {
            Some(detail) if is_blank(detail) => FALLBACK_DETAIL.to_string(),
            Some(Value::String(detail)) => detail.clone(),
            Some(other) => other.to_string(),
            None => FALLBACK_DETAIL.to_string(),
        },
        _ => FALLBACK_DETAIL.to_string(),
    }
}

/// `null`, `false`, `0` and `""` carry no message for the user.
fn is_blank(detail: &Value) -> bool {
    match detail {
        Value::Null | Value::Bool(false) => true,
        Value::String(text) => text.is_empty(),
        Value::Number(number) => number.as_f64() == Some(0.0),
        _ => false,
    }
}
