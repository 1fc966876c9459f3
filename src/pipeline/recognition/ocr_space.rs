use std::time::Duration;

use reqwest::blocking::multipart;
use serde::Deserialize;

use super::{RecognitionError, RecognitionGateway, RecognitionRequest};

/// Public OCR.space endpoint.
pub const OCR_SPACE_ENDPOINT: &str = "https://api.ocr.space/parse/image";

/// Engine 2 handles Arabic script and mixed-language pages.
pub const DEFAULT_OCR_ENGINE: u8 = 2;

/// Whole-page OCR on the free tier regularly takes over a minute.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// OCR.space HTTP client.
pub struct OcrSpaceClient {
    endpoint: String,
    api_key: String,
    engine: u8,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OcrSpaceClient {
    pub fn new(
        endpoint: &str,
        api_key: &str,
        engine: u8,
        timeout_secs: u64,
    ) -> Result<Self, RecognitionError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| RecognitionError::HttpClient(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            engine,
            client,
            timeout_secs,
        })
    }

    /// Public endpoint, engine 2, five-minute timeout.
    pub fn with_api_key(api_key: &str) -> Result<Self, RecognitionError> {
        Self::new(
            OCR_SPACE_ENDPOINT,
            api_key,
            DEFAULT_OCR_ENGINE,
            DEFAULT_TIMEOUT_SECS,
        )
    }

    fn map_send_error(&self, e: reqwest::Error) -> RecognitionError {
        if e.is_timeout() {
            RecognitionError::Timeout(self.timeout_secs)
        } else if e.is_connect() {
            RecognitionError::Connection(self.endpoint.clone())
        } else {
            RecognitionError::HttpClient(e.to_string())
        }
    }
}

/// Response body of `/parse/image`.
#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OcrSpaceResponse {
    #[serde(default)]
    parsed_results: Vec<ParsedResult>,
    #[serde(default)]
    is_errored_on_processing: bool,
    #[serde(default)]
    error_message: Option<ErrorMessage>,
    #[serde(default)]
    error_details: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ParsedResult {
    #[serde(default)]
    parsed_text: String,
}

/// `ErrorMessage` is a string on some failures and a list on others.
#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorMessage {
    One(String),
    Many(Vec<String>),
}

impl ErrorMessage {
    fn joined(&self) -> String {
        match self {
            Self::One(m) => m.clone(),
            Self::Many(ms) => ms.join("; "),
        }
    }
}

/// Turn a response body into recognized text or the service's own error.
fn parse_response(body: &str) -> Result<String, RecognitionError> {
    let parsed: OcrSpaceResponse = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        // Quota and validation failures sometimes come back as bare text.
        Err(e) => {
            let trimmed = body.trim();
            return Err(if trimmed.is_empty() || trimmed.starts_with('{') {
                RecognitionError::MalformedResponse(e.to_string())
            } else {
                RecognitionError::Remote(trimmed.to_string())
            });
        }
    };

    if parsed.is_errored_on_processing {
        let message = parsed
            .error_message
            .map(|m| m.joined())
            .filter(|m| !m.trim().is_empty())
            .or_else(|| parsed.error_details.filter(|d| !d.trim().is_empty()))
            .unwrap_or_else(|| "OCR Error".to_string());
        return Err(RecognitionError::Remote(message));
    }

    if parsed.parsed_results.is_empty() {
        return Err(RecognitionError::MalformedResponse(
            "response has no ParsedResults".into(),
        ));
    }

    Ok(parsed
        .parsed_results
        .into_iter()
        .map(|r| r.parsed_text)
        .collect::<Vec<_>>()
        .join("\n"))
}

impl RecognitionGateway for OcrSpaceClient {
    fn recognize(&self, request: &RecognitionRequest<'_>) -> Result<String, RecognitionError> {
        let part = multipart::Part::bytes(request.image.to_vec())
            .file_name(request.filename.to_string())
            .mime_str("image/png")
            .map_err(|e| RecognitionError::HttpClient(e.to_string()))?;

        let form = multipart::Form::new()
            .part("file", part)
            .text("language", request.language_hint.to_string())
            .text("isOverlayRequired", "false")
            .text("OCREngine", self.engine.to_string())
            .text("scale", "true")
            .text("isTable", "true");

        let response = self
            .client
            .post(&self.endpoint)
            .header("apikey", &self.api_key)
            .multipart(form)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| self.map_send_error(e))?;

        if !status.is_success() {
            return Err(RecognitionError::Http {
                status: status.as_u16(),
                body,
            });
        }

        parse_response(&body)
    }
}
