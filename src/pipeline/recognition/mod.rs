//! Recognition gateway: page image in, recognized text out.
//!
//! The remote OCR service is a black box behind [`RecognitionGateway`]. Each
//! page gets exactly one call; a failed call becomes an inline error marker on
//! that page and never stops its siblings.

pub mod ocr_space;
pub mod throttle;

pub use ocr_space::*;
pub use throttle::*;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use thiserror::Error;

use crate::pipeline::types::{PageImage, RecognizedPage};

/// Scripts requested when none are configured: English + Arabic.
pub const DEFAULT_LANGUAGE_HINT: &str = "eng,ara";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecognitionError {
    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("OCR service is not reachable at {0}")]
    Connection(String),

    #[error("OCR service returned error (status {status}): {body}")]
    Http { status: u16, body: String },

    /// The service processed the request and reported a failure. The message
    /// is the service's own wording.
    #[error("OCR Error: {0}")]
    Remote(String),

    #[error("Malformed OCR response: {0}")]
    MalformedResponse(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

/// One recognition call.
#[derive(Debug, Clone, Copy)]
pub struct RecognitionRequest<'a> {
    pub image: &'a [u8],
    pub filename: &'a str,
    pub language_hint: &'a str,
}

/// Remote text recognition. Implementations own their timeout; wrappers such
/// as [`Throttled`] layer pacing (or retries) over the same contract.
pub trait RecognitionGateway: Send + Sync {
    fn recognize(&self, request: &RecognitionRequest<'_>) -> Result<String, RecognitionError>;
}

impl<G: RecognitionGateway + ?Sized> RecognitionGateway for Box<G> {
    fn recognize(&self, request: &RecognitionRequest<'_>) -> Result<String, RecognitionError> {
        (**self).recognize(request)
    }
}

/// Recognize pages sequentially, in order.
///
/// `cancel` is polled between pages; once set, no further calls are made and
/// the pages not yet attempted are left out of the result.
pub fn recognize_pages(
    gateway: &dyn RecognitionGateway,
    pages: &[PageImage],
    language_hint: &str,
    cancel: Option<&AtomicBool>,
) -> Vec<RecognizedPage> {
    let mut recognized = Vec::with_capacity(pages.len());

    for page in pages {
        if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            tracing::info!(
                completed = recognized.len(),
                remaining = pages.len() - recognized.len(),
                "Recognition cancelled"
            );
            break;
        }

        let _span = tracing::info_span!("recognize_page", page = page.position).entered();
        let start = std::time::Instant::now();
        let filename = format!("page_{}.png", page.position);
        let request = RecognitionRequest {
            image: &page.png,
            filename: &filename,
            language_hint,
        };

        match gateway.recognize(&request) {
            Ok(text) => {
                tracing::debug!(
                    elapsed_ms = %start.elapsed().as_millis(),
                    text_len = text.len(),
                    "Page recognized"
                );
                recognized.push(RecognizedPage::recognized(page.position, text));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Recognition failed, continuing with next page");
                recognized.push(RecognizedPage::failed(page.position, e.to_string()));
            }
        }
    }

    recognized
}

// ── Mock for testing ──────────────────────────────────────

/// A call seen by [`MockRecognitionGateway`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub filename: String,
    pub language_hint: String,
    pub image_len: usize,
}

/// Gateway returning scripted responses in call order. Calls beyond the
/// script return empty text.
pub struct MockRecognitionGateway {
    responses: Mutex<std::collections::VecDeque<Result<String, RecognitionError>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockRecognitionGateway {
    pub fn new(responses: Vec<Result<String, RecognitionError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every page succeeds with the given texts, in order.
    pub fn with_texts<S: AsRef<str>>(texts: &[S]) -> Self {
        Self::new(texts.iter().map(|t| Ok(t.as_ref().to_string())).collect())
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl RecognitionGateway for MockRecognitionGateway {
    fn recognize(&self, request: &RecognitionRequest<'_>) -> Result<String, RecognitionError> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(RecordedCall {
                filename: request.filename.to_string(),
                language_hint: request.language_hint.to_string(),
                image_len: request.image.len(),
            });
        self.responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }
}
