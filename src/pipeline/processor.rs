//! Form processing orchestrator.
//!
//! Drives one document through the whole pipeline:
//! detect → rasterize → recognize → group → extract → normalize → validate.
//!
//! Rendering and recognition are injected as traits so the orchestrator is
//! fully testable with mock implementations.

use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::pipeline::fields::{
    FieldCatalog, FieldExtractor, HeaderStyle, Normalizer, Record, Validator,
};
use crate::pipeline::grouping::group_pages;
use crate::pipeline::rasterize::{detect_kind, PdfPageRenderer, PdfiumRenderer, Rasterizer};
use crate::pipeline::recognition::{
    recognize_pages, OcrSpaceClient, RecognitionError, RecognitionGateway, Throttled,
};
use crate::pipeline::types::{DocumentInput, DocumentKind, Form};
use crate::pipeline::PipelineError;
use crate::pipeline_config::{ConfigError, PipelineConfig};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failures while assembling a production processor.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorInitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("PDF renderer unavailable: {0}")]
    Renderer(#[from] PipelineError),

    #[error("OCR client initialization failed: {0}")]
    Gateway(#[from] RecognitionError),
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// One extracted form.
#[derive(Debug, Clone, Serialize)]
pub struct FormOutcome {
    pub form_index: usize,
    pub first_page: Option<usize>,
    pub last_page: Option<usize>,
    pub failed_pages: usize,
    pub record: Record,
    /// Validator messages; advisory only.
    pub errors: Vec<String>,
    /// Page texts including error markers, for review.
    pub raw_text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentOutcome {
    pub document_id: Uuid,
    pub source_name: String,
    pub kind: DocumentKind,
    pub page_count: usize,
    pub forms: Vec<FormOutcome>,
    pub recognition_failures: usize,
    /// Recognition was stopped before every page was attempted.
    pub cancelled: bool,
}

/// A document that could not be processed at all.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentFailure {
    pub source_name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    pub documents: Vec<DocumentOutcome>,
    pub failures: Vec<DocumentFailure>,
}

impl BatchOutcome {
    /// Every record, in document then form order.
    pub fn records(&self) -> Vec<Record> {
        self.documents
            .iter()
            .flat_map(|d| d.forms.iter().map(|f| f.record.clone()))
            .collect()
    }

    pub fn form_count(&self) -> usize {
        self.documents.iter().map(|d| d.forms.len()).sum()
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct FormProcessor {
    rasterizer: Rasterizer,
    gateway: Box<dyn RecognitionGateway>,
    catalog: FieldCatalog,
    header_style: HeaderStyle,
    extractor: FieldExtractor,
    normalizer: Normalizer,
    validator: Validator,
    group_size: NonZeroUsize,
    language_hint: String,
    cancel: Option<Arc<AtomicBool>>,
}

impl FormProcessor {
    /// Build a processor from configuration and injected engines. A non-zero
    /// `ocr.request_delay_ms` wraps the gateway in [`Throttled`].
    pub fn new(
        config: &PipelineConfig,
        renderer: Box<dyn PdfPageRenderer + Send + Sync>,
        gateway: Box<dyn RecognitionGateway>,
    ) -> Result<Self, ConfigError> {
        let group_size = config.group_size()?;
        let catalog = config.catalog()?;
        let style = config.header_style;
        let extractor = FieldExtractor::new(&catalog, style, config.label_boundaries)?;
        let normalizer =
            Normalizer::new(&catalog, style, config.title_case_names, &config.name_fields);
        let validator = Validator::new(&catalog, style, &config.required_fields);

        let delay = config.request_delay();
        let gateway: Box<dyn RecognitionGateway> = if delay.is_zero() {
            gateway
        } else {
            Box::new(Throttled::new(gateway, delay))
        };

        Ok(Self {
            rasterizer: Rasterizer::new(renderer, config.render_dpi),
            gateway,
            catalog,
            header_style: style,
            extractor,
            normalizer,
            validator,
            group_size,
            language_hint: config.language_hint.clone(),
            cancel: None,
        })
    }

    /// Stop issuing recognition calls once `flag` is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    /// Export column names, in catalog order.
    pub fn columns(&self) -> Vec<String> {
        self.catalog.headers(self.header_style)
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_deref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Run one document through the pipeline.
    ///
    /// Fails only when the document itself cannot be decoded or rendered.
    /// Recognition failures are recorded per page and the forms are still
    /// produced.
    pub fn process_document(&self, input: &DocumentInput) -> Result<DocumentOutcome, PipelineError> {
        let document_id = Uuid::new_v4();
        let _span = tracing::info_span!(
            "process_document",
            document_id = %document_id,
            file = %input.filename
        )
        .entered();

        let kind = detect_kind(&input.filename, input.content_type.as_deref(), &input.bytes)?;
        let pages = self.rasterizer.rasterize_kind(kind, &input.bytes)?;
        let page_count = pages.len();

        let recognized = recognize_pages(
            self.gateway.as_ref(),
            &pages,
            &self.language_hint,
            self.cancel.as_deref(),
        );
        drop(pages);

        let cancelled = recognized.len() < page_count;
        let recognition_failures = recognized.iter().filter(|p| p.is_error()).count();

        let forms: Vec<FormOutcome> = group_pages(recognized, self.group_size)
            .iter()
            .map(|form| self.process_form(form))
            .collect();

        tracing::info!(
            pages = page_count,
            forms = forms.len(),
            recognition_failures,
            cancelled,
            "Document processed"
        );

        Ok(DocumentOutcome {
            document_id,
            source_name: input.filename.clone(),
            kind,
            page_count,
            forms,
            recognition_failures,
            cancelled,
        })
    }

    fn process_form(&self, form: &Form) -> FormOutcome {
        let mut record = self.extractor.extract_form(form);
        self.normalizer.normalize(&mut record);
        let errors = self.validator.validate(&record);

        tracing::debug!(
            form = form.index,
            filled = record.filled(),
            missing_required = errors.len(),
            "Form extracted"
        );

        FormOutcome {
            form_index: form.index,
            first_page: form.first_page(),
            last_page: form.last_page(),
            failed_pages: form.failed_pages(),
            raw_text: form
                .pages
                .iter()
                .map(|p| p.text.as_str())
                .collect::<Vec<_>>()
                .join(crate::pipeline::types::PAGE_SEPARATOR),
            record,
            errors,
        }
    }

    /// Process documents in order. A document that fails is recorded in
    /// `failures` and the rest continue.
    pub fn process_batch(&self, inputs: &[DocumentInput]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for (done, input) in inputs.iter().enumerate() {
            if self.batch_cancelled(inputs.len() - done) {
                break;
            }
            self.process_into(&mut outcome, input);
        }
        outcome
    }

    /// Read and process files in order. A file that cannot be read is
    /// recorded in `failures` like any other failed document.
    pub fn process_files<P: AsRef<Path>>(&self, paths: &[P]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for (done, path) in paths.iter().enumerate() {
            if self.batch_cancelled(paths.len() - done) {
                break;
            }
            let path = path.as_ref();
            match DocumentInput::from_path(path) {
                Ok(input) => self.process_into(&mut outcome, &input),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Cannot read document, continuing with batch"
                    );
                    outcome.failures.push(DocumentFailure {
                        source_name: path.display().to_string(),
                        error: PipelineError::Io(e).to_string(),
                    });
                }
            }
        }
        outcome
    }

    fn batch_cancelled(&self, remaining: usize) -> bool {
        let cancelled = self.is_cancelled();
        if cancelled {
            tracing::info!(remaining, "Batch cancelled");
        }
        cancelled
    }

    fn process_into(&self, outcome: &mut BatchOutcome, input: &DocumentInput) {
        match self.process_document(input) {
            Ok(document) => outcome.documents.push(document),
            Err(e) => {
                tracing::warn!(
                    file = %input.filename,
                    error = %e,
                    "Document failed, continuing with batch"
                );
                outcome.failures.push(DocumentFailure {
                    source_name: input.filename.clone(),
                    error: e.to_string(),
                });
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Build a `FormProcessor` with production engines: PDFium for rendering and
/// OCR.space for recognition.
pub fn build_processor(config: &PipelineConfig) -> Result<FormProcessor, ProcessorInitError> {
    let renderer = PdfiumRenderer::new(config.pdfium_path.clone())?;
    let api_key = config.api_key()?;
    let client = OcrSpaceClient::new(
        &config.ocr.endpoint,
        &api_key,
        config.ocr.engine,
        config.ocr.timeout_secs,
    )?;
    tracing::info!(
        endpoint = %config.ocr.endpoint,
        engine = config.ocr.engine,
        "Form processor using OCR.space"
    );
    Ok(FormProcessor::new(
        config,
        Box::new(renderer),
        Box::new(client),
    )?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::rasterize::MockPdfPageRenderer;
    use crate::pipeline::recognition::MockRecognitionGateway;

    fn pdf() -> DocumentInput {
        DocumentInput::new("forms.pdf", b"%PDF-1.7 mock".to_vec())
    }

    fn processor(pages: usize, responses: Vec<Result<String, RecognitionError>>) -> FormProcessor {
        FormProcessor::new(
            &PipelineConfig::default(),
            Box::new(MockPdfPageRenderer::new(pages)),
            Box::new(MockRecognitionGateway::new(responses)),
        )
        .unwrap()
    }

    fn texts(texts: &[&str]) -> Vec<Result<String, RecognitionError>> {
        texts.iter().map(|t| Ok(t.to_string())).collect()
    }

    #[test]
    fn four_page_document_yields_one_complete_record() {
        let p = processor(
            4,
            texts(&["Patient Name: john smith", "Patient ID: 77", "Age: 30", ""]),
        );
        let outcome = p.process_document(&pdf()).unwrap();

        assert_eq!(outcome.page_count, 4);
        assert_eq!(outcome.forms.len(), 1);
        let form = &outcome.forms[0];
        assert_eq!(
            form.record.get("Patient Name / اسم المريض"),
            Some("John Smith")
        );
        assert!(form.errors.is_empty(), "errors: {:?}", form.errors);
        assert_eq!(form.record.len(), p.catalog().len());
    }

    #[test]
    fn eight_pages_make_two_forms_of_four() {
        let outcome = processor(8, vec![]).process_document(&pdf()).unwrap();
        assert_eq!(outcome.forms.len(), 2);
        assert_eq!(
            (outcome.forms[0].first_page, outcome.forms[0].last_page),
            (Some(1), Some(4))
        );
        assert_eq!(
            (outcome.forms[1].first_page, outcome.forms[1].last_page),
            (Some(5), Some(8))
        );
    }

    #[test]
    fn six_pages_make_full_and_short_form() {
        let p = processor(
            6,
            texts(&["Patient Name: A", "", "", "", "Patient Name: B", ""]),
        );
        let outcome = p.process_document(&pdf()).unwrap();
        assert_eq!(outcome.forms.len(), 2);
        assert_eq!(outcome.forms[1].first_page, Some(5));
        assert_eq!(outcome.forms[1].last_page, Some(6));
        assert_eq!(
            outcome.forms[1].record.get("Patient Name / اسم المريض"),
            Some("B")
        );
    }

    #[test]
    fn timed_out_page_keeps_form_and_other_pages() {
        let p = processor(
            4,
            vec![
                Ok("Patient Name: Amal".into()),
                Err(RecognitionError::Timeout(300)),
                Ok("Patient ID: 12".into()),
                Ok("Age: 41".into()),
            ],
        );
        let outcome = p.process_document(&pdf()).unwrap();

        assert_eq!(outcome.recognition_failures, 1);
        assert_eq!(outcome.forms.len(), 1);
        let form = &outcome.forms[0];
        assert_eq!(form.failed_pages, 1);
        assert!(form
            .raw_text
            .contains("[ERROR on page 2]: Request timed out after 300s"));
        assert_eq!(form.record.get("Patient ID / رقم المريض"), Some("12"));
        assert_eq!(form.record.get("Age / العمر"), Some("41"));
    }

    #[test]
    fn arabic_label_on_own_line_reads_next_line() {
        let p = processor(4, texts(&["الجنس\n\nMale", "", "", ""]));
        let outcome = p.process_document(&pdf()).unwrap();
        assert_eq!(
            outcome.forms[0].record.get("Gender / الجنس"),
            Some("Male")
        );
    }

    #[test]
    fn missing_required_fields_are_reported_not_fatal() {
        let outcome = processor(4, vec![]).process_document(&pdf()).unwrap();
        assert_eq!(
            outcome.forms[0].errors,
            vec![
                "Missing required field: Patient Name / اسم المريض".to_string(),
                "Missing required field: Patient ID / رقم المريض".to_string(),
            ]
        );
    }

    #[test]
    fn image_document_is_single_page_form() {
        let input = DocumentInput::new("scan.png", crate::pipeline::rasterize::test_png(8, 8));
        let outcome = processor(0, texts(&["Patient Name: x"]))
            .process_document(&input)
            .unwrap();
        assert_eq!(outcome.kind, DocumentKind::Image);
        assert_eq!(outcome.page_count, 1);
        assert_eq!(outcome.forms.len(), 1);
    }

    #[test]
    fn undecodable_document_is_an_error() {
        let input = DocumentInput::new("notes.txt", b"hello".to_vec());
        let err = processor(0, vec![]).process_document(&input).unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
    }

    #[test]
    fn batch_continues_past_bad_document() {
        let p = processor(4, texts(&["Patient Name: a", "", "", ""]));
        let inputs = vec![
            DocumentInput::new("broken.bin", vec![0u8; 16]),
            pdf(),
        ];
        let outcome = p.process_batch(&inputs);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].source_name, "broken.bin");
        assert_eq!(outcome.documents.len(), 1);
        assert_eq!(outcome.form_count(), 1);
        assert_eq!(outcome.records().len(), 1);
    }

    #[test]
    fn unreadable_file_does_not_stop_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.pdf");
        let good = dir.path().join("good.pdf");
        std::fs::write(&good, b"%PDF-1.7 mock").unwrap();

        let p = processor(4, texts(&["Patient Name: a", "", "", ""]));
        let outcome = p.process_files(&[&missing, &good]);

        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.failures[0].source_name.ends_with("missing.pdf"));
        assert!(outcome.failures[0].error.starts_with("I/O error"), "{}", outcome.failures[0].error);
        assert_eq!(outcome.documents.len(), 1);
        assert_eq!(outcome.documents[0].source_name, "good.pdf");
        assert_eq!(outcome.records().len(), 1);
    }

    #[test]
    fn label_boundaries_flow_from_config() {
        let config = PipelineConfig {
            label_boundaries: true,
            header_style: HeaderStyle::Key,
            ..PipelineConfig::default()
        };
        let p = FormProcessor::new(
            &config,
            Box::new(MockPdfPageRenderer::new(1)),
            Box::new(MockRecognitionGateway::with_texts(&["الجنسية: سوداني"])),
        )
        .unwrap();
        let record = &p.process_document(&pdf()).unwrap().forms[0].record;
        assert_eq!(record.get("nationality"), Some("سوداني"));
        assert_eq!(record.get("gender"), Some(""));
    }

    #[test]
    fn cancelled_processor_makes_no_calls() {
        let flag = Arc::new(AtomicBool::new(true));
        let p = processor(4, texts(&["a", "b", "c", "d"])).with_cancel_flag(flag);
        let outcome = p.process_batch(&[pdf()]);
        assert!(outcome.documents.is_empty());
        assert!(outcome.failures.is_empty());

        let single = p.process_document(&pdf()).unwrap();
        assert!(single.cancelled);
        assert!(single.forms.is_empty());
    }

    #[test]
    fn zero_group_size_is_rejected_at_construction() {
        let config = PipelineConfig {
            group_size: 0,
            ..PipelineConfig::default()
        };
        let result = FormProcessor::new(
            &config,
            Box::new(MockPdfPageRenderer::new(1)),
            Box::new(MockRecognitionGateway::new(vec![])),
        );
        assert!(matches!(result, Err(ConfigError::InvalidGroupSize)));
    }

    #[test]
    fn key_headers_and_custom_group_size() {
        let config = PipelineConfig {
            group_size: 2,
            header_style: HeaderStyle::Key,
            ..PipelineConfig::default()
        };
        let p = FormProcessor::new(
            &config,
            Box::new(MockPdfPageRenderer::new(4)),
            Box::new(MockRecognitionGateway::with_texts(&["Age: 5", "", "Age: 6", ""])),
        )
        .unwrap();
        let outcome = p.process_document(&pdf()).unwrap();
        assert_eq!(outcome.forms.len(), 2);
        assert_eq!(outcome.forms[1].record.get("age"), Some("6"));
        assert_eq!(p.columns()[0], "patient_name");
    }

    #[test]
    fn outcome_serializes_records_in_column_order() {
        let outcome = processor(4, texts(&["Patient Name: z"]))
            .process_document(&pdf())
            .unwrap();
        let json = serde_json::to_string(&outcome).unwrap();
        let name = json.find("Patient Name / اسم المريض").unwrap();
        let id = json.find("Patient ID / رقم المريض").unwrap();
        assert!(name < id);
    }
}
