//! Pipeline configuration.
//!
//! Every knob has a default matching the printed malaria investigation form,
//! so an empty file (or no file) is a valid configuration. Values are passed
//! into the processor at construction; nothing is read from globals later.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::pipeline::fields::{CatalogError, FieldCatalog, FieldLabel, HeaderStyle};
use crate::pipeline::grouping::DEFAULT_GROUP_SIZE;
use crate::pipeline::rasterize::DEFAULT_RENDER_DPI;
use crate::pipeline::recognition::{
    DEFAULT_LANGUAGE_HINT, DEFAULT_OCR_ENGINE, DEFAULT_TIMEOUT_SECS, OCR_SPACE_ENDPOINT,
};

/// Environment variable consulted when the file carries no API key.
pub const API_KEY_ENV: &str = "OCR_SPACE_API_KEY";

/// Below this, handwriting on scanned forms stops being recognizable.
pub const MIN_RENDER_DPI: u32 = 200;
pub const MAX_RENDER_DPI: u32 = 600;

// ═══════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read configuration {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("group_size must be at least 1")]
    InvalidGroupSize,

    #[error("render_dpi must be between 200 and 600, got {0}")]
    InvalidDpi(u32),

    #[error("Invalid field catalog: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Invalid label pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("No OCR API key: set [ocr] api_key or {API_KEY_ENV}")]
    MissingApiKey,
}

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Remote OCR service settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OcrSettings {
    pub endpoint: String,
    /// Falls back to [`API_KEY_ENV`] when absent.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub engine: u8,
    pub timeout_secs: u64,
    /// Minimum pause between consecutive calls. 0 disables pacing.
    pub request_delay_ms: u64,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            endpoint: OCR_SPACE_ENDPOINT.to_string(),
            api_key: None,
            engine: DEFAULT_OCR_ENGINE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            request_delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Pages per form.
    pub group_size: usize,
    pub language_hint: String,
    /// Checked by the validator. Keys, English labels or headers.
    pub required_fields: Vec<String>,
    pub header_style: HeaderStyle,
    /// English labels only match on word boundaries, and a label inside a
    /// longer label of another field is ignored. Off: plain substring match.
    pub label_boundaries: bool,
    pub title_case_names: bool,
    /// Columns title-cased when `title_case_names` is on.
    pub name_fields: Vec<String>,
    pub render_dpi: u32,
    /// Explicit PDFium shared library. Otherwise looked up next to the
    /// executable, then system-wide.
    pub pdfium_path: Option<PathBuf>,
    pub ocr: OcrSettings,
    /// Replaces the built-in catalog when present.
    pub fields: Option<Vec<FieldLabel>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            group_size: DEFAULT_GROUP_SIZE,
            language_hint: DEFAULT_LANGUAGE_HINT.to_string(),
            required_fields: vec!["patient_name".into(), "patient_id".into()],
            header_style: HeaderStyle::Bilingual,
            label_boundaries: false,
            title_case_names: true,
            name_fields: vec!["patient_name".into()],
            render_dpi: DEFAULT_RENDER_DPI,
            pdfium_path: None,
            ocr: OcrSettings::default(),
            fields: None,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Loading
// ═══════════════════════════════════════════════════════════

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&raw)?;
        tracing::info!(
            path = %path.display(),
            group_size = config.group_size,
            custom_catalog = config.fields.is_some(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Parse and check a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.group_size()?;
        if !(MIN_RENDER_DPI..=MAX_RENDER_DPI).contains(&self.render_dpi) {
            return Err(ConfigError::InvalidDpi(self.render_dpi));
        }
        let catalog = self.catalog()?;
        for name in &self.required_fields {
            if catalog.position(name).is_none() {
                tracing::warn!(field = %name, "Required field not in catalog, ignored");
            }
        }
        Ok(())
    }

    pub fn group_size(&self) -> Result<NonZeroUsize, ConfigError> {
        NonZeroUsize::new(self.group_size).ok_or(ConfigError::InvalidGroupSize)
    }

    pub fn catalog(&self) -> Result<FieldCatalog, ConfigError> {
        match &self.fields {
            Some(fields) => Ok(FieldCatalog::new(fields.clone())?),
            None => Ok(FieldCatalog::default()),
        }
    }

    /// API key from the file, else from the environment.
    pub fn api_key(&self) -> Result<String, ConfigError> {
        self.ocr
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }

    pub fn request_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.ocr.request_delay_ms)
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
