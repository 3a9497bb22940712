//! Error taxonomy for the image pipeline.
//!
//! Every stage reports a typed [`PipelineError`]; nothing is retried or
//! recovered locally. The binary boundary wraps these in `anyhow` context.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The draft HTML contains a malformed or duplicated placeholder.
    #[error("placeholder parse error in section '{section}': {detail}")]
    Parse { section: String, detail: String },

    /// The generation endpoint failed (transport, status, or payload).
    #[error("image generation failed{}: {detail}", model_suffix(.model))]
    Generation {
        model: Option<String>,
        status: Option<u16>,
        detail: String,
    },

    /// The resolved image bytes could not be decoded or re-encoded.
    #[error("image compression failed: {detail}")]
    Compression { detail: String },

    /// image_prompts.yaml is missing, invalid, or does not cover a section.
    #[error("prompt map error: {detail}")]
    PromptMap { detail: String },

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn model_suffix(model: &Option<String>) -> String {
    match model {
        Some(id) => format!(" (model {id})"),
        None => String::new(),
    }
}

impl PipelineError {
    pub fn generation(detail: impl Into<String>) -> Self {
        Self::Generation {
            model: None,
            status: None,
            detail: detail.into(),
        }
    }

    pub fn compression(detail: impl Into<String>) -> Self {
        Self::Compression {
            detail: detail.into(),
        }
    }

    pub fn prompt_map(detail: impl Into<String>) -> Self {
        Self::PromptMap {
            detail: detail.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable label used in structured log fields.
    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::Parse { .. } => "parse_error",
            PipelineError::Generation { .. } => "generation_error",
            PipelineError::Compression { .. } => "compression_error",
            PipelineError::PromptMap { .. } => "prompt_map_error",
            PipelineError::Io { .. } => "io_error",
        }
    }
}
