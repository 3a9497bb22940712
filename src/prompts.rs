//! Prompt map loading and prompt assembly.
//!
//! `image_prompts.yaml` maps each section to a generation prompt. Each entry
//! carries a small inline `key: value` spec that is flattened into a single
//! English prompt for the Imagen endpoint, with the quality and safety
//! clauses the drafting workflow standardizes on.

use crate::error::PipelineError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

const QUALITY_CLAUSE: &str =
    "4K HDR professional photograph, sharp focus, high detail, controlled studio lighting, ";

const ASPECT_CLAUSE: &str = "16:9 aspect ratio. ";

/// Steers the model away from the wrong denomination or currency when the
/// article is about banknotes.
const CURRENCY_CLAUSE: &str = "Japanese 10000 yen banknote, ten thousand yen note, \
     highest denomination. NOT 1000 yen, NOT 5000 yen. NOT US dollar. ";

const SAFETY_CLAUSE: &str = "Do not reproduce any real currency design, logos, or \
     identifiable security features. Abstract representation only.";

fn default_currency_mode() -> bool {
    true
}

/// Parsed `image_prompts.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptMap {
    pub prompts: Vec<PromptEntry>,
    /// File-wide default; individual entries may override.
    #[serde(default = "default_currency_mode")]
    pub currency_mode: bool,
}

/// One section's generation instructions.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptEntry {
    /// Output file stem (`images/<id>.jpg`).
    pub id: String,
    /// Heading text this entry belongs to; informational only.
    pub h2: String,
    /// Alt text keying the placeholder substitution.
    pub alt: String,
    /// Inline `key: value` prompt spec.
    pub yaml: String,
    /// Substitute the shared promotional asset instead of generating.
    #[serde(default)]
    pub use_fixed: bool,
    #[serde(default)]
    pub currency_mode: Option<bool>,
}

impl PromptMap {
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let contents =
            fs::read_to_string(path).map_err(|e| PipelineError::io(path.to_path_buf(), e))?;
        let map: PromptMap = serde_yaml::from_str(&contents).map_err(|e| {
            PipelineError::prompt_map(format!("failed to parse {}: {e}", path.display()))
        })?;
        if map.prompts.is_empty() {
            return Err(PipelineError::prompt_map(format!(
                "{} contains no prompt entries",
                path.display()
            )));
        }
        Ok(map)
    }

    /// Effective currency mode for one entry (entry override > file default).
    pub fn currency_mode_for(&self, entry: &PromptEntry) -> bool {
        entry.currency_mode.unwrap_or(self.currency_mode)
    }
}

/// Flatten an inline prompt spec into the final English prompt.
///
/// Lines are `key: value`; comments and the `avoid` key are dropped, the
/// remaining values joined in order. The quality and aspect clauses always
/// lead, the safety clause always trails.
pub fn build_prompt(yaml_spec: &str, currency_mode: bool) -> String {
    let mut parts = Vec::new();
    for line in yaml_spec.trim().lines() {
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();
        if key == "avoid" || key.is_empty() || value.is_empty() {
            continue;
        }
        parts.push(value);
    }
    let base = parts.join(" ");
    let currency = if currency_mode { CURRENCY_CLAUSE } else { "" };

    format!("{QUALITY_CLAUSE}{ASPECT_CLAUSE}{currency}{base} {SAFETY_CLAUSE}")
}
