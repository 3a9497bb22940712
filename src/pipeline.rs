//! Sequential job driver: scan, resolve, compress, write, rewrite.
//!
//! Sections are processed strictly in document order. Any stage failure
//! aborts the run; there is no partial-success bookkeeping beyond files
//! already written, which a rerun picks up as reusable output.

use crate::compress::compress_image;
use crate::config::JobConfig;
use crate::error::PipelineError;
use crate::generate::ImageGenerator;
use crate::prompts::{PromptEntry, PromptMap, build_prompt};
use crate::rewrite::{Substitution, rewrite_document};
use crate::scanner::{Placeholder, scan_document};
use anyhow::{Context, Result};
use std::fs;

/// Summary of one run, logged by the binary.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub sections: usize,
    pub placeholders: usize,
    /// Images produced by the generation endpoint.
    pub generated: usize,
    /// Placeholders satisfied by the shared fixed asset.
    pub fixed: usize,
    /// Outputs already on disk from a previous run.
    pub reused: usize,
    /// Placeholders whose src was filled in.
    pub rewritten: usize,
}

/// How one prompt entry gets its image.
enum Resolution {
    Reuse,
    RecompressRaw,
    Fixed,
    Generate,
}

pub async fn run_job(config: &JobConfig, generator: &dyn ImageGenerator) -> Result<JobReport> {
    let prompt_map = PromptMap::load(&config.prompts_path)?;

    let html = fs::read_to_string(&config.html_path)
        .map_err(|e| PipelineError::io(config.html_path.clone(), e))?;
    let sections = scan_document(&html)?;

    let slots: Vec<&Placeholder> = sections
        .iter()
        .filter_map(|section| section.placeholder.as_ref())
        .collect();

    let mut report = JobReport {
        sections: sections.len(),
        placeholders: slots.len(),
        ..JobReport::default()
    };

    // Every placeholder needs a prompt entry; pairing is positional.
    if slots.len() > prompt_map.prompts.len() {
        let uncovered = sections
            .iter()
            .filter(|section| section.placeholder.is_some())
            .nth(prompt_map.prompts.len())
            .map(|section| section.heading.clone())
            .unwrap_or_default();
        return Err(PipelineError::prompt_map(format!(
            "no prompt entry for section '{uncovered}' ({} placeholders, {} entries)",
            slots.len(),
            prompt_map.prompts.len()
        ))
        .into());
    }

    let mut substitutions = Vec::with_capacity(prompt_map.prompts.len());
    let total = prompt_map.prompts.len();

    for (index, entry) in prompt_map.prompts.iter().enumerate() {
        let slot = slots.get(index).copied();

        tracing::info!(
            step = format!("{}/{}", index + 1, total),
            section = %entry.h2,
            id = %entry.id,
            "processing section"
        );

        let alt = match slot {
            Some(placeholder) => {
                if placeholder.alt != entry.alt {
                    tracing::warn!(
                        scanned = %placeholder.alt,
                        configured = %entry.alt,
                        id = %entry.id,
                        "alt text mismatch, using the value from the document"
                    );
                }
                placeholder.alt.clone()
            }
            None => {
                // Surplus entry: processed for parity with the prompt file,
                // but its substitution cannot match anything.
                tracing::warn!(id = %entry.id, "prompt entry has no matching placeholder");
                entry.alt.clone()
            }
        };

        let resolution = classify(config, entry);
        let rel_path = config.relative_image_path(&entry.id);

        if config.dry_run {
            let action = match resolution {
                Resolution::Reuse => "reuse existing output",
                Resolution::RecompressRaw => "recompress leftover raw image",
                Resolution::Fixed => "copy fixed asset",
                Resolution::Generate => "generate via Imagen",
            };
            tracing::info!(id = %entry.id, action, path = %rel_path, "dry run");
            continue;
        }

        match resolution {
            Resolution::Reuse => {
                tracing::info!(path = %rel_path, "output already present, reusing");
                report.reused += 1;
            }
            Resolution::RecompressRaw => {
                let raw_path = config.raw_output_path(&entry.id);
                let bytes =
                    fs::read(&raw_path).map_err(|e| PipelineError::io(raw_path.clone(), e))?;
                write_compressed(config, &entry.id, &bytes)?;
                fs::remove_file(&raw_path)
                    .map_err(|e| PipelineError::io(raw_path.clone(), e))?;
                tracing::info!(path = %rel_path, "recompressed leftover raw image");
                report.reused += 1;
            }
            Resolution::Fixed => {
                let asset = config.fixed_asset.as_ref().ok_or_else(|| {
                    PipelineError::prompt_map(format!(
                        "entry '{}' sets use_fixed but no fixed asset is available",
                        entry.id
                    ))
                })?;
                let bytes = fs::read(asset).map_err(|e| PipelineError::io(asset.clone(), e))?;
                write_compressed(config, &entry.id, &bytes)?;
                tracing::info!(asset = %asset.display(), path = %rel_path, "used fixed asset");
                report.fixed += 1;
            }
            Resolution::Generate => {
                let prompt = build_prompt(&entry.yaml, prompt_map.currency_mode_for(entry));
                tracing::debug!(id = %entry.id, prompt = %prompt, "requesting generation");
                let bytes = generator.generate(&prompt).await?;
                write_compressed(config, &entry.id, &bytes)?;
                tracing::info!(path = %rel_path, "generated image");
                report.generated += 1;
            }
        }

        if slot.is_some() {
            substitutions.push(Substitution { alt, src: rel_path });
        }
    }

    if config.dry_run {
        tracing::info!("dry run complete, nothing written");
        return Ok(report);
    }

    if !substitutions.is_empty() {
        let rewritten = rewrite_document(&html, &substitutions)?;
        fs::write(&config.html_path, rewritten)
            .map_err(|e| PipelineError::io(config.html_path.clone(), e))?;
        report.rewritten = substitutions.len();
        tracing::info!(
            count = report.rewritten,
            path = %config.html_path.display(),
            "draft updated"
        );
    } else {
        tracing::info!("no placeholders resolved, draft left untouched");
    }

    Ok(report)
}

fn classify(config: &JobConfig, entry: &PromptEntry) -> Resolution {
    if config.output_path(&entry.id).is_file() {
        Resolution::Reuse
    } else if config.raw_output_path(&entry.id).is_file() {
        Resolution::RecompressRaw
    } else if entry.use_fixed {
        Resolution::Fixed
    } else {
        Resolution::Generate
    }
}

fn write_compressed(config: &JobConfig, id: &str, bytes: &[u8]) -> Result<()> {
    let jpeg = compress_image(bytes, config.jpeg_quality, config.max_width)?;
    let out = config.output_path(id);
    fs::write(&out, jpeg)
        .map_err(|e| PipelineError::io(out.clone(), e))
        .with_context(|| format!("failed to persist image '{id}'"))?;
    Ok(())
}
