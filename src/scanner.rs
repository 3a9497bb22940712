//! Placeholder scanner: slices a draft HTML document into top-level
//! (`<h2>`) sections and extracts the image placeholder inside each one.
//!
//! Scanning is a pure pass over the document text. The placeholder shape is
//! fixed by the drafting template: an `aligncenter size-full` image tag with
//! an empty `src` and a descriptive `alt`, emitted directly beneath the
//! section heading.

use crate::error::PipelineError;
use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

static H2_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<h2(?:\s[^>]*)?>").expect("h2 pattern"));

static H2_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h2(?:\s[^>]*)?>(.*?)</h2>").expect("h2 block pattern"));

static INNER_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag pattern"));

/// The exact placeholder prefix the drafting template emits. The `alt`
/// attribute must follow immediately; anything else is a template violation.
pub(crate) const PLACEHOLDER_PREFIX: &str = r#"<img class="aligncenter size-full" src="""#;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r#"{}(?: alt="([^"]*)")?"#,
        regex::escape(PLACEHOLDER_PREFIX)
    ))
    .expect("placeholder pattern")
});

/// An unresolved image slot found inside a section. `src` is empty until the
/// document is rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub alt: String,
    /// Byte range of the matched tag prefix within the document.
    pub tag_range: Range<usize>,
}

/// One top-level content block: everything from a `<h2>` opening tag to the
/// next one (or end of document).
#[derive(Debug, Clone)]
pub struct Section {
    /// Zero-based position in document order.
    pub ordinal: usize,
    /// Heading text with inner markup stripped.
    pub heading: String,
    /// Byte range of the section within the document.
    pub span: Range<usize>,
    pub placeholder: Option<Placeholder>,
}

/// Scan a draft document into ordered sections. Content before the first
/// `<h2>` belongs to no section and is ignored.
///
/// Fails with [`PipelineError::Parse`] when a section carries more than one
/// placeholder, or a placeholder tag is missing its `alt` attribute.
pub fn scan_document(html: &str) -> Result<Vec<Section>, PipelineError> {
    let starts: Vec<usize> = H2_OPEN.find_iter(html).map(|m| m.start()).collect();

    let mut sections = Vec::with_capacity(starts.len());
    for (ordinal, &start) in starts.iter().enumerate() {
        let end = starts.get(ordinal + 1).copied().unwrap_or(html.len());
        let span = start..end;
        let body = &html[span.clone()];

        let heading = H2_BLOCK
            .captures(body)
            .map(|caps| INNER_TAG.replace_all(&caps[1], "").trim().to_string())
            .unwrap_or_default();

        let placeholder = extract_placeholder(body, start, &heading)?;

        sections.push(Section {
            ordinal,
            heading,
            span,
            placeholder,
        });
    }

    Ok(sections)
}

fn extract_placeholder(
    body: &str,
    offset: usize,
    heading: &str,
) -> Result<Option<Placeholder>, PipelineError> {
    let mut found: Option<Placeholder> = None;

    for caps in PLACEHOLDER.captures_iter(body) {
        let whole = caps.get(0).expect("match");
        let alt = match caps.get(1) {
            Some(alt) => alt.as_str().to_string(),
            None => {
                return Err(PipelineError::Parse {
                    section: heading.to_string(),
                    detail: "placeholder image tag is missing its alt attribute".to_string(),
                });
            }
        };

        if found.is_some() {
            return Err(PipelineError::Parse {
                section: heading.to_string(),
                detail: "section contains more than one image placeholder".to_string(),
            });
        }

        found = Some(Placeholder {
            alt,
            tag_range: offset + whole.start()..offset + whole.end(),
        });
    }

    Ok(found)
}
