//! HTML rewriter: fills each placeholder's empty `src` with the resolved
//! image path. Substitution is keyed by alt text and touches nothing else in
//! the document.

use crate::error::PipelineError;
use crate::scanner::PLACEHOLDER_PREFIX;
use regex::{NoExpand, Regex};

/// A resolved substitution: which placeholder (by alt) gets which path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub alt: String,
    pub src: String,
}

/// Apply all substitutions to the document, first occurrence only per alt.
///
/// Every byte outside the matched placeholder attributes is preserved. A
/// placeholder whose `src` is already filled no longer matches, so rerunning
/// with the same pairs is a no-op.
pub fn rewrite_document(html: &str, subs: &[Substitution]) -> Result<String, PipelineError> {
    let mut out = html.to_string();
    for sub in subs {
        let pattern = format!(
            r#"{} alt="{}""#,
            regex::escape(PLACEHOLDER_PREFIX),
            regex::escape(&sub.alt)
        );
        let re = Regex::new(&pattern).map_err(|e| PipelineError::Parse {
            section: sub.alt.clone(),
            detail: format!("invalid placeholder pattern: {e}"),
        })?;
        let replacement = format!(
            r#"<img class="aligncenter size-full" src="{}" alt="{}""#,
            sub.src, sub.alt
        );
        out = re.replacen(&out, 1, NoExpand(&replacement)).into_owned();
    }
    Ok(out)
}
