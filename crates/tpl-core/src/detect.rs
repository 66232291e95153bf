// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Locating the template lines that reference data the run does not have.
//!
//! The engine cannot list absent keys without rendering, so detection renders
//! twice: strictly first, and on a missing-key failure once more with the
//! `<no value>` sentinel. Lines whose permissive output carries the sentinel
//! are the ones that need input.

use serde_json::Value;
use tpl_engine::{MissingKey, Template, NO_VALUE};
use tracing::debug;

use crate::error::{Error, Result};

/// One physical line of template source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRecord {
    pub text: String,
    /// Leading spaces and tabs.
    pub indent: usize,
    pub unresolved: bool,
}

impl LineRecord {
    pub fn new(text: &str, unresolved: bool) -> Self {
        LineRecord {
            text: text.to_string(),
            indent: indent_width(text),
            unresolved,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

pub fn indent_width(text: &str) -> usize {
    text.chars().take_while(|ch| matches!(ch, ' ' | '\t')).count()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// The strict render succeeded; carries its output.
    Satisfied(String),
    /// Every source line, with the ones needing input flagged.
    Unresolved(Vec<LineRecord>),
}

/// Renders `template` strictly and, if a key is missing, flags the lines
/// responsible.
pub fn detect(template: &Template, data: &Value) -> Result<Detection> {
    match template.render_with(data, MissingKey::Error) {
        Ok(content) => return Ok(Detection::Satisfied(content)),
        Err(err) if err.is_missing_key() => {
            debug!(
                template = template.name(),
                key = err.missing_key_path().unwrap_or_default(),
                "strict render hit a missing key"
            );
        }
        Err(source) => {
            return Err(Error::Render {
                name: template.name().to_string(),
                source,
            })
        }
    }

    let permissive = template
        .render_with(data, MissingKey::Default)
        .map_err(|source| Error::Render {
            name: template.name().to_string(),
            source,
        })?;

    let source_lines: Vec<&str> = template.source().lines().collect();
    let rendered_lines: Vec<&str> = permissive.lines().collect();
    if source_lines.len() != rendered_lines.len() {
        return Err(Error::LineCountMismatch {
            name: template.name().to_string(),
            source_lines: source_lines.len(),
            rendered: rendered_lines.len(),
        });
    }

    let lines = source_lines
        .iter()
        .zip(&rendered_lines)
        .map(|(source, rendered)| LineRecord::new(source, rendered.contains(NO_VALUE)))
        .collect();
    Ok(Detection::Unresolved(lines))
}
