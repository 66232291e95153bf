// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Textual extraction of `{{ .path }}` references.
//!
//! Only actions that consist of a single field path are recognised. Anything
//! computed (pipelines, function calls, variables) is left alone.

use indexmap::IndexSet;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::flat::FlatKey;

static REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\{\{-?\s*(\.[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*|\[[0-9]+\])*)\s*-?\}\}",
    )
    .expect("reference pattern is valid")
});

/// Returns every field reference in `text`, in order of first appearance.
pub fn scan_references(text: &str) -> IndexSet<FlatKey> {
    REFERENCE
        .captures_iter(text)
        .filter_map(|captures| captures.get(1))
        .map(|path| FlatKey::new(path.as_str()))
        .collect()
}
