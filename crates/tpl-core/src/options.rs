// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::path::PathBuf;

use tpl_engine::MissingKey;

use crate::config::TplSection;
use crate::data::InputFormat;
use crate::error::{Error, Result};
use crate::export::DataFormat;

/// Everything a [`Session`](crate::Session) needs to know about one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    pub templates: Vec<PathBuf>,
    /// Colon-separated glob patterns.
    pub data_files: String,
    pub default_format: InputFormat,
    pub env: bool,
    pub env_prefix: Option<String>,
    pub interactive: bool,
    pub fold_context: bool,
    pub missing_key: MissingKey,
    pub out: Option<PathBuf>,
    pub outdir: Option<PathBuf>,
    pub trim_prefix: Option<String>,
    pub overwrite: bool,
    pub show_processed: bool,
    pub export_file: Option<PathBuf>,
    pub export_format: Option<DataFormat>,
    pub only_missing: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            templates: Vec::new(),
            data_files: String::new(),
            default_format: InputFormat::Yaml,
            env: false,
            env_prefix: None,
            interactive: false,
            fold_context: true,
            missing_key: MissingKey::Error,
            out: None,
            outdir: None,
            trim_prefix: None,
            overwrite: false,
            show_processed: false,
            export_file: None,
            export_format: None,
            only_missing: false,
        }
    }
}

impl Options {
    /// Switches on what the configuration file enables. `fold-context: false`
    /// turns folding off.
    pub fn apply_config(&mut self, config: &TplSection) {
        self.env |= config.env;
        self.interactive |= config.interactive;
        self.overwrite |= config.overwrite;
        self.show_processed |= config.show_processed_info;
        self.fold_context &= config.fold_context;
    }

    pub fn uses_env(&self) -> bool {
        self.env || self.env_prefix.as_deref().is_some_and(|prefix| !prefix.is_empty())
    }
}

/// Parses a `--missingkey` value; an empty value selects `error`.
pub fn parse_missing_key(raw: &str) -> Result<MissingKey> {
    if raw.trim().is_empty() {
        return Ok(MissingKey::Error);
    }
    raw.parse()
        .map_err(|err: tpl_engine::UnknownPolicy| Error::config(err.to_string()))
}
