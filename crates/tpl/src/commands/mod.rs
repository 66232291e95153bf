// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::process::ExitCode;

use anyhow::{Context, Result};
use tpl_core::{ConfigFile, Error, InputFormat, Options, Palette};

use crate::cli::DataArgs;

pub mod completion;
pub mod ensure;
pub mod exec;
pub mod keys;

/// Settings shared by every command that renders templates.
pub struct Environment {
    pub config: ConfigFile,
    pub palette: Palette,
}

impl Environment {
    pub fn new(config: ConfigFile) -> Self {
        let palette = Palette::from_config(&config.color);
        palette.install();
        Environment { config, palette }
    }

    /// Options common to all commands, with configuration switches applied.
    pub fn options(&self, data: DataArgs) -> Options {
        let mut options = Options {
            templates: data.templates,
            data_files: data.datafile,
            default_format: InputFormat::or_yaml(&data.format),
            env: data.env,
            env_prefix: data.env_prefix,
            ..Options::default()
        };
        options.apply_config(&self.config.tpl);
        options
    }
}

/// Prints per-file failures and turns them into the exit status.
pub fn report_failures(failures: &[Error]) -> ExitCode {
    for failure in failures {
        eprintln!("tpl: {failure}");
    }
    if failures.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Process environment, skipping variables that are not valid UTF-8.
pub fn env_vars() -> impl Iterator<Item = (String, String)> {
    std::env::vars_os()
        .filter_map(|(name, value)| Some((name.into_string().ok()?, value.into_string().ok()?)))
}

pub fn load_config(path: Option<&std::path::Path>) -> Result<ConfigFile> {
    ConfigFile::load(path).context("failed to load configuration")
}
