// SPDX-License-Identifier: Apache-2.0 OR MIT
//! The optional `.tpl.yaml` configuration file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

const FILE_NAMES: [&str; 2] = [".tpl.yaml", ".tpl.yml"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub tpl: TplSection,
    pub color: ColorSection,
}

/// Behaviour switches. Each one can only turn a behaviour on; a flag given on
/// the command line still applies when the file leaves it off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TplSection {
    pub env: bool,
    pub fold_context: bool,
    pub interactive: bool,
    pub overwrite: bool,
    pub show_processed_info: bool,
}

impl Default for TplSection {
    fn default() -> Self {
        TplSection {
            env: false,
            fold_context: true,
            interactive: false,
            overwrite: false,
            show_processed_info: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorSection {
    /// `true`/`always` force colour, `false`/`never` disable it, `auto` or
    /// unset follow the terminal.
    pub ui: Option<String>,
    pub exec: ExecColors,
    pub nav: NavColors,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecColors {
    pub file: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavColors {
    pub file: String,
    pub title: String,
    pub context: String,
    pub input: String,
}

impl ConfigFile {
    /// Loads `explicit` if given, otherwise the first configuration file
    /// found in the home directory or the working directory. No file at all
    /// yields the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match Self::discover(dirs::home_dir(), Path::new(".")) {
                Some(path) => path,
                None => return Ok(ConfigFile::default()),
            },
        };
        debug!(path = %path.display(), "loading configuration");
        let text = fs::read_to_string(&path).map_err(|err| {
            Error::config(format!("cannot read '{}': {err}", path.display()))
        })?;
        Self::from_yaml(&text)
            .map_err(|err| Error::config(format!("invalid config '{}': {err}", path.display())))
    }

    pub fn from_yaml(text: &str) -> std::result::Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(ConfigFile::default());
        }
        serde_yaml::from_str(text)
    }

    /// First existing candidate, home directory before `cwd`.
    pub fn discover(home: Option<PathBuf>, cwd: &Path) -> Option<PathBuf> {
        home.into_iter()
            .chain(std::iter::once(cwd.to_path_buf()))
            .flat_map(|dir| FILE_NAMES.iter().map(move |name| dir.join(name)))
            .find(|candidate| candidate.is_file())
    }
}
