// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::path::PathBuf;

use thiserror::Error;

/// Failures raised while assembling data and rendering templates.
///
/// [`Error::Render`] and [`Error::MissingKey`] only abort the file they occur
/// in; every other variant ends the run (see [`Error::is_fatal`]).
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("failed to load data file '{}': {message}", path.display())]
    DataSource { path: PathBuf, message: String },
    #[error("env prefix '{prefix}' is already used for a non-mapping data key")]
    EnvPrefixConflict { prefix: String },
    #[error("error parsing template '{name}': {source}")]
    TemplateParse {
        name: String,
        #[source]
        source: tpl_engine::Error,
    },
    #[error("failed to execute template '{name}': {source}")]
    Render {
        name: String,
        #[source]
        source: tpl_engine::Error,
    },
    #[error("interactive mode is disabled, but a missing key was found in '{name}': {key}")]
    MissingKey { name: String, key: String },
    #[error(
        "rendered output of '{name}' has {rendered} lines but the template has {source_lines}"
    )]
    LineCountMismatch {
        name: String,
        source_lines: usize,
        rendered: usize,
    },
    #[error("failed to encode {format} data: {message}")]
    Encode {
        format: &'static str,
        message: String,
    },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    pub fn data_source(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Error::DataSource {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether the failure ends the whole run rather than one template file.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Render { .. } | Error::MissingKey { .. })
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_file_failures_are_not_fatal() {
        let missing = Error::MissingKey {
            name: "a.tpl".into(),
            key: ".x".into(),
        };
        assert!(!missing.is_fatal());
        assert!(missing.to_string().contains("interactive mode is disabled"));

        let mismatch = Error::LineCountMismatch {
            name: "a.tpl".into(),
            source_lines: 3,
            rendered: 2,
        };
        assert!(mismatch.is_fatal());
        assert!(Error::config("bad").is_fatal());
    }
}
