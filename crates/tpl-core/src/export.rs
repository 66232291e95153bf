// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Serialising a flat data map for `keys` and `--export-data`.

use std::fmt::Write as _;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::flat::{expand, FlatMap};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DataFormat {
    #[default]
    Yaml,
    Json,
    Kv,
}

impl DataFormat {
    /// Chooses `explicit` if given, else the extension of `path`, else YAML.
    pub fn resolve(explicit: Option<DataFormat>, path: Option<&Path>) -> Self {
        explicit
            .or_else(|| {
                path.and_then(|path| path.extension())
                    .and_then(|ext| ext.to_str())
                    .and_then(|ext| ext.parse().ok())
            })
            .unwrap_or_default()
    }
}

impl FromStr for DataFormat {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(DataFormat::Yaml),
            "json" => Ok(DataFormat::Json),
            "kv" => Ok(DataFormat::Kv),
            other => Err(Error::config(format!("unknown output format \"{other}\""))),
        }
    }
}

/// Formats `flat`. An empty map produces empty output in every format.
pub fn format_data(flat: &FlatMap, format: DataFormat) -> Result<String> {
    if flat.is_empty() {
        return Ok(String::new());
    }
    match format {
        DataFormat::Kv => {
            let mut out = String::new();
            for (key, value) in flat {
                let _ = writeln!(out, "{}={value}", key.trimmed());
            }
            Ok(out)
        }
        DataFormat::Json => {
            let json = serde_json::to_string_pretty(&expand(flat))
                .map_err(|err| Error::Encode {
                    format: "json",
                    message: err.to_string(),
                })?;
            Ok(format!("{json}\n"))
        }
        DataFormat::Yaml => {
            let yaml = serde_yaml::to_string(&expand(flat))
                .map_err(|err| Error::Encode {
                    format: "yaml",
                    message: err.to_string(),
                })?;
            Ok(format!("---\n\n{yaml}"))
        }
    }
}
