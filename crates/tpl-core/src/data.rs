// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Loading and merging data files.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use indexmap::IndexSet;
use ini::Ini;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::flat::{expand, FlatKey, FlatMap, FlatValue};
use crate::value::NestedValue;

/// Format of a data file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InputFormat {
    #[default]
    Yaml,
    Json,
    Ini,
    Kv,
}

impl InputFormat {
    pub fn from_extension(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
    }

    /// The format used for files whose extension says nothing. Anything
    /// unrecognised falls back to YAML.
    pub fn or_yaml(raw: &str) -> Self {
        raw.parse().unwrap_or_default()
    }
}

impl FromStr for InputFormat {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(InputFormat::Yaml),
            "json" => Ok(InputFormat::Json),
            "ini" => Ok(InputFormat::Ini),
            "kv" => Ok(InputFormat::Kv),
            other => Err(Error::config(format!("unknown data format \"{other}\""))),
        }
    }
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InputFormat::Yaml => "yaml",
            InputFormat::Json => "json",
            InputFormat::Ini => "ini",
            InputFormat::Kv => "kv",
        })
    }
}

/// Expands a colon-separated list of glob patterns into file paths, keeping
/// the first occurrence of each.
pub fn expand_data_files(list: &str) -> Result<Vec<PathBuf>> {
    let mut files = IndexSet::new();
    for pattern in list.split(':').filter(|pattern| !pattern.is_empty()) {
        let paths = glob::glob(pattern)
            .map_err(|err| Error::data_source(pattern, format!("bad glob pattern: {err}")))?;
        for entry in paths {
            let path = entry.map_err(|err| Error::data_source(err.path(), err.error()))?;
            files.insert(path);
        }
    }
    Ok(files.into_iter().collect())
}

/// Loads every file matched by `list` and deep-merges them in order.
pub fn load_data(list: &str, default_format: InputFormat) -> Result<NestedValue> {
    let mut data = NestedValue::default();
    for path in expand_data_files(list)? {
        data.merge(load_file(&path, default_format)?);
    }
    Ok(data)
}

pub fn load_file(path: &Path, default_format: InputFormat) -> Result<NestedValue> {
    let format = InputFormat::from_extension(path).unwrap_or(default_format);
    let text = fs::read_to_string(path).map_err(|err| Error::data_source(path, err))?;
    debug!(path = %path.display(), %format, "loading data file");
    parse_data(&text, format).map_err(|message| Error::data_source(path, message))
}

/// Parses the text of one data file. The top level must be a mapping.
pub fn parse_data(text: &str, format: InputFormat) -> std::result::Result<NestedValue, String> {
    let value = match format {
        InputFormat::Yaml if text.trim().is_empty() => NestedValue::default(),
        InputFormat::Yaml => serde_yaml::from_str(text).map_err(|err| err.to_string())?,
        InputFormat::Json => serde_json::from_str(text).map_err(|err| err.to_string())?,
        InputFormat::Ini => parse_ini(text)?,
        InputFormat::Kv => parse_kv(text),
    };
    match value {
        NestedValue::Mapping(_) => Ok(value),
        _ => Err(format!("{format} data must be a mapping at the top level")),
    }
}

fn parse_ini(text: &str) -> std::result::Result<NestedValue, String> {
    let ini = Ini::load_from_str(text).map_err(|err| err.to_string())?;
    let mut data = NestedValue::default();
    for (section, properties) in ini.iter() {
        let entries: NestedValue = NestedValue::Mapping(
            properties
                .iter()
                .map(|(key, value)| (key.to_string(), NestedValue::string(value)))
                .collect(),
        );
        match section {
            Some(name) => {
                let mut wrapped = NestedValue::default();
                if let Some(map) = wrapped.as_mapping_mut() {
                    map.insert(name.to_string(), entries);
                }
                data.merge(wrapped);
            }
            None => data.merge(entries),
        }
    }
    Ok(data)
}

fn parse_kv(text: &str) -> NestedValue {
    let mut flat = FlatMap::new();
    for (number, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match line.split_once('=') {
            Some((key, value)) => {
                flat.insert(
                    FlatKey::new(key.trim()),
                    FlatValue::string(value.trim()),
                );
            }
            None => warn!(line = number + 1, "skipping kv line without '='"),
        }
    }
    expand(&flat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn nested(value: serde_json::Value) -> NestedValue {
        NestedValue::from(value)
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(
            InputFormat::from_extension(Path::new("a/b.yml")),
            Some(InputFormat::Yaml)
        );
        assert_eq!(
            InputFormat::from_extension(Path::new("vars.kv")),
            Some(InputFormat::Kv)
        );
        assert_eq!(InputFormat::from_extension(Path::new("vars")), None);
        assert_eq!(InputFormat::or_yaml("toml"), InputFormat::Yaml);
        assert_eq!(InputFormat::or_yaml("json"), InputFormat::Json);
    }

    #[test]
    fn parses_kv_lines_into_nested_data() {
        let value = parse_data("a.b = 1\nbroken\n\n.c=x=y\n", InputFormat::Kv).unwrap();
        assert_eq!(value, nested(json!({"a": {"b": "1"}, "c": "x=y"})));
    }

    #[test]
    fn parses_ini_sections() {
        let value = parse_data("top=1\n[db]\nhost = localhost\n", InputFormat::Ini).unwrap();
        assert_eq!(
            value,
            nested(json!({"top": "1", "db": {"host": "localhost"}}))
        );
    }

    #[test]
    fn rejects_non_mapping_documents() {
        assert!(parse_data("- a\n- b\n", InputFormat::Yaml).is_err());
        assert!(parse_data("{", InputFormat::Json).is_err());
    }

    #[test]
    fn empty_yaml_is_empty_mapping() {
        assert_eq!(parse_data("", InputFormat::Yaml).unwrap(), NestedValue::default());
    }

    #[test]
    fn loads_globs_in_order_and_later_files_win() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("1.yaml"), "a: {b: 1, c: 1}\n").unwrap();
        fs::write(dir.path().join("2.json"), r#"{"a": {"c": 2}}"#).unwrap();
        fs::write(dir.path().join("extra"), "d: 4\n").unwrap();

        let list = format!(
            "{}:{}:{}",
            dir.path().join("*.yaml").display(),
            dir.path().join("*.json").display(),
            dir.path().join("extra").display(),
        );
        let files = expand_data_files(&list).unwrap();
        assert_eq!(files.len(), 3);

        let data = load_data(&list, InputFormat::Yaml).unwrap();
        assert_eq!(data, nested(json!({"a": {"b": 1, "c": 2}, "d": 4})));
    }

    #[test]
    fn unreadable_file_is_data_source_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_file(&dir.path().join("gone.yaml"), InputFormat::Yaml).unwrap_err();
        assert!(matches!(err, Error::DataSource { .. }));
    }
}
