// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Filling template keys from environment variables.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::error::{Error, Result};
use crate::value::NestedValue;

/// Adds environment variables the templates refer to and the data lacks.
///
/// `keys` holds referenced keys without their leading dot. Without a prefix a
/// variable `NAME` is used for the top-level key `NAME`; with prefix `P` it
/// is used for `P.NAME` and stored under the mapping `P`. Existing data is
/// never replaced.
pub fn merge_env<I>(
    data: &mut NestedValue,
    keys: &HashSet<String>,
    prefix: Option<&str>,
    vars: I,
) -> Result<()>
where
    I: IntoIterator<Item = (String, String)>,
{
    let prefix = prefix.filter(|prefix| !prefix.is_empty());
    for (name, value) in vars {
        let wanted = match prefix {
            Some(prefix) => format!("{prefix}.{name}"),
            None => name.clone(),
        };
        if !keys.contains(&wanted) {
            continue;
        }

        let Some(root) = data.as_mapping_mut() else {
            return Err(Error::config("data must be a mapping to merge environment"));
        };
        let target = match prefix {
            Some(prefix) => {
                let slot = root
                    .entry(prefix.to_string())
                    .or_insert_with(|| NestedValue::Mapping(BTreeMap::new()));
                slot.as_mapping_mut().ok_or_else(|| Error::EnvPrefixConflict {
                    prefix: prefix.to_string(),
                })?
            }
            None => root,
        };
        if !target.contains_key(&name) {
            debug!(key = %wanted, "taking value from environment");
            target.insert(name, NestedValue::string(value));
        }
    }
    Ok(())
}
