#![forbid(unsafe_code)]
// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Data assembly, missing-key detection and interactive completion for
//! `tpl`.
//!
//! Data files and environment variables are merged into a [`NestedValue`].
//! Templates that reference keys the data lacks are found with a strict and
//! a permissive render ([`detect`]), and in interactive runs the user is
//! asked for the missing values ([`Completion`]) before the final render.
//!
//! ```
//! use tpl_core::{expand, flatten, FlatKey, NestedValue};
//!
//! let value: NestedValue = serde_json::from_str(r#"{"db": {"hosts": [{"name": "a"}]}}"#)?;
//! let flat = flatten(&value, &FlatKey::root());
//! assert!(flat.contains_key(&FlatKey::new(".db.hosts[0].name")));
//! assert_eq!(expand(&flat), value);
//! # Ok::<(), serde_json::Error>(())
//! ```

pub mod complete;
pub mod config;
pub mod context;
pub mod data;
pub mod detect;
pub mod env;
mod error;
pub mod export;
pub mod flat;
pub mod options;
pub mod output;
pub mod palette;
pub mod prompt;
pub mod scan;
mod session;
mod value;

pub use complete::{Completion, ResolutionState};
pub use config::ConfigFile;
pub use context::fold_context;
pub use data::InputFormat;
pub use detect::{detect, Detection, LineRecord};
pub use error::{Error, Result};
pub use export::{format_data, DataFormat};
pub use flat::{assign, expand, expand_prefixed, flatten, FlatKey, FlatMap, FlatValue, Segment};
pub use options::{parse_missing_key, Options};
pub use output::{RenderedFile, WriteOutcome};
pub use palette::{ColorMode, Palette, Role};
pub use prompt::{Prompt, Terminal};
pub use scan::scan_references;
pub use session::{Execution, Session};
pub use tpl_engine::MissingKey;
pub use value::{NestedValue, Scalar};
