// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Where rendered templates go, and getting them there.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::palette::{Palette, Role};
use crate::prompt::Prompt;

const TEMPLATE_SUFFIXES: [&str; 2] = [".tpl", ".tmpl"];

/// The output of one template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    pub name: String,
    pub origin: PathBuf,
    /// `None` prints to stdout.
    pub destination: Option<PathBuf>,
    pub content: String,
    /// Set once the content has been written over a missing or different file.
    pub changed: bool,
}

impl RenderedFile {
    pub fn new(origin: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        let origin = origin.into();
        let name = origin
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        RenderedFile {
            name,
            origin,
            destination: None,
            content: content.into(),
            changed: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// The destination already held exactly this content.
    Unchanged,
    /// The destination exists and overwriting was declined.
    Skipped,
}

/// Rejects `out` together with several templates unless `outdir` is set.
pub fn check_output_flags(templates: usize, out: Option<&Path>, outdir: Option<&Path>) -> Result<()> {
    if templates > 1 && out.is_some() && outdir.is_none() {
        return Err(Error::config(
            "multiple template files given with 'out' but without 'outdir'",
        ));
    }
    Ok(())
}

/// Computes each file's destination from the output flags.
///
/// With `outdir` the destination mirrors the template path (minus
/// `trim_prefix` and a `.tpl`/`.tmpl` suffix) below it, unless a single file
/// is rendered and `out` names it. With only `out`, that path is used.
pub fn fill_destinations(
    files: &mut [RenderedFile],
    out: Option<&Path>,
    outdir: Option<&Path>,
    trim_prefix: Option<&str>,
) {
    if out.is_none() && outdir.is_none() {
        return;
    }
    let single = files.len() == 1;
    for file in files.iter_mut() {
        let destination = match (outdir, out) {
            (Some(dir), Some(out)) if single => dir.join(out),
            (Some(dir), _) => dir.join(relative_destination(&file.origin, trim_prefix)),
            (None, Some(out)) => out.to_path_buf(),
            (None, None) => continue,
        };
        debug!(origin = %file.origin.display(), destination = %destination.display(), "destination chosen");
        file.destination = Some(destination);
    }
}

fn relative_destination(origin: &Path, trim_prefix: Option<&str>) -> PathBuf {
    let origin = origin.to_string_lossy();
    let mut relative = origin.as_ref();
    if let Some(prefix) = trim_prefix.filter(|prefix| !prefix.is_empty()) {
        relative = relative.strip_prefix(prefix).unwrap_or(relative);
    }
    for suffix in TEMPLATE_SUFFIXES {
        if let Some(stripped) = relative.strip_suffix(suffix) {
            relative = stripped;
            break;
        }
    }
    PathBuf::from(relative.trim_start_matches('/'))
}

/// Writes `content` to `dst`, creating parent directories. An existing file
/// is only replaced when `overwrite` is set or the prompt answers yes.
pub fn write_file(
    dst: &Path,
    content: &str,
    overwrite: bool,
    prompt: &mut dyn Prompt,
) -> Result<WriteOutcome> {
    if dst.exists() {
        let current = fs::read(dst)
            .map_err(|err| Error::io(format!("failed to read '{}'", dst.display()), err))?;
        if current == content.as_bytes() {
            return Ok(WriteOutcome::Unchanged);
        }
        if !overwrite {
            let answer = prompt.ask(&format!("tpl: overwrite '{}'? ", dst.display()))?;
            if !answer.trim().to_ascii_lowercase().starts_with('y') {
                debug!(path = %dst.display(), "overwrite declined");
                return Ok(WriteOutcome::Skipped);
            }
        }
    }

    if let Some(parent) = dst.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| {
            Error::io(format!("failed to create '{}'", parent.display()), err)
        })?;
    }
    fs::write(dst, content)
        .map_err(|err| Error::io(format!("failed to write '{}'", dst.display()), err))?;
    info!(path = %dst.display(), "written");
    Ok(WriteOutcome::Written)
}

/// Prints files without a destination, separated by blank lines.
pub fn print_files<W: Write + ?Sized>(
    out: &mut W,
    files: &[RenderedFile],
    show_processed: bool,
    palette: &Palette,
) -> Result<()> {
    let to_io = |err| Error::io("failed to write to stdout", err);
    for (position, file) in files.iter().enumerate() {
        if position > 0 {
            writeln!(out).map_err(to_io)?;
        }
        if show_processed {
            let note = format!("'{}' is processed", file.origin.display());
            writeln!(out, "{}", palette.paint(Role::ExecInfo, &note)).map_err(to_io)?;
        }
        write!(out, "{}", file.content).map_err(to_io)?;
    }
    out.flush().map_err(to_io)
}
