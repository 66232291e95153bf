// SPDX-License-Identifier: Apache-2.0 OR MIT
//! One run of `tpl`: data loaded once, templates handled in order.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use indexmap::IndexSet;
use tpl_engine::{text_template_functions, MissingKey, Template};
use tracing::{debug, warn};

use crate::complete::Completion;
use crate::data::load_data;
use crate::env::merge_env;
use crate::error::{Error, Result};
use crate::export::{format_data, DataFormat};
use crate::flat::{flatten, FlatKey, FlatMap, FlatValue};
use crate::options::Options;
use crate::output::{self, check_output_flags, print_files, write_file, RenderedFile, WriteOutcome};
use crate::palette::{Palette, Role};
use crate::prompt::Prompt;
use crate::scan::scan_references;
use crate::value::NestedValue;

#[derive(Debug)]
struct LoadedTemplate {
    origin: PathBuf,
    template: Template,
}

/// Result of [`Session::execute`].
#[derive(Debug, Default)]
pub struct Execution {
    /// Successfully rendered files, in input order.
    pub files: Vec<RenderedFile>,
    /// Files that failed to render; the run continued past them.
    pub failures: Vec<Error>,
    /// The loaded data plus every interactive answer.
    pub answers: FlatMap,
}

#[derive(Debug)]
pub struct Session {
    options: Options,
    data: NestedValue,
    templates: Vec<LoadedTemplate>,
}

impl Session {
    /// Validates the options, parses every template and assembles the data
    /// from data files and, when enabled, `env_vars`.
    pub fn open<I>(options: Options, env_vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        check_output_flags(
            options.templates.len(),
            options.out.as_deref(),
            options.outdir.as_deref(),
        )?;

        let functions = text_template_functions();
        let templates = options
            .templates
            .iter()
            .map(|origin| {
                let source = fs::read_to_string(origin).map_err(|err| {
                    Error::io(format!("failed to read template '{}'", origin.display()), err)
                })?;
                let name = origin.display().to_string();
                let template = Template::parse_with_functions(&name, &source, functions.clone())
                    .map_err(|source| Error::TemplateParse { name, source })?;
                Ok(LoadedTemplate {
                    origin: origin.clone(),
                    template: template.with_missing_key(options.missing_key),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut data = load_data(&options.data_files, options.default_format)?;
        let mut session = Session {
            options,
            data: NestedValue::default(),
            templates,
        };
        if session.options.uses_env() {
            let keys: HashSet<String> = session
                .references()
                .iter()
                .map(|key| key.trimmed().to_string())
                .collect();
            merge_env(&mut data, &keys, session.options.env_prefix.as_deref(), env_vars)?;
        }
        session.data = data;
        Ok(session)
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn data(&self) -> &NestedValue {
        &self.data
    }

    /// Every field reference in the templates, in order of appearance.
    pub fn references(&self) -> IndexSet<FlatKey> {
        self.templates
            .iter()
            .flat_map(|loaded| scan_references(loaded.template.source()))
            .collect()
    }

    /// Renders each template strictly and returns the per-file failures.
    /// An empty list means no template is missing a key.
    pub fn ensure(&self) -> Vec<Error> {
        let data = self.data.to_json();
        self.templates
            .iter()
            .filter_map(|loaded| {
                let template = &loaded.template;
                template
                    .render_with(&data, MissingKey::Error)
                    .err()
                    .map(|source| render_failure(template.name(), source))
            })
            .collect()
    }

    /// Renders every template, asking `prompt` for missing keys when the run
    /// is interactive.
    pub fn execute(&self, prompt: &mut dyn Prompt, palette: &Palette) -> Result<Execution> {
        let mut execution = Execution {
            answers: flatten(&self.data, &FlatKey::root()),
            ..Execution::default()
        };
        let data = self.data.to_json();
        let mut working = self.data.clone();

        for loaded in &self.templates {
            let template = &loaded.template;
            let rendered = if self.options.interactive {
                Completion::new(
                    &mut working,
                    &mut execution.answers,
                    &mut *prompt,
                    palette,
                    self.options.fold_context,
                    self.options.missing_key,
                )
                .run(template)
            } else {
                template
                    .render(&data)
                    .map_err(|source| render_failure(template.name(), source))
            };

            match rendered {
                Ok(content) => execution
                    .files
                    .push(RenderedFile::new(&loaded.origin, content)),
                Err(err) if !err.is_fatal() => {
                    warn!(template = template.name(), error = %err, "template skipped");
                    execution.failures.push(err);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(execution)
    }

    /// Collects every referenced key with the value the data has for it.
    /// Keys the data does not know stay [`FlatValue::Unresolved`]; with
    /// `only_missing` set, only those are returned.
    pub fn extract_keys(&self) -> Result<FlatMap> {
        let data = self.data.to_json();
        for loaded in &self.templates {
            let template = &loaded.template;
            template
                .render_with(&data, MissingKey::Default)
                .map_err(|source| Error::Render {
                    name: template.name().to_string(),
                    source,
                })?;
        }

        let given = flatten(&self.data, &FlatKey::root());
        let mut keys = FlatMap::new();
        for reference in self.references() {
            let known: Vec<_> = given
                .entries_under(&reference)
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            if known.is_empty() {
                keys.insert(reference, FlatValue::Unresolved);
            } else if !self.options.only_missing {
                for (key, value) in known {
                    keys.insert(key, value);
                }
            }
        }
        Ok(keys)
    }

    /// Formats `flat` with the export format, chosen explicitly or from the
    /// export file's extension.
    pub fn export_data(&self, flat: &FlatMap) -> Result<String> {
        let format = DataFormat::resolve(self.options.export_format, self.options.export_file.as_deref());
        format_data(flat, format)
    }

    /// Writes exported data to the export file, or to `out` when there is none.
    pub fn store_data(
        &self,
        text: &str,
        out: &mut dyn Write,
        prompt: &mut dyn Prompt,
    ) -> Result<Option<WriteOutcome>> {
        match &self.options.export_file {
            Some(path) => write_file(path, text, self.options.overwrite, prompt).map(Some),
            None => {
                out.write_all(text.as_bytes())
                    .map_err(|err| Error::io("failed to write to stdout", err))?;
                Ok(None)
            }
        }
    }

    pub fn fill_destinations(&self, files: &mut [RenderedFile]) {
        output::fill_destinations(
            files,
            self.options.out.as_deref(),
            self.options.outdir.as_deref(),
            self.options.trim_prefix.as_deref(),
        );
    }

    /// Prints files without a destination and writes the others. Files whose
    /// overwrite is declined are reported as skipped and left untouched.
    pub fn write_rendered(
        &self,
        files: &mut [RenderedFile],
        out: &mut dyn Write,
        prompt: &mut dyn Prompt,
        palette: &Palette,
    ) -> Result<Vec<(PathBuf, WriteOutcome)>> {
        if files.iter().all(|file| file.destination.is_none()) {
            print_files(out, files, self.options.show_processed, palette)?;
            return Ok(Vec::new());
        }

        let mut outcomes = Vec::with_capacity(files.len());
        for file in files.iter_mut() {
            let Some(destination) = file.destination.clone() else {
                continue;
            };
            let outcome = write_file(&destination, &file.content, self.options.overwrite, prompt)?;
            file.changed = outcome == WriteOutcome::Written;
            if outcome != WriteOutcome::Skipped && self.options.show_processed {
                let note = stored_note(&file.origin, &destination);
                writeln!(out, "{}", palette.paint(Role::ExecInfo, &note))
                    .map_err(|err| Error::io("failed to write to stdout", err))?;
            }
            debug!(origin = %file.origin.display(), ?outcome, "template output handled");
            outcomes.push((destination, outcome));
        }
        Ok(outcomes)
    }
}

fn stored_note(origin: &Path, destination: &Path) -> String {
    format!(
        "'{}' is processed and stored in '{}'",
        origin.display(),
        destination.display()
    )
}

fn render_failure(name: &str, source: tpl_engine::Error) -> Error {
    match source.missing_key_path() {
        Some(key) => Error::MissingKey {
            name: name.to_string(),
            key: key.to_string(),
        },
        None => Error::Render {
            name: name.to_string(),
            source,
        },
    }
}
