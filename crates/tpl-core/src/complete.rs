// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Interactive completion of missing template keys.
//!
//! Each template goes through [`ResolutionState`]: a strict render either
//! succeeds outright or yields the lines that need input. The user is asked
//! for every reference on those lines that the answer map does not address
//! yet, and the template is rendered again against the completed data.
//!
//! The driver borrows the working data and the answer map for one template
//! at a time, so values given for one file carry over to the next. Answers
//! are written into the working data at their own path; the rest of the
//! data is rendered exactly as loaded.

use tpl_engine::{MissingKey, Template};
use tracing::debug;

use crate::context::fold_context;
use crate::detect::{detect, Detection, LineRecord};
use crate::error::{Error, Result};
use crate::flat::{assign, FlatMap, FlatValue};
use crate::palette::{Palette, Role};
use crate::prompt::Prompt;
use crate::scan::scan_references;
use crate::value::NestedValue;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionState {
    Rendering,
    Satisfied(String),
    NeedsInput(Vec<LineRecord>),
    Resolved(String),
}

pub struct Completion<'a, P: Prompt + ?Sized> {
    data: &'a mut NestedValue,
    /// Flat form of `data`, used to tell which references still need input.
    answers: &'a mut FlatMap,
    prompt: &'a mut P,
    palette: &'a Palette,
    fold_context: bool,
    missing_key: MissingKey,
}

impl<'a, P: Prompt + ?Sized> Completion<'a, P> {
    pub fn new(
        data: &'a mut NestedValue,
        answers: &'a mut FlatMap,
        prompt: &'a mut P,
        palette: &'a Palette,
        fold_context: bool,
        missing_key: MissingKey,
    ) -> Self {
        Completion {
            data,
            answers,
            prompt,
            palette,
            fold_context,
            missing_key,
        }
    }

    /// Drives `template` to [`ResolutionState::Resolved`] and returns the
    /// rendered content.
    pub fn run(&mut self, template: &Template) -> Result<String> {
        let mut state = ResolutionState::Rendering;
        loop {
            state = match state {
                ResolutionState::Resolved(content) => return Ok(content),
                other => self.advance(template, other)?,
            };
        }
    }

    /// Performs a single transition.
    pub fn advance(&mut self, template: &Template, state: ResolutionState) -> Result<ResolutionState> {
        match state {
            ResolutionState::Rendering => {
                Ok(match detect(template, &self.data.to_json())? {
                    Detection::Satisfied(content) => ResolutionState::Satisfied(content),
                    Detection::Unresolved(lines) => ResolutionState::NeedsInput(lines),
                })
            }
            ResolutionState::Satisfied(content) => Ok(ResolutionState::Resolved(content)),
            ResolutionState::NeedsInput(lines) => {
                self.ask_for_lines(template.name(), &lines)?;
                let content = template
                    .render_with(&self.data.to_json(), self.missing_key)
                    .map_err(|source| Error::Render {
                        name: template.name().to_string(),
                        source,
                    })?;
                Ok(ResolutionState::Resolved(content))
            }
            resolved @ ResolutionState::Resolved(_) => Ok(resolved),
        }
    }

    fn ask_for_lines(&mut self, name: &str, lines: &[LineRecord]) -> Result<()> {
        let header = format!("[{name}]");
        self.prompt.show(&self.palette.paint(Role::NavFile, &header))?;

        for (index, line) in lines.iter().enumerate() {
            if !line.unresolved {
                continue;
            }
            let pending: Vec<_> = scan_references(&line.text)
                .into_iter()
                .filter(|reference| !self.answers.is_addressed(reference))
                .collect();
            if pending.is_empty() {
                debug!(line = index + 1, "references already answered");
                continue;
            }

            if self.fold_context {
                self.prompt
                    .show(&self.palette.paint(Role::NavTitle, "missing key found"))?;
                for context in fold_context(lines, index) {
                    self.prompt
                        .show(&self.palette.paint(Role::NavContext, &lines[context].text))?;
                }
            }
            self.prompt
                .show(&self.palette.paint(Role::NavContext, &line.text))?;
            for reference in pending {
                let question = format!("value for '{reference}': ");
                let answer = self
                    .prompt
                    .ask(&self.palette.paint(Role::NavInput, &question))?;
                assign(self.data, &reference, NestedValue::string(answer.as_str()));
                self.answers.insert(reference, FlatValue::string(answer));
            }
            if self.fold_context {
                self.prompt.show("")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flat::{flatten, FlatKey};
    use crate::prompt::Terminal;
    use serde_json::json;
    use std::io::Cursor;
    use tpl_engine::text_template_functions;

    fn template(name: &str, source: &str) -> Template {
        Template::parse_with_functions(name, source, text_template_functions()).unwrap()
    }

    /// Working data plus its flat form, as a session seeds them.
    struct Store {
        data: NestedValue,
        answers: FlatMap,
    }

    impl Store {
        fn new(value: serde_json::Value) -> Self {
            let data = NestedValue::from(value);
            let answers = flatten(&data, &FlatKey::root());
            Store { data, answers }
        }

        fn run(&mut self, input: &str, fold: bool, tmpl: &Template) -> Result<(String, String)> {
            let palette = Palette::plain();
            let mut term = Terminal::new(Cursor::new(input.to_string()), Vec::new());
            let content = Completion::new(
                &mut self.data,
                &mut self.answers,
                &mut term,
                &palette,
                fold,
                MissingKey::Error,
            )
            .run(tmpl)?;
            let (_, shown) = term.into_parts();
            Ok((content, String::from_utf8(shown).unwrap()))
        }
    }

    #[test]
    fn satisfied_templates_do_not_prompt() {
        let mut store = Store::new(json!({"a": 1}));
        let (content, shown) = store.run("", true, &template("t", "a={{ .a }}\n")).unwrap();
        assert_eq!(content, "a=1\n");
        assert_eq!(shown, "");
    }

    #[test]
    fn prompts_with_context_and_records_answers() {
        let tmpl = template("app.yaml", "db:\n  host: {{ .db.host }}\n  port: {{ .db.port }}\n");
        let mut store = Store::new(json!({"db": {"port": 5432}}));
        let (content, shown) = store.run("localhost\n", true, &tmpl).unwrap();
        assert_eq!(content, "db:\n  host: localhost\n  port: 5432\n");
        assert_eq!(
            shown,
            "[app.yaml]\nmissing key found\ndb:\n  host: {{ .db.host }}\nvalue for '.db.host': \n"
        );
        assert_eq!(
            store.answers.get(&FlatKey::new(".db.host")),
            Some(&FlatValue::string("localhost"))
        );
        assert_eq!(
            store.data,
            NestedValue::from(json!({"db": {"host": "localhost", "port": 5432}}))
        );
    }

    #[test]
    fn answers_are_reused_across_lines_and_files() {
        let first = template("one", "a: {{ .name }}\nb: {{ .name }}\n");
        let second = template("two", "c: {{ .name }}\n");
        let mut store = Store::new(json!({}));

        let (content, shown) = store.run("x\n", false, &first).unwrap();
        assert_eq!(content, "a: x\nb: x\n");
        assert_eq!(shown.matches("value for '.name'").count(), 1);

        let (content, shown) = store.run("", false, &second).unwrap();
        assert_eq!(content, "c: x\n");
        assert_eq!(shown, "");
    }

    #[test]
    fn without_folding_shows_only_the_offending_line() {
        let tmpl = template("t", "root:\n  child: {{ .v }}\n");
        let mut store = Store::new(json!({}));
        let (_, shown) = store.run("  spaced  \n", false, &tmpl).unwrap();
        assert_eq!(shown, "[t]\n  child: {{ .v }}\nvalue for '.v': ");
        assert_eq!(
            store.answers.get(&FlatKey::new(".v")),
            Some(&FlatValue::string("  spaced  "))
        );
    }

    #[test]
    fn answers_fill_empty_containers() {
        let tmpl = template("t", "host: {{ .db.host }}\n");
        let mut store = Store::new(json!({"db": {}, "tags": []}));
        let (content, shown) = store.run("localhost\n", false, &tmpl).unwrap();
        assert_eq!(content, "host: localhost\n");
        assert_eq!(shown.matches("value for '.db.host'").count(), 1);
        assert_eq!(
            store.data,
            NestedValue::from(json!({"db": {"host": "localhost"}, "tags": []}))
        );
    }

    #[test]
    fn dotted_data_keys_render_as_loaded() {
        let tmpl = template(
            "t",
            "n: {{ index .labels \"app.kubernetes.io/name\" }}\nv: {{ .v }}\n",
        );
        let mut store = Store::new(json!({"labels": {"app.kubernetes.io/name": "web"}}));
        let (content, _) = store.run("x\n", false, &tmpl).unwrap();
        assert_eq!(content, "n: web\nv: x\n");
    }

    #[test]
    fn single_transitions() {
        let tmpl = template("t", "{{ .v }}");
        let mut store = Store::new(json!({"v": "ok"}));
        let palette = Palette::plain();
        let mut term = Terminal::new(Cursor::new(""), Vec::new());
        let mut driver = Completion::new(
            &mut store.data,
            &mut store.answers,
            &mut term,
            &palette,
            true,
            MissingKey::Error,
        );
        let state = driver.advance(&tmpl, ResolutionState::Rendering).unwrap();
        assert_eq!(state, ResolutionState::Satisfied("ok".into()));
        let state = driver.advance(&tmpl, state).unwrap();
        assert_eq!(state, ResolutionState::Resolved("ok".into()));
    }
}
