#![forbid(unsafe_code)]
// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Parsing and rendering of Go `text/template` style templates.
//!
//! Templates render against a `serde_json::Value`. How a field lookup with no
//! entry in the data is handled is controlled by [`MissingKey`]; under
//! [`MissingKey::Error`] rendering fails with [`Error::MissingKey`], which names
//! the unresolved reference.
//!
//! ```
//! use serde_json::json;
//! use tpl_engine::{text_template_functions, MissingKey, Template};
//!
//! let tmpl = Template::parse_with_functions("greet", "hi {{ .name }}", text_template_functions())?;
//! assert_eq!(tmpl.render(&json!({"name": "tpl"}))?, "hi tpl");
//! assert_eq!(tmpl.render_with(&json!({}), MissingKey::Default)?, "hi <no value>");
//! # Ok::<(), tpl_engine::Error>(())
//! ```

pub mod ast;
mod builtins;
mod error;
pub mod lexer;
mod parser;
mod runtime;

pub use ast::{
    field_path, ActionNode, Ast, BindingKind, Block, Branch, Command, CommentNode, ElseIfBranch,
    Expression, IfNode, Node, Pipeline, PipelineDeclarations, RangeNode, Span, TextNode, WithNode,
};
pub use builtins::{install_text_template_functions, text_template_functions};
pub use error::{Error, UnknownPolicy};
pub use lexer::{Keyword, Operator, Token, TokenKind};
pub use runtime::{
    coerce_number, is_truthy, value_to_string, EvalContext, Function, FunctionRegistry,
    FunctionRegistryBuilder, MissingKey, NO_VALUE,
};

use serde_json::{Number, Value};
use std::fmt;

/// Parsed template with associated AST and original source.
#[derive(Clone)]
pub struct Template {
    name: String,
    source: String,
    ast: Ast,
    functions: FunctionRegistry,
    missing_key: MissingKey,
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name)
            .field("missing_key", &self.missing_key)
            .finish_non_exhaustive()
    }
}

impl Template {
    /// Parses template source without any helper functions.
    pub fn parse_str(name: &str, source: &str) -> Result<Self, Error> {
        Self::parse_with_functions(name, source, FunctionRegistry::empty())
    }

    /// Parses template source and associates it with a registry of functions.
    pub fn parse_with_functions(
        name: &str,
        source: &str,
        functions: FunctionRegistry,
    ) -> Result<Self, Error> {
        let ast = parser::parse_template(name, source)?;
        Ok(Self {
            name: name.to_string(),
            source: source.to_string(),
            ast,
            functions,
            missing_key: MissingKey::default(),
        })
    }

    pub fn functions(&self) -> FunctionRegistry {
        self.functions.clone()
    }

    /// Returns the policy used by [`Template::render`].
    pub fn missing_key(&self) -> MissingKey {
        self.missing_key
    }

    pub fn set_missing_key(&mut self, policy: MissingKey) {
        self.missing_key = policy;
    }

    /// Consumes the template and returns it with a different missing-key policy.
    pub fn with_missing_key(mut self, policy: MissingKey) -> Self {
        self.missing_key = policy;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ast(&self) -> &Ast {
        &self.ast
    }

    /// Returns a canonical string representation of the parsed template, similar to Go's
    /// `parse.Tree.Root.String()` output.
    pub fn to_template_string(&self) -> String {
        let mut out = String::new();
        write_block(&mut out, &self.ast.root);
        out
    }

    /// Renders the template against `data` with the template's own policy.
    pub fn render(&self, data: &Value) -> Result<String, Error> {
        self.render_with(data, self.missing_key)
    }

    /// Renders the template against `data` with an explicit missing-key policy.
    pub fn render_with(&self, data: &Value, policy: MissingKey) -> Result<String, Error> {
        let mut ctx = EvalContext::new(data.clone(), self.functions.clone(), policy);
        let mut output = String::new();
        render_block(&mut ctx, &self.ast.root, &mut output)?;
        Ok(output)
    }
}

fn render_block(ctx: &mut EvalContext, block: &Block, output: &mut String) -> Result<(), Error> {
    for node in &block.nodes {
        match node {
            Node::Text(text) => output.push_str(&text.text),
            Node::Comment(_) => {}
            Node::Action(action) => render_action(ctx, action, output)?,
            Node::If(if_node) => render_if(ctx, if_node, output)?,
            Node::Range(range_node) => render_range(ctx, &range_node.branch, output)?,
            Node::With(with_node) => render_with(ctx, &with_node.branch, output)?,
        }
    }
    Ok(())
}

fn render_action(ctx: &mut EvalContext, action: &ActionNode, output: &mut String) -> Result<(), Error> {
    ctx.take_missing();
    let value = ctx
        .eval_pipeline(&action.pipeline)
        .map_err(|err| with_span(err, action.span))?;
    ctx.apply_bindings(&action.pipeline, &value)?;
    let missing = ctx.take_missing();
    if action.pipeline.declarations.is_none() {
        if missing && value.is_null() {
            output.push_str(NO_VALUE);
        } else {
            output.push_str(&value_to_string(&value));
        }
    }
    Ok(())
}

/// Attaches the action's location to errors raised without one.
fn with_span(err: Error, at: Span) -> Error {
    match err {
        Error::MissingKey { key, span: None } => Error::MissingKey {
            key,
            span: Some(at),
        },
        Error::Render {
            message,
            source,
            span: None,
        } => Error::Render {
            message,
            source,
            span: Some(at),
        },
        other => other,
    }
}

fn render_if(ctx: &mut EvalContext, node: &IfNode, output: &mut String) -> Result<(), Error> {
    let value = ctx.eval_pipeline(&node.pipeline)?;
    ctx.apply_bindings(&node.pipeline, &value)?;
    if is_truthy(&value) {
        return render_block(ctx, &node.then_block, output);
    }
    for branch in &node.else_if_branches {
        let branch_value = ctx.eval_pipeline(&branch.pipeline)?;
        ctx.apply_bindings(&branch.pipeline, &branch_value)?;
        if is_truthy(&branch_value) {
            return render_block(ctx, &branch.block, output);
        }
    }
    match &node.else_block {
        Some(else_block) => render_block(ctx, else_block, output),
        None => Ok(()),
    }
}

fn render_range(ctx: &mut EvalContext, node: &Branch, output: &mut String) -> Result<(), Error> {
    ctx.predeclare_bindings(&node.pipeline);
    let value = ctx.eval_pipeline(&node.pipeline)?;

    let items: Vec<(Value, Value)> = match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| (Value::Number(Number::from(index)), item))
            .collect(),
        Value::Object(map) => map
            .into_iter()
            .map(|(key, item)| (Value::String(key), item))
            .collect(),
        Value::Null => Vec::new(),
        Value::Number(count) => match count.as_u64() {
            Some(n) => (0..n)
                .map(|i| (Value::Number(Number::from(i)), Value::Number(Number::from(i))))
                .collect(),
            None => return Err(Error::render("range can't iterate over a non-integer", None)),
        },
        other => {
            return Err(Error::render(
                format!("range can't iterate over {}", value_to_string(&other)),
                None,
            ));
        }
    };

    if items.is_empty() {
        ctx.assign_range_bindings(&node.pipeline, None, Value::Null)?;
        if let Some(else_block) = &node.else_block {
            render_block(ctx, else_block, output)?;
        }
        return Ok(());
    }

    for (key, item) in items {
        ctx.assign_range_bindings(&node.pipeline, Some(key), item.clone())?;
        ctx.push_scope(item);
        let result = render_block(ctx, &node.then_block, output);
        ctx.pop_scope();
        result?;
    }
    Ok(())
}

fn render_with(ctx: &mut EvalContext, node: &Branch, output: &mut String) -> Result<(), Error> {
    let value = ctx.eval_pipeline(&node.pipeline)?;
    ctx.apply_bindings(&node.pipeline, &value)?;
    if is_truthy(&value) {
        ctx.push_scope(value);
        let result = render_block(ctx, &node.then_block, output);
        ctx.pop_scope();
        result
    } else if let Some(else_block) = &node.else_block {
        render_block(ctx, else_block, output)
    } else {
        Ok(())
    }
}

fn write_block(out: &mut String, block: &Block) {
    for node in &block.nodes {
        match node {
            Node::Text(text) => out.push_str(&text.text),
            Node::Comment(comment) => out.push_str(&comment.to_template_fragment()),
            Node::Action(action) => out.push_str(&action.to_template_fragment()),
            Node::If(if_node) => {
                write_open(out, "if", &if_node.pipeline);
                write_block(out, &if_node.then_block);
                for branch in &if_node.else_if_branches {
                    write_open(out, "else if", &branch.pipeline);
                    write_block(out, &branch.block);
                }
                write_tail(out, if_node.else_block.as_ref());
            }
            Node::Range(range_node) => write_branch(out, "range", &range_node.branch),
            Node::With(with_node) => write_branch(out, "with", &with_node.branch),
        }
    }
}

fn write_open(out: &mut String, keyword: &str, pipeline: &Pipeline) {
    out.push_str("{{");
    out.push_str(keyword);
    out.push(' ');
    out.push_str(&pipeline_to_string(pipeline));
    out.push_str("}}");
}

fn write_branch(out: &mut String, keyword: &str, branch: &Branch) {
    write_open(out, keyword, &branch.pipeline);
    write_block(out, &branch.then_block);
    write_tail(out, branch.else_block.as_ref());
}

fn write_tail(out: &mut String, else_block: Option<&Block>) {
    if let Some(else_block) = else_block {
        out.push_str("{{else}}");
        write_block(out, else_block);
    }
    out.push_str("{{end}}");
}

fn pipeline_to_string(pipeline: &Pipeline) -> String {
    let mut out = String::new();
    if let Some(decls) = &pipeline.declarations {
        out.push_str(&decls.variables.join(", "));
        out.push_str(match decls.kind {
            BindingKind::Declare => " := ",
            BindingKind::Assign => " = ",
        });
    }

    let commands: Vec<String> = pipeline
        .commands
        .iter()
        .map(|command| {
            std::iter::once(&command.target)
                .chain(&command.args)
                .map(expression_to_string)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect();
    out.push_str(&commands.join(" | "));
    out
}

fn expression_to_string(expr: &Expression) -> String {
    match expr {
        Expression::Identifier(name) | Expression::Variable(name) => name.clone(),
        Expression::Field(parts) => field_path(parts),
        Expression::PipelineExpr(pipeline) => format!("({})", pipeline_to_string(pipeline)),
        Expression::StringLiteral(value) => format!("{value:?}"),
        Expression::NumberLiteral(value) => value.clone(),
        Expression::BoolLiteral(flag) => flag.to_string(),
        Expression::Nil => "nil".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn builtin(name: &str, source: &str) -> Template {
        Template::parse_with_functions(name, source, text_template_functions()).unwrap()
    }

    #[test]
    fn renders_with_custom_registry() {
        let mut builder = FunctionRegistry::builder();
        builder.register("greet", |_ctx, args| {
            let name = args
                .first()
                .cloned()
                .unwrap_or_else(|| Value::String("friend".into()));
            Ok(Value::String(format!("Hello, {}!", value_to_string(&name))))
        });

        let tmpl = Template::parse_with_functions("test", "{{greet .name}}", builder.build()).unwrap();
        assert_eq!(tmpl.render(&json!({"name": "Ada"})).unwrap(), "Hello, Ada!");
    }

    #[test]
    fn missing_function_is_error() {
        let tmpl = Template::parse_str("missing", "{{unknown .}} ").unwrap();
        let err = tmpl.render(&json!(1)).unwrap_err();
        assert!(err.to_string().contains("unknown function"));
    }

    #[test]
    fn parse_error_on_unclosed_action() {
        let err = Template::parse_str("bad", "{{ \"d\" }").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        assert!(err.to_string().contains("unclosed action"));
    }

    #[test]
    fn default_policy_emits_sentinel() {
        let tmpl = Template::parse_str("sentinel", "b={{ .a.b }}\nc={{ .a.c }}").unwrap();
        let out = tmpl.render(&json!({"a": {"b": 1}})).unwrap();
        assert_eq!(out, "b=1\nc=<no value>");
    }

    #[test]
    fn error_policy_reports_structured_missing_key() {
        let tmpl = Template::parse_str("strict", "b={{ .a.b }}\nc={{ .a.c }}")
            .unwrap()
            .with_missing_key(MissingKey::Error);
        let err = tmpl.render(&json!({"a": {"b": 1}})).unwrap_err();
        assert_eq!(err.missing_key_path(), Some(".a.c"));
        assert_eq!(err.span(), Some(Span::new(15, 25)));
    }

    #[test]
    fn zero_and_invalid_policies() {
        let tmpl = Template::parse_str("policies", "[{{ .x }}]").unwrap();
        assert_eq!(tmpl.render_with(&json!({}), MissingKey::Zero).unwrap(), "[]");
        assert_eq!(
            tmpl.render_with(&json!({}), MissingKey::Invalid).unwrap(),
            "[<no value>]"
        );
    }

    #[test]
    fn explicit_null_is_not_missing() {
        let tmpl = Template::parse_str("null", "[{{ .x }}]").unwrap();
        assert_eq!(tmpl.render_with(&json!({"x": null}), MissingKey::Error).unwrap(), "[]");
    }

    #[test]
    fn missing_key_inside_false_branch_is_not_evaluated() {
        let tmpl = Template::parse_str("branch", "{{if .on}}{{ .absent }}{{end}}ok").unwrap();
        let out = tmpl.render_with(&json!({"on": false}), MissingKey::Error).unwrap();
        assert_eq!(out, "ok");
    }

    #[test]
    fn raw_string_literal_roundtrip() {
        let tmpl = Template::parse_str("raw", "{{ `{{ \"d\" }` }}").unwrap();
        assert_eq!(tmpl.render(&json!({})).unwrap(), "{{ \"d\" }");
    }

    #[test]
    fn renders_if_else_if_chain() {
        let tmpl = Template::parse_str(
            "chain",
            "{{if .a}}A{{else if .b}}B{{else}}C{{end}}",
        )
        .unwrap();
        assert_eq!(tmpl.render(&json!({"a": true})).unwrap(), "A");
        assert_eq!(tmpl.render(&json!({"b": 1})).unwrap(), "B");
        assert_eq!(tmpl.render(&json!({})).unwrap(), "C");
        assert_eq!(
            tmpl.to_template_string(),
            "{{if .a}}A{{else if .b}}B{{else}}C{{end}}"
        );
    }

    #[test]
    fn renders_range_over_arrays() {
        let tmpl =
            Template::parse_str("range", "{{range .items}}{{.}},{{else}}empty{{end}}").unwrap();
        assert_eq!(tmpl.render(&json!({"items": ["a", "b"]})).unwrap(), "a,b,");
        assert_eq!(tmpl.render(&json!({"items": []})).unwrap(), "empty");
    }

    #[test]
    fn range_assigns_iteration_variables() {
        let tmpl = Template::parse_str(
            "range-vars",
            "{{range $i, $v := .items}}{{$i}}:{{$v}};{{end}}",
        )
        .unwrap();
        let output = tmpl.render(&json!({"items": ["zero", "one"]})).unwrap();
        assert_eq!(output, "0:zero;1:one;");
    }

    #[test]
    fn range_over_mapping_visits_sorted_keys() {
        let tmpl = Template::parse_str("range-map", "{{range $k, $v := .}}{{$k}}={{$v}} {{end}}")
            .unwrap();
        assert_eq!(tmpl.render(&json!({"b": 2, "a": 1})).unwrap(), "a=1 b=2 ");
    }

    #[test]
    fn renders_with_changes_context() {
        let tmpl =
            Template::parse_str("with", "{{with .user}}{{.name}}{{else}}missing{{end}}").unwrap();
        assert_eq!(tmpl.render(&json!({"user": {"name": "Ada"}})).unwrap(), "Ada");
        assert_eq!(tmpl.render(&json!({"user": null})).unwrap(), "missing");
    }

    #[test]
    fn trims_whitespace_around_actions() {
        let tmpl = Template::parse_str("trim", "Line1\n{{- \"Line2\" -}}\nLine3").unwrap();
        assert_eq!(tmpl.render(&json!({})).unwrap(), "Line1Line2Line3");
    }

    #[test]
    fn comment_trimming_matches_go() {
        let left = Template::parse_str("comment-left", "x \r\n\t{{- /* hi */}}").unwrap();
        assert_eq!(left.render(&json!({})).unwrap(), "x");
        assert_eq!(left.to_template_string(), "x{{-/*hi*/}}");

        let both =
            Template::parse_str("comment-both", "left \n{{- /* trim */ -}}\n right").unwrap();
        assert_eq!(both.render(&json!({})).unwrap(), "leftright");
    }

    #[test]
    fn nested_scope_shadowing_preserves_outer() {
        let tmpl = Template::parse_str(
            "shadow",
            "{{ $x := \"outer\" }}{{ with .inner }}{{ $x := \"inner\" }}{{ $x }}{{ end }}{{ $x }}",
        )
        .unwrap();
        let rendered = tmpl.render(&json!({"inner": {"value": 1}})).unwrap();
        assert_eq!(rendered, "innerouter");
    }

    #[test]
    fn assignment_to_unknown_variable_fails() {
        let tmpl = Template::parse_str("assign", "{{ $v = .value }}").unwrap();
        let err = tmpl.render(&json!({"value": 1})).unwrap_err();
        assert!(err.to_string().contains("variable $v not defined"));
    }

    #[test]
    fn comparison_operators_in_pipelines() {
        let tmpl = builtin("cmp", "{{ if .port == 80 }}http{{ else }}other{{ end }}");
        assert_eq!(tmpl.render(&json!({"port": 80})).unwrap(), "http");
        assert!(tmpl.to_template_string().contains("{{if eq .port 80}}"));
    }

    #[test]
    fn bracket_index_renders_sequence_element() {
        let tmpl = builtin("idx", "{{ .db.hosts[1].name }}");
        let data = json!({"db": {"hosts": [{"name": "a"}, {"name": "b"}]}});
        assert_eq!(tmpl.render(&data).unwrap(), "b");
    }
}
