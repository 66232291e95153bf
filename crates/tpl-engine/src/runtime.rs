// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::{Number, Value};

use crate::ast::{field_path, BindingKind, Command, Expression, Pipeline};
use crate::error::{Error, UnknownPolicy};

/// Signature implemented by helper functions invoked from templates.
pub type Function = dyn Fn(&mut EvalContext, &[Value]) -> Result<Value, Error> + Send + Sync;

/// Text emitted for a reference that has no value under [`MissingKey::Default`]
/// and [`MissingKey::Invalid`].
pub const NO_VALUE: &str = "<no value>";

/// Behaviour when a field lookup finds no entry in the data, mirroring Go's
/// `missingkey` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingKey {
    /// Render the [`NO_VALUE`] sentinel.
    #[default]
    Default,
    /// Same output as `Default`.
    Invalid,
    /// Render the zero value, an empty string.
    Zero,
    /// Abort rendering with [`Error::MissingKey`].
    Error,
}

impl MissingKey {
    pub fn as_str(self) -> &'static str {
        match self {
            MissingKey::Default => "default",
            MissingKey::Invalid => "invalid",
            MissingKey::Zero => "zero",
            MissingKey::Error => "error",
        }
    }
}

impl fmt::Display for MissingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MissingKey {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(MissingKey::Default),
            "invalid" => Ok(MissingKey::Invalid),
            "zero" => Ok(MissingKey::Zero),
            "error" => Ok(MissingKey::Error),
            _ => Err(UnknownPolicy(s.to_string())),
        }
    }
}

/// Registry that maps helper names to callable functions.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    map: Arc<HashMap<String, Arc<Function>>>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.function_names())
            .finish()
    }
}

impl FunctionRegistry {
    /// Creates an empty registry.
    pub fn empty() -> Self {
        Self {
            map: Arc::new(HashMap::new()),
        }
    }

    /// Returns a new builder for constructing registries.
    pub fn builder() -> FunctionRegistryBuilder {
        FunctionRegistryBuilder::new()
    }

    /// Fetches a helper function by name.
    pub fn get(&self, name: &str) -> Option<Arc<Function>> {
        self.map.get(name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns a sorted list of the registered function names.
    pub fn function_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.map.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Helper for constructing registries before freezing them into an immutable map.
#[derive(Default)]
pub struct FunctionRegistryBuilder {
    map: HashMap<String, Arc<Function>>,
}

impl FunctionRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a helper function under the provided name.
    pub fn register<F>(&mut self, name: impl Into<String>, func: F) -> &mut Self
    where
        F: Fn(&mut EvalContext, &[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.map.insert(name.into(), Arc::new(func));
        self
    }

    /// Extends the builder with all helpers from another registry.
    pub fn extend(&mut self, other: &FunctionRegistry) -> &mut Self {
        for (key, value) in other.map.iter() {
            self.map.insert(key.clone(), value.clone());
        }
        self
    }

    /// Finalises the builder into an immutable registry.
    pub fn build(self) -> FunctionRegistry {
        FunctionRegistry {
            map: Arc::new(self.map),
        }
    }
}

/// Execution context threaded through template evaluation.
pub struct EvalContext {
    stack: Vec<Value>,
    root: Value,
    variables: Vec<HashMap<String, Value>>,
    functions: FunctionRegistry,
    missing_key: MissingKey,
    missing: bool,
}

enum CommandResolution {
    Function(Arc<Function>),
    Identifier(String),
    Expression,
}

impl EvalContext {
    /// Creates a new evaluation context seeded with the input data and helper registry.
    pub fn new(data: Value, functions: FunctionRegistry, missing_key: MissingKey) -> Self {
        let mut scope = HashMap::new();
        scope.insert("$".to_string(), data.clone());

        Self {
            stack: vec![data.clone()],
            root: data,
            variables: vec![scope],
            functions,
            missing_key,
            missing: false,
        }
    }

    pub fn missing_key(&self) -> MissingKey {
        self.missing_key
    }

    /// Retrieves a helper function by name, if registered.
    pub fn function(&self, name: &str) -> Option<Arc<Function>> {
        self.functions.get(name)
    }

    /// Pushes a new scope with the provided value at the top of the stack.
    pub fn push_scope(&mut self, value: Value) {
        self.stack.push(value);
        let mut scope = HashMap::new();
        scope.insert("$".to_string(), self.root.clone());
        self.variables.push(scope);
    }

    /// Pops the current scope, restoring the previous context.
    pub fn pop_scope(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
        if self.variables.len() > 1 {
            self.variables.pop();
        }
    }

    /// Reports and resets whether the last value produced came from a lookup
    /// that found no entry.
    pub fn take_missing(&mut self) -> bool {
        std::mem::take(&mut self.missing)
    }

    /// Evaluates a pipeline in the context and returns the resulting value.
    pub fn eval_pipeline(&mut self, pipeline: &Pipeline) -> Result<Value, Error> {
        let mut iter = pipeline.commands.iter();
        let first = iter
            .next()
            .ok_or_else(|| Error::render("empty pipeline", None))?;
        let mut value = self.eval_command(first, None)?;

        for command in iter {
            value = self.eval_command(command, Some(value))?;
        }

        Ok(value)
    }

    fn eval_command(&mut self, command: &Command, input: Option<Value>) -> Result<Value, Error> {
        let resolution = self.resolve_command_target(command);
        let args = self.prepare_command_args(command, input, &resolution)?;
        self.execute_prepared_command(command, resolution, args)
    }

    fn resolve_command_target(&self, command: &Command) -> CommandResolution {
        match &command.target {
            Expression::Identifier(name) => match self.functions.get(name) {
                Some(func) => CommandResolution::Function(func),
                None => CommandResolution::Identifier(name.clone()),
            },
            _ => CommandResolution::Expression,
        }
    }

    fn prepare_command_args(
        &mut self,
        command: &Command,
        input: Option<Value>,
        resolution: &CommandResolution,
    ) -> Result<Vec<Value>, Error> {
        match resolution {
            CommandResolution::Function(_) => {
                let mut args =
                    Vec::with_capacity(command.args.len() + usize::from(input.is_some()));
                for expr in &command.args {
                    args.push(self.eval_expression(expr)?);
                }
                if let Some(prev) = input {
                    args.push(prev);
                }
                Ok(args)
            }
            CommandResolution::Identifier(name) => {
                if !command.args.is_empty() || input.is_some() {
                    return Err(Error::render(format!("unknown function \"{name}\""), None));
                }
                Ok(Vec::new())
            }
            CommandResolution::Expression => {
                if !command.args.is_empty() {
                    return Err(Error::render(
                        "arguments supplied to non-function expression",
                        None,
                    ));
                }
                if input.is_some() {
                    return Err(Error::render(
                        "cannot pipe value into non-function expression",
                        None,
                    ));
                }
                Ok(Vec::new())
            }
        }
    }

    fn execute_prepared_command(
        &mut self,
        command: &Command,
        resolution: CommandResolution,
        args: Vec<Value>,
    ) -> Result<Value, Error> {
        match resolution {
            CommandResolution::Function(func) => {
                let result = func(self, &args);
                // A helper's result is a real value even if an argument was absent.
                self.missing = false;
                result
            }
            CommandResolution::Identifier(_) | CommandResolution::Expression => {
                debug_assert!(args.is_empty());
                self.eval_expression(&command.target)
            }
        }
    }

    fn eval_expression(&mut self, expr: &Expression) -> Result<Value, Error> {
        match expr {
            Expression::Identifier(name) => Ok(self.resolve_identifier(name)),
            Expression::Field(parts) => self.resolve_field(parts),
            Expression::Variable(name) => Ok(self.resolve_variable(name)),
            Expression::PipelineExpr(pipeline) => {
                if pipeline.declarations.is_some() {
                    return Err(Error::render(
                        "pipeline declarations not allowed in expression",
                        None,
                    ));
                }
                self.eval_pipeline(pipeline)
            }
            Expression::StringLiteral(value) => Ok(Value::String(value.clone())),
            Expression::NumberLiteral(text) => parse_number(text)
                .map(Value::Number)
                .ok_or_else(|| Error::render(format!("invalid number literal {text}"), None)),
            Expression::BoolLiteral(flag) => Ok(Value::Bool(*flag)),
            Expression::Nil => Ok(Value::Null),
        }
    }

    fn resolve_identifier(&self, name: &str) -> Value {
        for value in self.stack.iter().rev() {
            if let Value::Object(map) = value {
                if let Some(found) = map.get(name) {
                    return found.clone();
                }
            }
        }
        Value::Null
    }

    fn dot(&self) -> Result<Value, Error> {
        self.stack
            .last()
            .cloned()
            .ok_or_else(|| Error::render("dot resolution failed", None))
    }

    fn resolve_field(&mut self, parts: &[String]) -> Result<Value, Error> {
        let (mut value, segments) = match parts.split_first() {
            None => return self.dot(),
            Some((first, rest)) if first.starts_with('$') => (self.resolve_variable(first), rest),
            Some(_) => (self.dot()?, parts),
        };

        for segment in segments {
            match project_field_segment(&value, segment)? {
                Some(next) => value = next,
                None => return self.missing_field(parts),
            }
        }

        Ok(value)
    }

    fn missing_field(&mut self, parts: &[String]) -> Result<Value, Error> {
        match self.missing_key {
            MissingKey::Error => Err(Error::missing_key(field_path(parts))),
            MissingKey::Default | MissingKey::Invalid => {
                self.missing = true;
                Ok(Value::Null)
            }
            MissingKey::Zero => Ok(Value::Null),
        }
    }

    fn resolve_variable(&self, name: &str) -> Value {
        if name == "$" {
            return self.root.clone();
        }

        for scope in self.variables.iter().rev() {
            if let Some(value) = scope.get(name) {
                return value.clone();
            }
        }

        Value::Null
    }

    fn assign_variable(&mut self, name: &str, kind: BindingKind, value: Value) -> Result<(), Error> {
        if name == "$" {
            return Err(Error::render("cannot assign to root variable", None));
        }
        match kind {
            BindingKind::Declare => {
                let scope = self
                    .variables
                    .last_mut()
                    .ok_or_else(|| Error::render("scope stack is empty", None))?;
                scope.insert(name.to_string(), value);
                Ok(())
            }
            BindingKind::Assign => {
                for scope in self.variables.iter_mut().rev() {
                    if let Some(slot) = scope.get_mut(name) {
                        *slot = value;
                        return Ok(());
                    }
                }
                Err(Error::render(format!("variable {name} not defined"), None))
            }
        }
    }

    /// Binds the variables declared by `pipeline` to its result.
    pub fn apply_bindings(&mut self, pipeline: &Pipeline, value: &Value) -> Result<(), Error> {
        let Some(decls) = &pipeline.declarations else {
            return Ok(());
        };
        match (decls.variables.as_slice(), value) {
            ([], _) => {}
            ([name], _) => self.assign_variable(name, decls.kind, value.clone())?,
            (names, Value::Array(items)) => {
                for (idx, name) in names.iter().enumerate() {
                    let assigned = items.get(idx).cloned().unwrap_or(Value::Null);
                    self.assign_variable(name, decls.kind, assigned)?;
                }
            }
            (names, _) => {
                for name in names {
                    self.assign_variable(name, decls.kind, value.clone())?;
                }
            }
        }
        Ok(())
    }

    /// Declares the range variables up front so the loop body can see them.
    pub fn predeclare_bindings(&mut self, pipeline: &Pipeline) {
        let Some(decls) = &pipeline.declarations else {
            return;
        };
        if decls.kind != BindingKind::Declare {
            return;
        }
        if let Some(scope) = self.variables.last_mut() {
            for name in &decls.variables {
                scope.entry(name.clone()).or_insert(Value::Null);
            }
        }
    }

    /// Assigns `$key, $value` (or just `$value`) for one range iteration.
    pub fn assign_range_bindings(
        &mut self,
        pipeline: &Pipeline,
        key: Option<Value>,
        value: Value,
    ) -> Result<(), Error> {
        let Some(decls) = &pipeline.declarations else {
            return Ok(());
        };
        match decls.variables.as_slice() {
            [] => {}
            [name] => self.assign_variable(name, decls.kind, value)?,
            [key_name, value_name, ..] => {
                self.assign_variable(key_name, decls.kind, key.unwrap_or(Value::Null))?;
                self.assign_variable(value_name, decls.kind, value)?;
            }
        }
        Ok(())
    }
}

/// Looks up one field segment. `None` means the container has no such entry.
fn project_field_segment(value: &Value, part: &str) -> Result<Option<Value>, Error> {
    match value {
        Value::Object(map) => Ok(map.get(part).cloned()),
        Value::Array(list) => {
            let raw = part
                .strip_prefix('[')
                .and_then(|p| p.strip_suffix(']'))
                .unwrap_or(part);
            let index = raw.parse::<usize>().map_err(|_| {
                Error::render(format!("array index must be integer, got {part}"), None)
            })?;
            Ok(list.get(index).cloned())
        }
        Value::Null => Ok(None),
        _ => Err(Error::render(
            format!("cannot access field {part} on non-container value"),
            None,
        )),
    }
}

pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                let mut s = n.to_string();
                if s.contains('.') {
                    while s.ends_with('0') {
                        s.pop();
                    }
                    if s.ends_with('.') {
                        s.pop();
                    }
                }
                s
            }
        }
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

pub fn parse_number(text: &str) -> Option<Number> {
    if !text.contains(['.', 'e', 'E']) {
        if let Ok(value) = text.parse::<i64>() {
            return Some(Number::from(value));
        }
        if let Ok(value) = text.parse::<u64>() {
            return Some(Number::from(value));
        }
    }

    text.parse::<f64>().ok().and_then(Number::from_f64)
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i != 0
            } else if let Some(u) = n.as_u64() {
                u != 0
            } else {
                n.as_f64().is_some_and(|f| f != 0.0)
            }
        }
        Value::String(s) => !s.is_empty(),
        Value::Array(arr) => !arr.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

pub fn coerce_number(value: &Value) -> Result<f64, Error> {
    if let Some(f) = value.as_f64() {
        Ok(f)
    } else if let Some(s) = value.as_str() {
        s.parse::<f64>()
            .map_err(|_| Error::render("cannot convert string to number", None))
    } else {
        Err(Error::render("expected numeric value for comparison", None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry_with_echo() -> FunctionRegistry {
        let mut builder = FunctionRegistry::builder();
        builder.register("echo", |_, args| {
            Ok(args.first().cloned().unwrap_or(Value::Null))
        });
        builder.build()
    }

    fn field(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn resolve_command_target_detects_function() {
        let ctx = EvalContext::new(Value::Null, registry_with_echo(), MissingKey::Default);
        let command = Command::new(Expression::Identifier("echo".into()), Vec::new());

        assert!(matches!(
            ctx.resolve_command_target(&command),
            CommandResolution::Function(_)
        ));
    }

    #[test]
    fn resolve_command_target_identifies_expression() {
        let mut ctx = EvalContext::new(
            json!({"name": "tpl"}),
            FunctionRegistry::empty(),
            MissingKey::Default,
        );
        let command = Command::new(Expression::Identifier("name".into()), Vec::new());

        let resolution = ctx.resolve_command_target(&command);
        let args = ctx
            .prepare_command_args(&command, None, &resolution)
            .expect("identifier without args should succeed");
        let value = ctx
            .execute_prepared_command(&command, resolution, args)
            .expect("expression should evaluate");

        assert_eq!(value, json!("tpl"));
    }

    #[test]
    fn prepare_command_args_errors_on_unknown_function_with_args() {
        let mut ctx = EvalContext::new(Value::Null, FunctionRegistry::empty(), MissingKey::Default);
        let command = Command::new(
            Expression::Identifier("missing".into()),
            vec![Expression::StringLiteral("arg".into())],
        );

        let resolution = ctx.resolve_command_target(&command);
        let err = ctx
            .prepare_command_args(&command, None, &resolution)
            .expect_err("should reject unknown function with args");
        assert!(err.to_string().contains("unknown function"));
    }

    #[test]
    fn prepare_command_args_appends_piped_value() {
        let mut ctx = EvalContext::new(Value::Null, registry_with_echo(), MissingKey::Default);
        let command = Command::new(
            Expression::Identifier("echo".into()),
            vec![Expression::NumberLiteral("7".into())],
        );

        let resolution = ctx.resolve_command_target(&command);
        let args = ctx
            .prepare_command_args(&command, Some(Value::Bool(false)), &resolution)
            .expect("function arguments should prepare");

        assert_eq!(args, vec![json!(7), Value::Bool(false)]);
    }

    #[test]
    fn prepare_command_args_rejects_piped_expression() {
        let mut ctx = EvalContext::new(Value::Null, FunctionRegistry::empty(), MissingKey::Default);
        let command = Command::new(Expression::BoolLiteral(true), Vec::new());

        let resolution = ctx.resolve_command_target(&command);
        let err = ctx
            .prepare_command_args(&command, Some(Value::Null), &resolution)
            .expect_err("piping into expression should error");

        assert!(err
            .to_string()
            .contains("cannot pipe value into non-function expression"));
    }

    #[test]
    fn missing_field_under_error_policy_names_full_path() {
        let mut ctx = EvalContext::new(
            json!({"a": {"b": 1}}),
            FunctionRegistry::empty(),
            MissingKey::Error,
        );
        let err = ctx.resolve_field(&field(&["a", "c"])).unwrap_err();
        assert_eq!(err.missing_key_path(), Some(".a.c"));
    }

    #[test]
    fn missing_field_under_default_policy_sets_flag() {
        let mut ctx = EvalContext::new(json!({}), FunctionRegistry::empty(), MissingKey::Default);
        let value = ctx.resolve_field(&field(&["a", "b"])).unwrap();
        assert_eq!(value, Value::Null);
        assert!(ctx.take_missing());
        assert!(!ctx.take_missing());
    }

    #[test]
    fn missing_field_under_zero_policy_leaves_flag_clear() {
        let mut ctx = EvalContext::new(json!({}), FunctionRegistry::empty(), MissingKey::Zero);
        assert_eq!(ctx.resolve_field(&field(&["a"])).unwrap(), Value::Null);
        assert!(!ctx.take_missing());
    }

    #[test]
    fn bracket_segments_index_into_arrays() {
        let mut ctx = EvalContext::new(
            json!({"hosts": [{"name": "db0"}, {"name": "db1"}]}),
            FunctionRegistry::empty(),
            MissingKey::Error,
        );
        let value = ctx.resolve_field(&field(&["hosts", "[1]", "name"])).unwrap();
        assert_eq!(value, json!("db1"));

        let err = ctx.resolve_field(&field(&["hosts", "[5]", "name"])).unwrap_err();
        assert_eq!(err.missing_key_path(), Some(".hosts[5].name"));
    }

    #[test]
    fn field_on_scalar_is_render_error() {
        let mut ctx = EvalContext::new(json!({"a": 1}), FunctionRegistry::empty(), MissingKey::Error);
        let err = ctx.resolve_field(&field(&["a", "b"])).unwrap_err();
        assert!(matches!(err, Error::Render { .. }));
    }

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!("ERROR".parse::<MissingKey>().unwrap(), MissingKey::Error);
        assert_eq!("zero".parse::<MissingKey>().unwrap(), MissingKey::Zero);
        assert_eq!(" invalid ".parse::<MissingKey>().unwrap(), MissingKey::Invalid);
        assert!("sometimes".parse::<MissingKey>().is_err());
    }
}
