// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Go's predefined `text/template` functions.

use std::cmp::Ordering;

use serde_json::{Number, Value};

use crate::error::Error;
use crate::runtime::{
    coerce_number, is_truthy, value_to_string, EvalContext, FunctionRegistry,
    FunctionRegistryBuilder,
};

/// Builds a registry holding the functions every Go template can call without
/// a `FuncMap`.
pub fn text_template_functions() -> FunctionRegistry {
    let mut builder = FunctionRegistryBuilder::new();
    install_text_template_functions(&mut builder);
    builder.build()
}

/// Installs the predefined functions into an existing builder.
pub fn install_text_template_functions(builder: &mut FunctionRegistryBuilder) {
    builder
        .register("and", builtin_and)
        .register("or", builtin_or)
        .register("not", builtin_not)
        .register("call", builtin_call)
        .register("index", builtin_index)
        .register("slice", builtin_slice)
        .register("len", builtin_len)
        .register("print", builtin_print)
        .register("println", builtin_println)
        .register("printf", builtin_printf)
        .register("html", |_, args| escape_with(args, "html", escape_html))
        .register("js", |_, args| escape_with(args, "js", escape_js))
        .register("urlquery", |_, args| {
            escape_with(args, "urlquery", escape_urlquery)
        })
        .register("eq", builtin_eq)
        .register("ne", |_, args| {
            let [lhs, rhs] = expect_two("ne", args)?;
            Ok(Value::Bool(!values_equal(lhs, rhs)))
        })
        .register("lt", |_, args| order(args, "lt", Ordering::is_lt))
        .register("le", |_, args| order(args, "le", Ordering::is_le))
        .register("gt", |_, args| order(args, "gt", Ordering::is_gt))
        .register("ge", |_, args| order(args, "ge", Ordering::is_ge));
}

fn expect_two<'a>(name: &str, args: &'a [Value]) -> Result<[&'a Value; 2], Error> {
    match args {
        [lhs, rhs] => Ok([lhs, rhs]),
        _ => Err(Error::render(
            format!("{name} expects two arguments, got {}", args.len()),
            None,
        )),
    }
}

fn expect_one<'a>(name: &str, args: &'a [Value]) -> Result<&'a Value, Error> {
    match args {
        [value] => Ok(value),
        _ => Err(Error::render(
            format!("{name} expects exactly one argument"),
            None,
        )),
    }
}

fn builtin_and(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    let found = args.iter().find(|value| !is_truthy(value)).or(args.last());
    Ok(found.cloned().unwrap_or(Value::Bool(true)))
}

fn builtin_or(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    let found = args.iter().find(|value| is_truthy(value)).or(args.last());
    Ok(found.cloned().unwrap_or(Value::Bool(false)))
}

fn builtin_not(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Bool(!is_truthy(expect_one("not", args)?)))
}

fn builtin_call(ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    let (name, rest) = args
        .split_first()
        .ok_or_else(|| Error::render("call expects at least one argument", None))?;
    let name = name
        .as_str()
        .ok_or_else(|| Error::render("call expects function name as string", None))?;
    let func = ctx
        .function(name)
        .ok_or_else(|| Error::render(format!("unknown function \"{name}\""), None))?;
    func(ctx, rest)
}

fn builtin_index(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    let (first, keys) = args
        .split_first()
        .ok_or_else(|| Error::render("index expects at least one argument", None))?;

    let mut current = first.clone();
    for key in keys {
        current = match (&current, key) {
            (Value::Object(map), Value::String(name)) => {
                map.get(name).cloned().unwrap_or(Value::Null)
            }
            (Value::Array(list), key) => {
                let idx = as_index(key)?;
                list.get(idx).cloned().ok_or_else(|| {
                    Error::render(format!("index out of range: {idx}"), None)
                })?
            }
            (Value::Null, _) => return Err(Error::render("index of untyped nil", None)),
            _ => return Err(Error::render("can't index item", None)),
        };
    }
    Ok(current)
}

fn as_index(value: &Value) -> Result<usize, Error> {
    let index = match value {
        Value::Number(num) => num.as_u64().and_then(|n| usize::try_from(n).ok()),
        Value::String(text) => text.parse::<usize>().ok(),
        _ => None,
    };
    index.ok_or_else(|| Error::render("index must be a non-negative integer", None))
}

fn builtin_slice(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    let (target, indices) = args
        .split_first()
        .ok_or_else(|| Error::render("slice expects at least one argument", None))?;
    if indices.len() > 2 {
        return Err(Error::render("slice supports at most two indices", None));
    }
    let indices = indices
        .iter()
        .map(as_index)
        .collect::<Result<Vec<_>, _>>()?;

    let bounds = |len: usize| -> Result<(usize, usize), Error> {
        let start = indices.first().copied().unwrap_or(0);
        let end = indices.get(1).copied().unwrap_or(len);
        if start > end || end > len {
            return Err(Error::render(
                format!("slice indices out of range [{start}:{end}] with length {len}"),
                None,
            ));
        }
        Ok((start, end))
    };

    match target {
        Value::String(text) => {
            let (start, end) = bounds(text.len())?;
            text.get(start..end)
                .map(|part| Value::String(part.to_string()))
                .ok_or_else(|| Error::render("slice indices not on char boundaries", None))
        }
        Value::Array(list) => {
            let (start, end) = bounds(list.len())?;
            Ok(Value::Array(list[start..end].to_vec()))
        }
        _ => Err(Error::render("can't slice item", None)),
    }
}

fn builtin_len(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    let len = match expect_one("len", args)? {
        Value::String(text) => text.len(),
        Value::Array(list) => list.len(),
        Value::Object(map) => map.len(),
        _ => return Err(Error::render("len of unsupported type", None)),
    };
    Ok(Value::Number(Number::from(len)))
}

/// `print` only inserts a space between operands when neither is a string.
fn builtin_print(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    let mut output = String::new();
    for (idx, value) in args.iter().enumerate() {
        if idx > 0 && !value.is_string() && !args[idx - 1].is_string() {
            output.push(' ');
        }
        output.push_str(&value_to_string(value));
    }
    Ok(Value::String(output))
}

fn builtin_println(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    let mut output = args
        .iter()
        .map(value_to_string)
        .collect::<Vec<_>>()
        .join(" ");
    output.push('\n');
    Ok(Value::String(output))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Percent,
    Value,
    Quoted,
    Integer,
    Float,
    Other(char),
}

impl Verb {
    fn from_char(ch: char) -> Self {
        match ch {
            '%' => Verb::Percent,
            's' | 'v' => Verb::Value,
            'q' => Verb::Quoted,
            'd' => Verb::Integer,
            'f' | 'g' | 'e' => Verb::Float,
            other => Verb::Other(other),
        }
    }

    fn format(self, arg: &Value) -> Result<String, Error> {
        match self {
            Verb::Percent => Ok("%".to_string()),
            Verb::Value => Ok(value_to_string(arg)),
            Verb::Quoted => Ok(format!("{:?}", value_to_string(arg))),
            Verb::Integer => {
                let number = coerce_number(arg)?;
                Ok(format!("{}", number.trunc()))
            }
            Verb::Float => Ok(format!("{:.6}", coerce_number(arg)?)),
            Verb::Other(ch) => Ok(format!("%!{ch}({})", value_to_string(arg))),
        }
    }
}

fn builtin_printf(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    let (format, rest) = args
        .split_first()
        .ok_or_else(|| Error::render("printf expects format string", None))?;
    let format = format
        .as_str()
        .ok_or_else(|| Error::render("printf expects format string as first argument", None))?;

    let mut output = String::new();
    let mut operands = rest.iter();
    let mut chars = format.chars();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            output.push(ch);
            continue;
        }
        let verb = chars
            .next()
            .map(Verb::from_char)
            .ok_or_else(|| Error::render("incomplete format specifier", None))?;
        if verb == Verb::Percent {
            output.push('%');
            continue;
        }
        match operands.next() {
            Some(arg) => output.push_str(&verb.format(arg)?),
            None => output.push_str("%!(MISSING)"),
        }
    }
    let extra: Vec<String> = operands.map(value_to_string).collect();
    if !extra.is_empty() {
        output.push_str(&format!("%!(EXTRA {})", extra.join(", ")));
    }
    Ok(Value::String(output))
}

fn escape_with(args: &[Value], name: &str, escape: fn(&str) -> String) -> Result<Value, Error> {
    if args.is_empty() {
        return Err(Error::render(format!("{name} expects an argument"), None));
    }
    let text: String = args.iter().map(value_to_string).collect();
    Ok(Value::String(escape(&text)))
}

fn escape_html(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '"' => output.push_str("&#34;"),
            '\'' => output.push_str("&#39;"),
            '\0' => output.push('\u{FFFD}'),
            _ => output.push(ch),
        }
    }
    output
}

fn escape_js(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '\\' => output.push_str("\\\\"),
            '\'' => output.push_str("\\'"),
            '"' => output.push_str("\\\""),
            '<' => output.push_str("\\u003C"),
            '>' => output.push_str("\\u003E"),
            '&' => output.push_str("\\u0026"),
            '=' => output.push_str("\\u003D"),
            '\n' => output.push_str("\\n"),
            '\r' => output.push_str("\\r"),
            '\t' => output.push_str("\\t"),
            c if c.is_control() => output.push_str(&format!("\\u{:04X}", c as u32)),
            c => output.push(c),
        }
    }
    output
}

fn escape_urlquery(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                output.push(char::from(byte));
            }
            b' ' => output.push('+'),
            _ => output.push_str(&format!("%{byte:02X}")),
        }
    }
    output
}

/// `eq arg1 arg2 arg3...` is true when `arg1` equals any of the others.
fn builtin_eq(_ctx: &mut EvalContext, args: &[Value]) -> Result<Value, Error> {
    let (lhs, others) = args
        .split_first()
        .filter(|(_, others)| !others.is_empty())
        .ok_or_else(|| Error::render("eq expects at least two arguments", None))?;
    Ok(Value::Bool(others.iter().any(|rhs| values_equal(lhs, rhs))))
}

fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => lhs == rhs,
    }
}

fn order(args: &[Value], name: &str, accept: fn(Ordering) -> bool) -> Result<Value, Error> {
    let [lhs, rhs] = expect_two(name, args)?;
    let ordering = match (lhs, rhs) {
        (Value::Number(_), Value::Number(_)) => coerce_number(lhs)?
            .partial_cmp(&coerce_number(rhs)?)
            .ok_or_else(|| Error::render("incomparable numbers", None))?,
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => {
            return Err(Error::render(
                format!("{name}: incompatible types for comparison"),
                None,
            ));
        }
    };
    Ok(Value::Bool(accept(ordering)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MissingKey, Template};
    use serde_json::json;

    fn render(source: &str, data: Value) -> Result<String, Error> {
        Template::parse_with_functions("builtins", source, text_template_functions())?
            .render(&data)
    }

    #[test]
    fn html_escapes_markup() {
        let out = render(r#"{{html "<b>\"Bob\"</b>"}}"#, json!({})).unwrap();
        assert_eq!(out, "&lt;b&gt;&#34;Bob&#34;&lt;/b&gt;");
    }

    #[test]
    fn js_escapes_tags() {
        let out = render(r#"{{js "</script>"}}"#, json!({})).unwrap();
        assert_eq!(out, "\\u003C/script\\u003E");
    }

    #[test]
    fn urlquery_encodes_spaces_as_plus() {
        let out = render(r#"{{urlquery "Hello, world!"}}"#, json!({})).unwrap();
        assert_eq!(out, "Hello%2C+world%21");
    }

    #[test]
    fn print_separates_non_string_operands() {
        assert_eq!(render(r#"{{print "a" 1 2 "b"}}"#, json!({})).unwrap(), "a1 2b");
        assert_eq!(render(r#"{{println "a" 1}}"#, json!({})).unwrap(), "a 1\n");
    }

    #[test]
    fn printf_formats_verbs() {
        let out = render(r#"{{printf "%s=%d (%q) 100%%" .k .v .k}}"#, json!({"k": "port", "v": 80}))
            .unwrap();
        assert_eq!(out, "port=80 (\"port\") 100%");
    }

    #[test]
    fn printf_reports_missing_operands() {
        let out = render(r#"{{printf "%s-%s" "a"}}"#, json!({})).unwrap();
        assert_eq!(out, "a-%!(MISSING)");
    }

    #[test]
    fn index_and_len_walk_containers() {
        let data = json!({"hosts": ["a", "b", "c"], "m": {"k": "v"}});
        assert_eq!(render("{{index .hosts 1}}", data.clone()).unwrap(), "b");
        assert_eq!(render(r#"{{index .m "k"}}"#, data.clone()).unwrap(), "v");
        assert_eq!(render("{{len .hosts}}", data.clone()).unwrap(), "3");
        assert!(render("{{index .hosts 7}}", data).is_err());
    }

    #[test]
    fn slice_subsets_strings_and_arrays() {
        assert_eq!(
            render("{{slice .word 1 3}}", json!({"word": "rustacean"})).unwrap(),
            "us"
        );
        assert_eq!(
            render("{{len (slice .xs 1)}}", json!({"xs": [1, 2, 3]})).unwrap(),
            "2"
        );
    }

    #[test]
    fn comparisons_follow_go_rules() {
        assert_eq!(render("{{eq 1 2 1}}", json!({})).unwrap(), "true");
        assert_eq!(render("{{ne 1 1}}", json!({})).unwrap(), "false");
        assert_eq!(render(r#"{{lt "a" "b"}}"#, json!({})).unwrap(), "true");
        assert_eq!(render("{{ge 2 2.0}}", json!({})).unwrap(), "true");
        assert!(render(r#"{{lt 1 "b"}}"#, json!({})).is_err());
    }

    #[test]
    fn and_or_return_deciding_operand() {
        assert_eq!(render(r#"{{and 1 "" 3}}"#, json!({})).unwrap(), "");
        assert_eq!(render(r#"{{or "" "x"}}"#, json!({})).unwrap(), "x");
        assert_eq!(render("{{not .flag}}", json!({"flag": false})).unwrap(), "true");
    }

    #[test]
    fn call_invokes_registered_function() {
        let mut builder = FunctionRegistryBuilder::new();
        install_text_template_functions(&mut builder);
        builder.register("greet", |_ctx, args| {
            let name = args.first().and_then(Value::as_str).unwrap_or("friend");
            Ok(Value::String(format!("Hello, {name}!")))
        });
        let tmpl =
            Template::parse_with_functions("call", r#"{{call "greet" "Rust"}}"#, builder.build())
                .unwrap();
        assert_eq!(tmpl.render(&json!({})).unwrap(), "Hello, Rust!");
    }

    #[test]
    fn function_over_missing_field_is_not_sentinel() {
        let tmpl = Template::parse_with_functions(
            "len-missing",
            "{{ print .absent }}",
            text_template_functions(),
        )
        .unwrap();
        let out = tmpl.render_with(&json!({}), MissingKey::Default).unwrap();
        assert_eq!(out, "");
    }
}
