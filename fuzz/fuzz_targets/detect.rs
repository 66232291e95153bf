#![no_main]

use libfuzzer_sys::fuzz_target;
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use tpl_core::{detect, scan_references, Detection};
use tpl_engine::{text_template_functions, FunctionRegistry, Template};

static REGISTRY: Lazy<FunctionRegistry> = Lazy::new(text_template_functions);
static DATA: Lazy<Value> = Lazy::new(|| json!({"a": {"b": 1, "list": ["x", "y"]}, "name": "fuzz"}));

fuzz_target!(|data: &[u8]| {
    let Ok(source) = std::str::from_utf8(data) else {
        return;
    };
    let _ = scan_references(source);
    let Ok(template) = Template::parse_with_functions("fuzz-detect", source, REGISTRY.clone())
    else {
        return;
    };
    if let Ok(Detection::Unresolved(lines)) = detect(&template, &DATA) {
        assert_eq!(lines.len(), source.lines().count());
    }
});
