use super::expr::GoExpr;
use super::index::{GoIndex, SysVarDecl};
use crate::lit::Lit;
use precheck_model::{parse_bool_word, DurationValue, Value};
use std::collections::BTreeMap;

/// Nested configuration sections deeper than this are ignored.
const MAX_DEPTH: usize = 8;

/// Walk `root_type` and emit every field with a resolvable default under its
/// dotted serialized name.
pub fn flatten_config(index: &GoIndex, root_type: &str) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    walk(index, root_type, "", 0, &mut out);
    out
}

fn walk(index: &GoIndex, type_name: &str, prefix: &str, depth: usize, out: &mut BTreeMap<String, Value>) {
    if depth > MAX_DEPTH {
        return;
    }
    let Some(st) = index.structs.get(type_name) else {
        return;
    };
    for field in &st.fields {
        let nested = !field.is_collection() && index.structs.contains_key(field.base_type());
        let Some(go_name) = field.name.as_deref() else {
            // Embedded struct: its fields are promoted to this level.
            if nested {
                walk(index, field.base_type(), prefix, depth + 1, out);
            }
            continue;
        };
        let Some(key) = field.key() else {
            continue;
        };
        let name = if prefix.is_empty() {
            key
        } else {
            format!("{prefix}.{key}")
        };

        if nested {
            walk(index, field.base_type(), &name, depth + 1, out);
            continue;
        }
        let Some(expr) = index.default_for(type_name, go_name) else {
            continue;
        };
        if let Some(value) = evaluate_field(index, expr, &field.type_text) {
            out.insert(name, value);
        }
    }
}

fn evaluate_field(index: &GoIndex, expr: &GoExpr, declared: &str) -> Option<Value> {
    let lit = index.scope.eval(expr)?;
    let declared = declared.trim_start_matches('*');
    let lit = match lit {
        Lit::Int(n) if declared.ends_with("Duration") => Lit::Duration(n),
        Lit::Int(n) if declared.starts_with("float") => Lit::Float(n as f64),
        other => other,
    };
    lit.into_value()
}

/// Typed system variable defaults; values in Go are strings typed by `Type:`.
pub fn extract_sysvars(index: &GoIndex) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    for decl in &index.sysvars {
        let Some((name, value)) = evaluate_sysvar(index, decl) else {
            continue;
        };
        out.entry(name).or_insert(value);
    }
    out
}

fn evaluate_sysvar(index: &GoIndex, decl: &SysVarDecl) -> Option<(String, Value)> {
    let name = index.scope.resolve_name(&decl.name)?.to_ascii_lowercase();
    if name.is_empty() {
        return None;
    }
    let text = match index.scope.eval(&decl.value)? {
        Lit::Bool(b) if decl.type_hint.as_deref() == Some("TypeBool") => {
            return Some((name, Value::Bool(b)));
        }
        other => other.text(),
    };
    Some((name, typed_sysvar_value(decl.type_hint.as_deref(), text)))
}

fn typed_sysvar_value(type_hint: Option<&str>, text: String) -> Value {
    let typed = match type_hint {
        Some("TypeBool") => parse_bool_word(&text).map(Value::Bool),
        Some("TypeInt") | Some("TypeUnsigned") => text.trim().parse().ok().map(Value::Int),
        Some("TypeFloat") => text.trim().parse().ok().map(Value::Float),
        Some("TypeDuration") => DurationValue::parse(&text).ok().map(Value::Duration),
        _ => None,
    };
    typed.unwrap_or(Value::String(text))
}

/// `currentBootstrapVersion`, declared as a literal or through `versionNNN` constants.
pub fn bootstrap_version(index: &GoIndex) -> Option<i64> {
    index
        .scope
        .eval_name("currentBootstrapVersion")
        .and_then(|lit| lit.as_int())
        .and_then(|v| i64::try_from(v).ok())
}
