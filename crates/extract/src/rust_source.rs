//! Static extraction from Rust sources (TiKV).

use crate::error::{ExtractError, Result};
use crate::language::{named_children, node_text, visit, ParsedFile, SourceLanguage};
use crate::layout::SourceLayout;
use crate::lit::{format_readable_size, kebab_case, parse_float_literal, parse_int_literal, unquote, Lit};
use crate::strategy::ExtractedDefaults;
use once_cell::sync::Lazy;
use precheck_model::{ExtractionMethod, Value};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tree_sitter::Node;

const MAX_DEPTH: usize = 8;
const MAX_EVAL_DEPTH: usize = 16;

static RENAME_ALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"rename_all\s*=\s*"([^"]+)""#).expect("valid regex"));
static RENAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[^_]rename\s*=\s*"([^"]+)""#).expect("valid regex"));
static SKIP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bskip(_serializing|_deserializing)?\b\s*[,)]").expect("valid regex"));

/// Owned Rust expression, detached from the syntax tree.
#[derive(Debug, Clone, PartialEq)]
pub enum RustExpr {
    Int(i128),
    Float(f64),
    Str(String),
    Bool(bool),
    Path(Vec<String>),
    Call { path: Vec<String>, args: Vec<RustExpr> },
    Method { receiver: Box<RustExpr>, method: String, args: Vec<RustExpr> },
    Macro { name: String, strings: Vec<String> },
    Struct { name: String, fields: Vec<(String, RustExpr)> },
    Binary { op: String, left: Box<RustExpr>, right: Box<RustExpr> },
    Neg(Box<RustExpr>),
    Unknown,
}

impl RustExpr {
    pub fn lower(source: &str, node: Node<'_>) -> RustExpr {
        let text = node_text(source, node);
        match node.kind() {
            "integer_literal" => parse_int_literal(text).map_or(RustExpr::Unknown, RustExpr::Int),
            "float_literal" => parse_float_literal(text).map_or(RustExpr::Unknown, RustExpr::Float),
            "string_literal" => RustExpr::Str(unquote(text)),
            "raw_string_literal" => {
                let inner = text.trim_start_matches('r').trim_matches('#');
                RustExpr::Str(inner.trim_matches('"').to_string())
            }
            "boolean_literal" => RustExpr::Bool(text == "true"),
            "identifier" | "scoped_identifier" | "self" => RustExpr::Path(split_path(text)),
            "parenthesized_expression" | "reference_expression" | "type_cast_expression" => {
                let inner = node
                    .child_by_field_name("value")
                    .or_else(|| named_children(node).into_iter().next());
                inner.map_or(RustExpr::Unknown, |n| RustExpr::lower(source, n))
            }
            "unary_expression" => {
                let operand = named_children(node).into_iter().next();
                match operand {
                    Some(o) if text.trim_start().starts_with('-') => {
                        RustExpr::Neg(Box::new(RustExpr::lower(source, o)))
                    }
                    _ => RustExpr::Unknown,
                }
            }
            "binary_expression" => {
                let left = node.child_by_field_name("left");
                let right = node.child_by_field_name("right");
                let op = node.child_by_field_name("operator");
                match (left, op, right) {
                    (Some(l), Some(op), Some(r)) => RustExpr::Binary {
                        op: node_text(source, op).to_string(),
                        left: Box::new(RustExpr::lower(source, l)),
                        right: Box::new(RustExpr::lower(source, r)),
                    },
                    _ => RustExpr::Unknown,
                }
            }
            "call_expression" => {
                let args: Vec<RustExpr> = node
                    .child_by_field_name("arguments")
                    .map(|a| {
                        named_children(a)
                            .into_iter()
                            .filter(|c| !c.kind().ends_with("comment"))
                            .map(|c| RustExpr::lower(source, c))
                            .collect()
                    })
                    .unwrap_or_default();
                let Some(function) = node.child_by_field_name("function") else {
                    return RustExpr::Unknown;
                };
                match function.kind() {
                    "field_expression" => {
                        match (function.child_by_field_name("value"), function.child_by_field_name("field")) {
                            (Some(receiver), Some(method)) => RustExpr::Method {
                                receiver: Box::new(RustExpr::lower(source, receiver)),
                                method: node_text(source, method).to_string(),
                                args,
                            },
                            _ => RustExpr::Unknown,
                        }
                    }
                    "identifier" | "scoped_identifier" | "generic_function" => RustExpr::Call {
                        path: split_path(node_text(source, function)),
                        args,
                    },
                    _ => RustExpr::Unknown,
                }
            }
            "macro_invocation" => {
                let name = node
                    .child_by_field_name("macro")
                    .map(|m| node_text(source, m).to_string())
                    .unwrap_or_default();
                let mut strings = Vec::new();
                visit(node, &mut |n| {
                    if n.kind() == "string_literal" {
                        strings.push(unquote(node_text(source, n)));
                    }
                });
                RustExpr::Macro { name, strings }
            }
            "struct_expression" => {
                let name = node
                    .child_by_field_name("name")
                    .map(|n| node_text(source, n).to_string())
                    .unwrap_or_default();
                let fields = node
                    .child_by_field_name("body")
                    .map(|body| lower_initializers(source, body))
                    .unwrap_or_default();
                RustExpr::Struct { name, fields }
            }
            _ => RustExpr::Unknown,
        }
    }
}

fn split_path(text: &str) -> Vec<String> {
    text.split("::")
        .map(|s| s.trim().split('<').next().unwrap_or("").to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn lower_initializers(source: &str, body: Node<'_>) -> Vec<(String, RustExpr)> {
    let mut out = Vec::new();
    for child in named_children(body) {
        match child.kind() {
            "field_initializer" => {
                let (Some(field), Some(value)) = (child.child_by_field_name("field"), child.child_by_field_name("value")) else {
                    continue;
                };
                out.push((node_text(source, field).to_string(), RustExpr::lower(source, value)));
            }
            "shorthand_field_initializer" => {
                let name = node_text(source, child).to_string();
                out.push((name.clone(), RustExpr::Path(vec![name])));
            }
            _ => {}
        }
    }
    out
}

#[derive(Debug, Clone)]
struct RustField {
    name: String,
    type_text: String,
    rename: Option<String>,
    skip: bool,
    flatten: bool,
}

#[derive(Debug, Clone)]
struct RustStruct {
    file: usize,
    rename_all: Option<String>,
    derives_default: bool,
    fields: Vec<RustField>,
}

impl RustStruct {
    fn key_for(&self, field: &RustField) -> String {
        if let Some(rename) = &field.rename {
            return rename.clone();
        }
        match self.rename_all.as_deref() {
            Some("kebab-case") => field.name.replace('_', "-"),
            Some("lowercase") => field.name.to_ascii_lowercase(),
            Some("camelCase") => camel_case(&field.name),
            _ => field.name.clone(),
        }
    }
}

fn camel_case(snake: &str) -> String {
    let mut out = String::with_capacity(snake.len());
    let mut upper = false;
    for c in snake.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.push(c.to_ascii_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Struct shapes, `impl Default` bodies, constants and `use` aliases of a crate tree.
#[derive(Debug, Default)]
pub struct RustIndex {
    files: Vec<std::path::PathBuf>,
    structs: Vec<RustStruct>,
    by_name: HashMap<String, Vec<usize>>,
    /// per file: alias -> full path segments
    uses: Vec<HashMap<String, Vec<String>>>,
    consts: HashMap<String, RustExpr>,
    /// struct index -> field initializers of its `Default` impl
    defaults: HashMap<usize, Vec<(String, RustExpr)>>,
}

impl RustIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn struct_count(&self) -> usize {
        self.structs.len()
    }

    pub fn add_file(&mut self, file: &ParsedFile) {
        let file_idx = self.files.len();
        self.files.push(file.path.clone());
        self.uses.push(HashMap::new());
        let mut impls = Vec::new();
        self.scan_items(file, file_idx, file.tree.root_node(), &mut impls);
        for (type_name, fields) in impls {
            if let Some(idx) = self.lookup_in_file(&type_name, file_idx) {
                self.defaults.entry(idx).or_insert(fields);
            }
        }
    }

    fn scan_items(
        &mut self,
        file: &ParsedFile,
        file_idx: usize,
        container: Node<'_>,
        impls: &mut Vec<(String, Vec<(String, RustExpr)>)>,
    ) {
        let mut attrs: Vec<String> = Vec::new();
        for item in named_children(container) {
            match item.kind() {
                "attribute_item" => {
                    attrs.push(file.text(item).to_string());
                    continue;
                }
                "line_comment" | "block_comment" => continue,
                "struct_item" => self.add_struct(file, file_idx, item, &attrs),
                "impl_item" => {
                    if let Some(found) = default_impl(file, item) {
                        impls.push(found);
                    }
                }
                "const_item" | "static_item" => {
                    if let (Some(name), Some(value)) = (item.child_by_field_name("name"), item.child_by_field_name("value")) {
                        self.consts
                            .entry(file.text(name).to_string())
                            .or_insert_with(|| RustExpr::lower(&file.source, value));
                    }
                }
                "use_declaration" => {
                    if let Some(arg) = item.child_by_field_name("argument") {
                        let mut aliases = HashMap::new();
                        collect_use(file, arg, &[], &mut aliases);
                        self.uses[file_idx].extend(aliases);
                    }
                }
                "mod_item" => {
                    let is_test = attrs.iter().any(|a| a.contains("cfg(test)"));
                    if let (false, Some(body)) = (is_test, item.child_by_field_name("body")) {
                        self.scan_items(file, file_idx, body, impls);
                    }
                }
                _ => {}
            }
            attrs.clear();
        }
    }

    fn add_struct(&mut self, file: &ParsedFile, file_idx: usize, item: Node<'_>, attrs: &[String]) {
        let (Some(name), Some(body)) = (item.child_by_field_name("name"), item.child_by_field_name("body")) else {
            return;
        };
        if body.kind() != "field_declaration_list" {
            return;
        }
        let rename_all = attrs
            .iter()
            .find_map(|a| RENAME_ALL.captures(a).map(|c| c[1].to_string()));
        let derives_default = attrs
            .iter()
            .any(|a| a.contains("derive") && a.contains("Default"));

        let mut fields = Vec::new();
        let mut field_attrs: Vec<String> = Vec::new();
        for child in named_children(body) {
            match child.kind() {
                "attribute_item" => field_attrs.push(file.text(child).to_string()),
                "field_declaration" => {
                    let (Some(fname), Some(ftype)) = (child.child_by_field_name("name"), child.child_by_field_name("type")) else {
                        field_attrs.clear();
                        continue;
                    };
                    let serde_attrs: Vec<&String> = field_attrs.iter().filter(|a| a.contains("serde")).collect();
                    fields.push(RustField {
                        name: file.text(fname).to_string(),
                        type_text: file.text(ftype).to_string(),
                        rename: serde_attrs
                            .iter()
                            .find_map(|a| RENAME.captures(a).map(|c| c[1].to_string())),
                        skip: serde_attrs.iter().any(|a| SKIP.is_match(a)),
                        flatten: serde_attrs.iter().any(|a| a.contains("flatten")),
                    });
                    field_attrs.clear();
                }
                _ => {}
            }
        }

        let idx = self.structs.len();
        let name = file.text(name).to_string();
        self.by_name.entry(name).or_default().push(idx);
        self.structs.push(RustStruct {
            file: file_idx,
            rename_all,
            derives_default,
            fields,
        });
    }

    fn lookup_in_file(&self, name: &str, file_idx: usize) -> Option<usize> {
        let candidates = self.by_name.get(name)?;
        candidates
            .iter()
            .copied()
            .find(|&i| self.structs[i].file == file_idx)
            .or_else(|| candidates.first().copied())
    }

    /// Resolve a field type as written in `file_idx` to a known struct.
    fn resolve_type(&self, type_text: &str, file_idx: usize) -> Option<usize> {
        let cleaned = type_text.trim().trim_start_matches('&');
        if cleaned.starts_with("Option<") || cleaned.starts_with("Vec<") || cleaned.contains("Map<") {
            return None;
        }
        let base = cleaned.split('<').next().unwrap_or(cleaned);
        let mut segments = split_path(base);
        let last = segments.pop()?;
        let (name, hints) = match self.uses.get(file_idx).and_then(|u| u.get(&last)) {
            Some(full) if segments.is_empty() => {
                let mut full = full.clone();
                let name = full.pop()?;
                (name, full)
            }
            _ => (last, segments),
        };
        let candidates = self.by_name.get(&name)?;
        if candidates.len() == 1 {
            return candidates.first().copied();
        }
        let hints: Vec<&str> = hints
            .iter()
            .map(String::as_str)
            .filter(|h| !matches!(*h, "crate" | "self" | "super"))
            .collect();
        if hints.is_empty() {
            if let Some(same) = candidates.iter().copied().find(|&i| self.structs[i].file == file_idx) {
                return Some(same);
            }
        }
        candidates
            .iter()
            .copied()
            .max_by_key(|&i| {
                let path = &self.files[self.structs[i].file];
                let score = hints
                    .iter()
                    .filter(|h| path.components().any(|c| c.as_os_str() == **h))
                    .count();
                // Prefer the earliest candidate on ties.
                (score, std::cmp::Reverse(i))
            })
    }

    fn eval(&self, expr: &RustExpr, depth: usize) -> Option<Lit> {
        if depth > MAX_EVAL_DEPTH {
            return None;
        }
        let next = depth + 1;
        match expr {
            RustExpr::Int(i) => Some(Lit::Int(*i)),
            RustExpr::Float(f) => Some(Lit::Float(*f)),
            RustExpr::Str(s) => Some(Lit::Str(s.clone())),
            RustExpr::Bool(b) => Some(Lit::Bool(*b)),
            RustExpr::Neg(inner) => self.eval(inner, next)?.negate(),
            RustExpr::Binary { op, left, right } => {
                Lit::binary(op, self.eval(left, next)?, self.eval(right, next)?)
            }
            RustExpr::Path(path) => self.eval_path(path, next),
            RustExpr::Call { path, args } => self.eval_call(path, args, next),
            RustExpr::Method { receiver, method, .. } => match method.as_str() {
                "to_owned" | "to_string" | "into" | "clone" => self.eval(receiver, next),
                _ => None,
            },
            RustExpr::Macro { name, strings } if name == "vec" => Some(Lit::List(
                strings.iter().cloned().map(Lit::Str).collect(),
            )),
            RustExpr::Macro { .. } | RustExpr::Struct { .. } | RustExpr::Unknown => None,
        }
    }

    fn eval_path(&self, path: &[String], depth: usize) -> Option<Lit> {
        let last = path.last()?;
        if path.len() == 2 {
            match (path[0].as_str(), last.as_str()) {
                (ty, "MAX") => return int_max(ty),
                ("ReadableSize" | "ReadableDuration", "ZERO") => {
                    return Some(if path[0] == "ReadableSize" {
                        Lit::Str(format_readable_size(0))
                    } else {
                        Lit::Duration(0)
                    });
                }
                _ => {}
            }
        }
        if let Some(expr) = self.consts.get(last.as_str()) {
            return self.eval(expr, depth);
        }
        // Enum variant, serialized as kebab-case.
        if path.len() >= 2 && last.starts_with(|c: char| c.is_ascii_uppercase()) {
            return Some(Lit::Str(kebab_case(last)));
        }
        None
    }

    fn eval_call(&self, path: &[String], args: &[RustExpr], depth: usize) -> Option<Lit> {
        let first = || args.first().and_then(|a| self.eval(a, depth));
        let segs: Vec<&str> = path.iter().map(String::as_str).collect();
        let size = |mult: i128| -> Option<Lit> {
            let bytes = first()?.as_int()?.checked_mul(mult)?;
            u64::try_from(bytes).ok().map(|b| Lit::Str(format_readable_size(b)))
        };
        const KIB: i128 = 1024;
        match segs.as_slice() {
            [.., "ReadableSize", "b"] | [.., "ReadableSize"] => size(1),
            [.., "ReadableSize", "kb"] => size(KIB),
            [.., "ReadableSize", "mb"] => size(KIB * KIB),
            [.., "ReadableSize", "gb"] => size(KIB * KIB * KIB),
            [.., "ReadableSize", "tb"] => size(KIB * KIB * KIB * KIB),
            [.., "ReadableSize", "pb"] => size(KIB * KIB * KIB * KIB * KIB),
            [.., "ReadableDuration" | "Duration", unit] => {
                let scale: i128 = match *unit {
                    "nanos" | "from_nanos" => 1,
                    "micros" | "from_micros" => 1_000,
                    "millis" | "from_millis" => 1_000_000,
                    "secs" | "from_secs" => 1_000_000_000,
                    "minutes" | "from_mins" => 60_000_000_000,
                    "hours" | "from_hours" => 3_600_000_000_000,
                    "days" => 86_400_000_000_000,
                    _ => return None,
                };
                Some(Lit::Duration(first()?.as_int()?.checked_mul(scale)?))
            }
            [.., "ReadableDuration"] => match first()? {
                d @ Lit::Duration(_) => Some(d),
                _ => None,
            },
            ["Some"] | ["String", "from"] | [.., "from"] => first(),
            _ => None,
        }
    }

    /// Zero value `#[derive(Default)]` gives a field of this type.
    fn zero_value(type_text: &str) -> Option<Lit> {
        let t = type_text.trim();
        match t {
            "bool" => Some(Lit::Bool(false)),
            "u8" | "u16" | "u32" | "u64" | "usize" | "i8" | "i16" | "i32" | "i64" | "isize" => Some(Lit::Int(0)),
            "f32" | "f64" => Some(Lit::Float(0.0)),
            "String" => Some(Lit::Str(String::new())),
            "Vec<String>" => Some(Lit::List(Vec::new())),
            "ReadableSize" => Some(Lit::Str(format_readable_size(0))),
            "ReadableDuration" => Some(Lit::Duration(0)),
            _ => None,
        }
    }

    fn coerce(lit: Lit, type_text: &str) -> Lit {
        let t = type_text.trim();
        match lit {
            Lit::Int(n) if t == "f64" || t == "f32" => Lit::Float(n as f64),
            Lit::Int(n) if t == "ReadableSize" => u64::try_from(n)
                .map(|b| Lit::Str(format_readable_size(b)))
                .unwrap_or(Lit::Int(n)),
            other => other,
        }
    }

    /// Flatten the default configuration starting at the first root type found.
    pub fn flatten(&self, root_types: &[String]) -> BTreeMap<String, Value> {
        let mut out = BTreeMap::new();
        let root = root_types
            .iter()
            .find_map(|name| self.by_name.get(name).and_then(|c| c.first().copied()));
        if let Some(root) = root {
            self.walk(root, "", None, 0, &mut out);
        }
        out
    }

    fn walk(
        &self,
        idx: usize,
        prefix: &str,
        overrides: Option<&[(String, RustExpr)]>,
        depth: usize,
        out: &mut BTreeMap<String, Value>,
    ) {
        if depth > MAX_DEPTH {
            return;
        }
        let st = &self.structs[idx];
        let defaults = self.defaults.get(&idx);
        let init_for = |field: &str| -> Option<&RustExpr> {
            overrides
                .and_then(|o| o.iter().find(|(n, _)| n == field))
                .or_else(|| defaults.and_then(|d| d.iter().find(|(n, _)| n == field)))
                .map(|(_, e)| e)
        };

        for field in &st.fields {
            if field.skip {
                continue;
            }
            let child = self.resolve_type(&field.type_text, st.file);
            if field.flatten {
                if let Some(child) = child {
                    self.walk(child, prefix, None, depth + 1, out);
                }
                continue;
            }
            let key = st.key_for(field);
            let name = if prefix.is_empty() {
                key
            } else {
                format!("{prefix}.{key}")
            };
            let init = init_for(&field.name);

            if let Some(child) = child.filter(|&c| c != idx) {
                let nested = match init {
                    Some(RustExpr::Struct { fields, .. }) => Some(fields.as_slice()),
                    _ => None,
                };
                self.walk(child, &name, nested, depth + 1, out);
                continue;
            }

            let lit = match init {
                Some(expr) => self.eval(expr, 0),
                None if st.derives_default && defaults.is_none() => Self::zero_value(&field.type_text),
                None => None,
            };
            if let Some(value) = lit.map(|l| Self::coerce(l, &field.type_text)).and_then(Lit::into_value) {
                out.insert(name, value);
            }
        }
    }
}

fn int_max(ty: &str) -> Option<Lit> {
    let v: i128 = match ty {
        "u8" => u8::MAX as i128,
        "u16" => u16::MAX as i128,
        "u32" => u32::MAX as i128,
        "u64" | "usize" => u64::MAX as i128,
        "i32" => i32::MAX as i128,
        "i64" | "isize" => i64::MAX as i128,
        _ => return None,
    };
    Some(Lit::Int(v))
}

/// `impl Default for T { fn default() -> Self { T { .. } } }` → (T, initializers).
fn default_impl(file: &ParsedFile, item: Node<'_>) -> Option<(String, Vec<(String, RustExpr)>)> {
    let trait_name = file.text(item.child_by_field_name("trait")?);
    if trait_name != "Default" && !trait_name.ends_with("::Default") {
        return None;
    }
    let type_text = file.text(item.child_by_field_name("type")?);
    let type_name = split_path(type_text).pop()?;
    let body = item.child_by_field_name("body")?;
    let func = named_children(body).into_iter().find(|f| {
        f.kind() == "function_item"
            && f.child_by_field_name("name").map(|n| file.text(n)) == Some("default")
    })?;
    let mut found = None;
    visit(func, &mut |node| {
        if found.is_some() || node.kind() != "struct_expression" {
            return;
        }
        let name = node
            .child_by_field_name("name")
            .map(|n| file.text(n))
            .unwrap_or("");
        if name == "Self" || split_path(name).last().map(String::as_str) == Some(type_name.as_str()) {
            found = Some(node);
        }
    });
    let RustExpr::Struct { fields, .. } = RustExpr::lower(&file.source, found?) else {
        return None;
    };
    Some((type_name, fields))
}

fn collect_use(file: &ParsedFile, node: Node<'_>, prefix: &[String], out: &mut HashMap<String, Vec<String>>) {
    match node.kind() {
        "scoped_identifier" | "identifier" => {
            let mut full = prefix.to_vec();
            full.extend(split_path(file.text(node)));
            if let Some(alias) = full.last().cloned() {
                out.insert(alias, full);
            }
        }
        "use_as_clause" => {
            let (Some(path), Some(alias)) = (node.child_by_field_name("path"), node.child_by_field_name("alias")) else {
                return;
            };
            let mut full = prefix.to_vec();
            full.extend(split_path(file.text(path)));
            out.insert(file.text(alias).to_string(), full);
        }
        "scoped_use_list" => {
            let mut next = prefix.to_vec();
            if let Some(path) = node.child_by_field_name("path") {
                next.extend(split_path(file.text(path)));
            }
            if let Some(list) = node.child_by_field_name("list") {
                collect_use(file, list, &next, out);
            }
        }
        "use_list" => {
            for child in named_children(node) {
                collect_use(file, child, prefix, out);
            }
        }
        _ => {}
    }
}

/// Parse TiKV's configuration sources and flatten the root config's defaults.
pub fn extract_defaults(layout: &SourceLayout, root: &Path) -> Result<ExtractedDefaults> {
    let paths = layout.resolve_config_files(root);
    if paths.is_empty() {
        return Err(ExtractError::MissingSource {
            component: layout.component,
            what: "configuration",
            root: root.to_path_buf(),
        });
    }
    let mut parser = SourceLanguage::Rust.parser()?;
    let mut index = RustIndex::new();
    for path in &paths {
        let file = ParsedFile::read(&mut parser, path)?;
        index.add_file(&file);
    }
    let mut extracted = ExtractedDefaults::new(ExtractionMethod::SourceParse);
    extracted.config = index.flatten(&layout.root_config_types);
    log::debug!(
        "{}: {} config defaults from {} structs",
        layout.component,
        extracted.config.len(),
        index.struct_count()
    );
    Ok(extracted)
}
