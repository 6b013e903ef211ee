use crate::language::{named_children, node_text};
use crate::lit::{camel_to_snake, parse_float_literal, parse_int_literal, unquote, Lit};
use std::collections::HashMap;
use tree_sitter::Node;

/// Constant lookups deeper than this are treated as unresolvable.
const MAX_EVAL_DEPTH: usize = 24;

const NANOSECOND: i128 = 1;
const MICROSECOND: i128 = 1_000;
const MILLISECOND: i128 = 1_000_000;
const SECOND: i128 = 1_000_000_000;
const MINUTE: i128 = 60 * SECOND;
const HOUR: i128 = 60 * MINUTE;

/// Owned Go expression, detached from the syntax tree.
#[derive(Debug, Clone, PartialEq)]
pub enum GoExpr {
    Int(i128),
    Float(f64),
    Str(String),
    Bool(bool),
    Nil,
    Ident(String),
    Selector(Box<GoExpr>, String),
    Composite {
        type_name: Option<String>,
        is_slice: bool,
        elements: Vec<(Option<String>, GoExpr)>,
    },
    Binary {
        op: String,
        left: Box<GoExpr>,
        right: Box<GoExpr>,
    },
    Unary {
        op: String,
        operand: Box<GoExpr>,
    },
    Call {
        function: Box<GoExpr>,
        args: Vec<GoExpr>,
    },
    Unknown(String),
}

impl GoExpr {
    pub fn lower(source: &str, node: Node<'_>) -> GoExpr {
        let text = node_text(source, node);
        match node.kind() {
            "int_literal" => parse_int_literal(text).map_or_else(|| GoExpr::Unknown(text.into()), GoExpr::Int),
            "float_literal" => {
                parse_float_literal(text).map_or_else(|| GoExpr::Unknown(text.into()), GoExpr::Float)
            }
            "interpreted_string_literal" | "raw_string_literal" => GoExpr::Str(unquote(text)),
            "true" => GoExpr::Bool(true),
            "false" => GoExpr::Bool(false),
            "nil" => GoExpr::Nil,
            "identifier" | "field_identifier" | "type_identifier" | "package_identifier" => {
                GoExpr::Ident(text.to_string())
            }
            "selector_expression" => {
                match (node.child_by_field_name("operand"), node.child_by_field_name("field")) {
                    (Some(operand), Some(field)) => GoExpr::Selector(
                        Box::new(GoExpr::lower(source, operand)),
                        node_text(source, field).to_string(),
                    ),
                    _ => GoExpr::Unknown(text.into()),
                }
            }
            "qualified_type" => {
                match (node.child_by_field_name("package"), node.child_by_field_name("name")) {
                    (Some(pkg), Some(name)) => GoExpr::Selector(
                        Box::new(GoExpr::Ident(node_text(source, pkg).to_string())),
                        node_text(source, name).to_string(),
                    ),
                    _ => GoExpr::Unknown(text.into()),
                }
            }
            "parenthesized_expression" | "literal_element" | "expression_list" | "element" => {
                named_children(node)
                    .into_iter()
                    .find(|c| c.kind() != "comment")
                    .map_or_else(|| GoExpr::Unknown(text.into()), |inner| GoExpr::lower(source, inner))
            }
            "binary_expression" => {
                let left = node.child_by_field_name("left");
                let right = node.child_by_field_name("right");
                let op = node.child_by_field_name("operator");
                match (left, op, right) {
                    (Some(l), Some(op), Some(r)) => GoExpr::Binary {
                        op: node_text(source, op).to_string(),
                        left: Box::new(GoExpr::lower(source, l)),
                        right: Box::new(GoExpr::lower(source, r)),
                    },
                    _ => GoExpr::Unknown(text.into()),
                }
            }
            "unary_expression" => {
                match (node.child_by_field_name("operator"), node.child_by_field_name("operand")) {
                    (Some(op), Some(operand)) => GoExpr::Unary {
                        op: node_text(source, op).to_string(),
                        operand: Box::new(GoExpr::lower(source, operand)),
                    },
                    _ => GoExpr::Unknown(text.into()),
                }
            }
            "call_expression" => {
                let Some(function) = node.child_by_field_name("function") else {
                    return GoExpr::Unknown(text.into());
                };
                let args = node
                    .child_by_field_name("arguments")
                    .map(|list| {
                        named_children(list)
                            .into_iter()
                            .filter(|c| c.kind() != "comment")
                            .map(|c| GoExpr::lower(source, c))
                            .collect()
                    })
                    .unwrap_or_default();
                GoExpr::Call {
                    function: Box::new(GoExpr::lower(source, function)),
                    args,
                }
            }
            "type_conversion_expression" => {
                match (node.child_by_field_name("type"), node.child_by_field_name("operand")) {
                    (Some(ty), Some(operand)) => GoExpr::Call {
                        function: Box::new(GoExpr::Ident(node_text(source, ty).to_string())),
                        args: vec![GoExpr::lower(source, operand)],
                    },
                    _ => GoExpr::Unknown(text.into()),
                }
            }
            "composite_literal" => {
                let ty = node.child_by_field_name("type");
                let (type_name, is_slice) = match ty {
                    Some(ty) => composite_type(source, ty),
                    None => (None, false),
                };
                let elements = node
                    .child_by_field_name("body")
                    .map(|body| lower_elements(source, body))
                    .unwrap_or_default();
                GoExpr::Composite {
                    type_name,
                    is_slice,
                    elements,
                }
            }
            "literal_value" => GoExpr::Composite {
                type_name: None,
                is_slice: false,
                elements: lower_elements(source, node),
            },
            _ => GoExpr::Unknown(text.into()),
        }
    }

    /// Last path segment of an identifier or selector, e.g. `SetGlobalSysVar`.
    pub fn tail_name(&self) -> Option<&str> {
        match self {
            GoExpr::Ident(name) => Some(name),
            GoExpr::Selector(_, name) => Some(name),
            _ => None,
        }
    }

    /// `&recv.Field` (or `recv.Field`) with the given receiver name.
    pub fn receiver_field(&self, receiver: &str) -> Option<&str> {
        let target = match self {
            GoExpr::Unary { op, operand } if op == "&" => operand.as_ref(),
            other => other,
        };
        match target {
            GoExpr::Selector(base, field) if matches!(base.as_ref(), GoExpr::Ident(r) if r == receiver) => {
                Some(field)
            }
            _ => None,
        }
    }
}

/// Name of a composite literal's type, stripped of package qualifiers.
fn composite_type(source: &str, ty: Node<'_>) -> (Option<String>, bool) {
    match ty.kind() {
        "type_identifier" => (Some(node_text(source, ty).to_string()), false),
        "qualified_type" => (
            ty.child_by_field_name("name")
                .map(|n| node_text(source, n).to_string()),
            false,
        ),
        "slice_type" | "array_type" | "implicit_length_array_type" => {
            let element = ty
                .child_by_field_name("element")
                .map(|e| node_text(source, e).trim_start_matches('*').to_string());
            (element, true)
        }
        "generic_type" => (
            ty.child_by_field_name("type")
                .map(|n| node_text(source, n).to_string()),
            false,
        ),
        _ => (None, false),
    }
}

fn lower_elements(source: &str, body: Node<'_>) -> Vec<(Option<String>, GoExpr)> {
    let mut out = Vec::new();
    for child in named_children(body) {
        match child.kind() {
            "keyed_element" => {
                let parts: Vec<Node<'_>> = named_children(child)
                    .into_iter()
                    .filter(|c| c.kind() != "comment")
                    .collect();
                if let [key, value, ..] = parts.as_slice() {
                    let key_text = node_text(source, *key).trim().to_string();
                    out.push((Some(key_text), GoExpr::lower(source, *value)));
                }
            }
            "comment" => {}
            _ => out.push((None, GoExpr::lower(source, child))),
        }
    }
    out
}

/// Constants and variables visible to the evaluator, keyed by bare name.
#[derive(Debug, Default, Clone)]
pub struct GoScope {
    values: HashMap<String, GoExpr>,
}

impl GoScope {
    /// First declaration of a name wins.
    pub fn declare(&mut self, name: impl Into<String>, expr: GoExpr) {
        self.values.entry(name.into()).or_insert(expr);
    }

    pub fn get(&self, name: &str) -> Option<&GoExpr> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn eval_name(&self, name: &str) -> Option<Lit> {
        self.get(name).and_then(|expr| self.eval_depth(expr, 0))
    }

    pub fn eval(&self, expr: &GoExpr) -> Option<Lit> {
        self.eval_depth(expr, 0)
    }

    /// A system variable name: a string constant, or a `vardef.TiDBXxx` style
    /// reference resolved through the constant map with a snake-case fallback.
    pub fn resolve_name(&self, expr: &GoExpr) -> Option<String> {
        if let Some(Lit::Str(s)) = self.eval(expr) {
            return Some(s);
        }
        match expr {
            GoExpr::Selector(_, name) | GoExpr::Ident(name)
                if name.starts_with(|c: char| c.is_ascii_uppercase()) =>
            {
                Some(camel_to_snake(name))
            }
            _ => None,
        }
    }

    fn eval_depth(&self, expr: &GoExpr, depth: usize) -> Option<Lit> {
        if depth > MAX_EVAL_DEPTH {
            return None;
        }
        let next = depth + 1;
        match expr {
            GoExpr::Int(i) => Some(Lit::Int(*i)),
            GoExpr::Float(f) => Some(Lit::Float(*f)),
            GoExpr::Str(s) => Some(Lit::Str(s.clone())),
            GoExpr::Bool(b) => Some(Lit::Bool(*b)),
            GoExpr::Nil | GoExpr::Unknown(_) => None,
            GoExpr::Ident(name) => self.eval_ident(name, next),
            GoExpr::Selector(base, name) => {
                let package = match base.as_ref() {
                    GoExpr::Ident(pkg) => pkg.as_str(),
                    _ => return None,
                };
                well_known(package, name).or_else(|| self.eval_ident(name, next))
            }
            GoExpr::Unary { op, operand } => {
                let value = self.eval_depth(operand, next)?;
                match op.as_str() {
                    "-" => value.negate(),
                    "!" => value.not(),
                    "+" | "&" | "*" => Some(value),
                    _ => None,
                }
            }
            GoExpr::Binary { op, left, right } => {
                let l = self.eval_depth(left, next)?;
                let r = self.eval_depth(right, next)?;
                Lit::binary(op, l, r)
            }
            GoExpr::Call { function, args } => self.eval_call(function, args, next),
            GoExpr::Composite {
                is_slice: true,
                elements,
                ..
            } => elements
                .iter()
                .map(|(_, e)| self.eval_depth(e, next))
                .collect::<Option<Vec<_>>>()
                .map(Lit::List),
            GoExpr::Composite { .. } => None,
        }
    }

    fn eval_ident(&self, name: &str, depth: usize) -> Option<Lit> {
        match name {
            "true" => return Some(Lit::Bool(true)),
            "false" => return Some(Lit::Bool(false)),
            _ => {}
        }
        match self.get(name) {
            Some(expr) => self.eval_depth(expr, depth),
            None => match name {
                "On" => Some(Lit::Str("ON".into())),
                "Off" => Some(Lit::Str("OFF".into())),
                _ => None,
            },
        }
    }

    fn eval_call(&self, function: &GoExpr, args: &[GoExpr], depth: usize) -> Option<Lit> {
        let name = function.tail_name()?;
        let first = || args.first().and_then(|a| self.eval_depth(a, depth));
        match name {
            "Duration" | "NewDuration" => match first()? {
                Lit::Int(n) => Some(Lit::Duration(n)),
                Lit::Float(f) => Some(Lit::Duration(f as i128)),
                d @ Lit::Duration(_) => Some(d),
                _ => None,
            },
            "ByteSize" => first()?.as_int().map(Lit::Int),
            "BoolToOnOff" => match first()? {
                Lit::Bool(b) => Some(Lit::Str(if b { "ON" } else { "OFF" }.into())),
                _ => None,
            },
            "Itoa" | "FormatInt" | "FormatUint" => first()?.as_int().map(|i| Lit::Str(i.to_string())),
            "FormatFloat" => first()?.as_float().map(|f| Lit::Str(f.to_string())),
            "int" | "int8" | "int16" | "int32" | "int64" | "uint" | "uint8" | "uint16"
            | "uint32" | "uint64" | "uintptr" => first()?.as_int().map(Lit::Int),
            "float32" | "float64" => first()?.as_float().map(Lit::Float),
            "string" => match first()? {
                s @ Lit::Str(_) => Some(s),
                _ => None,
            },
            _ => None,
        }
    }
}

fn well_known(package: &str, name: &str) -> Option<Lit> {
    match (package, name) {
        ("time", "Nanosecond") => Some(Lit::Duration(NANOSECOND)),
        ("time", "Microsecond") => Some(Lit::Duration(MICROSECOND)),
        ("time", "Millisecond") => Some(Lit::Duration(MILLISECOND)),
        ("time", "Second") => Some(Lit::Duration(SECOND)),
        ("time", "Minute") => Some(Lit::Duration(MINUTE)),
        ("time", "Hour") => Some(Lit::Duration(HOUR)),
        ("math", "MaxInt64") => Some(Lit::Int(i64::MAX as i128)),
        ("math", "MaxInt32") => Some(Lit::Int(i32::MAX as i128)),
        ("math", "MaxUint32") => Some(Lit::Int(u32::MAX as i128)),
        ("math", "MaxUint64") => Some(Lit::Int(u64::MAX as i128)),
        ("math", "MaxInt") => Some(Lit::Int(i64::MAX as i128)),
        ("units", "KiB") => Some(Lit::Int(1 << 10)),
        ("units", "MiB") => Some(Lit::Int(1 << 20)),
        ("units", "GiB") => Some(Lit::Int(1 << 30)),
        ("units", "TiB") => Some(Lit::Int(1 << 40)),
        _ => None,
    }
}
