use super::expr::{GoExpr, GoScope};
use crate::language::{named_children, visit, ParsedFile};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use tree_sitter::Node;

static TOML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r#"toml:"([^"]*)""#).expect("valid regex"));
static JSON_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r#"json:"([^"]*)""#).expect("valid regex"));

/// One field of a Go struct type
#[derive(Debug, Clone, PartialEq)]
pub struct GoField {
    /// `None` for an embedded field.
    pub name: Option<String>,
    pub type_text: String,
    pub tag: Option<String>,
}

impl GoField {
    /// Serialized key: the `toml` tag, then the `json` tag, then the Go name.
    /// `None` when the field is excluded with `"-"`.
    pub fn key(&self) -> Option<String> {
        let from_tag = self.tag.as_deref().and_then(|tag| {
            TOML_TAG
                .captures(tag)
                .or_else(|| JSON_TAG.captures(tag))
                .map(|c| c[1].split(',').next().unwrap_or("").to_string())
        });
        match from_tag.as_deref() {
            Some("-") => None,
            Some(name) if !name.is_empty() => Some(name.to_string()),
            _ => self.name.clone(),
        }
    }

    /// Bare type name, e.g. `ScheduleConfig` for `*sc.ScheduleConfig`.
    pub fn base_type(&self) -> &str {
        let trimmed = self.type_text.trim_start_matches('*');
        trimmed.rsplit('.').next().unwrap_or(trimmed)
    }

    pub fn is_collection(&self) -> bool {
        let t = self.type_text.trim_start_matches('*');
        t.starts_with('[') || t.starts_with("map[")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GoStruct {
    pub name: String,
    pub fields: Vec<GoField>,
}

/// A `SysVar{Name: ..., Value: ..., Type: ...}` literal
#[derive(Debug, Clone, PartialEq)]
pub struct SysVarDecl {
    pub name: GoExpr,
    pub value: GoExpr,
    pub type_hint: Option<String>,
}

/// Facts gathered from a set of Go files: struct shapes, constants, and the
/// default value assigned to each struct field.
#[derive(Debug, Default)]
pub struct GoIndex {
    pub structs: HashMap<String, GoStruct>,
    pub scope: GoScope,
    /// type name -> Go field name -> default expression
    pub defaults: HashMap<String, BTreeMap<String, GoExpr>>,
    pub sysvars: Vec<SysVarDecl>,
}

impl GoIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record declarations, composite-literal defaults and `adjust*` defaults.
    pub fn add_file(&mut self, file: &ParsedFile) {
        let root = file.tree.root_node();
        for child in named_children(root) {
            match child.kind() {
                "type_declaration" => self.add_types(file, child),
                "const_declaration" | "var_declaration" => self.add_specs(file, child),
                "method_declaration" => self.add_adjust_method(file, child),
                _ => {}
            }
        }
        self.add_composite_defaults(file, root);
    }

    /// Record only constants and variables.
    pub fn add_constants(&mut self, file: &ParsedFile) {
        for child in named_children(file.tree.root_node()) {
            if matches!(child.kind(), "const_declaration" | "var_declaration") {
                self.add_specs(file, child);
            }
        }
    }

    /// Record every literal with `Name` and `Value` keys as a system variable.
    pub fn add_sysvars(&mut self, file: &ParsedFile) {
        let source = file.source.as_str();
        visit(file.tree.root_node(), &mut |node| {
            if node.kind() != "literal_value" {
                return;
            }
            let GoExpr::Composite { elements, .. } = GoExpr::lower(source, node) else {
                return;
            };
            let find = |key: &str| {
                elements
                    .iter()
                    .find(|(k, _)| k.as_deref() == Some(key))
                    .map(|(_, v)| v.clone())
            };
            if let (Some(name), Some(value)) = (find("Name"), find("Value")) {
                let type_hint = find("Type").and_then(|t| t.tail_name().map(str::to_string));
                self.sysvars.push(SysVarDecl {
                    name,
                    value,
                    type_hint,
                });
            }
        });
    }

    fn add_types(&mut self, file: &ParsedFile, decl: Node<'_>) {
        let mut specs = Vec::new();
        visit(decl, &mut |node| {
            if node.kind() == "type_spec" {
                specs.push(node);
            }
        });
        for spec in specs {
            let (Some(name), Some(ty)) = (spec.child_by_field_name("name"), spec.child_by_field_name("type")) else {
                continue;
            };
            if ty.kind() != "struct_type" {
                continue;
            }
            let name = file.text(name).to_string();
            let fields = struct_fields(file, ty);
            self.structs
                .entry(name.clone())
                .or_insert(GoStruct { name, fields });
        }
    }

    fn add_specs(&mut self, file: &ParsedFile, decl: Node<'_>) {
        let mut specs = Vec::new();
        visit(decl, &mut |node| {
            if matches!(node.kind(), "const_spec" | "var_spec") {
                specs.push(node);
            }
        });
        for spec in specs {
            let mut cursor = spec.walk();
            let names: Vec<String> = spec
                .children_by_field_name("name", &mut cursor)
                .map(|n| file.text(n).to_string())
                .collect();
            let Some(values) = spec.child_by_field_name("value") else {
                continue;
            };
            let values: Vec<GoExpr> = if values.kind() == "expression_list" {
                named_children(values)
                    .into_iter()
                    .map(|v| GoExpr::lower(&file.source, v))
                    .collect()
            } else {
                vec![GoExpr::lower(&file.source, values)]
            };
            for (name, value) in names.into_iter().zip(values) {
                if name != "_" {
                    self.scope.declare(name, value);
                }
            }
        }
    }

    /// `func (c *T) adjust(...)` bodies: `adjustX(&c.Field, v)` calls and
    /// `c.Field = v` assignments give field defaults for `T`.
    fn add_adjust_method(&mut self, file: &ParsedFile, method: Node<'_>) {
        let Some(method_name) = method.child_by_field_name("name") else {
            return;
        };
        if !file.text(method_name).to_ascii_lowercase().starts_with("adjust") {
            return;
        }
        let Some((receiver, receiver_type)) = receiver_of(file, method) else {
            return;
        };
        let Some(body) = method.child_by_field_name("body") else {
            return;
        };

        let mut found: Vec<(String, GoExpr)> = Vec::new();
        visit(body, &mut |node| match node.kind() {
            "call_expression" => {
                let GoExpr::Call { function, args } = GoExpr::lower(&file.source, node) else {
                    return;
                };
                let is_adjust = function
                    .tail_name()
                    .is_some_and(|n| n.to_ascii_lowercase().starts_with("adjust"));
                if !is_adjust || args.len() < 2 {
                    return;
                }
                if let Some(field) = args[0].receiver_field(&receiver) {
                    found.push((field.to_string(), args[1].clone()));
                }
            }
            "assignment_statement" => {
                let (Some(left), Some(right)) = (node.child_by_field_name("left"), node.child_by_field_name("right")) else {
                    return;
                };
                let left = GoExpr::lower(&file.source, left);
                let right = GoExpr::lower(&file.source, right);
                if let Some(field) = left.receiver_field(&receiver) {
                    found.push((field.to_string(), right));
                }
            }
            _ => {}
        });

        let entry = self.defaults.entry(receiver_type).or_default();
        for (field, expr) in found {
            entry.entry(field).or_insert(expr);
        }
    }

    fn add_composite_defaults(&mut self, file: &ParsedFile, root: Node<'_>) {
        let mut literals = Vec::new();
        visit(root, &mut |node| {
            if node.kind() == "composite_literal" {
                literals.push(GoExpr::lower(&file.source, node));
            }
        });
        for literal in literals {
            let GoExpr::Composite {
                type_name: Some(type_name),
                is_slice: false,
                elements,
            } = literal
            else {
                continue;
            };
            let entry = self.defaults.entry(type_name).or_default();
            for (key, value) in elements {
                if let Some(key) = key {
                    entry.entry(key).or_insert(value);
                }
            }
        }
    }

    pub fn default_for(&self, type_name: &str, field: &str) -> Option<&GoExpr> {
        self.defaults.get(type_name).and_then(|m| m.get(field))
    }
}

fn struct_fields(file: &ParsedFile, struct_type: Node<'_>) -> Vec<GoField> {
    let mut fields = Vec::new();
    let Some(list) = named_children(struct_type)
        .into_iter()
        .find(|c| c.kind() == "field_declaration_list")
    else {
        return fields;
    };
    for decl in named_children(list) {
        if decl.kind() != "field_declaration" {
            continue;
        }
        let type_text = decl
            .child_by_field_name("type")
            .map(|t| file.text(t).to_string())
            .unwrap_or_default();
        let tag = decl
            .child_by_field_name("tag")
            .map(|t| file.text(t).to_string());
        let mut cursor = decl.walk();
        let names: Vec<String> = decl
            .children_by_field_name("name", &mut cursor)
            .map(|n| file.text(n).to_string())
            .collect();
        if names.is_empty() {
            fields.push(GoField {
                name: None,
                type_text,
                tag,
            });
        } else {
            for name in names {
                fields.push(GoField {
                    name: Some(name),
                    type_text: type_text.clone(),
                    tag: tag.clone(),
                });
            }
        }
    }
    fields
}

/// Receiver variable and bare receiver type of a method declaration.
fn receiver_of(file: &ParsedFile, method: Node<'_>) -> Option<(String, String)> {
    let params = method.child_by_field_name("receiver")?;
    let decl = named_children(params)
        .into_iter()
        .find(|c| c.kind() == "parameter_declaration")?;
    let name = file.text(decl.child_by_field_name("name")?).to_string();
    let ty = file.text(decl.child_by_field_name("type")?);
    let ty = ty.trim_start_matches('*');
    let ty = ty.split('[').next().unwrap_or(ty);
    Some((name, ty.rsplit('.').next().unwrap_or(ty).to_string()))
}
