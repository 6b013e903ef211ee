use super::expr::{GoExpr, GoScope};
use crate::language::{named_children, ParsedFile};
use crate::lit::Lit;
use once_cell::sync::Lazy;
use precheck_model::{Component, ForcedMutation, ParameterKind, Value};
use regex::Regex;
use tree_sitter::Node;

static UPGRADE_FN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^upgradeToVer(\d+)$").expect("valid regex"));

static SET_GLOBAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*SET\s+@@GLOBAL\.?\s*([A-Za-z0-9_]+)\s*=\s*(.+?)\s*;?\s*$").expect("valid regex")
});

static UPDATE_GLOBAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*UPDATE\s+(?:HIGH_PRIORITY\s+)?(?:mysql\.)?global_variables\s+SET\s+VARIABLE_VALUE\s*=\s*'([^']*)'\s+WHERE\s+VARIABLE_NAME\s*=\s*'([^']+)'(?:\s+AND\s+VARIABLE_VALUE\s*=\s*'([^']*)')?",
    )
    .expect("valid regex")
});

static WRITE_GLOBAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(REPLACE|INSERT)\s+(?:HIGH_PRIORITY\s+)?(IGNORE\s+)?INTO\s+(?:mysql\.)?global_variables\s*(?:\([^)]*\)\s*)?VALUES\s*\(\s*'([^']+)'\s*,\s*'([^']*)'\s*\)",
    )
    .expect("valid regex")
});

/// Calls that write a global variable unconditionally: `(…, name, value)`.
const DIRECT_SETTERS: [&str; 4] = [
    "setGlobalSysVar",
    "writeGlobalSysVar",
    "SetGlobalSysVar",
    "SetGlobalSysVarOnly",
];

/// Find every unconditional global-variable write in `upgradeToVerNNN` bodies.
///
/// Only statements directly in the function body count; writes nested in
/// conditionals or loops, `initGlobalVariableIfNotExists` and `INSERT IGNORE`
/// depend on prior state and are not forced.
pub fn collect_upgrade_mutations(files: &[ParsedFile], scope: &GoScope) -> Vec<ForcedMutation> {
    let mut out = Vec::new();
    for file in files {
        for func in named_children(file.tree.root_node()) {
            if func.kind() != "function_declaration" {
                continue;
            }
            let Some(name) = func.child_by_field_name("name").map(|n| file.text(n).to_string()) else {
                continue;
            };
            let Some(version) = UPGRADE_FN
                .captures(&name)
                .and_then(|c| c[1].parse::<i64>().ok())
            else {
                continue;
            };
            let description = doc_comment(file, func)
                .unwrap_or_else(|| format!("Applied by {name} at bootstrap version {version}"));
            let Some(body) = func.child_by_field_name("body") else {
                continue;
            };
            for statement in direct_statements(body) {
                if statement.kind() != "expression_statement" {
                    continue;
                }
                let Some(call) = named_children(statement)
                    .into_iter()
                    .find(|c| c.kind() == "call_expression")
                else {
                    continue;
                };
                let GoExpr::Call { function, args } = GoExpr::lower(&file.source, call) else {
                    continue;
                };
                let Some(write) = analyze_call(&function, &args, scope) else {
                    continue;
                };
                out.push(ForcedMutation {
                    component: Component::TiDB,
                    kind: ParameterKind::SystemVariable,
                    parameter_name: write.name,
                    from_value: write.from.map(Value::String),
                    to_value: Value::String(write.to),
                    introduced_at_bootstrap_version: version,
                    description: description.clone(),
                    source_function: name.clone(),
                });
            }
        }
    }
    out.sort_by_key(|m| m.introduced_at_bootstrap_version);
    out
}

#[derive(Debug, Clone, PartialEq)]
struct GlobalWrite {
    name: String,
    to: String,
    from: Option<String>,
}

fn analyze_call(function: &GoExpr, args: &[GoExpr], scope: &GoScope) -> Option<GlobalWrite> {
    let callee = function.tail_name()?;
    if DIRECT_SETTERS.contains(&callee) {
        let [.., name, value] = args else {
            return None;
        };
        let name = scope.resolve_name(name)?.to_ascii_lowercase();
        let to = scope.eval(value)?.text();
        return Some(GlobalWrite { name, to, from: None });
    }
    if callee == "mustExecute" {
        let sql = render_sql(args.get(1..)?, scope)?;
        return parse_sql(&sql);
    }
    None
}

/// Substitute `%n`/`%?` (and `fmt.Sprintf` verbs) with the trailing arguments.
fn render_sql(args: &[GoExpr], scope: &GoScope) -> Option<String> {
    let (template, params): (String, Vec<GoExpr>) = match args.first()? {
        GoExpr::Call { function, args: inner } if function.tail_name() == Some("Sprintf") => {
            let template = match scope.eval(inner.first()?)? {
                Lit::Str(s) => s,
                _ => return None,
            };
            let rendered = substitute(&template, &inner[1..], scope)?;
            (rendered, args[1..].to_vec())
        }
        first => match scope.eval(first)? {
            Lit::Str(s) => (s, args[1..].to_vec()),
            _ => return None,
        },
    };
    substitute(&template, &params, scope)
}

fn substitute(template: &str, params: &[GoExpr], scope: &GoScope) -> Option<String> {
    let mut out = String::with_capacity(template.len() + 32);
    let mut params = params.iter();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some(verb @ ('n' | '?' | 's' | 'd' | 'v')) => {
                let param = params.next()?;
                out.push_str(&render_param(param, verb, scope)?);
            }
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    Some(out)
}

fn render_param(param: &GoExpr, verb: char, scope: &GoScope) -> Option<String> {
    match param.tail_name() {
        Some("SystemDB") => return Some("mysql".into()),
        Some("GlobalVariablesTable") => return Some("global_variables".into()),
        _ => {}
    }
    let text = match scope.eval(param) {
        Some(lit) => lit.text(),
        None if verb == '?' || verb == 'n' => scope.resolve_name(param)?,
        None => return None,
    };
    Some(if verb == '?' { format!("'{text}'") } else { text })
}

fn parse_sql(sql: &str) -> Option<GlobalWrite> {
    if let Some(caps) = SET_GLOBAL.captures(sql) {
        return Some(GlobalWrite {
            name: caps[1].to_ascii_lowercase(),
            to: strip_sql_quotes(&caps[2]),
            from: None,
        });
    }
    if let Some(caps) = UPDATE_GLOBAL.captures(sql) {
        return Some(GlobalWrite {
            name: caps[2].to_ascii_lowercase(),
            to: caps[1].to_string(),
            from: caps.get(3).map(|m| m.as_str().to_string()),
        });
    }
    if let Some(caps) = WRITE_GLOBAL.captures(sql) {
        if caps.get(2).is_some() {
            return None;
        }
        return Some(GlobalWrite {
            name: caps[3].to_ascii_lowercase(),
            to: caps[4].to_string(),
            from: None,
        });
    }
    None
}

fn strip_sql_quotes(raw: &str) -> String {
    let raw = raw.trim();
    for quote in ['\'', '"'] {
        if let Some(inner) = raw.strip_prefix(quote).and_then(|r| r.strip_suffix(quote)) {
            return inner.to_string();
        }
    }
    raw.to_string()
}

/// Statements of a block, looking through the grammar's `statement_list` wrapper.
fn direct_statements(block: Node<'_>) -> Vec<Node<'_>> {
    let mut out = Vec::new();
    for child in named_children(block) {
        if child.kind() == "statement_list" {
            out.extend(named_children(child));
        } else {
            out.push(child);
        }
    }
    out
}

/// Contiguous `//` comments ending on the line above `node`.
fn doc_comment(file: &ParsedFile, node: Node<'_>) -> Option<String> {
    let mut lines = Vec::new();
    let mut expected_row = node.start_position().row;
    let mut current = node.prev_named_sibling();
    while let Some(comment) = current {
        if comment.kind() != "comment" || comment.end_position().row + 1 != expected_row {
            break;
        }
        let text = file.text(comment).trim_start_matches('/').trim().to_string();
        lines.push(text);
        expected_row = comment.start_position().row;
        current = comment.prev_named_sibling();
    }
    if lines.is_empty() {
        return None;
    }
    lines.reverse();
    Some(lines.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_shapes() {
        assert_eq!(
            parse_sql("SET @@GLOBAL.tidb_enable_async_commit = 'ON'"),
            Some(GlobalWrite {
                name: "tidb_enable_async_commit".into(),
                to: "ON".into(),
                from: None
            })
        );
        assert_eq!(
            parse_sql("UPDATE HIGH_PRIORITY mysql.global_variables SET VARIABLE_VALUE='1' WHERE VARIABLE_NAME='tidb_x' AND VARIABLE_VALUE='0'"),
            Some(GlobalWrite {
                name: "tidb_x".into(),
                to: "1".into(),
                from: Some("0".into())
            })
        );
        assert_eq!(
            parse_sql("REPLACE HIGH_PRIORITY INTO mysql.global_variables VALUES ('tidb_y', 'OFF');"),
            Some(GlobalWrite {
                name: "tidb_y".into(),
                to: "OFF".into(),
                from: None
            })
        );
        assert_eq!(
            parse_sql("INSERT HIGH_PRIORITY IGNORE INTO mysql.global_variables VALUES ('tidb_z', '1')"),
            None
        );
        assert_eq!(parse_sql("ALTER TABLE mysql.user ADD COLUMN x INT"), None);
    }

    #[test]
    fn placeholders_render_table_and_values() {
        let scope = GoScope::default();
        let args = vec![
            GoExpr::Selector(Box::new(GoExpr::Ident("mysql".into())), "SystemDB".into()),
            GoExpr::Selector(Box::new(GoExpr::Ident("mysql".into())), "GlobalVariablesTable".into()),
            GoExpr::Str("tidb_a".into()),
            GoExpr::Str("ON".into()),
        ];
        let sql = substitute("REPLACE HIGH_PRIORITY INTO %n.%n VALUES (%?, %?);", &args, &scope).unwrap();
        assert_eq!(sql, "REPLACE HIGH_PRIORITY INTO mysql.global_variables VALUES ('tidb_a', 'ON');");
    }
}
