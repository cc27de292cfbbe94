//! Renders a (possibly rewritten) AST back into expression text.

use super::ast::*;
use std::fmt::Write;

pub fn render_bool(node: &Node) -> String {
    let mut out = String::new();
    render_node(node, &mut out);
    out
}

pub fn render_projection(paths: &[Path]) -> String {
    paths
        .iter()
        .map(render_path)
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn render_update(update: &UpdateExpr) -> String {
    let mut set = Vec::new();
    let mut remove = Vec::new();
    let mut add = Vec::new();
    let mut delete = Vec::new();

    for action in &update.actions {
        match action {
            UpdateAction::Set(path, value) => {
                set.push(format!("{} = {}", render_path(path), render_value(value)))
            }
            UpdateAction::Remove(path) => remove.push(render_path(path)),
            UpdateAction::Add(path, value) => {
                add.push(format!("{} {}", render_path(path), render_value(value)))
            }
            UpdateAction::Delete(path, value) => {
                delete.push(format!("{} {}", render_path(path), render_value(value)))
            }
        }
    }

    let mut clauses = Vec::new();
    if !set.is_empty() {
        clauses.push(format!("SET {}", set.join(", ")));
    }
    if !remove.is_empty() {
        clauses.push(format!("REMOVE {}", remove.join(", ")));
    }
    if !add.is_empty() {
        clauses.push(format!("ADD {}", add.join(", ")));
    }
    if !delete.is_empty() {
        clauses.push(format!("DELETE {}", delete.join(", ")));
    }
    clauses.join(" ")
}

pub fn render_path(path: &Path) -> String {
    let mut out = String::new();
    if path.root_is_placeholder {
        out.push('#');
    }
    out.push_str(&path.root_text);
    for seg in &path.segments {
        match seg {
            PathSegment::Field(f) => {
                out.push('.');
                out.push_str(f);
            }
            PathSegment::Index(i) => {
                let _ = write!(out, "[{i}]");
            }
        }
    }
    out
}

fn render_value(node: &Node) -> String {
    render_node_to_string(node)
}

fn render_node_to_string(node: &Node) -> String {
    let mut s = String::new();
    render_node(node, &mut s);
    s
}

fn render_node(node: &Node, out: &mut String) {
    match node {
        Node::And(l, r) => {
            out.push_str(&parenthesize_if_needed(l, true));
            out.push_str(" AND ");
            out.push_str(&parenthesize_if_needed(r, true));
        }
        Node::Or(l, r) => {
            out.push_str(&render_node_to_string(l));
            out.push_str(" OR ");
            out.push_str(&render_node_to_string(r));
        }
        Node::Not(inner) => {
            out.push_str("NOT ");
            out.push_str(&parenthesize_if_needed(inner, true));
        }
        Node::Compare(l, op, r) => {
            out.push_str(&render_node_to_string(l));
            out.push(' ');
            out.push_str(match op {
                CompareOp::Eq => "=",
                CompareOp::Ne => "<>",
                CompareOp::Lt => "<",
                CompareOp::Le => "<=",
                CompareOp::Gt => ">",
                CompareOp::Ge => ">=",
            });
            out.push(' ');
            out.push_str(&render_node_to_string(r));
        }
        Node::Arith(l, op, r) => {
            out.push_str(&render_node_to_string(l));
            out.push_str(match op {
                ArithOp::Plus => " + ",
                ArithOp::Minus => " - ",
            });
            out.push_str(&render_node_to_string(r));
        }
        Node::FuncCall(func, args) => {
            out.push_str(func.name());
            out.push('(');
            out.push_str(
                &args
                    .iter()
                    .map(render_node_to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            );
            out.push(')');
        }
        Node::Path(p) => out.push_str(&render_path(p)),
        Node::ValuePlaceholder(v) => {
            out.push(':');
            out.push_str(v);
        }
        Node::StrLiteral(s) => {
            out.push('\'');
            out.push_str(&s.replace('\'', "''"));
            out.push('\'');
        }
        Node::NumLiteral(n) => out.push_str(n),
        Node::BoolLiteral(b) => out.push_str(if *b { "true" } else { "false" }),
    }
}

/// `AND`/`NOT` operands that are themselves `OR` need parentheses to
/// preserve precedence on re-render; everything else renders bare.
fn parenthesize_if_needed(node: &Node, _in_and_or_not: bool) -> String {
    match node {
        Node::Or(_, _) => format!("({})", render_node_to_string(node)),
        other => render_node_to_string(other),
    }
}
