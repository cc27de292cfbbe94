//! Component E: the expression rewriter. Tokenizes and parses condition,
//! filter, key-condition, projection, and update expressions, substitutes
//! mapped key-attribute names and hash-key values, and re-renders the
//! result as text for the physical store.

mod ast;
mod parser;
mod render;
mod rewriter;
mod tokenizer;

pub use ast::{ArithOp, CompareOp, Function, Node, Path, PathSegment, UpdateAction, UpdateExpr};
pub use rewriter::{validate_key_condition, KeyField, RewriteCtx};

use crate::codec::KeyCodec;
use crate::error::{Error, Result};
use crate::value::AttributeValue;
use std::collections::HashMap;

/// Which of the five expression grammars a piece of text is written in.
/// Determines both the entry-point parser rule and whether key-condition
/// shape validation applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Condition,
    Filter,
    KeyCondition,
    Projection,
    Update,
}

pub struct RewriteInput<'a> {
    pub role: Role,
    pub text: &'a str,
    pub names: HashMap<String, String>,
    pub values: HashMap<String, AttributeValue>,
    pub fields: &'a [KeyField],
    pub codec: &'a KeyCodec,
    pub tenant: &'a str,
    pub virtual_table: &'a str,
}

pub struct RewriteOutput {
    pub text: String,
    pub names: HashMap<String, String>,
    pub values: HashMap<String, AttributeValue>,
}

/// Parses `input.text` per its role, substitutes mapped key fields and
/// hash-key values, and renders the result back to text. Returns the
/// (possibly extended) name and value substitution maps alongside it, per
/// the rewriter's contract: the caller forwards these maps to the
/// physical store unchanged.
pub fn rewrite_expression(input: RewriteInput<'_>) -> Result<RewriteOutput> {
    let tokens = tokenizer::tokenize(input.text)
        .map_err(|e| Error::UnsupportedPredicate(format!("could not tokenize expression: {e}")))?;

    let mut ctx = RewriteCtx::new(
        input.fields,
        input.names,
        input.values,
        input.codec,
        input.tenant,
        input.virtual_table,
    );

    let text = match input.role {
        Role::Condition | Role::Filter => {
            let node = parser::Parser::new(&tokens)
                .parse_bool_expr()
                .map_err(|e| Error::UnsupportedPredicate(e.to_string()))?;
            let rewritten = ctx.rewrite_bool(&node);
            render::render_bool(&rewritten)
        }
        Role::KeyCondition => {
            let node = parser::Parser::new(&tokens)
                .parse_bool_expr()
                .map_err(|e| Error::UnsupportedPredicate(e.to_string()))?;
            validate_key_condition(&node, ctx.fields, &ctx.names)?;
            let rewritten = ctx.rewrite_bool(&node);
            render::render_bool(&rewritten)
        }
        Role::Projection => {
            let paths = parser::Parser::new(&tokens)
                .parse_projection()
                .map_err(|e| Error::UnsupportedPredicate(e.to_string()))?;
            let rewritten = ctx.rewrite_projection(&paths);
            render::render_projection(&rewritten)
        }
        Role::Update => {
            let update = parser::Parser::new(&tokens)
                .parse_update()
                .map_err(|e| Error::UnsupportedPredicate(e.to_string()))?;
            let rewritten = ctx.rewrite_update(&update)?;
            render::render_update(&rewritten)
        }
    };

    let (names, values) = ctx.into_parts();
    Ok(RewriteOutput {
        text,
        names,
        values,
    })
}
