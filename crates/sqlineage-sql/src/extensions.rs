//! Dialect handler tables for the parser
//!
//! The base grammar knows nothing about dialect syntax. Each dialect fills a
//! `ParserExtensions` once, and the parser consults it by token kind at the
//! matching precedence level.

use crate::ast::{CastKind, Expr, StructField};
use crate::parser::{ParseError, Parser};
use crate::token::TokenKind;
use std::collections::HashMap;
use std::fmt;

/// Binding levels, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Precedence {
    /// Applied after a complete expression, e.g. lambda arrows
    Lowest,
    Or,
    And,
    Not,
    Comparison,
    Additive,
    Multiplicative,
    Unary,
    /// Applied directly after a primary, e.g. `::type` and `[i]`
    Postfix,
}

pub type InfixHandler = fn(&mut Parser<'_>, Expr) -> Result<Expr, ParseError>;
pub type PrefixHandler = fn(&mut Parser<'_>) -> Result<Expr, ParseError>;

#[derive(Clone, Copy)]
pub struct InfixRule {
    pub precedence: Precedence,
    pub handler: InfixHandler,
}

/// Dialect-specific operators, literals and clause flags
#[derive(Clone, Default)]
pub struct ParserExtensions {
    infix: HashMap<TokenKind, InfixRule>,
    prefix: HashMap<TokenKind, PrefixHandler>,
    group_by_all: bool,
    order_by_all: bool,
}

impl fmt::Debug for ParserExtensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut infix: Vec<_> = self.infix.keys().map(|k| k.to_string()).collect();
        infix.sort();
        let mut prefix: Vec<_> = self.prefix.keys().map(|k| k.to_string()).collect();
        prefix.sort();
        f.debug_struct("ParserExtensions")
            .field("infix", &infix)
            .field("prefix", &prefix)
            .field("group_by_all", &self.group_by_all)
            .field("order_by_all", &self.order_by_all)
            .finish()
    }
}

impl ParserExtensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_infix(&mut self, kind: TokenKind, precedence: Precedence, handler: InfixHandler) {
        self.infix.insert(kind, InfixRule { precedence, handler });
    }

    pub fn register_prefix(&mut self, kind: TokenKind, handler: PrefixHandler) {
        self.prefix.insert(kind, handler);
    }

    pub fn enable_group_by_all(&mut self) {
        self.group_by_all = true;
    }

    pub fn enable_order_by_all(&mut self) {
        self.order_by_all = true;
    }

    /// Infix handler for `kind`, only if registered at `precedence`
    pub fn infix(&self, kind: TokenKind, precedence: Precedence) -> Option<InfixHandler> {
        self.infix
            .get(&kind)
            .filter(|rule| rule.precedence == precedence)
            .map(|rule| rule.handler)
    }

    pub fn prefix(&self, kind: TokenKind) -> Option<PrefixHandler> {
        self.prefix.get(&kind).copied()
    }

    pub fn group_by_all(&self) -> bool {
        self.group_by_all
    }

    pub fn order_by_all(&self) -> bool {
        self.order_by_all
    }

    pub fn is_empty(&self) -> bool {
        self.infix.is_empty() && self.prefix.is_empty() && !self.group_by_all && !self.order_by_all
    }
}

/// `expr::type`
pub fn double_colon_cast(p: &mut Parser<'_>, left: Expr) -> Result<Expr, ParseError> {
    p.expect(TokenKind::DoubleColon)?;
    let data_type = p.parse_data_type()?;
    Ok(Expr::Cast {
        expr: Box::new(left),
        data_type,
        kind: CastKind::DoubleColon,
    })
}

/// `expr[index]` and `expr[start:end]`
pub fn subscript(p: &mut Parser<'_>, left: Expr) -> Result<Expr, ParseError> {
    p.expect(TokenKind::LBracket)?;
    let start = if p.check(TokenKind::Colon) {
        None
    } else {
        Some(Box::new(p.parse_expr()?))
    };

    if p.consume(TokenKind::Colon) {
        let end = if p.check(TokenKind::RBracket) {
            None
        } else {
            Some(Box::new(p.parse_expr()?))
        };
        p.expect(TokenKind::RBracket)?;
        return Ok(Expr::Slice {
            expr: Box::new(left),
            start,
            end,
        });
    }

    p.expect(TokenKind::RBracket)?;
    match start {
        Some(index) => Ok(Expr::Index {
            expr: Box::new(left),
            index,
        }),
        None => Err(p.error_expected("subscript")),
    }
}

/// `x -> body` or `(x, y) -> body`
///
/// The parameter list is parsed as an ordinary expression first, so a
/// single parameter arrives as a column and several arrive as a list.
pub fn lambda(p: &mut Parser<'_>, left: Expr) -> Result<Expr, ParseError> {
    let params = match lambda_params(&left) {
        Some(params) => params,
        None => return Err(p.error_expected("lambda parameter names before '->'")),
    };
    p.expect(TokenKind::Arrow)?;
    let body = p.parse_expr()?;
    Ok(Expr::Lambda {
        params,
        body: Box::new(body),
    })
}

fn lambda_params(expr: &Expr) -> Option<Vec<String>> {
    match expr {
        Expr::Column { table: None, name } => Some(vec![name.clone()]),
        Expr::Nested(inner) => lambda_params(inner),
        Expr::List(items) => items
            .iter()
            .map(|item| match item {
                Expr::Column { table: None, name } => Some(name.clone()),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

/// `[a, b, c]`
pub fn list_literal(p: &mut Parser<'_>) -> Result<Expr, ParseError> {
    p.expect(TokenKind::LBracket)?;
    let mut items = Vec::new();
    if !p.check(TokenKind::RBracket) {
        loop {
            items.push(p.parse_expr()?);
            if !p.consume(TokenKind::Comma) {
                break;
            }
        }
    }
    p.expect(TokenKind::RBracket)?;
    Ok(Expr::List(items))
}

/// `{'key': value, ...}`
pub fn struct_literal(p: &mut Parser<'_>) -> Result<Expr, ParseError> {
    p.expect(TokenKind::LBrace)?;
    let mut fields = Vec::new();
    if !p.check(TokenKind::RBrace) {
        loop {
            let name = if p.check(TokenKind::String) {
                p.advance().literal
            } else {
                p.parse_identifier("struct field name")?
            };
            p.expect(TokenKind::Colon)?;
            let value = p.parse_expr()?;
            fields.push(StructField { name, value });
            if !p.consume(TokenKind::Comma) {
                break;
            }
        }
    }
    p.expect(TokenKind::RBrace)?;
    Ok(Expr::Struct(fields))
}
