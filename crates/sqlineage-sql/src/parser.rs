//! Recursive-descent SQL parser
//!
//! Parses a single SELECT/WITH statement into the syntax tree in `ast`.
//! Expressions use precedence climbing; dialect syntax is looked up in the
//! `ParserExtensions` tables at each precedence level.

use crate::ast::*;
use crate::dialect::{Dialect, DuckDbDialect, GenericDialect, PostgresDialect};
use crate::dialect::{BigQueryDialect, SnowflakeDialect};
use crate::display::is_niladic;
use crate::extensions::{ParserExtensions, Precedence};
use crate::lexer::Lexer;
use crate::token::{Keyword, Position, Token, TokenKind};
use sqlineage_core::{Diagnostic, DiagnosticCode, DialectConfig, Location, Severity};
use std::path::{Path, PathBuf};

/// Parse a statement with the generic dialect
pub fn parse(sql: &str) -> Result<SelectStmt, ParseError> {
    parse_with_dialect(sql, &GenericDialect)
}

pub fn parse_with_dialect(sql: &str, dialect: &dyn Dialect) -> Result<SelectStmt, ParseError> {
    Parser::new(sql, dialect).parse_statement()
}

/// SQL parser with configurable dialect
pub struct SqlParser {
    dialect: Box<dyn Dialect>,
}

impl SqlParser {
    /// Create a new SQL parser with the default (generic) dialect
    pub fn new() -> Self {
        Self {
            dialect: Box::new(GenericDialect),
        }
    }

    pub fn duckdb() -> Self {
        Self {
            dialect: Box::new(DuckDbDialect),
        }
    }

    pub fn postgres() -> Self {
        Self {
            dialect: Box::new(PostgresDialect),
        }
    }

    pub fn snowflake() -> Self {
        Self {
            dialect: Box::new(SnowflakeDialect),
        }
    }

    pub fn bigquery() -> Self {
        Self {
            dialect: Box::new(BigQueryDialect),
        }
    }

    /// Create a parser from a dialect config
    pub fn from_dialect(dialect: &DialectConfig) -> Self {
        Self {
            dialect: crate::dialect::dialect_for(dialect),
        }
    }

    pub fn dialect(&self) -> &dyn Dialect {
        &*self.dialect
    }

    /// Parse SQL string into a statement
    pub fn parse(&self, sql: &str, file_path: Option<&Path>) -> Result<ParsedSql, ParseError> {
        let statement = parse_with_dialect(sql, self.dialect())?;
        Ok(ParsedSql {
            sql: sql.to_string(),
            statement,
            file_path: file_path.map(Path::to_path_buf),
        })
    }

    /// Parse SQL and return diagnostic on error
    pub fn parse_with_diagnostic(
        &self,
        sql: &str,
        file_path: Option<&Path>,
    ) -> Result<ParsedSql, Diagnostic> {
        self.parse(sql, file_path)
            .map_err(|e| e.to_diagnostic(file_path))
    }
}

impl Default for SqlParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Successfully parsed SQL with its statement
#[derive(Debug, Clone)]
pub struct ParsedSql {
    /// Original SQL string
    pub sql: String,

    pub statement: SelectStmt,

    /// Source file path (if parsed from file)
    pub file_path: Option<PathBuf>,
}

impl ParsedSql {
    /// Canonical single-line rendering of the statement
    pub fn canonical_sql(&self) -> String {
        self.statement.to_string()
    }

    pub fn cte_names(&self) -> Vec<&str> {
        self.statement
            .with
            .as_ref()
            .map(|w| w.ctes.iter().map(|c| c.name.as_str()).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    Syntax,
    UnexpectedEof,
    IllegalToken,
    /// Subquery used as a value in a SELECT list
    ScalarSubquery,
}

/// SQL parsing error at a source position
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} at {position}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub position: Position,
    pub message: String,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, position: Position, message: impl Into<String>) -> Self {
        Self {
            kind,
            position,
            message: message.into(),
        }
    }

    /// Convert to a diagnostic
    pub fn to_diagnostic(&self, file_path: Option<&Path>) -> Diagnostic {
        let code = match self.kind {
            ParseErrorKind::ScalarSubquery => DiagnosticCode::SqlScalarSubquery,
            _ => DiagnosticCode::SqlParseError,
        };
        let location = Location {
            file: file_path.map(|p| p.display().to_string()),
            line: Some(self.position.line),
            column: Some(self.position.column),
        };
        Diagnostic::new(code, Severity::Error, self.to_string()).with_location(location)
    }
}

/// Parser over a token stream with three tokens of lookahead
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    cur: Token,
    peek: Token,
    peek2: Token,
    extensions: ParserExtensions,
    in_select_list: bool,
}

impl<'a> Parser<'a> {
    pub fn new(sql: &'a str, dialect: &dyn Dialect) -> Self {
        let mut lexer = Lexer::new(sql);
        let cur = lexer.next_token();
        let peek = lexer.next_token();
        let peek2 = lexer.next_token();
        Self {
            lexer,
            cur,
            peek,
            peek2,
            extensions: dialect.extensions(),
            in_select_list: false,
        }
    }

    /// Parse exactly one statement, with optional trailing semicolons
    pub fn parse_statement(&mut self) -> Result<SelectStmt, ParseError> {
        let stmt = self.parse_select_stmt()?;
        while self.consume(TokenKind::Semicolon) {}
        if !self.check(TokenKind::Eof) {
            return Err(self.error_expected("end of statement"));
        }
        Ok(stmt)
    }

    // ---- token helpers ----

    pub(crate) fn advance(&mut self) -> Token {
        let next = self.lexer.next_token();
        let peek2 = std::mem::replace(&mut self.peek2, next);
        let peek = std::mem::replace(&mut self.peek, peek2);
        std::mem::replace(&mut self.cur, peek)
    }

    pub(crate) fn check(&self, kind: TokenKind) -> bool {
        self.cur.kind == kind
    }

    fn check_keyword(&self, keyword: Keyword) -> bool {
        self.cur.is_keyword(keyword)
    }

    pub(crate) fn consume(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume_keyword(&mut self, keyword: Keyword) -> bool {
        self.consume(TokenKind::Keyword(keyword))
    }

    pub(crate) fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_expected(&kind.to_string()))
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<(), ParseError> {
        self.expect(TokenKind::Keyword(keyword)).map(|_| ())
    }

    pub(crate) fn error_expected(&self, expected: &str) -> ParseError {
        let (kind, message) = match self.cur.kind {
            TokenKind::Eof => (
                ParseErrorKind::UnexpectedEof,
                format!("expected {}, found end of input", expected),
            ),
            TokenKind::Illegal => (
                ParseErrorKind::IllegalToken,
                format!("expected {}, found {}", expected, self.cur.describe()),
            ),
            _ => (
                ParseErrorKind::Syntax,
                format!("expected {}, found {}", expected, self.cur.describe()),
            ),
        };
        ParseError::new(kind, self.cur.pos, message)
    }

    fn is_identifier(token: &Token) -> bool {
        match token.kind {
            TokenKind::Ident | TokenKind::QuotedIdent => true,
            TokenKind::Keyword(kw) => !kw.is_reserved(),
            _ => false,
        }
    }

    fn is_query_start(token: &Token) -> bool {
        token.is_keyword(Keyword::Select) || token.is_keyword(Keyword::With)
    }

    pub(crate) fn parse_identifier(&mut self, what: &str) -> Result<String, ParseError> {
        if Self::is_identifier(&self.cur) {
            Ok(self.advance().literal)
        } else {
            Err(self.error_expected(what))
        }
    }

    fn parse_identifier_list(&mut self) -> Result<Vec<String>, ParseError> {
        self.expect(TokenKind::LParen)?;
        let mut names = vec![self.parse_identifier("column name")?];
        while self.consume(TokenKind::Comma) {
            names.push(self.parse_identifier("column name")?);
        }
        self.expect(TokenKind::RParen)?;
        Ok(names)
    }

    fn parse_expr_list(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut exprs = vec![self.parse_expr()?];
        while self.consume(TokenKind::Comma) {
            exprs.push(self.parse_expr()?);
        }
        Ok(exprs)
    }

    // ---- statements ----

    fn parse_select_stmt(&mut self) -> Result<SelectStmt, ParseError> {
        let with = if self.check_keyword(Keyword::With) {
            Some(self.parse_with()?)
        } else {
            None
        };
        let body = self.parse_select_body()?;
        Ok(SelectStmt { with, body })
    }

    /// Statement nested inside parentheses; resets the select-list context
    fn parse_nested_stmt(&mut self) -> Result<Box<SelectStmt>, ParseError> {
        let saved = std::mem::replace(&mut self.in_select_list, false);
        let result = self.parse_select_stmt();
        self.in_select_list = saved;
        result.map(Box::new)
    }

    fn parse_parenthesized_stmt(&mut self) -> Result<Box<SelectStmt>, ParseError> {
        self.expect(TokenKind::LParen)?;
        let query = self.parse_nested_stmt()?;
        self.expect(TokenKind::RParen)?;
        Ok(query)
    }

    fn parse_with(&mut self) -> Result<WithClause, ParseError> {
        self.expect_keyword(Keyword::With)?;
        let recursive = self.consume_keyword(Keyword::Recursive);
        let mut ctes = vec![self.parse_cte()?];
        while self.consume(TokenKind::Comma) {
            ctes.push(self.parse_cte()?);
        }
        Ok(WithClause { recursive, ctes })
    }

    fn parse_cte(&mut self) -> Result<Cte, ParseError> {
        let name = self.parse_identifier("CTE name")?;
        let columns = if self.check(TokenKind::LParen) {
            self.parse_identifier_list()?
        } else {
            Vec::new()
        };
        self.expect_keyword(Keyword::As)?;
        // materialization hints are accepted and dropped
        if self.check_keyword(Keyword::Not) && self.peek.is_keyword(Keyword::Materialized) {
            self.advance();
        }
        self.consume_keyword(Keyword::Materialized);
        let query = self.parse_parenthesized_stmt()?;
        Ok(Cte {
            name,
            columns,
            query,
        })
    }

    fn parse_select_body(&mut self) -> Result<SelectBody, ParseError> {
        let left = self.parse_select_core()?;
        let op = match self.cur.kind {
            TokenKind::Keyword(Keyword::Union) => SetOperator::Union,
            TokenKind::Keyword(Keyword::Intersect) => SetOperator::Intersect,
            TokenKind::Keyword(Keyword::Except) => SetOperator::Except,
            _ => return Ok(SelectBody { left, set_op: None }),
        };
        self.advance();
        let all = if self.consume_keyword(Keyword::All) {
            true
        } else {
            self.consume_keyword(Keyword::Distinct);
            false
        };
        let right = Box::new(self.parse_select_body()?);
        Ok(SelectBody {
            left,
            set_op: Some(SetOperation { op, all, right }),
        })
    }

    fn parse_select_core(&mut self) -> Result<SelectCore, ParseError> {
        self.expect_keyword(Keyword::Select)?;
        let mut core = SelectCore::default();
        if self.consume_keyword(Keyword::Distinct) {
            core.distinct = true;
        } else {
            self.consume_keyword(Keyword::All);
        }

        let saved = std::mem::replace(&mut self.in_select_list, true);
        let items = self.parse_select_items();
        self.in_select_list = saved;
        core.items = items?;

        if self.consume_keyword(Keyword::From) {
            core.from = Some(self.parse_from()?);
        }
        if self.consume_keyword(Keyword::Where) {
            core.where_clause = Some(self.parse_expr()?);
        }
        if self.consume_keyword(Keyword::Group) {
            self.expect_keyword(Keyword::By)?;
            core.group_by = Some(if self.extensions.group_by_all() && self.consume_keyword(Keyword::All) {
                GroupBy::All
            } else {
                GroupBy::Exprs(self.parse_expr_list()?)
            });
        }
        if self.consume_keyword(Keyword::Having) {
            core.having = Some(self.parse_expr()?);
        }
        if self.consume_keyword(Keyword::Window) {
            loop {
                let name = self.parse_identifier("window name")?;
                self.expect_keyword(Keyword::As)?;
                self.expect(TokenKind::LParen)?;
                let spec = self.parse_window_def()?;
                self.expect(TokenKind::RParen)?;
                core.windows.push(NamedWindow { name, spec });
                if !self.consume(TokenKind::Comma) {
                    break;
                }
            }
        }
        if self.consume_keyword(Keyword::Qualify) {
            core.qualify = Some(self.parse_expr()?);
        }
        if self.consume_keyword(Keyword::Order) {
            self.expect_keyword(Keyword::By)?;
            core.order_by = Some(if self.extensions.order_by_all() && self.consume_keyword(Keyword::All) {
                OrderBy::All(self.parse_sort_direction())
            } else {
                OrderBy::Items(self.parse_order_items()?)
            });
        }
        if self.consume_keyword(Keyword::Limit) {
            core.limit = Some(self.parse_expr()?);
        }
        if self.consume_keyword(Keyword::Offset) {
            core.offset = Some(self.parse_expr()?);
            if !self.consume_keyword(Keyword::Rows) {
                self.consume_keyword(Keyword::Row);
            }
        }
        Ok(core)
    }

    fn parse_select_items(&mut self) -> Result<Vec<SelectItem>, ParseError> {
        let mut items = vec![self.parse_select_item()?];
        while self.consume(TokenKind::Comma) {
            items.push(self.parse_select_item()?);
        }
        Ok(items)
    }

    fn parse_select_item(&mut self) -> Result<SelectItem, ParseError> {
        if self.consume(TokenKind::Star) {
            return Ok(SelectItem::Star);
        }
        if Self::is_identifier(&self.cur)
            && self.peek.kind == TokenKind::Dot
            && self.peek2.kind == TokenKind::Star
        {
            let table = self.advance().literal;
            self.advance();
            self.advance();
            return Ok(SelectItem::QualifiedStar(table));
        }

        let expr = self.parse_expr()?;
        let alias = self.parse_alias()?;
        Ok(SelectItem::Expr { expr, alias })
    }

    /// `AS name` or a bare identifier
    fn parse_alias(&mut self) -> Result<Option<String>, ParseError> {
        if self.consume_keyword(Keyword::As) {
            return self.parse_identifier("alias").map(Some);
        }
        match self.cur.kind {
            TokenKind::Ident | TokenKind::QuotedIdent => Ok(Some(self.advance().literal)),
            _ => Ok(None),
        }
    }

    fn parse_sort_direction(&mut self) -> Option<SortDirection> {
        if self.consume_keyword(Keyword::Asc) {
            Some(SortDirection::Asc)
        } else if self.consume_keyword(Keyword::Desc) {
            Some(SortDirection::Desc)
        } else {
            None
        }
    }

    fn parse_order_items(&mut self) -> Result<Vec<OrderItem>, ParseError> {
        let mut items = Vec::new();
        loop {
            let expr = self.parse_expr()?;
            let direction = self.parse_sort_direction();
            let nulls = if self.consume_keyword(Keyword::Nulls) {
                if self.consume_keyword(Keyword::First) {
                    Some(NullsOrder::First)
                } else if self.consume_keyword(Keyword::Last) {
                    Some(NullsOrder::Last)
                } else {
                    return Err(self.error_expected("FIRST or LAST"));
                }
            } else {
                None
            };
            items.push(OrderItem {
                expr,
                direction,
                nulls,
            });
            if !self.consume(TokenKind::Comma) {
                break;
            }
        }
        Ok(items)
    }

    // ---- FROM ----

    fn parse_from(&mut self) -> Result<FromClause, ParseError> {
        let source = self.parse_table_ref()?;
        let mut joins = Vec::new();
        while let Some(join) = self.parse_join()? {
            joins.push(join);
        }
        Ok(FromClause { source, joins })
    }

    fn parse_join(&mut self) -> Result<Option<Join>, ParseError> {
        if self.consume(TokenKind::Comma) {
            let table = self.parse_table_ref()?;
            return Ok(Some(Join {
                kind: JoinKind::Comma,
                outer: false,
                natural: false,
                table,
                constraint: None,
            }));
        }

        let natural = self.consume_keyword(Keyword::Natural);
        let (kind, outer) = match self.cur.kind {
            TokenKind::Keyword(Keyword::Cross) => {
                self.advance();
                (JoinKind::Cross, false)
            }
            TokenKind::Keyword(Keyword::Inner) => {
                self.advance();
                (JoinKind::Inner, false)
            }
            TokenKind::Keyword(Keyword::Left) => {
                self.advance();
                (JoinKind::Left, self.consume_keyword(Keyword::Outer))
            }
            TokenKind::Keyword(Keyword::Right) => {
                self.advance();
                (JoinKind::Right, self.consume_keyword(Keyword::Outer))
            }
            TokenKind::Keyword(Keyword::Full) => {
                self.advance();
                (JoinKind::Full, self.consume_keyword(Keyword::Outer))
            }
            TokenKind::Keyword(Keyword::Join) => (JoinKind::Inner, false),
            _ if natural => return Err(self.error_expected("JOIN")),
            _ => return Ok(None),
        };
        self.expect_keyword(Keyword::Join)?;
        let table = self.parse_table_ref()?;

        let constraint = if kind == JoinKind::Cross || natural {
            None
        } else if self.consume_keyword(Keyword::On) {
            Some(JoinConstraint::On(self.parse_expr()?))
        } else if self.consume_keyword(Keyword::Using) {
            Some(JoinConstraint::Using(self.parse_identifier_list()?))
        } else {
            None
        };

        Ok(Some(Join {
            kind,
            outer,
            natural,
            table,
            constraint,
        }))
    }

    fn parse_table_ref(&mut self) -> Result<TableRef, ParseError> {
        if self.consume_keyword(Keyword::Lateral) {
            let query = self.parse_parenthesized_stmt()?;
            let alias = self.parse_alias()?;
            return Ok(TableRef::Lateral { query, alias });
        }

        if self.check(TokenKind::LParen) {
            if !Self::is_query_start(&self.peek) {
                self.advance();
                return Err(self.error_expected("SELECT or WITH"));
            }
            let query = self.parse_parenthesized_stmt()?;
            let alias = self.parse_alias()?;
            return Ok(TableRef::Derived { query, alias });
        }

        let mut parts = vec![self.parse_identifier("table name")?];
        while self.consume(TokenKind::Dot) {
            parts.push(self.parse_identifier("table name")?);
        }

        if self.check(TokenKind::LParen) {
            let call = self.parse_function_call(parts.join("."))?;
            let alias = self.parse_alias()?;
            return Ok(TableRef::Function { call, alias });
        }

        if parts.len() > 3 {
            return Err(ParseError::new(
                ParseErrorKind::Syntax,
                self.cur.pos,
                format!("table name '{}' has too many parts", parts.join(".")),
            ));
        }

        let name = parts.pop().unwrap_or_default();
        let schema = parts.pop();
        let catalog = parts.pop();
        let alias = self.parse_alias()?;
        Ok(TableRef::Table(TableName {
            catalog,
            schema,
            name,
            alias,
        }))
    }

    // ---- expressions ----

    pub(crate) fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_or()?;
        match self.extensions.infix(self.cur.kind, Precedence::Lowest) {
            Some(handler) => handler(self, expr),
            None => Ok(expr),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        while self.consume_keyword(Keyword::Or) {
            let right = self.parse_and()?;
            left = binary(left, BinaryOp::Or, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_not()?;
        while self.consume_keyword(Keyword::And) {
            let right = self.parse_not()?;
            left = binary(left, BinaryOp::And, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        if self.consume_keyword(Keyword::Not) {
            let expr = self.parse_not()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(expr),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_additive()?;
        loop {
            if let Some(handler) = self.extensions.infix(self.cur.kind, Precedence::Comparison) {
                left = handler(self, left)?;
                continue;
            }
            let op = match self.cur.kind {
                TokenKind::Eq => Some(BinaryOp::Eq),
                TokenKind::Neq => Some(BinaryOp::NotEq),
                TokenKind::Lt => Some(BinaryOp::Lt),
                TokenKind::Gt => Some(BinaryOp::Gt),
                TokenKind::Lte => Some(BinaryOp::LtEq),
                TokenKind::Gte => Some(BinaryOp::GtEq),
                _ => None,
            };
            if let Some(op) = op {
                self.advance();
                let right = self.parse_additive()?;
                left = binary(left, op, right);
                continue;
            }
            match self.parse_predicate(left)? {
                Ok(expr) => left = expr,
                Err(expr) => return Ok(expr),
            }
        }
    }

    /// IS / IN / BETWEEN / LIKE suffixes; hands the operand back when none follows
    fn parse_predicate(&mut self, left: Expr) -> Result<Result<Expr, Expr>, ParseError> {
        if self.consume_keyword(Keyword::Is) {
            let negated = self.consume_keyword(Keyword::Not);
            if self.consume_keyword(Keyword::Null) {
                return Ok(Ok(Expr::IsNull {
                    expr: Box::new(left),
                    negated,
                }));
            }
            if self.consume_keyword(Keyword::Distinct) {
                self.expect_keyword(Keyword::From)?;
                let right = self.parse_additive()?;
                let op = if negated {
                    BinaryOp::IsNotDistinctFrom
                } else {
                    BinaryOp::IsDistinctFrom
                };
                return Ok(Ok(binary(left, op, right)));
            }
            return Err(self.error_expected("NULL or DISTINCT FROM"));
        }

        let negated = self.check_keyword(Keyword::Not)
            && matches!(
                self.peek.kind,
                TokenKind::Keyword(Keyword::In | Keyword::Between | Keyword::Like | Keyword::ILike)
            );
        if negated {
            self.advance();
        }

        match self.cur.kind {
            TokenKind::Keyword(Keyword::In) => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let expr = Box::new(left);
                let result = if Self::is_query_start(&self.cur) {
                    let query = self.parse_nested_stmt()?;
                    Expr::InSubquery {
                        expr,
                        query,
                        negated,
                    }
                } else {
                    let list = self.parse_expr_list()?;
                    Expr::InList {
                        expr,
                        list,
                        negated,
                    }
                };
                self.expect(TokenKind::RParen)?;
                Ok(Ok(result))
            }
            TokenKind::Keyword(Keyword::Between) => {
                self.advance();
                let low = self.parse_additive()?;
                self.expect_keyword(Keyword::And)?;
                let high = self.parse_additive()?;
                Ok(Ok(Expr::Between {
                    expr: Box::new(left),
                    low: Box::new(low),
                    high: Box::new(high),
                    negated,
                }))
            }
            TokenKind::Keyword(kw @ (Keyword::Like | Keyword::ILike)) => {
                self.advance();
                let pattern = self.parse_additive()?;
                let escape = if self.consume_keyword(Keyword::Escape) {
                    Some(Box::new(self.parse_primary()?))
                } else {
                    None
                };
                Ok(Ok(Expr::Like {
                    expr: Box::new(left),
                    pattern: Box::new(pattern),
                    escape,
                    negated,
                    case_insensitive: kw == Keyword::ILike,
                }))
            }
            _ => Ok(Err(left)),
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            if let Some(handler) = self.extensions.infix(self.cur.kind, Precedence::Additive) {
                left = handler(self, left)?;
                continue;
            }
            let op = match self.cur.kind {
                TokenKind::Plus => BinaryOp::Plus,
                TokenKind::Minus => BinaryOp::Minus,
                TokenKind::Concat => BinaryOp::Concat,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = binary(left, op, right);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            if let Some(handler) = self.extensions.infix(self.cur.kind, Precedence::Multiplicative) {
                left = handler(self, left)?;
                continue;
            }
            let op = match self.cur.kind {
                TokenKind::Star => BinaryOp::Multiply,
                TokenKind::Slash => BinaryOp::Divide,
                TokenKind::Percent => BinaryOp::Modulo,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = binary(left, op, right);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.cur.kind {
            TokenKind::Minus => Some(UnaryOp::Minus),
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Keyword(Keyword::Not) => Some(UnaryOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary {
                op,
                expr: Box::new(expr),
            });
        }

        let mut expr = self.parse_primary()?;
        while let Some(handler) = self.extensions.infix(self.cur.kind, Precedence::Postfix) {
            expr = handler(self, expr)?;
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        if let Some(handler) = self.extensions.prefix(self.cur.kind) {
            return handler(self);
        }

        match self.cur.kind {
            TokenKind::Number => Ok(Expr::Literal(Literal::Number(self.advance().literal))),
            TokenKind::String => Ok(Expr::Literal(Literal::String(self.advance().literal))),
            TokenKind::Star => {
                self.advance();
                Ok(Expr::Star)
            }
            TokenKind::LParen => self.parse_parenthesized(),
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(Expr::Literal(Literal::Boolean(true)))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(Expr::Literal(Literal::Boolean(false)))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.advance();
                Ok(Expr::Literal(Literal::Null))
            }
            TokenKind::Keyword(Keyword::Case) => self.parse_case(),
            TokenKind::Keyword(Keyword::Cast) => self.parse_cast(CastKind::Cast),
            TokenKind::Keyword(Keyword::TryCast) => self.parse_cast(CastKind::TryCast),
            TokenKind::Keyword(Keyword::Exists) => {
                self.advance();
                let query = self.parse_parenthesized_stmt()?;
                Ok(Expr::Exists(query))
            }
            TokenKind::Keyword(Keyword::Interval) => self.parse_interval(),
            TokenKind::Keyword(Keyword::Left | Keyword::Right)
                if self.peek.kind == TokenKind::LParen =>
            {
                let name = self.advance().literal;
                Ok(Expr::Function(self.parse_function_call(name)?))
            }
            _ if Self::is_identifier(&self.cur) => self.parse_name_expr(),
            _ => Err(self.error_expected("expression")),
        }
    }

    fn parse_parenthesized(&mut self) -> Result<Expr, ParseError> {
        if Self::is_query_start(&self.peek) {
            if self.in_select_list {
                return Err(ParseError::new(
                    ParseErrorKind::ScalarSubquery,
                    self.cur.pos,
                    "scalar subqueries are not allowed in the SELECT list; \
                     rewrite the subquery as a CTE and JOIN it",
                ));
            }
            let query = self.parse_parenthesized_stmt()?;
            return Ok(Expr::Subquery(query));
        }

        self.expect(TokenKind::LParen)?;
        let first = self.parse_expr()?;
        if self.check(TokenKind::Comma) && self.extensions.infix(TokenKind::Arrow, Precedence::Lowest).is_some() {
            // `(a, b) -> body`: the lambda handler takes the parameter list
            let mut items = vec![first];
            while self.consume(TokenKind::Comma) {
                items.push(self.parse_expr()?);
            }
            self.expect(TokenKind::RParen)?;
            if !self.check(TokenKind::Arrow) {
                return Err(self.error_expected("'->'"));
            }
            return Ok(Expr::List(items));
        }
        self.expect(TokenKind::RParen)?;
        Ok(Expr::Nested(Box::new(first)))
    }

    fn parse_name_expr(&mut self) -> Result<Expr, ParseError> {
        let quoted = self.cur.kind == TokenKind::QuotedIdent;
        let mut parts = vec![self.parse_identifier("identifier")?];
        while self.check(TokenKind::Dot) && Self::is_identifier(&self.peek) {
            self.advance();
            parts.push(self.parse_identifier("identifier")?);
        }

        if self.check(TokenKind::LParen) {
            return Ok(Expr::Function(self.parse_function_call(parts.join("."))?));
        }
        if parts.len() == 1 && !quoted && is_niladic(&parts[0]) {
            return Ok(Expr::Function(FunctionCall::new(parts.remove(0))));
        }

        let name = parts.pop().unwrap_or_default();
        let table = parts.pop();
        Ok(Expr::Column { table, name })
    }

    pub(crate) fn parse_function_call(&mut self, name: String) -> Result<FunctionCall, ParseError> {
        self.expect(TokenKind::LParen)?;
        let mut call = FunctionCall::new(name);

        if self.check(TokenKind::Star) && self.peek.kind == TokenKind::RParen {
            self.advance();
            call.star = true;
        } else if !self.check(TokenKind::RParen) {
            if self.consume_keyword(Keyword::Distinct) {
                call.distinct = true;
            } else {
                self.consume_keyword(Keyword::All);
            }
            call.args = self.parse_expr_list()?;
            if self.consume_keyword(Keyword::Order) {
                self.expect_keyword(Keyword::By)?;
                call.order_by = self.parse_order_items()?;
            }
        }
        self.expect(TokenKind::RParen)?;

        if self.check_keyword(Keyword::Filter) && self.peek.kind == TokenKind::LParen {
            self.advance();
            self.advance();
            self.expect_keyword(Keyword::Where)?;
            call.filter = Some(Box::new(self.parse_expr()?));
            self.expect(TokenKind::RParen)?;
        }

        if self.consume_keyword(Keyword::Over) {
            call.over = Some(if self.consume(TokenKind::LParen) {
                let def = self.parse_window_def()?;
                self.expect(TokenKind::RParen)?;
                WindowSpec::Inline(def)
            } else {
                WindowSpec::Named(self.parse_identifier("window name")?)
            });
        }
        Ok(call)
    }

    /// Body of a window definition, between the parentheses
    fn parse_window_def(&mut self) -> Result<WindowDef, ParseError> {
        let mut def = WindowDef::default();
        if matches!(self.cur.kind, TokenKind::Ident | TokenKind::QuotedIdent) {
            def.base = Some(self.advance().literal);
        }
        if self.consume_keyword(Keyword::Partition) {
            self.expect_keyword(Keyword::By)?;
            def.partition_by = self.parse_expr_list()?;
        }
        if self.consume_keyword(Keyword::Order) {
            self.expect_keyword(Keyword::By)?;
            def.order_by = self.parse_order_items()?;
        }
        let units = match self.cur.kind {
            TokenKind::Keyword(Keyword::Rows) => Some(FrameUnits::Rows),
            TokenKind::Keyword(Keyword::Range) => Some(FrameUnits::Range),
            TokenKind::Keyword(Keyword::Groups) => Some(FrameUnits::Groups),
            _ => None,
        };
        if let Some(units) = units {
            self.advance();
            def.frame = Some(if self.consume_keyword(Keyword::Between) {
                let start = self.parse_frame_bound()?;
                self.expect_keyword(Keyword::And)?;
                let end = self.parse_frame_bound()?;
                WindowFrame {
                    units,
                    start,
                    end: Some(end),
                }
            } else {
                WindowFrame {
                    units,
                    start: self.parse_frame_bound()?,
                    end: None,
                }
            });
        }
        Ok(def)
    }

    fn parse_frame_bound(&mut self) -> Result<FrameBound, ParseError> {
        if self.consume_keyword(Keyword::Unbounded) {
            if self.consume_keyword(Keyword::Preceding) {
                return Ok(FrameBound::UnboundedPreceding);
            }
            self.expect_keyword(Keyword::Following)?;
            return Ok(FrameBound::UnboundedFollowing);
        }
        if self.consume_keyword(Keyword::Current) {
            self.expect_keyword(Keyword::Row)?;
            return Ok(FrameBound::CurrentRow);
        }
        let offset = Box::new(self.parse_additive()?);
        if self.consume_keyword(Keyword::Preceding) {
            Ok(FrameBound::Preceding(offset))
        } else if self.consume_keyword(Keyword::Following) {
            Ok(FrameBound::Following(offset))
        } else {
            Err(self.error_expected("PRECEDING or FOLLOWING"))
        }
    }

    fn parse_case(&mut self) -> Result<Expr, ParseError> {
        self.expect_keyword(Keyword::Case)?;
        let operand = if self.check_keyword(Keyword::When) {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };

        let mut whens = Vec::new();
        while self.consume_keyword(Keyword::When) {
            let condition = self.parse_expr()?;
            self.expect_keyword(Keyword::Then)?;
            let result = self.parse_expr()?;
            whens.push(WhenClause { condition, result });
        }
        if whens.is_empty() {
            return Err(self.error_expected("WHEN"));
        }

        let else_result = if self.consume_keyword(Keyword::Else) {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        self.expect_keyword(Keyword::End)?;
        Ok(Expr::Case {
            operand,
            whens,
            else_result,
        })
    }

    fn parse_cast(&mut self, kind: CastKind) -> Result<Expr, ParseError> {
        self.advance();
        self.expect(TokenKind::LParen)?;
        let expr = self.parse_expr()?;
        self.expect_keyword(Keyword::As)?;
        let data_type = self.parse_data_type()?;
        self.expect(TokenKind::RParen)?;
        Ok(Expr::Cast {
            expr: Box::new(expr),
            data_type,
            kind,
        })
    }

    /// Type name such as `INT`, `DECIMAL(10, 2)`, `TIMESTAMP WITH TIME ZONE`, `INT[]`
    pub(crate) fn parse_data_type(&mut self) -> Result<String, ParseError> {
        let mut words = match self.cur.kind {
            TokenKind::Ident | TokenKind::QuotedIdent | TokenKind::Keyword(_) => {
                vec![self.advance().literal]
            }
            _ => return Err(self.error_expected("type name")),
        };

        loop {
            let continues = match self.cur.kind {
                TokenKind::Ident => TYPE_CONTINUATIONS
                    .iter()
                    .any(|w| w.eq_ignore_ascii_case(&self.cur.literal)),
                TokenKind::Keyword(Keyword::With) => self.peek.literal.eq_ignore_ascii_case("time"),
                _ => false,
            };
            if !continues {
                break;
            }
            words.push(self.advance().literal);
        }
        let mut data_type = words.join(" ");

        if self.check(TokenKind::LParen) {
            data_type.push_str(&self.parse_type_arguments()?);
        }
        while self.check(TokenKind::LBracket) && self.peek.kind == TokenKind::RBracket {
            self.advance();
            self.advance();
            data_type.push_str("[]");
        }
        Ok(data_type)
    }

    /// Parenthesized type arguments, kept as text
    fn parse_type_arguments(&mut self) -> Result<String, ParseError> {
        self.expect(TokenKind::LParen)?;
        let mut text = String::from("(");
        let mut depth = 1;
        let mut needs_space = false;
        loop {
            match self.cur.kind {
                TokenKind::Eof | TokenKind::Illegal => return Err(self.error_expected("')'")),
                TokenKind::LParen => {
                    depth += 1;
                    text.push('(');
                    needs_space = false;
                }
                TokenKind::RParen => {
                    depth -= 1;
                    text.push(')');
                    if depth == 0 {
                        self.advance();
                        return Ok(text);
                    }
                    needs_space = true;
                }
                TokenKind::Comma => {
                    text.push_str(", ");
                    needs_space = false;
                }
                _ => {
                    if needs_space {
                        text.push(' ');
                    }
                    text.push_str(&self.cur.literal);
                    needs_space = true;
                }
            }
            self.advance();
        }
    }

    fn parse_interval(&mut self) -> Result<Expr, ParseError> {
        self.expect_keyword(Keyword::Interval)?;
        let value = self.parse_primary()?;
        let unit = if self.check(TokenKind::Ident) && is_interval_unit(&self.cur.literal) {
            Some(self.advance().literal.to_ascii_uppercase())
        } else {
            None
        };
        Ok(Expr::Interval {
            value: Box::new(value),
            unit,
        })
    }
}

/// Words that extend a multi-word type name
const TYPE_CONTINUATIONS: &[&str] = &["precision", "varying", "without", "time", "zone"];

const INTERVAL_UNITS: &[&str] = &[
    "year", "month", "week", "day", "hour", "minute", "second", "millisecond", "microsecond",
    "quarter",
];

fn is_interval_unit(word: &str) -> bool {
    let lower = word.to_ascii_lowercase();
    let singular = lower.strip_suffix('s').unwrap_or(&lower);
    INTERVAL_UNITS.contains(&singular)
}

fn binary(left: Expr, op: BinaryOp, right: Expr) -> Expr {
    Expr::Binary {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn select_items(sql: &str) -> Vec<SelectItem> {
        parse(sql).unwrap().body.left.items
    }

    fn first_expr(sql: &str) -> Expr {
        match select_items(sql).remove(0) {
            SelectItem::Expr { expr, .. } => expr,
            other => panic!("expected expression item, got {:?}", other),
        }
    }

    #[test]
    fn parse_simple_select() {
        let parser = SqlParser::new();
        let parsed = parser
            .parse("SELECT id, name FROM users WHERE active = true", None)
            .unwrap();

        let core = &parsed.statement.body.left;
        assert_eq!(core.items.len(), 2);
        assert!(core.where_clause.is_some());
        match &core.from.as_ref().unwrap().source {
            TableRef::Table(t) => assert_eq!(t.name, "users"),
            other => panic!("unexpected table ref {:?}", other),
        }
    }

    #[test]
    fn parse_with_cte() {
        let parser = SqlParser::new();
        let parsed = parser
            .parse(
                r#"
                WITH active_users AS (
                    SELECT * FROM users WHERE active = true
                ), recent(id) AS NOT MATERIALIZED (SELECT id FROM active_users)
                SELECT id FROM recent
                "#,
                None,
            )
            .unwrap();

        assert_eq!(parsed.cte_names(), vec!["active_users", "recent"]);
        let with = parsed.statement.with.as_ref().unwrap();
        assert_eq!(with.ctes[1].columns, vec!["id".to_string()]);
    }

    #[test]
    fn parse_invalid_sql() {
        let err = parse("SELECT FROM WHERE").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Syntax);
        assert_eq!(err.position.line, 1);
        assert_eq!(err.position.column, 8);

        let diag = err.to_diagnostic(Some(Path::new("models/bad.sql")));
        assert_eq!(diag.code, DiagnosticCode::SqlParseError);
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.location.unwrap().file.as_deref(), Some("models/bad.sql"));
    }

    #[test]
    fn error_display_has_position() {
        let err = parse("SELECT a\nFROM").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnexpectedEof);
        assert_eq!(err.to_string(), "expected table name, found end of input at line 2, column 5");
    }

    #[test]
    fn illegal_token_reported() {
        let err = parse("SELECT 'open FROM t").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::IllegalToken);
    }

    #[test]
    fn scalar_subquery_rejected() {
        let err = parse("SELECT (SELECT 1) AS x FROM t").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::ScalarSubquery);
        assert!(err.message.contains("CTE"));
        assert!(err.message.contains("JOIN"));

        let diag = err.to_diagnostic(None);
        assert_eq!(diag.code, DiagnosticCode::SqlScalarSubquery);
    }

    #[test]
    fn subqueries_allowed_outside_select_list() {
        assert!(parse("SELECT a FROM t WHERE b = (SELECT max(b) FROM t)").is_ok());
        assert!(parse("SELECT a FROM t WHERE b IN (SELECT b FROM u)").is_ok());
        assert!(parse("SELECT a FROM (SELECT a FROM t) AS s").is_ok());
        assert!(parse("SELECT a, EXISTS (SELECT 1 FROM u) AS e FROM t").is_ok());
    }

    #[test]
    fn qualified_star_vs_column() {
        let items = select_items("SELECT t.*, t.id, * FROM t");
        assert_eq!(items[0], SelectItem::QualifiedStar("t".to_string()));
        assert_eq!(
            items[1],
            SelectItem::Expr {
                expr: Expr::column(Some("t"), "id"),
                alias: None
            }
        );
        assert_eq!(items[2], SelectItem::Star);
    }

    #[test]
    fn implicit_and_explicit_aliases() {
        let stmt = parse("SELECT a AS x, b y FROM orders o JOIN users AS u ON o.uid = u.id").unwrap();
        let core = &stmt.body.left;
        assert_eq!(
            core.items[1],
            SelectItem::Expr {
                expr: Expr::column(None, "b"),
                alias: Some("y".to_string())
            }
        );
        let from = core.from.as_ref().unwrap();
        assert_eq!(from.source.alias(), Some("o"));
        assert_eq!(from.joins[0].table.alias(), Some("u"));
        assert_eq!(from.joins[0].kind, JoinKind::Inner);
    }

    #[test]
    fn precedence_climbing() {
        let expr = first_expr("SELECT a + b * c FROM t");
        match expr {
            Expr::Binary { op: BinaryOp::Plus, right, .. } => {
                assert!(matches!(*right, Expr::Binary { op: BinaryOp::Multiply, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }

        let stmt = parse("SELECT a FROM t WHERE x = 1 OR y = 2 AND NOT z").unwrap();
        match stmt.body.left.where_clause.unwrap() {
            Expr::Binary { op: BinaryOp::Or, right, .. } => {
                assert!(matches!(*right, Expr::Binary { op: BinaryOp::And, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn predicates() {
        let stmt = parse(
            "SELECT a FROM t WHERE a NOT IN (1, 2) AND b BETWEEN 1 AND 5 \
             AND c NOT ILIKE 'x%' ESCAPE '!' AND d IS NOT NULL AND e IS DISTINCT FROM f",
        )
        .unwrap();
        let text = stmt.body.left.where_clause.unwrap().to_string();
        assert_eq!(
            text,
            "a NOT IN (1, 2) AND b BETWEEN 1 AND 5 AND c NOT ILIKE 'x%' ESCAPE '!' \
             AND d IS NOT NULL AND e IS DISTINCT FROM f"
        );
    }

    #[test]
    fn function_call_features() {
        let expr = first_expr(
            "SELECT string_agg(DISTINCT name, ',' ORDER BY name DESC) FILTER (WHERE ok) \
             OVER (PARTITION BY g ORDER BY ts ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW) FROM t",
        );
        let call = match expr {
            Expr::Function(call) => call,
            other => panic!("unexpected {:?}", other),
        };
        assert!(call.distinct);
        assert_eq!(call.args.len(), 2);
        assert_eq!(call.order_by.len(), 1);
        assert!(call.filter.is_some());
        match call.over {
            Some(WindowSpec::Inline(def)) => {
                assert_eq!(def.partition_by.len(), 1);
                let frame = def.frame.unwrap();
                assert_eq!(frame.units, FrameUnits::Rows);
                assert_eq!(frame.start, FrameBound::UnboundedPreceding);
                assert_eq!(frame.end, Some(FrameBound::CurrentRow));
            }
            other => panic!("unexpected window {:?}", other),
        }
    }

    #[test]
    fn count_star_and_niladic() {
        match first_expr("SELECT COUNT(*) FROM t") {
            Expr::Function(call) => assert!(call.star && call.args.is_empty()),
            other => panic!("unexpected {:?}", other),
        }
        match first_expr("SELECT CURRENT_DATE AS d") {
            Expr::Function(call) => assert_eq!(call.name, "CURRENT_DATE"),
            other => panic!("unexpected {:?}", other),
        }
        match first_expr("SELECT LEFT(name, 3) FROM t") {
            Expr::Function(call) => assert_eq!(call.args.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn case_cast_interval() {
        let expr = first_expr("SELECT CASE WHEN a > 0 THEN 'pos' ELSE 'neg' END FROM t");
        assert!(matches!(expr, Expr::Case { operand: None, .. }));

        let expr = first_expr("SELECT CAST(amount AS DECIMAL(10,2)) FROM t");
        match expr {
            Expr::Cast { data_type, kind, .. } => {
                assert_eq!(data_type, "DECIMAL(10, 2)");
                assert_eq!(kind, CastKind::Cast);
            }
            other => panic!("unexpected {:?}", other),
        }

        let expr = first_expr("SELECT TRY_CAST(ts AS TIMESTAMP WITH TIME ZONE) FROM t");
        match expr {
            Expr::Cast { data_type, kind, .. } => {
                assert_eq!(data_type, "TIMESTAMP WITH TIME ZONE");
                assert_eq!(kind, CastKind::TryCast);
            }
            other => panic!("unexpected {:?}", other),
        }

        let stmt = parse("SELECT a FROM t WHERE ts > now() - INTERVAL '1' days").unwrap();
        let text = stmt.body.left.where_clause.unwrap().to_string();
        assert_eq!(text, "ts > now() - INTERVAL '1' DAYS");
    }

    #[test]
    fn interval_does_not_eat_alias() {
        let items = select_items("SELECT INTERVAL '1 day' span");
        match &items[0] {
            SelectItem::Expr { alias, .. } => assert_eq!(alias.as_deref(), Some("span")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn joins() {
        let stmt = parse(
            "SELECT * FROM a LEFT OUTER JOIN b USING (id) CROSS JOIN c NATURAL JOIN d, e \
             FULL JOIN f ON a.x = f.x",
        )
        .unwrap();
        let joins = stmt.body.left.from.unwrap().joins;
        assert_eq!(joins.len(), 5);
        assert_eq!(joins[0].kind, JoinKind::Left);
        assert!(joins[0].outer);
        assert_eq!(joins[0].constraint, Some(JoinConstraint::Using(vec!["id".to_string()])));
        assert_eq!(joins[1].kind, JoinKind::Cross);
        assert!(joins[2].natural);
        assert_eq!(joins[3].kind, JoinKind::Comma);
        assert_eq!(joins[4].kind, JoinKind::Full);
    }

    #[test]
    fn table_names_and_functions() {
        let stmt = parse("SELECT * FROM db.analytics.orders o, generate_series(1, 10) AS g").unwrap();
        let from = stmt.body.left.from.unwrap();
        match &from.source {
            TableRef::Table(t) => {
                assert_eq!(t.parts(), vec!["db", "analytics", "orders"]);
                assert_eq!(t.alias.as_deref(), Some("o"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(&from.joins[0].table, TableRef::Function { alias: Some(a), .. } if a == "g"));

        assert!(parse("SELECT * FROM a.b.c.d").is_err());
    }

    #[test]
    fn lateral_and_set_operations() {
        let stmt = parse(
            "SELECT a FROM t, LATERAL (SELECT b FROM u WHERE u.a = t.a) l \
             UNION ALL SELECT a FROM v EXCEPT SELECT a FROM w",
        )
        .unwrap();
        let set_op = stmt.body.set_op.as_ref().unwrap();
        assert_eq!(set_op.op, SetOperator::Union);
        assert!(set_op.all);
        assert_eq!(set_op.right.set_op.as_ref().unwrap().op, SetOperator::Except);
        assert_eq!(stmt.body.cores().len(), 3);
        assert!(matches!(
            stmt.body.left.from.as_ref().unwrap().joins[0].table,
            TableRef::Lateral { .. }
        ));
    }

    #[test]
    fn recursive_cte() {
        let stmt = parse(
            "WITH RECURSIVE r(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM r WHERE n < 10) SELECT n FROM r",
        )
        .unwrap();
        assert!(stmt.with.unwrap().recursive);
    }

    #[test]
    fn clauses_in_order() {
        let stmt = parse(
            "SELECT DISTINCT a, count(*) FROM t WHERE b > 1 GROUP BY a HAVING count(*) > 2 \
             WINDOW w AS (PARTITION BY a) QUALIFY row_number() OVER w = 1 \
             ORDER BY a DESC NULLS LAST LIMIT 10 OFFSET 5",
        )
        .unwrap();
        let core = stmt.body.left;
        assert!(core.distinct);
        assert!(core.having.is_some());
        assert_eq!(core.windows.len(), 1);
        assert!(core.window("W").is_some());
        assert!(core.qualify.is_some());
        assert!(core.limit.is_some() && core.offset.is_some());
        match core.order_by {
            Some(OrderBy::Items(items)) => {
                assert_eq!(items[0].direction, Some(SortDirection::Desc));
                assert_eq!(items[0].nulls, Some(NullsOrder::Last));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn group_by_all_needs_dialect() {
        assert!(parse("SELECT a, sum(b) FROM t GROUP BY ALL").is_err());

        let stmt = parse_with_dialect("SELECT a, sum(b) FROM t GROUP BY ALL ORDER BY ALL DESC", &DuckDbDialect)
            .unwrap();
        assert_eq!(stmt.body.left.group_by, Some(GroupBy::All));
        assert_eq!(stmt.body.left.order_by, Some(OrderBy::All(Some(SortDirection::Desc))));

        let stmt = parse_with_dialect("SELECT a FROM t GROUP BY ALL", &SnowflakeDialect).unwrap();
        assert_eq!(stmt.body.left.group_by, Some(GroupBy::All));
        assert!(parse_with_dialect("SELECT a FROM t ORDER BY ALL", &SnowflakeDialect).is_err());
    }

    #[test]
    fn duckdb_extensions() {
        let duck = SqlParser::duckdb();
        let parsed = duck
            .parse(
                "SELECT a::INT AS i, xs[1] AS first_x, xs[2:3] AS mid, [1, 2] AS l, \
                 {'k': v} AS s, list_transform(xs, x -> x + 1) AS inc, \
                 list_reduce(xs, (acc, x) -> acc + x) AS total FROM t",
                None,
            )
            .unwrap();
        let items = &parsed.statement.body.left.items;
        let exprs: Vec<&Expr> = items
            .iter()
            .map(|item| match item {
                SelectItem::Expr { expr, .. } => expr,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert!(matches!(exprs[0], Expr::Cast { kind: CastKind::DoubleColon, .. }));
        assert!(matches!(exprs[1], Expr::Index { .. }));
        assert!(matches!(exprs[2], Expr::Slice { .. }));
        assert!(matches!(exprs[3], Expr::List(_)));
        assert!(matches!(exprs[4], Expr::Struct(_)));
        match exprs[5] {
            Expr::Function(call) => assert!(matches!(&call.args[1], Expr::Lambda { params, .. } if params == &vec!["x".to_string()])),
            other => panic!("unexpected {:?}", other),
        }
        match exprs[6] {
            Expr::Function(call) => assert!(matches!(&call.args[1], Expr::Lambda { params, .. } if params.len() == 2)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn extensions_are_dialect_scoped() {
        assert!(parse("SELECT a::INT FROM t").is_err());
        assert!(parse_with_dialect("SELECT a::INT FROM t", &PostgresDialect).is_ok());
        assert!(parse_with_dialect("SELECT [1, 2] FROM t", &PostgresDialect).is_err());
        assert!(parse_with_dialect("SELECT a::INT FROM t", &BigQueryDialect).is_err());
    }

    #[test]
    fn trailing_semicolons_and_garbage() {
        assert!(parse("SELECT 1;;").is_ok());
        let err = parse("SELECT 1 SELECT 2").unwrap_err();
        assert!(err.message.contains("end of statement"));
    }

    #[test]
    fn non_reserved_keywords_as_identifiers() {
        let stmt = parse("SELECT first, last, rows FROM range").unwrap();
        assert_eq!(stmt.body.left.items.len(), 3);
    }

    #[test]
    fn keyword_alias_needs_as() {
        let stmt = parse("SELECT a AS first FROM t").unwrap();
        match &stmt.body.left.items[0] {
            SelectItem::Expr { alias, .. } => assert_eq!(alias.as_deref(), Some("first")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
