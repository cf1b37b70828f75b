//! Canonical SQL rendering for the syntax tree
//!
//! Output is single-line, upper-case keywords, and re-parses to an equal tree.
//! Parenthesized input is kept as `Expr::Nested`, so binary operators are
//! printed without adding parentheses of their own.

use crate::ast::*;
use crate::token::Keyword;
use std::fmt::{self, Display, Formatter, Write};

/// Zero-argument functions written without parentheses
pub(crate) const NILADIC_FUNCTIONS: &[&str] = &[
    "current_date",
    "current_time",
    "current_timestamp",
    "localtime",
    "localtimestamp",
];

pub(crate) fn is_niladic(name: &str) -> bool {
    NILADIC_FUNCTIONS
        .iter()
        .any(|n| n.eq_ignore_ascii_case(name))
}

/// Identifier wrapper that quotes when the bare form would not re-lex as itself
pub struct Ident<'a>(pub &'a str);

impl Display for Ident<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // a bare `current_date` would re-parse as a call
        if is_plain_identifier(self.0) && !is_niladic(self.0) {
            f.write_str(self.0)
        } else {
            f.write_char('"')?;
            f.write_str(&self.0.replace('"', "\"\""))?;
            f.write_char('"')
        }
    }
}

fn is_plain_identifier(name: &str) -> bool {
    let mut bytes = name.bytes();
    let starts_ok = match bytes.next() {
        Some(c) => c.is_ascii_alphabetic() || c == b'_' || c >= 0x80,
        None => false,
    };
    starts_ok
        && bytes.all(|c| c.is_ascii_alphanumeric() || c == b'_' || c == b'$' || c >= 0x80)
        && Keyword::lookup(name).is_none()
}

/// Comma-separated list
struct List<'a, T>(&'a [T]);

impl<T: Display> Display for List<'_, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, item) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", item)?;
        }
        Ok(())
    }
}

fn write_idents(f: &mut Formatter<'_>, names: &[String]) -> fmt::Result {
    for (i, name) in names.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", Ident(name))?;
    }
    Ok(())
}

fn write_alias(f: &mut Formatter<'_>, alias: &Option<String>) -> fmt::Result {
    match alias {
        Some(alias) => write!(f, " AS {}", Ident(alias)),
        None => Ok(()),
    }
}

impl Display for SelectStmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(with) = &self.with {
            write!(f, "{} ", with)?;
        }
        write!(f, "{}", self.body)
    }
}

impl Display for WithClause {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("WITH ")?;
        if self.recursive {
            f.write_str("RECURSIVE ")?;
        }
        write!(f, "{}", List(&self.ctes))
    }
}

impl Display for Cte {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Ident(&self.name))?;
        if !self.columns.is_empty() {
            f.write_char('(')?;
            write_idents(f, &self.columns)?;
            f.write_char(')')?;
        }
        write!(f, " AS ({})", self.query)
    }
}

impl Display for SetOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SetOperator::Union => "UNION",
            SetOperator::Intersect => "INTERSECT",
            SetOperator::Except => "EXCEPT",
        })
    }
}

impl Display for SelectBody {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.left)?;
        if let Some(set_op) = &self.set_op {
            write!(f, " {}", set_op.op)?;
            if set_op.all {
                f.write_str(" ALL")?;
            }
            write!(f, " {}", set_op.right)?;
        }
        Ok(())
    }
}

impl Display for SelectCore {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("SELECT ")?;
        if self.distinct {
            f.write_str("DISTINCT ")?;
        }
        write!(f, "{}", List(&self.items))?;
        if let Some(from) = &self.from {
            write!(f, " FROM {}", from)?;
        }
        if let Some(expr) = &self.where_clause {
            write!(f, " WHERE {}", expr)?;
        }
        match &self.group_by {
            Some(GroupBy::All) => f.write_str(" GROUP BY ALL")?,
            Some(GroupBy::Exprs(exprs)) => write!(f, " GROUP BY {}", List(exprs))?,
            None => {}
        }
        if let Some(expr) = &self.having {
            write!(f, " HAVING {}", expr)?;
        }
        if !self.windows.is_empty() {
            f.write_str(" WINDOW ")?;
            for (i, window) in self.windows.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{} AS ({})", Ident(&window.name), window.spec)?;
            }
        }
        if let Some(expr) = &self.qualify {
            write!(f, " QUALIFY {}", expr)?;
        }
        match &self.order_by {
            Some(OrderBy::All(direction)) => {
                f.write_str(" ORDER BY ALL")?;
                write_direction(f, *direction)?;
            }
            Some(OrderBy::Items(items)) => write!(f, " ORDER BY {}", List(items))?,
            None => {}
        }
        if let Some(expr) = &self.limit {
            write!(f, " LIMIT {}", expr)?;
        }
        if let Some(expr) = &self.offset {
            write!(f, " OFFSET {}", expr)?;
        }
        Ok(())
    }
}

fn write_direction(f: &mut Formatter<'_>, direction: Option<SortDirection>) -> fmt::Result {
    match direction {
        Some(SortDirection::Asc) => f.write_str(" ASC"),
        Some(SortDirection::Desc) => f.write_str(" DESC"),
        None => Ok(()),
    }
}

impl Display for SelectItem {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SelectItem::Star => f.write_char('*'),
            SelectItem::QualifiedStar(table) => write!(f, "{}.*", Ident(table)),
            SelectItem::Expr { expr, alias } => {
                write!(f, "{}", expr)?;
                write_alias(f, alias)
            }
        }
    }
}

impl Display for OrderItem {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)?;
        write_direction(f, self.direction)?;
        match self.nulls {
            Some(NullsOrder::First) => f.write_str(" NULLS FIRST"),
            Some(NullsOrder::Last) => f.write_str(" NULLS LAST"),
            None => Ok(()),
        }
    }
}

impl Display for FromClause {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)?;
        for join in &self.joins {
            write!(f, "{}", join)?;
        }
        Ok(())
    }
}

impl Display for TableRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TableRef::Table(table) => write!(f, "{}", table),
            TableRef::Derived { query, alias } => {
                write!(f, "({})", query)?;
                write_alias(f, alias)
            }
            TableRef::Lateral { query, alias } => {
                write!(f, "LATERAL ({})", query)?;
                write_alias(f, alias)
            }
            TableRef::Function { call, alias } => {
                write!(f, "{}", call)?;
                write_alias(f, alias)
            }
        }
    }
}

impl Display for TableName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, part) in self.parts().into_iter().enumerate() {
            if i > 0 {
                f.write_char('.')?;
            }
            write!(f, "{}", Ident(part))?;
        }
        write_alias(f, &self.alias)
    }
}

impl Display for Join {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.kind == JoinKind::Comma {
            return write!(f, ", {}", self.table);
        }
        f.write_char(' ')?;
        if self.natural {
            f.write_str("NATURAL ")?;
        }
        let kind = match self.kind {
            JoinKind::Comma | JoinKind::Inner => "INNER",
            JoinKind::Cross => "CROSS",
            JoinKind::Left => "LEFT",
            JoinKind::Right => "RIGHT",
            JoinKind::Full => "FULL",
        };
        f.write_str(kind)?;
        if self.outer {
            f.write_str(" OUTER")?;
        }
        write!(f, " JOIN {}", self.table)?;
        match &self.constraint {
            Some(JoinConstraint::On(expr)) => write!(f, " ON {}", expr),
            Some(JoinConstraint::Using(columns)) => {
                f.write_str(" USING (")?;
                write_idents(f, columns)?;
                f.write_char(')')
            }
            None => Ok(()),
        }
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Number(n) => f.write_str(n),
            Literal::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Literal::Boolean(true) => f.write_str("TRUE"),
            Literal::Boolean(false) => f.write_str("FALSE"),
            Literal::Null => f.write_str("NULL"),
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column { table, name } => {
                if let Some(table) = table {
                    write!(f, "{}.", Ident(table))?;
                }
                write!(f, "{}", Ident(name))
            }
            Expr::Literal(lit) => write!(f, "{}", lit),
            Expr::Binary { left, op, right } => write!(f, "{} {} {}", left, op.as_str(), right),
            Expr::Unary { op, expr } => match op {
                UnaryOp::Not => write!(f, "NOT {}", expr),
                UnaryOp::Minus | UnaryOp::Plus => {
                    f.write_char(if *op == UnaryOp::Minus { '-' } else { '+' })?;
                    // `- -x` must not collapse into a line comment
                    if matches!(**expr, Expr::Unary { op: UnaryOp::Minus | UnaryOp::Plus, .. }) {
                        f.write_char(' ')?;
                    }
                    write!(f, "{}", expr)
                }
            },
            Expr::Function(call) => write!(f, "{}", call),
            Expr::Case {
                operand,
                whens,
                else_result,
            } => {
                f.write_str("CASE")?;
                if let Some(operand) = operand {
                    write!(f, " {}", operand)?;
                }
                for when in whens {
                    write!(f, " WHEN {} THEN {}", when.condition, when.result)?;
                }
                if let Some(else_result) = else_result {
                    write!(f, " ELSE {}", else_result)?;
                }
                f.write_str(" END")
            }
            Expr::Cast {
                expr,
                data_type,
                kind,
            } => match kind {
                CastKind::Cast => write!(f, "CAST({} AS {})", expr, data_type),
                CastKind::TryCast => write!(f, "TRY_CAST({} AS {})", expr, data_type),
                CastKind::DoubleColon => write!(f, "{}::{}", expr, data_type),
            },
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                write!(f, "{}{} IN ({})", expr, not(*negated), List(list))
            }
            Expr::InSubquery {
                expr,
                query,
                negated,
            } => write!(f, "{}{} IN ({})", expr, not(*negated), query),
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => write!(f, "{}{} BETWEEN {} AND {}", expr, not(*negated), low, high),
            Expr::Like {
                expr,
                pattern,
                escape,
                negated,
                case_insensitive,
            } => {
                let op = if *case_insensitive { "ILIKE" } else { "LIKE" };
                write!(f, "{}{} {} {}", expr, not(*negated), op, pattern)?;
                if let Some(escape) = escape {
                    write!(f, " ESCAPE {}", escape)?;
                }
                Ok(())
            }
            Expr::IsNull { expr, negated } => write!(f, "{} IS{} NULL", expr, not(*negated)),
            Expr::Interval { value, unit } => {
                write!(f, "INTERVAL {}", value)?;
                if let Some(unit) = unit {
                    write!(f, " {}", unit)?;
                }
                Ok(())
            }
            Expr::Nested(expr) => write!(f, "({})", expr),
            Expr::Subquery(query) => write!(f, "({})", query),
            Expr::Exists(query) => write!(f, "EXISTS ({})", query),
            Expr::Star => f.write_char('*'),
            Expr::Index { expr, index } => write!(f, "{}[{}]", expr, index),
            Expr::Slice { expr, start, end } => {
                write!(f, "{}[", expr)?;
                if let Some(start) = start {
                    write!(f, "{}", start)?;
                }
                f.write_char(':')?;
                if let Some(end) = end {
                    write!(f, "{}", end)?;
                }
                f.write_char(']')
            }
            Expr::List(items) => write!(f, "[{}]", List(items)),
            Expr::Struct(fields) => {
                f.write_char('{')?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", Literal::String(field.name.clone()), field.value)?;
                }
                f.write_char('}')
            }
            Expr::Lambda { params, body } => {
                if let [param] = params.as_slice() {
                    write!(f, "{}", Ident(param))?;
                } else {
                    f.write_char('(')?;
                    write_idents(f, params)?;
                    f.write_char(')')?;
                }
                write!(f, " -> {}", body)
            }
        }
    }
}

fn not(negated: bool) -> &'static str {
    if negated {
        " NOT"
    } else {
        ""
    }
}

impl Display for FunctionCall {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let bare = is_niladic(&self.name)
            && self.args.is_empty()
            && !self.star
            && self.order_by.is_empty();
        for (i, part) in self.name.split('.').enumerate() {
            if i > 0 {
                f.write_char('.')?;
            }
            // keyword-named functions such as LEFT() are written bare
            if is_plain_identifier(part) || Keyword::lookup(part).is_some() {
                f.write_str(part)?;
            } else {
                write!(f, "{}", Ident(part))?;
            }
        }
        if !bare {
            f.write_char('(')?;
            if self.star {
                f.write_char('*')?;
            } else {
                if self.distinct {
                    f.write_str("DISTINCT ")?;
                }
                write!(f, "{}", List(&self.args))?;
                if !self.order_by.is_empty() {
                    write!(f, " ORDER BY {}", List(&self.order_by))?;
                }
            }
            f.write_char(')')?;
        }
        if let Some(filter) = &self.filter {
            write!(f, " FILTER (WHERE {})", filter)?;
        }
        match &self.over {
            Some(WindowSpec::Named(name)) => write!(f, " OVER {}", Ident(name)),
            Some(WindowSpec::Inline(def)) => write!(f, " OVER ({})", def),
            None => Ok(()),
        }
    }
}

impl Display for WindowDef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        if let Some(base) = &self.base {
            parts.push(Ident(base).to_string());
        }
        if !self.partition_by.is_empty() {
            parts.push(format!("PARTITION BY {}", List(&self.partition_by)));
        }
        if !self.order_by.is_empty() {
            parts.push(format!("ORDER BY {}", List(&self.order_by)));
        }
        if let Some(frame) = &self.frame {
            parts.push(frame.to_string());
        }
        f.write_str(&parts.join(" "))
    }
}

impl Display for WindowFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let units = match self.units {
            FrameUnits::Rows => "ROWS",
            FrameUnits::Range => "RANGE",
            FrameUnits::Groups => "GROUPS",
        };
        match &self.end {
            Some(end) => write!(f, "{} BETWEEN {} AND {}", units, self.start, end),
            None => write!(f, "{} {}", units, self.start),
        }
    }
}

impl Display for FrameBound {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FrameBound::UnboundedPreceding => f.write_str("UNBOUNDED PRECEDING"),
            FrameBound::Preceding(n) => write!(f, "{} PRECEDING", n),
            FrameBound::CurrentRow => f.write_str("CURRENT ROW"),
            FrameBound::Following(n) => write!(f, "{} FOLLOWING", n),
            FrameBound::UnboundedFollowing => f.write_str("UNBOUNDED FOLLOWING"),
        }
    }
}
