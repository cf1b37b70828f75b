//! Syntax tree for SELECT/WITH statements
//!
//! The tree is built bottom-up by the parser and never mutated afterwards.
//! Nested statements are owned values, so the tree cannot contain cycles.

/// A complete statement: optional WITH clause plus a select body
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStmt {
    pub with: Option<WithClause>,
    pub body: SelectBody,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithClause {
    pub recursive: bool,
    pub ctes: Vec<Cte>,
}

/// A named subquery from a WITH clause
#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    pub name: String,
    /// Explicit output column names, `WITH a(x, y) AS (...)`
    pub columns: Vec<String>,
    pub query: Box<SelectStmt>,
}

/// A select core optionally chained to further cores by set operations
#[derive(Debug, Clone, PartialEq)]
pub struct SelectBody {
    pub left: SelectCore,
    pub set_op: Option<SetOperation>,
}

impl SelectBody {
    /// All select cores of the chain, left to right
    pub fn cores(&self) -> Vec<&SelectCore> {
        let mut cores = vec![&self.left];
        let mut next = &self.set_op;
        while let Some(op) = next {
            cores.push(&op.right.left);
            next = &op.right.set_op;
        }
        cores
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetOperation {
    pub op: SetOperator,
    pub all: bool,
    pub right: Box<SelectBody>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOperator {
    Union,
    Intersect,
    Except,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectCore {
    pub distinct: bool,
    pub items: Vec<SelectItem>,
    pub from: Option<FromClause>,
    pub where_clause: Option<Expr>,
    pub group_by: Option<GroupBy>,
    pub having: Option<Expr>,
    pub windows: Vec<NamedWindow>,
    pub qualify: Option<Expr>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<Expr>,
    pub offset: Option<Expr>,
}

impl SelectCore {
    /// Look up a named window from the WINDOW clause
    pub fn window(&self, name: &str) -> Option<&WindowDef> {
        self.windows
            .iter()
            .find(|w| w.name.eq_ignore_ascii_case(name))
            .map(|w| &w.spec)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// `*`
    Star,
    /// `table.*`
    QualifiedStar(String),
    /// `expr [AS alias]`
    Expr { expr: Expr, alias: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum GroupBy {
    /// `GROUP BY ALL`
    All,
    Exprs(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderBy {
    /// `ORDER BY ALL [ASC|DESC]`
    All(Option<SortDirection>),
    Items(Vec<OrderItem>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub expr: Expr,
    pub direction: Option<SortDirection>,
    pub nulls: Option<NullsOrder>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedWindow {
    pub name: String,
    pub spec: WindowDef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FromClause {
    pub source: TableRef,
    pub joins: Vec<Join>,
}

impl FromClause {
    /// Every table reference, source first
    pub fn tables(&self) -> impl Iterator<Item = &TableRef> {
        std::iter::once(&self.source).chain(self.joins.iter().map(|j| &j.table))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableRef {
    Table(TableName),
    Derived {
        query: Box<SelectStmt>,
        alias: Option<String>,
    },
    Lateral {
        query: Box<SelectStmt>,
        alias: Option<String>,
    },
    /// Table function, `read_csv('x.csv') AS r`
    Function {
        call: FunctionCall,
        alias: Option<String>,
    },
}

impl TableRef {
    pub fn alias(&self) -> Option<&str> {
        match self {
            TableRef::Table(t) => t.alias.as_deref(),
            TableRef::Derived { alias, .. }
            | TableRef::Lateral { alias, .. }
            | TableRef::Function { alias, .. } => alias.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableName {
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub name: String,
    pub alias: Option<String>,
}

impl TableName {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Name parts that were written, outermost first
    pub fn parts(&self) -> Vec<&str> {
        [self.catalog.as_deref(), self.schema.as_deref(), Some(self.name.as_str())]
            .into_iter()
            .flatten()
            .collect()
    }

    pub fn is_qualified(&self) -> bool {
        self.catalog.is_some() || self.schema.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub outer: bool,
    pub natural: bool,
    pub table: TableRef,
    pub constraint: Option<JoinConstraint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// `FROM a, b`
    Comma,
    Cross,
    Inner,
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinConstraint {
    On(Expr),
    Using(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column {
        table: Option<String>,
        name: String,
    },
    Literal(Literal),
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Function(FunctionCall),
    Case {
        operand: Option<Box<Expr>>,
        whens: Vec<WhenClause>,
        else_result: Option<Box<Expr>>,
    },
    Cast {
        expr: Box<Expr>,
        data_type: String,
        kind: CastKind,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    InSubquery {
        expr: Box<Expr>,
        query: Box<SelectStmt>,
        negated: bool,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        escape: Option<Box<Expr>>,
        negated: bool,
        case_insensitive: bool,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    Interval {
        value: Box<Expr>,
        unit: Option<String>,
    },
    /// Parenthesized expression
    Nested(Box<Expr>),
    /// Scalar subquery
    Subquery(Box<SelectStmt>),
    Exists(Box<SelectStmt>),
    Star,
    /// `expr[index]`
    Index {
        expr: Box<Expr>,
        index: Box<Expr>,
    },
    /// `expr[start:end]`
    Slice {
        expr: Box<Expr>,
        start: Option<Box<Expr>>,
        end: Option<Box<Expr>>,
    },
    /// `[a, b, c]`
    List(Vec<Expr>),
    /// `{'key': value, ...}`
    Struct(Vec<StructField>),
    /// `x -> x + 1`
    Lambda {
        params: Vec<String>,
        body: Box<Expr>,
    },
}

impl Expr {
    pub fn column(table: Option<&str>, name: &str) -> Self {
        Expr::Column {
            table: table.map(str::to_string),
            name: name.to_string(),
        }
    }

    /// Direct sub-expressions, excluding nested statements
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Column { .. }
            | Expr::Literal(_)
            | Expr::Subquery(_)
            | Expr::Exists(_)
            | Expr::Star => Vec::new(),
            Expr::Binary { left, right, .. } => vec![&**left, &**right],
            Expr::Unary { expr, .. }
            | Expr::Cast { expr, .. }
            | Expr::IsNull { expr, .. }
            | Expr::Nested(expr)
            | Expr::InSubquery { expr, .. } => vec![&**expr],
            Expr::Function(call) => call.children(),
            Expr::Case {
                operand,
                whens,
                else_result,
            } => {
                let mut out: Vec<&Expr> = Vec::new();
                out.extend(operand.as_deref());
                for when in whens {
                    out.push(&when.condition);
                    out.push(&when.result);
                }
                out.extend(else_result.as_deref());
                out
            }
            Expr::InList { expr, list, .. } => {
                let mut out: Vec<&Expr> = vec![&**expr];
                out.extend(list.iter());
                out
            }
            Expr::Between {
                expr, low, high, ..
            } => vec![&**expr, &**low, &**high],
            Expr::Like {
                expr,
                pattern,
                escape,
                ..
            } => {
                let mut out: Vec<&Expr> = vec![&**expr, &**pattern];
                out.extend(escape.as_deref());
                out
            }
            Expr::Interval { value, .. } => vec![&**value],
            Expr::Index { expr, index } => vec![&**expr, &**index],
            Expr::Slice { expr, start, end } => {
                let mut out: Vec<&Expr> = vec![&**expr];
                out.extend(start.as_deref());
                out.extend(end.as_deref());
                out
            }
            Expr::List(items) => items.iter().collect(),
            Expr::Struct(fields) => fields.iter().map(|f| &f.value).collect(),
            Expr::Lambda { body, .. } => vec![&**body],
        }
    }

    /// Statement nested directly in this expression, if any
    pub fn subquery(&self) -> Option<&SelectStmt> {
        match self {
            Expr::Subquery(query) | Expr::Exists(query) | Expr::InSubquery { query, .. } => {
                Some(query)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Numeric literal as written
    Number(String),
    String(String),
    Boolean(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    IsDistinctFrom,
    IsNotDistinctFrom,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Concat,
}

impl BinaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Or => "OR",
            BinaryOp::And => "AND",
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::LtEq => "<=",
            BinaryOp::GtEq => ">=",
            BinaryOp::IsDistinctFrom => "IS DISTINCT FROM",
            BinaryOp::IsNotDistinctFrom => "IS NOT DISTINCT FROM",
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Concat => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Minus,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastKind {
    /// `CAST(x AS t)`
    Cast,
    /// `TRY_CAST(x AS t)`
    TryCast,
    /// `x::t`
    DoubleColon,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhenClause {
    pub condition: Expr,
    pub result: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructField {
    pub name: String,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    /// Function name as written, dotted if qualified
    pub name: String,
    pub args: Vec<Expr>,
    /// `COUNT(*)`
    pub star: bool,
    pub distinct: bool,
    /// In-argument ordering, `STRING_AGG(x, ',' ORDER BY y)`
    pub order_by: Vec<OrderItem>,
    pub filter: Option<Box<Expr>>,
    pub over: Option<WindowSpec>,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            star: false,
            distinct: false,
            order_by: Vec::new(),
            filter: None,
            over: None,
        }
    }

    pub fn with_args(mut self, args: Vec<Expr>) -> Self {
        self.args = args;
        self
    }

    /// Arguments, in-argument ORDER BY, FILTER, and inline window expressions
    pub fn children(&self) -> Vec<&Expr> {
        let mut out: Vec<&Expr> = self.args.iter().collect();
        out.extend(self.order_by.iter().map(|o| &o.expr));
        out.extend(self.filter.as_deref());
        if let Some(WindowSpec::Inline(def)) = &self.over {
            out.extend(def.exprs());
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WindowSpec {
    /// `OVER w`
    Named(String),
    /// `OVER (...)`
    Inline(WindowDef),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct WindowDef {
    /// Named window this definition extends
    pub base: Option<String>,
    pub partition_by: Vec<Expr>,
    pub order_by: Vec<OrderItem>,
    pub frame: Option<WindowFrame>,
}

impl WindowDef {
    /// Every expression referenced by the window
    pub fn exprs(&self) -> Vec<&Expr> {
        let mut out: Vec<&Expr> = self.partition_by.iter().collect();
        out.extend(self.order_by.iter().map(|o| &o.expr));
        if let Some(frame) = &self.frame {
            out.extend(frame.start.offset());
            if let Some(end) = &frame.end {
                out.extend(end.offset());
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowFrame {
    pub units: FrameUnits,
    pub start: FrameBound,
    pub end: Option<FrameBound>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameUnits {
    Rows,
    Range,
    Groups,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameBound {
    UnboundedPreceding,
    Preceding(Box<Expr>),
    CurrentRow,
    Following(Box<Expr>),
    UnboundedFollowing,
}

impl FrameBound {
    fn offset(&self) -> Option<&Expr> {
        match self {
            FrameBound::Preceding(e) | FrameBound::Following(e) => Some(e),
            _ => None,
        }
    }
}
