//! Graph-pattern query tree consumed by the translator.
//!
//! The structures defined here are produced by an external front end that has
//! already parsed and validated the source query. They derive serde so the
//! front end can hand a query over as JSON. Every expression has a canonical
//! `Display` text which the planner uses as an identity key for aliases and
//! aggregates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Named (or front-end generated) pattern variable.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PatternVar {
    /// Variable name; anonymous variables carry a generated name.
    pub name: String,
    /// Whether the variable was left unnamed in the source query.
    #[serde(default)]
    pub anonymous: bool,
}

impl PatternVar {
    /// Creates a named variable.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            anonymous: false,
        }
    }

    /// Creates an anonymous variable with a generated name.
    pub fn anonymous(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            anonymous: true,
        }
    }
}

/// A directed pattern edge `(src)-[edge]->(dst)`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Connection {
    /// Source vertex.
    pub src: PatternVar,
    /// Destination vertex.
    pub dst: PatternVar,
    /// Edge variable.
    pub edge: PatternVar,
}

/// Grouping key with its declared name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupKey {
    /// Grouping expression.
    pub expr: Expr,
    /// Name the key is visible as after grouping.
    pub alias: String,
}

/// Projected output column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectionElem {
    /// Projected expression.
    pub expr: Expr,
    /// Optional output name.
    #[serde(default)]
    pub alias: Option<String>,
}

/// Sort key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderElem {
    /// Sort expression.
    pub expr: Expr,
    /// Ascending order; descending has no algebra form.
    #[serde(default = "default_ascending")]
    pub ascending: bool,
}

fn default_ascending() -> bool {
    true
}

/// A complete, validated graph-pattern query.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphQuery {
    /// Every vertex of the pattern, including those used by connections.
    #[serde(default)]
    pub vertices: Vec<PatternVar>,
    /// Pairwise pattern edges.
    #[serde(default)]
    pub connections: Vec<Connection>,
    /// Boolean filter expressions (implicitly AND-ed).
    #[serde(default)]
    pub constraints: Vec<Expr>,
    /// Grouping keys.
    #[serde(default)]
    pub group_by: Vec<GroupKey>,
    /// Output columns; empty means every column.
    #[serde(default)]
    pub projection: Vec<ProjectionElem>,
    /// Sort keys.
    #[serde(default)]
    pub order_by: Vec<OrderElem>,
    /// Maximum number of rows.
    #[serde(default)]
    pub limit: Option<u64>,
    /// Number of leading rows to skip.
    #[serde(default)]
    pub offset: Option<u64>,
}

/// Binary operators.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `AND`
    And,
    /// `OR`
    Or,
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
}

impl BinaryOp {
    /// Source-language spelling of the operator.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
        }
    }

    /// Whether the operator is one of the six relational comparisons.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Lt | BinaryOp::Le
        )
    }
}

/// Unary operators.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    /// Arithmetic negation.
    Neg,
    /// Logical negation.
    Not,
}

/// Aggregate functions.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateKind {
    /// `COUNT`
    Count,
    /// `MIN`
    Min,
    /// `MAX`
    Max,
    /// `SUM`
    Sum,
    /// `AVG`
    Avg,
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AggregateKind::Count => "COUNT",
            AggregateKind::Min => "MIN",
            AggregateKind::Max => "MAX",
            AggregateKind::Sum => "SUM",
            AggregateKind::Avg => "AVG",
        })
    }
}

/// Built-in functions the algebra has no operator for.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Builtin {
    /// `id(x)`
    Id,
    /// `regex(x, pattern)`
    Regex,
    /// `has_prop(x, name)`
    HasProp,
    /// `labels(x)`
    VertexLabels,
    /// `in_degree(x)`
    InDegree,
    /// `out_degree(x)`
    OutDegree,
}

impl Builtin {
    /// Function name as written in the source query.
    pub fn name(self) -> &'static str {
        match self {
            Builtin::Id => "id",
            Builtin::Regex => "regex",
            Builtin::HasProp => "has_prop",
            Builtin::VertexLabels => "labels",
            Builtin::InDegree => "in_degree",
            Builtin::OutDegree => "out_degree",
        }
    }
}

/// Expression tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    /// Bare reference to a pattern variable or to an alias.
    VarRef {
        /// Referenced name.
        name: String,
    },
    /// `var.prop`
    PropAccess {
        /// Owning variable.
        var: String,
        /// Property name.
        prop: String,
    },
    /// Integer literal.
    Int {
        /// Value.
        value: i64,
    },
    /// Decimal literal.
    Decimal {
        /// Value.
        value: f64,
    },
    /// String literal.
    Str {
        /// Value.
        value: String,
    },
    /// Boolean literal.
    Bool {
        /// Value.
        value: bool,
    },
    /// `null`
    Null,
    /// Binary operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
    /// Unary operation.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        expr: Box<Expr>,
    },
    /// Aggregate; `arg == None` is the `COUNT(*)` wildcard.
    Aggregate {
        /// Aggregate function.
        func: AggregateKind,
        /// Aggregated expression.
        #[serde(default)]
        arg: Option<Box<Expr>>,
    },
    /// `has_label(var, 'Label')`
    HasLabel {
        /// Tested variable.
        var: String,
        /// Label name.
        label: String,
    },
    /// `label(edge)`
    EdgeLabel {
        /// Edge variable.
        var: String,
    },
    /// Unsupported built-in function call.
    Call {
        /// Function.
        func: Builtin,
        /// Arguments.
        #[serde(default)]
        args: Vec<Expr>,
    },
}

impl Expr {
    /// `name`
    pub fn var(name: impl Into<String>) -> Self {
        Expr::VarRef { name: name.into() }
    }

    /// `var.prop`
    pub fn prop(var: impl Into<String>, prop: impl Into<String>) -> Self {
        Expr::PropAccess {
            var: var.into(),
            prop: prop.into(),
        }
    }

    /// Integer literal.
    pub fn int(value: i64) -> Self {
        Expr::Int { value }
    }

    /// Decimal literal.
    pub fn decimal(value: f64) -> Self {
        Expr::Decimal { value }
    }

    /// String literal.
    pub fn string(value: impl Into<String>) -> Self {
        Expr::Str {
            value: value.into(),
        }
    }

    /// Boolean literal.
    pub fn boolean(value: bool) -> Self {
        Expr::Bool { value }
    }

    /// Binary operation.
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// `lhs = rhs`
    pub fn eq(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Eq, lhs, rhs)
    }

    /// `lhs <> rhs`
    pub fn ne(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Ne, lhs, rhs)
    }

    /// `lhs > rhs`
    pub fn gt(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Gt, lhs, rhs)
    }

    /// `lhs >= rhs`
    pub fn ge(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Ge, lhs, rhs)
    }

    /// `lhs < rhs`
    pub fn lt(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Lt, lhs, rhs)
    }

    /// `lhs <= rhs`
    pub fn le(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Le, lhs, rhs)
    }

    /// `lhs AND rhs`
    pub fn and(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::And, lhs, rhs)
    }

    /// `lhs OR rhs`
    pub fn or(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Or, lhs, rhs)
    }

    /// `NOT expr`
    pub fn not(expr: Expr) -> Self {
        Expr::Unary {
            op: UnaryOp::Not,
            expr: Box::new(expr),
        }
    }

    /// `-expr`
    pub fn neg(expr: Expr) -> Self {
        Expr::Unary {
            op: UnaryOp::Neg,
            expr: Box::new(expr),
        }
    }

    /// Aggregate over an expression.
    pub fn aggregate(func: AggregateKind, arg: Expr) -> Self {
        Expr::Aggregate {
            func,
            arg: Some(Box::new(arg)),
        }
    }

    /// `COUNT(arg)`
    pub fn count(arg: Expr) -> Self {
        Self::aggregate(AggregateKind::Count, arg)
    }

    /// `COUNT(*)`
    pub fn count_all() -> Self {
        Expr::Aggregate {
            func: AggregateKind::Count,
            arg: None,
        }
    }

    /// `has_label(var, 'label')`
    pub fn has_label(var: impl Into<String>, label: impl Into<String>) -> Self {
        Expr::HasLabel {
            var: var.into(),
            label: label.into(),
        }
    }

    /// `label(var)`
    pub fn edge_label(var: impl Into<String>) -> Self {
        Expr::EdgeLabel { var: var.into() }
    }

    /// Built-in function call.
    pub fn call(func: Builtin, args: Vec<Expr>) -> Self {
        Expr::Call { func, args }
    }

    fn needs_parens(&self) -> bool {
        matches!(self, Expr::Binary { .. })
    }
}

struct Operand<'a>(&'a Expr);

impl fmt::Display for Operand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.needs_parens() {
            write!(f, "({})", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::VarRef { name } => f.write_str(name),
            Expr::PropAccess { var, prop } => write!(f, "{var}.{prop}"),
            Expr::Int { value } => write!(f, "{value}"),
            Expr::Decimal { value } => write!(f, "{value:?}"),
            Expr::Str { value } => write!(f, "'{value}'"),
            Expr::Bool { value } => write!(f, "{value}"),
            Expr::Null => f.write_str("null"),
            Expr::Binary { op, lhs, rhs } => {
                write!(f, "{} {} {}", Operand(lhs), op.symbol(), Operand(rhs))
            }
            Expr::Unary { op, expr } => match op {
                UnaryOp::Neg => write!(f, "-{}", Operand(expr)),
                UnaryOp::Not => write!(f, "NOT {}", Operand(expr)),
            },
            Expr::Aggregate { func, arg } => match arg {
                Some(arg) => write!(f, "{func}({arg})"),
                None => write!(f, "{func}(*)"),
            },
            Expr::HasLabel { var, label } => write!(f, "has_label({var}, '{label}')"),
            Expr::EdgeLabel { var } => write!(f, "label({var})"),
            Expr::Call { func, args } => {
                write!(f, "{}(", func.name())?;
                for (idx, arg) in args.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_text_parenthesizes_nested_binaries() {
        let expr = Expr::and(
            Expr::gt(Expr::prop("n", "age"), Expr::int(30)),
            Expr::not(Expr::eq(Expr::prop("n", "name"), Expr::string("Bob"))),
        );
        assert_eq!(expr.to_string(), "(n.age > 30) AND NOT (n.name = 'Bob')");
    }

    #[test]
    fn aggregate_text_is_its_identity_key() {
        assert_eq!(Expr::count(Expr::var("n")).to_string(), "COUNT(n)");
        assert_eq!(Expr::count_all().to_string(), "COUNT(*)");
        let avg = Expr::aggregate(
            AggregateKind::Avg,
            Expr::binary(BinaryOp::Mul, Expr::prop("m", "price"), Expr::decimal(1.5)),
        );
        assert_eq!(avg.to_string(), "AVG(m.price * 1.5)");
    }

    #[test]
    fn decodes_tagged_json() {
        let json = r#"{
            "vertices": [{"name": "n"}],
            "constraints": [{
                "kind": "binary", "op": "eq",
                "lhs": {"kind": "prop_access", "var": "n", "prop": "name"},
                "rhs": {"kind": "str", "value": "Woody Allen"}
            }],
            "order_by": [{"expr": {"kind": "var_ref", "name": "n"}}],
            "limit": 5
        }"#;
        let query: GraphQuery = serde_json::from_str(json).expect("decode succeeds");
        assert_eq!(query.vertices, vec![PatternVar::named("n")]);
        assert_eq!(
            query.constraints,
            vec![Expr::eq(Expr::prop("n", "name"), Expr::string("Woody Allen"))]
        );
        assert!(query.order_by[0].ascending);
        assert_eq!(query.limit, Some(5));
        assert_eq!(query.offset, None);
    }
}
