#![forbid(unsafe_code)]

//! Operator tree for the positional-column graph algebra.
//!
//! Plans are built bottom-up as [`PlanNode`] trees and serialized to the
//! textual algebra only at the end through `Display`. An [`AlgebraPlan`]
//! couples the tree with the [`Schema`] of the columns it produces.

use std::fmt;
use std::hash::Hasher;
use std::mem;

use serde::Serialize;
use xxhash_rust::xxh64::Xxh64;

use crate::query::schema::Schema;

/// Comparison operators accepted by attribute-filtered scans.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ScanComparison {
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

impl ScanComparison {
    /// Algebra spelling.
    pub fn symbol(self) -> &'static str {
        match self {
            ScanComparison::Eq => "=",
            ScanComparison::Ne => "<>",
            ScanComparison::Gt => ">",
            ScanComparison::Ge => ">=",
            ScanComparison::Lt => "<",
            ScanComparison::Le => "<=",
        }
    }
}

/// Literal compared against an attribute by a seed scan.
#[derive(Clone, Debug, PartialEq)]
pub enum ScanValue {
    /// String value.
    Str(String),
    /// Integer value.
    Int(i64),
    /// Decimal value.
    Decimal(f64),
    /// Boolean value.
    Bool(bool),
}

impl fmt::Display for ScanValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanValue::Str(value) => write!(f, "'{value}'"),
            ScanValue::Int(value) => write!(f, "{value}"),
            ScanValue::Decimal(value) => write!(f, "{value:?}F"),
            ScanValue::Bool(true) => f.write_str("True"),
            ScanValue::Bool(false) => f.write_str("False"),
        }
    }
}

/// Neighbor-expansion direction.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Direction {
    /// Follow edges leaving the start column.
    Outgoing,
    /// Follow edges entering the start column.
    Ingoing,
}

impl Direction {
    /// Algebra spelling.
    pub fn keyword(self) -> &'static str {
        match self {
            Direction::Outgoing => "OUTGOING",
            Direction::Ingoing => "INGOING",
        }
    }
}

/// One algebra operator with its arguments; inputs live on [`PlanNode`].
#[derive(Clone, Debug, PartialEq)]
pub enum AlgebraOp {
    /// Every node. Leaf.
    ScanNodes,
    /// Every object with a label. Leaf.
    ScanLabel {
        /// Label name.
        label: String,
    },
    /// Objects whose attribute satisfies a comparison. Leaf.
    SelectAttribute {
        /// Attribute scope keyword.
        scope: String,
        /// Attribute name.
        attr: String,
        /// Comparison.
        op: ScanComparison,
        /// Compared literal.
        value: ScanValue,
    },
    /// Rows whose new traversal columns equal already bound columns.
    MatchColumns {
        /// `(existing, produced)` column pairs.
        pairs: Vec<(usize, usize)>,
    },
    /// Rows satisfying a compiled predicate.
    Select {
        /// Algebra expression.
        predicate: String,
    },
    /// Source and destination of the edge in `edge_col`.
    Adjacent {
        /// Edge column.
        edge_col: usize,
    },
    /// Edge and peer of every edge incident to `col`.
    Explode {
        /// Start column.
        col: usize,
        /// Direction.
        direction: Direction,
    },
    /// Attribute values of the objects in `col`.
    GetAttributes {
        /// Object column.
        col: usize,
        /// Attribute scope keyword.
        scope: String,
        /// Attribute names, one new column each.
        attrs: Vec<String>,
    },
    /// Label of the objects in `col`.
    GetType {
        /// Object column.
        col: usize,
    },
    /// Join of two inputs.
    Join {
        /// Algebra expression over both inputs' columns.
        predicate: String,
        /// Join type keyword.
        join_type: String,
    },
    /// Cross product of two inputs.
    Product,
    /// One computed column.
    Extend {
        /// Declared result type.
        result_type: String,
        /// Algebra expression.
        expr: String,
    },
    /// Grouping with aggregates.
    Group {
        /// Grouping columns.
        columns: Vec<usize>,
        /// Aggregate expressions such as `COUNT(2)`.
        aggregates: Vec<String>,
    },
    /// Sort by columns.
    Sort {
        /// Sort columns.
        columns: Vec<usize>,
    },
    /// Keep only the listed columns.
    Project {
        /// Output columns.
        columns: Vec<usize>,
    },
    /// Offset/limit window.
    Slice {
        /// Rows to skip.
        offset: Option<u64>,
        /// Maximum rows.
        limit: Option<u64>,
    },
}

/// Operator node with typed children.
#[derive(Clone, Debug, PartialEq)]
pub struct PlanNode {
    /// Operator.
    pub op: AlgebraOp,
    /// Input plans; empty for leaves, two for JOIN/PRODUCT.
    pub inputs: Vec<PlanNode>,
}

impl PlanNode {
    /// Creates a leaf node.
    pub fn new(op: AlgebraOp) -> Self {
        Self {
            op,
            inputs: Vec::new(),
        }
    }

    /// Creates a node with inputs.
    pub fn with_inputs(op: AlgebraOp, inputs: Vec<PlanNode>) -> Self {
        Self { op, inputs }
    }

    /// Visits this node and every descendant, parents first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a PlanNode)) {
        visit(self);
        for input in &self.inputs {
            input.walk(visit);
        }
    }

    /// Number of nodes in the tree matching `pred`.
    pub fn count(&self, pred: impl Fn(&AlgebraOp) -> bool) -> usize {
        let mut total = 0;
        self.walk(&mut |node| {
            if pred(&node.op) {
                total += 1;
            }
        });
        total
    }

    fn input(&self, idx: usize) -> Input<'_> {
        Input(self.inputs.get(idx))
    }
}

struct Input<'a>(Option<&'a PlanNode>);

impl fmt::Display for Input<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(node) => write!(f, "{node}"),
            None => Ok(()),
        }
    }
}

struct Positions<'a>(&'a [usize]);

impl fmt::Display for Positions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[ ")?;
        for (idx, pos) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{pos}")?;
        }
        f.write_str(" ]")
    }
}

impl fmt::Display for PlanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let input = self.input(0);
        match &self.op {
            AlgebraOp::ScanNodes => f.write_str("GRAPH::SCAN(NODES)"),
            AlgebraOp::ScanLabel { label } => write!(f, "GRAPH::SCAN('{label}')"),
            AlgebraOp::SelectAttribute {
                scope,
                attr,
                op,
                value,
            } => write!(
                f,
                "GRAPH::SELECT( {scope} '{attr}' {} {value} )",
                op.symbol()
            ),
            AlgebraOp::MatchColumns { pairs } => match pairs.as_slice() {
                [(a, b)] => write!(f, "SELECT({input}, %{a}=%{b} )"),
                _ => {
                    write!(f, "SELECT({input}, ")?;
                    for (idx, (a, b)) in pairs.iter().enumerate() {
                        if idx > 0 {
                            f.write_str(" AND ")?;
                        }
                        write!(f, "(%{a}=%{b})")?;
                    }
                    f.write_str(" )")
                }
            },
            AlgebraOp::Select { predicate } => write!(f, "SELECT( {input}, {predicate} )"),
            AlgebraOp::Adjacent { edge_col } => {
                write!(f, "GRAPH::ADJACENT({input}, {edge_col})")
            }
            AlgebraOp::Explode { col, direction } => write!(
                f,
                "GRAPH::EXPLODE({input}, {col}, [ ALL {} ], {{'neighbor'=true}} )",
                direction.keyword()
            ),
            AlgebraOp::GetAttributes { col, scope, attrs } => {
                write!(f, "GRAPH::GET({input}, {col}, [")?;
                for (idx, attr) in attrs.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, " {scope} '{attr}'")?;
                }
                f.write_str(" ])")
            }
            AlgebraOp::GetType { col } => write!(f, "GRAPH::GET_TYPE( {input}, {col} )"),
            AlgebraOp::Join {
                predicate,
                join_type,
            } => write!(
                f,
                "JOIN( {input}, {}, {predicate}, {{'type'='{join_type}'}} )",
                self.input(1)
            ),
            AlgebraOp::Product => write!(f, "PRODUCT( {input}, {} )", self.input(1)),
            AlgebraOp::Extend { result_type, expr } => write!(
                f,
                "EXTEND( {input}, [ {result_type} ], [ {result_type}({expr}) ] )"
            ),
            AlgebraOp::Group {
                columns,
                aggregates,
            } => {
                write!(f, "GROUP( {input}, {}, [ ", Positions(columns))?;
                if aggregates.is_empty() {
                    f.write_str("null")?;
                } else {
                    f.write_str(&aggregates.join(", "))?;
                }
                f.write_str(" ])")
            }
            AlgebraOp::Sort { columns } => write!(f, "SORT({input}, {})", Positions(columns)),
            AlgebraOp::Project { columns } => {
                write!(f, "PROJECT({input}, {})", Positions(columns))
            }
            AlgebraOp::Slice { offset, limit } => {
                let bound = |value: &Option<u64>| match value {
                    Some(v) => v.to_string(),
                    None => "NULL".to_owned(),
                };
                write!(f, "SLICE( {input}, {}, {} )", bound(offset), bound(limit))
            }
        }
    }
}

/// Operator tree plus the schema of the columns it produces.
#[derive(Clone, Debug)]
pub struct AlgebraPlan {
    root: PlanNode,
    /// Columns produced by `root`.
    pub schema: Schema,
}

impl AlgebraPlan {
    /// Starts a plan from a leaf operator with an empty schema.
    pub fn seed(op: AlgebraOp) -> Self {
        Self {
            root: PlanNode::new(op),
            schema: Schema::new(),
        }
    }

    /// Current operator tree.
    pub fn root(&self) -> &PlanNode {
        &self.root
    }

    /// Wraps the current tree in a unary operator.
    pub fn wrap(&mut self, op: AlgebraOp) {
        let input = mem::replace(&mut self.root, PlanNode::new(AlgebraOp::ScanNodes));
        self.root = PlanNode::with_inputs(op, vec![input]);
    }

    /// Wraps the current tree and `other` in a binary operator.
    pub fn combine(&mut self, op: AlgebraOp, other: PlanNode) {
        let input = mem::replace(&mut self.root, PlanNode::new(AlgebraOp::ScanNodes));
        self.root = PlanNode::with_inputs(op, vec![input, other]);
    }

    /// Splits the plan into its tree and schema.
    pub fn into_parts(self) -> (PlanNode, Schema) {
        (self.root, self.schema)
    }

    /// Serialized algebra text.
    pub fn text(&self) -> String {
        self.root.to_string()
    }
}

/// Human-readable explain tree.
#[derive(Clone, Debug, Serialize)]
pub struct PlanExplain {
    /// Root node of the explain tree.
    pub root: ExplainNode,
    /// Deterministic hash for the plan.
    pub plan_hash: u64,
}

impl PlanExplain {
    /// Serializes the explain tree as JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Explain node representing an operator with its arguments.
#[derive(Clone, Debug, Serialize)]
pub struct ExplainNode {
    /// Operator name.
    pub op: String,
    /// Operator arguments.
    pub props: Vec<ExplainProp>,
    /// Input operators.
    pub inputs: Vec<ExplainNode>,
}

impl ExplainNode {
    /// Creates a new explain node with the given operator name.
    pub fn new(op: impl Into<String>) -> Self {
        Self {
            op: op.into(),
            props: Vec::new(),
            inputs: Vec::new(),
        }
    }
}

/// Single property associated with an [`ExplainNode`].
#[derive(Clone, Debug, Serialize)]
pub struct ExplainProp {
    /// Property key.
    pub key: String,
    /// Property value serialized for display.
    pub value: String,
}

impl ExplainProp {
    fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Builds the explain tree for a plan.
pub fn build_explain_tree(node: &PlanNode) -> ExplainNode {
    let mut explain = ExplainNode::new(op_name(&node.op));
    explain.props = op_props(&node.op);
    explain.inputs = node.inputs.iter().map(build_explain_tree).collect();
    explain
}

/// Deterministic hash of the operator tree.
pub fn compute_plan_hash(node: &PlanNode) -> u64 {
    let mut hasher = Xxh64::new(0);
    hash_node(node, &mut hasher);
    hasher.finish()
}

fn hash_node(node: &PlanNode, hasher: &mut Xxh64) {
    hasher.write(op_name(&node.op).as_bytes());
    for prop in op_props(&node.op) {
        hasher.write(prop.key.as_bytes());
        hasher.write(prop.value.as_bytes());
    }
    hasher.write_u64(node.inputs.len() as u64);
    for child in &node.inputs {
        hash_node(child, hasher);
    }
}

fn op_name(op: &AlgebraOp) -> &'static str {
    match op {
        AlgebraOp::ScanNodes => "ScanNodes",
        AlgebraOp::ScanLabel { .. } => "ScanLabel",
        AlgebraOp::SelectAttribute { .. } => "SelectAttribute",
        AlgebraOp::MatchColumns { .. } => "MatchColumns",
        AlgebraOp::Select { .. } => "Select",
        AlgebraOp::Adjacent { .. } => "Adjacent",
        AlgebraOp::Explode { .. } => "Explode",
        AlgebraOp::GetAttributes { .. } => "GetAttributes",
        AlgebraOp::GetType { .. } => "GetType",
        AlgebraOp::Join { .. } => "Join",
        AlgebraOp::Product => "Product",
        AlgebraOp::Extend { .. } => "Extend",
        AlgebraOp::Group { .. } => "Group",
        AlgebraOp::Sort { .. } => "Sort",
        AlgebraOp::Project { .. } => "Project",
        AlgebraOp::Slice { .. } => "Slice",
    }
}

fn describe_positions(columns: &[usize]) -> String {
    Positions(columns).to_string()
}

fn op_props(op: &AlgebraOp) -> Vec<ExplainProp> {
    match op {
        AlgebraOp::ScanNodes | AlgebraOp::Product => Vec::new(),
        AlgebraOp::ScanLabel { label } => vec![ExplainProp::new("label", label.clone())],
        AlgebraOp::SelectAttribute {
            scope,
            attr,
            op,
            value,
        } => vec![
            ExplainProp::new("attr", format!("{scope} '{attr}'")),
            ExplainProp::new("op", op.symbol()),
            ExplainProp::new("value", value.to_string()),
        ],
        AlgebraOp::MatchColumns { pairs } => pairs
            .iter()
            .map(|(a, b)| ExplainProp::new("match", format!("%{a}=%{b}")))
            .collect(),
        AlgebraOp::Select { predicate } => vec![ExplainProp::new("predicate", predicate.clone())],
        AlgebraOp::Adjacent { edge_col } => {
            vec![ExplainProp::new("edge_col", edge_col.to_string())]
        }
        AlgebraOp::Explode { col, direction } => vec![
            ExplainProp::new("col", col.to_string()),
            ExplainProp::new("direction", direction.keyword()),
        ],
        AlgebraOp::GetAttributes { col, scope, attrs } => {
            let mut props = vec![ExplainProp::new("col", col.to_string())];
            props.extend(
                attrs
                    .iter()
                    .map(|attr| ExplainProp::new("attr", format!("{scope} '{attr}'"))),
            );
            props
        }
        AlgebraOp::GetType { col } => vec![ExplainProp::new("col", col.to_string())],
        AlgebraOp::Join {
            predicate,
            join_type,
        } => vec![
            ExplainProp::new("predicate", predicate.clone()),
            ExplainProp::new("type", join_type.clone()),
        ],
        AlgebraOp::Extend { result_type, expr } => vec![
            ExplainProp::new("type", result_type.clone()),
            ExplainProp::new("expr", expr.clone()),
        ],
        AlgebraOp::Group {
            columns,
            aggregates,
        } => vec![
            ExplainProp::new("columns", describe_positions(columns)),
            ExplainProp::new("aggregates", aggregates.join(", ")),
        ],
        AlgebraOp::Sort { columns } | AlgebraOp::Project { columns } => {
            vec![ExplainProp::new("columns", describe_positions(columns))]
        }
        AlgebraOp::Slice { offset, limit } => vec![
            ExplainProp::new("offset", format!("{offset:?}")),
            ExplainProp::new("limit", format!("{limit:?}")),
        ],
    }
}
