//! Fluent query builder.
//!
//! A programmatic front end producing [`GraphQuery`] values without going
//! through a textual parser. Errors are recorded and surfaced by
//! [`QueryBuilder::build`], so a chain never panics halfway through.

use crate::error::{Result, Stage, StageExt};
use crate::query::{
    algebra::PlanExplain,
    ast::{
        AggregateKind, Connection, Expr, GraphQuery, GroupKey, OrderElem, PatternVar,
        ProjectionElem,
    },
    errors::PlanError,
    planner::{PlannerOutput, Translator},
};

/// Direction of the next edge added with [`QueryBuilder::where_edge`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum EdgeDirection {
    /// `(last)-[e]->(target)`
    #[default]
    Out,
    /// `(last)<-[e]-(target)`
    In,
}

/// Fluent builder for graph-pattern queries.
#[derive(Default)]
pub struct QueryBuilder {
    query: GraphQuery,
    last_var: Option<String>,
    next_var_idx: usize,
    next_edge_idx: usize,
    pending_direction: EdgeDirection,
    error: Option<PlanError>,
}

impl QueryBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry-point for constructing the builder.
    pub fn start() -> Self {
        Self::new()
    }

    /// Adds a vertex; a label-only target gets a generated variable name.
    pub fn r#match<T>(mut self, target: T) -> Self
    where
        T: Into<MatchTarget>,
    {
        if self.error.is_some() {
            return self;
        }
        let fallback = self.next_auto_var();
        let var = self.add_vertex(target.into(), fallback);
        self.last_var = Some(var);
        self
    }

    /// Adds a connection from the last matched vertex to `target`.
    pub fn where_edge<E, T>(mut self, edge: E, target: T) -> Self
    where
        E: Into<EdgeSpec>,
        T: Into<MatchTarget>,
    {
        if self.error.is_some() {
            return self;
        }
        let Some(from) = self.last_var.clone() else {
            self.error = Some(PlanError::invalid_state(
                "where_edge requires an existing left variable",
            ));
            return self;
        };
        let fallback = self.next_auto_var();
        let to = self.add_vertex(target.into(), fallback);
        let edge_spec: EdgeSpec = edge.into();
        let edge = match edge_spec.var {
            Some(name) => PatternVar::named(name),
            None => {
                let idx = self.next_edge_idx;
                self.next_edge_idx += 1;
                PatternVar::anonymous(format!("anon_edge{idx}"))
            }
        };
        if let Some(label) = edge_spec.label {
            self.query.constraints.push(Expr::eq(
                Expr::edge_label(edge.name.clone()),
                Expr::string(label),
            ));
        }
        let (src, dst) = match self.pending_direction {
            EdgeDirection::Out => (from, to.clone()),
            EdgeDirection::In => (to.clone(), from),
        };
        self.query.connections.push(Connection {
            src: PatternVar::named(src),
            dst: PatternVar::named(dst),
            edge,
        });
        self.last_var = Some(to);
        self.pending_direction = EdgeDirection::Out;
        self
    }

    /// Sets the direction for the next edge clause.
    pub fn direction(mut self, dir: EdgeDirection) -> Self {
        self.pending_direction = dir;
        self
    }

    /// Adds predicates on one variable, each as its own constraint.
    pub fn where_var<S, F>(mut self, var: S, build: F) -> Self
    where
        S: Into<String>,
        F: FnOnce(&mut PredicateBuilder),
    {
        if self.error.is_some() {
            return self;
        }
        let mut builder = PredicateBuilder::new(var.into());
        build(&mut builder);
        if builder.exprs.is_empty() {
            self.error = Some(PlanError::invalid_state(
                "where_var requires at least one predicate",
            ));
            return self;
        }
        self.query.constraints.extend(builder.exprs);
        self
    }

    /// Adds a raw filter expression.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.query.constraints.push(expr);
        self
    }

    /// Adds a grouping key visible as `alias` after grouping.
    pub fn group_by(mut self, expr: Expr, alias: impl Into<String>) -> Self {
        self.query.group_by.push(GroupKey {
            expr,
            alias: alias.into(),
        });
        self
    }

    /// Configures the projection list.
    pub fn select<I, P>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ProjectionSpec>,
    {
        self.query.projection = fields
            .into_iter()
            .map(|p| p.into().into_projection())
            .collect();
        self
    }

    /// Adds an ascending sort key.
    pub fn order_by(mut self, expr: Expr) -> Self {
        self.query.order_by.push(OrderElem {
            expr,
            ascending: true,
        });
        self
    }

    /// Adds a descending sort key.
    pub fn order_by_desc(mut self, expr: Expr) -> Self {
        self.query.order_by.push(OrderElem {
            expr,
            ascending: false,
        });
        self
    }

    /// Caps the number of rows.
    pub fn limit(mut self, limit: u64) -> Self {
        self.query.limit = Some(limit);
        self
    }

    /// Skips leading rows.
    pub fn offset(mut self, offset: u64) -> Self {
        self.query.offset = Some(offset);
        self
    }

    /// Builds the query without translating it.
    pub fn build(self) -> Result<GraphQuery, PlanError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        if let Some(conn) = self.query.connections.iter().find(|conn| {
            self.query.vertices.iter().any(|v| v.name == conn.edge.name)
        }) {
            return Err(PlanError::invalid_state(format!(
                "'{}' is used both as a vertex and as an edge",
                conn.edge.name
            )));
        }
        Ok(self.query)
    }

    /// Builds and translates the query.
    pub fn translate(self, translator: &Translator) -> Result<PlannerOutput> {
        let query = self.build().at(Stage::Partition)?;
        translator.translate(&query)
    }

    /// Explains the plan using the supplied translator.
    pub fn explain(self, translator: &Translator) -> Result<PlanExplain> {
        Ok(self.translate(translator)?.explain)
    }

    fn next_auto_var(&mut self) -> String {
        let idx = self.next_var_idx;
        self.next_var_idx += 1;
        auto_var_name(idx)
    }

    fn add_vertex(&mut self, target: MatchTarget, fallback: String) -> String {
        let (var, label) = target.into_parts(fallback);
        if !self.query.vertices.iter().any(|v| v.name == var) {
            self.query.vertices.push(PatternVar::named(var.clone()));
        }
        if let Some(label) = label {
            self.query
                .constraints
                .push(Expr::has_label(var.clone(), label));
        }
        var
    }
}

/// Specifies the target vertex of a match or edge clause.
pub enum MatchTarget {
    /// Match by label only
    Label(String),
    /// Match by variable name and optional label
    Var {
        /// Variable name
        name: String,
        /// Optional label constraint
        label: Option<String>,
    },
}

impl MatchTarget {
    /// Target bound to `name` with no label.
    pub fn var(name: impl Into<String>) -> Self {
        MatchTarget::Var {
            name: name.into(),
            label: None,
        }
    }

    fn into_parts(self, fallback: String) -> (String, Option<String>) {
        match self {
            MatchTarget::Label(label) => (fallback, Some(label)),
            MatchTarget::Var { name, label } => (name, label),
        }
    }
}

impl From<&str> for MatchTarget {
    fn from(label: &str) -> Self {
        MatchTarget::Label(label.to_owned())
    }
}

impl From<String> for MatchTarget {
    fn from(label: String) -> Self {
        MatchTarget::Label(label)
    }
}

impl From<(&str, &str)> for MatchTarget {
    fn from((var, label): (&str, &str)) -> Self {
        MatchTarget::Var {
            name: var.to_owned(),
            label: Some(label.to_owned()),
        }
    }
}

impl From<(&str, Option<&str>)> for MatchTarget {
    fn from((var, label): (&str, Option<&str>)) -> Self {
        MatchTarget::Var {
            name: var.to_owned(),
            label: label.map(|l| l.to_owned()),
        }
    }
}

/// Edge specification used by the builder.
#[derive(Default)]
pub struct EdgeSpec {
    var: Option<String>,
    label: Option<String>,
}

impl EdgeSpec {
    /// Creates an edge with an optional variable name and label.
    pub fn new(var: Option<String>, label: Option<String>) -> Self {
        Self { var, label }
    }

    /// Unlabeled edge bound to `var`.
    pub fn named(var: impl Into<String>) -> Self {
        Self::new(Some(var.into()), None)
    }

    /// Anonymous, unlabeled edge.
    pub fn any() -> Self {
        Self::default()
    }
}

impl From<&str> for EdgeSpec {
    fn from(label: &str) -> Self {
        Self::new(None, Some(label.to_owned()))
    }
}

impl From<(&str, &str)> for EdgeSpec {
    fn from((var, label): (&str, &str)) -> Self {
        Self::new(Some(var.to_owned()), Some(label.to_owned()))
    }
}

impl From<Option<&str>> for EdgeSpec {
    fn from(label: Option<&str>) -> Self {
        Self::new(None, label.map(|l| l.to_owned()))
    }
}

/// Builder used to construct predicates bound to a single variable.
pub struct PredicateBuilder {
    var: String,
    exprs: Vec<Expr>,
}

impl PredicateBuilder {
    fn new(var: String) -> Self {
        Self {
            var,
            exprs: Vec::new(),
        }
    }

    fn push_cmp(
        &mut self,
        cmp: fn(Expr, Expr) -> Expr,
        prop: impl Into<String>,
        value: impl Into<Expr>,
    ) -> &mut Self {
        let lhs = Expr::prop(self.var.clone(), prop);
        self.exprs.push(cmp(lhs, value.into()));
        self
    }

    /// `var.prop = value`
    pub fn eq(&mut self, prop: impl Into<String>, value: impl Into<Expr>) -> &mut Self {
        self.push_cmp(Expr::eq, prop, value)
    }

    /// `var.prop <> value`
    pub fn ne(&mut self, prop: impl Into<String>, value: impl Into<Expr>) -> &mut Self {
        self.push_cmp(Expr::ne, prop, value)
    }

    /// `var.prop < value`
    pub fn lt(&mut self, prop: impl Into<String>, value: impl Into<Expr>) -> &mut Self {
        self.push_cmp(Expr::lt, prop, value)
    }

    /// `var.prop <= value`
    pub fn le(&mut self, prop: impl Into<String>, value: impl Into<Expr>) -> &mut Self {
        self.push_cmp(Expr::le, prop, value)
    }

    /// `var.prop > value`
    pub fn gt(&mut self, prop: impl Into<String>, value: impl Into<Expr>) -> &mut Self {
        self.push_cmp(Expr::gt, prop, value)
    }

    /// `var.prop >= value`
    pub fn ge(&mut self, prop: impl Into<String>, value: impl Into<Expr>) -> &mut Self {
        self.push_cmp(Expr::ge, prop, value)
    }

    /// `low <= var.prop AND var.prop <= high`, as two predicates.
    pub fn between(
        &mut self,
        prop: impl Into<String>,
        low: impl Into<Expr>,
        high: impl Into<Expr>,
    ) -> &mut Self {
        let prop = prop.into();
        self.ge(prop.clone(), low);
        self.le(prop, high)
    }

    /// Label membership test.
    pub fn has_label(&mut self, label: impl Into<String>) -> &mut Self {
        self.exprs.push(Expr::has_label(self.var.clone(), label));
        self
    }

    /// Disjunction of the predicates built by `build`.
    pub fn or_group<F>(&mut self, build: F) -> &mut Self
    where
        F: FnOnce(&mut PredicateBuilder),
    {
        let mut nested = PredicateBuilder::new(self.var.clone());
        build(&mut nested);
        if let Some(expr) = nested.exprs.into_iter().reduce(Expr::or) {
            self.exprs.push(expr);
        }
        self
    }
}

impl From<i32> for Expr {
    fn from(value: i32) -> Self {
        Expr::int(i64::from(value))
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Expr::int(value)
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::decimal(value)
    }
}

impl From<bool> for Expr {
    fn from(value: bool) -> Self {
        Expr::boolean(value)
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        Expr::string(value)
    }
}

impl From<String> for Expr {
    fn from(value: String) -> Self {
        Expr::string(value)
    }
}

/// Projection helper used by the builder API.
pub struct ProjectionSpec {
    projection: ProjectionElem,
}

impl ProjectionSpec {
    /// `COUNT(*)`
    pub fn count_all() -> Self {
        Expr::count_all().into()
    }

    /// Aggregate over `expr`, with an optional output name.
    pub fn aggregate(kind: AggregateKind, expr: Expr, alias: Option<&str>) -> Self {
        Self {
            projection: ProjectionElem {
                expr: Expr::aggregate(kind, expr),
                alias: alias.map(str::to_owned),
            },
        }
    }

    fn into_projection(self) -> ProjectionElem {
        self.projection
    }
}

impl From<&str> for ProjectionSpec {
    fn from(var: &str) -> Self {
        Self {
            projection: ProjectionElem {
                expr: Expr::var(var),
                alias: None,
            },
        }
    }
}

impl From<String> for ProjectionSpec {
    fn from(var: String) -> Self {
        Self {
            projection: ProjectionElem {
                expr: Expr::var(var),
                alias: None,
            },
        }
    }
}

impl From<(&str, &str)> for ProjectionSpec {
    fn from((var, alias): (&str, &str)) -> Self {
        Self {
            projection: ProjectionElem {
                expr: Expr::var(var),
                alias: Some(alias.to_owned()),
            },
        }
    }
}

impl From<Expr> for ProjectionSpec {
    fn from(expr: Expr) -> Self {
        Self {
            projection: ProjectionElem { expr, alias: None },
        }
    }
}

impl From<(Expr, &str)> for ProjectionSpec {
    fn from((expr, alias): (Expr, &str)) -> Self {
        Self {
            projection: ProjectionElem {
                expr,
                alias: Some(alias.to_owned()),
            },
        }
    }
}

impl From<ProjectionElem> for ProjectionSpec {
    fn from(projection: ProjectionElem) -> Self {
        Self { projection }
    }
}

fn auto_var_name(idx: usize) -> String {
    const FIRST: u8 = b'a';
    let letter = (FIRST + (idx % 26) as u8) as char;
    if idx < 26 {
        letter.to_string()
    } else {
        format!("{}{}", letter, idx / 26)
    }
}
