//! Translation of graph-pattern queries into positional-column algebra.
//!
//! Translation runs as a fixed sequence of states over a per-call
//! [`TranslationContext`]:
//!
//! 1. partition the pattern into connection groups and link constraints,
//! 2. seed and grow each group's plan by traversing its connections,
//! 3. join group pairs through two-group constraints,
//! 4. cross-product whatever groups remain,
//! 5. apply the residual constraints to the single plan,
//!
//! followed by post-processing (GROUP, projection columns, SORT, PROJECT,
//! SLICE) on the merged plan. Every failure carries the [`Stage`] it was
//! raised in and no partial plan is ever returned.

use tracing::debug;

use crate::config::TranslatorConfig;
use crate::error::{Result, Stage, StageExt};
use crate::query::{
    aggregate::{extract_aggregates, AggregateInfo},
    algebra::{
        build_explain_tree, compute_plan_hash, AlgebraOp, AlgebraPlan, Direction, PlanExplain,
        PlanNode,
    },
    analyze::{AnalysisMode, ExpressionInfo},
    ast::{Connection, GraphQuery},
    columns::add_expression_column,
    constraint::Constraint,
    errors::PlanError,
    partition::{partition, ConnectionGroup, GroupId},
    registry::VariableRegistry,
    schema::Schema,
};

/// Result of a successful translation.
#[derive(Clone, Debug)]
pub struct PlannerOutput {
    /// Operator tree of the final plan.
    pub root: PlanNode,
    /// Columns the final plan returns.
    pub schema: Schema,
    /// Serialized algebra text handed to the execution engine.
    pub text: String,
    /// Human-readable explain tree.
    pub explain: PlanExplain,
    /// Deterministic plan hash for explain/caching.
    pub plan_hash: u64,
}

/// Stateless query translator.
///
/// All per-query state lives in a context allocated by each call, so one
/// translator can serve any number of threads.
#[derive(Clone, Debug, Default)]
pub struct Translator {
    config: TranslatorConfig,
}

impl Translator {
    /// Creates a translator emitting the dialect described by `config`.
    pub fn new(config: TranslatorConfig) -> Self {
        Self { config }
    }

    /// Active configuration.
    pub fn config(&self) -> &TranslatorConfig {
        &self.config
    }

    /// Translates a query into an algebra plan.
    pub fn translate(&self, query: &GraphQuery) -> Result<PlannerOutput> {
        let mut ctx = TranslationContext::new(query, &self.config).at(Stage::Partition)?;
        ctx.translate_groups().at(Stage::GroupTranslation)?;
        ctx.resolve_joins().at(Stage::ConstraintJoin)?;
        ctx.cross_product().at(Stage::CrossProduct)?;
        let mut plan = ctx.apply_residual().at(Stage::ResidualConstraints)?;
        post_process(&mut plan, query, &self.config)?;

        let (root, schema) = plan.into_parts();
        let text = root.to_string();
        let plan_hash = compute_plan_hash(&root);
        let explain = PlanExplain {
            root: build_explain_tree(&root),
            plan_hash,
        };
        debug!(%text, plan_hash, columns = schema.len(), "translated query");
        Ok(PlannerOutput {
            root,
            schema,
            text,
            explain,
            plan_hash,
        })
    }

    /// Translates a query and returns only the algebra text.
    pub fn translate_to_string(&self, query: &GraphQuery) -> Result<String> {
        Ok(self.translate(query)?.text)
    }

    /// Decodes a JSON query document and translates it.
    pub fn translate_json(&self, json: &str) -> Result<PlannerOutput> {
        let query: GraphQuery = serde_json::from_str(json)?;
        self.translate(&query)
    }
}

/// How a connection is reached from the current plan.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Traversal {
    /// The edge is bound: read both endpoints.
    ByEdge,
    /// An endpoint is bound: explode from it.
    ByNode(Direction),
}

struct TranslationContext<'a> {
    config: &'a TranslatorConfig,
    registry: VariableRegistry,
    groups: Vec<ConnectionGroup>,
    constraints: Vec<Constraint>,
}

impl<'a> TranslationContext<'a> {
    fn new(query: &GraphQuery, config: &'a TranslatorConfig) -> Result<Self, PlanError> {
        let mut registry = VariableRegistry::new();
        let groups = partition(query, &mut registry)?;
        let mut constraints = query
            .constraints
            .iter()
            .map(|expr| Constraint::new(expr.clone(), &registry))
            .collect::<Result<Vec<_>, PlanError>>()?;
        for constraint in &mut constraints {
            constraint.link_groups(&groups);
        }
        debug!(
            groups = groups.len(),
            constraints = constraints.len(),
            "linked constraints to groups"
        );
        Ok(Self {
            config,
            registry,
            groups,
            constraints,
        })
    }

    fn group_index(&self, id: GroupId) -> Result<usize, PlanError> {
        self.groups
            .iter()
            .position(|group| group.id == id)
            .ok_or_else(|| PlanError::invalid_state(format!("group {id} no longer exists")))
    }

    fn translate_groups(&mut self) -> Result<(), PlanError> {
        for idx in 0..self.groups.len() {
            let plan = self.translate_group(idx)?;
            self.groups[idx].set_plan(plan);
        }
        Ok(())
    }

    fn translate_group(&mut self, idx: usize) -> Result<AlgebraPlan, PlanError> {
        let group_id = self.groups[idx].id;
        let mut plan = self.seed_group(idx)?;
        let seeded = plan.schema.variables();
        self.update_and_apply(group_id, &mut plan, &seeded)?;

        let mut remaining: Vec<Connection> = self.groups[idx].connections().to_vec();
        while !remaining.is_empty() {
            let Some((pos, step)) = remaining
                .iter()
                .enumerate()
                .find_map(|(pos, conn)| next_traversal(&plan.schema, conn).map(|step| (pos, step)))
            else {
                let stuck: Vec<String> = remaining.iter().map(describe_connection).collect();
                return Err(PlanError::unsatisfiable(format!(
                    "no connection of group {group_id} touches its plan: {}",
                    stuck.join(", ")
                )));
            };
            let conn = remaining.remove(pos);
            let before = plan.schema.variables();
            traverse(&mut plan, &conn, step)?;
            let added: Vec<String> = plan
                .schema
                .variables()
                .into_iter()
                .filter(|var| !before.contains(var))
                .collect();
            debug!(
                group = %group_id,
                connection = %describe_connection(&conn),
                ?step,
                ?added,
                "traversed connection"
            );
            self.update_and_apply(group_id, &mut plan, &added)?;
        }
        Ok(plan)
    }

    /// Starts a group's plan from its cheapest basic constraint, or from a
    /// full node scan when it has none.
    fn seed_group(&mut self, idx: usize) -> Result<AlgebraPlan, PlanError> {
        let group = &self.groups[idx];
        if let Some(pos) = self.best_seed_constraint(group) {
            let constraint = self.constraints.remove(pos);
            debug!(group = %group.id, seed = %constraint.expr(), "seeding group from constraint");
            return constraint.basic_seed(self.config).ok_or_else(|| {
                PlanError::invalid_state(format!("constraint {} cannot seed", constraint.expr()))
            });
        }
        let var = group.first_node_variable(&self.registry).ok_or_else(|| {
            PlanError::unsatisfiable(format!("group {} binds no node variable", group.id))
        })?;
        debug!(group = %group.id, var, "seeding group with a full node scan");
        let mut plan = AlgebraPlan::seed(AlgebraOp::ScanNodes);
        plan.schema.add_variable_column(var);
        Ok(plan)
    }

    /// First basic constraint on the group; a constraint on an edge
    /// variable beats one on a node variable.
    fn best_seed_constraint(&self, group: &ConnectionGroup) -> Option<usize> {
        let mut best: Option<(usize, bool)> = None;
        for (pos, constraint) in self.constraints.iter().enumerate() {
            if !constraint.is_basic() {
                continue;
            }
            let Some(var) = constraint.subject() else {
                continue;
            };
            if !group.contains_variable(var) {
                continue;
            }
            let on_edge = self.registry.lookup(var).is_some_and(|v| v.is_edge());
            match best {
                None => best = Some((pos, on_edge)),
                Some((_, false)) if on_edge => best = Some((pos, on_edge)),
                Some(_) => {}
            }
        }
        best.map(|(pos, _)| pos)
    }

    /// Marks `added` as bound and applies every constraint that became fully
    /// available within this group alone.
    fn update_and_apply(
        &mut self,
        group_id: GroupId,
        plan: &mut AlgebraPlan,
        added: &[String],
    ) -> Result<(), PlanError> {
        let mut pos = 0;
        while pos < self.constraints.len() {
            let constraint = &mut self.constraints[pos];
            constraint.mark_available(added);
            if constraint.pending_variable_count() == 0 && constraint.linked_groups() == [group_id] {
                let constraint = self.constraints.remove(pos);
                constraint.apply(plan, self.config)?;
            } else {
                pos += 1;
            }
        }
        Ok(())
    }

    /// Applies single-group constraints and joins group pairs until no
    /// constraint is linked to one or two groups.
    fn resolve_joins(&mut self) -> Result<(), PlanError> {
        while let Some(pos) = self
            .constraints
            .iter()
            .position(|c| matches!(c.linked_groups().len(), 1 | 2))
        {
            let constraint = self.constraints.remove(pos);
            match *constraint.linked_groups() {
                [id] => {
                    let idx = self.group_index(id)?;
                    let mut plan = self.groups[idx].take_plan()?;
                    constraint.apply(&mut plan, self.config)?;
                    self.groups[idx].set_plan(plan);
                }
                [left, right] => self.join_groups(left, right, &constraint)?,
                _ => {
                    return Err(PlanError::invalid_state(format!(
                        "constraint {} selected with {} linked groups",
                        constraint.expr(),
                        constraint.linked_groups().len()
                    )))
                }
            }
        }
        Ok(())
    }

    fn join_groups(
        &mut self,
        left: GroupId,
        right: GroupId,
        constraint: &Constraint,
    ) -> Result<(), PlanError> {
        let absorbed_idx = self.group_index(right)?;
        let mut absorbed = self.groups.remove(absorbed_idx);
        let right_plan = absorbed.take_plan()?;
        let idx = self.group_index(left)?;
        let mut plan = self.groups[idx].take_plan()?;
        constraint.apply_join(&mut plan, right_plan, self.config)?;
        debug!(left = %left, right = %right, predicate = %constraint.expr(), "joined groups");
        self.groups[idx].set_plan(plan);
        self.groups[idx].merge(absorbed);
        for other in &mut self.constraints {
            other.replace_group(right, left);
        }
        Ok(())
    }

    /// Combines all remaining groups into the first with PRODUCT.
    fn cross_product(&mut self) -> Result<(), PlanError> {
        if self.groups.len() < 2 {
            return Ok(());
        }
        let rest = self.groups.split_off(1);
        let first = &mut self.groups[0];
        let mut plan = first.take_plan()?;
        for mut other in rest {
            let (root, schema) = other.take_plan()?.into_parts();
            plan.schema.add_columns_data(&schema)?;
            plan.combine(AlgebraOp::Product, root);
            debug!(left = %first.id, right = %other.id, "cross product of unrelated groups");
            for constraint in &mut self.constraints {
                constraint.replace_group(other.id, first.id);
            }
            first.merge(other);
        }
        first.set_plan(plan);
        Ok(())
    }

    /// Applies every remaining constraint to the sole plan and returns it.
    fn apply_residual(&mut self) -> Result<AlgebraPlan, PlanError> {
        let remaining = self.groups.len();
        let [group] = self.groups.as_mut_slice() else {
            return Err(PlanError::invalid_state(format!(
                "expected one group after the cross product, found {remaining}"
            )));
        };
        let mut plan = group.take_plan()?;
        for constraint in self.constraints.drain(..) {
            match constraint.linked_groups() {
                [] => {}
                [id] if *id == group.id => {}
                linked => {
                    return Err(PlanError::invalid_state(format!(
                        "constraint {} still linked to {linked:?}",
                        constraint.expr()
                    )))
                }
            }
            constraint.apply(&mut plan, self.config)?;
        }
        Ok(plan)
    }
}

fn next_traversal(schema: &Schema, conn: &Connection) -> Option<Traversal> {
    if schema.contains_variable(&conn.edge.name) {
        Some(Traversal::ByEdge)
    } else if schema.contains_variable(&conn.src.name) {
        Some(Traversal::ByNode(Direction::Outgoing))
    } else if schema.contains_variable(&conn.dst.name) {
        Some(Traversal::ByNode(Direction::Ingoing))
    } else {
        None
    }
}

fn describe_connection(conn: &Connection) -> String {
    format!("({})-[{}]->({})", conn.src.name, conn.edge.name, conn.dst.name)
}

fn traverse(
    plan: &mut AlgebraPlan,
    conn: &Connection,
    step: Traversal,
) -> Result<(), PlanError> {
    let (op, produced) = match step {
        Traversal::ByEdge => (
            AlgebraOp::Adjacent {
                edge_col: bound_column(plan, &conn.edge.name)?,
            },
            [&conn.src.name, &conn.dst.name],
        ),
        Traversal::ByNode(direction) => {
            let (start, peer) = match direction {
                Direction::Outgoing => (&conn.src.name, &conn.dst.name),
                Direction::Ingoing => (&conn.dst.name, &conn.src.name),
            };
            (
                AlgebraOp::Explode {
                    col: bound_column(plan, start)?,
                    direction,
                },
                [&conn.edge.name, peer],
            )
        }
    };
    let first_new = plan.schema.len();
    plan.wrap(op);
    let mut pairs = Vec::new();
    for (offset, var) in produced.into_iter().enumerate() {
        match plan.schema.variable_index(var) {
            Some(existing) => {
                plan.schema.add_scratch_column(var);
                pairs.push((existing, first_new + offset));
            }
            None => {
                plan.schema.add_variable_column(var);
            }
        }
    }
    if !pairs.is_empty() {
        plan.wrap(AlgebraOp::MatchColumns { pairs });
    }
    Ok(())
}

fn bound_column(plan: &AlgebraPlan, var: &str) -> Result<usize, PlanError> {
    plan.schema
        .variable_index(var)
        .ok_or_else(|| PlanError::invalid_state(format!("variable '{var}' is not bound")))
}

/// GROUP, projection, SORT, PROJECT and SLICE on the merged plan.
fn post_process(plan: &mut AlgebraPlan, query: &GraphQuery, config: &TranslatorConfig) -> Result<()> {
    let group_columns = prepare_group_by(plan, query, config).at(Stage::GroupBy)?;

    let mut aggregates = Vec::new();
    for elem in &query.projection {
        extract_aggregates(&elem.expr, plan, &mut aggregates, config).at(Stage::Projection)?;
    }
    for elem in &query.order_by {
        extract_aggregates(&elem.expr, plan, &mut aggregates, config).at(Stage::OrderBy)?;
    }
    apply_group(plan, group_columns, &aggregates).at(Stage::GroupBy)?;

    let projected = materialize_projection(plan, query, config).at(Stage::Projection)?;
    apply_order_by(plan, query, config).at(Stage::OrderBy)?;

    if !projected.is_empty() {
        plan.wrap(AlgebraOp::Project {
            columns: projected.clone(),
        });
        plan.schema
            .reduce_columns(&projected)
            .at(Stage::FinalProjection)?;
    }

    if query.limit.is_some() || query.offset.is_some() {
        plan.wrap(AlgebraOp::Slice {
            offset: query.offset,
            limit: query.limit,
        });
        debug!(offset = ?query.offset, limit = ?query.limit, "sliced result");
    }
    Ok(())
}

/// Materializes every grouping key under its alias and its source text.
fn prepare_group_by(
    plan: &mut AlgebraPlan,
    query: &GraphQuery,
    config: &TranslatorConfig,
) -> Result<Vec<usize>, PlanError> {
    let mut columns = Vec::with_capacity(query.group_by.len());
    for key in &query.group_by {
        let info = ExpressionInfo::analyze(key.expr.clone(), AnalysisMode::PreGroup);
        if info.has_aggregates() {
            return Err(PlanError::unsupported("aggregate in GROUP BY", &key.expr));
        }
        let col = add_expression_column(&info, plan, Some(&key.alias), config)?;
        plan.schema.set_alias(&key.expr.to_string(), col)?;
        columns.push(col);
    }
    Ok(columns)
}

fn apply_group(
    plan: &mut AlgebraPlan,
    columns: Vec<usize>,
    aggregates: &[AggregateInfo],
) -> Result<(), PlanError> {
    if columns.is_empty() && aggregates.is_empty() {
        return Ok(());
    }
    plan.wrap(AlgebraOp::Group {
        columns: columns.clone(),
        aggregates: aggregates.iter().map(AggregateInfo::group_expression).collect(),
    });
    plan.schema.reduce_columns(&columns)?;
    for aggregate in aggregates {
        plan.schema
            .add_aggregate_column(aggregate.kind(), aggregate.source_text());
    }
    debug!(?columns, aggregates = aggregates.len(), "grouped rows");
    Ok(())
}

/// Materializes projection columns, aliased by source text and declared
/// alias, and returns their positions.
fn materialize_projection(
    plan: &mut AlgebraPlan,
    query: &GraphQuery,
    config: &TranslatorConfig,
) -> Result<Vec<usize>, PlanError> {
    let mut columns = Vec::with_capacity(query.projection.len());
    for elem in &query.projection {
        let info = ExpressionInfo::analyze(elem.expr.clone(), AnalysisMode::PostGroup);
        let col = add_expression_column(&info, plan, None, config)?;
        plan.schema.set_alias(&elem.expr.to_string(), col)?;
        if let Some(alias) = &elem.alias {
            plan.schema.set_alias(alias, col)?;
        }
        columns.push(col);
    }
    Ok(columns)
}

fn apply_order_by(
    plan: &mut AlgebraPlan,
    query: &GraphQuery,
    config: &TranslatorConfig,
) -> Result<(), PlanError> {
    let mut columns = Vec::with_capacity(query.order_by.len());
    for elem in &query.order_by {
        if !elem.ascending {
            return Err(PlanError::unsupported("descending ORDER BY", &elem.expr));
        }
        let info = ExpressionInfo::analyze(elem.expr.clone(), AnalysisMode::PostGroup);
        columns.push(add_expression_column(&info, plan, None, config)?);
    }
    if !columns.is_empty() {
        plan.wrap(AlgebraOp::Sort { columns });
    }
    Ok(())
}
