//! Constraint builder
//!
//! Turns a [`PlacementModel`] into decision variables and constraints:
//! - `op_i ∈ {-1, 0, +1}`: remove / keep / add a replica on node `i`
//! - `moved_i <=> op_i != 0`
//! - `replica_count_after_i = replica_count_i + op_i`, bounded by the
//!   largest load seen today
//! - `replica_in_region_r <=> Σ (has_range + op) over members of r > 0`
//!
//! with conservation (`Σ op = 0`), the move cap (`Σ moved <= MAX_MOVES`) and
//! per-node legality (`has_range + op ∈ {0, 1}`) posted once for both phases.

use cyxcloud_solver::{
    BoolVar, CpModelBuilder, Domain, Hint, IntVar, LinearExpr,
};
use tracing::debug;

use crate::model::PlacementModel;

/// Moves allowed per planning run: one removal plus one addition
pub const MAX_MOVES: i64 = 2;

pub(crate) fn op_name(node: usize) -> String {
    format!("op_{}", node)
}

pub(crate) fn replica_count_after_name(node: usize) -> String {
    format!("replica_count_after_{}", node)
}

pub(crate) fn region_name(region: &str) -> String {
    format!("replica_in_region_{}", region)
}

/// Variables tied to one node
#[derive(Debug, Clone, Copy)]
pub struct NodeVars {
    pub op: IntVar,
    pub moved: BoolVar,
    pub replica_count_after: IntVar,
}

/// Variables shared by both phases
#[derive(Debug, Clone)]
pub struct PlacementVars {
    pub nodes: Vec<NodeVars>,
    /// `replica_in_region_r`, in the model's region order
    pub regions: Vec<BoolVar>,
    diversity: LinearExpr,
}

impl PlacementVars {
    /// Declare every variable and post the constraints common to both phases
    pub fn declare(builder: &mut CpModelBuilder, model: &PlacementModel) -> Self {
        let upper = model.max_replica_count();

        let mut nodes = Vec::with_capacity(model.nodes().len());
        for (i, node) in model.nodes().iter().enumerate() {
            let op = builder.new_int_var(-1, 1, op_name(i));
            let moved = builder.new_bool_var(format!("moved_{}", i));
            builder.add_equality(op, 0).only_enforce_if(!moved);
            builder.add_not_equal(op, 0).only_enforce_if(moved);

            let replica_count_after =
                builder.new_int_var(0, upper, replica_count_after_name(i));
            let mut load = LinearExpr::constant(i64::from(node.replica_count));
            load.add_expr(op);
            builder.add_equality(replica_count_after, load);

            // at most one replica of the range per node
            let mut holding = LinearExpr::constant(i64::from(node.has_range));
            holding.add_expr(op);
            builder.add_linear_in_domain(holding, Domain::new(0, 1));

            nodes.push(NodeVars {
                op,
                moved,
                replica_count_after,
            });
        }

        builder.add_equality(LinearExpr::sum(nodes.iter().map(|n| n.op)), 0);
        builder.add_less_or_equal(LinearExpr::sum(nodes.iter().map(|n| n.moved)), MAX_MOVES);

        let mut regions = Vec::with_capacity(model.regions().len());
        for region in model.regions() {
            let occupied = builder.new_bool_var(region_name(&region.name));

            let mut held = LinearExpr::new();
            for &i in &region.members {
                held.add_constant(i64::from(model.nodes()[i].has_range))
                    .add_expr(nodes[i].op);
            }
            builder.add_greater_than(held.clone(), 0).only_enforce_if(occupied);
            builder.add_equality(held, 0).only_enforce_if(!occupied);

            regions.push(occupied);
        }

        let diversity = LinearExpr::sum(regions.iter().copied());

        debug!(
            variables = builder.num_variables(),
            constraints = builder.num_constraints(),
            "Declared placement variables"
        );

        Self {
            nodes,
            regions,
            diversity,
        }
    }

    /// Number of occupied regions after planning
    pub fn diversity(&self) -> &LinearExpr {
        &self.diversity
    }
}

/// Phase 1: maximize the number of occupied regions
pub fn add_diversity_objective(builder: &mut CpModelBuilder, vars: &PlacementVars) {
    builder.maximize(vars.diversity());
}

/// Variables added for the balance phase
#[derive(Debug, Clone)]
pub struct BalanceVars {
    pub max_replica_count: IntVar,
    pub min_replica_count: IntVar,
    spread: LinearExpr,
}

impl BalanceVars {
    /// `max_replica_count - min_replica_count`
    pub fn spread(&self) -> &LinearExpr {
        &self.spread
    }
}

/// Phase 2: hold diversity at `diversity`, seed the search with the phase-1
/// operations and minimize the load spread over all nodes
pub fn add_balance_objective(
    builder: &mut CpModelBuilder,
    model: &PlacementModel,
    vars: &PlacementVars,
    diversity: i64,
    hint_ops: &[i64],
) -> BalanceVars {
    builder.add_equality(vars.diversity().clone(), diversity);

    let hint: Hint = vars
        .nodes
        .iter()
        .zip(hint_ops)
        .map(|(node, &value)| (node.op, value))
        .collect();
    builder.set_hint(hint);

    let upper = model.max_replica_count();
    let loads: Vec<IntVar> = vars.nodes.iter().map(|n| n.replica_count_after).collect();

    let max_replica_count = builder.new_int_var(0, upper, "max_replica_count");
    builder.add_max_equality(max_replica_count, loads.iter().copied());
    let min_replica_count = builder.new_int_var(0, upper, "min_replica_count");
    builder.add_min_equality(min_replica_count, loads.iter().copied());

    let mut spread = LinearExpr::from(max_replica_count);
    spread.add_term(min_replica_count, -1);
    builder.minimize(spread.clone());

    BalanceVars {
        max_replica_count,
        min_replica_count,
        spread,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Node;
    use cyxcloud_solver::{Constraint, Sense};

    fn model() -> PlacementModel {
        PlacementModel::new(vec![
            Node::new("n0", "a", true, 3),
            Node::new("n1", "a", false, 1),
            Node::new("n2", "b", false, 2),
        ])
        .unwrap()
    }

    #[test]
    fn test_declares_named_variables() {
        let model = model();
        let mut builder = CpModelBuilder::new();
        let vars = PlacementVars::declare(&mut builder, &model);

        assert_eq!(vars.nodes.len(), 3);
        assert_eq!(vars.regions.len(), 2);
        assert_eq!(builder.name(vars.nodes[1].op.index()), "op_1");
        assert_eq!(builder.name(vars.nodes[2].moved.index()), "moved_2");
        assert_eq!(
            builder.name(vars.nodes[0].replica_count_after.index()),
            "replica_count_after_0"
        );
        assert_eq!(builder.name(vars.regions[1].index()), "replica_in_region_b");
    }

    #[test]
    fn test_load_bounded_by_current_maximum() {
        let model = model();
        let mut builder = CpModelBuilder::new();
        let vars = PlacementVars::declare(&mut builder, &model);
        let cp = builder.build().unwrap();

        let decl = &cp.variables()[vars.nodes[2].replica_count_after.index()];
        assert_eq!((decl.lo, decl.hi), (0, 3));
    }

    #[test]
    fn test_keeping_everything_satisfies_common_constraints() {
        let model = model();
        let mut builder = CpModelBuilder::new();
        let vars = PlacementVars::declare(&mut builder, &model);
        let cp = builder.build().unwrap();

        let mut values = vec![0; cp.variables().len()];
        for (node, var) in model.nodes().iter().zip(&vars.nodes) {
            values[var.replica_count_after.index()] = i64::from(node.replica_count);
        }
        values[vars.regions[0].index()] = 1;
        assert!(cp.is_satisfied_by(&values));

        // region b holds nothing, so it cannot be flagged occupied
        values[vars.regions[1].index()] = 1;
        assert!(!cp.is_satisfied_by(&values));
    }

    #[test]
    fn test_phase_two_additions() {
        let model = model();
        let mut builder = CpModelBuilder::new();
        let vars = PlacementVars::declare(&mut builder, &model);
        add_diversity_objective(&mut builder, &vars);
        let before = builder.num_constraints();

        let balance = add_balance_objective(&mut builder, &model, &vars, 2, &[-1, 0, 1]);
        let cp = builder.build().unwrap();

        // diversity equality plus the two aggregations
        assert_eq!(cp.constraints().len(), before + 3);
        assert!(matches!(
            cp.constraints().last(),
            Some(Constraint::MinEquality { .. })
        ));
        assert_eq!(cp.objective().map(|o| o.sense), Some(Sense::Minimize));
        assert_eq!(cp.hint().get(vars.nodes[0].op), Some(-1));
        assert_eq!(cp.hint().get(vars.nodes[2].op), Some(1));
        assert_eq!(builder.name(balance.max_replica_count.index()), "max_replica_count");
        assert_eq!(balance.spread().terms().len(), 2);
    }
}
