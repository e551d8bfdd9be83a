//! Built-in branch-and-bound engine
//!
//! Exhaustive depth-first search with bounds propagation, meant for the small
//! models a single planning run produces:
//! - Linear constraints tighten variable bounds to a fixpoint; holes in a
//!   constraint domain are only checked once the expression is fixed.
//! - A guarded constraint that can no longer hold forces its last open
//!   enforcement literal to false.
//! - `max`/`min` aggregations tighten their target and arguments.
//! - Every improving solution adds a strict bound on the objective.
//!
//! Variables are branched in declaration order; a hinted variable tries its
//! hinted value first.

use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::engine::{OptimizationEngine, Solution, SolveResponse, SolveStatus};
use crate::error::EngineError;
use crate::model::{BoolVar, Constraint, CpModel, Domain, LinearExpr, Sense};

/// Search budget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchLimits {
    /// Maximum number of branching decisions
    pub max_branches: u64,
    /// Wall-clock budget for one solve call
    pub time_limit: Option<Duration>,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            max_branches: 5_000_000,
            time_limit: None,
        }
    }
}

/// Exhaustive branch-and-bound engine
#[derive(Debug, Clone, Default)]
pub struct BranchAndBound {
    limits: SearchLimits,
}

impl BranchAndBound {
    pub fn new(limits: SearchLimits) -> Self {
        Self { limits }
    }
}

impl OptimizationEngine for BranchAndBound {
    fn solve(&self, model: &CpModel) -> Result<SolveResponse, EngineError> {
        let started = Instant::now();
        let mut search = Search::new(model, &self.limits, started);
        search.run();
        let wall_time = started.elapsed();

        let status = match (&search.best, search.limit_hit) {
            (Some(_), false) => SolveStatus::Optimal,
            (Some(_), true) => SolveStatus::Feasible,
            (None, false) => SolveStatus::Infeasible,
            (None, true) => SolveStatus::Unknown,
        };

        let solution = search.best.map(|(_, values)| Solution::new(values));
        let objective_value = match (model.objective(), &solution) {
            (Some(objective), Some(solution)) => solution.value_of(&objective.expr),
            _ => 0,
        };

        debug!(
            status = %status,
            objective = objective_value,
            branches = search.branches,
            wall_time = ?wall_time,
            "Search finished"
        );

        Ok(SolveResponse {
            status,
            objective_value,
            wall_time,
            solution,
        })
    }
}

/// Raised when the current bounds admit no solution
#[derive(Debug)]
struct Conflict;

type Bounds = Vec<(i64, i64)>;

/// `target == max(args)`; `min` aggregations are stored negated
struct Aggregate {
    target: LinearExpr,
    args: Vec<LinearExpr>,
}

struct Search<'m> {
    model: &'m CpModel,
    aggregates: Vec<Aggregate>,
    hint: Vec<Option<i64>>,
    /// Objective turned into a maximization
    objective: Option<LinearExpr>,
    /// Domain the objective must fall in to improve on the incumbent
    improve: Option<Domain>,
    best: Option<(i64, Vec<i64>)>,
    branches: u64,
    max_branches: u64,
    deadline: Option<Instant>,
    limit_hit: bool,
    done: bool,
}

impl<'m> Search<'m> {
    fn new(model: &'m CpModel, limits: &SearchLimits, started: Instant) -> Self {
        let aggregates = model
            .constraints()
            .iter()
            .filter_map(|c| match c {
                Constraint::MaxEquality { target, exprs } => Some(Aggregate {
                    target: LinearExpr::from(*target),
                    args: exprs.clone(),
                }),
                Constraint::MinEquality { target, exprs } => Some(Aggregate {
                    target: LinearExpr::from(*target).negated(),
                    args: exprs.iter().map(LinearExpr::negated).collect(),
                }),
                Constraint::Linear { .. } => None,
            })
            .collect();

        let mut hint = vec![None; model.variables().len()];
        for (var, value) in model.hint().iter() {
            hint[var.index()] = Some(value);
        }

        let objective = model.objective().map(|o| match o.sense {
            Sense::Maximize => o.expr.clone(),
            Sense::Minimize => o.expr.negated(),
        });

        Self {
            model,
            aggregates,
            hint,
            objective,
            improve: None,
            best: None,
            branches: 0,
            max_branches: limits.max_branches,
            deadline: limits.time_limit.map(|limit| started + limit),
            limit_hit: false,
            done: false,
        }
    }

    fn run(&mut self) {
        let bounds: Bounds = self
            .model
            .variables()
            .iter()
            .map(|decl| (decl.lo, decl.hi))
            .collect();
        self.dfs(bounds);
    }

    fn dfs(&mut self, mut bounds: Bounds) {
        if self.propagate(&mut bounds).is_err() {
            return;
        }

        let Some(var) = bounds.iter().position(|&(lo, hi)| lo < hi) else {
            self.record(&bounds);
            return;
        };

        let (lo, hi) = bounds[var];
        let hinted = self.hint[var].filter(|v| (lo..=hi).contains(v));
        let values = hinted
            .into_iter()
            .chain((lo..=hi).filter(move |v| Some(*v) != hinted));

        for value in values {
            if self.should_stop() {
                return;
            }
            self.branches += 1;
            let mut child = bounds.clone();
            child[var] = (value, value);
            self.dfs(child);
        }
    }

    fn should_stop(&mut self) -> bool {
        if self.done || self.limit_hit {
            return true;
        }
        if self.branches >= self.max_branches {
            self.limit_hit = true;
        } else if let Some(deadline) = self.deadline {
            if self.branches % 256 == 0 && Instant::now() >= deadline {
                self.limit_hit = true;
            }
        }
        self.limit_hit
    }

    fn record(&mut self, bounds: &Bounds) {
        let values: Vec<i64> = bounds.iter().map(|&(lo, _)| lo).collect();
        debug_assert!(self.model.is_satisfied_by(&values));

        match &self.objective {
            None => {
                self.best = Some((0, values));
                self.done = true;
            }
            Some(objective) => {
                let value = objective.evaluate(&values);
                if self.best.as_ref().map_or(true, |(best, _)| value > *best) {
                    trace!(objective = value, branches = self.branches, "Improving solution");
                    self.improve = Some(Domain::at_least(value.saturating_add(1)));
                    self.best = Some((value, values));
                }
            }
        }
    }

    fn propagate(&self, bounds: &mut Bounds) -> Result<(), Conflict> {
        loop {
            let mut changed = false;

            for constraint in self.model.constraints() {
                if let Constraint::Linear {
                    expr,
                    domain,
                    enforcement,
                } = constraint
                {
                    changed |= propagate_guarded(expr, domain, enforcement, bounds)?;
                }
            }
            for aggregate in &self.aggregates {
                changed |= propagate_max(aggregate, bounds)?;
            }
            if let (Some(objective), Some(improve)) = (&self.objective, &self.improve) {
                changed |= propagate_linear(objective, improve, bounds)?;
            }

            if !changed {
                return Ok(());
            }
        }
    }
}

fn literal_value(lit: BoolVar, bounds: &Bounds) -> Option<bool> {
    let (lo, hi) = bounds[lit.index()];
    (lo == hi).then(|| lit.holds(lo))
}

fn term_bounds(coef: i64, lo: i64, hi: i64) -> (i64, i64) {
    if coef >= 0 {
        (coef.saturating_mul(lo), coef.saturating_mul(hi))
    } else {
        (coef.saturating_mul(hi), coef.saturating_mul(lo))
    }
}

fn expr_bounds(expr: &LinearExpr, bounds: &Bounds) -> (i64, i64) {
    expr.terms()
        .iter()
        .fold((expr.offset(), expr.offset()), |(min, max), &(var, coef)| {
            let (lo, hi) = bounds[var];
            let (t_min, t_max) = term_bounds(coef, lo, hi);
            (min.saturating_add(t_min), max.saturating_add(t_max))
        })
}

fn floor_div(a: i64, b: i64) -> i64 {
    let q = a / b;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

fn ceil_div(a: i64, b: i64) -> i64 {
    let q = a / b;
    if a % b != 0 && ((a < 0) == (b < 0)) {
        q + 1
    } else {
        q
    }
}

/// Tighten bounds so that `expr ∈ domain` stays possible
fn propagate_linear(expr: &LinearExpr, domain: &Domain, bounds: &mut Bounds) -> Result<bool, Conflict> {
    let (e_min, e_max) = expr_bounds(expr, bounds);
    let (d_lo, d_hi) = domain.hull_within(e_min, e_max).ok_or(Conflict)?;

    let mut changed = false;
    for &(var, coef) in expr.terms() {
        let (lo, hi) = bounds[var];
        let (t_min, t_max) = term_bounds(coef, lo, hi);
        let rest_min = e_min.saturating_sub(t_min);
        let rest_max = e_max.saturating_sub(t_max);

        // coef * var ∈ [t_lo, t_hi]
        let t_lo = d_lo.saturating_sub(rest_max);
        let t_hi = d_hi.saturating_sub(rest_min);
        let (new_lo, new_hi) = if coef > 0 {
            (ceil_div(t_lo, coef), floor_div(t_hi, coef))
        } else {
            (ceil_div(t_hi, coef), floor_div(t_lo, coef))
        };

        let (lo2, hi2) = (lo.max(new_lo), hi.min(new_hi));
        if lo2 > hi2 {
            return Err(Conflict);
        }
        if (lo2, hi2) != (lo, hi) {
            bounds[var] = (lo2, hi2);
            changed = true;
        }
    }
    Ok(changed)
}

fn propagate_guarded(
    expr: &LinearExpr,
    domain: &Domain,
    enforcement: &[BoolVar],
    bounds: &mut Bounds,
) -> Result<bool, Conflict> {
    let mut open = Vec::new();
    for &lit in enforcement {
        match literal_value(lit, bounds) {
            Some(false) => return Ok(false),
            Some(true) => {}
            None => open.push(lit),
        }
    }

    match open.as_slice() {
        [] => propagate_linear(expr, domain, bounds),
        [lit] => {
            let (e_min, e_max) = expr_bounds(expr, bounds);
            if domain.hull_within(e_min, e_max).is_some() {
                return Ok(false);
            }
            let falsifying = if lit.is_negated() { 1 } else { 0 };
            bounds[lit.index()] = (falsifying, falsifying);
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn propagate_max(aggregate: &Aggregate, bounds: &mut Bounds) -> Result<bool, Conflict> {
    let arg_bounds: Vec<(i64, i64)> = aggregate
        .args
        .iter()
        .map(|arg| expr_bounds(arg, bounds))
        .collect();
    let Some(lo) = arg_bounds.iter().map(|&(lo, _)| lo).max() else {
        return Err(Conflict);
    };
    let hi = arg_bounds.iter().map(|&(_, hi)| hi).max().unwrap_or(lo);

    let mut changed = propagate_linear(&aggregate.target, &Domain::new(lo, hi), bounds)?;
    let (t_lo, t_hi) = expr_bounds(&aggregate.target, bounds);

    let ceiling = Domain::at_most(t_hi);
    for arg in &aggregate.args {
        changed |= propagate_linear(arg, &ceiling, bounds)?;
    }

    // the target's lower bound must be reached by some argument
    let mut supporters = aggregate
        .args
        .iter()
        .filter(|arg| expr_bounds(arg, bounds).1 >= t_lo);
    match (supporters.next(), supporters.next()) {
        (None, _) => return Err(Conflict),
        (Some(only), None) => {
            changed |= propagate_linear(only, &Domain::at_least(t_lo), bounds)?;
        }
        _ => {}
    }

    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CpModelBuilder, Hint};

    fn solve(builder: &CpModelBuilder) -> SolveResponse {
        let model = builder.build().unwrap();
        BranchAndBound::default().solve(&model).unwrap()
    }

    #[test]
    fn test_division_rounding() {
        assert_eq!(floor_div(7, 2), 3);
        assert_eq!(floor_div(-7, 2), -4);
        assert_eq!(floor_div(7, -2), -4);
        assert_eq!(ceil_div(7, 2), 4);
        assert_eq!(ceil_div(-7, 2), -3);
        assert_eq!(ceil_div(-7, -2), 4);
        assert_eq!(ceil_div(6, 3), 2);
    }

    #[test]
    fn test_maximize_linear() {
        let mut builder = CpModelBuilder::new();
        let x = builder.new_int_var(0, 10, "x");
        let y = builder.new_int_var(0, 10, "y");
        let mut sum = LinearExpr::from(x);
        sum.add_expr(y);
        builder.add_less_or_equal(sum, 7);
        builder.add_greater_or_equal(x, y);
        let mut objective = LinearExpr::from(x);
        objective.add_term(y, 2);
        builder.maximize(objective);

        let res = solve(&builder);
        assert_eq!(res.status, SolveStatus::Optimal);
        // x >= y, x + y <= 7: best is x = 4, y = 3
        assert_eq!(res.objective_value, 10);
        let solution = res.solution.unwrap();
        assert_eq!(solution.value(x), 4);
        assert_eq!(solution.value(y), 3);
    }

    #[test]
    fn test_minimize_reports_real_objective() {
        let mut builder = CpModelBuilder::new();
        let x = builder.new_int_var(-5, 5, "x");
        builder.add_greater_or_equal(x, -2);
        builder.minimize(x);

        let res = solve(&builder);
        assert_eq!(res.status, SolveStatus::Optimal);
        assert_eq!(res.objective_value, -2);
    }

    #[test]
    fn test_infeasible() {
        let mut builder = CpModelBuilder::new();
        let x = builder.new_int_var(0, 3, "x");
        builder.add_greater_than(x, 3);
        let res = solve(&builder);
        assert_eq!(res.status, SolveStatus::Infeasible);
        assert!(res.solution.is_none());
    }

    #[test]
    fn test_not_equal_hole() {
        let mut builder = CpModelBuilder::new();
        let x = builder.new_int_var(-1, 1, "x");
        builder.add_not_equal(x, 0);
        builder.add_greater_or_equal(x, 0);
        let res = solve(&builder);
        assert_eq!(res.status, SolveStatus::Optimal);
        assert_eq!(res.solution.unwrap().value(x), 1);
    }

    #[test]
    fn test_enforcement_literal_is_reified() {
        let mut builder = CpModelBuilder::new();
        let x = builder.new_int_var(0, 3, "x");
        let big = builder.new_bool_var("big");
        builder.add_greater_or_equal(x, 2).only_enforce_if(big);
        builder.add_less_or_equal(x, 1).only_enforce_if(!big);
        builder.add_equality(x, 1);
        builder.maximize(big);

        let res = solve(&builder);
        assert_eq!(res.status, SolveStatus::Optimal);
        assert!(!res.solution.unwrap().bool_value(big));
        assert_eq!(res.objective_value, 0);
    }

    #[test]
    fn test_max_and_min_equality() {
        let mut builder = CpModelBuilder::new();
        let vars: Vec<_> = (0..3)
            .map(|i| builder.new_int_var(i, i + 4, format!("v{}", i)))
            .collect();
        let hi = builder.new_int_var(0, 10, "hi");
        let lo = builder.new_int_var(0, 10, "lo");
        builder.add_max_equality(hi, vars.iter().copied());
        builder.add_min_equality(lo, vars.iter().copied());
        let mut spread = LinearExpr::from(hi);
        spread.add_term(lo, -1);
        builder.minimize(spread);

        let res = solve(&builder);
        assert_eq!(res.status, SolveStatus::Optimal);
        assert_eq!(res.objective_value, 0);
        let solution = res.solution.unwrap();
        assert_eq!(solution.value(hi), solution.value(lo));
        for v in &vars {
            assert_eq!(solution.value(*v), solution.value(hi));
        }
    }

    #[test]
    fn test_hint_guides_satisfaction_search() {
        let mut builder = CpModelBuilder::new();
        let x = builder.new_int_var(0, 9, "x");
        builder.add_not_equal(x, 4);
        builder.set_hint([(x, 7_i64)].into_iter().collect::<Hint>());
        let res = solve(&builder);
        assert_eq!(res.solution.unwrap().value(x), 7);

        // an infeasible hint is only a suggestion
        builder.set_hint([(x, 4_i64)].into_iter().collect::<Hint>());
        let res = solve(&builder);
        assert_eq!(res.status, SolveStatus::Optimal);
        assert_eq!(res.solution.unwrap().value(x), 0);
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(64))]

        #[test]
        fn prop_matches_enumeration(
            coefs in proptest::collection::vec(-3i64..=3, 3),
            weights in proptest::collection::vec(-3i64..=3, 3),
            rhs in -4i64..=8,
        ) {
            let mut builder = CpModelBuilder::new();
            let vars: Vec<_> = (0..3)
                .map(|i| builder.new_int_var(0, 3, format!("x{}", i)))
                .collect();
            let mut lhs = LinearExpr::new();
            let mut objective = LinearExpr::new();
            for (i, var) in vars.iter().enumerate() {
                lhs.add_term(*var, coefs[i]);
                objective.add_term(*var, weights[i]);
            }
            builder.add_less_or_equal(lhs, rhs);
            builder.maximize(objective);
            let model = builder.build().unwrap();

            let mut best: Option<i64> = None;
            for a in 0..=3i64 {
                for b in 0..=3i64 {
                    for c in 0..=3i64 {
                        let values = [a, b, c];
                        if model.is_satisfied_by(&values) {
                            let value = weights[0] * a + weights[1] * b + weights[2] * c;
                            best = Some(best.map_or(value, |v| v.max(value)));
                        }
                    }
                }
            }

            let res = BranchAndBound::default().solve(&model).unwrap();
            match best {
                Some(value) => {
                    proptest::prop_assert_eq!(res.status, SolveStatus::Optimal);
                    proptest::prop_assert_eq!(res.objective_value, value);
                    let solution = res.solution.unwrap();
                    proptest::prop_assert!(model.is_satisfied_by(solution.values()));
                }
                None => proptest::prop_assert_eq!(res.status, SolveStatus::Infeasible),
            }
        }
    }

    #[test]
    fn test_branch_limit_without_solution() {
        let mut builder = CpModelBuilder::new();
        let x = builder.new_int_var(0, 5, "x");
        builder.maximize(x);
        let model = builder.build().unwrap();

        let engine = BranchAndBound::new(SearchLimits {
            max_branches: 0,
            time_limit: None,
        });
        let res = engine.solve(&model).unwrap();
        assert_eq!(res.status, SolveStatus::Unknown);
        assert!(res.solution.is_none());
    }

    #[test]
    fn test_branch_limit_with_incumbent() {
        let mut builder = CpModelBuilder::new();
        let x = builder.new_int_var(0, 5, "x");
        builder.maximize(x);
        let model = builder.build().unwrap();

        let engine = BranchAndBound::new(SearchLimits {
            max_branches: 1,
            time_limit: None,
        });
        let res = engine.solve(&model).unwrap();
        assert_eq!(res.status, SolveStatus::Feasible);
        assert_eq!(res.objective_value, 0);
    }
}
