//! Phase orchestrator
//!
//! Runs the two solves of a planning run as a strict linear pipeline:
//!
//! ```text
//! Init -> Phase1Built -> Phase1Solved -> Phase2Built -> Phase2Solved -> Done
//! ```
//!
//! Phase 1 maximizes diversity. Its optimum `D*` is re-asserted as an
//! equality in phase 2 and its operations seed phase 2 as a hint; phase 2
//! then minimizes the load spread. Any failure moves the run to `Failed`
//! and ends it, there are no retries.

use std::fmt;

use cyxcloud_solver::{
    CpModel, CpModelBuilder, EngineError, ModelError, OptimizationEngine, Solution, SolveStatus,
};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::builder::{self, BalanceVars, PlacementVars};
use crate::error::{PlacementError, Result};
use crate::model::PlacementModel;
use crate::report::{PhaseStats, PlacementReport};

/// Which of the two solves a step or failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    /// Maximize the number of occupied regions
    #[serde(rename = "phase-1")]
    Diversity,
    /// Minimize the load spread at fixed diversity
    #[serde(rename = "phase-2")]
    Balance,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Diversity => f.write_str("phase-1"),
            Phase::Balance => f.write_str("phase-2"),
        }
    }
}

/// Pipeline state of a planning run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanState {
    Init,
    Phase1Built,
    Phase1Solved,
    Phase2Built,
    Phase2Solved,
    Done,
    Failed,
}

/// One planning run. Owns its model builder, so concurrent runs share nothing.
pub struct PlanRun<'a, E> {
    engine: &'a E,
    model: &'a PlacementModel,
    state: PlanState,
    builder: CpModelBuilder,
    vars: Option<PlacementVars>,
    balance: Option<BalanceVars>,
    pending: Option<CpModel>,
    diversity_solution: Option<Solution>,
    balance_solution: Option<Solution>,
    stats: Vec<PhaseStats>,
}

impl<'a, E: OptimizationEngine> PlanRun<'a, E> {
    pub fn new(engine: &'a E, model: &'a PlacementModel) -> Self {
        Self {
            engine,
            model,
            state: PlanState::Init,
            builder: CpModelBuilder::new(),
            vars: None,
            balance: None,
            pending: None,
            diversity_solution: None,
            balance_solution: None,
            stats: Vec::with_capacity(2),
        }
    }

    pub fn state(&self) -> PlanState {
        self.state
    }

    /// Solve statistics of the phases completed so far
    pub fn stats(&self) -> &[PhaseStats] {
        &self.stats
    }

    /// `Init -> Phase1Built`
    pub fn build_phase1(&mut self) -> Result<()> {
        self.expect_state(PlanState::Init, "build phase 1")?;

        let vars = PlacementVars::declare(&mut self.builder, self.model);
        builder::add_diversity_objective(&mut self.builder, &vars);
        self.vars = Some(vars);

        self.pending = Some(self.build_model(Phase::Diversity)?);
        self.advance(PlanState::Phase1Built);
        Ok(())
    }

    /// `Phase1Built -> Phase1Solved`
    pub fn solve_phase1(&mut self) -> Result<()> {
        self.expect_state(PlanState::Phase1Built, "solve phase 1")?;
        let solution = self.solve(Phase::Diversity)?;
        self.diversity_solution = Some(solution);
        self.advance(PlanState::Phase1Solved);
        Ok(())
    }

    /// `Phase1Solved -> Phase2Built`
    pub fn build_phase2(&mut self) -> Result<()> {
        self.expect_state(PlanState::Phase1Solved, "build phase 2")?;

        let (Some(vars), Some(solution)) = (&self.vars, &self.diversity_solution) else {
            return Err(self.fail(PlacementError::Solve {
                phase: Phase::Diversity,
                reason: "phase 1 left no solution".to_string(),
            }));
        };
        let diversity = solution.value_of(vars.diversity());
        let hint_ops: Vec<i64> = vars.nodes.iter().map(|n| solution.value(n.op)).collect();
        debug!(diversity, hint = ?hint_ops, "Seeding phase 2");

        let balance =
            builder::add_balance_objective(&mut self.builder, self.model, vars, diversity, &hint_ops);
        self.balance = Some(balance);

        self.pending = Some(self.build_model(Phase::Balance)?);
        self.advance(PlanState::Phase2Built);
        Ok(())
    }

    /// `Phase2Built -> Phase2Solved`
    pub fn solve_phase2(&mut self) -> Result<()> {
        self.expect_state(PlanState::Phase2Built, "solve phase 2")?;
        let solution = self.solve(Phase::Balance)?;
        self.balance_solution = Some(solution);
        self.advance(PlanState::Phase2Solved);
        Ok(())
    }

    /// `Phase2Solved -> Done`: hand the solved values to the reporter
    pub fn finish(&mut self) -> Result<PlacementReport> {
        self.expect_state(PlanState::Phase2Solved, "finish")?;

        let (Some(vars), Some(balance), Some(solution)) =
            (&self.vars, &self.balance, &self.balance_solution)
        else {
            return Err(self.fail(PlacementError::Solve {
                phase: Phase::Balance,
                reason: "phase 2 left no solution".to_string(),
            }));
        };
        let report =
            PlacementReport::collect(self.model, vars, balance, solution, self.stats.clone());
        self.advance(PlanState::Done);
        Ok(report)
    }

    fn build_model(&mut self, phase: Phase) -> Result<CpModel> {
        self.builder
            .build()
            .map_err(|source| self.fail(PlacementError::ModelBuild { phase, source }))
    }

    fn solve(&mut self, phase: Phase) -> Result<Solution> {
        let Some(model) = self.pending.take() else {
            return Err(self.fail(PlacementError::Solve {
                phase,
                reason: "no model built".to_string(),
            }));
        };

        let response = match self.engine.solve(&model) {
            Ok(response) => response,
            Err(EngineError::Model(source)) => {
                return Err(self.fail(PlacementError::ModelBuild { phase, source }))
            }
            Err(EngineError::Internal(reason)) => {
                return Err(self.fail(PlacementError::Solve { phase, reason }))
            }
        };

        info!(
            phase = %phase,
            status = %response.status,
            objective = response.objective_value,
            wall_time = ?response.wall_time,
            "Phase solved"
        );

        match response.status {
            SolveStatus::Optimal | SolveStatus::Feasible => {}
            SolveStatus::Infeasible => {
                return Err(self.fail(PlacementError::Infeasible { phase }));
            }
            SolveStatus::ModelInvalid => {
                return Err(self.fail(PlacementError::ModelBuild {
                    phase,
                    source: ModelError::Rejected(response.status.to_string()),
                }));
            }
            status => {
                return Err(self.fail(PlacementError::Solve {
                    phase,
                    reason: format!("engine returned status {}", status),
                }));
            }
        }

        let Some(solution) = response.solution else {
            return Err(self.fail(PlacementError::Solve {
                phase,
                reason: "engine reported success without a solution".to_string(),
            }));
        };

        self.stats.push(PhaseStats {
            phase,
            status: response.status.to_string(),
            objective: response.objective_value,
            wall_time_secs: response.wall_time.as_secs_f64(),
        });
        Ok(solution)
    }

    fn expect_state(&self, expected: PlanState, step: &'static str) -> Result<()> {
        if self.state != expected {
            return Err(PlacementError::InvalidTransition {
                step,
                state: self.state,
            });
        }
        Ok(())
    }

    fn advance(&mut self, next: PlanState) {
        debug!(from = ?self.state, to = ?next, "Plan state transition");
        self.state = next;
    }

    fn fail(&mut self, err: PlacementError) -> PlacementError {
        warn!(from = ?self.state, error = %err, "Planning run failed");
        self.state = PlanState::Failed;
        err
    }
}

/// Two-phase placement planner
pub struct Planner<E> {
    engine: E,
}

impl<E: OptimizationEngine> Planner<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Run both phases and report the resulting plan
    #[instrument(skip(self, model), fields(nodes = model.nodes().len(), regions = model.regions().len()))]
    pub fn plan(&self, model: &PlacementModel) -> Result<PlacementReport> {
        info!(
            replicas = model.replica_total(),
            diversity = model.current_diversity(),
            spread = model.current_spread(),
            "Planning placement"
        );

        let mut run = PlanRun::new(&self.engine, model);
        run.build_phase1()?;
        run.solve_phase1()?;
        run.build_phase2()?;
        run.solve_phase2()?;
        let report = run.finish()?;

        info!(summary = %report.summary(), "Placement plan created");
        Ok(report)
    }
}
