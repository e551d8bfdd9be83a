//! Constraint model builder
//!
//! Declares bounded integer and boolean variables, posts linear constraints
//! (optionally guarded by enforcement literals), max/min aggregations, an
//! objective and a warm-start hint. [`CpModelBuilder::build`] validates the
//! declarations and snapshots them into an immutable [`CpModel`] that any
//! [`OptimizationEngine`](crate::OptimizationEngine) can solve.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Not;

use crate::error::{ModelError, Result};

/// Handle to a bounded integer variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IntVar(pub(crate) usize);

impl IntVar {
    /// Index of the variable inside its model
    pub fn index(self) -> usize {
        self.0
    }
}

/// Handle to a boolean literal: a 0/1 variable, possibly negated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoolVar {
    pub(crate) index: usize,
    pub(crate) negated: bool,
}

impl BoolVar {
    /// Index of the underlying 0/1 variable
    pub fn index(self) -> usize {
        self.index
    }

    pub fn is_negated(self) -> bool {
        self.negated
    }

    /// Truth value of this literal given the value of its variable
    pub fn holds(self, value: i64) -> bool {
        (value == 1) != self.negated
    }
}

impl Not for BoolVar {
    type Output = BoolVar;

    fn not(self) -> BoolVar {
        BoolVar {
            index: self.index,
            negated: !self.negated,
        }
    }
}

/// Sum of `coef * var` terms plus a constant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinearExpr {
    pub(crate) terms: Vec<(usize, i64)>,
    pub(crate) constant: i64,
}

impl LinearExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constant(value: i64) -> Self {
        Self {
            terms: Vec::new(),
            constant: value,
        }
    }

    /// Sum of all items
    pub fn sum<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<LinearExpr>,
    {
        let mut expr = Self::new();
        for item in items {
            expr.add_expr(item);
        }
        expr
    }

    /// Add another expression (or variable) to this one
    pub fn add_expr(&mut self, other: impl Into<LinearExpr>) -> &mut Self {
        self.add_term(other, 1)
    }

    /// Add `coef * other`
    pub fn add_term(&mut self, other: impl Into<LinearExpr>, coef: i64) -> &mut Self {
        let other = other.into();
        self.terms
            .extend(other.terms.into_iter().map(|(var, c)| (var, c * coef)));
        self.constant += other.constant * coef;
        self
    }

    pub fn add_constant(&mut self, value: i64) -> &mut Self {
        self.constant += value;
        self
    }

    /// `(variable index, coefficient)` pairs
    pub fn terms(&self) -> &[(usize, i64)] {
        &self.terms
    }

    pub fn offset(&self) -> i64 {
        self.constant
    }

    /// Evaluate under a full assignment indexed by variable
    pub fn evaluate(&self, values: &[i64]) -> i64 {
        self.terms
            .iter()
            .fold(self.constant, |acc, &(var, coef)| acc + coef * values[var])
    }

    /// `-self`
    pub fn negated(&self) -> Self {
        Self {
            terms: self.terms.iter().map(|&(var, c)| (var, -c)).collect(),
            constant: -self.constant,
        }
    }

    /// Merge duplicate variables and drop zero coefficients
    pub(crate) fn normalized(&self) -> Self {
        let mut merged: BTreeMap<usize, i64> = BTreeMap::new();
        for &(var, coef) in &self.terms {
            *merged.entry(var).or_default() += coef;
        }
        Self {
            terms: merged.into_iter().filter(|&(_, c)| c != 0).collect(),
            constant: self.constant,
        }
    }
}

impl From<IntVar> for LinearExpr {
    fn from(var: IntVar) -> Self {
        Self {
            terms: vec![(var.0, 1)],
            constant: 0,
        }
    }
}

impl From<BoolVar> for LinearExpr {
    fn from(lit: BoolVar) -> Self {
        if lit.negated {
            // not(x) == 1 - x
            Self {
                terms: vec![(lit.index, -1)],
                constant: 1,
            }
        } else {
            Self {
                terms: vec![(lit.index, 1)],
                constant: 0,
            }
        }
    }
}

impl From<i64> for LinearExpr {
    fn from(value: i64) -> Self {
        Self::constant(value)
    }
}

impl From<i32> for LinearExpr {
    fn from(value: i32) -> Self {
        Self::constant(i64::from(value))
    }
}

impl From<&LinearExpr> for LinearExpr {
    fn from(expr: &LinearExpr) -> Self {
        expr.clone()
    }
}

/// Sorted union of disjoint closed integer intervals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Domain {
    intervals: Vec<(i64, i64)>,
}

impl Domain {
    /// `[lo, hi]` (empty when `lo > hi`)
    pub fn new(lo: i64, hi: i64) -> Self {
        Self::from_intervals([(lo, hi)])
    }

    pub fn from_intervals(intervals: impl IntoIterator<Item = (i64, i64)>) -> Self {
        let mut sorted: Vec<(i64, i64)> = intervals.into_iter().filter(|(lo, hi)| lo <= hi).collect();
        sorted.sort_unstable();

        let mut merged: Vec<(i64, i64)> = Vec::with_capacity(sorted.len());
        for (lo, hi) in sorted {
            match merged.last_mut() {
                Some(last) if lo <= last.1.saturating_add(1) => last.1 = last.1.max(hi),
                _ => merged.push((lo, hi)),
            }
        }
        Self { intervals: merged }
    }

    pub fn at_least(value: i64) -> Self {
        Self::new(value, i64::MAX)
    }

    pub fn at_most(value: i64) -> Self {
        Self::new(i64::MIN, value)
    }

    /// Everything except `value`
    pub fn excluding(value: i64) -> Self {
        let mut intervals = Vec::with_capacity(2);
        if value > i64::MIN {
            intervals.push((i64::MIN, value - 1));
        }
        if value < i64::MAX {
            intervals.push((value + 1, i64::MAX));
        }
        Self::from_intervals(intervals)
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn contains(&self, value: i64) -> bool {
        self.intervals
            .iter()
            .any(|&(lo, hi)| lo <= value && value <= hi)
    }

    pub fn intervals(&self) -> &[(i64, i64)] {
        &self.intervals
    }

    /// Smallest interval covering `self ∩ [lo, hi]`, or `None` if disjoint
    pub fn hull_within(&self, lo: i64, hi: i64) -> Option<(i64, i64)> {
        let mut hull: Option<(i64, i64)> = None;
        for &(a, b) in &self.intervals {
            let (a, b) = (a.max(lo), b.min(hi));
            if a > b {
                continue;
            }
            hull = Some(match hull {
                Some((h_lo, h_hi)) => (h_lo.min(a), h_hi.max(b)),
                None => (a, b),
            });
        }
        hull
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .intervals
            .iter()
            .map(|(lo, hi)| format!("[{}, {}]", lo, hi))
            .collect();
        write!(f, "{}", parts.join(" ∪ "))
    }
}

/// Declared variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarDecl {
    pub name: String,
    pub lo: i64,
    pub hi: i64,
    pub boolean: bool,
}

/// Posted constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// `expr ∈ domain`, enforced only when every literal holds
    Linear {
        expr: LinearExpr,
        domain: Domain,
        enforcement: Vec<BoolVar>,
    },
    /// `target == max(exprs)`
    MaxEquality { target: IntVar, exprs: Vec<LinearExpr> },
    /// `target == min(exprs)`
    MinEquality { target: IntVar, exprs: Vec<LinearExpr> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Maximize,
    Minimize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Objective {
    pub expr: LinearExpr,
    pub sense: Sense,
}

/// Non-binding suggested assignment used to seed the search
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hint {
    values: BTreeMap<IntVar, i64>,
}

impl Hint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, var: IntVar, value: i64) {
        self.values.insert(var, value);
    }

    pub fn get(&self, var: IntVar) -> Option<i64> {
        self.values.get(&var).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (IntVar, i64)> + '_ {
        self.values.iter().map(|(&var, &value)| (var, value))
    }
}

impl FromIterator<(IntVar, i64)> for Hint {
    fn from_iter<I: IntoIterator<Item = (IntVar, i64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Validated, immutable model
#[derive(Debug, Clone)]
pub struct CpModel {
    variables: Vec<VarDecl>,
    constraints: Vec<Constraint>,
    objective: Option<Objective>,
    hint: Hint,
}

impl CpModel {
    pub fn variables(&self) -> &[VarDecl] {
        &self.variables
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn objective(&self) -> Option<&Objective> {
        self.objective.as_ref()
    }

    pub fn hint(&self) -> &Hint {
        &self.hint
    }

    /// Check a full assignment against every domain and constraint
    pub fn is_satisfied_by(&self, values: &[i64]) -> bool {
        if values.len() != self.variables.len() {
            return false;
        }
        let in_domains = self
            .variables
            .iter()
            .zip(values)
            .all(|(decl, &v)| decl.lo <= v && v <= decl.hi);

        in_domains
            && self.constraints.iter().all(|c| match c {
                Constraint::Linear {
                    expr,
                    domain,
                    enforcement,
                } => {
                    let active = enforcement.iter().all(|lit| lit.holds(values[lit.index]));
                    !active || domain.contains(expr.evaluate(values))
                }
                Constraint::MaxEquality { target, exprs } => {
                    exprs.iter().map(|e| e.evaluate(values)).max() == Some(values[target.0])
                }
                Constraint::MinEquality { target, exprs } => {
                    exprs.iter().map(|e| e.evaluate(values)).min() == Some(values[target.0])
                }
            })
    }
}

/// Mutable model under construction
#[derive(Debug, Default)]
pub struct CpModelBuilder {
    variables: Vec<VarDecl>,
    constraints: Vec<Constraint>,
    objective: Option<Objective>,
    hint: Hint,
}

/// Handle on a freshly posted linear constraint
pub struct ConstraintRef<'a> {
    constraint: &'a mut Constraint,
}

impl ConstraintRef<'_> {
    /// Only enforce the constraint when `literal` holds
    pub fn only_enforce_if(self, literal: BoolVar) -> Self {
        if let Constraint::Linear { enforcement, .. } = self.constraint {
            enforcement.push(literal);
        }
        self
    }
}

impl CpModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_int_var(&mut self, lo: i64, hi: i64, name: impl Into<String>) -> IntVar {
        self.variables.push(VarDecl {
            name: name.into(),
            lo,
            hi,
            boolean: false,
        });
        IntVar(self.variables.len() - 1)
    }

    pub fn new_bool_var(&mut self, name: impl Into<String>) -> BoolVar {
        self.variables.push(VarDecl {
            name: name.into(),
            lo: 0,
            hi: 1,
            boolean: true,
        });
        BoolVar {
            index: self.variables.len() - 1,
            negated: false,
        }
    }

    /// Diagnostic name of a variable
    pub fn name(&self, index: usize) -> &str {
        self.variables
            .get(index)
            .map(|decl| decl.name.as_str())
            .unwrap_or("<unknown>")
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// `expr ∈ domain`
    pub fn add_linear_in_domain(
        &mut self,
        expr: impl Into<LinearExpr>,
        domain: Domain,
    ) -> ConstraintRef<'_> {
        self.constraints.push(Constraint::Linear {
            expr: expr.into().normalized(),
            domain,
            enforcement: Vec::new(),
        });
        let last = self.constraints.len() - 1;
        ConstraintRef {
            constraint: &mut self.constraints[last],
        }
    }

    pub fn add_equality(
        &mut self,
        lhs: impl Into<LinearExpr>,
        rhs: impl Into<LinearExpr>,
    ) -> ConstraintRef<'_> {
        self.add_linear_in_domain(difference(lhs, rhs), Domain::new(0, 0))
    }

    pub fn add_not_equal(
        &mut self,
        lhs: impl Into<LinearExpr>,
        rhs: impl Into<LinearExpr>,
    ) -> ConstraintRef<'_> {
        self.add_linear_in_domain(difference(lhs, rhs), Domain::excluding(0))
    }

    pub fn add_greater_or_equal(
        &mut self,
        lhs: impl Into<LinearExpr>,
        rhs: impl Into<LinearExpr>,
    ) -> ConstraintRef<'_> {
        self.add_linear_in_domain(difference(lhs, rhs), Domain::at_least(0))
    }

    pub fn add_greater_than(
        &mut self,
        lhs: impl Into<LinearExpr>,
        rhs: impl Into<LinearExpr>,
    ) -> ConstraintRef<'_> {
        self.add_linear_in_domain(difference(lhs, rhs), Domain::at_least(1))
    }

    pub fn add_less_or_equal(
        &mut self,
        lhs: impl Into<LinearExpr>,
        rhs: impl Into<LinearExpr>,
    ) -> ConstraintRef<'_> {
        self.add_linear_in_domain(difference(lhs, rhs), Domain::at_most(0))
    }

    pub fn add_max_equality<I, T>(&mut self, target: IntVar, exprs: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<LinearExpr>,
    {
        let exprs = exprs.into_iter().map(|e| e.into().normalized()).collect();
        self.constraints.push(Constraint::MaxEquality { target, exprs });
    }

    pub fn add_min_equality<I, T>(&mut self, target: IntVar, exprs: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<LinearExpr>,
    {
        let exprs = exprs.into_iter().map(|e| e.into().normalized()).collect();
        self.constraints.push(Constraint::MinEquality { target, exprs });
    }

    /// Replaces any previous objective
    pub fn maximize(&mut self, expr: impl Into<LinearExpr>) {
        self.objective = Some(Objective {
            expr: expr.into().normalized(),
            sense: Sense::Maximize,
        });
    }

    /// Replaces any previous objective
    pub fn minimize(&mut self, expr: impl Into<LinearExpr>) {
        self.objective = Some(Objective {
            expr: expr.into().normalized(),
            sense: Sense::Minimize,
        });
    }

    /// Replaces any previous hint
    pub fn set_hint(&mut self, hint: Hint) {
        self.hint = hint;
    }

    /// Validate and snapshot the model
    pub fn build(&self) -> Result<CpModel> {
        for decl in &self.variables {
            if decl.lo > decl.hi {
                return Err(ModelError::EmptyVariableDomain {
                    name: decl.name.clone(),
                    lo: decl.lo,
                    hi: decl.hi,
                });
            }
        }

        for (i, constraint) in self.constraints.iter().enumerate() {
            match constraint {
                Constraint::Linear {
                    expr,
                    domain,
                    enforcement,
                } => {
                    self.check_expr(expr)?;
                    if domain.is_empty() {
                        return Err(ModelError::EmptyConstraintDomain(i));
                    }
                    for lit in enforcement {
                        self.check_index(lit.index)?;
                        if !self.variables[lit.index].boolean {
                            return Err(ModelError::NonBooleanLiteral(
                                self.variables[lit.index].name.clone(),
                            ));
                        }
                    }
                }
                Constraint::MaxEquality { target, exprs } => {
                    self.check_aggregation(*target, exprs, "max")?
                }
                Constraint::MinEquality { target, exprs } => {
                    self.check_aggregation(*target, exprs, "min")?
                }
            }
        }

        if let Some(objective) = &self.objective {
            self.check_expr(&objective.expr)?;
        }
        for (var, _) in self.hint.iter() {
            self.check_index(var.0)?;
        }

        Ok(CpModel {
            variables: self.variables.clone(),
            constraints: self.constraints.clone(),
            objective: self.objective.clone(),
            hint: self.hint.clone(),
        })
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.variables.len() {
            return Err(ModelError::UnknownVariable {
                index,
                declared: self.variables.len(),
            });
        }
        Ok(())
    }

    fn check_expr(&self, expr: &LinearExpr) -> Result<()> {
        expr.terms
            .iter()
            .try_for_each(|&(var, _)| self.check_index(var))
    }

    fn check_aggregation(
        &self,
        target: IntVar,
        exprs: &[LinearExpr],
        kind: &'static str,
    ) -> Result<()> {
        self.check_index(target.0)?;
        if exprs.is_empty() {
            return Err(ModelError::EmptyAggregation(kind));
        }
        exprs.iter().try_for_each(|e| self.check_expr(e))
    }
}

fn difference(lhs: impl Into<LinearExpr>, rhs: impl Into<LinearExpr>) -> LinearExpr {
    let mut expr = lhs.into();
    expr.add_term(rhs, -1);
    expr
}
