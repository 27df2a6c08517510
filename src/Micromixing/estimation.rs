//! # Mixing-Time Estimation
//!
//! Scalar objectives comparing a simulated observable against its measured
//! value, and the derivative-free search recovering the micro-mixing time.
//!
//! Each objective evaluation runs one full stiff integration, so the search
//! is a Nelder-Mead simplex on the single tm axis: no gradients, and a
//! failed evaluation (corrupted state, non-finite observable, non-positive
//! candidate) is priced at +infinity so the simplex steers away from that
//! region instead of aborting the run.
//!
//! ## Usage Pattern
//! 1. `EstimationProblem::new()` - bind composition, flows, model, target
//! 2. `residual(tm)` - one objective evaluation (used by tests/diagnostics)
//! 3. `estimate_mixing_time()` - run the simplex search
use super::MicromixingIVP::{MicromixError, MicromixingTask, SolverSettings};
use super::incorporation::{FlowRates, IncorporationModel};
use crate::Kinetics::iodide_iodate::{N_SPECIES, RateConstants};
use argmin::core::{CostFunction, Executor, State, TerminationReason};
use argmin::solver::neldermead::NelderMead;
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Which measured observable the objective compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetObservable {
    /// Final triiodide concentration, mol/L
    TriiodideConcentration,
    /// Final segregation index, dimensionless
    SegregationIndex,
}

impl TargetObservable {
    pub fn describe(&self) -> &'static str {
        match self {
            TargetObservable::TriiodideConcentration => "triiodide",
            TargetObservable::SegregationIndex => "segregation-index",
        }
    }
}

/// One estimation problem: fixed inputs plus the experimental reference.
///
/// Evaluations share no mutable state; each one builds and solves its own
/// task, so repeated calls with the same tm are idempotent.
#[derive(Debug, Clone)]
pub struct EstimationProblem {
    /// Initial concentrations in species order, mol/L
    pub c0: [f64; N_SPECIES],
    /// Inlet flow rates, L/s
    pub flow: FlowRates,
    /// Resolved incorporation model
    pub model: IncorporationModel,
    /// Rate constants of the fixed equilibria
    pub constants: RateConstants,
    /// Integrator settings
    pub settings: SolverSettings,
    /// Observable the residual is computed against
    pub target: TargetObservable,
    /// Measured reference value (mol/L or dimensionless)
    pub reference: f64,
}

impl EstimationProblem {
    pub fn new(
        c0: [f64; N_SPECIES],
        flow: FlowRates,
        model: IncorporationModel,
        target: TargetObservable,
        reference: f64,
    ) -> Self {
        Self {
            c0,
            flow,
            model,
            constants: RateConstants::default(),
            settings: SolverSettings::default(),
            target,
            reference,
        }
    }

    /// Run one forward simulation and extract the target observable.
    pub fn simulate_observable(&self, tm: f64) -> Result<f64, MicromixError> {
        let mut task = MicromixingTask::new(tm, self.c0, self.flow, self.model);
        task.set_rate_constants(self.constants);
        task.set_solver_settings(self.settings);
        let trajectory = task.solve()?;
        let observable = match self.target {
            TargetObservable::TriiodideConcentration => {
                trajectory.final_triiodide_concentration()
            }
            TargetObservable::SegregationIndex => trajectory.final_segregation_index(),
        };
        if !observable.is_finite() {
            return Err(MicromixError::NonFiniteState {
                t: trajectory.t[trajectory.len() - 1],
            });
        }
        Ok(observable)
    }

    /// Squared residual of the simulated observable against the reference.
    ///
    /// Failed evaluations are priced at +infinity rather than propagated,
    /// so the minimizer treats them as a repulsive region.
    pub fn residual(&self, tm: f64) -> f64 {
        if !tm.is_finite() || tm <= 0.0 {
            info!(
                "{} objective: tm = {:.4} ms rejected (non-positive mixing time)",
                self.target.describe(),
                tm * 1.0e3
            );
            return f64::INFINITY;
        }
        match self.simulate_observable(tm) {
            Ok(simulated) => {
                let residual = (simulated - self.reference).powi(2);
                info!(
                    "{} objective: tm = {:.4} ms, squared residual = {:.6e}",
                    self.target.describe(),
                    tm * 1.0e3,
                    residual
                );
                residual
            }
            Err(error) => {
                info!(
                    "{} objective: tm = {:.4} ms rejected ({})",
                    self.target.describe(),
                    tm * 1.0e3,
                    error
                );
                f64::INFINITY
            }
        }
    }
}

impl CostFunction for EstimationProblem {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        Ok(self.residual(param[0]))
    }
}

/// Result of one mixing-time search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixingTimeEstimate {
    /// Best-fit micro-mixing time, s
    pub tm: f64,
    /// Objective value at the best iterate
    pub objective: f64,
    /// Simplex iterations spent
    pub iterations: u64,
    /// False when the iteration cap was exhausted before the tolerance was
    /// met; the reported tm is then the last iterate, not a converged fit
    pub converged: bool,
}

/// Search for the mixing time minimizing the objective, starting from
/// `tm_guess`.
///
/// `sd_tolerance` is the termination criterion on the standard deviation of
/// the simplex objective values; `max_iters` caps the evaluation budget.
/// The search is local: distinct guesses may land in distinct minima when
/// the objective surface is non-convex (expected near tm -> 0).
pub fn estimate_mixing_time(
    problem: &EstimationProblem,
    tm_guess: f64,
    sd_tolerance: f64,
    max_iters: u64,
) -> Result<MixingTimeEstimate, MicromixError> {
    if !tm_guess.is_finite() || tm_guess <= 0.0 {
        return Err(MicromixError::InvalidInput(format!(
            "initial mixing-time guess must be finite and positive, got {}",
            tm_guess
        )));
    }
    if !sd_tolerance.is_finite() || sd_tolerance <= 0.0 {
        return Err(MicromixError::InvalidInput(format!(
            "minimizer tolerance must be finite and positive, got {}",
            sd_tolerance
        )));
    }

    // two-point simplex on the single tm axis
    let simplex = vec![vec![tm_guess], vec![tm_guess * 1.2]];
    let solver = NelderMead::new(simplex)
        .with_sd_tolerance(sd_tolerance)
        .map_err(|e| MicromixError::EstimatorFailure(e.to_string()))?;

    let result = Executor::new(problem.clone(), solver)
        .configure(|state| state.max_iters(max_iters))
        .run()
        .map_err(|e| MicromixError::EstimatorFailure(e.to_string()))?;

    let state = result.state();
    let tm = state
        .get_best_param()
        .and_then(|param| param.first().copied())
        .ok_or_else(|| {
            MicromixError::EstimatorFailure("minimizer returned no iterate".to_string())
        })?;
    let converged = matches!(
        state.get_termination_reason(),
        Some(TerminationReason::SolverConverged)
    );
    if !converged {
        warn!(
            "mixing-time search stopped after {} iterations without meeting tolerance; returning the last iterate",
            state.get_iter()
        );
    }
    info!(
        "mixing-time search finished: tm = {:.4} ms, objective = {:.6e}, converged = {}",
        tm * 1.0e3,
        state.get_best_cost(),
        converged
    );
    Ok(MixingTimeEstimate {
        tm,
        objective: state.get_best_cost(),
        iterations: state.get_iter(),
        converged,
    })
}
