//! # Micromixing Forward Simulator
//!
//! Integrates the 8-species flux ODE of the incorporation micromixing model
//! over the configuration-dependent horizon and derives the measurable
//! observables from the final state.
//!
//! ## Main Structures
//!
//! - **`MicromixingTask`**: aggregates the mixing-time candidate, inlet
//!   composition, flow rates, incorporation model and solver settings;
//!   workflow is `new()` -> setters -> `check_task()` -> `solve()`.
//! - **`Trajectory`**: the integrated (time, flux-state) samples plus the
//!   inlet reference needed to compute derived series pointwise.
//! - **`SolverSettings`**: integrator tolerances and mesh resolution.
//!
//! ## Initial Condition
//!
//! At t = 0 the incorporation volume holds only the acid stream, so every
//! species flux starts at zero except H+, which starts at its acid-stream
//! inlet flux. All buffer-stream species enter through the replenishment
//! terms as the volume grows.
//!
//! ## Stiffness
//!
//! The buffer neutralization relaxes within microseconds while the Dushman
//! reaction evolves over the whole horizon; the system is integrated with
//! the A-stable implicit Gauss-Legendre scheme (GL4, Broyden stage solver)
//! on a fixed mesh. `rtol` bounds the implicit-stage iteration, `atol` is
//! the absolute floor used when screening the trajectory for numerical
//! noise. One integration attempt per call; step-level behavior is the
//! integrator's own concern.
use super::incorporation::{ConfigFallback, FlowRates, IncorporationModel};
use crate::Kinetics::iodide_iodate::{
    self, KineticsError, N_SPECIES, RateConstants, Species,
};
use log::{info, warn};
use nalgebra::{DMatrix, DVector};
use peroxide::fuga::{BasicODESolver, GL4, ImplicitSolver, ODEProblem, ODESolver};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use thiserror::Error;

/// Errors of the micromixing simulation and estimation workflow.
#[derive(Error, Debug)]
pub enum MicromixError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Kinetics(#[from] KineticsError),
    #[error("species flux became non-finite at t = {t:.6e} s")]
    NonFiniteState { t: f64 },
    #[error("stiff integration failed: {0}")]
    IntegrationFailure(String),
    #[error("mixing-time estimation failed: {0}")]
    EstimatorFailure(String),
}

/// Numerical settings of the stiff integrator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverSettings {
    /// Relative tolerance driving the implicit-stage iteration
    pub rtol: f64,
    /// Absolute floor for trajectory noise screening
    pub atol: f64,
    /// Number of mesh steps over [0, tend]
    pub n_steps: usize,
    /// Cap on Broyden iterations per implicit stage
    pub max_stage_iter: usize,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            rtol: 1e-15,
            atol: 1e-22,
            n_steps: 2000,
            max_stage_iter: 200,
        }
    }
}

impl SolverSettings {
    pub fn validate(&self) -> Result<(), MicromixError> {
        if !self.rtol.is_finite() || self.rtol <= 0.0 {
            return Err(MicromixError::InvalidInput(format!(
                "rtol must be finite and positive, got {}",
                self.rtol
            )));
        }
        if !self.atol.is_finite() || self.atol <= 0.0 {
            return Err(MicromixError::InvalidInput(format!(
                "atol must be finite and positive, got {}",
                self.atol
            )));
        }
        if self.n_steps < 2 {
            return Err(MicromixError::InvalidInput(format!(
                "n_steps must be at least 2, got {}",
                self.n_steps
            )));
        }
        if self.max_stage_iter == 0 {
            return Err(MicromixError::InvalidInput(
                "max_stage_iter must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Inlet flux reference n0 (mol/s), computed once per simulation.
///
/// H+ rides the acid stream; every other species rides the buffer stream
/// (products simply carry zero inlet concentration).
pub fn inlet_fluxes(c0: &[f64; N_SPECIES], flow: &FlowRates) -> [f64; N_SPECIES] {
    let mut n0 = [0.0; N_SPECIES];
    for species in 0..N_SPECIES {
        let stream_flow = if species == Species::Hplus as usize {
            flow.acid
        } else {
            flow.buffer
        };
        n0[species] = c0[species] * stream_flow;
    }
    n0
}

/// One integrated trajectory of the flux ODE together with the inlet
/// reference it was produced from. Owned by a single simulation run; all
/// derived series are computed pointwise from these samples.
#[derive(Debug, Clone)]
pub struct Trajectory {
    /// Time mesh, s
    pub t: DVector<f64>,
    /// Flux samples, row = time sample, column = species (mol/s)
    pub n: DMatrix<f64>,
    /// Inlet flux reference, mol/s
    pub n0: DVector<f64>,
    pub flow: FlowRates,
    pub model: IncorporationModel,
    pub tm: f64,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.len() == 0
    }

    /// Stoichiometric maximum yield Yst = 6*n0_IO3 / (6*n0_IO3 + n0_TRIS).
    pub fn stoichiometric_yield(&self) -> f64 {
        let n0_io3 = self.n0[Species::Iodate as usize];
        let n0_tris = self.n0[Species::Tris as usize];
        6.0 * n0_io3 / (6.0 * n0_io3 + n0_tris)
    }

    /// Actual iodine yield Y(k) = 2*(nI2 + nI3)/n0_H at sample k.
    fn yield_at(&self, k: usize) -> f64 {
        let n_i2 = self.n[(k, Species::Iodine as usize)];
        let n_i3 = self.n[(k, Species::Triiodide as usize)];
        2.0 * (n_i2 + n_i3) / self.n0[Species::Hplus as usize]
    }

    /// Segregation index series Xs(t) = Y(t)/Yst.
    pub fn segregation_index_series(&self) -> DVector<f64> {
        let yst = self.stoichiometric_yield();
        DVector::from_fn(self.len(), |k, _| self.yield_at(k) / yst)
    }

    /// Incorporation volume series v(t), L/s.
    pub fn incorporation_volume_series(&self) -> DVector<f64> {
        DVector::from_fn(self.len(), |k, _| {
            self.model.volume(self.t[k], self.tm, &self.flow).0
        })
    }

    /// Final-time flux state (row copy).
    pub fn final_state(&self) -> DVector<f64> {
        self.n.row(self.len() - 1).transpose()
    }

    /// Triiodide concentration at the horizon, mol/L:
    /// nI3(tend)/(V1 + V2).
    pub fn final_triiodide_concentration(&self) -> f64 {
        self.n[(self.len() - 1, Species::Triiodide as usize)] / self.flow.total()
    }

    /// Segregation index at the horizon.
    pub fn final_segregation_index(&self) -> f64 {
        self.yield_at(self.len() - 1) / self.stoichiometric_yield()
    }

    /// Screen the trajectory for numerical trouble.
    ///
    /// Non-finite samples are fatal. Slightly negative species fluxes are a
    /// known accuracy boundary of loose tolerances; they are reported, not
    /// clamped.
    pub fn validate(&self, atol: f64) -> Result<(), MicromixError> {
        let mut max_abs: f64 = 0.0;
        for k in 0..self.len() {
            for i in 0..N_SPECIES {
                let value = self.n[(k, i)];
                if !value.is_finite() {
                    return Err(MicromixError::NonFiniteState { t: self.t[k] });
                }
                max_abs = max_abs.max(value.abs());
            }
        }
        let floor = atol.max(1e-14 * max_abs);
        let mut undershoot_samples = 0usize;
        for k in 0..self.len() {
            for i in 0..N_SPECIES {
                if self.n[(k, i)] < -floor {
                    undershoot_samples += 1;
                }
            }
        }
        if undershoot_samples > 0 {
            warn!(
                "trajectory holds {} species samples below -{:.3e} mol/s; tighten tolerances if the observables look off",
                undershoot_samples, floor
            );
        }
        Ok(())
    }
}

/// Right-hand side of the flux ODE at time t and state `n`.
///
/// Fixed stoichiometric assembly: H+ is consumed by the buffer reaction and
/// six times the Dushman reaction; the four buffer-stream solutes carry the
/// inlet-replenishment term `n0_i * s * dg/dt`; products only accumulate.
pub fn flux_derivatives(
    t: f64,
    n: &[f64],
    n0: &[f64; N_SPECIES],
    flow: &FlowRates,
    model: IncorporationModel,
    constants: &RateConstants,
    tm: f64,
) -> Result<[f64; N_SPECIES], MicromixError> {
    let (v, dgdt) = model.volume(t, tm, flow);
    let rates = iodide_iodate::reaction_rates(n, n0, v, constants)?;
    let r1 = rates.buffer;
    let r2 = rates.dushman;
    let r3 = rates.triiodide;
    let s = model.inlet_scale(flow) * dgdt;

    let mut dn = [0.0; N_SPECIES];
    dn[Species::Hplus as usize] = -r1 - 6.0 * r2;
    dn[Species::Tris as usize] = -r1 + n0[Species::Tris as usize] * s;
    dn[Species::TrisHplus as usize] = r1 + n0[Species::TrisHplus as usize] * s;
    dn[Species::Iodide as usize] = -5.0 * r2 - r3 + n0[Species::Iodide as usize] * s;
    dn[Species::Iodate as usize] = -r2 + n0[Species::Iodate as usize] * s;
    dn[Species::Iodine as usize] = 3.0 * r2 - r3;
    dn[Species::Water as usize] = 3.0 * r2;
    dn[Species::Triiodide as usize] = r3;
    Ok(dn)
}

/// Adapter binding one simulation's inlet reference and rate constants to
/// the integrator interface.
struct IncorporationOde<'a> {
    n0: &'a [f64; N_SPECIES],
    flow: &'a FlowRates,
    model: IncorporationModel,
    constants: &'a RateConstants,
    tm: f64,
}

impl ODEProblem for IncorporationOde<'_> {
    fn initial_conditions(&self) -> Vec<f64> {
        let mut y0 = vec![0.0; N_SPECIES];
        y0[Species::Hplus as usize] = self.n0[Species::Hplus as usize];
        y0
    }

    fn rhs(&self, t: f64, y: &[f64], dy: &mut [f64]) -> Result<(), argmin_math::Error> {
        let dn = flux_derivatives(t, y, self.n0, self.flow, self.model, self.constants, self.tm)?;
        dy.copy_from_slice(&dn);
        Ok(())
    }
}

/// Forward simulation task: one candidate mixing time, one integration.
///
/// Workflow: `new()` (or `from_labels()`) -> setters -> `solve()`;
/// `check_task()` is called by `solve()` and may also be used standalone.
#[derive(Debug, Clone)]
pub struct MicromixingTask {
    /// Optional problem identifier
    pub problem_name: Option<String>,
    /// Micro-mixing time candidate, s
    pub tm: f64,
    /// Initial concentrations in species order, mol/L
    pub c0: [f64; N_SPECIES],
    /// Inlet flow rates, L/s
    pub flow: FlowRates,
    /// Resolved incorporation model
    pub model: IncorporationModel,
    /// Advisory record when the model came from a fallback resolution
    pub fallback: Option<ConfigFallback>,
    /// Rate constants of the fixed equilibria
    pub constants: RateConstants,
    /// Integrator settings
    pub settings: SolverSettings,
    /// Solution trajectory (filled by solve())
    pub solution: Option<Trajectory>,
}

impl MicromixingTask {
    pub fn new(
        tm: f64,
        c0: [f64; N_SPECIES],
        flow: FlowRates,
        model: IncorporationModel,
    ) -> Self {
        Self {
            problem_name: None,
            tm,
            c0,
            flow,
            model,
            fallback: None,
            constants: RateConstants::default(),
            settings: SolverSettings::default(),
            solution: None,
        }
    }

    /// Build a task from user-facing configuration labels, applying the
    /// documented fallback on unrecognized values.
    pub fn from_labels(
        tm: f64,
        c0: [f64; N_SPECIES],
        flow: FlowRates,
        convention_label: &str,
        shape_label: &str,
    ) -> Self {
        let (model, fallback) = IncorporationModel::resolve(convention_label, shape_label);
        let mut task = Self::new(tm, c0, flow, model);
        task.fallback = fallback;
        task
    }

    pub fn set_problem_name(&mut self, name: &str) {
        self.problem_name = Some(name.to_string());
    }

    pub fn set_solver_settings(&mut self, settings: SolverSettings) {
        self.settings = settings;
    }

    pub fn set_rate_constants(&mut self, constants: RateConstants) {
        self.constants = constants;
    }

    /// Validate the task configuration.
    pub fn check_task(&self) -> Result<(), MicromixError> {
        if !self.tm.is_finite() || self.tm <= 0.0 {
            return Err(MicromixError::InvalidInput(format!(
                "tm must be finite and positive, got {}",
                self.tm
            )));
        }
        for (i, &c) in self.c0.iter().enumerate() {
            if !c.is_finite() || c < 0.0 {
                return Err(MicromixError::InvalidInput(format!(
                    "initial concentration of species {} must be finite and non-negative, got {}",
                    i, c
                )));
            }
        }
        if self.c0[Species::Hplus as usize] <= 0.0 {
            return Err(MicromixError::InvalidInput(
                "acid stream must carry a positive H+ concentration".to_string(),
            ));
        }
        self.flow.validate()?;
        self.constants.validate()?;
        self.settings.validate()?;
        Ok(())
    }

    /// Inlet flux reference for the current configuration.
    pub fn inlet_fluxes(&self) -> [f64; N_SPECIES] {
        inlet_fluxes(&self.c0, &self.flow)
    }

    /// Integrate the flux ODE over [0, tend] and store the trajectory.
    pub fn solve(&mut self) -> Result<&Trajectory, MicromixError> {
        self.check_task()?;
        let n0 = self.inlet_fluxes();
        let tend = self.model.horizon(self.tm, &self.flow);
        let dt = tend / self.settings.n_steps as f64;
        info!(
            "integrating micromixing model ({}/{}) with tm = {:.4e} s over [0, {:.4e}] s",
            self.model.convention.label(),
            self.model.shape.label(),
            self.tm,
            tend
        );

        let ode = IncorporationOde {
            n0: &n0,
            flow: &self.flow,
            model: self.model,
            constants: &self.constants,
            tm: self.tm,
        };
        let stepper = GL4::new(
            ImplicitSolver::FixedPoint,
            self.settings.rtol,
            self.settings.max_stage_iter,
        );
        let solver = BasicODESolver::new(stepper);
        let (t_out, y_out) = solver
            .solve(&ode, (0.0, tend), dt)
            .map_err(|e| MicromixError::IntegrationFailure(e.to_string()))?;

        let samples = t_out.len();
        let trajectory = Trajectory {
            t: DVector::from_vec(t_out),
            n: DMatrix::from_fn(samples, N_SPECIES, |k, i| y_out[k][i]),
            n0: DVector::from_column_slice(&n0),
            flow: self.flow,
            model: self.model,
            tm: self.tm,
        };
        trajectory.validate(self.settings.atol)?;
        info!(
            "integration finished: {} samples, Xs(tend) = {:.6e}, [I3-](tend) = {:.6e} mol/L",
            trajectory.len(),
            trajectory.final_segregation_index(),
            trajectory.final_triiodide_concentration()
        );
        Ok(self.solution.insert(trajectory))
    }

    /// Get reference to the solution trajectory.
    ///
    /// Returns None if solve hasn't been called yet.
    pub fn get_solution(&self) -> Option<&Trajectory> {
        self.solution.as_ref()
    }

    /// Print the task summary.
    pub fn pretty_print_task(&self) {
        use prettytable::{Table, row};

        println!("\n=== MICROMIXING TASK SUMMARY ===");
        println!("Problem Name: {:?}", self.problem_name);

        let mut table = Table::new();
        table.add_row(row!["Parameter", "Value", "Units"]);
        table.add_row(row!["Mixing time (tm)", format!("{:.6}", self.tm), "s"]);
        table.add_row(row![
            "Buffer flow (V1)",
            format!("{:.6e}", self.flow.buffer),
            "L/s"
        ]);
        table.add_row(row![
            "Acid flow (V2)",
            format!("{:.6e}", self.flow.acid),
            "L/s"
        ]);
        table.add_row(row!["Convention", self.model.convention.label(), "-"]);
        table.add_row(row!["Shape", self.model.shape.label(), "-"]);
        table.add_row(row![
            "Horizon",
            format!("{:.6e}", self.model.horizon(self.tm, &self.flow)),
            "s"
        ]);
        table.printstd();

        let mut composition = Table::new();
        composition.add_row(row!["Species", "c0, mol/L", "n0, mol/s"]);
        let n0 = self.inlet_fluxes();
        for species in Species::iter() {
            let i = species as usize;
            composition.add_row(row![
                species.symbol(),
                format!("{:.6e}", self.c0[i]),
                format!("{:.6e}", n0[i])
            ]);
        }
        composition.printstd();
    }
}
