//! # Iodide-Iodate Reaction Kinetics
//!
//! Rate laws of the parallel competing reaction system used to probe
//! micromixing in continuous reactors:
//!
//! ```text
//! (1)  H+ + TRIS    <=> TRISH+                 (buffer neutralization)
//! (2)  6H+ + 5I- + IO3- -> 3I2 + 3H2O          (Dushman reaction)
//! (3)  I- + I2      <=> I3-                    (triiodide equilibrium)
//! ```
//!
//! The buffer neutralization is quasi-instantaneous while the Dushman
//! reaction is slow; under perfect mixing virtually all acid is captured by
//! the buffer and almost no iodine forms. Imperfect mixing leaves acid-rich
//! zones where reaction (2) proceeds, so the amount of I2/I3- formed is a
//! direct measure of segregation.
//!
//! ## State Convention
//!
//! All rate functions work on molar fluxes `n_i` (mol/s) rather than
//! concentrations; the instantaneous concentration of species i is
//! `n_i / v` where `v` is the incorporation volume flow (L/s). The rates
//! returned here are therefore flux production rates (mol/s per second).
//!
//! ## Rate Constants
//!
//! - Reaction (1): fixed forward/backward literals `k1f`, `k1b` with
//!   `k1b/k1f = Ka(TRISH+)`.
//! - Reaction (2): `k2` is not constant; it follows the empirical
//!   activity-coefficient correlation
//!   `log10 k2 = 8.383 - 1.5112*sqrt(Z)/(1 + sqrt(Z)) + 0.23689*Z`
//!   where `Z` is the ionic strength of the reacting volume.
//! - Reaction (3): fixed forward/backward literals `k3f`, `k3b` with
//!   `k3f/k3b` equal to the triiodide equilibrium constant.
//!
//! PAY ATTENTION TO THE DIMENSION OF INPUT PARAMETERS
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::EnumIter;
use thiserror::Error;

/// Number of species carried by the flux state vector.
pub const N_SPECIES: usize = 8;

/// Species of the iodide-iodate system, in the fixed order of the flux
/// state vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, Serialize, Deserialize)]
pub enum Species {
    Hplus = 0,
    Tris = 1,
    TrisHplus = 2,
    Iodide = 3,
    Iodate = 4,
    Iodine = 5,
    Water = 6,
    Triiodide = 7,
}

impl Species {
    /// Display symbol used in tables and diagnostics.
    pub fn symbol(&self) -> &'static str {
        match self {
            Species::Hplus => "H+",
            Species::Tris => "TRIS",
            Species::TrisHplus => "TRISH+",
            Species::Iodide => "I-",
            Species::Iodate => "IO3-",
            Species::Iodine => "I2",
            Species::Water => "H2O",
            Species::Triiodide => "I3-",
        }
    }

    /// Elementary charge number of the species.
    pub const fn charge(self) -> f64 {
        match self {
            Species::Hplus | Species::TrisHplus => 1.0,
            Species::Iodide | Species::Iodate | Species::Triiodide => -1.0,
            Species::Tris | Species::Iodine | Species::Water => 0.0,
        }
    }
}

/// Errors of the kinetic rate evaluation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KineticsError {
    #[error("ionic strength computed negative ({0:.6e} mol/L): species state corrupted upstream")]
    NegativeIonicStrength(f64),
    #[error("invalid rate constants: {0}")]
    InvalidRateConstants(String),
}

/// Fixed rate constants of the buffer and triiodide equilibria.
///
/// Defaults are calibrated to the TRIS / iodide-iodate chemistry:
/// the buffer pair keeps `k1b/k1f = Ka(TRISH+) = 10^-8.08` and the
/// triiodide pair keeps `k3f/k3b = 694 L/mol`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateConstants {
    /// Buffer forward constant k1f, L/(mol*s)
    pub k_buffer_fwd: f64,
    /// Buffer backward constant k1b, 1/s
    pub k_buffer_rev: f64,
    /// Triiodide forward constant k3f, L/(mol*s)
    pub k_triiodide_fwd: f64,
    /// Triiodide backward constant k3b, 1/s
    pub k_triiodide_rev: f64,
}

impl Default for RateConstants {
    fn default() -> Self {
        Self {
            k_buffer_fwd: 1.0e8,
            k_buffer_rev: 0.8318,
            k_triiodide_fwd: 5.9e3,
            k_triiodide_rev: 8.5,
        }
    }
}

impl RateConstants {
    /// Validate that every constant is finite and positive.
    pub fn validate(&self) -> Result<(), KineticsError> {
        let entries = [
            ("k_buffer_fwd", self.k_buffer_fwd),
            ("k_buffer_rev", self.k_buffer_rev),
            ("k_triiodide_fwd", self.k_triiodide_fwd),
            ("k_triiodide_rev", self.k_triiodide_rev),
        ];
        for (name, value) in entries {
            if !value.is_finite() || value <= 0.0 {
                return Err(KineticsError::InvalidRateConstants(format!(
                    "{} must be finite and positive, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Instantaneous rates of the three elementary reactions plus the
/// ionic-strength-corrected Dushman constant used for rate 2.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReactionRates {
    /// r1 = k1f*nH*nTRIS/v - k1b*nTRISH
    pub buffer: f64,
    /// r2 = k2*nH^2*nI^2*nIO3/v^4
    pub dushman: f64,
    /// r3 = k3f*nI*nI2/v - k3b*nI3
    pub triiodide: f64,
    /// k2 evaluated at the current ionic strength, L^4/(mol^4*s)
    pub k_dushman: f64,
}

/// Ionic strength of the reacting volume, mol/L.
///
/// Computed from the current and inlet fluxes of all charged species
/// divided by the incorporation volume:
/// `Z = 0.5 * sum_i z_i^2 * (n_i + n0_i) / v`.
/// A negative result has no physical meaning and signals a corrupted
/// species state upstream.
pub fn ionic_strength(n: &[f64], n0: &[f64], v: f64) -> Result<f64, KineticsError> {
    let mut sum = 0.0;
    for species in Species::iter() {
        let z = species.charge();
        if z != 0.0 {
            let i = species as usize;
            sum += z * z * (n[i] + n0[i]);
        }
    }
    let strength = 0.5 * sum / v;
    if strength < 0.0 {
        return Err(KineticsError::NegativeIonicStrength(strength));
    }
    Ok(strength)
}

/// Dushman rate constant corrected for ionic strength, L^4/(mol^4*s).
///
/// Empirical activity-coefficient correlation:
/// `log10 k2 = 8.383 - 1.5112*sqrt(Z)/(1 + sqrt(Z)) + 0.23689*Z`.
pub fn dushman_rate_constant(ionic_strength: f64) -> f64 {
    let sqrt_z = ionic_strength.sqrt();
    let log_k = 8.383 - 1.5112 * sqrt_z / (1.0 + sqrt_z) + 0.23689 * ionic_strength;
    10f64.powf(log_k)
}

/// Evaluate the three elementary reaction rates at the given flux state.
///
/// `n` is the current 8-component flux vector (mol/s), `n0` the inlet flux
/// reference (mol/s) and `v` the current incorporation volume flow (L/s).
/// Pure function of its inputs; fails only when the ionic strength comes
/// out negative.
pub fn reaction_rates(
    n: &[f64],
    n0: &[f64],
    v: f64,
    constants: &RateConstants,
) -> Result<ReactionRates, KineticsError> {
    let z = ionic_strength(n, n0, v)?;
    let k_dushman = dushman_rate_constant(z);

    let n_h = n[Species::Hplus as usize];
    let n_tris = n[Species::Tris as usize];
    let n_trish = n[Species::TrisHplus as usize];
    let n_i = n[Species::Iodide as usize];
    let n_io3 = n[Species::Iodate as usize];
    let n_i2 = n[Species::Iodine as usize];
    let n_i3 = n[Species::Triiodide as usize];

    let buffer = constants.k_buffer_fwd * n_h * n_tris / v - constants.k_buffer_rev * n_trish;
    let dushman = k_dushman * n_h.powi(2) * n_i.powi(2) * n_io3 / v.powi(4);
    let triiodide = constants.k_triiodide_fwd * n_i * n_i2 / v - constants.k_triiodide_rev * n_i3;

    Ok(ReactionRates {
        buffer,
        dushman,
        triiodide,
        k_dushman,
    })
}
