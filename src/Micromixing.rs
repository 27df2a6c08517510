//! # Incorporation Micromixing Module
//!
//! This module estimates the micro-mixing time of a continuous two-stream
//! reactor from iodide-iodate test-reaction measurements. The slower stream
//! (acid) is progressively incorporated into the faster stream (buffered
//! iodide/iodate solution); the growth law of the incorporation volume is
//! parameterized by the micro-mixing time `tm`, and `tm` is recovered by
//! fitting the simulated observable against its measured value.
//!
//! ## Nomenclature
//!
//! | Symbol | Description | Units |
//! |--------|-------------|-------|
//! | `tm`   | micro-mixing time (fitted parameter) | s |
//! | `V1`   | buffer stream volumetric flow rate | L/s |
//! | `V2`   | acid stream volumetric flow rate | L/s |
//! | `g(t)` | incorporation growth function | - |
//! | `v(t)` | incorporation volume flow | L/s |
//! | `n_i`  | molar flux of species i | mol/s |
//! | `n0_i` | inlet molar flux of species i | mol/s |
//! | `Z`    | ionic strength | mol/L |
//! | `Yst`  | stoichiometric maximum iodine yield | - |
//! | `Xs`   | segregation index, Y/Yst | - |
//!
//! ## Governing Equations
//!
//! With `r1`, `r2`, `r3` the buffer, Dushman and triiodide rates and `s`
//! the convention-dependent inlet scale:
//!
//! ```text
//! dnH+/dt    = -r1 - 6*r2
//! dnTRIS/dt  = -r1 + n0_TRIS  * s * dg/dt
//! dnTRISH/dt =  r1 + n0_TRISH * s * dg/dt
//! dnI-/dt    = -5*r2 - r3 + n0_I   * s * dg/dt
//! dnIO3/dt   =   -r2      + n0_IO3 * s * dg/dt
//! dnI2/dt    =  3*r2 - r3
//! dnH2O/dt   =  3*r2
//! dnI3/dt    =         r3
//! ```
//!
//! The buffer equilibrium is orders of magnitude faster than the Dushman
//! reaction, so the system is stiff and is integrated with an implicit
//! A-stable scheme.

pub mod incorporation;
#[allow(non_snake_case)]
pub mod MicromixingIVP;
pub mod estimation;
mod micromixing_ivp_tests;
