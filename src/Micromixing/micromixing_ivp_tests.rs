#[cfg(test)]
mod tests {
    use crate::Kinetics::iodide_iodate::{self, N_SPECIES, RateConstants, Species};
    use crate::Micromixing::MicromixingIVP::{
        MicromixError, MicromixingTask, SolverSettings, flux_derivatives, inlet_fluxes,
    };
    use crate::Micromixing::estimation::{
        EstimationProblem, TargetObservable, estimate_mixing_time,
    };
    use crate::Micromixing::incorporation::{
        FALLBACK_MODEL, FlowRates, IncorporationModel, IncorporationShape, MixingConvention,
    };
    use approx::assert_relative_eq;
    use strum::IntoEnumIterator;

    /// V1 = V2 = 2 mL/min, TRIS-buffered iodide/iodate composition.
    fn reference_concentrations() -> [f64; N_SPECIES] {
        [0.03, 0.0898, 0.0898, 0.03197, 6.34e-3, 0.0, 0.0, 0.0]
    }

    fn reference_flow() -> FlowRates {
        FlowRates::from_ml_per_min(2.0, 2.0).unwrap()
    }

    fn reference_model() -> IncorporationModel {
        IncorporationModel::new(MixingConvention::Modified, IncorporationShape::Exponential)
    }

    /// Coarser mesh and slightly relaxed stage tolerance to keep the test
    /// suite fast; the observables are insensitive at this resolution.
    fn test_settings() -> SolverSettings {
        SolverSettings {
            rtol: 1e-12,
            atol: 1e-20,
            n_steps: 400,
            max_stage_iter: 200,
        }
    }

    fn reference_task(tm: f64) -> MicromixingTask {
        let mut task = MicromixingTask::new(
            tm,
            reference_concentrations(),
            reference_flow(),
            reference_model(),
        );
        task.set_solver_settings(test_settings());
        task
    }

    #[test]
    fn test_flux_derivatives_respect_stoichiometry() {
        let c0 = reference_concentrations();
        let flow = reference_flow();
        let constants = RateConstants::default();
        let tm = 0.2;
        let n0 = inlet_fluxes(&c0, &flow);

        // a mid-trajectory-like state with every species populated
        let n = [2.0e-7, 1.0e-7, 2.5e-6, 8.0e-7, 1.5e-7, 3.0e-8, 9.0e-8, 1.0e-8];
        for convention in MixingConvention::iter() {
            for shape in IncorporationShape::iter() {
                let model = IncorporationModel::new(convention, shape);
                let t = 0.3 * model.horizon(tm, &flow);
                let dn =
                    flux_derivatives(t, &n, &n0, &flow, model, &constants, tm).unwrap();

                let (v, dgdt) = model.volume(t, tm, &flow);
                let rates = iodide_iodate::reaction_rates(&n, &n0, v, &constants).unwrap();
                let s = model.inlet_scale(&flow) * dgdt;

                // H+ consumption is exactly buffer + 6x Dushman
                assert_relative_eq!(
                    dn[Species::Hplus as usize],
                    -(rates.buffer + 6.0 * rates.dushman),
                    max_relative = 1e-14
                );

                // TRIS + TRISH+ changes only through replenishment
                let tris_total = dn[Species::Tris as usize] + dn[Species::TrisHplus as usize];
                let tris_inflow = (n0[Species::Tris as usize]
                    + n0[Species::TrisHplus as usize])
                    * s;
                assert_relative_eq!(tris_total, tris_inflow, max_relative = 1e-12);

                // iodine atoms: I- + IO3- + 2*I2 + 3*I3- changes only
                // through replenishment
                let iodine_atoms = dn[Species::Iodide as usize]
                    + dn[Species::Iodate as usize]
                    + 2.0 * dn[Species::Iodine as usize]
                    + 3.0 * dn[Species::Triiodide as usize];
                let iodine_inflow = (n0[Species::Iodide as usize]
                    + n0[Species::Iodate as usize])
                    * s;
                assert_relative_eq!(iodine_atoms, iodine_inflow, max_relative = 1e-10);

                // water is produced by the Dushman reaction only
                assert_relative_eq!(
                    dn[Species::Water as usize],
                    3.0 * rates.dushman,
                    max_relative = 1e-14
                );
            }
        }
    }

    #[test]
    fn test_inlet_fluxes_by_stream() {
        let c0 = reference_concentrations();
        let flow = FlowRates::from_ml_per_min(4.0, 2.0).unwrap();
        let n0 = inlet_fluxes(&c0, &flow);
        // H+ rides the acid stream, everything else the buffer stream
        assert_relative_eq!(
            n0[Species::Hplus as usize],
            c0[Species::Hplus as usize] * flow.acid,
            max_relative = 1e-14
        );
        assert_relative_eq!(
            n0[Species::Tris as usize],
            c0[Species::Tris as usize] * flow.buffer,
            max_relative = 1e-14
        );
        assert_eq!(n0[Species::Iodine as usize], 0.0);
        assert_eq!(n0[Species::Triiodide as usize], 0.0);
    }

    #[test]
    fn test_forward_simulation_is_deterministic() {
        let mut first = reference_task(0.2);
        let mut second = reference_task(0.2);
        first.solve().unwrap();
        second.solve().unwrap();
        let a = first.get_solution().unwrap();
        let b = second.get_solution().unwrap();
        assert_eq!(a.len(), b.len());
        assert_eq!(
            a.final_triiodide_concentration().to_bits(),
            b.final_triiodide_concentration().to_bits()
        );
        assert_eq!(
            a.final_segregation_index().to_bits(),
            b.final_segregation_index().to_bits()
        );
    }

    #[test]
    fn test_trajectory_shape_and_initial_condition() {
        let mut task = reference_task(0.2);
        let trajectory = task.solve().unwrap();
        assert!(trajectory.len() >= test_settings().n_steps);
        assert_eq!(trajectory.n.ncols(), N_SPECIES);
        // only H+ is present at t = 0
        let n0 = &trajectory.n0;
        assert_relative_eq!(
            trajectory.n[(0, Species::Hplus as usize)],
            n0[Species::Hplus as usize],
            max_relative = 1e-12
        );
        for species in Species::iter() {
            if species != Species::Hplus {
                assert_eq!(trajectory.n[(0, species as usize)], 0.0);
            }
        }
        // derived series have one entry per sample
        assert_eq!(trajectory.segregation_index_series().len(), trajectory.len());
        assert_eq!(
            trajectory.incorporation_volume_series().len(),
            trajectory.len()
        );
        let final_state = trajectory.final_state();
        assert_eq!(final_state.len(), N_SPECIES);
        // acid is consumed, never created
        assert!(
            final_state[Species::Hplus as usize]
                < trajectory.n0[Species::Hplus as usize]
        );
    }

    #[test]
    fn test_incorporation_volume_series_spans_the_streams() {
        let mut task = reference_task(0.2);
        let trajectory = task.solve().unwrap();
        let volumes = trajectory.incorporation_volume_series();
        let flow = reference_flow();
        assert_relative_eq!(volumes[0], flow.acid, max_relative = 1e-12);
        // modified/exponential ends within e^-5 of full incorporation
        assert_relative_eq!(
            volumes[volumes.len() - 1],
            flow.total(),
            max_relative = 1e-2
        );
        for pair in volumes.as_slice().windows(2) {
            assert!(pair[1] >= pair[0]);
        }
    }

    #[test]
    fn test_segregation_index_grows_with_mixing_time() {
        // slower micromixing leaves more acid unbuffered, so more iodine
        // forms and Xs climbs toward the fully-segregated limit
        let mut previous = -1.0;
        for &tm in &[0.05, 0.1, 0.2, 0.4] {
            let mut task = reference_task(tm);
            let trajectory = task.solve().unwrap();
            let xs = trajectory.final_segregation_index();
            assert!(xs.is_finite() && xs > 0.0, "Xs = {} at tm = {}", xs, tm);
            assert!(
                xs > previous,
                "Xs not increasing: {} -> {} at tm = {}",
                previous,
                xs,
                tm
            );
            previous = xs;
        }
    }

    #[test]
    fn test_task_validation_rejects_bad_inputs() {
        let mut task = reference_task(0.0);
        assert!(matches!(
            task.solve(),
            Err(MicromixError::InvalidInput(_))
        ));

        let mut negative_c0 = reference_concentrations();
        negative_c0[Species::Iodide as usize] = -1.0e-3;
        let mut task = MicromixingTask::new(
            0.2,
            negative_c0,
            reference_flow(),
            reference_model(),
        );
        assert!(task.solve().is_err());

        let mut no_acid = reference_concentrations();
        no_acid[Species::Hplus as usize] = 0.0;
        let mut task =
            MicromixingTask::new(0.2, no_acid, reference_flow(), reference_model());
        assert!(task.solve().is_err());
    }

    #[test]
    fn test_task_from_labels_applies_fallback_quirk() {
        // a valid convention with an unrecognized shape still degrades both
        // axes to modified/linear
        let task = MicromixingTask::from_labels(
            0.2,
            reference_concentrations(),
            reference_flow(),
            "original",
            "sigmoid",
        );
        assert_eq!(task.model, FALLBACK_MODEL);
        let record = task.fallback.expect("fallback record expected");
        assert_eq!(record.requested_convention, "original");
        assert_eq!(record.requested_shape, "sigmoid");

        let clean = MicromixingTask::from_labels(
            0.2,
            reference_concentrations(),
            reference_flow(),
            "original",
            "exponential",
        );
        assert!(clean.fallback.is_none());
    }

    #[test]
    fn test_objective_is_non_negative_and_zero_at_coincidence() {
        let mut problem = EstimationProblem::new(
            reference_concentrations(),
            reference_flow(),
            reference_model(),
            TargetObservable::SegregationIndex,
            0.0,
        );
        problem.settings = test_settings();

        let simulated = problem.simulate_observable(0.2).unwrap();
        problem.reference = simulated;
        // same pipeline, same tm: the residual must be exactly zero
        assert_eq!(problem.residual(0.2), 0.0);

        problem.reference = simulated + 0.01;
        let shifted = problem.residual(0.2);
        assert!(shifted > 0.0);
        assert_relative_eq!(shifted, 1.0e-4, max_relative = 1e-6);

        // failed evaluations are priced at +infinity, not propagated
        assert_eq!(problem.residual(-1.0), f64::INFINITY);
        assert_eq!(problem.residual(f64::NAN), f64::INFINITY);
    }

    #[test]
    fn test_triiodide_objective_matches_trajectory_observable() {
        let mut problem = EstimationProblem::new(
            reference_concentrations(),
            reference_flow(),
            reference_model(),
            TargetObservable::TriiodideConcentration,
            0.0,
        );
        problem.settings = test_settings();
        let observable = problem.simulate_observable(0.2).unwrap();

        let mut task = reference_task(0.2);
        let trajectory = task.solve().unwrap();
        assert_eq!(
            observable.to_bits(),
            trajectory.final_triiodide_concentration().to_bits()
        );
        assert!(observable > 0.0);
    }

    #[test]
    fn test_estimator_recovers_known_mixing_time() {
        let true_tm = 0.2;
        let mut problem = EstimationProblem::new(
            reference_concentrations(),
            reference_flow(),
            reference_model(),
            TargetObservable::SegregationIndex,
            0.0,
        );
        problem.settings = SolverSettings {
            rtol: 1e-12,
            atol: 1e-20,
            n_steps: 300,
            max_stage_iter: 200,
        };
        // synthetic measurement from the forward model itself
        problem.reference = problem.simulate_observable(true_tm).unwrap();

        let estimate = estimate_mixing_time(&problem, 0.14, 1e-12, 200).unwrap();
        assert!(estimate.converged, "estimator did not converge: {:?}", estimate);
        assert!(
            (estimate.tm - true_tm).abs() < 5.0e-3,
            "recovered tm = {} instead of {}",
            estimate.tm,
            true_tm
        );
        assert!(estimate.objective >= 0.0);
    }

    #[test]
    fn test_estimator_rejects_invalid_guess() {
        let problem = EstimationProblem::new(
            reference_concentrations(),
            reference_flow(),
            reference_model(),
            TargetObservable::SegregationIndex,
            0.1,
        );
        assert!(matches!(
            estimate_mixing_time(&problem, -0.1, 1e-10, 10),
            Err(MicromixError::InvalidInput(_))
        ));
        assert!(matches!(
            estimate_mixing_time(&problem, 0.1, 0.0, 10),
            Err(MicromixError::InvalidInput(_))
        ));
    }
}
