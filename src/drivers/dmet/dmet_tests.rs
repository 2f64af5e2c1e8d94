use approx::assert_abs_diff_eq;
use ndarray::{Array1, Array2, Array4};

use crate::bath::BathKind;
use crate::drivers::dmet::{
    fit_correlation_potential, DmetDriver, DmetParams, PotentialFitProblem, ScAlgorithm,
};
use crate::drivers::embedding::EmbeddingOrchestrator;
use crate::drivers::MdmetDriver;
use crate::hamiltonian::{OehKind, OrthoHamiltonian};
use crate::potential::{FitMode, PotentialCodec, ResponseOperatorSet};
use crate::solvers::SolverKind;
use crate::symmetry::{SymmetryMap, SymmetrySpec};

fn ring_hamiltonian(n: usize, n_electrons: usize, u: f64) -> OrthoHamiltonian {
    let mut oei = Array2::<f64>::zeros((n, n));
    for p in 0..n {
        oei[(p, (p + 1) % n)] = -1.0;
        oei[((p + 1) % n, p)] = -1.0;
    }
    let mut tei = Array4::<f64>::zeros((n, n, n, n));
    for p in 0..n {
        tei[(p, p, p, p)] = u;
    }
    let fock = oei.clone();
    OrthoHamiltonian::new(oei, tei, fock, n_electrons, 0.0).unwrap()
}

fn ring_fragments(n_fragments: usize, size: usize) -> Vec<Vec<usize>> {
    let n_orbitals = n_fragments * size;
    (0..n_fragments)
        .map(|f| {
            (0..n_orbitals)
                .map(|p| usize::from(f * size <= p && p < (f + 1) * size))
                .collect()
        })
        .collect()
}

#[test]
fn test_dmet_params_defaults() {
    let params = DmetParams::default();
    assert_eq!(params.fit_mode, FitMode::EmbeddingBasis);
    assert_eq!(params.bath_kind, BathKind::OccupationNumber);
    assert_eq!(params.oeh_kind, OehKind::Fock);
    assert_eq!(params.solver, SolverKind::Rhf);
    assert!(params.solvers.is_none());
    assert_eq!(params.algorithm, ScAlgorithm::Bfgs);
    assert_abs_diff_eq!(params.self_consistency_threshold, 1e-5);
    assert_eq!(params.max_cycles, 200);
    assert_abs_diff_eq!(params.damping, 0.0);
    assert_abs_diff_eq!(params.chemical_potential_threshold, 1e-10);
    assert_eq!(params.chemical_potential_max_iterations, 50);
    assert!(!params.one_shot);
    assert!(!params.single_embedding);
}

#[test]
fn test_dmet_fit_cost_vanishes_at_the_exact_potential() {
    // For a non-interacting system the embedded mean-field density matches
    // the projected lattice density exactly, so the zero potential is a
    // stationary zero of the cost function.
    let ham = ring_hamiltonian(6, 6, 0.0);
    let fragments = ring_fragments(3, 2);
    let map = SymmetryMap::new(&fragments, &SymmetrySpec::Translational).unwrap();
    let codec = PotentialCodec::new(&map, FitMode::EmbeddingBasis).unwrap();
    let operators = ResponseOperatorSet::new(&map, FitMode::EmbeddingBasis);
    let orchestrator = EmbeddingOrchestrator::builder()
        .hamiltonian(&ham)
        .symmetry_map(&map)
        .codec(&codec)
        .fragments(&fragments)
        .solvers(vec![SolverKind::Rhf; 3])
        .bath_kind(BathKind::OccupationNumber)
        .oeh_kind(OehKind::Fock)
        .build()
        .unwrap();

    let uvec = Array1::<f64>::zeros(codec.n_params());
    let results = orchestrator.kernel(&uvec, 0.0, false).unwrap();
    let problem = PotentialFitProblem {
        hamiltonian: &ham,
        map: &map,
        codec: &codec,
        operators: &operators,
        results: &results,
        fit_mode: FitMode::EmbeddingBasis,
        oeh_kind: OehKind::Fock,
    };

    assert_abs_diff_eq!(problem.cost_value(&uvec).unwrap(), 0.0, epsilon = 1e-12);
    let gradient = problem.gradient_value(&uvec).unwrap();
    for g in gradient.iter() {
        assert_abs_diff_eq!(*g, 0.0, epsilon = 1e-8);
    }
}

#[test]
fn test_dmet_fit_gradient_matches_finite_difference() {
    let ham = ring_hamiltonian(6, 6, 0.8);
    let fragments = ring_fragments(3, 2);
    let seeds = [0.05, -0.03, 0.02];
    for fit_mode in [
        FitMode::EmbeddingBasis,
        FitMode::EmbeddingBasisDiagonal,
        FitMode::Fragment,
        FitMode::FragmentDiagonal,
    ] {
        let map = SymmetryMap::new(&fragments, &SymmetrySpec::Translational).unwrap();
        let codec = PotentialCodec::new(&map, fit_mode).unwrap();
        let operators = ResponseOperatorSet::new(&map, fit_mode);
        let orchestrator = EmbeddingOrchestrator::builder()
            .hamiltonian(&ham)
            .symmetry_map(&map)
            .codec(&codec)
            .fragments(&fragments)
            .solvers(vec![SolverKind::Rhf; 3])
            .bath_kind(BathKind::OccupationNumber)
            .oeh_kind(OehKind::Fock)
            .build()
            .unwrap();

        let uvec =
            Array1::from_iter(seeds.iter().cycle().take(codec.n_params()).cloned());
        let results = orchestrator.kernel(&uvec, 0.0, false).unwrap();
        let problem = PotentialFitProblem {
            hamiltonian: &ham,
            map: &map,
            codec: &codec,
            operators: &operators,
            results: &results,
            fit_mode,
            oeh_kind: OehKind::Fock,
        };

        let gradient = problem.gradient_value(&uvec).unwrap();
        let h = 1e-6;
        for k in 0..codec.n_params() {
            let mut plus = uvec.clone();
            plus[k] += h;
            let mut minus = uvec.clone();
            minus[k] -= h;
            let fd = (problem.cost_value(&plus).unwrap()
                - problem.cost_value(&minus).unwrap())
                / (2.0 * h);
            assert_abs_diff_eq!(gradient[k], fd, epsilon = 1e-6);
        }
    }
}

#[test]
fn test_dmet_fit_conjugate_gradient_lowers_cost() {
    let ham = ring_hamiltonian(6, 6, 0.8);
    let fragments = ring_fragments(3, 2);
    let map = SymmetryMap::new(&fragments, &SymmetrySpec::Translational).unwrap();
    let codec = PotentialCodec::new(&map, FitMode::EmbeddingBasis).unwrap();
    let operators = ResponseOperatorSet::new(&map, FitMode::EmbeddingBasis);
    let orchestrator = EmbeddingOrchestrator::builder()
        .hamiltonian(&ham)
        .symmetry_map(&map)
        .codec(&codec)
        .fragments(&fragments)
        .solvers(vec![SolverKind::Rhf; 3])
        .bath_kind(BathKind::OccupationNumber)
        .oeh_kind(OehKind::Fock)
        .build()
        .unwrap();

    let uvec0 = Array1::<f64>::zeros(codec.n_params());
    let results = orchestrator.kernel(&uvec0, 0.0, false).unwrap();
    let problem = PotentialFitProblem {
        hamiltonian: &ham,
        map: &map,
        codec: &codec,
        operators: &operators,
        results: &results,
        fit_mode: FitMode::EmbeddingBasis,
        oeh_kind: OehKind::Fock,
    };
    let cost0 = problem.cost_value(&uvec0).unwrap();
    assert!(cost0 > 0.0);

    let params = DmetParams::builder()
        .algorithm(ScAlgorithm::ConjugateGradient)
        .fit_max_iterations(50)
        .build()
        .unwrap();
    let fitted = fit_correlation_potential(&params, problem.clone(), &uvec0).unwrap();
    let cost1 = problem.cost_value(&fitted).unwrap();
    assert!(cost1 < cost0);
}

#[test]
fn test_dmet_self_consistency_noninteracting_ring() {
    let ham = ring_hamiltonian(6, 6, 0.0);
    let fragments = ring_fragments(3, 2);
    let params = DmetParams::default();
    let mut driver = DmetDriver::builder()
        .parameters(&params)
        .hamiltonian(&ham)
        .fragments(&fragments)
        .symmetry(SymmetrySpec::Translational)
        .build()
        .unwrap();
    driver.run().unwrap();

    let result = driver.result().unwrap();
    // The zero potential is already self-consistent, so the very first cycle
    // terminates the iteration.
    assert!(result.converged);
    assert_eq!(result.n_cycles, 1);
    assert_abs_diff_eq!(result.total_energy, -8.0, epsilon = 1e-6);
    assert!(result.chemical_potential.abs() < 1e-6);
    assert_eq!(result.fragment_energies.len(), 1);
    assert_abs_diff_eq!(result.fragment_electron_counts[0], 2.0, epsilon = 1e-6);
    assert!(result
        .correlation_potential
        .iter()
        .all(|v| v.abs() < 1e-6));
}

#[test]
fn test_dmet_self_consistency_fragment_diagonal_fit() {
    let ham = ring_hamiltonian(6, 6, 0.0);
    let fragments = ring_fragments(3, 2);
    let params = DmetParams::builder()
        .fit_mode(FitMode::FragmentDiagonal)
        .build()
        .unwrap();
    let mut driver = DmetDriver::builder()
        .parameters(&params)
        .hamiltonian(&ham)
        .fragments(&fragments)
        .symmetry(SymmetrySpec::Translational)
        .build()
        .unwrap();
    driver.run().unwrap();

    let result = driver.result().unwrap();
    assert!(result.converged);
    assert_eq!(result.n_cycles, 1);
    assert_abs_diff_eq!(result.total_energy, -8.0, epsilon = 1e-6);
}

#[test]
fn test_dmet_single_embedding_total_energy() {
    let ham = ring_hamiltonian(6, 6, 0.0);
    let fragments = vec![vec![1, 1, 0, 0, 0, 0]];
    let params = DmetParams::builder().single_embedding(true).build().unwrap();
    let mut driver = DmetDriver::builder()
        .parameters(&params)
        .hamiltonian(&ham)
        .fragments(&fragments)
        .symmetry(SymmetrySpec::NoSymmetry)
        .build()
        .unwrap();
    driver.run().unwrap();

    let result = driver.result().unwrap();
    assert!(result.converged);
    assert_eq!(result.n_cycles, 1);
    // Embedding + frozen-core energies recover the exact mean-field total.
    assert_abs_diff_eq!(result.total_energy, -8.0, epsilon = 1e-8);
    assert_abs_diff_eq!(result.chemical_potential, 0.0);
    assert!(result.fragment_energies.is_empty());
}

#[test]
fn test_dmet_one_shot_hubbard_ring_fixes_electron_count() {
    let ham = ring_hamiltonian(6, 6, 2.0);
    let fragments = ring_fragments(3, 2);
    let params = DmetParams::builder().one_shot(true).build().unwrap();
    let mut driver = DmetDriver::builder()
        .parameters(&params)
        .hamiltonian(&ham)
        .fragments(&fragments)
        .symmetry(SymmetrySpec::Translational)
        .build()
        .unwrap();
    driver.run().unwrap();

    let result = driver.result().unwrap();
    assert!(result.converged);
    assert!(result.chemical_potential.is_finite());
    assert_eq!(result.fragment_electron_counts.len(), 1);
    // The chemical-potential search restores the target electron count.
    assert_abs_diff_eq!(
        result.fragment_electron_counts[0] * 3.0,
        6.0,
        epsilon = 1e-6
    );
    assert!(result.total_energy < 0.0);
}

#[test]
fn test_dmet_unimplemented_solver_fails_loudly() {
    let ham = ring_hamiltonian(6, 6, 0.0);
    let fragments = ring_fragments(3, 2);
    let params = DmetParams::builder()
        .solver(SolverKind::Ccsd)
        .one_shot(true)
        .build()
        .unwrap();
    let mut driver = DmetDriver::builder()
        .parameters(&params)
        .hamiltonian(&ham)
        .fragments(&fragments)
        .symmetry(SymmetrySpec::Translational)
        .build()
        .unwrap();
    let err = driver.run().unwrap_err();
    assert!(err.to_string().contains("not implemented"));
}

#[test]
fn test_dmet_driver_validation() {
    let ham = ring_hamiltonian(6, 6, 0.0);
    let fragments = ring_fragments(3, 2);

    let params = DmetParams::default();
    let driver = DmetDriver::builder()
        .parameters(&params)
        .hamiltonian(&ham)
        .fragments(&fragments)
        .symmetry(SymmetrySpec::Translational)
        .build()
        .unwrap();
    assert!(driver.result().is_err());

    let overdamped = DmetParams::builder().damping(1.5).build().unwrap();
    let mut driver = DmetDriver::builder()
        .parameters(&overdamped)
        .hamiltonian(&ham)
        .fragments(&fragments)
        .symmetry(SymmetrySpec::Translational)
        .build()
        .unwrap();
    let err = driver.run().unwrap_err();
    assert!(err.to_string().contains("damping"));
}
