//! Driver for self-consistent density-matrix embedding calculations.
//!
//! The driver alternates between (i) a chemical-potential search that fixes
//! the total embedded electron count, and (ii) a gradient-based fit of the
//! correlation potential to the correlated fragment density matrices, until
//! the correlation potential stops changing.

use std::fmt;

use anyhow::{self, ensure, format_err};
use argmin::core::{
    CostFunction, Executor, Gradient, State, TerminationReason, TerminationStatus,
};
use argmin::solver::conjugategradient::beta::PolakRibiere;
use argmin::solver::conjugategradient::NonlinearConjugateGradient;
use argmin::solver::linesearch::condition::ArmijoCondition;
use argmin::solver::linesearch::BacktrackingLineSearch;
use argmin::solver::quasinewton::BFGS;
use derive_builder::Builder;
use itertools::Itertools;
use ndarray::{s, Array1, Array2};
use ndarray_linalg::Norm;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::auxiliary::numeric::newton;
use crate::bath::BathKind;
use crate::drivers::embedding::{resolve_solvers, EmbeddingOrchestrator, FragmentResults};
use crate::drivers::MdmetDriver;
use crate::hamiltonian::{OehKind, OrthoHamiltonian};
use crate::io::format::{
    dmet_output, dmet_warn, log_subtitle, log_title, nice_bool, write_subtitle, DmetOutput,
};
use crate::potential::{remove_mean_diagonal, FitMode, PotentialCodec, ResponseOperatorSet};
use crate::response::rhf_response;
use crate::solvers::SolverKind;
use crate::symmetry::{SymmetryMap, SymmetrySpec};

#[cfg(test)]
#[path = "dmet_tests.rs"]
mod dmet_tests;

// ==================
// Enum definitions
// ==================

/// An enumerated type for the minimization algorithm of the
/// correlation-potential fit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScAlgorithm {
    /// Variant for the BFGS quasi-Newton method with backtracking line
    /// search.
    Bfgs,

    /// Variant for the Polak--Ribière non-linear conjugate-gradient method.
    ConjugateGradient,
}

impl fmt::Display for ScAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScAlgorithm::Bfgs => write!(f, "BFGS"),
            ScAlgorithm::ConjugateGradient => write!(f, "non-linear conjugate gradient"),
        }
    }
}

// ==================
// Struct definitions
// ==================

// ----------
// Parameters
// ----------

fn default_fit_mode() -> FitMode {
    FitMode::EmbeddingBasis
}
fn default_bath_kind() -> BathKind {
    BathKind::OccupationNumber
}
fn default_oeh_kind() -> OehKind {
    OehKind::Fock
}
fn default_solver() -> SolverKind {
    SolverKind::Rhf
}
fn default_algorithm() -> ScAlgorithm {
    ScAlgorithm::Bfgs
}
fn default_sc_threshold() -> f64 {
    1e-5
}
fn default_max_cycles() -> usize {
    200
}
fn default_chemical_potential_threshold() -> f64 {
    1e-10
}
fn default_chemical_potential_max_iterations() -> usize {
    50
}
fn default_fit_gradient_threshold() -> f64 {
    1e-6
}
fn default_fit_max_iterations() -> usize {
    500
}
fn default_fit_line_search_step_size() -> f64 {
    1e-4
}

/// Structure containing control parameters for self-consistent
/// density-matrix embedding calculations.
#[derive(Clone, Builder, Debug, Serialize, Deserialize)]
pub struct DmetParams {
    /// The subset of the density-matrix mismatch entering the
    /// correlation-potential fit.
    #[builder(default = "FitMode::EmbeddingBasis")]
    #[serde(default = "default_fit_mode")]
    pub fit_mode: FitMode,

    /// The bath-decomposition method.
    #[builder(default = "BathKind::OccupationNumber")]
    #[serde(default = "default_bath_kind")]
    pub bath_kind: BathKind,

    /// The one-electron operator to which the correlation potential is added
    /// when constructing the mean-field density.
    #[builder(default = "OehKind::Fock")]
    #[serde(default = "default_oeh_kind")]
    pub oeh_kind: OehKind,

    /// The uniform embedded solver applied to every fragment when
    /// [`Self::solvers`] is `None`.
    #[builder(default = "SolverKind::Rhf")]
    #[serde(default = "default_solver")]
    pub solver: SolverKind,

    /// Optional explicit solver assignment, one entry per fragment of the
    /// full partition.
    #[builder(default = "None")]
    #[serde(default)]
    pub solvers: Option<Vec<SolverKind>>,

    /// The minimization algorithm of the correlation-potential fit.
    #[builder(default = "ScAlgorithm::Bfgs")]
    #[serde(default = "default_algorithm")]
    pub algorithm: ScAlgorithm,

    /// The convergence threshold on the 2-norm change of the correlation
    /// potential between self-consistency cycles.
    #[builder(default = "1e-5")]
    #[serde(default = "default_sc_threshold")]
    pub self_consistency_threshold: f64,

    /// The maximum number of self-consistency cycles.
    #[builder(default = "200")]
    #[serde(default = "default_max_cycles")]
    pub max_cycles: usize,

    /// The fraction of the previous correlation potential retained when
    /// updating it; must lie in `[0, 1)`.
    #[builder(default = "0.0")]
    #[serde(default)]
    pub damping: f64,

    /// The convergence tolerance of the chemical-potential root search.
    #[builder(default = "1e-10")]
    #[serde(default = "default_chemical_potential_threshold")]
    pub chemical_potential_threshold: f64,

    /// The maximum number of chemical-potential search iterations.
    #[builder(default = "50")]
    #[serde(default = "default_chemical_potential_max_iterations")]
    pub chemical_potential_max_iterations: usize,

    /// The gradient threshold of the correlation-potential fit.
    #[builder(default = "1e-6")]
    #[serde(default = "default_fit_gradient_threshold")]
    pub fit_gradient_threshold: f64,

    /// The maximum number of correlation-potential fit iterations per
    /// self-consistency cycle.
    #[builder(default = "500")]
    #[serde(default = "default_fit_max_iterations")]
    pub fit_max_iterations: usize,

    /// The step-size parameter of the Armijo backtracking line search in the
    /// correlation-potential fit.
    #[builder(default = "1e-4")]
    #[serde(default = "default_fit_line_search_step_size")]
    pub fit_line_search_step_size: f64,

    /// Boolean requesting a single one-shot calculation without the outer
    /// correlation-potential self-consistency.
    #[builder(default = "false")]
    #[serde(default)]
    pub one_shot: bool,

    /// Boolean requesting the single-embedding energy decomposition: the one
    /// effective fragment is solved once at zero chemical potential and the
    /// total energy is assembled from the embedding and frozen-core energies.
    #[builder(default = "false")]
    #[serde(default)]
    pub single_embedding: bool,
}

impl DmetParams {
    /// Returns a builder to construct a [`DmetParams`] structure.
    pub fn builder() -> DmetParamsBuilder {
        DmetParamsBuilder::default()
    }
}

impl Default for DmetParams {
    fn default() -> Self {
        Self::builder()
            .build()
            .expect("Unable to construct a default `DmetParams`.")
    }
}

impl fmt::Display for DmetParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Correlation-potential fit mode: {}", self.fit_mode)?;
        writeln!(f, "Bath decomposition method: {}", self.bath_kind)?;
        writeln!(f, "Mean-field one-electron operator: {}", self.oeh_kind)?;
        match self.solvers.as_ref() {
            Some(list) => writeln!(
                f,
                "Fragment solvers: {}",
                list.iter().map(|solver| solver.to_string()).join(", ")
            )?,
            None => writeln!(f, "Fragment solver: {}", self.solver)?,
        }
        writeln!(f)?;

        writeln!(f, "Fit algorithm: {}", self.algorithm)?;
        writeln!(
            f,
            "Fit gradient threshold: {:.3e}",
            self.fit_gradient_threshold
        )?;
        writeln!(f, "Maximum fit iterations: {}", self.fit_max_iterations)?;
        writeln!(
            f,
            "Fit line search step size: {:.3e}",
            self.fit_line_search_step_size
        )?;
        writeln!(f)?;

        writeln!(
            f,
            "Self-consistency threshold: {:.3e}",
            self.self_consistency_threshold
        )?;
        writeln!(f, "Maximum self-consistency cycles: {}", self.max_cycles)?;
        writeln!(f, "Correlation-potential damping: {:.3}", self.damping)?;
        writeln!(
            f,
            "Chemical-potential tolerance: {:.3e}",
            self.chemical_potential_threshold
        )?;
        writeln!(
            f,
            "Maximum chemical-potential iterations: {}",
            self.chemical_potential_max_iterations
        )?;
        writeln!(f)?;

        writeln!(f, "One-shot calculation: {}", nice_bool(self.one_shot))?;
        writeln!(
            f,
            "Single-embedding decomposition: {}",
            nice_bool(self.single_embedding)
        )?;
        writeln!(f)?;

        Ok(())
    }
}

// ------
// Result
// ------

/// Structure to contain self-consistent density-matrix embedding results.
#[derive(Clone, Builder, Debug)]
pub struct DmetResult<'a> {
    /// The control parameters used to obtain this set of results.
    parameters: &'a DmetParams,

    /// The total electronic energy including the nuclear repulsion.
    pub total_energy: f64,

    /// The converged correlation potential.
    pub correlation_potential: Array2<f64>,

    /// The converged correlation-potential parameter vector.
    pub parameter_vector: Array1<f64>,

    /// The converged global chemical potential.
    pub chemical_potential: f64,

    /// The democratically partitioned fragment energies, broadcast by
    /// symmetry. Empty in single-embedding mode.
    pub fragment_energies: Vec<f64>,

    /// The fragment electron counts, broadcast by symmetry.
    pub fragment_electron_counts: Vec<f64>,

    /// The number of self-consistency cycles performed.
    pub n_cycles: usize,

    /// Boolean indicating if the correlation potential converged within the
    /// requested number of cycles.
    pub converged: bool,

    /// The 2-norm change of the correlation potential in the final cycle.
    pub potential_difference: f64,
}

impl<'a> DmetResult<'a> {
    fn builder() -> DmetResultBuilder<'a> {
        DmetResultBuilder::default()
    }
}

impl fmt::Display for DmetResult<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_subtitle(f, "DMET result")?;
        writeln!(f)?;
        writeln!(f, "Converged: {}", nice_bool(self.converged))?;
        writeln!(f, "Self-consistency cycles: {}", self.n_cycles)?;
        writeln!(
            f,
            "Final correlation-potential difference: {:.6e}",
            self.potential_difference
        )?;
        writeln!(f, "Chemical potential: {:+.10}", self.chemical_potential)?;
        for (i, (energy, electrons)) in self
            .fragment_energies
            .iter()
            .zip(self.fragment_electron_counts.iter())
            .enumerate()
        {
            writeln!(
                f,
                "Fragment {i:3}: energy = {energy:+.10}, electrons = {electrons:9.6}"
            )?;
        }
        writeln!(f, "DMET total energy: {:+.10}", self.total_energy)?;
        writeln!(f)?;

        Ok(())
    }
}

// ------
// Driver
// ------

/// Driver for self-consistent density-matrix embedding calculations.
///
/// Each cycle searches the global chemical potential to the target electron
/// count, fits the correlation potential to the correlated fragment density
/// matrices, and damps the update; the cycle iteration terminates once the
/// potential update falls below the self-consistency threshold.
#[derive(Clone, Builder)]
pub struct DmetDriver<'a> {
    /// The control parameters of the calculation.
    parameters: &'a DmetParams,

    /// The Hamiltonian in the orthonormal basis.
    hamiltonian: &'a OrthoHamiltonian,

    /// The fragment orbital-label vectors of the full partition.
    fragments: &'a [Vec<usize>],

    /// The symmetry specification relating the fragments.
    symmetry: SymmetrySpec,

    /// The result of the calculation.
    #[builder(setter(skip), default = "None")]
    result: Option<DmetResult<'a>>,
}

impl<'a> DmetDriver<'a> {
    /// Returns a builder to construct a [`DmetDriver`] structure.
    pub fn builder() -> DmetDriverBuilder<'a> {
        DmetDriverBuilder::default()
    }

    /// Solves the embedded problems at a fixed correlation potential: searches
    /// the chemical potential to the target electron count, then returns the
    /// total energy, the converged chemical potential and the fragment
    /// results.
    ///
    /// In single-embedding mode no search is performed and the total energy is
    /// assembled from the embedding and frozen-core energies instead of the
    /// democratic fragment partitioning.
    fn one_shot(
        &self,
        orchestrator: &EmbeddingOrchestrator<'_>,
        map: &SymmetryMap,
        uvec: &Array1<f64>,
        chemical_potential: f64,
    ) -> Result<(f64, f64, FragmentResults), anyhow::Error> {
        let params = self.parameters;
        let ham = self.hamiltonian;

        if params.single_embedding {
            ensure!(
                map.n_effective_fragments() == 1,
                "The single-embedding decomposition requires exactly one effective fragment; got {}.",
                map.n_effective_fragments()
            );
            let results = orchestrator.kernel(uvec, chemical_potential, true)?;
            let single = results
                .single
                .as_ref()
                .ok_or_else(|| format_err!("Missing single-embedding outputs."))?;
            let core_energy = ham.core_energy(&single.core_density)?;
            dmet_output!(
                "  Embedding energy      : {:+.10}",
                single.embedding_energy
            );
            dmet_output!("  Frozen-core energy    : {core_energy:+.10}");
            dmet_output!(
                "  Environment electrons : {:9.6}",
                single.environment_electrons
            );
            let total_energy = single.embedding_energy + core_energy + ham.e_nuclear();
            return Ok((total_energy, chemical_potential, results));
        }

        let target = ham
            .n_electrons()
            .to_f64()
            .ok_or_else(|| format_err!("Unable to convert the electron count to `f64`."))?;
        let multiplicity = map
            .multiplicity()
            .to_f64()
            .ok_or_else(|| format_err!("Unable to convert the symmetry multiplicity to `f64`."))?;

        let mu = newton(
            |mu| {
                let trial = orchestrator.kernel(uvec, mu, false)?;
                dmet_output!(
                    "  Chemical potential = {:+.10}, electrons = {:.10}",
                    mu,
                    trial.total_electrons
                );
                Ok(trial.total_electrons - target)
            },
            chemical_potential,
            params.chemical_potential_threshold,
            params.chemical_potential_max_iterations,
        )?;

        let results = orchestrator.kernel(uvec, mu, false)?;
        let total_energy =
            results.energies.iter().sum::<f64>() * multiplicity + ham.e_nuclear();
        Ok((total_energy, mu, results))
    }

    /// Executes the density-matrix embedding calculation.
    fn dmet(&mut self) -> Result<(), anyhow::Error> {
        log_title("Density-Matrix Embedding Theory");
        dmet_output!("");
        let params = self.parameters;
        params.log_output_display();

        ensure!(
            (0.0..1.0).contains(&params.damping),
            "The correlation-potential damping {} lies outside [0, 1).",
            params.damping
        );
        ensure!(
            params.self_consistency_threshold > 0.0,
            "The self-consistency threshold must be positive."
        );

        let ham = self.hamiltonian;
        let map = SymmetryMap::new(self.fragments, &self.symmetry)?;
        let codec = PotentialCodec::new(&map, params.fit_mode)?;
        let operators = ResponseOperatorSet::new(&map, params.fit_mode);
        let solvers = resolve_solvers(
            params.solver,
            params.solvers.as_deref(),
            self.fragments.len(),
        )?;
        let orchestrator = EmbeddingOrchestrator::builder()
            .hamiltonian(ham)
            .symmetry_map(&map)
            .codec(&codec)
            .fragments(self.fragments)
            .solvers(solvers)
            .bath_kind(params.bath_kind)
            .oeh_kind(params.oeh_kind)
            .build()?;

        dmet_output!(
            "{} orbitals, {} electrons, {} fragments ({} irreducible), {} correlation-potential parameters",
            map.n_orbitals(),
            ham.n_electrons(),
            map.n_fragments(),
            map.n_irreducible(),
            codec.n_params()
        );
        dmet_output!("");

        let mut umat = Array2::<f64>::zeros((map.n_orbitals(), map.n_orbitals()));
        let mut uvec = codec.encode(&umat);
        let mut chemical_potential = 0.0;

        if params.one_shot || params.single_embedding {
            log_subtitle("One-shot embedding");
            dmet_output!("");
            let (total_energy, mu, results) =
                self.one_shot(&orchestrator, &map, &uvec, chemical_potential)?;
            dmet_output!("  DMET energy: {total_energy:+.10}");
            dmet_output!("");

            self.result = Some(
                DmetResult::builder()
                    .parameters(params)
                    .total_energy(total_energy)
                    .correlation_potential(umat)
                    .parameter_vector(uvec)
                    .chemical_potential(mu)
                    .fragment_energies(results.energies)
                    .fragment_electron_counts(results.electron_counts)
                    .n_cycles(1)
                    .converged(true)
                    .potential_difference(0.0)
                    .build()?,
            );
            self.result()?.log_output_display();
            return Ok(());
        }

        log_subtitle("Correlation-potential self-consistency");

        let mut n_cycles = 0;
        let mut converged = false;
        let mut potential_difference = f64::INFINITY;
        let mut last: Option<(f64, FragmentResults)> = None;
        for cycle in 1..=params.max_cycles {
            dmet_output!("");
            dmet_output!("Cycle {cycle}:");
            let (total_energy, mu, results) =
                self.one_shot(&orchestrator, &map, &uvec, chemical_potential)?;
            chemical_potential = mu;
            dmet_output!("  DMET energy: {total_energy:+.10}");

            let problem = PotentialFitProblem {
                hamiltonian: ham,
                map: &map,
                codec: &codec,
                operators: &operators,
                results: &results,
                fit_mode: params.fit_mode,
                oeh_kind: params.oeh_kind,
            };
            let fitted = fit_correlation_potential(params, problem, &uvec)?;
            let mut umat_new = codec.decode(&fitted);
            remove_mean_diagonal(&mut umat_new);

            potential_difference = (&umat_new - &umat).norm_l2();
            dmet_output!(
                "  Correlation-potential difference: {potential_difference:.6e}"
            );
            umat = params.damping * &umat + (1.0 - params.damping) * &umat_new;
            uvec = codec.encode(&umat);

            n_cycles = cycle;
            last = Some((total_energy, results));
            if potential_difference <= params.self_consistency_threshold {
                converged = true;
                break;
            }
        }
        dmet_output!("");
        if !converged {
            dmet_warn!(
                "The correlation potential failed to converge within {} cycles; final difference: {:.6e}.",
                params.max_cycles,
                potential_difference
            );
        }

        let (total_energy, results) = last
            .ok_or_else(|| format_err!("No self-consistency cycles were performed."))?;
        self.result = Some(
            DmetResult::builder()
                .parameters(params)
                .total_energy(total_energy)
                .correlation_potential(umat)
                .parameter_vector(uvec)
                .chemical_potential(chemical_potential)
                .fragment_energies(results.energies)
                .fragment_electron_counts(results.electron_counts)
                .n_cycles(n_cycles)
                .converged(converged)
                .potential_difference(potential_difference)
                .build()?,
        );
        self.result()?.log_output_display();
        Ok(())
    }
}

impl<'a> MdmetDriver for DmetDriver<'a> {
    type Params = DmetParams;

    type Outcome = DmetResult<'a>;

    fn run(&mut self) -> Result<(), anyhow::Error> {
        self.dmet()
    }

    fn result(&self) -> Result<&Self::Outcome, anyhow::Error> {
        self.result
            .as_ref()
            .ok_or_else(|| format_err!("No DMET results found."))
    }
}

// --------------------------
// Correlation-potential fit
// --------------------------

/// The correlation-potential fit problem of one self-consistency cycle.
///
/// The correlated fragment density matrices and embedding bases are frozen at
/// the cycle's kernel solution; only the mean-field density responds to the
/// trial potential.
#[derive(Clone)]
struct PotentialFitProblem<'a> {
    hamiltonian: &'a OrthoHamiltonian,
    map: &'a SymmetryMap,
    codec: &'a PotentialCodec,
    operators: &'a ResponseOperatorSet,
    results: &'a FragmentResults,
    fit_mode: FitMode,
    oeh_kind: OehKind,
}

impl PotentialFitProblem<'_> {
    /// The per-irreducible-fragment mismatch between the projected mean-field
    /// density at the trial potential and the frozen correlated density.
    fn density_errors(&self, uvec: &Array1<f64>) -> Result<Vec<Array2<f64>>, anyhow::Error> {
        let umat = self.codec.decode(uvec);
        let (_, density) = self
            .hamiltonian
            .construct_ortho_density(&umat, self.oeh_kind)?;

        let mut errors = Vec::with_capacity(self.map.n_irreducible());
        for (i, &rep) in self.map.representatives().iter().enumerate() {
            let n_imp = self.map.fragment_sizes()[rep];
            let basis_full = &self.results.embedding_bases[i];
            let correlated_full = &self.results.density_matrices[i];
            let (basis, correlated) = if self.fit_mode.fragment_only() {
                (
                    basis_full.slice(s![.., 0..n_imp]),
                    correlated_full.slice(s![0..n_imp, 0..n_imp]),
                )
            } else {
                (basis_full.view(), correlated_full.view())
            };
            let mean_field = basis.t().dot(&density).dot(&basis);
            let mut error = &mean_field - &correlated;
            if self.fit_mode.diagonal_only() {
                error = Array2::from_diag(&error.diag().to_owned());
            }
            errors.push(error);
        }
        Ok(errors)
    }

    /// The cost function: the squared Frobenius norm of the density mismatch,
    /// summed over all effective fragments.
    fn cost_value(&self, uvec: &Array1<f64>) -> Result<f64, anyhow::Error> {
        let errors = self.density_errors(uvec)?;
        let irreducible = errors
            .iter()
            .map(|error| error.iter().map(|v| v.powi(2)).sum::<f64>())
            .collect_vec();
        Ok(self.map.broadcast(&irreducible).iter().sum())
    }

    /// The analytic gradient of the cost function via the mean-field density
    /// response.
    fn gradient_value(&self, uvec: &Array1<f64>) -> Result<Array1<f64>, anyhow::Error> {
        let n_orbitals = self.hamiltonian.n_orbitals();
        let n_params = self.codec.n_params();
        let errors = self.density_errors(uvec)?;

        let umat = self.codec.decode(uvec);
        let effective = self.hamiltonian.one_electron_operator(self.oeh_kind) + &umat;
        let derivative = rhf_response(
            n_orbitals,
            n_params,
            self.hamiltonian.n_pairs(),
            self.operators,
            &effective,
        )?;

        let mut gradient = Array1::<f64>::zeros(n_params);
        for k in 0..n_params {
            let d_k = derivative.slice(s![k, .., ..]);
            let mut irreducible = Vec::with_capacity(self.map.n_irreducible());
            for (i, &rep) in self.map.representatives().iter().enumerate() {
                let n_imp = self.map.fragment_sizes()[rep];
                let basis_full = &self.results.embedding_bases[i];
                let basis = if self.fit_mode.fragment_only() {
                    basis_full.slice(s![.., 0..n_imp])
                } else {
                    basis_full.view()
                };
                let mut projected = basis.t().dot(&d_k).dot(&basis);
                if self.fit_mode.diagonal_only() {
                    projected = Array2::from_diag(&projected.diag().to_owned());
                }
                irreducible.push(2.0 * (&errors[i] * &projected).sum());
            }
            gradient[k] = self.map.broadcast(&irreducible).iter().sum::<f64>();
        }
        Ok(gradient)
    }
}

impl CostFunction for PotentialFitProblem<'_> {
    type Param = Array1<f64>;
    type Output = f64;

    fn cost(&self, uvec: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        self.cost_value(uvec)
    }
}

impl Gradient for PotentialFitProblem<'_> {
    type Param = Array1<f64>;
    type Gradient = Array1<f64>;

    fn gradient(&self, uvec: &Self::Param) -> Result<Self::Gradient, argmin::core::Error> {
        self.gradient_value(uvec)
    }
}

/// Minimizes the density-mismatch cost function from the current parameter
/// vector and returns the best parameters found.
fn fit_correlation_potential(
    params: &DmetParams,
    problem: PotentialFitProblem<'_>,
    uvec0: &Array1<f64>,
) -> Result<Array1<f64>, anyhow::Error> {
    let n_params = uvec0.len();
    let max_iters = params.fit_max_iterations.to_u64().unwrap_or_else(|| {
        dmet_warn!(
            "Unable to convert the specified maximum number of fit iterations, {}, to `u64`. The value {} will be used instead.",
            params.fit_max_iterations,
            u64::MAX
        );
        u64::MAX
    });
    let linesearch = BacktrackingLineSearch::<Array1<f64>, Array1<f64>, _, f64>::new(
        ArmijoCondition::new(params.fit_line_search_step_size)?,
    );

    let (best, status) = match params.algorithm {
        ScAlgorithm::Bfgs => {
            let solver: BFGS<_, f64> =
                BFGS::new(linesearch).with_tolerance_grad(params.fit_gradient_threshold)?;
            let res = Executor::new(problem, solver)
                .configure(|state| {
                    state
                        .param(uvec0.clone())
                        .inv_hessian(Array2::<f64>::eye(n_params))
                        .target_cost(0.0)
                        .max_iters(max_iters)
                })
                .run()?;
            let state = res.state();
            dmet_output!(
                "  Potential fit ({}): {} after {} iterations, best cost {:.6e}",
                params.algorithm,
                state.get_termination_status(),
                state.get_iter(),
                state.get_best_cost()
            );
            (
                state.get_best_param().cloned(),
                state.get_termination_status().clone(),
            )
        }
        ScAlgorithm::ConjugateGradient => {
            let solver: NonlinearConjugateGradient<Array1<f64>, _, _, f64> =
                NonlinearConjugateGradient::new(linesearch, PolakRibiere::new());
            let res = Executor::new(problem, solver)
                .configure(|state| {
                    state
                        .param(uvec0.clone())
                        .target_cost(0.0)
                        .max_iters(max_iters)
                })
                .run()?;
            let state = res.state();
            dmet_output!(
                "  Potential fit ({}): {} after {} iterations, best cost {:.6e}",
                params.algorithm,
                state.get_termination_status(),
                state.get_iter(),
                state.get_best_cost()
            );
            (
                state.get_best_param().cloned(),
                state.get_termination_status().clone(),
            )
        }
    };

    if !matches!(
        status,
        TerminationStatus::Terminated(
            TerminationReason::SolverConverged | TerminationReason::TargetCostReached
        )
    ) {
        dmet_warn!("The correlation-potential fit terminated with status: {status}.");
    }
    best.ok_or_else(|| {
        format_err!("Unable to retrieve the fitted correlation-potential parameters.")
    })
}
