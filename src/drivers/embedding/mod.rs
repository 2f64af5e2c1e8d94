//! The embedding orchestration kernel.
//!
//! For a given correlation potential and chemical potential, the kernel
//! solves the embedded problem of every irreducible fragment and aggregates
//! energies, electron counts, density matrices and embedding bases into an
//! explicit [`FragmentResults`] value. Results are fully rebuilt on every
//! invocation; nothing is accumulated across calls.

use anyhow::{self, bail, ensure};
use derive_builder::Builder;
use itertools::Itertools;
use ndarray::{s, Array1, Array2};

use crate::bath::{decompose, BathKind, BathSpectrum};
use crate::hamiltonian::{OehKind, OrthoHamiltonian};
use crate::io::format::dmet_output;
use crate::potential::PotentialCodec;
use crate::solvers::{EmbeddedCluster, SolverKind};
use crate::symmetry::SymmetryMap;


/// Environment occupations within this cutoff of 0 or 2 snap to the exact
/// integer; anything strictly in between is a fatal bath-selection
/// inconsistency.
const CORE_OCCUPATION_CUTOFF: f64 = 0.01;

// ==================
// Struct definitions
// ==================

/// A structure holding the additional outputs of a single-embedding kernel
/// invocation.
#[derive(Clone, Debug)]
pub struct SingleEmbedding {
    /// The total energy of the embedded cluster.
    pub embedding_energy: f64,

    /// The frozen environment density matrix in the orthonormal basis.
    pub core_density: Array2<f64>,

    /// The unrounded electron count of the frozen environment.
    pub environment_electrons: f64,
}

/// A structure holding the outcome of one embedding kernel invocation.
///
/// Energies and electron counts are broadcast over the full effective
/// fragment list; density matrices and embedding bases are stored per
/// irreducible fragment.
#[derive(Clone, Debug)]
pub struct FragmentResults {
    /// The fragment energy contributions, broadcast by symmetry. Empty in
    /// single-embedding mode.
    pub energies: Vec<f64>,

    /// The fragment electron counts, broadcast by symmetry.
    pub electron_counts: Vec<f64>,

    /// The correlated one-particle density matrices of the irreducible
    /// fragments, in their active embedding spaces.
    pub density_matrices: Vec<Array2<f64>>,

    /// The active embedding bases of the irreducible fragments
    /// (orthonormal-basis orbitals as columns).
    pub embedding_bases: Vec<Array2<f64>>,

    /// The total embedded electron count, scaled by the symmetry
    /// multiplicity.
    pub total_electrons: f64,

    /// The single-embedding outputs, present only in single-embedding mode.
    pub single: Option<SingleEmbedding>,
}

/// A driver-internal orchestrator solving the embedded problem of every
/// irreducible fragment for a fixed correlation potential.
#[derive(Clone, Builder)]
pub struct EmbeddingOrchestrator<'a> {
    /// The Hamiltonian in the orthonormal basis.
    hamiltonian: &'a OrthoHamiltonian,

    /// The symmetry reduction of the fragment list.
    symmetry_map: &'a SymmetryMap,

    /// The correlation-potential codec.
    codec: &'a PotentialCodec,

    /// The fragment orbital-label vectors of the full partition.
    fragments: &'a [Vec<usize>],

    /// The solver assigned to each fragment of the full partition.
    solvers: Vec<SolverKind>,

    /// The bath-decomposition method.
    bath_kind: BathKind,

    /// The one-electron operator used in the bath construction.
    oeh_kind: OehKind,
}

impl<'a> EmbeddingOrchestrator<'a> {
    /// Returns a builder to construct an [`EmbeddingOrchestrator`] structure.
    pub fn builder() -> EmbeddingOrchestratorBuilder<'a> {
        EmbeddingOrchestratorBuilder::default()
    }

    /// Solves the embedded problem of every irreducible fragment.
    ///
    /// # Arguments
    ///
    /// * `uvec` - The correlation-potential parameter vector.
    /// * `chemical_potential` - The global chemical potential shifting the
    ///   fragment electron counts.
    /// * `single_embedding` - Boolean requesting the single-embedding energy
    ///   decomposition instead of the fragment energy list.
    pub fn kernel(
        &self,
        uvec: &Array1<f64>,
        chemical_potential: f64,
        single_embedding: bool,
    ) -> Result<FragmentResults, anyhow::Error> {
        let ham = self.hamiltonian;
        let map = self.symmetry_map;
        let n_orbitals = ham.n_orbitals();
        let n_electrons = ham.n_electrons();

        let umat = self.codec.decode(uvec);
        let (orbitals, density) = ham.construct_ortho_density(&umat, self.oeh_kind)?;

        let mut irreducible_energies = Vec::with_capacity(map.n_irreducible());
        let mut irreducible_counts = Vec::with_capacity(map.n_irreducible());
        let mut density_matrices = Vec::with_capacity(map.n_irreducible());
        let mut embedding_bases = Vec::with_capacity(map.n_irreducible());
        let mut single = None;

        for &rep in map.representatives().iter() {
            let fragment = &self.fragments[rep];
            let n_imp = map.fragment_sizes()[rep];

            let decomp = decompose(
                self.bath_kind,
                fragment,
                n_imp,
                &orbitals,
                &density,
                ham.n_pairs(),
            )?;
            let n_emb = n_imp + decomp.n_bath;
            ensure!(
                n_emb <= n_orbitals,
                "The active embedding space of fragment {rep} exceeds the orbital count."
            );

            let (n_elec_emb, environment_electrons, core_density) = match &decomp.spectrum {
                BathSpectrum::CoreOccupations(raw_occupations) => {
                    let mut occupations = raw_occupations.clone();
                    snap_core_occupations(&mut occupations, rep)?;
                    let n_elec_emb = (n_electrons as f64 - occupations.sum()).round() as usize;
                    let environment_electrons = occupations.iter().map(|o| o.abs()).sum::<f64>();
                    let weighted = &decomp.basis * &occupations;
                    let core_density = weighted.dot(&decomp.basis.t());
                    (n_elec_emb, environment_electrons, core_density)
                }
                BathSpectrum::EnvironmentPartition { n_core } => {
                    // Closed-shell assumption: the fragment+bath space holds
                    // exactly one pair per fragment orbital.
                    let n_elec_emb = 2 * n_imp;
                    let environment_electrons = n_electrons as f64 - n_elec_emb as f64;
                    let core = decomp.basis.slice(s![.., n_emb..n_emb + n_core]);
                    let core_density = 2.0 * core.dot(&core.t());
                    (n_elec_emb, environment_electrons, core_density)
                }
            };

            let active = decomp.basis.slice(s![.., 0..n_emb]);
            let emb_oei = ham.embedded_oei(active);
            let emb_tei = ham.embedded_tei(active)?;
            let emb_core_jk = ham.embedded_core_jk(active, &core_density)?;
            let dm_guess = active.t().dot(&density).dot(&active);

            let solver = self.solvers[rep];
            dmet_output!(
                "    Solving the irreducible fragment {rep:2} [{n_elec_emb:2} electrons in ({n_imp:2} fragment + {:2} bath)] with the {solver} solver",
                decomp.n_bath
            );
            let cluster = EmbeddedCluster::new(
                emb_oei,
                emb_tei,
                emb_core_jk,
                dm_guess,
                n_emb,
                n_elec_emb,
                n_imp,
                chemical_potential,
            )?;
            let solution = cluster.solve(solver)?;

            let fragment_electrons = solution
                .density_matrix
                .slice(s![0..n_imp, 0..n_imp])
                .diag()
                .sum();
            irreducible_counts.push(fragment_electrons);
            if single_embedding {
                single = Some(SingleEmbedding {
                    embedding_energy: solution.embedding_energy,
                    core_density,
                    environment_electrons,
                });
            } else {
                irreducible_energies.push(solution.impurity_energy);
            }
            density_matrices.push(solution.density_matrix);
            embedding_bases.push(active.to_owned());
        }

        let energies = if single_embedding {
            Vec::new()
        } else {
            map.broadcast(&irreducible_energies)
        };
        let electron_counts = map.broadcast(&irreducible_counts);
        let total_electrons =
            electron_counts.iter().sum::<f64>() * map.multiplicity() as f64;

        Ok(FragmentResults {
            energies,
            electron_counts,
            density_matrices,
            embedding_bases,
            total_electrons,
            single,
        })
    }
}

/// Snaps frozen environment occupations to exactly 0 or 2.
///
/// An occupation strictly between the cutoffs means a natural orbital could
/// be assigned to neither the bath nor the frozen core; truncating it
/// silently would corrupt the embedded electron count, so it aborts the run.
fn snap_core_occupations(
    occupations: &mut Array1<f64>,
    fragment: usize,
) -> Result<(), anyhow::Error> {
    for occ in occupations.iter_mut() {
        if *occ < CORE_OCCUPATION_CUTOFF {
            *occ = 0.0;
        } else if *occ > 2.0 - CORE_OCCUPATION_CUTOFF {
            *occ = 2.0;
        } else {
            bail!(
                "Bad bath orbital selection for fragment {fragment}: an environment orbital with occupation {occ} can be assigned to neither the bath nor the frozen core."
            );
        }
    }
    Ok(())
}

/// Resolves a per-fragment solver assignment from either a uniform choice or
/// an explicit list over the full fragment partition.
pub(crate) fn resolve_solvers(
    uniform: SolverKind,
    per_fragment: Option<&[SolverKind]>,
    n_fragments: usize,
) -> Result<Vec<SolverKind>, anyhow::Error> {
    match per_fragment {
        Some(list) => {
            ensure!(
                list.len() == n_fragments,
                "{} solvers specified for {n_fragments} fragments.",
                list.len()
            );
            Ok(list.to_vec())
        }
        None => Ok(std::iter::repeat(uniform).take(n_fragments).collect_vec()),
    }
}
