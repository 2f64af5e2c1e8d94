//! Embedded cluster solvers.
//!
//! An [`EmbeddedCluster`] carries the integrals of one fragment+bath problem;
//! [`EmbeddedCluster::solve`] dispatches on the [`SolverKind`] tag. Variants
//! without an implementation fail explicitly: returning default results would
//! silently corrupt the self-consistency loop.

use std::fmt;

use anyhow::{self, bail, ensure, format_err};
use ndarray::{s, Array2, Array4, Ix2};
use ndarray_einsum_beta::einsum;
use ndarray_linalg::{Eigh, Norm, UPLO};
use serde::{Deserialize, Serialize};


/// The density-matrix convergence threshold of the embedded mean-field
/// solver.
const SCF_THRESHOLD: f64 = 1e-10;

/// The iteration cap of the embedded mean-field solver.
const SCF_MAX_CYCLES: usize = 200;

/// The linear mixing retained from the previous density between embedded
/// mean-field cycles.
const SCF_MIXING: f64 = 0.25;

// ==================
// Enum definitions
// ==================

/// An enumerated type for the embedded cluster solver variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverKind {
    /// Variant for the restricted mean-field solver.
    Rhf,

    /// Variant for configuration interaction in a complete active space.
    Casci,

    /// Variant for complete-active-space self-consistent field with orbital
    /// optimization.
    Casscf,

    /// Variant for the density-matrix renormalization group.
    Dmrg,

    /// Variant for coupled cluster with singles and doubles.
    Ccsd,
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverKind::Rhf => write!(f, "RHF"),
            SolverKind::Casci => write!(f, "CASCI"),
            SolverKind::Casscf => write!(f, "CASSCF"),
            SolverKind::Dmrg => write!(f, "DMRG"),
            SolverKind::Ccsd => write!(f, "CCSD"),
        }
    }
}

// ==================
// Struct definitions
// ==================

/// A structure holding the result of one embedded cluster solution.
#[derive(Clone, Debug)]
pub struct ClusterSolution {
    /// The fragment contribution to the total energy.
    pub impurity_energy: f64,

    /// The total energy of the embedded cluster.
    pub embedding_energy: f64,

    /// The correlated one-particle density matrix in the active embedding
    /// space.
    pub density_matrix: Array2<f64>,
}

/// A structure holding the integrals and state of one embedded fragment+bath
/// problem.
#[derive(Clone, Debug)]
pub struct EmbeddedCluster {
    /// The one-electron integrals in the active embedding space.
    oei: Array2<f64>,

    /// The two-electron integrals in the active embedding space.
    tei: Array4<f64>,

    /// The frozen-core Coulomb/exchange contribution in the active embedding
    /// space.
    core_jk: Array2<f64>,

    /// The initial density-matrix guess.
    dm_guess: Array2<f64>,

    /// The number of active orbitals (fragment + bath).
    n_orbitals: usize,

    /// The number of electrons assigned to the cluster.
    n_electrons: usize,

    /// The number of fragment orbitals, which lead the active space.
    n_impurity: usize,

    /// The global chemical potential subtracted on the fragment diagonal.
    chemical_potential: f64,
}

impl EmbeddedCluster {
    /// Constructs an embedded cluster problem.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        oei: Array2<f64>,
        tei: Array4<f64>,
        core_jk: Array2<f64>,
        dm_guess: Array2<f64>,
        n_orbitals: usize,
        n_electrons: usize,
        n_impurity: usize,
        chemical_potential: f64,
    ) -> Result<Self, anyhow::Error> {
        ensure!(
            oei.shape() == [n_orbitals, n_orbitals]
                && core_jk.shape() == [n_orbitals, n_orbitals]
                && dm_guess.shape() == [n_orbitals, n_orbitals]
                && tei.shape() == [n_orbitals, n_orbitals, n_orbitals, n_orbitals],
            "Embedded integral tensors do not match the active-space size {n_orbitals}."
        );
        ensure!(
            n_electrons % 2 == 0,
            "The embedded cluster is closed-shell but received {n_electrons} electrons."
        );
        ensure!(
            n_electrons / 2 <= n_orbitals,
            "{n_electrons} electrons cannot doubly occupy {n_orbitals} active orbitals."
        );
        ensure!(
            n_impurity <= n_orbitals,
            "{n_impurity} fragment orbitals exceed the active-space size {n_orbitals}."
        );
        Ok(Self {
            oei,
            tei,
            core_jk,
            dm_guess,
            n_orbitals,
            n_electrons,
            n_impurity,
            chemical_potential,
        })
    }

    /// Solves the embedded cluster with the requested solver variant.
    pub fn solve(&self, kind: SolverKind) -> Result<ClusterSolution, anyhow::Error> {
        match kind {
            SolverKind::Rhf => self.rhf(),
            SolverKind::Casci | SolverKind::Casscf | SolverKind::Dmrg | SolverKind::Ccsd => {
                bail!("The {kind} embedded solver is not implemented.")
            }
        }
    }

    /// The Coulomb matrix of a density matrix in the active space.
    fn coulomb(&self, density: &Array2<f64>) -> Result<Array2<f64>, anyhow::Error> {
        einsum("pqrs,rs->pq", &[&self.tei.view(), &density.view()])
            .map_err(|err| format_err!(err))
            .and_then(|j| {
                j.into_dimensionality::<Ix2>()
                    .map_err(|err| format_err!(err))
            })
    }

    /// The exchange matrix of a density matrix in the active space.
    fn exchange(&self, density: &Array2<f64>) -> Result<Array2<f64>, anyhow::Error> {
        einsum("prqs,rs->pq", &[&self.tei.view(), &density.view()])
            .map_err(|err| format_err!(err))
            .and_then(|k| {
                k.into_dimensionality::<Ix2>()
                    .map_err(|err| format_err!(err))
            })
    }

    /// Solves the cluster at the restricted mean-field level.
    ///
    /// The chemical potential enters the self-consistent equations on the
    /// fragment diagonal only; it is excluded from the reported energies.
    fn rhf(&self) -> Result<ClusterSolution, anyhow::Error> {
        let n_pairs = self.n_electrons / 2;
        let mut h = &self.oei + &self.core_jk;
        for p in 0..self.n_impurity {
            h[(p, p)] -= self.chemical_potential;
        }

        let mut density = self.dm_guess.clone();
        let mut converged = false;
        for _ in 0..SCF_MAX_CYCLES {
            let j = self.coulomb(&density)?;
            let k = self.exchange(&density)?;
            let fock = &h + &j - 0.5 * &k;
            let (_, orbitals) = fock
                .eigh(UPLO::Lower)
                .map_err(|err| format_err!("Diagonalization of the embedded Fock operator failed: {err}"))?;
            let occupied = orbitals.slice(s![.., 0..n_pairs]);
            let density_new = 2.0 * occupied.dot(&occupied.t());
            let delta = (&density_new - &density).norm_l2();
            density = SCF_MIXING * &density + (1.0 - SCF_MIXING) * &density_new;
            if delta < SCF_THRESHOLD {
                density = density_new;
                converged = true;
                break;
            }
        }
        if !converged {
            bail!(
                "The embedded mean-field solver failed to converge within {SCF_MAX_CYCLES} cycles."
            );
        }

        let j = self.coulomb(&density)?;
        let k = self.exchange(&density)?;
        let jk = &j - 0.5 * &k;
        let h_bare = &self.oei + &self.core_jk;
        let embedding_energy = (&density * &h_bare).sum() + 0.5 * (&density * &jk).sum();

        // Democratic fragment partitioning: only the fragment rows of the
        // density contribute, with the frozen-core and two-electron terms
        // halved to avoid double counting across fragments.
        let frag = s![0..self.n_impurity, ..];
        let d_frag = density.slice(frag);
        let h_frag = self.oei.slice(frag).to_owned() + 0.5 * &self.core_jk.slice(frag);
        let impurity_energy =
            (&d_frag * &h_frag).sum() + 0.5 * (&d_frag * &jk.slice(frag)).sum();

        Ok(ClusterSolution {
            impurity_energy,
            embedding_energy,
            density_matrix: density,
        })
    }
}
