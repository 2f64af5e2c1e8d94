//! The molecular Hamiltonian in an orthonormal one-particle basis and its
//! transforms into fragment embedding bases.
//!
//! Basis orthogonalization itself is performed upstream: this structure
//! receives the one- and two-electron integral tensors, the converged
//! reference Fock operator and the electron count already expressed in an
//! orthonormal basis.

use std::fmt;

use anyhow::{self, ensure, format_err};
use ndarray::{s, Array2, Array4, ArrayView2, Ix2, Ix4};
use ndarray_einsum_beta::einsum;
use ndarray_linalg::{Eigh, UPLO};
use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "hamiltonian_tests.rs"]
mod hamiltonian_tests;

// ==================
// Enum definitions
// ==================

/// An enumerated type for the one-electron operator to which the correlation
/// potential is added when constructing the mean-field density.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OehKind {
    /// Variant for the converged reference Fock operator.
    Fock,

    /// Variant for the bare core one-electron Hamiltonian.
    Core,
}

impl fmt::Display for OehKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OehKind::Fock => write!(f, "Fock operator"),
            OehKind::Core => write!(f, "core Hamiltonian"),
        }
    }
}

// ==================
// Struct definitions
// ==================

/// A structure holding the electronic Hamiltonian of a closed-shell system in
/// an orthonormal one-particle basis.
#[derive(Clone, Debug)]
pub struct OrthoHamiltonian {
    /// The one-electron integrals.
    oei: Array2<f64>,

    /// The two-electron integrals in chemists' notation, $`(pq|rs)`$.
    tei: Array4<f64>,

    /// The converged reference Fock operator.
    fock: Array2<f64>,

    /// The total number of electrons.
    n_electrons: usize,

    /// The nuclear repulsion energy.
    e_nuclear: f64,
}

impl OrthoHamiltonian {
    /// Constructs a Hamiltonian from integral tensors in an orthonormal
    /// basis.
    ///
    /// # Arguments
    ///
    /// * `oei` - The one-electron integrals.
    /// * `tei` - The two-electron integrals, $`(pq|rs)`$.
    /// * `fock` - The converged reference Fock operator.
    /// * `n_electrons` - The total electron count; must be even.
    /// * `e_nuclear` - The nuclear repulsion energy.
    pub fn new(
        oei: Array2<f64>,
        tei: Array4<f64>,
        fock: Array2<f64>,
        n_electrons: usize,
        e_nuclear: f64,
    ) -> Result<Self, anyhow::Error> {
        let n = oei.nrows();
        ensure!(oei.is_square(), "The one-electron integrals are not square.");
        ensure!(
            tei.shape() == [n, n, n, n],
            "The two-electron integral tensor does not match the orbital count {n}."
        );
        ensure!(
            fock.shape() == [n, n],
            "The Fock operator does not match the orbital count {n}."
        );
        ensure!(
            n_electrons % 2 == 0,
            "A closed-shell system requires an even electron count; got {n_electrons}."
        );
        ensure!(
            n_electrons / 2 <= n,
            "{n_electrons} electrons cannot doubly occupy {n} orbitals."
        );
        Ok(Self {
            oei,
            tei,
            fock,
            n_electrons,
            e_nuclear,
        })
    }

    /// The number of orbitals.
    pub fn n_orbitals(&self) -> usize {
        self.oei.nrows()
    }

    /// The total number of electrons.
    pub fn n_electrons(&self) -> usize {
        self.n_electrons
    }

    /// The number of doubly occupied levels.
    pub fn n_pairs(&self) -> usize {
        self.n_electrons / 2
    }

    /// The nuclear repulsion energy.
    pub fn e_nuclear(&self) -> f64 {
        self.e_nuclear
    }

    /// The one-electron integrals.
    pub fn oei(&self) -> &Array2<f64> {
        &self.oei
    }

    /// The two-electron integrals.
    pub fn tei(&self) -> &Array4<f64> {
        &self.tei
    }

    /// The converged reference Fock operator.
    pub fn fock(&self) -> &Array2<f64> {
        &self.fock
    }

    /// The one-electron operator selected by `oeh_kind`.
    pub fn one_electron_operator(&self, oeh_kind: OehKind) -> &Array2<f64> {
        match oeh_kind {
            OehKind::Fock => &self.fock,
            OehKind::Core => &self.oei,
        }
    }

    /// The Coulomb matrix $`J_{pq} = \sum_{rs} (pq|rs) D_{rs}`$ of a density
    /// matrix.
    pub fn coulomb(&self, density: &Array2<f64>) -> Result<Array2<f64>, anyhow::Error> {
        einsum("pqrs,rs->pq", &[&self.tei.view(), &density.view()])
            .map_err(|err| format_err!(err))
            .and_then(|j| {
                j.into_dimensionality::<Ix2>()
                    .map_err(|err| format_err!(err))
            })
    }

    /// The exchange matrix $`K_{pq} = \sum_{rs} (pr|qs) D_{rs}`$ of a density
    /// matrix.
    pub fn exchange(&self, density: &Array2<f64>) -> Result<Array2<f64>, anyhow::Error> {
        einsum("prqs,rs->pq", &[&self.tei.view(), &density.view()])
            .map_err(|err| format_err!(err))
            .and_then(|k| {
                k.into_dimensionality::<Ix2>()
                    .map_err(|err| format_err!(err))
            })
    }

    /// Diagonalizes the chosen one-electron operator augmented by a
    /// correlation potential and doubly occupies the lowest electron-pair
    /// levels.
    ///
    /// # Arguments
    ///
    /// * `umat` - The correlation potential.
    /// * `oeh_kind` - The one-electron operator the potential is added to.
    ///
    /// # Returns
    ///
    /// The orbital coefficients (eigenvectors in ascending eigenvalue order)
    /// and the idempotent one-particle density matrix.
    pub fn construct_ortho_density(
        &self,
        umat: &Array2<f64>,
        oeh_kind: OehKind,
    ) -> Result<(Array2<f64>, Array2<f64>), anyhow::Error> {
        ensure!(
            umat.shape() == self.oei.shape(),
            "The correlation potential does not match the orbital count {}.",
            self.n_orbitals()
        );
        let h_eff = self.one_electron_operator(oeh_kind) + umat;
        let (_, orbitals) = h_eff
            .eigh(UPLO::Lower)
            .map_err(|err| format_err!("Diagonalization of the one-electron operator failed: {err}"))?;
        let occupied = orbitals.slice(s![.., 0..self.n_pairs()]);
        let density = 2.0 * occupied.dot(&occupied.t());
        Ok((orbitals, density))
    }

    /// Transforms the one-electron integrals into the active block of an
    /// embedding basis.
    ///
    /// # Arguments
    ///
    /// * `basis` - The active embedding orbitals as columns.
    pub fn embedded_oei(&self, basis: ArrayView2<f64>) -> Array2<f64> {
        basis.t().dot(&self.oei).dot(&basis)
    }

    /// Transforms the two-electron integrals into the active block of an
    /// embedding basis, one index at a time.
    pub fn embedded_tei(&self, basis: ArrayView2<f64>) -> Result<Array4<f64>, anyhow::Error> {
        let step = |tensor: &Array4<f64>, script: &str| {
            einsum(script, &[&tensor.view(), &basis])
                .map_err(|err| format_err!(err))
                .and_then(|t| {
                    t.into_dimensionality::<Ix4>()
                        .map_err(|err| format_err!(err))
                })
        };
        let t = step(&self.tei, "pqrs,pi->qrsi")?;
        let t = step(&t, "qrsi,qj->rsij")?;
        let t = step(&t, "rsij,rk->sijk")?;
        step(&t, "sijk,sl->ijkl")
    }

    /// Transforms the frozen-core Coulomb/exchange contribution into the
    /// active block of an embedding basis.
    ///
    /// # Arguments
    ///
    /// * `basis` - The active embedding orbitals as columns.
    /// * `core_density` - The frozen-core density matrix in the orthonormal
    ///   basis.
    pub fn embedded_core_jk(
        &self,
        basis: ArrayView2<f64>,
        core_density: &Array2<f64>,
    ) -> Result<Array2<f64>, anyhow::Error> {
        let jk = self.coulomb(core_density)? - 0.5 * self.exchange(core_density)?;
        Ok(basis.t().dot(&jk).dot(&basis))
    }

    /// The energy of a frozen environment density,
    /// $`E_{\mathrm{core}} = \tfrac{1}{2} \sum_{pq} D^{\mathrm{core}}_{pq}
    /// \left( 2 h_{pq} + J[D^{\mathrm{core}}]_{pq} - \tfrac{1}{2}
    /// K[D^{\mathrm{core}}]_{pq} \right)`$.
    pub fn core_energy(&self, core_density: &Array2<f64>) -> Result<f64, anyhow::Error> {
        let jk = self.coulomb(core_density)? - 0.5 * self.exchange(core_density)?;
        Ok(0.5 * (core_density * &(2.0 * &self.oei + jk)).sum())
    }
}
