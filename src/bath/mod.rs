//! Bath-orbital decompositions.
//!
//! Given a fragment and the mean-field solution, these routines split the
//! environment orbitals into bath orbitals, which are retained in the active
//! embedding space, and frozen environment orbitals. The returned basis is
//! orthonormal and ordered so that the active space
//! [fragment | bath] is a leading column block.

use std::fmt;

use anyhow::{self, ensure, format_err};
use itertools::Itertools;
use ndarray::{s, Array1, Array2};
use ndarray_linalg::{Eigh, SVD, UPLO};
use serde::{Deserialize, Serialize};


/// Singular values below this threshold mark occupied orbitals with no
/// fragment component in the overlap decomposition.
const OVERLAP_SINGULAR_CUTOFF: f64 = 1e-10;

// ==================
// Enum definitions
// ==================

/// An enumerated type for the bath-decomposition method.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BathKind {
    /// Variant diagonalizing the environment block of the mean-field density
    /// matrix and selecting the eigenvectors with occupation closest to one.
    OccupationNumber,

    /// Variant constructing bath orbitals from the environment components of
    /// the occupied orbitals overlapping the fragment.
    Overlap,
}

impl fmt::Display for BathKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BathKind::OccupationNumber => write!(f, "occupation number"),
            BathKind::Overlap => write!(f, "occupied-orbital overlap"),
        }
    }
}

/// An enumerated type carrying the method-specific outcome of a bath
/// decomposition.
#[derive(Clone, Debug)]
pub enum BathSpectrum {
    /// Variant for the occupation-number method: the occupations of all basis
    /// columns, zero across the active block and the environment eigenvalues
    /// elsewhere.
    CoreOccupations(Array1<f64>),

    /// Variant for the overlap method: the number of doubly occupied frozen
    /// environment orbitals following the active block.
    EnvironmentPartition { n_core: usize },
}

// ==================
// Struct definitions
// ==================

/// A structure holding an orthonormal embedding basis produced by a bath
/// decomposition.
#[derive(Clone, Debug)]
pub struct BathDecomposition {
    /// The number of bath orbitals retained.
    pub n_bath: usize,

    /// The full orthonormal basis with columns ordered as
    /// [fragment | bath | frozen environment].
    pub basis: Array2<f64>,

    /// The method-specific spectrum information.
    pub spectrum: BathSpectrum,
}

/// Decomposes the environment of a fragment into bath and frozen orbitals.
///
/// # Arguments
///
/// * `kind` - The decomposition method.
/// * `fragment` - Orbital labels with `1` marking fragment orbitals.
/// * `n_bath` - The requested number of bath orbitals.
/// * `orbitals` - The mean-field orbital coefficients in the orthonormal
///   basis (used by the overlap method).
/// * `density` - The mean-field one-particle density matrix in the
///   orthonormal basis (used by the occupation-number method).
/// * `n_pairs` - The number of doubly occupied mean-field levels.
pub fn decompose(
    kind: BathKind,
    fragment: &[usize],
    n_bath: usize,
    orbitals: &Array2<f64>,
    density: &Array2<f64>,
    n_pairs: usize,
) -> Result<BathDecomposition, anyhow::Error> {
    match kind {
        BathKind::OccupationNumber => occupation_number_decomposition(fragment, n_bath, density),
        BathKind::Overlap => overlap_decomposition(fragment, n_bath, orbitals, n_pairs),
    }
}

/// Diagonalizes the environment block of the mean-field density matrix; the
/// `n_bath` eigenvectors with occupation farthest from 0 and 2 become bath
/// orbitals, the remaining environment eigenvectors are frozen with their
/// occupations reported.
fn occupation_number_decomposition(
    fragment: &[usize],
    n_bath: usize,
    density: &Array2<f64>,
) -> Result<BathDecomposition, anyhow::Error> {
    let n_orbitals = fragment.len();
    let (frag_idx, env_idx) = partition_indices(fragment);
    let n_imp = frag_idx.len();
    let n_env = env_idx.len();
    ensure!(
        n_bath <= n_env,
        "{n_bath} bath orbitals requested but the environment only has {n_env} orbitals."
    );

    let mut env_density = Array2::<f64>::zeros((n_env, n_env));
    for (i, &p) in env_idx.iter().enumerate() {
        for (j, &q) in env_idx.iter().enumerate() {
            env_density[(i, j)] = density[(p, q)];
        }
    }
    let (occupations, vectors) = env_density
        .eigh(UPLO::Lower)
        .map_err(|err| format_err!("Diagonalization of the environment density failed: {err}"))?;

    // Entanglement order: occupation closest to one first.
    let order = (0..n_env)
        .sorted_by(|&i, &j| {
            (occupations[i] - 1.0)
                .abs()
                .partial_cmp(&(occupations[j] - 1.0).abs())
                .expect("Unable to compare environment occupations.")
        })
        .collect_vec();

    let n_active = n_imp + n_bath;
    let mut basis = Array2::<f64>::zeros((n_orbitals, n_orbitals));
    for (col, &p) in frag_idx.iter().enumerate() {
        basis[(p, col)] = 1.0;
    }
    let mut core_occupations = Array1::<f64>::zeros(n_orbitals);
    for (rank, &v) in order.iter().enumerate() {
        let col = n_imp + rank;
        for (i, &p) in env_idx.iter().enumerate() {
            basis[(p, col)] = vectors[(i, v)];
        }
        if col >= n_active {
            core_occupations[col] = occupations[v];
        }
    }

    Ok(BathDecomposition {
        n_bath,
        basis,
        spectrum: BathSpectrum::CoreOccupations(core_occupations),
    })
}

/// Rotates the occupied orbitals by the right singular vectors of their
/// fragment rows; the environment components of the fragment-entangled
/// occupieds become bath orbitals and the fragment-free occupieds become the
/// frozen doubly occupied core.
fn overlap_decomposition(
    fragment: &[usize],
    n_bath: usize,
    orbitals: &Array2<f64>,
    n_pairs: usize,
) -> Result<BathDecomposition, anyhow::Error> {
    let n_orbitals = fragment.len();
    let (frag_idx, env_idx) = partition_indices(fragment);
    let n_imp = frag_idx.len();
    let n_env = env_idx.len();

    let occupied = orbitals.slice(s![.., 0..n_pairs]);
    let mut frag_rows = Array2::<f64>::zeros((n_imp, n_pairs));
    for (i, &p) in frag_idx.iter().enumerate() {
        frag_rows.row_mut(i).assign(&occupied.row(p));
    }
    let (_, singular_values, vt) = frag_rows
        .svd(false, true)
        .map_err(|err| format_err!("SVD of the fragment-occupied overlap failed: {err}"))?;
    let vt = vt.ok_or_else(|| format_err!("Missing right singular vectors."))?;
    let rotated = occupied.dot(&vt.t());

    let n_entangled = singular_values
        .iter()
        .filter(|&&s| s > OVERLAP_SINGULAR_CUTOFF && s < 1.0 - OVERLAP_SINGULAR_CUTOFF)
        .count();
    ensure!(
        n_entangled <= n_bath,
        "{n_entangled} fragment-entangled occupied orbitals found but only {n_bath} bath orbitals were requested."
    );
    let n_bath = n_entangled;

    // Environment components of the entangled occupieds, normalized; they are
    // mutually orthogonal because the rotated fragment rows are.
    let mut bath_vectors: Vec<Array1<f64>> = Vec::new();
    let mut core_vectors: Vec<Array1<f64>> = Vec::new();
    for j in 0..n_pairs {
        let mut env_part = Array1::<f64>::zeros(n_env);
        for (i, &p) in env_idx.iter().enumerate() {
            env_part[i] = rotated[(p, j)];
        }
        let norm = env_part.dot(&env_part).sqrt();
        let s = singular_values.get(j).cloned().unwrap_or(0.0);
        if s > OVERLAP_SINGULAR_CUTOFF && s < 1.0 - OVERLAP_SINGULAR_CUTOFF {
            bath_vectors.push(&env_part / norm);
        } else if s <= OVERLAP_SINGULAR_CUTOFF {
            // A fragment-free occupied orbital lives entirely in the
            // environment and freezes as core.
            core_vectors.push(&env_part / norm);
        }
        // Occupieds fully inside the fragment contribute no environment
        // orbital.
    }
    let n_core = core_vectors.len();
    let env_vectors = bath_vectors
        .into_iter()
        .chain(core_vectors)
        .collect_vec();

    // Complete the environment space with the orthogonal complement of the
    // bath and core vectors.
    let n_known = env_vectors.len();
    let mut projector = Array2::<f64>::eye(n_env);
    for v in env_vectors.iter() {
        let outer = v
            .view()
            .insert_axis(ndarray::Axis(1))
            .dot(&v.view().insert_axis(ndarray::Axis(0)));
        projector -= &outer;
    }
    let (proj_eigs, proj_vecs) = projector
        .eigh(UPLO::Lower)
        .map_err(|err| format_err!("Diagonalization of the complement projector failed: {err}"))?;
    let complement = (0..n_env)
        .filter(|&i| proj_eigs[i] > 0.5)
        .collect_vec();
    ensure!(
        n_known + complement.len() == n_env,
        "The environment complement has rank {} but {} orbitals are unaccounted for.",
        complement.len(),
        n_env - n_known
    );

    let mut basis = Array2::<f64>::zeros((n_orbitals, n_orbitals));
    for (col, &p) in frag_idx.iter().enumerate() {
        basis[(p, col)] = 1.0;
    }
    // Bath first, then frozen core, then the virtual environment complement.
    for (rank, v) in env_vectors.iter().enumerate() {
        let col = n_imp + rank;
        for (i, &p) in env_idx.iter().enumerate() {
            basis[(p, col)] = v[i];
        }
    }
    for (rank, &ci) in complement.iter().enumerate() {
        let col = n_imp + n_known + rank;
        for (i, &p) in env_idx.iter().enumerate() {
            basis[(p, col)] = proj_vecs[(i, ci)];
        }
    }

    Ok(BathDecomposition {
        n_bath,
        basis,
        spectrum: BathSpectrum::EnvironmentPartition { n_core },
    })
}

/// Splits orbital indices into fragment and environment lists.
fn partition_indices(fragment: &[usize]) -> (Vec<usize>, Vec<usize>) {
    let frag_idx = fragment
        .iter()
        .enumerate()
        .filter(|(_, &l)| l == 1)
        .map(|(p, _)| p)
        .collect_vec();
    let env_idx = fragment
        .iter()
        .enumerate()
        .filter(|(_, &l)| l == 0)
        .map(|(p, _)| p)
        .collect_vec();
    (frag_idx, env_idx)
}
