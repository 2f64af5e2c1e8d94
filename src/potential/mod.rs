//! Compressed parameterization of the correlation potential.
//!
//! The correlation potential is a symmetric matrix restricted to fragment
//! diagonal blocks. Its independent degrees of freedom are the mask-selected
//! entries of the blocks of the symmetry-inequivalent fragments; all other
//! entries are derived by symmetrization and symmetry replication.

use std::fmt;

use anyhow::{self, ensure};
use itertools::Itertools;
use ndarray::{s, Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::symmetry::{SymmetryMap, SymmetryMode};

#[cfg(test)]
#[path = "potential_tests.rs"]
mod potential_tests;

// ==================
// Enum definitions
// ==================

/// An enumerated type for the subset of the density-matrix mismatch that
/// defines the correlation-potential fit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitMode {
    /// Variant fitting the full density matrix in the entire embedding basis.
    EmbeddingBasis,

    /// Variant fitting only the diagonal of the density matrix in the entire
    /// embedding basis.
    EmbeddingBasisDiagonal,

    /// Variant fitting the density matrix restricted to the fragment block.
    Fragment,

    /// Variant fitting only the diagonal of the fragment block.
    FragmentDiagonal,
}

impl FitMode {
    /// Boolean indicating if only diagonal matrix entries enter the fit.
    pub fn diagonal_only(&self) -> bool {
        matches!(self, Self::EmbeddingBasisDiagonal | Self::FragmentDiagonal)
    }

    /// Boolean indicating if the fit is restricted to the fragment block of
    /// the embedding basis.
    pub fn fragment_only(&self) -> bool {
        matches!(self, Self::Fragment | Self::FragmentDiagonal)
    }
}

impl fmt::Display for FitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitMode::EmbeddingBasis => write!(f, "embedding basis"),
            FitMode::EmbeddingBasisDiagonal => write!(f, "embedding basis (diagonal)"),
            FitMode::Fragment => write!(f, "fragment block"),
            FitMode::FragmentDiagonal => write!(f, "fragment block (diagonal)"),
        }
    }
}

// ==================
// Struct definitions
// ==================

/// A structure recording that one fragment's potential block is a copy of a
/// symmetry-equivalent fragment's block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedundantBlock {
    /// The orbital offset of the derived block.
    pub dst_offset: usize,

    /// The orbital offset of the source block.
    pub src_offset: usize,

    /// The number of orbitals in the block.
    pub size: usize,
}

/// A structure bijecting between the compressed correlation-potential
/// parameter vector and the full symmetric potential matrix.
#[derive(Clone, Debug)]
pub struct PotentialCodec {
    /// The symmetry mode governing block replication.
    mode: SymmetryMode,

    /// The total number of orbitals.
    n_orbitals: usize,

    /// The number of fragments tiling the orbital space under translational
    /// replication.
    n_fragments: usize,

    /// The mask-selected matrix positions in their stable row-major
    /// enumeration order, one per independent parameter.
    positions: Vec<(usize, usize)>,

    /// The blocks derived by copying from their symmetry representative.
    redundant: Vec<RedundantBlock>,
}

impl PotentialCodec {
    /// Constructs the codec for a given symmetry map and fit mode.
    ///
    /// The mask selects the upper triangle (or only the diagonal, for
    /// diagonal fit modes) of the potential block of each equivalence class's
    /// representative fragment.
    pub fn new(map: &SymmetryMap, fit_mode: FitMode) -> Result<Self, anyhow::Error> {
        let sizes = map.fragment_sizes();
        let offsets = map.fragment_offsets();
        let labels = map.labels();

        let representatives = map.representatives().iter().cloned().sorted().collect_vec();

        let mut positions = Vec::new();
        for &f in representatives.iter() {
            let (start, size) = (offsets[f], sizes[f]);
            if fit_mode.diagonal_only() {
                for row in 0..size {
                    positions.push((start + row, start + row));
                }
            } else {
                for row in 0..size {
                    for col in row..size {
                        positions.push((start + row, start + col));
                    }
                }
            }
        }

        let mut redundant = Vec::new();
        for (f, label) in labels.iter().enumerate() {
            let rep = map.representatives()[map.inverse_indices()[f]];
            if f != rep {
                ensure!(
                    sizes[f] == sizes[rep],
                    "Fragments {f} and {rep} share the symmetry label {label} but have different sizes."
                );
                redundant.push(RedundantBlock {
                    dst_offset: offsets[f],
                    src_offset: offsets[rep],
                    size: sizes[f],
                });
            }
        }

        Ok(Self {
            mode: map.mode(),
            n_orbitals: map.n_orbitals(),
            n_fragments: map.n_fragments(),
            positions,
            redundant,
        })
    }

    /// The number of independent parameters.
    pub fn n_params(&self) -> usize {
        self.positions.len()
    }

    /// The mask-selected matrix positions in parameter order.
    pub fn positions(&self) -> &[(usize, usize)] {
        &self.positions
    }

    /// The blocks derived from their symmetry representatives.
    pub fn redundant_blocks(&self) -> &[RedundantBlock] {
        &self.redundant
    }

    /// The boolean mask over the full potential matrix selecting the
    /// independent entries.
    pub fn mask(&self) -> Array2<bool> {
        let mut mask = Array2::from_elem((self.n_orbitals, self.n_orbitals), false);
        for &(r, c) in self.positions.iter() {
            mask[(r, c)] = true;
        }
        mask
    }

    /// Extracts the parameter vector from a potential matrix at the
    /// mask-selected positions.
    pub fn encode(&self, umat: &Array2<f64>) -> Array1<f64> {
        Array1::from_iter(self.positions.iter().map(|&(r, c)| umat[(r, c)]))
    }

    /// Expands a parameter vector to the full symmetric correlation-potential
    /// matrix: scatter at the mask-selected positions, symmetrize, then
    /// replicate the derived blocks.
    pub fn decode(&self, uvec: &Array1<f64>) -> Array2<f64> {
        assert_eq!(uvec.len(), self.n_params());
        let mut umat = Array2::<f64>::zeros((self.n_orbitals, self.n_orbitals));
        for (&(r, c), &v) in self.positions.iter().zip(uvec.iter()) {
            umat[(r, c)] = v;
            umat[(c, r)] = v;
        }

        if self.mode == SymmetryMode::Translational {
            let size = self.n_orbitals / self.n_fragments;
            let block = umat.slice(s![0..size, 0..size]).to_owned();
            for it in 1..self.n_fragments {
                umat.slice_mut(s![
                    it * size..(it + 1) * size,
                    it * size..(it + 1) * size
                ])
                .assign(&block);
            }
        } else {
            for rb in self.redundant.iter() {
                let block = umat
                    .slice(s![
                        rb.src_offset..rb.src_offset + rb.size,
                        rb.src_offset..rb.src_offset + rb.size
                    ])
                    .to_owned();
                umat.slice_mut(s![
                    rb.dst_offset..rb.dst_offset + rb.size,
                    rb.dst_offset..rb.dst_offset + rb.size
                ])
                .assign(&block);
            }
        }
        umat
    }
}

/// Removes the average diagonal trace from a potential matrix in place.
///
/// The correlation potential is only meaningful up to a uniform diagonal
/// shift, which is absorbed into the chemical potential instead.
pub fn remove_mean_diagonal(umat: &mut Array2<f64>) {
    let mean = umat.diag().mean().unwrap_or(0.0);
    for p in 0..umat.nrows() {
        umat[(p, p)] -= mean;
    }
}

// --------------------
// Response operators
// --------------------

/// A structure enumerating, per independent parameter, the sparse matrix
/// positions of the corresponding correlation-potential derivative operator.
///
/// The positions of parameter `k` are `rows[starts[k]..starts[k + 1]]` paired
/// with `cols[starts[k]..starts[k + 1]]`. Symmetry-equivalent blocks
/// contribute their replicated positions to the same parameter, and
/// off-diagonal parameters carry both matrix triangles.
#[derive(Clone, Debug)]
pub struct ResponseOperatorSet {
    /// The offset of each parameter's position run; one extra trailing entry
    /// holds the total position count.
    starts: Vec<usize>,

    /// The row indices of all positions, concatenated in parameter order.
    rows: Vec<usize>,

    /// The column indices of all positions, concatenated in parameter order.
    cols: Vec<usize>,
}

impl ResponseOperatorSet {
    /// Constructs the sparse response-operator enumeration directly from the
    /// mask and symmetry structure, in the same parameter order as
    /// [`PotentialCodec::encode`].
    pub fn new(map: &SymmetryMap, fit_mode: FitMode) -> Self {
        let sizes = map.fragment_sizes();
        let offsets = map.fragment_offsets();
        let labels = map.labels();

        let representatives = map.representatives().iter().cloned().sorted().collect_vec();

        let mut starts = vec![0];
        let mut rows = Vec::new();
        let mut cols = Vec::new();

        let mut push_param = |entries: &[(usize, usize)]| {
            for &(r, c) in entries {
                rows.push(r);
                cols.push(c);
                if r != c {
                    rows.push(c);
                    cols.push(r);
                }
            }
            starts.push(rows.len());
        };

        for &f in representatives.iter() {
            let size = sizes[f];
            // All block offsets this parameter replicates into.
            let block_offsets = if map.mode() == SymmetryMode::Translational {
                (0..map.n_fragments()).map(|it| it * size).collect_vec()
            } else {
                labels
                    .iter()
                    .enumerate()
                    .filter(|(_, l)| **l == labels[f])
                    .map(|(g, _)| offsets[g])
                    .collect_vec()
            };

            if fit_mode.diagonal_only() {
                for row in 0..size {
                    let entries = block_offsets
                        .iter()
                        .map(|&start| (start + row, start + row))
                        .collect_vec();
                    push_param(&entries);
                }
            } else {
                for row in 0..size {
                    for col in row..size {
                        let entries = block_offsets
                            .iter()
                            .map(|&start| (start + row, start + col))
                            .collect_vec();
                        push_param(&entries);
                    }
                }
            }
        }

        Self { starts, rows, cols }
    }

    /// The number of parameters enumerated.
    pub fn n_params(&self) -> usize {
        self.starts.len() - 1
    }

    /// The (row, column) positions of parameter `k`.
    pub fn positions(&self, k: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        (self.starts[k]..self.starts[k + 1]).map(|i| (self.rows[i], self.cols[i]))
    }
}
