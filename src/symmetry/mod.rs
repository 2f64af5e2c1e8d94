//! Symmetry-aware reduction of the fragment list.
//!
//! Fragments sharing a symmetry label are physically equivalent: only one
//! representative per equivalence class is solved explicitly, and its results
//! are broadcast to the full fragment list afterwards.

use anyhow::{self, bail, ensure};
use itertools::Itertools;
use serde::{Deserialize, Serialize};


// ==================
// Enum definitions
// ==================

/// An enumerated type specifying how fragments are related by symmetry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymmetrySpec {
    /// Variant indicating that all fragments are independent.
    NoSymmetry,

    /// Variant indicating a uniform lattice of identical fragments: only the
    /// first fragment is solved and its correlation-potential block tiles the
    /// entire diagonal.
    Translational,

    /// Variant carrying one integer label per fragment; fragments with equal
    /// labels are symmetry-equivalent.
    Custom(Vec<usize>),
}

/// An enumerated type for the symmetry mode decided once at construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymmetryMode {
    /// Variant for fully independent fragments.
    None,

    /// Variant for translational symmetry collapsed to a single
    /// representative fragment.
    Translational,

    /// Variant for user-supplied equivalence labels.
    Custom,
}

// ==================
// Struct definitions
// ==================

/// A structure containing the symmetry reduction of a fragment partition of
/// an orthonormal orbital space.
///
/// Fragment $`f`$ is required to occupy the contiguous orbital range starting
/// at the sum of the sizes of all preceding fragments, which is what the
/// block structure of the correlation potential relies on.
#[derive(Clone, Debug)]
pub struct SymmetryMap {
    /// The symmetry mode.
    mode: SymmetryMode,

    /// The total number of orbitals.
    n_orbitals: usize,

    /// The number of fragments in the full partition, before any translational
    /// collapse.
    n_fragments: usize,

    /// The number of orbitals in each fragment of the full partition.
    fragment_sizes: Vec<usize>,

    /// The orbital offset of each fragment of the full partition.
    fragment_offsets: Vec<usize>,

    /// The symmetry label of each effective fragment. Under translational
    /// symmetry this collapses to a single entry.
    labels: Vec<usize>,

    /// The sorted set of inequivalent labels.
    irreducible_labels: Vec<usize>,

    /// For each effective fragment, the position of its label in
    /// [`Self::irreducible_labels`].
    inverse_indices: Vec<usize>,

    /// For each irreducible label, the index of the first fragment carrying
    /// that label.
    representatives: Vec<usize>,
}

impl SymmetryMap {
    /// Constructs a symmetry map from a fragment partition and a symmetry
    /// specification.
    ///
    /// # Arguments
    ///
    /// * `fragments` - One orbital-label vector per fragment, each of length
    ///   equal to the total orbital count, with `1` marking a fragment orbital
    ///   and `0` an environment orbital.
    /// * `spec` - The symmetry specification.
    ///
    /// # Errors
    ///
    /// Errors if the partition is empty or inconsistent, if a custom label
    /// list has the wrong length, or if translational symmetry is requested
    /// for a fragment size that does not divide the orbital count.
    pub fn new(fragments: &[Vec<usize>], spec: &SymmetrySpec) -> Result<Self, anyhow::Error> {
        ensure!(!fragments.is_empty(), "No fragments specified.");
        let n_orbitals = fragments[0].len();
        ensure!(n_orbitals > 0, "No orbitals specified.");

        let n_fragments = fragments.len();
        let mut fragment_sizes = Vec::with_capacity(n_fragments);
        let mut fragment_offsets = Vec::with_capacity(n_fragments);
        let mut offset = 0;
        for (f, fragment) in fragments.iter().enumerate() {
            ensure!(
                fragment.len() == n_orbitals,
                "Fragment {f} labels {} orbitals, but the partition has {n_orbitals}.",
                fragment.len()
            );
            let size = fragment.iter().filter(|&&l| l == 1).count();
            ensure!(size > 0, "Fragment {f} contains no fragment orbitals.");
            ensure!(
                fragment.iter().all(|&l| l <= 1),
                "Fragment {f} contains orbital labels other than 0 and 1."
            );
            ensure!(
                fragment
                    .iter()
                    .enumerate()
                    .all(|(p, &l)| (l == 1) == (offset <= p && p < offset + size)),
                "Fragment {f} does not occupy the contiguous orbital range [{offset}, {}).",
                offset + size
            );
            fragment_sizes.push(size);
            fragment_offsets.push(offset);
            offset += size;
        }

        let (mode, labels) = match spec {
            SymmetrySpec::NoSymmetry => (SymmetryMode::None, (0..n_fragments).collect_vec()),
            SymmetrySpec::Translational => {
                ensure!(
                    fragment_sizes.iter().all_equal(),
                    "Translational symmetry requires all fragments to have the same size."
                );
                if n_orbitals % fragment_sizes[0] != 0 {
                    bail!(
                        "Translational symmetry requires the fragment size {} to divide the orbital count {n_orbitals}.",
                        fragment_sizes[0]
                    );
                }
                (SymmetryMode::Translational, vec![0])
            }
            SymmetrySpec::Custom(labels) => {
                ensure!(
                    labels.len() == n_fragments,
                    "{} symmetry labels specified for {n_fragments} fragments.",
                    labels.len()
                );
                (SymmetryMode::Custom, labels.clone())
            }
        };

        let irreducible_labels = labels.iter().cloned().sorted().dedup().collect_vec();
        let inverse_indices = labels
            .iter()
            .map(|label| {
                irreducible_labels
                    .binary_search(label)
                    .expect("Unable to locate a fragment label in the irreducible label set.")
            })
            .collect_vec();
        let representatives = irreducible_labels
            .iter()
            .map(|label| {
                labels
                    .iter()
                    .position(|l| l == label)
                    .expect("Unable to locate a representative fragment for a label.")
            })
            .collect_vec();

        Ok(Self {
            mode,
            n_orbitals,
            n_fragments,
            fragment_sizes,
            fragment_offsets,
            labels,
            irreducible_labels,
            inverse_indices,
            representatives,
        })
    }

    /// The symmetry mode.
    pub fn mode(&self) -> SymmetryMode {
        self.mode
    }

    /// The total number of orbitals.
    pub fn n_orbitals(&self) -> usize {
        self.n_orbitals
    }

    /// The number of fragments in the full partition, before any translational
    /// collapse.
    pub fn n_fragments(&self) -> usize {
        self.n_fragments
    }

    /// The number of effective fragments after any translational collapse.
    pub fn n_effective_fragments(&self) -> usize {
        self.labels.len()
    }

    /// The number of inequivalent fragments.
    pub fn n_irreducible(&self) -> usize {
        self.irreducible_labels.len()
    }

    /// The symmetry label of each effective fragment.
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// The orbital counts of the fragments of the full partition.
    pub fn fragment_sizes(&self) -> &[usize] {
        &self.fragment_sizes
    }

    /// The orbital offsets of the fragments of the full partition.
    pub fn fragment_offsets(&self) -> &[usize] {
        &self.fragment_offsets
    }

    /// For each effective fragment, the position of its equivalence class in
    /// the irreducible list.
    pub fn inverse_indices(&self) -> &[usize] {
        &self.inverse_indices
    }

    /// The representative fragment index of each equivalence class.
    pub fn representatives(&self) -> &[usize] {
        &self.representatives
    }

    /// The factor by which per-fragment quantities of the irreducible problem
    /// must be scaled to recover the full system: the fragment count when
    /// translational symmetry has collapsed the partition to one
    /// representative, and unity otherwise.
    pub fn multiplicity(&self) -> usize {
        match self.mode {
            SymmetryMode::Translational => self.n_fragments,
            _ => 1,
        }
    }

    /// Expands a per-irreducible-fragment array to the full effective fragment
    /// list by symmetry equivalence.
    pub fn broadcast<T: Clone>(&self, irreducible: &[T]) -> Vec<T> {
        assert_eq!(irreducible.len(), self.n_irreducible());
        self.inverse_indices
            .iter()
            .map(|&i| irreducible[i].clone())
            .collect_vec()
    }
}
