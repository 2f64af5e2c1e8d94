use approx::assert_abs_diff_eq;
use itertools::Itertools;
use ndarray::{s, Array1, Array2};
use proptest::prelude::*;

use crate::potential::{remove_mean_diagonal, FitMode, PotentialCodec, ResponseOperatorSet};
use crate::symmetry::{SymmetryMap, SymmetrySpec};

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
fn test_potential_codec_parameter_counts() {
    let fragments = ring_fragments(3, 3);
    let map = SymmetryMap::new(&fragments, &SymmetrySpec::NoSymmetry).unwrap();
    // Upper triangle of each 3x3 block: 6 entries per fragment.
    let codec = PotentialCodec::new(&map, FitMode::EmbeddingBasis).unwrap();
    assert_eq!(codec.n_params(), 18);
    let codec = PotentialCodec::new(&map, FitMode::FragmentDiagonal).unwrap();
    assert_eq!(codec.n_params(), 9);

    let map = SymmetryMap::new(&fragments, &SymmetrySpec::Translational).unwrap();
    let codec = PotentialCodec::new(&map, FitMode::EmbeddingBasis).unwrap();
    assert_eq!(codec.n_params(), 6);
}

#[test]
fn test_potential_codec_decode_symmetrizes() {
    let fragments = ring_fragments(2, 2);
    let map = SymmetryMap::new(&fragments, &SymmetrySpec::NoSymmetry).unwrap();
    let codec = PotentialCodec::new(&map, FitMode::EmbeddingBasis).unwrap();
    assert_eq!(codec.n_params(), 6);

    let uvec = Array1::from(vec![0.1, 0.2, 0.3, -0.4, -0.5, -0.6]);
    let umat = codec.decode(&uvec);
    assert_abs_diff_eq!(umat[(0, 1)], 0.2);
    assert_abs_diff_eq!(umat[(1, 0)], 0.2);
    assert_abs_diff_eq!(umat[(2, 3)], -0.5);
    assert_abs_diff_eq!(umat[(3, 2)], -0.5);
    // Off-block entries stay zero.
    assert_abs_diff_eq!(umat[(0, 2)], 0.0);
    assert_abs_diff_eq!(umat[(1, 3)], 0.0);
}

#[test]
fn test_potential_codec_translational_replication() {
    let fragments = ring_fragments(4, 2);
    let map = SymmetryMap::new(&fragments, &SymmetrySpec::Translational).unwrap();
    let codec = PotentialCodec::new(&map, FitMode::EmbeddingBasis).unwrap();

    let uvec = Array1::from(vec![1.0, -2.0, 3.0]);
    let umat = codec.decode(&uvec);
    let block0 = umat.slice(s![0..2, 0..2]).to_owned();
    for it in 1..4 {
        let block = umat.slice(s![2 * it..2 * it + 2, 2 * it..2 * it + 2]);
        assert_eq!(block, block0);
    }
}

#[test]
fn test_potential_codec_custom_replication() {
    let fragments = ring_fragments(4, 2);
    let map = SymmetryMap::new(&fragments, &SymmetrySpec::Custom(vec![0, 1, 0, 1])).unwrap();
    let codec = PotentialCodec::new(&map, FitMode::EmbeddingBasis).unwrap();
    assert_eq!(codec.n_params(), 6);
    assert_eq!(codec.redundant_blocks().len(), 2);

    let uvec = Array1::from(vec![1.0, 0.5, 2.0, -1.0, -0.5, -2.0]);
    let umat = codec.decode(&uvec);
    assert_eq!(
        umat.slice(s![4..6, 4..6]),
        umat.slice(s![0..2, 0..2]),
        "Fragment 2 must copy fragment 0."
    );
    assert_eq!(
        umat.slice(s![6..8, 6..8]),
        umat.slice(s![2..4, 2..4]),
        "Fragment 3 must copy fragment 1."
    );
}

#[test]
fn test_potential_codec_mask_matches_positions() {
    let fragments = ring_fragments(3, 2);
    let map = SymmetryMap::new(&fragments, &SymmetrySpec::Custom(vec![0, 0, 1])).unwrap();
    let codec = PotentialCodec::new(&map, FitMode::EmbeddingBasis).unwrap();
    let mask = codec.mask();
    let n_true = mask.iter().filter(|&&m| m).count();
    assert_eq!(n_true, codec.n_params());
    for &(r, c) in codec.positions() {
        assert!(mask[(r, c)]);
        assert!(r <= c);
    }
    // The redundant fragment's block carries no independent entries.
    assert!(!mask[(2, 2)] && !mask[(2, 3)] && !mask[(3, 3)]);
}

proptest! {
    #[test]
    fn test_potential_codec_roundtrip(values in proptest::collection::vec(-10.0f64..10.0, 9)) {
        let fragments = ring_fragments(3, 2);
        let map = SymmetryMap::new(&fragments, &SymmetrySpec::Custom(vec![0, 1, 0])).unwrap();
        let codec = PotentialCodec::new(&map, FitMode::EmbeddingBasis).unwrap();
        prop_assert_eq!(codec.n_params(), 6);
        let uvec = Array1::from(values[0..6].to_vec());
        let roundtrip = codec.encode(&codec.decode(&uvec));
        prop_assert_eq!(uvec, roundtrip);
    }

    #[test]
    fn test_potential_codec_roundtrip_diagonal(values in proptest::collection::vec(-5.0f64..5.0, 2)) {
        let fragments = ring_fragments(4, 2);
        let map = SymmetryMap::new(&fragments, &SymmetrySpec::Translational).unwrap();
        let codec = PotentialCodec::new(&map, FitMode::FragmentDiagonal).unwrap();
        prop_assert_eq!(codec.n_params(), 2);
        let uvec = Array1::from(values);
        let roundtrip = codec.encode(&codec.decode(&uvec));
        prop_assert_eq!(uvec, roundtrip);
    }
}

#[test]
fn test_potential_remove_mean_diagonal() {
    let mut umat = Array2::from_shape_vec((2, 2), vec![1.0, 0.5, 0.5, 3.0]).unwrap();
    remove_mean_diagonal(&mut umat);
    assert_abs_diff_eq!(umat[(0, 0)], -1.0);
    assert_abs_diff_eq!(umat[(1, 1)], 1.0);
    assert_abs_diff_eq!(umat[(0, 1)], 0.5);
    assert_abs_diff_eq!(umat.diag().sum(), 0.0, epsilon = 1e-14);
}

#[test]
fn test_potential_response_operators_match_codec_order() {
    let fragments = ring_fragments(4, 2);
    let map = SymmetryMap::new(&fragments, &SymmetrySpec::Custom(vec![0, 1, 0, 1])).unwrap();
    let codec = PotentialCodec::new(&map, FitMode::EmbeddingBasis).unwrap();
    let ops = ResponseOperatorSet::new(&map, FitMode::EmbeddingBasis);
    assert_eq!(ops.n_params(), codec.n_params());

    // Each parameter's positions must contain the codec's mask position and
    // its replicas in every equivalent block.
    for (k, &(r, c)) in codec.positions().iter().enumerate() {
        let entries = ops.positions(k).collect_vec();
        assert!(entries.contains(&(r, c)));
        if r != c {
            assert!(entries.contains(&(c, r)));
            // Two equivalent fragments, both triangles.
            assert_eq!(entries.len(), 4);
        } else {
            assert_eq!(entries.len(), 2);
        }
    }
}

#[test]
fn test_potential_response_operators_translational() {
    let fragments = ring_fragments(3, 1);
    let map = SymmetryMap::new(&fragments, &SymmetrySpec::Translational).unwrap();
    let ops = ResponseOperatorSet::new(&map, FitMode::EmbeddingBasis);
    assert_eq!(ops.n_params(), 1);
    let entries = ops.positions(0).collect_vec();
    assert_eq!(entries, vec![(0, 0), (1, 1), (2, 2)]);
}
