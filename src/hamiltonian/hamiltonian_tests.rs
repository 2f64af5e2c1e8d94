use approx::assert_abs_diff_eq;
use ndarray::{array, s, Array2, Array4};

use crate::hamiltonian::{OehKind, OrthoHamiltonian};

/// A tight-binding ring of `n` sites with hopping `t` and on-site Hubbard
/// repulsion `u`.
fn hubbard_ring(n: usize, t: f64, u: f64, n_electrons: usize) -> OrthoHamiltonian {
    let mut oei = Array2::<f64>::zeros((n, n));
    for p in 0..n {
        oei[(p, (p + 1) % n)] = -t;
        oei[((p + 1) % n, p)] = -t;
    }
    let mut tei = Array4::<f64>::zeros((n, n, n, n));
    for p in 0..n {
        tei[(p, p, p, p)] = u;
    }
    let fock = oei.clone();
    OrthoHamiltonian::new(oei, tei, fock, n_electrons, 0.0).unwrap()
}

#[test]
fn test_hamiltonian_construction_validation() {
    let oei = Array2::<f64>::zeros((2, 2));
    let tei = Array4::<f64>::zeros((2, 2, 2, 2));
    // Odd electron counts are rejected.
    assert!(OrthoHamiltonian::new(oei.clone(), tei.clone(), oei.clone(), 3, 0.0).is_err());
    // More pairs than orbitals are rejected.
    assert!(OrthoHamiltonian::new(oei.clone(), tei.clone(), oei.clone(), 6, 0.0).is_err());
    // Mismatched tensor shapes are rejected.
    let tei_bad = Array4::<f64>::zeros((3, 3, 3, 3));
    assert!(OrthoHamiltonian::new(oei.clone(), tei_bad, oei.clone(), 2, 0.0).is_err());
    assert!(OrthoHamiltonian::new(oei.clone(), tei, oei, 2, 0.0).is_ok());
}

#[test]
fn test_hamiltonian_ortho_density_idempotent() {
    let ham = hubbard_ring(6, 1.0, 0.0, 6);
    let umat = Array2::<f64>::zeros((6, 6));
    let (orbitals, density) = ham.construct_ortho_density(&umat, OehKind::Fock).unwrap();
    assert_eq!(orbitals.shape(), &[6, 6]);
    assert_abs_diff_eq!(density.diag().sum(), 6.0, epsilon = 1e-12);
    // An idempotent closed-shell density obeys D D = 2 D.
    let dd = density.dot(&density);
    for (a, b) in dd.iter().zip((2.0 * &density).iter()) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-10);
    }
    // Symmetric.
    for p in 0..6 {
        for q in 0..6 {
            assert_abs_diff_eq!(density[(p, q)], density[(q, p)], epsilon = 1e-12);
        }
    }
}

#[test]
fn test_hamiltonian_coulomb_exchange_hubbard() {
    let ham = hubbard_ring(4, 1.0, 2.0, 4);
    let umat = Array2::<f64>::zeros((4, 4));
    let (_, density) = ham.construct_ortho_density(&umat, OehKind::Core).unwrap();
    let j = ham.coulomb(&density).unwrap();
    let k = ham.exchange(&density).unwrap();
    // For an on-site-only interaction both J and K are diagonal with
    // J_pp = U n_p and K_pp = U n_p.
    for p in 0..4 {
        assert_abs_diff_eq!(j[(p, p)], 2.0 * density[(p, p)], epsilon = 1e-12);
        assert_abs_diff_eq!(k[(p, p)], 2.0 * density[(p, p)], epsilon = 1e-12);
        for q in 0..4 {
            if p != q {
                assert_abs_diff_eq!(j[(p, q)], 0.0, epsilon = 1e-12);
            }
        }
    }
}

#[test]
fn test_hamiltonian_embedded_transforms() {
    let ham = hubbard_ring(6, 1.0, 1.5, 6);
    let umat = Array2::<f64>::zeros((6, 6));
    let (orbitals, _) = ham.construct_ortho_density(&umat, OehKind::Fock).unwrap();
    // Use the first four orbitals as a mock active embedding space.
    let basis = orbitals.slice(s![.., 0..4]);

    let oei_emb = ham.embedded_oei(basis);
    assert_eq!(oei_emb.shape(), &[4, 4]);
    // The transform of the diagonalized operator is diagonal in its own
    // eigenbasis.
    for i in 0..4 {
        for j in 0..4 {
            if i != j {
                assert_abs_diff_eq!(oei_emb[(i, j)], 0.0, epsilon = 1e-10);
            }
        }
    }

    let tei_emb = ham.embedded_tei(basis).unwrap();
    assert_eq!(tei_emb.shape(), &[4, 4, 4, 4]);
    // Chemists' notation keeps the (ij|kl) = (ji|kl) = (ij|lk) symmetry.
    for i in 0..4 {
        for j in 0..4 {
            for k in 0..4 {
                for l in 0..4 {
                    assert_abs_diff_eq!(
                        tei_emb[(i, j, k, l)],
                        tei_emb[(j, i, k, l)],
                        epsilon = 1e-10
                    );
                    assert_abs_diff_eq!(
                        tei_emb[(i, j, k, l)],
                        tei_emb[(i, j, l, k)],
                        epsilon = 1e-10
                    );
                }
            }
        }
    }
}

#[test]
fn test_hamiltonian_core_energy_non_interacting() {
    let ham = hubbard_ring(4, 1.0, 0.0, 4);
    let core = array![
        [2.0, 0.0, 0.0, 0.0],
        [0.0, 0.0, 0.0, 0.0],
        [0.0, 0.0, 0.0, 0.0],
        [0.0, 0.0, 0.0, 0.0]
    ];
    // Without two-electron terms the core energy reduces to tr(D h).
    let e_core = ham.core_energy(&core).unwrap();
    assert_abs_diff_eq!(e_core, (core.dot(ham.oei())).diag().sum(), epsilon = 1e-12);
}
