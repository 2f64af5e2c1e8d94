//! Linear response of the mean-field one-particle density matrix with respect
//! to the correlation-potential parameters.

use anyhow::{self, bail, ensure, format_err};
use ndarray::{s, Array2, Array3};
use ndarray_linalg::{Eigh, UPLO};

use crate::potential::ResponseOperatorSet;


/// Frontier levels closer than this are treated as degenerate, for which the
/// non-degenerate response expression is invalid.
const DEGENERACY_THRESHOLD: f64 = 1e-10;

/// Computes the derivative of the idempotent closed-shell density matrix with
/// respect to each correlation-potential parameter by first-order
/// perturbation theory,
///
/// ```math
/// \frac{\partial D}{\partial u_k} = 2 \sum_{i}^{\mathrm{occ}}
/// \sum_{a}^{\mathrm{virt}} \frac{\mathbf{c}_i^{\mathsf{T}} H^{(k)}
/// \mathbf{c}_a}{\varepsilon_i - \varepsilon_a} \left( \mathbf{c}_i
/// \mathbf{c}_a^{\mathsf{T}} + \mathbf{c}_a \mathbf{c}_i^{\mathsf{T}} \right),
/// ```
///
/// where $`H^{(k)}`$ is the sparse derivative operator of parameter `k`.
///
/// # Arguments
///
/// * `n_orbitals` - The total number of orbitals.
/// * `n_params` - The number of correlation-potential parameters.
/// * `n_pairs` - The number of doubly occupied levels.
/// * `operators` - The sparse response-operator enumeration.
/// * `effective_fock` - The one-electron operator including the current
///   correlation potential.
///
/// # Returns
///
/// A tensor of shape (`n_params`, `n_orbitals`, `n_orbitals`) whose slice `k`
/// is the density derivative with respect to parameter `k`.
pub fn rhf_response(
    n_orbitals: usize,
    n_params: usize,
    n_pairs: usize,
    operators: &ResponseOperatorSet,
    effective_fock: &Array2<f64>,
) -> Result<Array3<f64>, anyhow::Error> {
    ensure!(
        effective_fock.shape() == [n_orbitals, n_orbitals],
        "The effective Fock operator does not match the orbital count {n_orbitals}."
    );
    ensure!(
        operators.n_params() == n_params,
        "The operator set enumerates {} parameters but {n_params} were requested.",
        operators.n_params()
    );
    ensure!(
        0 < n_pairs && n_pairs < n_orbitals,
        "The response requires both occupied and virtual levels; got {n_pairs} pairs in {n_orbitals} orbitals."
    );

    let (energies, orbitals) = effective_fock
        .eigh(UPLO::Lower)
        .map_err(|err| format_err!("Diagonalization of the effective Fock operator failed: {err}"))?;
    if (energies[n_pairs] - energies[n_pairs - 1]).abs() < DEGENERACY_THRESHOLD {
        bail!(
            "Degenerate frontier levels (HOMO {:.6e}, LUMO {:.6e}): the mean-field density response is ill-defined.",
            energies[n_pairs - 1],
            energies[n_pairs]
        );
    }

    let occ = orbitals.slice(s![.., 0..n_pairs]);
    let virt = orbitals.slice(s![.., n_pairs..]);
    let n_virt = n_orbitals - n_pairs;

    let mut derivative = Array3::<f64>::zeros((n_params, n_orbitals, n_orbitals));
    for k in 0..n_params {
        // Apply the sparse operator to the orbitals: (H1 C)_{p,m}.
        let mut h1c = Array2::<f64>::zeros((n_orbitals, n_orbitals));
        for (r, c) in operators.positions(k) {
            let row = orbitals.row(c).to_owned();
            h1c.row_mut(r).scaled_add(1.0, &row);
        }
        // Occupied-virtual mixing amplitudes.
        let mixing = occ.t().dot(&h1c.slice(s![.., n_pairs..]));
        let mut amplitudes = Array2::<f64>::zeros((n_pairs, n_virt));
        for i in 0..n_pairs {
            for a in 0..n_virt {
                amplitudes[(i, a)] = mixing[(i, a)] / (energies[i] - energies[n_pairs + a]);
            }
        }
        let block = occ.dot(&amplitudes).dot(&virt.t());
        let d_k = 2.0 * (&block + &block.t());
        derivative.slice_mut(s![k, .., ..]).assign(&d_k);
    }
    Ok(derivative)
}
