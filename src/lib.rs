//! # MDMET: Molecular Density Matrix Embedding Theory
//!
//! MDMET partitions an orthonormal molecular orbital space into fragments,
//! constructs a fragment+bath embedding basis for each, solves a correlated
//! electronic-structure problem on every embedded cluster, and iteratively
//! adjusts a global correlation potential so that the mean-field one-particle
//! density matrix matches the embedded correlated density matrices as closely
//! as possible, subject to fragment symmetry equivalences.
//!
//! The crate is organized around the self-consistency engine:
//! - [`symmetry`]: symmetry-aware reduction of the fragment list,
//! - [`potential`]: the compressed parameterization of the correlation
//!   potential and its sparse response-operator enumeration,
//! - [`hamiltonian`]: the orthonormal-basis Hamiltonian and its embedding
//!   transforms,
//! - [`bath`]: bath-orbital decompositions,
//! - [`solvers`]: embedded cluster solvers,
//! - [`response`]: the linear response of the mean-field density matrix,
//! - [`drivers`]: the embedding kernel, the chemical-potential search and the
//!   one-shot/self-consistent DMET drivers.
//!
//! References:
//! - G. Knizia and G. K.-L. Chan, *J. Chem. Theory Comput.* **2013**, *9*, 1428.
//! - Q. Sun and G. K.-L. Chan, *J. Chem. Theory Comput.* **2016**, *12*, 2706.

pub mod auxiliary;
pub mod bath;
pub mod drivers;
pub mod hamiltonian;
pub mod io;
pub mod potential;
pub mod response;
pub mod solvers;
pub mod symmetry;
