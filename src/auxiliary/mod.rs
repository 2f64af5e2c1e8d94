//! Auxiliary numerical routines.

pub mod numeric;
