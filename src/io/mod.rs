//! Input/output utilities for MDMET.

pub(crate) mod format;
