//! Ambient contamination estimation for single-cell count matrices.
//!
//! Each cell's observed counts are modelled as a mixture of its own
//! cluster's native profile and a background profile made of all the
//! other clusters. The per-batch EM engine lives in [`em`]; batches are
//! split, fitted and stitched back together in [`batch`].

pub mod batch;
pub mod common;
pub mod counts;
pub mod dirichlet;
pub mod em;
pub mod error;
pub mod initializer;
pub mod io;
pub mod labels;
pub mod loglik;
pub mod params;
pub mod simulate;
