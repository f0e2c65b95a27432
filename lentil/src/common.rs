pub use log::{debug, info, warn};

pub type Mat = nalgebra::DMatrix<f64>;
pub type DVec = nalgebra::DVector<f64>;
pub type CscMat = nalgebra_sparse::CscMatrix<f64>;

/// Batch name used when no batch labels are given
pub const DEFAULT_BATCH: &str = "all_cells";

/// Default additive floor on every division and log
pub const DEFAULT_PSEUDOCOUNT: f64 = 1e-20;
