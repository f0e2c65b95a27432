use crate::common::*;
use crate::error::invalid_input;
use matrix_util::dmatrix_util::*;
use matrix_util::traits::ColumnStatOps;

/// Genes x cells counts with row (gene) and column (cell) names.
///
/// Values are stored column-compressed, one column per cell. A
/// `CountMatrix` is never modified once built; derived matrices (a
/// subset of cells, decontaminated values) are new objects.
#[derive(Debug, Clone)]
pub struct CountMatrix {
    counts: CscMat,
    rows: Vec<Box<str>>,
    cols: Vec<Box<str>>,
}

fn default_names(prefix: &str, n: usize) -> Vec<Box<str>> {
    (1..=n)
        .map(|i| format!("{}_{}", prefix, i).into_boxed_str())
        .collect()
}

impl CountMatrix {
    /// Wrap a sparse matrix after checking that it is a proper
    /// genes x cells matrix of non-negative, finite values
    /// * `counts` - genes x cells
    /// * `rows` - gene names (default: `gene_1`, `gene_2`, ...)
    /// * `cols` - cell names (default: `cell_1`, `cell_2`, ...)
    pub fn new(
        counts: CscMat,
        rows: Option<Vec<Box<str>>>,
        cols: Option<Vec<Box<str>>>,
    ) -> anyhow::Result<Self> {
        let (nrow, ncol) = (counts.nrows(), counts.ncols());

        if nrow == 0 || ncol == 0 {
            return Err(invalid_input(format!(
                "counts must be a genes x cells matrix, got [{} x {}]",
                nrow, ncol
            )));
        }

        if let Some(&x) = counts.values().iter().find(|x| !x.is_finite()) {
            return Err(invalid_input(format!("counts contain a missing value ({})", x)));
        }

        if let Some(&x) = counts.values().iter().find(|&&x| x < 0.) {
            return Err(invalid_input(format!("counts contain a negative value ({})", x)));
        }

        let rows = rows.unwrap_or_else(|| default_names("gene", nrow));
        let cols = cols.unwrap_or_else(|| default_names("cell", ncol));

        if rows.len() != nrow {
            return Err(invalid_input(format!(
                "{} gene names for {} rows",
                rows.len(),
                nrow
            )));
        }

        if cols.len() != ncol {
            return Err(invalid_input(format!(
                "{} cell names for {} columns",
                cols.len(),
                ncol
            )));
        }

        Ok(Self { counts, rows, cols })
    }

    pub fn from_dense(
        counts: &Mat,
        rows: Option<Vec<Box<str>>>,
        cols: Option<Vec<Box<str>>>,
    ) -> anyhow::Result<Self> {
        if let Some(&x) = counts.iter().find(|x| !x.is_finite()) {
            return Err(invalid_input(format!("counts contain a missing value ({})", x)));
        }
        Self::new(csc_from_dense(counts), rows, cols)
    }

    /// * `triplets` - 0-based `(gene, cell, count)`
    pub fn from_triplets(
        nrow: usize,
        ncol: usize,
        triplets: &[(usize, usize, f64)],
        rows: Option<Vec<Box<str>>>,
        cols: Option<Vec<Box<str>>>,
    ) -> anyhow::Result<Self> {
        if let Some(&(i, j, x)) = triplets.iter().find(|(_, _, x)| !x.is_finite()) {
            return Err(invalid_input(format!(
                "counts contain a missing value ({}) at ({}, {})",
                x, i, j
            )));
        }
        Self::new(csc_from_triplets(nrow, ncol, triplets)?, rows, cols)
    }

    pub fn counts(&self) -> &CscMat {
        &self.counts
    }

    pub fn num_genes(&self) -> usize {
        self.counts.nrows()
    }

    pub fn num_cells(&self) -> usize {
        self.counts.ncols()
    }

    pub fn row_names(&self) -> &[Box<str>] {
        &self.rows
    }

    pub fn col_names(&self) -> &[Box<str>] {
        &self.cols
    }

    /// Total counts of each cell
    pub fn cell_totals(&self) -> Vec<f64> {
        self.counts.column_sums()
    }

    /// Every cell needs at least one count to have a contamination
    /// fraction
    pub fn check_nonempty_cells(&self) -> anyhow::Result<()> {
        if let Some(j) = self.cell_totals().iter().position(|&s| s <= 0.) {
            return Err(invalid_input(format!(
                "cell {} has no counts",
                self.cols[j]
            )));
        }
        Ok(())
    }

    /// Take a subset of cells in the given order
    pub fn select_cells(&self, cells: &[usize]) -> Self {
        Self {
            counts: csc_select_columns(&self.counts, cells),
            rows: self.rows.clone(),
            cols: cells.iter().map(|&j| self.cols[j].clone()).collect(),
        }
    }

    /// Same shape, names and non-zero pattern, but new values
    /// * `values` - aligned with the stored (column-major) non-zeros
    pub fn with_values(&self, values: Vec<f64>) -> anyhow::Result<Self> {
        Ok(Self {
            counts: csc_with_values(&self.counts, values)?,
            rows: self.rows.clone(),
            cols: self.cols.clone(),
        })
    }

    pub fn to_dense(&self) -> Mat {
        csc_to_dense(&self.counts)
    }

    pub fn to_triplets(&self) -> Vec<(usize, usize, f64)> {
        csc_to_triplets(&self.counts)
    }
}

/// A sparse matrix with the same pattern as `pattern` holding `values`
pub fn csc_with_values(pattern: &CscMat, values: Vec<f64>) -> anyhow::Result<CscMat> {
    if values.len() != pattern.nnz() {
        return Err(anyhow::anyhow!(
            "{} values for {} non-zero elements",
            values.len(),
            pattern.nnz()
        ));
    }
    CscMat::try_from_csc_data(
        pattern.nrows(),
        pattern.ncols(),
        pattern.col_offsets().to_vec(),
        pattern.row_indices().to_vec(),
        values,
    )
    .map_err(|e| anyhow::anyhow!("failed to build a sparse matrix: {:?}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::is_invalid_input;

    #[test]
    fn missing_and_negative_values_are_rejected() {
        let xx = Mat::from_row_slice(2, 2, &[1., f64::NAN, 0., 2.]);
        assert!(is_invalid_input(&CountMatrix::from_dense(&xx, None, None).unwrap_err()));

        let xx = Mat::from_row_slice(2, 2, &[1., -1., 0., 2.]);
        assert!(is_invalid_input(&CountMatrix::from_dense(&xx, None, None).unwrap_err()));

        let xx = Mat::zeros(0, 3);
        assert!(is_invalid_input(&CountMatrix::from_dense(&xx, None, None).unwrap_err()));
    }

    #[test]
    fn empty_cells_are_flagged() {
        let xx = Mat::from_row_slice(2, 3, &[1., 0., 3., 2., 0., 0.]);
        let data = CountMatrix::from_dense(&xx, None, None).unwrap();
        let err = data.check_nonempty_cells().unwrap_err();
        assert!(is_invalid_input(&err));
        assert!(err.to_string().contains("cell_2"));
    }

    #[test]
    fn select_and_replace_values() -> anyhow::Result<()> {
        let xx = Mat::from_row_slice(2, 3, &[1., 0., 3., 2., 5., 0.]);
        let data = CountMatrix::from_dense(&xx, None, None)?;

        let sub = data.select_cells(&[2, 0]);
        let expected: Vec<Box<str>> = vec!["cell_3".into(), "cell_1".into()];
        assert_eq!(sub.col_names(), expected.as_slice());
        assert_eq!(sub.to_dense(), Mat::from_row_slice(2, 2, &[3., 1., 0., 2.]));

        let halved: Vec<f64> = data.counts().values().iter().map(|x| x / 2.).collect();
        let half = data.with_values(halved)?;
        assert_eq!(half.to_dense(), xx / 2.);
        Ok(())
    }
}
