use crate::batch::DecontResult;
use crate::common::*;
use crate::counts::CountMatrix;
use crate::error::invalid_parameter;
use crate::loglik::LogLikelihoodTrace;
use crate::params::RunEcho;
use crate::simulate::SimOut;
use anyhow::Context;
use matrix_util::common_io::*;
use matrix_util::dmatrix_util::csc_from_dense;
use matrix_util::mtx_io::{read_mtx_triplets, write_mtx_triplets};
use matrix_util::traits::IoOps;
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;

/// Where counts come from and where results go
pub trait CountSource {
    fn read_counts(&self) -> anyhow::Result<CountMatrix>;

    /// Per-cell contamination and clusters, per-batch parameters, and
    /// the run parameters, all under the prefix `out`
    fn write_annotations(&self, result: &DecontResult, out: &str) -> anyhow::Result<()>;

    fn write_decontaminated(&self, decont: &CountMatrix, out: &str) -> anyhow::Result<()>;
}

/// A MatrixMarket file (`.mtx` or `.mtx.gz`) with optional gene and
/// cell name files, one name per line
#[derive(Debug, Clone)]
pub struct MtxDirectory {
    pub mtx_file: Box<str>,
    pub row_file: Option<Box<str>>,
    pub col_file: Option<Box<str>>,
}

impl MtxDirectory {
    pub fn new(mtx_file: &str, row_file: Option<&str>, col_file: Option<&str>) -> Self {
        Self {
            mtx_file: Box::from(mtx_file),
            row_file: row_file.map(Box::from),
            col_file: col_file.map(Box::from),
        }
    }
}

/// First word of every line
fn read_names(file: &str) -> anyhow::Result<Vec<Box<str>>> {
    Ok(read_lines_of_words(file, &['\t', ' '])?
        .into_iter()
        .filter_map(|words| words.into_iter().next())
        .collect())
}

impl CountSource for MtxDirectory {
    fn read_counts(&self) -> anyhow::Result<CountMatrix> {
        let (triplets, (nrow, ncol, nnz)) = read_mtx_triplets(&self.mtx_file)
            .with_context(|| format!("reading {}", self.mtx_file))?;

        info!(
            "{}: {} rows, {} columns, {} non-zeros",
            self.mtx_file, nrow, ncol, nnz
        );

        let rows = self.row_file.as_deref().map(read_names).transpose()?;
        let cols = self.col_file.as_deref().map(read_names).transpose()?;

        CountMatrix::from_triplets(nrow, ncol, &triplets, rows, cols)
    }

    fn write_annotations(&self, result: &DecontResult, out: &str) -> anyhow::Result<()> {
        write_contamination(result, out)?;
        write_batch_parameters(result, out)?;
        write_params_json(result, out)
    }

    fn write_decontaminated(&self, decont: &CountMatrix, out: &str) -> anyhow::Result<()> {
        write_count_matrix(decont, &format!("{}.decont", out))
    }
}

/// `{prefix}.mtx.gz`, `{prefix}.rows.gz`, `{prefix}.cols.gz`
pub fn write_count_matrix(data: &CountMatrix, prefix: &str) -> anyhow::Result<()> {
    let mtx_file = format!("{}.mtx.gz", prefix);
    let row_file = format!("{}.rows.gz", prefix);
    let col_file = format!("{}.cols.gz", prefix);

    write_mtx_triplets(
        &data.to_triplets(),
        data.num_genes(),
        data.num_cells(),
        &mtx_file,
    )?;
    write_lines(data.row_names(), &row_file)?;
    write_lines(data.col_names(), &col_file)?;

    info!("wrote {}, {}, {}", mtx_file, row_file, col_file);
    Ok(())
}

/// Labels of cells, either one label per line in the order of `cells`,
/// or `cell label` pairs in any order
pub fn read_cell_labels(file: &str, cells: &[Box<str>]) -> anyhow::Result<Vec<Box<str>>> {
    let lines = read_lines_of_words(file, &['\t', ' ', ','])?;

    if lines.iter().all(|w| w.len() == 1) {
        if lines.len() != cells.len() {
            return Err(invalid_parameter(format!(
                "{}: {} labels for {} cells",
                file,
                lines.len(),
                cells.len()
            )));
        }
        return Ok(lines.into_iter().flatten().collect());
    }

    let lookup: HashMap<&str, &str> = lines
        .iter()
        .filter(|w| w.len() >= 2)
        .map(|w| (w[0].as_ref(), w[1].as_ref()))
        .collect();

    cells
        .iter()
        .map(|c| {
            lookup
                .get(c.as_ref())
                .map(|&x| Box::from(x))
                .ok_or_else(|| invalid_parameter(format!("{}: no label for cell {}", file, c)))
        })
        .collect()
}

/// `{out}.contamination.tsv.gz`: cell, contamination, cluster
fn write_contamination(result: &DecontResult, out: &str) -> anyhow::Result<()> {
    let file = format!("{}.contamination.tsv.gz", out);
    let mut buf = open_buf_writer(&file)?;
    writeln!(buf, "cell\tcontamination\tcluster")?;
    for ((cell, c), k) in result
        .decontaminated
        .col_names()
        .iter()
        .zip(result.contamination.iter())
        .zip(result.clusters.iter())
    {
        writeln!(buf, "{}\t{}\t{}", cell, c, k)?;
    }
    buf.flush()?;
    Ok(())
}

/// A batch label usable inside a file name
fn batch_file_tag(batch: &str) -> String {
    batch
        .chars()
        .map(|c| if std::path::is_separator(c) { '_' } else { c })
        .collect()
}

/// `{out}.{batch}.phi.tsv.gz`, `.eta.tsv.gz`, `.theta.tsv.gz`, and
/// `.embedding.tsv.gz` when the clusters were not given
fn write_batch_parameters(result: &DecontResult, out: &str) -> anyhow::Result<()> {
    for (batch, bf) in result.batches.iter() {
        let prefix = format!("{}.{}", out, batch_file_tag(batch));
        bf.fit.phi.to_tsv(&format!("{}.phi.tsv.gz", prefix))?;
        bf.fit.eta.to_tsv(&format!("{}.eta.tsv.gz", prefix))?;

        let theta_lines: Vec<String> = bf
            .cells
            .iter()
            .zip(bf.fit.theta.iter())
            .map(|(&j, th)| format!("{}\t{}", result.decontaminated.col_names()[j], th))
            .collect();
        write_lines(&theta_lines, &format!("{}.theta.tsv.gz", prefix))?;

        if let Some(embedding) = bf.embedding.as_ref() {
            embedding.to_tsv(&format!("{}.embedding.tsv.gz", prefix))?;
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct BatchSummary<'a> {
    batch: &'a str,
    cells: usize,
    clusters: &'a [Box<str>],
    delta: (f64, f64),
    iterations: usize,
    converged: bool,
    seed: u64,
    log_likelihood: &'a LogLikelihoodTrace,
}

#[derive(Serialize)]
struct ParamsOut<'a> {
    run: &'a RunEcho,
    batches: Vec<BatchSummary<'a>>,
}

/// `{out}.params.json`
fn write_params_json(result: &DecontResult, out: &str) -> anyhow::Result<()> {
    let params = ParamsOut {
        run: &result.echo,
        batches: result
            .batches
            .values()
            .map(|bf| BatchSummary {
                batch: &bf.batch,
                cells: bf.cells.len(),
                clusters: &bf.cluster_names,
                delta: bf.fit.delta,
                iterations: bf.fit.iterations,
                converged: bf.fit.converged,
                seed: bf.seed,
                log_likelihood: &bf.fit.trace,
            })
            .collect(),
    };

    let file = format!("{}.params.json", out);
    let mut buf = open_buf_writer(&file)?;
    serde_json::to_writer_pretty(&mut buf, &params)?;
    writeln!(buf)?;
    buf.flush()?;
    Ok(())
}

/// Observed, native and contamination counts plus the true clusters,
/// profiles and contamination fractions, all under the prefix `out`
pub fn write_simulation(sim: &SimOut, out: &str) -> anyhow::Result<()> {
    let observed = sim.observed_counts()?;
    let rows = observed.row_names().to_vec();
    let cols = observed.col_names().to_vec();

    write_count_matrix(&observed, out)?;

    for (name, mat) in [("native", &sim.native), ("contamination", &sim.contamination)] {
        let data = CountMatrix::new(csc_from_dense(mat), Some(rows.clone()), Some(cols.clone()))?;
        write_count_matrix(&data, &format!("{}.{}", out, name))?;
    }

    write_lines(&sim.z, &format!("{}.clusters.gz", out))?;
    sim.phi.to_tsv(&format!("{}.phi.tsv.gz", out))?;
    sim.eta.to_tsv(&format!("{}.eta.tsv.gz", out))?;

    let truth = sim.true_contamination_fraction();
    let lines: Vec<String> = cols
        .iter()
        .zip(truth.iter())
        .zip(sim.contamination_prop.iter())
        .map(|((c, x), p)| format!("{}\t{}\t{}", c, x, p))
        .collect();
    write_lines(&lines, &format!("{}.contamination.tsv.gz", out))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_by_position_or_by_name() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let cells: Vec<Box<str>> = vec!["c1".into(), "c2".into(), "c3".into()];

        let file = dir.path().join("pos.txt");
        let file = file.to_string_lossy();
        write_lines(&["a", "b", "a"], &file)?;
        let expected: Vec<Box<str>> = vec!["a".into(), "b".into(), "a".into()];
        assert_eq!(read_cell_labels(&file, &cells)?, expected);

        let file = dir.path().join("named.tsv.gz");
        let file = file.to_string_lossy();
        write_lines(&["c3\tx", "c1\ty", "c2\tx"], &file)?;
        let expected: Vec<Box<str>> = vec!["y".into(), "x".into(), "x".into()];
        assert_eq!(read_cell_labels(&file, &cells)?, expected);

        write_lines(&["c3\tx", "c1\ty"], &file)?;
        assert!(read_cell_labels(&file, &cells).is_err());
        Ok(())
    }

    #[test]
    fn batch_tags_stay_inside_the_prefix() {
        assert_eq!(batch_file_tag("run1"), "run1");
        assert_eq!(batch_file_tag("../lane/2"), ".._lane_2");
    }
}
