use crate::common_io::*;
use std::io::Write;

/// `(row, col, value)` with 0-based indices
pub type Triplet = (usize, usize, f64);

/// Write the triplets into a MatrixMarket file with 1-based indices
/// * `triplets` - the triplets to write (0-based)
/// * `nrow` - number of rows
/// * `ncol` - number of columns
/// * `mtx_file` - the output file (e.g., "matrix.mtx.gz")
pub fn write_mtx_triplets(
    triplets: &[Triplet],
    nrow: usize,
    ncol: usize,
    mtx_file: &str,
) -> anyhow::Result<()> {
    let mut buf = open_buf_writer(mtx_file)?;

    writeln!(buf, "%%MatrixMarket matrix coordinate real general")?;
    writeln!(buf, "{}\t{}\t{}", nrow, ncol, triplets.len())?;

    for (row, col, val) in triplets {
        writeln!(buf, "{}\t{}\t{}", row + 1, col + 1, val)?;
    }

    buf.flush()?;
    Ok(())
}

/// Read a matrix market file and return the triplets (0-based,
/// column-major order) and the `(nrow, ncol, nnz)` header
/// * `mtx_file` - Path to the matrix market file
pub fn read_mtx_triplets(mtx_file: &str) -> anyhow::Result<(Vec<Triplet>, (usize, usize, usize))> {
    let lines = read_lines_of_words(mtx_file, &[' ', '\t'])?;

    let (hdr, data) = lines
        .split_first()
        .ok_or_else(|| anyhow::anyhow!("empty mtx file: {}", mtx_file))?;

    if hdr.len() != 3 {
        return Err(anyhow::anyhow!("failed to parse mtx header in {}", mtx_file));
    }

    let nrow = hdr[0].parse::<usize>()?;
    let ncol = hdr[1].parse::<usize>()?;
    let nnz = hdr[2].parse::<usize>()?;

    let mut triplets = Vec::with_capacity(nnz);

    for (line, words) in data.iter().enumerate() {
        if words.len() != 3 {
            return Err(anyhow::anyhow!(
                "expected 3 fields at data line {} of {}",
                line + 1,
                mtx_file
            ));
        }
        let row = words[0].parse::<usize>()?;
        let col = words[1].parse::<usize>()?;
        let val = words[2].parse::<f64>()?;

        if row == 0 || col == 0 || row > nrow || col > ncol {
            return Err(anyhow::anyhow!(
                "index ({}, {}) out of range [1..{}] x [1..{}]",
                row,
                col,
                nrow,
                ncol
            ));
        }
        triplets.push((row - 1, col - 1, val));
    }

    if triplets.len() != nnz {
        return Err(anyhow::anyhow!(
            "{}: header says {} non-zero elements, but found {}",
            mtx_file,
            nnz,
            triplets.len()
        ));
    }

    triplets.sort_by_key(|&(row, col, _)| (col, row));
    Ok((triplets, (nrow, ncol, nnz)))
}
