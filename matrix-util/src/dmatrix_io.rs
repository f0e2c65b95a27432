use crate::common_io::{read_lines_of_words, write_lines};
use crate::traits::*;
pub use nalgebra::DMatrix;

impl IoOps for DMatrix<f64> {
    type Scalar = f64;
    type Mat = Self;

    fn read_file_delim(file: &str, delim: &[char]) -> anyhow::Result<Self::Mat> {
        let data = read_lines_of_words(file, delim)?;

        if data.is_empty() {
            return Err(anyhow::anyhow!("No data in file {}", file));
        }

        let ncols = data[0].len();
        let nrows = data.len();

        if let Some(bad) = data.iter().position(|x| x.len() != ncols) {
            return Err(anyhow::anyhow!(
                "line {} of {} has {} fields, expected {}",
                bad + 1,
                file,
                data[bad].len(),
                ncols
            ));
        }

        let values = data
            .into_iter()
            .flatten()
            .map(|x| x.parse::<f64>())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(DMatrix::<f64>::from_row_iterator(nrows, ncols, values))
    }

    fn write_file_delim(&self, file: &str, delim: &str) -> anyhow::Result<()> {
        // keep the row order
        let lines = self
            .row_iter()
            .map(|row| {
                row.iter()
                    .map(|x| format!("{}", *x))
                    .collect::<Vec<String>>()
                    .join(delim)
            })
            .collect::<Vec<_>>();

        write_lines(&lines, file)
    }
}
