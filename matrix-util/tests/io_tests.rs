use matrix_util::common_io::{create_temp_dir_file, read_lines, remove_file, write_lines};
use matrix_util::dmatrix_util::*;
use matrix_util::mtx_io::*;
use matrix_util::traits::{IoOps, SampleOps};
use rand::SeedableRng;

#[test]
fn dmatrix_io_test() -> anyhow::Result<()> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    let xx = DMatrix::<f64>::runif(50, 20, &mut rng);

    let tsv_file = create_temp_dir_file("tsv.gz")?;
    let tsv_file = tsv_file.to_str().unwrap();
    xx.to_tsv(tsv_file)?;

    let yy = DMatrix::<f64>::from_tsv(tsv_file)?;
    approx::assert_abs_diff_eq!(xx, yy, epsilon = 1e-12);

    remove_file(tsv_file)?;
    Ok(())
}

#[test]
fn mtx_io_test() -> anyhow::Result<()> {
    let xx = DMatrix::from_row_slice(3, 4, &[1., 0., 2., 0., 0., 3., 0., 4., 5., 0., 0., 6.]);
    let sp = csc_from_dense(&xx);
    let triplets = csc_to_triplets(&sp);

    let mtx_file = create_temp_dir_file("mtx.gz")?;
    let mtx_file = mtx_file.to_str().unwrap();
    write_mtx_triplets(&triplets, 3, 4, mtx_file)?;

    let (read_back, (nrow, ncol, nnz)) = read_mtx_triplets(mtx_file)?;
    assert_eq!((nrow, ncol, nnz), (3, 4, 6));
    assert_eq!(read_back, triplets);

    let yy = csc_to_dense(&csc_from_triplets(nrow, ncol, &read_back)?);
    approx::assert_abs_diff_eq!(xx, yy);

    remove_file(mtx_file)?;
    Ok(())
}

#[test]
fn lines_io_test() -> anyhow::Result<()> {
    let names = vec!["gene_1", "gene_2", "gene_3"];
    let file = create_temp_dir_file("txt.gz")?;
    let file = file.to_str().unwrap();
    write_lines(&names, file)?;
    let read_back = read_lines(file)?;
    assert_eq!(
        read_back.iter().map(|x| x.as_ref()).collect::<Vec<_>>(),
        names
    );
    remove_file(file)?;
    Ok(())
}
