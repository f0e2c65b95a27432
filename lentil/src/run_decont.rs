use clap::Args;
use lentil::batch::run_decont_with;
use lentil::common::*;
use lentil::initializer::SvdDensityInitializer;
use lentil::io::*;
use lentil::params::{DecontArgs, InitializerArgs};
use matrix_util::common_io::mkdir;

#[derive(Args, Debug)]
pub struct DecontCliArgs {
    /// Count matrix (genes x cells), `.mtx` or `.mtx.gz`
    #[arg(required = true)]
    mtx_file: Box<str>,

    /// Gene names, one per line
    #[arg(long, short = 'r')]
    rows: Option<Box<str>>,

    /// Cell names, one per line
    #[arg(long, short = 'c')]
    cols: Option<Box<str>>,

    #[arg(
        long,
        help = "Cluster label file",
        long_help = "Cluster label of each cell: either one label per line\n\
		     in the order of the cells, or `cell label` pairs.\n\
		     Clusters are found from the data if not given."
    )]
    clusters: Option<Box<str>>,

    /// Batch label file, in the same format as the cluster labels
    #[arg(long, short = 'b')]
    batches: Option<Box<str>>,

    /// Maximum number of EM iterations
    #[arg(long, default_value_t = 500)]
    max_iter: usize,

    /// Stop when the largest change of theta falls below this
    #[arg(long, default_value_t = 0.001)]
    convergence: f64,

    /// Evaluate the log-likelihood every this many iterations
    #[arg(long, default_value_t = 10)]
    iter_loglik: usize,

    /// Initial symmetric Beta prior on the native proportion
    #[arg(long, value_delimiter = ',', default_value = "10")]
    delta: Vec<f64>,

    /// Random seed
    #[arg(long, default_value_t = 12345)]
    seed: u64,

    /// Draw a seed at random (not reproducible)
    #[arg(long, default_value_t = false)]
    no_seed: bool,

    /// Number of most variable genes for finding clusters
    #[arg(long, default_value_t = 5000)]
    var_genes: usize,

    /// Number of components for finding clusters
    #[arg(long, default_value_t = 50)]
    num_modules: usize,

    /// Density clustering resolution
    #[arg(long, default_value_t = 1.0)]
    resolution: f64,

    /// Output header
    #[arg(long, short, required = true)]
    out: Box<str>,

    #[arg(
        short,
        long,
        help = "Verbosity.",
        long_help = "Increase output verbosity."
    )]
    verbose: bool,
}

pub fn run_decont(args: DecontCliArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let mut params = DecontArgs {
        max_iter: args.max_iter,
        convergence: args.convergence,
        iter_loglik: args.iter_loglik,
        seed: if args.no_seed { None } else { Some(args.seed) },
        init: InitializerArgs {
            var_genes: args.var_genes,
            num_modules: args.num_modules,
            resolution: args.resolution,
        },
        show_progress: !args.verbose,
        ..Default::default()
    };
    params.set_delta_from_values(&args.delta)?;
    params.validate()?;

    let source = MtxDirectory::new(&args.mtx_file, args.rows.as_deref(), args.cols.as_deref());
    let data = source.read_counts()?;

    let clusters = args
        .clusters
        .as_deref()
        .map(|f| read_cell_labels(f, data.col_names()))
        .transpose()?;

    let batches = args
        .batches
        .as_deref()
        .map(|f| read_cell_labels(f, data.col_names()))
        .transpose()?;

    let result = run_decont_with(
        &data,
        clusters.as_deref(),
        batches.as_deref(),
        &params,
        &SvdDensityInitializer,
    )?;

    mkdir(&args.out)?;
    source.write_decontaminated(&result.decontaminated, &args.out)?;
    source.write_annotations(&result, &args.out)?;

    info!("done");
    Ok(())
}
