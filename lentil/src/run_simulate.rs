use clap::Args;
use lentil::common::*;
use lentil::io::write_simulation;
use lentil::simulate::*;
use matrix_util::common_io::mkdir;

#[derive(Args, Debug)]
pub struct SimulateCliArgs {
    /// number of cells
    #[arg(long, default_value_t = 300)]
    cells: usize,

    /// number of genes
    #[arg(long, default_value_t = 100)]
    genes: usize,

    /// number of clusters
    #[arg(short = 'k', long, default_value_t = 3)]
    clusters: usize,

    /// smallest total count of a cell
    #[arg(long, default_value_t = 500)]
    n_min: u64,

    /// largest total count of a cell
    #[arg(long, default_value_t = 1000)]
    n_max: u64,

    /// Dirichlet concentration of the native profiles
    #[arg(long, default_value_t = 0.5)]
    beta: f64,

    /// Beta prior of the contamination proportion (one or two values)
    #[arg(long, value_delimiter = ',', default_value = "1,2")]
    delta: Vec<f64>,

    /// random seed
    #[arg(long, default_value_t = 12345)]
    seed: u64,

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

pub fn run_simulate(args: SimulateCliArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let sim_args = SimArgs {
        cells: args.cells,
        genes: args.genes,
        clusters: args.clusters,
        n_min: args.n_min,
        n_max: args.n_max,
        beta: args.beta,
        delta: BetaPrior::from_values(&args.delta)?,
        seed: args.seed,
    };

    info!("Simulating contaminated counts...");
    let sim = generate_contaminated_counts(&sim_args)?;

    mkdir(&args.out)?;
    write_simulation(&sim, &args.out)?;

    info!("done");
    Ok(())
}
