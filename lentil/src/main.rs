mod run_decont;
mod run_simulate;

use clap::{Parser, Subcommand};
use run_decont::*;
use run_simulate::*;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "LENTIL",
    long_about = "Ambient contamination estimation for single-cell count matrices.\n\
		  Each cell is a mixture of its own cluster's native profile\n\
		  and a background profile pooled from the other clusters."
)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Estimate and remove contamination",
        long_about = "Estimate the contamination fraction of each cell by EM\n\
		      in three stages: \n\
		      (1) Split cells by batch\n\
		      (2) Find clusters unless they are given\n\
		      (3) Fit the native/contamination mixture in each batch.\n"
    )]
    Decont(DecontCliArgs),

    /// Simulate contaminated counts with a known truth
    Simulate(SimulateCliArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.commands {
        Commands::Decont(args) => {
            run_decont(args)?;
        }
        Commands::Simulate(args) => {
            run_simulate(args)?;
        }
    }

    Ok(())
}
