mod run_integrate;
mod run_merge_order;
mod run_model_var;
mod run_simulate;

use run_integrate::*;
use run_merge_order::*;
use run_model_var::*;
use run_simulate::*;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "lentil")]
#[command(about = "Ordered mutual nearest neighbour integration of single-cell batches")]
struct Cli {
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harmonize, select features, and correct batches in a fixed merge order
    Integrate(IntegrateArgs),
    /// Per-batch and combined mean-variance decomposition
    ModelVar(ModelVarArgs),
    /// Print the merge order implied by a priority table
    MergeOrder(MergeOrderArgs),
    /// Simulate batches of counts with batch effects
    Simulate(SimulateArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    match &cli.commands {
        Commands::Integrate(args) => {
            integrate(args)?;
        }
        Commands::ModelVar(args) => {
            model_var(args)?;
        }
        Commands::MergeOrder(args) => {
            merge_order(args)?;
        }
        Commands::Simulate(args) => {
            simulate(args)?;
        }
    }

    Ok(())
}
