use anyhow::Result;
use clap::Args;
use log::info;

use lentil::io::write_10x_dir;
use lentil::simulate::{simulate_batches, SimArgs};
use matrix_util::common_io::{mkdir, write_lines};
use matrix_util::traits::IoOps;

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    #[arg(
        short,
        long,
        required = true,
        help = "Output directory; one 10x directory per batch plus priority.tsv"
    )]
    pub out: Box<str>,

    #[arg(long, default_value_t = 200, help = "Number of features")]
    pub features: usize,

    #[arg(
        long,
        value_delimiter = ',',
        default_value = "50,80,30",
        help = "Number of cells in each batch"
    )]
    pub batch_sizes: Vec<usize>,

    #[arg(long, default_value_t = 4, help = "Number of cell types")]
    pub cell_types: usize,

    #[arg(long, default_value_t = 2000, help = "Expected total count per cell")]
    pub depth: usize,

    #[arg(long, default_value_t = 1.0, help = "Spread of log cell-type profiles")]
    pub type_sd: f32,

    #[arg(long, default_value_t = 0.3, help = "Spread of log batch effects")]
    pub batch_sd: f32,

    #[arg(long, default_value_t = 42, help = "Random seed")]
    pub seed: u64,
}

pub fn simulate(args: &SimulateArgs) -> Result<()> {
    let sim = simulate_batches(&SimArgs {
        features: args.features,
        batch_sizes: args.batch_sizes.clone(),
        cell_types: args.cell_types,
        depth: args.depth,
        type_sd: args.type_sd,
        batch_sd: args.batch_sd,
        rseed: args.seed,
    })?;

    let out: &str = &args.out;
    let priority_file = format!("{}/priority.tsv", out);
    mkdir(&priority_file)?;

    for (batch, data) in sim.batches.iter() {
        let dir = format!("{}/{}", out, batch);
        write_10x_dir(data, &dir)?;
        info!("wrote {}", dir);
    }

    let priority: Vec<Box<str>> = sim
        .priority()
        .iter()
        .map(|(b, p)| format!("{}\t{}\t{}", b, p.rank, p.size).into_boxed_str())
        .collect();
    write_lines(&priority, &priority_file)?;

    let mut type_lines: Vec<Box<str>> = vec!["cell\tbatch\tcell_type".into()];
    for (batch, types) in sim.cell_types.iter() {
        let cells = sim.batches[batch].cells();
        type_lines.extend(
            cells
                .iter()
                .zip(types.iter())
                .map(|(c, k)| format!("{}\t{}\t{}", c, batch, k).into_boxed_str()),
        );
    }
    write_lines(&type_lines, &format!("{}/cell_types.tsv", out))?;

    sim.ln_delta_db.to_tsv(&format!("{}/ln_batch_effect.tsv.gz", out))?;
    sim.ln_profile_dk.to_tsv(&format!("{}/ln_type_profile.tsv.gz", out))?;

    info!("wrote simulated batches under {}", out);
    Ok(())
}
