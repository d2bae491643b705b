use anyhow::Result;
use clap::Args;
use log::info;

use lentil::combine_var::combine_batches;
use lentil::harmonize::harmonize;
use lentil::io::{read_batches, ReadOptions};
use lentil::normalize::multi_batch_log_normalize;
use lentil::variance::{estimate_variance_per_batch, TrendVarianceModel};
use matrix_util::common_io::{mkdir, write_lines};

#[derive(Args, Debug, Clone)]
pub struct ModelVarArgs {
    #[arg(required = true, help = "Batches as `batch=path`")]
    pub batches: Vec<Box<str>>,

    #[arg(long, default_value_t = 0.3, help = "Span of the mean-variance trend")]
    pub span: f64,

    #[arg(long, help = "Inputs are log-expression values, not counts")]
    pub log_input: bool,

    #[arg(long, default_value_t = 1.0, help = "Pseudocount of log normalization")]
    pub pseudocount: f32,

    #[arg(
        short,
        long,
        required = true,
        help = "Output prefix: {out}.{batch}.variance.tsv and {out}.combined.variance.tsv"
    )]
    pub out: Box<str>,
}

pub fn model_var(args: &ModelVarArgs) -> Result<()> {
    let opts = ReadOptions {
        tag_cells: false,
        log_input: args.log_input,
    };

    let datasets = harmonize(&read_batches(&args.batches, &opts)?)?;
    let logexpr = if args.log_input {
        datasets
    } else {
        multi_batch_log_normalize(&datasets, args.pseudocount)?
    };

    let model = TrendVarianceModel {
        span: args.span,
        ..Default::default()
    };

    let per_batch = estimate_variance_per_batch(&logexpr, &model)?;
    let combined = combine_batches(&per_batch)?;

    let combined_file = format!("{}.combined.variance.tsv", args.out);
    mkdir(&combined_file)?;

    for (batch, decomp) in per_batch.iter() {
        let file = format!("{}.{}.variance.tsv", args.out, batch);
        write_lines(&decomp.to_lines(), &file)?;
        info!("wrote {}", file);
    }
    write_lines(&combined.to_lines(), &combined_file)?;
    info!("wrote {}", combined_file);
    Ok(())
}
