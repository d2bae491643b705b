use anyhow::Result;
use clap::Args;
use log::info;

use lentil::io::{read_batches, read_blacklist, write_integration_output, ReadOptions};
use lentil::merge_order::read_priority_table;
use lentil::mnn::{MnnConfig, NeighbourSearch};
use lentil::pipeline::{run_integration, IntegrationParams};
use lentil::variance::TrendVarianceModel;

#[derive(Args, Debug, Clone)]
pub struct IntegrateArgs {
    #[arg(
        required = true,
        help = "Batches as `batch=path`; a path is a 10x directory or a feature x cell table"
    )]
    pub batches: Vec<Box<str>>,

    #[arg(
        short,
        long,
        help = "Priority table with `batch rank size` lines for every reference batch"
    )]
    pub priority: Box<str>,

    #[arg(short, long, help = "Batch merged last; must not be in the priority table")]
    pub query: Option<Box<str>>,

    #[arg(long, help = "File of feature ids never used to find neighbours")]
    pub blacklist: Option<Box<str>>,

    #[arg(
        long,
        value_delimiter = ',',
        help = "Case-insensitive prefixes of blacklisted features, e.g., MT-,RPL,RPS"
    )]
    pub blacklist_prefix: Vec<Box<str>>,

    #[arg(long, help = "Keep at most this many features")]
    pub n_top: Option<usize>,

    #[arg(long, default_value_t = 0.0, help = "Minimum biological variance")]
    pub bio_threshold: f64,

    #[arg(long, default_value_t = 0.05, help = "Maximum false discovery rate")]
    pub fdr: f64,

    #[arg(long, default_value_t = 0.3, help = "Span of the mean-variance trend")]
    pub span: f64,

    #[arg(short, long, default_value_t = 20, help = "Number of nearest neighbours")]
    pub knn: usize,

    #[arg(long, default_value_t = 0.1, help = "Bandwidth of the Gaussian smoothing kernel")]
    pub sigma: f32,

    #[arg(long, help = "Do not cosine-normalize cells before the neighbour search")]
    pub no_cos_norm: bool,

    #[arg(long, help = "Approximate neighbour search with HNSW")]
    pub hnsw: bool,

    #[arg(long, default_value_t = 42, help = "Random seed")]
    pub seed: u64,

    #[arg(long, default_value_t = 0, help = "Principal components of corrected values (0: none)")]
    pub pca: usize,

    #[arg(long, help = "Principal components over all features, not just the selected")]
    pub pca_all_features: bool,

    #[arg(long, help = "Append `@batch` to every cell id")]
    pub tag_cells: bool,

    #[arg(long, help = "Inputs are log-expression values, not counts")]
    pub log_input: bool,

    #[arg(long, default_value_t = 1.0, help = "Pseudocount of log normalization")]
    pub pseudocount: f32,

    #[arg(short, long, required = true, help = "Output file prefix")]
    pub out: Box<str>,
}

impl IntegrateArgs {
    fn params(&self) -> IntegrationParams {
        IntegrationParams {
            pseudocount: self.pseudocount,
            bio_threshold: self.bio_threshold,
            fdr_threshold: self.fdr,
            n_top: self.n_top,
            variance: TrendVarianceModel {
                span: self.span,
                ..Default::default()
            },
            mnn: MnnConfig {
                knn: self.knn,
                sigma: self.sigma,
                cos_norm: !self.no_cos_norm,
                search: if self.hnsw {
                    NeighbourSearch::Hnsw
                } else {
                    NeighbourSearch::Exact
                },
                seed: self.seed,
            },
            n_pcs: (self.pca > 0).then_some(self.pca),
            pca_selected_only: !self.pca_all_features,
        }
    }
}

pub fn integrate(args: &IntegrateArgs) -> Result<()> {
    let opts = ReadOptions {
        tag_cells: args.tag_cells,
        log_input: args.log_input,
    };

    let datasets = read_batches(&args.batches, &opts)?;
    let priority = read_priority_table(&args.priority)?;
    let blacklist = read_blacklist(args.blacklist.as_deref(), &args.blacklist_prefix)?;

    let out = run_integration(
        &datasets,
        &priority,
        args.query.as_deref(),
        &blacklist,
        &args.params(),
    )?;

    for (step, batch, lost) in out.corrected.lost_variance() {
        info!("step {} ({}): lost variance {:.4}", step, batch, lost);
    }

    write_integration_output(&out, &args.out)?;
    info!("done");
    Ok(())
}
