use anyhow::Result;
use clap::Args;

use lentil::merge_order::{compute_merge_order, read_priority_table};

#[derive(Args, Debug, Clone)]
pub struct MergeOrderArgs {
    #[arg(short, long, help = "Priority table with `batch rank size` lines")]
    pub priority: Box<str>,

    #[arg(short, long, help = "Batch merged last")]
    pub query: Option<Box<str>>,
}

pub fn merge_order(args: &MergeOrderArgs) -> Result<()> {
    let priority = read_priority_table(&args.priority)?;
    let order = compute_merge_order(&priority, args.query.as_deref())?;
    for batch in order.iter() {
        println!("{}", batch);
    }
    Ok(())
}
