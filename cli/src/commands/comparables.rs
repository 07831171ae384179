//! Comparables command implementation

use anyhow::Result;
use clap::Args;
use vigil_shared::types::rule::{comparables_for, PeriodKind};

#[derive(Args, Debug)]
pub struct ComparablesArgs {
    /// Only list comparisons for this period
    #[arg(short, long)]
    pub period: Option<PeriodKind>,
}

pub fn run(args: ComparablesArgs) -> Result<()> {
    let periods = match args.period {
        Some(period) => vec![period],
        None => PeriodKind::ALL.to_vec(),
    };
    for period in periods {
        println!("{}:", period);
        for c in comparables_for(period) {
            println!("  {:>4}  {}", c.compared_to, c.label);
        }
    }
    Ok(())
}
