//! Check command implementation

use crate::output;
use anyhow::{Context, Result};
use clap::Args;
use vigil_engine::evaluator::{percentage_change, should_trigger};
use vigil_shared::types::rule::{MetricCondition, Threshold};

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Trigger condition, e.g. percentage_decrease_more_than
    #[arg(short, long)]
    pub condition: String,

    /// Threshold as stored on the rule
    #[arg(short, long)]
    pub threshold: String,

    /// Value of the most recent period
    #[arg(short, long)]
    pub new: Option<f64>,

    /// Baseline value
    #[arg(short, long)]
    pub old: Option<f64>,
}

pub fn run(args: CheckArgs) -> Result<()> {
    let condition = MetricCondition::from(args.condition.as_str());
    let threshold = Threshold::from(args.threshold.as_str());

    let fires = should_trigger(&condition, threshold.value(), args.new, args.old)
        .context("Cannot evaluate condition")?;

    output::check_result(
        &condition,
        threshold.value(),
        args.new,
        args.old,
        percentage_change(args.new, args.old),
        fires,
    );
    Ok(())
}
