//! Terminal rendering of alert runs and condition checks

use colored::Colorize;
use vigil_engine::error::{CollaboratorFailure, FailedRule, RetryableRunFailure};
use vigil_engine::processor::{RuleOutcome, RuleReport};
use vigil_engine::{RunContext, RunSummary};
use vigil_shared::types::rule::MetricCondition;

fn format_value(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn failed_rule(rule: &FailedRule) {
    println!("  {} #{} {}: {}", "⚠".yellow(), rule.rule_id, rule.name, rule.reason);
}

pub fn run_started(ctx: &RunContext) {
    println!(
        "{} Running {} alerts for site {} (retry {}/{})",
        "ℹ".blue(),
        ctx.period,
        ctx.site_id,
        ctx.retry_count,
        ctx.max_retries
    );
}

/// Per-rule lines followed by a totals line.
pub fn run_complete(summary: &RunSummary) {
    for report in &summary.rules {
        rule_report(report);
    }
    println!(
        "{} {} rule(s) evaluated, {} triggered",
        "✓".green(),
        summary.rules.len(),
        summary.count("triggered")
    );
}

fn retry_headline(failure: &RetryableRunFailure, final_retry: bool) -> String {
    if final_retry {
        format!(
            "Giving up after {} retries: {}",
            failure.retry_count,
            failure.rule_names().join(", ")
        )
    } else {
        format!(
            "Retry requested for {} alert(s) of period={} site={}",
            failure.failed.len(),
            failure.period,
            failure.site_id
        )
    }
}

fn collaborator_headline(failure: &CollaboratorFailure) -> String {
    format!(
        "Backend or storage unavailable for {} alert(s) of period={} site={}",
        failure.failed.len(),
        failure.period,
        failure.site_id
    )
}

pub fn retry_requested(failure: &RetryableRunFailure, final_retry: bool) {
    for rule in &failure.failed {
        failed_rule(rule);
    }
    let headline = retry_headline(failure, final_retry);
    if final_retry {
        eprintln!("{} {}", "✗".red(), headline);
    } else {
        println!("{} {}", "⚠".yellow(), headline);
    }
}

pub fn collaborator_failure(failure: &CollaboratorFailure) {
    for rule in &failure.failed {
        failed_rule(rule);
    }
    eprintln!("{} {}", "✗".red(), collaborator_headline(failure));
}

/// Verdict of a one-off condition check.
pub fn check_result(
    condition: &MetricCondition,
    threshold: f64,
    new: Option<f64>,
    old: Option<f64>,
    change: f64,
    fires: bool,
) {
    println!(
        "{} {} {} (new={} old={}, change={:.3}%)",
        "ℹ".blue(),
        condition.label().unwrap_or(condition.key()),
        threshold,
        format_value(new),
        format_value(old),
        change
    );
    if fires {
        println!("{} Alert would trigger", "⚠".yellow());
    } else {
        println!("{} Alert would not trigger", "✓".green());
    }
}

/// One line per evaluated rule.
pub fn rule_report(report: &RuleReport) {
    let head = format!("#{} {}", report.rule_id, report.name);
    match &report.outcome {
        RuleOutcome::Triggered {
            value_new,
            value_old,
        } => println!(
            "  {} {} (new={} old={})",
            "triggered".red().bold(),
            head,
            value_new,
            format_value(*value_old)
        ),
        RuleOutcome::AlreadyTriggered => {
            println!("  {} {} (already recorded)", "triggered".red(), head)
        }
        RuleOutcome::NotTriggered => println!("  {} {}", "ok".green(), head),
        RuleOutcome::AlreadyProcessed => println!("  {} {}", "done".dimmed(), head),
        RuleOutcome::Skipped(reason) => {
            println!("  {} {} ({})", "skipped".yellow(), head, reason)
        }
        RuleOutcome::Failed(reason) => println!("  {} {}: {}", "deferred".yellow().bold(), head, reason),
        RuleOutcome::Errored(reason) => println!("  {} {}: {}", "error".red(), head, reason),
        RuleOutcome::Unavailable(reason) => {
            println!("  {} {}: {}", "unavailable".red().bold(), head, reason)
        }
    }
}
