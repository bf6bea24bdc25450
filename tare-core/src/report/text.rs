//! Human-readable plain-text rendering

use std::fmt::Write;

use super::{Report, ReportOutcome};
use crate::orchestrator::{Comparison, Statistic};
use crate::stats::Aggregate;

const RULE_WIDTH: usize = 78;

fn fmt_opt(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.2}")).unwrap_or_else(|| "-".to_string())
}

fn fmt_errors(aggregate: Option<&Aggregate>) -> String {
    match aggregate {
        Some(a) => format!("{} ({:.2}%)", a.error_count, a.error_rate * 100.0),
        None => "-".to_string(),
    }
}

fn write_comparison(out: &mut String, index: usize, comparison: &Comparison) {
    let baseline = comparison.baseline.as_ref();
    let agent = comparison.agent.as_ref();

    let _ = writeln!(out, "[{}] {}", index + 1, comparison.target.label());
    let _ = writeln!(out, "    url: {}", comparison.target.url());
    match &comparison.failure {
        Some(failure) => {
            let _ = writeln!(out, "    status: FAILED ({failure})");
        }
        None => {
            let _ = writeln!(out, "    status: ok");
        }
    }
    let _ = writeln!(
        out,
        "    {:<20} {:>14} {:>14} {:>12} {:>20}",
        "", "baseline", "agent", "delta", "overhead"
    );
    let _ = writeln!(
        out,
        "    {:<20} {:>14} {:>14}",
        "requests",
        baseline.map(|a| a.count.to_string()).unwrap_or_else(|| "-".into()),
        agent.map(|a| a.count.to_string()).unwrap_or_else(|| "-".into()),
    );
    let _ = writeln!(
        out,
        "    {:<20} {:>14} {:>14}",
        "errors",
        fmt_errors(baseline),
        fmt_errors(agent)
    );

    for stat in Statistic::ALL {
        let Some(delta) = comparison.delta(stat) else { continue };
        let label = format!("{} ({})", stat.label(), stat.unit());
        let _ = writeln!(
            out,
            "    {:<20} {:>14} {:>14} {:>12} {:>20}",
            label,
            fmt_opt(delta.baseline),
            fmt_opt(delta.agent),
            delta.delta.map(|d| format!("{d:+.2}")).unwrap_or_else(|| "-".into()),
            delta.overhead_pct.to_string(),
        );
    }

    for (mode, aggregate) in [("baseline", baseline), ("agent", agent)] {
        if let Some(a) = aggregate.filter(|a| !a.errors.is_empty()) {
            let breakdown: Vec<String> =
                a.errors.counts.iter().map(|(kind, n)| format!("{kind}={n}")).collect();
            let _ = writeln!(out, "    {mode} errors: {}", breakdown.join(", "));
            for example in &a.errors.examples {
                let _ = writeln!(out, "      e.g. {example}");
            }
        }
    }
}

/// Render the report as plain-text tables
pub fn render(report: &Report) -> String {
    let mut out = String::new();
    let rule = "=".repeat(RULE_WIDTH);

    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "Profiling Agent Overhead Report: {}", report.name);
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out);
    let _ = writeln!(out, "Run:");
    let _ = writeln!(out, "  Started:         {}", report.started_at.to_rfc3339());
    if let Some(finished) = report.finished_at {
        let _ = writeln!(out, "  Finished:        {}", finished.to_rfc3339());
    }
    let _ = writeln!(out, "  Tool version:    {}", report.tool_version);
    let _ = writeln!(out, "  Warmup:          {} requests", report.run.warmup);
    let _ = writeln!(out, "  Measured:        {} requests", report.run.measured);
    let _ = writeln!(out, "  Concurrency:     {}", report.run.concurrency);
    let _ = writeln!(out, "  Timeout:         {}", humantime::format_duration(report.run.timeout));
    if let Some(run_timeout) = report.run.run_timeout {
        let _ = writeln!(out, "  Run timeout:     {}", humantime::format_duration(run_timeout));
    }
    let _ = writeln!(out);

    for (i, comparison) in report.comparisons.iter().enumerate() {
        write_comparison(&mut out, i, comparison);
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "{rule}");
    match report.outcome() {
        ReportOutcome::Succeeded => {
            let _ = writeln!(out, "Outcome: all {} targets succeeded", report.comparisons.len());
        }
        ReportOutcome::CompletedWithFailures(n) => {
            let _ = writeln!(
                out,
                "Outcome: completed with {n} failed target(s) out of {}",
                report.comparisons.len()
            );
        }
    }
    let _ = writeln!(out, "{rule}");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::sample_report;

    #[test]
    fn test_text_report_contents() {
        let text = render(&sample_report());

        assert!(text.contains("Profiling Agent Overhead Report: bank <demo>"));
        assert!(text.contains("[1] order-service GET /orders"));
        assert!(text.contains("+20.00%"));
        assert!(text.contains("[2] loan-service POST /loans"));
        assert!(text.contains("status: FAILED (switch to baseline: service did not become healthy)"));
        assert!(text.contains("n/a (no baseline)"));
        assert!(text.contains("Outcome: completed with 1 failed target(s) out of 2"));
    }

    #[test]
    fn test_text_report_lists_error_examples() {
        let mut report = sample_report();
        let agent = report.comparisons[0].agent.as_mut().unwrap();
        agent.errors.counts.insert("timeout".to_string(), 3);
        agent.errors.examples.push("request timed out".to_string());

        let text = render(&report);
        assert!(text.contains("agent errors: timeout=3"));
        assert!(text.contains("e.g. request timed out"));
    }
}
