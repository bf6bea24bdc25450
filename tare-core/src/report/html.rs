//! HTML report generation with charts

use super::{Report, ReportOutcome};
use crate::orchestrator::{Comparison, Statistic};

/// Escape text for inclusion in HTML element content and attributes
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.2}")).unwrap_or_else(|| "&ndash;".to_string())
}

/// JSON array literal for chart data; missing values become `null`
fn js_array(values: impl Iterator<Item = Option<f64>>) -> String {
    let items: Vec<String> =
        values.map(|v| v.map(|v| format!("{v:.3}")).unwrap_or_else(|| "null".into())).collect();
    format!("[{}]", items.join(","))
}

fn generate_target_sections(comparisons: &[Comparison]) -> String {
    let mut html = String::new();

    for (i, comparison) in comparisons.iter().enumerate() {
        let status = match &comparison.failure {
            Some(failure) => {
                format!(r#"<span class="failed">FAILED: {}</span>"#, escape(&failure.to_string()))
            }
            None => r#"<span class="ok">ok</span>"#.to_string(),
        };

        let mut rows = String::new();
        for stat in Statistic::ALL {
            let Some(delta) = comparison.delta(stat) else { continue };
            let overhead_class = match delta.overhead_pct.percent() {
                Some(pct) if pct > 0.0 && stat != Statistic::Throughput => "worse",
                Some(pct) if pct < 0.0 && stat == Statistic::Throughput => "worse",
                _ => "",
            };
            rows.push_str(&format!(
                r#"
                <tr>
                    <td>{} ({})</td>
                    <td>{}</td>
                    <td>{}</td>
                    <td>{}</td>
                    <td class="{}">{}</td>
                </tr>"#,
                stat.label(),
                stat.unit(),
                cell(delta.baseline),
                cell(delta.agent),
                delta.delta.map(|d| format!("{d:+.2}")).unwrap_or_else(|| "&ndash;".into()),
                overhead_class,
                escape(&delta.overhead_pct.to_string()),
            ));
        }

        let errors = |mode: Option<&crate::stats::Aggregate>| {
            mode.map(|a| format!("{} ({:.2}%)", a.error_count, a.error_rate * 100.0))
                .unwrap_or_else(|| "&ndash;".into())
        };

        let mut examples = String::new();
        for aggregate in [&comparison.baseline, &comparison.agent].into_iter().flatten() {
            for example in &aggregate.errors.examples {
                examples.push_str(&format!("<li>{}: {}</li>", aggregate.mode, escape(example)));
            }
        }
        if !examples.is_empty() {
            examples = format!(r#"<ul class="error-examples">{examples}</ul>"#);
        }

        html.push_str(&format!(
            r#"
        <div class="target-section">
            <div class="target-header">[{}] {}</div>
            <p><strong>URL:</strong> {} &nbsp; <strong>Status:</strong> {}</p>
            <table>
                <tr><th>Statistic</th><th>Baseline</th><th>Agent</th><th>Delta</th><th>Overhead</th></tr>
                <tr><td>errors</td><td>{}</td><td>{}</td><td></td><td></td></tr>{}
            </table>{}
        </div>"#,
            i + 1,
            escape(&comparison.target.label()),
            escape(&comparison.target.url()),
            status,
            errors(comparison.baseline.as_ref()),
            errors(comparison.agent.as_ref()),
            rows,
            examples,
        ));
    }

    html
}

/// JSON string array safe to embed in a `<script>` block
fn js_labels(labels: &[String]) -> String {
    serde_json::to_string(labels).unwrap_or_else(|_| "[]".to_string()).replace("</", "<\\/")
}

fn generate_chart(comparisons: &[Comparison]) -> String {
    let labels: Vec<String> = comparisons.iter().map(|c| c.target.label()).collect();
    let baseline = js_array(
        comparisons.iter().map(|c| c.delta(Statistic::Mean).and_then(|d| d.baseline)),
    );
    let agent =
        js_array(comparisons.iter().map(|c| c.delta(Statistic::Mean).and_then(|d| d.agent)));

    format!(
        r#"
        new Chart(document.getElementById('meanChart'), {{
            type: 'bar',
            data: {{
                labels: {},
                datasets: [
                    {{ label: 'baseline mean (ms)', data: {}, backgroundColor: 'rgba(0, 123, 255, 0.6)' }},
                    {{ label: 'agent mean (ms)', data: {}, backgroundColor: 'rgba(220, 53, 69, 0.6)' }}
                ]
            }},
            options: {{ responsive: true, maintainAspectRatio: false, scales: {{ y: {{ beginAtZero: true }} }} }}
        }});"#,
        js_labels(&labels),
        baseline,
        agent
    )
}

/// Render the report as a standalone HTML page
pub fn render(report: &Report) -> String {
    let outcome = match report.outcome() {
        ReportOutcome::Succeeded => {
            format!("all {} targets succeeded", report.comparisons.len())
        }
        ReportOutcome::CompletedWithFailures(n) => {
            format!("{n} of {} targets failed", report.comparisons.len())
        }
    };
    let run_timeout = report
        .run
        .run_timeout
        .map(|t| format!("<p><strong>Run timeout:</strong> {}</p>", humantime::format_duration(t)))
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Overhead Report: {}</title>
    <script src="https://cdn.jsdelivr.net/npm/chart.js@4.4.0/dist/chart.umd.min.js"></script>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Oxygen, Ubuntu, Cantarell, sans-serif;
            margin: 0;
            padding: 20px;
            background: #f5f5f5;
        }}
        .container {{
            max-width: 1400px;
            margin: 0 auto;
            background: white;
            padding: 30px;
            border-radius: 8px;
            box-shadow: 0 2px 4px rgba(0,0,0,0.1);
        }}
        h1 {{
            color: #333;
            border-bottom: 3px solid #007bff;
            padding-bottom: 10px;
        }}
        .metadata {{
            background: #f8f9fa;
            padding: 15px;
            border-radius: 4px;
            margin: 20px 0;
        }}
        .metadata p {{
            margin: 5px 0;
        }}
        .chart-container {{
            position: relative;
            height: 400px;
            margin: 30px 0;
        }}
        .target-section {{
            margin: 40px 0;
            padding: 20px;
            background: #fafafa;
            border-radius: 4px;
        }}
        .target-header {{
            background: #007bff;
            color: white;
            padding: 10px 15px;
            border-radius: 4px;
            margin-bottom: 20px;
        }}
        .ok {{ color: #28a745; font-weight: 600; }}
        .failed {{ color: #dc3545; font-weight: 600; }}
        .worse {{ color: #dc3545; }}
        table {{
            width: 100%;
            border-collapse: collapse;
            margin: 20px 0;
        }}
        th, td {{
            padding: 12px;
            text-align: left;
            border-bottom: 1px solid #ddd;
        }}
        th {{
            background: #f8f9fa;
            font-weight: 600;
        }}
    </style>
</head>
<body>
    <div class="container">
        <h1>Profiling Agent Overhead: {}</h1>

        <div class="metadata">
            <p><strong>Started:</strong> {}</p>
            <p><strong>Tool version:</strong> {}</p>
            <p><strong>Requests:</strong> {} warmup + {} measured, concurrency {}</p>
            <p><strong>Timeout:</strong> {}</p>
            {}
            <p><strong>Outcome:</strong> {}</p>
        </div>

        <h2>Mean Latency by Target</h2>
        <div class="chart-container">
            <canvas id="meanChart"></canvas>
        </div>
        {}
    </div>
    <script>{}
    </script>
</body>
</html>
"#,
        escape(&report.name),
        escape(&report.name),
        report.started_at.to_rfc3339(),
        escape(&report.tool_version),
        report.run.warmup,
        report.run.measured,
        report.run.concurrency,
        humantime::format_duration(report.run.timeout),
        run_timeout,
        outcome,
        generate_target_sections(&report.comparisons),
        generate_chart(&report.comparisons),
    )
}
