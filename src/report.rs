//! Eval report output: pretty JSON and a static HTML page.

use crate::evaluator::EvalReport;
use anyhow::{Context, Result};
use std::path::Path;

pub fn write_json(report: &EvalReport, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(report)?;
    std::fs::write(path, content)
        .with_context(|| format!("failed to write report {}", path.display()))?;
    Ok(())
}

pub fn write_html(report: &EvalReport, path: &Path) -> Result<()> {
    std::fs::write(path, render_html(report))
        .with_context(|| format!("failed to write report {}", path.display()))?;
    Ok(())
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Render the report as a self-contained HTML page.
pub fn render_html(report: &EvalReport) -> String {
    let mut rows = String::new();
    for r in &report.results {
        let status = if r.pass { "pass" } else { "fail" };
        rows.push_str(&format!(
            "<tr class=\"{status}\"><td>{}</td><td>{}</td><td>{:.0}%</td>\
             <td>{}/{}</td><td>{}</td><td>{}</td></tr>\n",
            escape(&r.query),
            if r.should_trigger { "trigger" } else { "ignore" },
            r.trigger_rate * 100.0,
            r.triggers,
            r.runs,
            r.errors,
            status.to_uppercase(),
        ));
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Eval report: {name}</title>
<style>
body {{ font-family: system-ui, sans-serif; margin: 2rem; max-width: 60rem; }}
table {{ border-collapse: collapse; width: 100%; }}
th, td {{ border: 1px solid #ccc; padding: 0.4rem 0.6rem; text-align: left; }}
tr.pass td:last-child {{ color: #1a7f37; font-weight: bold; }}
tr.fail td:last-child {{ color: #cf222e; font-weight: bold; }}
.description {{ background: #f6f8fa; padding: 0.8rem; border-radius: 6px; }}
</style>
</head>
<body>
<h1>Eval report: {name}</h1>
<p class="description">{description}</p>
<p><strong>{passed}</strong> passed, <strong>{failed}</strong> failed of {total}
(threshold {threshold})</p>
<table>
<tr><th>Query</th><th>Expected</th><th>Trigger rate</th><th>Triggers</th><th>Errors</th><th>Result</th></tr>
{rows}</table>
</body>
</html>
"#,
        name = escape(&report.skill_name),
        description = escape(&report.description),
        passed = report.summary.passed,
        failed = report.summary.failed,
        total = report.summary.total,
        threshold = report.summary.threshold,
        rows = rows,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{EvalSummary, QueryResult};

    fn sample() -> EvalReport {
        EvalReport {
            skill_name: "pdf-summarizer".to_string(),
            description: "Use when summarizing <PDF> files".to_string(),
            summary: EvalSummary {
                passed: 1,
                failed: 1,
                total: 2,
                threshold: 0.5,
            },
            results: vec![
                QueryResult {
                    query: "summarize this PDF".to_string(),
                    should_trigger: true,
                    triggers: 3,
                    runs: 4,
                    errors: 0,
                    trigger_rate: 0.75,
                    pass: true,
                },
                QueryResult {
                    query: "tell me a joke".to_string(),
                    should_trigger: false,
                    triggers: 4,
                    runs: 4,
                    errors: 1,
                    trigger_rate: 1.0,
                    pass: false,
                },
            ],
        }
    }

    #[test]
    fn test_html_contains_rows_and_escapes() {
        let html = render_html(&sample());
        assert!(html.contains("summarize this PDF"));
        assert!(html.contains("tell me a joke"));
        assert!(html.contains("<strong>1</strong> passed"));
        assert!(html.contains("&lt;PDF&gt;"));
        assert!(html.contains("PASS"));
        assert!(html.contains("FAIL"));
    }

    #[test]
    fn test_json_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let report = sample();
        write_json(&report, &path).unwrap();
        let loaded: EvalReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, report);
    }
}
