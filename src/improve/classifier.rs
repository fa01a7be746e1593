//! Failure classification and improvement-prompt assembly.
//!
//! The prompt is deterministic for a given report + history so that repeated
//! rounds differ only where the evidence differs.

use crate::config::Constraints;
use crate::evaluator::{EvalReport, QueryResult};
use crate::history::ImprovementRound;

/// Failing results split by expected polarity.
#[derive(Debug, Default)]
pub struct FailureSplit<'a> {
    /// Should have triggered but did not (rate below threshold)
    pub under: Vec<&'a QueryResult>,
    /// Should not have triggered but did
    pub over: Vec<&'a QueryResult>,
}

impl FailureSplit<'_> {
    pub fn is_empty(&self) -> bool {
        self.under.is_empty() && self.over.is_empty()
    }
}

pub fn classify_failures(report: &EvalReport) -> FailureSplit<'_> {
    let mut split = FailureSplit::default();
    for result in report.failing() {
        if result.should_trigger {
            split.under.push(result);
        } else {
            split.over.push(result);
        }
    }
    split
}

fn rate_pct(rate: f64) -> String {
    format!("{}%", (rate * 100.0).round() as i64)
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max).collect();
    format!("{cut}...")
}

/// Build the improvement request sent to the rewriting model.
///
/// `history` should already be windowed to the most recent entries; each is
/// quoted as a bounded preview so the prompt cannot grow with loop length.
pub fn build_improvement_prompt(
    skill_name: &str,
    description: &str,
    body: &str,
    split: &FailureSplit,
    history: &[ImprovementRound],
    constraints: &Constraints,
) -> String {
    let mut lines: Vec<String> = Vec::new();

    lines.push(format!(
        "You are improving the trigger description of the \"{skill_name}\" skill \
         for an AI coding assistant. The description is the only signal the \
         assistant uses to decide whether to load the skill for a request."
    ));
    lines.push(String::new());
    lines.push("Current description:".to_string());
    lines.push(description.to_string());

    if !split.under.is_empty() {
        lines.push(String::new());
        lines.push("Requests that SHOULD load the skill but did not (under-triggering):".to_string());
        for r in &split.under {
            lines.push(format!(
                "- \"{}\" (loaded in {} of runs)",
                r.query,
                rate_pct(r.trigger_rate)
            ));
        }
    }

    if !split.over.is_empty() {
        lines.push(String::new());
        lines.push("Requests that should NOT load the skill but did (over-triggering):".to_string());
        for r in &split.over {
            lines.push(format!(
                "- \"{}\" (loaded in {} of runs)",
                r.query,
                rate_pct(r.trigger_rate)
            ));
        }
    }

    if !history.is_empty() {
        lines.push(String::new());
        lines.push("Previously attempted descriptions (oldest first); avoid repeating strategies that did not raise the pass rate:".to_string());
        for round in history {
            lines.push(format!(
                "- round {} (pass rate {}): {}",
                round.round,
                rate_pct(round.pass_rate),
                truncate_chars(&round.description, constraints.history_preview_chars)
            ));
        }
    }

    if !body.is_empty() {
        lines.push(String::new());
        lines.push("Skill instructions (excerpt, for context only):".to_string());
        lines.push(truncate_chars(body, constraints.body_excerpt_chars));
    }

    lines.push(String::new());
    lines.push("Rules:".to_string());
    lines.push("1. Output ONLY the new description text, with no preamble, labels, or quotes.".to_string());
    lines.push(format!(
        "2. Stay under {} characters.",
        constraints.max_description_len
    ));
    lines.push(format!(
        "3. Aim for {}-{} words.",
        constraints.word_target_min, constraints.word_target_max
    ));
    lines.push(
        "4. Include the natural phrasing people use for requests that should load the skill."
            .to_string(),
    );
    lines.push(
        "5. Include boundary language that excludes the requests that should not load it."
            .to_string(),
    );
    lines.push("6. Do not quote any of the example requests verbatim.".to_string());
    lines.push(
        "7. Generalize from the failure patterns instead of enumerating individual cases."
            .to_string(),
    );
    lines.push("8. Include \"Use when\" or \"Use whenever\" phrasing.".to_string());
    lines.push("9. Do not use angle brackets.".to_string());

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{EvalSummary, QueryResult};
    use chrono::Utc;

    fn result(query: &str, should_trigger: bool, rate: f64, threshold: f64) -> QueryResult {
        QueryResult {
            query: query.to_string(),
            should_trigger,
            triggers: (rate * 4.0) as usize,
            runs: 4,
            errors: 0,
            trigger_rate: rate,
            pass: crate::evaluator::passes(should_trigger, rate, threshold),
        }
    }

    fn report(results: Vec<QueryResult>) -> EvalReport {
        let passed = results.iter().filter(|r| r.pass).count();
        EvalReport {
            skill_name: "pdf-summarizer".to_string(),
            description: "Summarize PDFs".to_string(),
            summary: EvalSummary {
                passed,
                failed: results.len() - passed,
                total: results.len(),
                threshold: 0.5,
            },
            results,
        }
    }

    #[test]
    fn test_classify_splits_by_polarity() {
        let report = report(vec![
            result("should fire", true, 0.0, 0.5),
            result("fires fine", true, 1.0, 0.5),
            result("should stay quiet", false, 0.75, 0.5),
            result("stays quiet", false, 0.0, 0.5),
        ]);
        let split = classify_failures(&report);
        assert_eq!(split.under.len(), 1);
        assert_eq!(split.under[0].query, "should fire");
        assert_eq!(split.over.len(), 1);
        assert_eq!(split.over[0].query, "should stay quiet");
    }

    #[test]
    fn test_prompt_contains_sections_and_rules() {
        let report = report(vec![
            result("open the quarterly report", true, 0.25, 0.5),
            result("tell me a joke", false, 0.75, 0.5),
        ]);
        let split = classify_failures(&report);
        let history = vec![ImprovementRound {
            round: 1,
            timestamp: Utc::now(),
            description: "x".repeat(300),
            pass_rate: 0.4,
            under_triggers: 2,
            over_triggers: 0,
        }];
        let constraints = Constraints::default();
        let prompt = build_improvement_prompt(
            "pdf-summarizer",
            "Summarize PDFs",
            "Body text",
            &split,
            &history,
            &constraints,
        );

        assert!(prompt.contains("under-triggering"));
        assert!(prompt.contains("over-triggering"));
        assert!(prompt.contains("\"open the quarterly report\" (loaded in 25% of runs)"));
        assert!(prompt.contains("\"tell me a joke\" (loaded in 75% of runs)"));
        assert!(prompt.contains("round 1 (pass rate 40%)"));
        assert!(prompt.contains("Use when"));
        assert!(prompt.contains("9. Do not use angle brackets."));
        // history entries are previewed, never quoted in full
        assert!(prompt.contains(&format!("{}...", "x".repeat(200))));
        assert!(!prompt.contains(&"x".repeat(201)));
    }

    #[test]
    fn test_prompt_truncates_body_excerpt() {
        let report = report(vec![result("q", true, 0.0, 0.5)]);
        let split = classify_failures(&report);
        let constraints = Constraints::default();
        let body = "b".repeat(5000);
        let prompt =
            build_improvement_prompt("s", "d", &body, &split, &[], &constraints);
        assert!(prompt.contains(&"b".repeat(3000)));
        assert!(!prompt.contains(&"b".repeat(3001)));
    }
}
