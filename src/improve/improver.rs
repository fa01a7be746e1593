//! Description rewriting via the agent CLI in plain-text mode.

use crate::config::Constraints;
use crate::evaluator::EvalReport;
use crate::history::{History, ImprovementRound};
use crate::improve::classifier::{build_improvement_prompt, classify_failures};
use anyhow::{anyhow, Result};
use chrono::Utc;
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use wait_timeout::ChildExt;

/// What one improvement attempt produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ImproveOutcome {
    Improved { description: String },
    /// The report had no failing cases; nothing was invoked.
    NoFailures,
}

/// Inputs for one improvement round.
#[derive(Debug)]
pub struct ImproveRequest<'a> {
    pub skill_name: &'a str,
    pub description: &'a str,
    pub body: &'a str,
    /// Train-scoped report; held-out cases are withheld from the prompt
    pub report: &'a EvalReport,
}

/// Seam for the optimization loop; the CLI-backed implementation is the only
/// production one.
pub trait Improver {
    fn improve(&mut self, req: &ImproveRequest) -> Result<ImproveOutcome>;
}

/// Improver backed by the external agent CLI.
pub struct CliImprover {
    pub agent_bin: String,
    pub model: Option<String>,
    pub timeout: Duration,
    pub constraints: Constraints,
    pub history: History,
    pub verbose: bool,
}

impl Improver for CliImprover {
    fn improve(&mut self, req: &ImproveRequest) -> Result<ImproveOutcome> {
        let split = classify_failures(req.report);
        if split.is_empty() {
            return Ok(ImproveOutcome::NoFailures);
        }

        let prompt = build_improvement_prompt(
            req.skill_name,
            req.description,
            req.body,
            &split,
            self.history.last(self.constraints.history_window),
            &self.constraints,
        );

        let mut description = clean_response(&self.invoke(&prompt)?);

        if description.len() > self.constraints.max_description_len {
            if self.verbose {
                eprintln!(
                    "[improve] reply is {} chars, requesting a shorter version",
                    description.len()
                );
            }
            // one compression attempt; the result is used as-is
            let compress = format!(
                "Shorten the following skill description to under {} characters while \
                 preserving what should and should not load the skill. Output only the \
                 shortened description.\n\n{}",
                self.constraints.max_description_len, description
            );
            description = clean_response(&self.invoke(&compress)?);
        }

        if description.is_empty() {
            return Err(anyhow!("agent CLI returned an empty description"));
        }

        self.history.append(ImprovementRound {
            round: self.history.next_round(),
            timestamp: Utc::now(),
            description: description.clone(),
            pass_rate: req.report.pass_rate(),
            under_triggers: split.under.len(),
            over_triggers: split.over.len(),
        })?;

        Ok(ImproveOutcome::Improved { description })
    }
}

impl CliImprover {
    /// One text-mode CLI call bounded by the improver timeout.
    fn invoke(&self, prompt: &str) -> Result<String> {
        let mut cmd = Command::new(&self.agent_bin);
        cmd.arg("-p")
            .arg(prompt)
            .args(["--output-format", "text"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(model) = &self.model {
            cmd.args(["--model", model]);
        }

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                anyhow!("agent CLI `{}` not found in PATH", self.agent_bin)
            } else {
                anyhow!("failed to spawn agent CLI `{}`: {}", self.agent_bin, e)
            }
        })?;

        // drain both pipes off-thread so a chatty child cannot deadlock the
        // timeout wait on a full pipe
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("agent stdout unavailable"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("agent stderr unavailable"))?;
        let out_handle = thread::spawn(move || read_all(stdout));
        let err_handle = thread::spawn(move || read_all(stderr));

        let status = match child.wait_timeout(self.timeout)? {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                let _ = out_handle.join();
                let _ = err_handle.join();
                return Err(anyhow!(
                    "agent CLI timed out after {}s while rewriting the description",
                    self.timeout.as_secs()
                ));
            }
        };

        let stdout = out_handle.join().unwrap_or_default();
        let stderr = err_handle.join().unwrap_or_default();

        if !status.success() {
            let detail = stderr.trim();
            return Err(anyhow!(
                "agent CLI exited with {}{}",
                status,
                if detail.is_empty() {
                    String::new()
                } else {
                    format!(": {}", truncate(detail, 300))
                }
            ));
        }

        Ok(stdout)
    }
}

fn read_all(mut source: impl Read) -> String {
    let mut s = String::new();
    let _ = source.read_to_string(&mut s);
    s
}

fn truncate(s: &str, max: usize) -> &str {
    let end = s.char_indices().nth(max).map(|(i, _)| i).unwrap_or(s.len());
    &s[..end]
}

/// Strip the wrappers models habitually add around the requested text.
pub fn clean_response(text: &str) -> String {
    let mut s = text.trim();

    // fenced block: drop the fence lines, keep the payload
    if s.starts_with("```") {
        if let Some(first_newline) = s.find('\n') {
            s = &s[first_newline + 1..];
        }
        if let Some(stripped) = s.trim_end().strip_suffix("```") {
            s = stripped;
        }
        s = s.trim();
    }

    // stray frontmatter label
    let lower = s.to_ascii_lowercase();
    if lower.starts_with("description:") {
        s = s["description:".len()..].trim_start();
    }

    // one layer of wrapping quotes
    if s.len() >= 2 {
        let bytes = s.as_bytes();
        if (bytes[0] == b'"' && bytes[s.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[s.len() - 1] == b'\'')
        {
            s = &s[1..s.len() - 1];
        }
    }

    s.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{EvalSummary, QueryResult};

    fn passing_report() -> EvalReport {
        EvalReport {
            skill_name: "s".to_string(),
            description: "d".to_string(),
            summary: EvalSummary {
                passed: 1,
                failed: 0,
                total: 1,
                threshold: 0.5,
            },
            results: vec![QueryResult {
                query: "q".to_string(),
                should_trigger: true,
                triggers: 1,
                runs: 1,
                errors: 0,
                trigger_rate: 1.0,
                pass: true,
            }],
        }
    }

    #[test]
    fn test_no_failures_skips_the_cli_entirely() {
        // a broken binary proves nothing was invoked
        let mut improver = CliImprover {
            agent_bin: "/definitely/not/a/binary".to_string(),
            model: None,
            timeout: Duration::from_secs(1),
            constraints: Constraints::default(),
            history: History::in_memory(),
            verbose: false,
        };
        let report = passing_report();
        let req = ImproveRequest {
            skill_name: "s",
            description: "d",
            body: "",
            report: &report,
        };
        assert_eq!(improver.improve(&req).unwrap(), ImproveOutcome::NoFailures);
        assert!(improver.history.is_empty());
    }

    #[test]
    fn test_clean_response_strips_fences_quotes_and_label() {
        assert_eq!(clean_response("  plain text  "), "plain text");
        assert_eq!(clean_response("\"quoted\""), "quoted");
        assert_eq!(clean_response("'quoted'"), "quoted");
        assert_eq!(
            clean_response("```\nUse when reading PDFs.\n```"),
            "Use when reading PDFs."
        );
        assert_eq!(
            clean_response("```markdown\nUse when reading PDFs.\n```"),
            "Use when reading PDFs."
        );
        assert_eq!(
            clean_response("description: Use when reading PDFs."),
            "Use when reading PDFs."
        );
        assert_eq!(
            clean_response("Description: \"Use when reading PDFs.\""),
            "Use when reading PDFs."
        );
    }
}
