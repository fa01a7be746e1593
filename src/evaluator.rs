//! Concurrent evaluation of an eval set against a candidate description.
//!
//! Fans out `cases × runs_per_query` runner invocations across a fixed-size
//! worker pool. A single run failing (or timing out) only bumps that query's
//! error count; the batch always completes.

use crate::evalset::EvalCase;
use crate::runner::QueryRunner;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::Mutex;
use std::thread;

/// Evaluation parameters
#[derive(Debug, Clone)]
pub struct EvalParams {
    pub runs_per_query: usize,
    pub workers: usize,
    pub threshold: f64,
    pub verbose: bool,
}

impl Default for EvalParams {
    fn default() -> Self {
        Self {
            runs_per_query: 3,
            workers: 6,
            threshold: 0.5,
            verbose: false,
        }
    }
}

/// Aggregated outcome for one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub query: String,
    pub should_trigger: bool,
    pub triggers: usize,
    pub runs: usize,
    pub errors: usize,
    pub trigger_rate: f64,
    pub pass: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalSummary {
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
    pub threshold: f64,
}

/// Immutable snapshot of one evaluation pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalReport {
    pub skill_name: String,
    pub description: String,
    pub summary: EvalSummary,
    pub results: Vec<QueryResult>,
}

/// The pass rule is asymmetric by polarity: a rate exactly at the threshold
/// passes only for should-trigger queries.
pub fn passes(should_trigger: bool, trigger_rate: f64, threshold: f64) -> bool {
    if should_trigger {
        trigger_rate >= threshold
    } else {
        trigger_rate < threshold
    }
}

impl EvalReport {
    pub fn pass_rate(&self) -> f64 {
        if self.summary.total == 0 {
            1.0
        } else {
            self.summary.passed as f64 / self.summary.total as f64
        }
    }

    pub fn failing(&self) -> impl Iterator<Item = &QueryResult> {
        self.results.iter().filter(|r| !r.pass)
    }

    /// Report restricted to the results at `indices`, with a recomputed
    /// summary. Used to scope a full-set report down to the train split.
    pub fn subset(&self, indices: &[usize]) -> EvalReport {
        let results: Vec<QueryResult> = indices
            .iter()
            .filter_map(|&i| self.results.get(i).cloned())
            .collect();
        let passed = results.iter().filter(|r| r.pass).count();
        EvalReport {
            skill_name: self.skill_name.clone(),
            description: self.description.clone(),
            summary: EvalSummary {
                passed,
                failed: results.len() - passed,
                total: results.len(),
                threshold: self.summary.threshold,
            },
            results,
        }
    }
}

/// Run every case `runs_per_query` times through the worker pool and
/// aggregate per-query trigger rates into a report.
pub fn evaluate(
    runner: &dyn QueryRunner,
    skill_name: &str,
    description: &str,
    cases: &[EvalCase],
    params: &EvalParams,
) -> EvalReport {
    let runs_per_query = params.runs_per_query.max(1);
    let workers = params.workers.max(1);

    // query-major submission order: all reps of case 0, then case 1, ...
    let jobs: Mutex<VecDeque<usize>> = Mutex::new(
        (0..cases.len())
            .flat_map(|i| std::iter::repeat(i).take(runs_per_query))
            .collect(),
    );
    let total_jobs = cases.len() * runs_per_query;

    let mut triggers = vec![0usize; cases.len()];
    let mut errors = vec![0usize; cases.len()];

    let (tx, rx) = mpsc::channel::<(usize, anyhow::Result<bool>)>();
    thread::scope(|scope| {
        for _ in 0..workers.min(total_jobs.max(1)) {
            let tx = tx.clone();
            let jobs = &jobs;
            scope.spawn(move || loop {
                let job = jobs.lock().unwrap().pop_front();
                let Some(case_idx) = job else {
                    break;
                };
                let outcome = runner.run_query(&cases[case_idx].query, description);
                if tx.send((case_idx, outcome)).is_err() {
                    break;
                }
            });
        }
        drop(tx);

        // every job sends exactly one result
        for _ in 0..total_jobs {
            let Ok((case_idx, outcome)) = rx.recv() else {
                break;
            };
            match outcome {
                Ok(true) => triggers[case_idx] += 1,
                Ok(false) => {}
                Err(e) => {
                    errors[case_idx] += 1;
                    if params.verbose {
                        eprintln!(
                            "[eval] run failed for \"{}\": {:#}",
                            cases[case_idx].query, e
                        );
                    }
                }
            }
        }
    });

    let results: Vec<QueryResult> = cases
        .iter()
        .enumerate()
        .map(|(i, case)| {
            let trigger_rate = if runs_per_query == 0 {
                0.0
            } else {
                triggers[i] as f64 / runs_per_query as f64
            };
            QueryResult {
                query: case.query.clone(),
                should_trigger: case.should_trigger,
                triggers: triggers[i],
                runs: runs_per_query,
                errors: errors[i],
                trigger_rate,
                pass: passes(case.should_trigger, trigger_rate, params.threshold),
            }
        })
        .collect();

    let passed = results.iter().filter(|r| r.pass).count();
    EvalReport {
        skill_name: skill_name.to_string(),
        description: description.to_string(),
        summary: EvalSummary {
            passed,
            failed: results.len() - passed,
            total: results.len(),
            threshold: params.threshold,
        },
        results,
    }
}
