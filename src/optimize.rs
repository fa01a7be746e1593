//! Optimization loop: evaluate, classify, rewrite, repeat.
//!
//! Each round evaluates the whole eval set, but only the train split is
//! shown to the improver; held-out cases measure generalization. Rounds are
//! strictly sequential and the stopping rules are checked in a fixed order.

use crate::evalset::EvalCase;
use crate::evaluator::{evaluate, EvalParams};
use crate::improve::{ImproveOutcome, ImproveRequest, Improver};
use crate::runner::QueryRunner;
use crate::skills::Skill;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Loop knobs
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub max_iterations: usize,
    /// Full-set pass rate at which the loop declares convergence
    pub target_pass_rate: f64,
    /// Fraction of each label group withheld from the improvement prompt
    pub holdout: f64,
    /// Write each new description back into the skill file
    pub apply_to_file: bool,
    /// Where round snapshots and the final summary land
    pub output_dir: Option<PathBuf>,
    pub verbose: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            target_pass_rate: 1.0,
            holdout: 0.2,
            apply_to_file: false,
            output_dir: None,
            verbose: false,
        }
    }
}

/// Measurements for one completed round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub round: usize,
    pub description: String,
    pub full_pass_rate: f64,
    pub train_pass_rate: f64,
    pub test_pass_rate: Option<f64>,
    pub train_passed: usize,
    pub train_total: usize,
    pub test_passed: usize,
    pub test_total: usize,
    pub timestamp: DateTime<Utc>,
}

impl IterationRecord {
    /// Score used to pick the best round: held-out when available.
    pub fn held_out_score(&self) -> f64 {
        self.test_pass_rate.unwrap_or(self.full_pass_rate)
    }
}

/// Why the loop ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    /// Full-set pass rate reached the target
    TargetMet,
    /// Train split is perfect; no signal left to improve against
    TrainSaturated,
    MaxIterations,
    ImproveFailed { message: String },
    /// The improver had nothing to fix
    NoFailures,
    /// The rewritten description matched the current one
    NoChange,
}

/// Final loop result
#[derive(Debug, Clone, Serialize)]
pub struct LoopResult {
    pub skill_name: String,
    pub original_description: String,
    pub final_description: String,
    pub iterations: Vec<IterationRecord>,
    pub best: Option<IterationRecord>,
    pub total_rounds: usize,
    pub converged: bool,
    pub stop_reason: StopReason,
}

/// Minimum eval-set size before any holdout is attempted
const MIN_CASES_FOR_HOLDOUT: usize = 4;

/// Stratified train/test split preserving label balance.
///
/// Per label group of size n: a singleton goes entirely to train; otherwise
/// `max(1, floor(n * holdout))` members are sampled into the test split.
/// Returns (train indices, test indices), each in eval-set order.
pub fn stratified_split<R: Rng>(
    cases: &[EvalCase],
    holdout: f64,
    rng: &mut R,
) -> (Vec<usize>, Vec<usize>) {
    let mut train = Vec::new();
    let mut test = Vec::new();

    for label in [true, false] {
        let mut group: Vec<usize> = (0..cases.len())
            .filter(|&i| cases[i].should_trigger == label)
            .collect();
        if group.len() <= 1 {
            train.extend(group);
            continue;
        }
        let test_n = ((group.len() as f64 * holdout).floor() as usize).max(1);
        group.shuffle(rng);
        test.extend(group.drain(..test_n.min(group.len())));
        train.extend(group);
    }

    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

/// Run the loop with the split chosen from `config.holdout`.
pub fn run_loop(
    skill: &mut Skill,
    cases: &[EvalCase],
    runner: &dyn QueryRunner,
    improver: &mut dyn Improver,
    eval_params: &EvalParams,
    config: &LoopConfig,
) -> Result<LoopResult> {
    let (train_idx, test_idx) = if config.holdout > 0.0 && cases.len() >= MIN_CASES_FOR_HOLDOUT {
        stratified_split(cases, config.holdout, &mut rand::thread_rng())
    } else {
        ((0..cases.len()).collect(), Vec::new())
    };
    run_loop_with_split(
        skill,
        cases,
        &train_idx,
        &test_idx,
        runner,
        improver,
        eval_params,
        config,
    )
}

/// Loop body with an explicit split; `run_loop` is the production entry.
#[allow(clippy::too_many_arguments)]
pub fn run_loop_with_split(
    skill: &mut Skill,
    cases: &[EvalCase],
    train_idx: &[usize],
    test_idx: &[usize],
    runner: &dyn QueryRunner,
    improver: &mut dyn Improver,
    eval_params: &EvalParams,
    config: &LoopConfig,
) -> Result<LoopResult> {
    let original_description = skill.description.clone();
    let mut description = skill.description.clone();
    let mut iterations: Vec<IterationRecord> = Vec::new();
    let mut best: Option<IterationRecord> = None;
    let mut round = 0usize;

    if let Some(dir) = &config.output_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output dir {}", dir.display()))?;
    }
    if config.verbose && !test_idx.is_empty() {
        eprintln!(
            "[loop] holdout: {} train cases, {} test cases",
            train_idx.len(),
            test_idx.len()
        );
    }

    let stop_reason = loop {
        round += 1;
        if config.verbose {
            eprintln!(
                "[loop] round {}/{}: evaluating {} cases",
                round,
                config.max_iterations,
                cases.len()
            );
        }

        // test cases are measured every round; they are only hidden from
        // the improvement prompt
        let report = evaluate(runner, &skill.name, &description, cases, eval_params);
        let train_report = report.subset(train_idx);
        let test_report = (!test_idx.is_empty()).then(|| report.subset(test_idx));

        let record = IterationRecord {
            round,
            description: description.clone(),
            full_pass_rate: report.pass_rate(),
            train_pass_rate: train_report.pass_rate(),
            test_pass_rate: test_report.as_ref().map(|r| r.pass_rate()),
            train_passed: train_report.summary.passed,
            train_total: train_report.summary.total,
            test_passed: test_report.as_ref().map(|r| r.summary.passed).unwrap_or(0),
            test_total: test_report.as_ref().map(|r| r.summary.total).unwrap_or(0),
            timestamp: Utc::now(),
        };
        iterations.push(record.clone());

        if best
            .as_ref()
            .map_or(true, |b| record.held_out_score() > b.held_out_score())
        {
            best = Some(record.clone());
        }

        if let Some(dir) = &config.output_dir {
            let snapshot = dir.join(format!("eval_round_{round}.json"));
            std::fs::write(&snapshot, serde_json::to_string_pretty(&train_report)?)
                .with_context(|| format!("failed to write {}", snapshot.display()))?;
        }

        if config.verbose {
            eprintln!(
                "[loop] round {}: full {:.0}%, train {:.0}%{}",
                round,
                record.full_pass_rate * 100.0,
                record.train_pass_rate * 100.0,
                record
                    .test_pass_rate
                    .map(|r| format!(", test {:.0}%", r * 100.0))
                    .unwrap_or_default()
            );
        }

        if record.full_pass_rate >= config.target_pass_rate {
            break StopReason::TargetMet;
        }
        if record.train_pass_rate >= 1.0 && round < config.max_iterations {
            break StopReason::TrainSaturated;
        }
        if round >= config.max_iterations {
            break StopReason::MaxIterations;
        }

        let request = ImproveRequest {
            skill_name: &skill.name,
            description: &description,
            body: &skill.body,
            report: &train_report,
        };
        let outcome = match improver.improve(&request) {
            Ok(outcome) => outcome,
            Err(e) => {
                eprintln!("[loop] improvement failed: {e:#}");
                break StopReason::ImproveFailed {
                    message: e.to_string(),
                };
            }
        };
        let new_description = match outcome {
            ImproveOutcome::Improved { description } => description,
            ImproveOutcome::NoFailures => break StopReason::NoFailures,
        };
        if new_description == description {
            break StopReason::NoChange;
        }

        if config.apply_to_file {
            match skill.replace_description(&new_description) {
                Ok(true) => {}
                Ok(false) => eprintln!(
                    "[loop] warning: current description not found in {}; file left unchanged",
                    skill.path.display()
                ),
                Err(e) => eprintln!("[loop] warning: could not rewrite skill file: {e:#}"),
            }
        } else {
            skill.description = new_description.clone();
        }
        description = new_description;
    };

    let converged = stop_reason == StopReason::TargetMet;
    let result = LoopResult {
        skill_name: skill.name.clone(),
        original_description,
        final_description: description,
        iterations,
        best,
        total_rounds: round,
        converged,
        stop_reason,
    };

    if let Some(dir) = &config.output_dir {
        let summary = dir.join("loop_summary.json");
        std::fs::write(&summary, serde_json::to_string_pretty(&result)?)
            .with_context(|| format!("failed to write {}", summary.display()))?;
    }

    Ok(result)
}
