//! skillforge: author, validate, package, and tune skill definitions.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use skillforge::config::Config;
use skillforge::evalset::load_eval_set;
use skillforge::evaluator::{evaluate, EvalParams};
use skillforge::history::History;
use skillforge::improve::CliImprover;
use skillforge::optimize::{run_loop, LoopConfig};
use skillforge::package::package_skill;
use skillforge::report;
use skillforge::runner::{ensure_agent_available, AgentRunner};
use skillforge::skills::{create_skill, validate_skill, Skill};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "skillforge", version, about = "Author, validate, package, and tune agent skills")]
struct Cli {
    /// Print progress diagnostics to stderr
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check skill frontmatter against the authoring constraints
    Validate {
        /// Skill directories or SKILL.md files
        paths: Vec<PathBuf>,
    },
    /// Scaffold a new skill directory
    New {
        /// Skill name (lowercase letters, numbers, hyphens)
        name: String,
        /// Parent directory for the new skill
        #[arg(long, default_value = ".")]
        dir: PathBuf,
        /// Initial description
        #[arg(long)]
        description: Option<String>,
    },
    /// Package a validated skill directory into a zip archive
    Package {
        skill_dir: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Measure how reliably the skill's description triggers
    Eval {
        #[command(flatten)]
        common: EvalArgs,
        /// Write the report to a JSON file (also printed to stdout)
        #[arg(long)]
        json: Option<PathBuf>,
        /// Render the report to an HTML file
        #[arg(long)]
        html: Option<PathBuf>,
    },
    /// Iteratively rewrite the description until the eval set passes
    Improve {
        #[command(flatten)]
        common: EvalArgs,
        /// Maximum evaluate-improve rounds
        #[arg(long, default_value_t = 5)]
        max_iterations: usize,
        /// Full-set pass rate that counts as converged
        #[arg(long, default_value_t = 1.0)]
        target: f64,
        /// Fraction of eval cases withheld from the improvement prompt
        #[arg(long, default_value_t = 0.2)]
        holdout: f64,
        /// Write each improved description back into the skill file
        #[arg(long)]
        apply: bool,
        /// Directory for per-round snapshots and the loop summary
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Improvement history file (default: .history.json next to the skill)
        #[arg(long)]
        history: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct EvalArgs {
    /// Skill directory or SKILL.md file
    #[arg(long)]
    skill: PathBuf,
    /// Eval-set JSON file
    #[arg(long)]
    evals: PathBuf,
    /// Directory the agent runs in
    #[arg(long, default_value = ".")]
    project_root: PathBuf,
    /// Runs per query
    #[arg(long)]
    runs: Option<usize>,
    /// Worker pool width
    #[arg(long)]
    workers: Option<usize>,
    /// Trigger-rate pass threshold
    #[arg(long)]
    threshold: Option<f64>,
    /// Per-run timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
    /// Model identifier passed through to the agent CLI
    #[arg(long)]
    model: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Validate { paths } => cmd_validate(&paths, cli.verbose),
        Commands::New {
            name,
            dir,
            description,
        } => {
            let config = Config::load(&dir)?;
            let path = create_skill(&dir, &name, description.as_deref(), &config.constraints)?;
            println!("{}", path.display());
            Ok(())
        }
        Commands::Package { skill_dir, output } => {
            let config = Config::load(&skill_dir)?;
            let out = package_skill(&skill_dir, output.as_deref(), &config.constraints)?;
            println!("{}", out.display());
            Ok(())
        }
        Commands::Eval { common, json, html } => cmd_eval(common, json, html, cli.verbose),
        Commands::Improve {
            common,
            max_iterations,
            target,
            holdout,
            apply,
            output_dir,
            history,
        } => cmd_improve(
            common,
            max_iterations,
            target,
            holdout,
            apply,
            output_dir,
            history,
            cli.verbose,
        ),
    }
}

fn cmd_validate(paths: &[PathBuf], verbose: bool) -> Result<()> {
    if paths.is_empty() {
        return Err(anyhow!("no skill paths given"));
    }
    let mut failures = 0usize;
    for path in paths {
        let config = Config::load(path)?;
        match Skill::load(path) {
            Ok(skill) => {
                let problems = validate_skill(&skill, &config.constraints);
                if problems.is_empty() {
                    if verbose {
                        eprintln!("[validate] {}: ok", path.display());
                    }
                } else {
                    failures += 1;
                    eprintln!("{}:", path.display());
                    for problem in problems {
                        eprintln!("  - {problem}");
                    }
                }
            }
            Err(e) => {
                failures += 1;
                eprintln!("{}: {e:#}", path.display());
            }
        }
    }
    if failures > 0 {
        return Err(anyhow!("{failures} skill(s) failed validation"));
    }
    println!("{} skill(s) valid", paths.len());
    Ok(())
}

struct EvalSetup {
    config: Config,
    skill: Skill,
    cases: Vec<skillforge::evalset::EvalCase>,
    runner: AgentRunner,
    params: EvalParams,
}

fn setup_eval(args: &EvalArgs, verbose: bool) -> Result<EvalSetup> {
    let config = Config::load(&args.project_root)?;
    ensure_agent_available(&config.agent_bin)?;

    if !args.project_root.is_dir() {
        return Err(anyhow!(
            "project root {} does not exist",
            args.project_root.display()
        ));
    }
    let skill = Skill::load(&args.skill)?;
    let cases = load_eval_set(&args.evals)?;
    if cases.is_empty() {
        return Err(anyhow!("eval set {} is empty", args.evals.display()));
    }

    let runner = AgentRunner {
        agent_bin: config.agent_bin.clone(),
        project_root: args.project_root.clone(),
        timeout: Duration::from_secs(args.timeout.unwrap_or(config.eval.run_timeout_secs)),
        model: args.model.clone(),
        trigger_tools: config.trigger_tools.clone(),
        verbose,
    };
    let params = EvalParams {
        runs_per_query: args.runs.unwrap_or(config.eval.runs_per_query),
        workers: args.workers.unwrap_or(config.eval.workers),
        threshold: args.threshold.unwrap_or(config.eval.threshold),
        verbose,
    };

    Ok(EvalSetup {
        config,
        skill,
        cases,
        runner,
        params,
    })
}

fn cmd_eval(
    args: EvalArgs,
    json: Option<PathBuf>,
    html: Option<PathBuf>,
    verbose: bool,
) -> Result<()> {
    let setup = setup_eval(&args, verbose)?;
    if verbose {
        eprintln!(
            "[eval] {} queries x {} runs, {} workers",
            setup.cases.len(),
            setup.params.runs_per_query,
            setup.params.workers
        );
    }

    let report = evaluate(
        &setup.runner,
        &setup.skill.name,
        &setup.skill.description,
        &setup.cases,
        &setup.params,
    );

    println!("{}", serde_json::to_string_pretty(&report)?);
    if let Some(path) = json {
        report::write_json(&report, &path)?;
    }
    if let Some(path) = html {
        report::write_html(&report, &path)?;
        if verbose {
            eprintln!("[eval] HTML report written to {}", path.display());
        }
    }

    if verbose && report.summary.failed > 0 {
        eprintln!(
            "[eval] {} of {} queries failed",
            report.summary.failed, report.summary.total
        );
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_improve(
    args: EvalArgs,
    max_iterations: usize,
    target: f64,
    holdout: f64,
    apply: bool,
    output_dir: Option<PathBuf>,
    history_path: Option<PathBuf>,
    verbose: bool,
) -> Result<()> {
    if !(0.0..1.0).contains(&holdout) {
        return Err(anyhow!("--holdout must be in [0, 1)"));
    }
    let mut setup = setup_eval(&args, verbose)?;

    let history_path = history_path.unwrap_or_else(|| {
        setup
            .skill
            .path
            .parent()
            .unwrap_or_else(|| std::path::Path::new("."))
            .join(".history.json")
    });
    let mut improver = CliImprover {
        agent_bin: setup.config.agent_bin.clone(),
        model: args.model.clone(),
        timeout: Duration::from_secs(setup.config.eval.improve_timeout_secs),
        constraints: setup.config.constraints.clone(),
        history: History::load(&history_path)?,
        verbose,
    };

    let loop_config = LoopConfig {
        max_iterations,
        target_pass_rate: target,
        holdout,
        apply_to_file: apply,
        output_dir,
        verbose,
    };

    let result = run_loop(
        &mut setup.skill,
        &setup.cases,
        &setup.runner,
        &mut improver,
        &setup.params,
        &loop_config,
    )?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    if !apply && result.final_description != result.original_description {
        eprintln!(
            "[improve] final description (not applied; re-run with --apply to write it):\n{}",
            result.final_description
        );
    }
    Ok(())
}
