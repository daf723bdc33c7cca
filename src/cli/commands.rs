//! CLI command definitions for eduforge.
//!
//! Runs the orchestration engine in-process with stub producers and an
//! in-memory job store, which is enough to exercise both routes end to
//! end from a terminal.

use clap::Parser;
use std::fs;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::config::{CompletionPolicy, EngineConfig};
use crate::job::InMemoryJobStore;
use crate::modes::{DependencyOverrides, ModeName};
use crate::orchestrator::{BroadRequest, Orchestrator, RemedialRequest};
use crate::persistence::InMemoryPersistence;
use crate::producer::{ProducerRegistry, StubProducer};
use crate::remedy::GapRecord;

/// Default mode set for broad submissions.
const DEFAULT_MODES: &str = "reading,solving,assessment";

/// Educational content job orchestrator.
#[derive(Parser)]
#[command(name = "eduforge")]
#[command(about = "Orchestrate multi-mode educational content jobs")]
#[command(version)]
#[command(
    long_about = "eduforge builds a dependency graph over the requested learning modes,\nruns their producers concurrently, and tracks each job to completion.\n\nExample usage:\n  eduforge submit --topic fractions --grade-level grade-5 --modes reading,solving,assessment"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Submit a broad content job and wait for it to finish.
    #[command(alias = "gen")]
    Submit(SubmitArgs),

    /// Run gap-driven remediation sessions for a student.
    Remediate(RemediateArgs),

    /// List the known learning modes and their dependencies.
    Modes,
}

/// Arguments for `eduforge submit`.
#[derive(Parser, Debug)]
pub struct SubmitArgs {
    /// Topic the content targets.
    #[arg(short, long)]
    pub topic: String,

    /// Grade level of the audience.
    #[arg(short, long, default_value = "grade-5")]
    pub grade_level: String,

    /// Comma-separated modes to generate.
    #[arg(short, long, default_value = DEFAULT_MODES)]
    pub modes: String,

    /// Session duration in minutes (5-90).
    #[arg(short, long, default_value = "30")]
    pub duration: u32,

    /// Optional curriculum goal.
    #[arg(long)]
    pub goal: Option<String>,

    /// YAML file with dependency overrides.
    #[arg(long)]
    pub overrides: Option<String>,

    /// Complete the job even if some modes fail.
    #[arg(long)]
    pub best_effort: bool,
}

/// Arguments for `eduforge remediate`.
#[derive(Parser, Debug)]
pub struct RemediateArgs {
    /// Student reference.
    #[arg(short, long)]
    pub student: String,

    /// Grade level the student is working at.
    #[arg(short, long, default_value = "grade-5")]
    pub grade_level: String,

    /// Gap codes to remediate (repeatable).
    #[arg(long = "gap", required = true)]
    pub gaps: Vec<String>,

    /// Session duration in minutes (5-40).
    #[arg(short, long, default_value = "20")]
    pub duration: u32,
}

/// Parses CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parses CLI arguments and runs the selected command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Runs the selected command with already-parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Submit(args) => submit(args).await,
        Commands::Remediate(args) => remediate(args).await,
        Commands::Modes => {
            list_modes();
            Ok(())
        }
    }
}

fn build_engine(config: EngineConfig) -> Arc<Orchestrator> {
    let mut registry = ProducerRegistry::new();
    registry.register_all(Arc::new(StubProducer::new()));
    Arc::new(Orchestrator::new(
        config,
        Arc::new(registry),
        Arc::new(InMemoryJobStore::new()),
        Arc::new(InMemoryPersistence::new()),
    ))
}

fn parse_modes(spec: &str) -> anyhow::Result<Vec<ModeName>> {
    spec.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| ModeName::from_str(s).map_err(Into::into))
        .collect()
}

async fn submit(args: SubmitArgs) -> anyhow::Result<()> {
    let modes = parse_modes(&args.modes)?;
    let overrides = match &args.overrides {
        Some(path) => DependencyOverrides::from_yaml(&fs::read_to_string(path)?)?,
        None => DependencyOverrides::default(),
    };

    let mut config = EngineConfig::from_env()?;
    if args.best_effort {
        config = config.with_completion_policy(CompletionPolicy::BestEffort);
    }
    let orchestrator = build_engine(config);

    let mut request = BroadRequest::new(&args.topic, &args.grade_level)
        .with_modes(modes)
        .with_duration_minutes(args.duration)
        .with_overrides(overrides);
    if let Some(goal) = &args.goal {
        request = request.with_curriculum_goal(goal.clone());
    }

    let job_id = orchestrator.submit_broad(request).await?;
    info!(%job_id, "Job submitted");

    let job = orchestrator.await_terminal(job_id).await?;
    println!("job {} finished: {} ({}%)", job.id, job.status, job.progress);
    if let Some(error) = &job.error {
        println!("error: {}", error);
    }
    if job.result.is_some() {
        let result = orchestrator.result(job_id).await?;
        println!("{}", serde_json::to_string_pretty(&result)?);
    }
    Ok(())
}

async fn remediate(args: RemediateArgs) -> anyhow::Result<()> {
    let orchestrator = build_engine(EngineConfig::from_env()?);

    let mut request =
        RemedialRequest::new(&args.student, &args.grade_level).with_duration_minutes(args.duration);
    for code in &args.gaps {
        request = request.with_gap(GapRecord::new(code));
    }

    let job_id = orchestrator.submit_remedial(request).await?;
    info!(%job_id, "Remedial job submitted");

    let job = orchestrator.await_terminal(job_id).await?;
    println!("job {} finished: {} ({}%)", job.id, job.status, job.progress);
    if let Some(error) = &job.error {
        println!("error: {}", error);
    }

    let reports = orchestrator.sessions_for_job(job_id).await;
    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}

fn list_modes() {
    for mode in ModeName::ALL {
        let deps = mode.static_dependencies();
        if deps.is_empty() {
            println!("{}", mode);
        } else {
            let names: Vec<&str> = deps.iter().map(|d| d.as_str()).collect();
            println!("{} (after: {})", mode, names.join(", "));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_modes() {
        let modes = parse_modes("reading, solving,assessment").unwrap();
        assert_eq!(
            modes,
            vec![ModeName::Reading, ModeName::Solving, ModeName::Assessment]
        );
    }

    #[test]
    fn test_parse_modes_rejects_unknown() {
        assert!(parse_modes("reading,osmosis").is_err());
    }

    #[test]
    fn test_overrides_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overrides.yaml");
        fs::write(&path, "best_effort:\n  - assessment\n").unwrap();

        let overrides =
            DependencyOverrides::from_yaml(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(overrides.best_effort, vec![ModeName::Assessment]);
    }

    #[test]
    fn test_cli_parses_submit() {
        let cli = Cli::try_parse_from([
            "eduforge", "submit", "--topic", "fractions", "--modes", "reading,assessment",
        ])
        .unwrap();
        match cli.command {
            Commands::Submit(args) => {
                assert_eq!(args.topic, "fractions");
                assert_eq!(args.grade_level, "grade-5");
                assert_eq!(args.duration, 30);
            }
            _ => panic!("expected submit command"),
        }
    }

    #[test]
    fn test_cli_parses_remediate_gaps() {
        let cli = Cli::try_parse_from([
            "eduforge",
            "remediate",
            "--student",
            "s-1",
            "--gap",
            "fraction_solve_problem",
            "--gap",
            "definition_recall",
        ])
        .unwrap();
        match cli.command {
            Commands::Remediate(args) => {
                assert_eq!(args.gaps.len(), 2);
                assert_eq!(args.duration, 20);
            }
            _ => panic!("expected remediate command"),
        }
    }
}
