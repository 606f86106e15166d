//! casegen CLI: generate cases locally or run the job orchestrator.

use std::sync::Arc;
use std::time::Duration;

use casegen::config::{Config, ExposeSecret};
use casegen::model::{
    CrimeKind, Difficulty, GenerationRequest, GradeLevel, JobId, JobStatus, PuzzleComplexity,
    Subject,
};
use casegen::orchestrator::{JobOrchestrator, OrchestratorConfig};
use casegen::pipeline::CaseGenerator;
use casegen::provider::ProviderRegistry;
use casegen::queue::pgmq::DEFAULT_QUEUE;
use casegen::queue::{ChannelQueue, PgmqQueue};
use casegen::store::{MemoryStore, PgStore};
use casegen::telemetry::{TelemetryConfig, init_telemetry};
use casegen::templates::TemplateCatalog;
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "casegen", about = "Fair, non-duplicate mystery cases for young detectives")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate one case in-process and print it as JSON
    Generate {
        #[command(flatten)]
        request: RequestArgs,
        /// Seconds to wait for the job
        #[arg(long, default_value_t = 60)]
        wait: u64,
    },
    /// Run the orchestrator against Postgres and pgmq
    Serve,
    /// Job operations against the shared store
    Job {
        #[command(subcommand)]
        action: JobAction,
    },
    /// List the crime templates in the built-in case book
    Templates,
}

#[derive(Subcommand)]
enum JobAction {
    /// Submit a generation job
    Submit {
        #[command(flatten)]
        request: RequestArgs,
    },
    /// Show a job
    Show {
        /// Job ID
        id: uuid::Uuid,
    },
    /// Cancel a pending or processing job
    Cancel {
        /// Job ID
        id: uuid::Uuid,
    },
}

#[derive(Args)]
struct RequestArgs {
    #[arg(long, default_value = "rookie")]
    difficulty: Difficulty,
    #[arg(long, default_value = "math")]
    subject: Subject,
    #[arg(long, default_value = "p4")]
    grade: GradeLevel,
    #[arg(long, default_value = "basic")]
    complexity: PuzzleComplexity,
    /// Pin the seed for a reproducible case
    #[arg(long)]
    seed: Option<u64>,
    /// Number of suspects (3-4)
    #[arg(long)]
    suspects: Option<usize>,
    /// Restrict to one kind of crime
    #[arg(long)]
    crime: Option<CrimeKind>,
}

impl RequestArgs {
    fn into_request(self) -> GenerationRequest {
        let mut request =
            GenerationRequest::new(self.difficulty, self.subject, self.grade, self.complexity);
        if let Some(seed) = self.seed {
            request = request.seed(seed);
        }
        if let Some(n) = self.suspects {
            request = request.suspect_count(n);
        }
        if let Some(kind) = self.crime {
            request = request.crime_kind(kind);
        }
        request
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Generate { request, wait } => {
            cmd_generate(&config, request.into_request(), Duration::from_secs(wait)).await
        }
        Command::Serve => cmd_serve(&config).await,
        Command::Job { action } => {
            let orchestrator = postgres_orchestrator(&config).await?;
            match action {
                JobAction::Submit { request } => {
                    let job = orchestrator.submit(request.into_request()).await?;
                    println!("Submitted: {} (status: {}, seed: {})", job.id, job.status, job.seed);
                    Ok(())
                }
                JobAction::Show { id } => cmd_job_show(&orchestrator, JobId(id)).await,
                JobAction::Cancel { id } => {
                    let job = orchestrator.cancel(JobId(id)).await?;
                    println!("Cancelled: {} (attempts: {})", job.id, job.attempts);
                    Ok(())
                }
            }
        }
        Command::Templates => cmd_templates(),
    }
}

async fn cmd_generate(
    config: &Config,
    request: GenerationRequest,
    wait: Duration,
) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig::from_config(config, "casegen"))?;
    let policy = config.policy()?;

    let orchestrator = JobOrchestrator::new(
        Arc::new(CaseGenerator::builtin(&policy)?),
        ProviderRegistry::from_config(config)?,
        Arc::new(MemoryStore::new()),
        Arc::new(ChannelQueue::new()),
        &policy,
        OrchestratorConfig::from_config(config),
    );
    let runner = orchestrator.start();

    let job = orchestrator.submit(request).await?;
    let job = orchestrator.await_terminal(job.id, wait).await?;
    orchestrator.shutdown();
    runner.await??;

    match (job.status, job.case_id) {
        (JobStatus::Completed, Some(case_id)) => {
            let case = orchestrator.fetch_case(case_id).await?;
            println!("{}", serde_json::to_string_pretty(&case)?);
            Ok(())
        }
        _ => {
            let reason = job
                .error
                .map(|e| format!("{}: {}", e.kind, e.message))
                .unwrap_or_else(|| job.status.to_string());
            anyhow::bail!("job {} did not complete: {reason}", job.id)
        }
    }
}

async fn cmd_serve(config: &Config) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig::from_config(config, "casegen"))?;
    let orchestrator = postgres_orchestrator(config).await?;

    let ctrl = orchestrator.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        ctrl.shutdown();
    });

    orchestrator.run().await?;
    Ok(())
}

async fn postgres_orchestrator(config: &Config) -> anyhow::Result<JobOrchestrator> {
    let url = config.require_database_url()?;
    let store = PgStore::connect(url.expose_secret()).await?;
    store.migrate().await?;
    let orchestrator_config = OrchestratorConfig::from_config(config);
    let queue = PgmqQueue::connect(
        store.pool().clone(),
        DEFAULT_QUEUE,
        orchestrator_config.job_timeout * 2,
    )
    .await?;
    let policy = config.policy()?;

    Ok(JobOrchestrator::new(
        Arc::new(CaseGenerator::builtin(&policy)?),
        ProviderRegistry::from_config(config)?,
        Arc::new(store),
        Arc::new(queue),
        &policy,
        orchestrator_config,
    ))
}

async fn cmd_job_show(orchestrator: &JobOrchestrator, id: JobId) -> anyhow::Result<()> {
    let job = orchestrator.status(id).await?;

    println!("ID:         {}", job.id);
    println!("Status:     {}", job.status);
    println!("Progress:   {}%", job.progress);
    println!("Attempts:   {}", job.attempts);
    println!("Seed:       {}", job.seed);
    println!(
        "Request:    {} {} {} {}",
        job.request.difficulty,
        job.request.subject,
        job.request.grade_level,
        job.request.puzzle_complexity
    );
    println!("Created:    {}", job.created_at);
    println!("Updated:    {}", job.updated_at);
    if let Some(finished) = job.finished_at {
        println!("Finished:   {finished}");
    }
    if let Some(case_id) = job.case_id {
        println!("Case:       {case_id}");
    }
    if let Some(ref err) = job.error {
        println!("Error:      {} ({})", err.message, err.kind);
    }
    Ok(())
}

fn cmd_templates() -> anyhow::Result<()> {
    let catalog = TemplateCatalog::builtin()?;
    println!(
        "{:<20}  {:<10}  {:<6}  {:<24}  DIFFICULTIES",
        "ID", "KIND", "STEPS", "SUBJECTS"
    );
    println!("{}", "-".repeat(90));
    for crime in &catalog.crimes {
        let subjects: Vec<String> = crime.subjects.iter().map(|s| s.to_string()).collect();
        let difficulties: Vec<String> = crime.difficulties.iter().map(|d| d.to_string()).collect();
        println!(
            "{:<20}  {:<10}  {:<6}  {:<24}  {}",
            crime.id,
            crime.kind.to_string(),
            crime.steps.len(),
            subjects.join(","),
            difficulties.join(",")
        );
    }
    println!("\n{} template(s)", catalog.crimes.len());
    Ok(())
}
