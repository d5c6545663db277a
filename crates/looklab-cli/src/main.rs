use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use looklab_contracts::chat::{parse_intent, Intent, CHAT_HELP_COMMANDS};
use looklab_contracts::events::EventWriter;
use looklab_contracts::grading::Preset;
use looklab_contracts::images::ImageHandle;
use looklab_contracts::models::ModelRegistry;
use looklab_contracts::{LookError, Remedy};
use looklab_engine::config::DRYRUN_PROVIDER;
use looklab_engine::{
    default_oracle_registry, EngineConfig, GenerationOutcome, LookPipeline, LookSession, Studio,
};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "looklab", version, about = "Reference-driven color grading for photo batches")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Score a reference image on the five look axes.
    Analyze(AnalyzeArgs),
    /// Analyze a reference, grade the first batch image and export.
    Run(RunArgs),
    /// Interactive session driven by slash commands.
    Chat(ChatArgs),
}

#[derive(Debug, Clone, Args)]
struct EngineArgs {
    /// `gemini` or `dryrun`; defaults to gemini.
    #[arg(long)]
    provider: Option<String>,
    #[arg(long)]
    analysis_model: Option<String>,
    #[arg(long)]
    image_model: Option<String>,
    #[arg(long)]
    events: Option<PathBuf>,
    /// Re-blend a cached max-strength look instead of calling out again.
    #[arg(long)]
    reuse_stylized: bool,
}

#[derive(Debug, Parser)]
struct AnalyzeArgs {
    #[arg(long)]
    reference: PathBuf,
    #[command(flatten)]
    engine: EngineArgs,
}

#[derive(Debug, Parser)]
struct RunArgs {
    #[arg(long)]
    reference: PathBuf,
    #[arg(long, num_args = 1.., required = true)]
    batch: Vec<PathBuf>,
    #[arg(long, default_value = "Estate")]
    preset: String,
    #[arg(long, default_value_t = 80, value_parser = clap::value_parser!(i64).range(0..=100))]
    intensity: i64,
    #[arg(long, value_parser = clap::value_parser!(i64).range(0..=100))]
    shadows: Option<i64>,
    #[arg(long, value_parser = clap::value_parser!(i64).range(0..=100))]
    highlights: Option<i64>,
    #[arg(long, default_value = "LookLab")]
    project: String,
    #[arg(long)]
    out: PathBuf,
    #[command(flatten)]
    engine: EngineArgs,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[arg(long)]
    out: PathBuf,
    #[command(flatten)]
    engine: EngineArgs,
}

/// Exit code when the host should offer a credential or quota prompt.
const EXIT_NEEDS_CREDENTIAL: i32 = 2;

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("looklab error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(async move {
        match cli.command {
            Command::Analyze(args) => run_analyze(args).await,
            Command::Run(args) => run_pipeline(args).await,
            Command::Chat(args) => run_chat(args).await,
        }
    })
}

struct Engine {
    config: EngineConfig,
    pipeline: LookPipeline,
}

impl Engine {
    fn build(args: &EngineArgs) -> Result<Self> {
        let mut config = match args.provider.as_deref().map(str::trim) {
            Some(DRYRUN_PROVIDER) => EngineConfig::dryrun(),
            Some(provider) if !provider.is_empty() => EngineConfig {
                provider: provider.to_string(),
                ..EngineConfig::from_env()
            },
            _ => EngineConfig::from_env(),
        };
        if let Some(model) = &args.analysis_model {
            config.analysis_model = model.clone();
        }
        if let Some(model) = &args.image_model {
            config.image_model = model.clone();
        }
        config.reuse_stylized = args.reuse_stylized;
        Self::from_config(config)
    }

    fn from_config(mut config: EngineConfig) -> Result<Self> {
        for reason in config.resolve_models(&ModelRegistry::default())? {
            warn!("{reason}");
        }
        let registry = default_oracle_registry(&config);
        let pipeline = LookPipeline::from_config(&config, &registry)?;
        Ok(Self { config, pipeline })
    }

    fn set_model(&mut self, analysis: Option<&str>, image: Option<&str>) -> Result<()> {
        let mut config = self.config.clone();
        if let Some(model) = analysis {
            config.analysis_model = model.to_string();
        }
        if let Some(model) = image {
            config.image_model = model.to_string();
        }
        *self = Self::from_config(config)?;
        Ok(())
    }
}

fn event_writer(events: Option<&Path>, out: &Path) -> EventWriter {
    let path = events
        .map(Path::to_path_buf)
        .unwrap_or_else(|| out.join("events.jsonl"));
    EventWriter::new(path, format!("s-{}", Utc::now().timestamp_millis()))
}

fn load_image(path: &Path) -> Result<ImageHandle> {
    if !path.is_file() {
        anyhow::bail!("image not found: {}", path.display());
    }
    Ok(ImageHandle::referenced(path))
}

fn exit_code_for(err: &LookError) -> i32 {
    if err.needs_credential_selection() {
        EXIT_NEEDS_CREDENTIAL
    } else {
        1
    }
}

fn report_failure(err: &LookError) {
    eprintln!("{} ({})", err, err.kind().as_str());
    let hint = match err.remedy() {
        Remedy::SelectCredential => {
            "Set LOOKLAB_API_KEY (or GEMINI_API_KEY) to a valid key, or use --provider dryrun."
        }
        Remedy::QuotaUpsell => "Quota exhausted for this key; select a key with available quota.",
        Remedy::SafetyNotice => "The image was refused by safety filters; try another image.",
        Remedy::Retry => "You can try again.",
        Remedy::None => return,
    };
    eprintln!("{hint}");
}

/// Ctrl-C cancels the returned token until the watcher is aborted.
fn cancel_on_ctrl_c() -> (CancellationToken, JoinHandle<()>) {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    (cancel, watcher)
}

async fn run_analyze(args: AnalyzeArgs) -> Result<i32> {
    let engine = Engine::build(&args.engine)?;
    let reference = load_image(&args.reference)?;
    match engine.pipeline.analyze(&reference).await {
        Ok(metrics) => {
            for (axis, value) in metrics.axes() {
                println!("{axis:<11} {value}");
            }
            Ok(0)
        }
        Err(err) => {
            report_failure(&err);
            Ok(exit_code_for(&err))
        }
    }
}

async fn run_pipeline(args: RunArgs) -> Result<i32> {
    let engine = Engine::build(&args.engine)?;
    std::fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create {}", args.out.display()))?;
    let mut session = LookSession::with_events(event_writer(args.engine.events.as_deref(), &args.out));

    let reference = load_image(&args.reference)?;
    let batch = args
        .batch
        .iter()
        .map(|path| load_image(path))
        .collect::<Result<Vec<_>>>()?;

    session.set_preset(args.preset.parse::<Preset>()?);
    session.set_intensity(args.intensity)?;
    if let Some(value) = args.shadows {
        session.set_shadows(value)?;
    }
    if let Some(value) = args.highlights {
        session.set_highlights(value)?;
    }

    match session.load_reference(&engine.pipeline, reference).await {
        Ok(outcome) => {
            if let Some(reason) = &outcome.degraded {
                println!("Analysis unavailable ({reason}); using neutral metrics.");
            }
            print_metrics(&session);
        }
        Err(err) => {
            report_failure(&err);
            return Ok(exit_code_for(&err));
        }
    }
    session.upload_batch(batch)?;

    let (cancel, watcher) = cancel_on_ctrl_c();
    let outcome = session.generate(&engine.pipeline, &cancel).await;
    watcher.abort();
    match outcome {
        Ok(GenerationOutcome::Committed(version)) => {
            println!("Created {} ({})", version.name, version.id);
        }
        Ok(GenerationOutcome::Discarded) => {
            println!("Generation discarded.");
            return Ok(1);
        }
        Err(err) => {
            report_failure(&err);
            return Ok(exit_code_for(&err));
        }
    }

    let root = session.write_export(&args.out, &args.project)?;
    let master = session.write_master(&root, Utc::now().date_naive())?;
    println!("Exported to {}", root.display());
    println!("Master reference saved to {}", master.display());
    Ok(0)
}

fn print_metrics(session: &LookSession) {
    let metrics = session.metrics();
    let parts: Vec<String> = metrics
        .axes()
        .iter()
        .map(|(axis, value)| format!("{axis}={value}"))
        .collect();
    println!("Metrics: {}", parts.join(" "));
}

fn print_status(studio: &Studio, engine: &Engine) {
    let session = studio.session();
    let params = session.params();
    println!(
        "Project: {} | provider {} | models {} / {}",
        studio.project_name(),
        engine.config.provider,
        engine.config.analysis_model,
        engine.config.image_model
    );
    println!(
        "Reference: {} | preset {} | intensity {} | shadows {} | highlights {}",
        if session.reference().is_some() { "loaded" } else { "none" },
        params.preset,
        params.intensity,
        params.shadows,
        params.highlights
    );
    print_metrics(session);
    for (idx, item) in session.batch().items().iter().enumerate() {
        let score = item
            .quality_score()
            .map(|score| format!(" score {score}"))
            .unwrap_or_default();
        println!("  [{idx}] {} {}{score}", item.id(), item.status().as_str());
    }
    println!("Versions: {}", session.history().len());
}

/// Applies one `/preset`, `/intensity`, `/shadows` or `/highlights` update.
fn apply_setting(session: &mut LookSession, key: &str, raw: &str) -> Result<String, LookError> {
    let raw = raw.trim();
    if key == "preset" {
        let preset = raw.parse::<Preset>()?;
        session.set_preset(preset);
        return Ok(format!("Preset set to {preset}"));
    }
    let value = raw
        .parse::<i64>()
        .map_err(|_| LookError::InvalidInput(format!("{key} needs a number in 0..=100")))?;
    match key {
        "intensity" => session.set_intensity(value)?,
        "shadows" => session.set_shadows(value)?,
        "highlights" => session.set_highlights(value)?,
        other => return Err(LookError::InvalidInput(format!("unknown setting '{other}'"))),
    }
    Ok(format!("{key} set to {value}"))
}

async fn run_chat(args: ChatArgs) -> Result<i32> {
    let mut engine = Engine::build(&args.engine)?;
    std::fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create {}", args.out.display()))?;
    let events = event_writer(args.engine.events.as_deref(), &args.out);
    let mut studio = Studio::seeded(Some(events));
    info!(out = %args.out.display(), "chat session started");

    println!("LookLab chat started. Type /help for commands.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let intent = parse_intent(&line);
        if intent.action == "noop" {
            continue;
        }
        if let Err(err) = handle_intent(&intent, &mut studio, &mut engine, &args.out).await {
            match err.downcast_ref::<LookError>() {
                Some(look) => report_failure(look),
                None => eprintln!("Error: {err:#}"),
            }
        }
    }
    Ok(0)
}

async fn handle_intent(
    intent: &Intent,
    studio: &mut Studio,
    engine: &mut Engine,
    out: &Path,
) -> Result<()> {
    match intent.action.as_str() {
        "help" => {
            println!("Commands: {}", CHAT_HELP_COMMANDS.join(" "));
        }
        "set_analysis_model" | "set_image_model" => {
            let model = intent.arg_str("value").unwrap_or_default().trim();
            if model.is_empty() {
                println!("/{} requires a model name", command_name(&intent.action));
                return Ok(());
            }
            if intent.action == "set_analysis_model" {
                engine.set_model(Some(model), None)?;
            } else {
                engine.set_model(None, Some(model))?;
            }
            println!(
                "Models: {} / {}",
                engine.config.analysis_model, engine.config.image_model
            );
        }
        "update_settings" => {
            let session = studio.session_mut();
            for (key, value) in &intent.settings_update {
                let raw = value.as_str().unwrap_or_default();
                println!("{}", apply_setting(session, key, raw)?);
            }
        }
        "load_reference" => {
            let Some(path) = non_empty(intent.arg_str("path")) else {
                println!("/reference requires a path");
                return Ok(());
            };
            let reference = load_image(Path::new(path))?;
            let session = studio.session_mut();
            let outcome = session.load_reference(&engine.pipeline, reference).await?;
            if let Some(reason) = &outcome.degraded {
                println!("Analysis unavailable ({reason}); using neutral metrics.");
            }
            print_metrics(session);
        }
        "upload_batch" => {
            let paths = intent.arg_list("paths");
            if paths.is_empty() {
                println!("/batch requires one or more paths");
                return Ok(());
            }
            let images = paths
                .iter()
                .map(|path| load_image(Path::new(path)))
                .collect::<Result<Vec<_>>>()?;
            let ids = studio.session_mut().upload_batch(images)?;
            println!("Added {} image(s): {}", ids.len(), ids.join(", "));
        }
        "generate" => {
            let (cancel, watcher) = cancel_on_ctrl_c();
            let outcome = studio
                .session_mut()
                .generate(&engine.pipeline, &cancel)
                .await;
            watcher.abort();
            match outcome? {
                GenerationOutcome::Committed(version) => {
                    println!("Created {} ({})", version.name, version.id);
                }
                GenerationOutcome::Discarded => println!("Generation discarded."),
            }
        }
        "list_versions" => {
            let history = studio.session().history();
            if history.is_empty() {
                println!("No versions yet.");
            }
            for version in history.list() {
                println!(
                    "{} {} | intensity {} | {}",
                    version.id, version.name, version.params.intensity, version.created_at
                );
            }
        }
        "restore_version" => {
            let Some(id) = non_empty(intent.arg_str("path")) else {
                println!("/restore requires a version id");
                return Ok(());
            };
            let restored = studio.session_mut().restore(id)?;
            println!(
                "Restored {id}: preset {} intensity {}",
                restored.params.preset, restored.params.intensity
            );
        }
        "export" => {
            let dir = intent.arg_str("dir").map(PathBuf::from);
            let dir = dir.as_deref().unwrap_or(out);
            let name = studio.project_name().to_string();
            let root = studio.session().write_export(dir, &name)?;
            println!("Exported to {}", root.display());
        }
        "save_master" => {
            let path = studio
                .session()
                .write_master(out, Utc::now().date_naive())?;
            println!("Saved {}", path.display());
        }
        "save_processed" => {
            let item = non_empty(intent.arg_str("path"));
            let path = studio.session().write_processed(out, item)?;
            println!("Saved {}", path.display());
        }
        "project" => handle_project(&intent.arg_list("paths"), studio)?,
        "list_projects" => {
            let active = studio.active().map(|project| project.id.clone());
            for project in studio.catalog().list() {
                let marker = if Some(&project.id) == active.as_ref() { "*" } else { " " };
                println!(
                    "{marker} {} {} | {} | {} | {}",
                    project.id, project.name, project.client, project.kind, project.date
                );
            }
        }
        "status" => print_status(studio, engine),
        _ => {
            if intent.raw.trim_start().starts_with('/') {
                let command = intent
                    .command_args
                    .get("command")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                println!("Unknown command: /{command}. Type /help.");
            } else {
                println!("Commands start with '/'. Type /help.");
            }
        }
    }
    Ok(())
}

fn handle_project(args: &[String], studio: &mut Studio) -> Result<()> {
    match args {
        [] => println!("Active project: {}", studio.project_name()),
        [verb, rest @ ..] if verb == "new" => {
            studio.new_project();
            if rest.is_empty() {
                println!("Started a new project.");
            } else {
                let project = studio.save_project(&rest.join(" "))?;
                println!("Created {} ({})", project.name, project.id);
            }
        }
        [verb, rest @ ..] if verb == "save" => {
            let project = studio.save_project(&rest.join(" "))?;
            println!("Saved as {} ({})", project.name, project.id);
        }
        [verb, id] if verb == "delete" => {
            let removed = studio.delete_project(id)?;
            println!(
                "Deleted {}. Active project: {}",
                removed.name,
                studio.project_name()
            );
        }
        [id] => {
            let project = studio.select_project(id)?;
            println!("Switched to {} ({})", project.name, project.client);
        }
        _ => println!("Usage: /project <id> | new [name] | save <name> | delete <id>"),
    }
    Ok(())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn command_name(action: &str) -> &str {
    action.strip_prefix("set_").unwrap_or(action)
}
