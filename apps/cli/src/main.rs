use std::{path::PathBuf, time::Instant};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use console::style;
use insight_core::{
    ClientConfig, HttpAuditService, MediaFile, ReviewWorkflow, WorkflowError,
    format_draft_readable, format_transcript_excerpt,
};
use tokio::fs;
use tracing_subscriber::EnvFilter;

use crate::{
    edits::{DraftEdits, load_draft, save_draft},
    progress::{create_spinner, finish_failed, finish_ok, format_duration},
};

mod edits;
mod progress;

const TRANSCRIPT_PREVIEW_CHARS: usize = 400;

#[derive(Parser)]
#[command(name = "insight")]
#[command(about = "Analyze a recorded class and render its pedagogical audit report")]
struct Cli {
    /// Class recording (video or audio)
    video: PathBuf,

    #[arg(long, default_value = "Profesor")]
    teacher: String,

    #[arg(long, default_value = "Estudiante")]
    student: String,

    #[arg(long, default_value_t = 1)]
    session_number: u32,

    #[arg(long, default_value_t = 8)]
    total_sessions: u32,

    /// Session date (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Logo image shown on the rendered report
    #[arg(long)]
    logo: Option<PathBuf>,

    /// Photo of the session shown on the rendered report
    #[arg(long)]
    photo: Option<PathBuf>,

    /// Replace the analyzed draft with one read from a JSON file
    #[arg(long, value_name = "FILE")]
    draft_in: Option<PathBuf>,

    /// Remove an objective by its 1-based number (repeatable)
    #[arg(long = "drop-objective", value_name = "N",
          value_parser = clap::value_parser!(u64).range(1..))]
    drop_objectives: Vec<u64>,

    /// Append an objective (repeatable)
    #[arg(long = "objective", value_name = "TEXT")]
    objectives: Vec<String>,

    #[arg(long)]
    desarrollo: Option<String>,

    #[arg(long)]
    actitud: Option<String>,

    #[arg(long)]
    recomendaciones: Option<String>,

    /// Write the reviewed draft as JSON
    #[arg(long, value_name = "FILE")]
    draft_out: Option<PathBuf>,

    /// Stop after the analysis; do not generate the report
    #[arg(long)]
    analyze_only: bool,

    /// Where to save the rendered report image
    #[arg(short, long, default_value = "reporte.png")]
    output: PathBuf,

    /// Audit service base URL (overrides INSIGHT_API_URL)
    #[arg(long)]
    api_url: Option<String>,

    /// Log workflow activity to stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn draft_edits(&mut self) -> DraftEdits {
        DraftEdits {
            replacement: None,
            drop_objectives: self
                .drop_objectives
                .iter()
                .map(|n| (*n - 1) as usize)
                .collect(),
            add_objectives: std::mem::take(&mut self.objectives),
            desarrollo: self.desarrollo.take(),
            actitud: self.actitud.take(),
            recomendaciones: self.recomendaciones.take(),
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "error" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// The message a user should see, falling back to the error itself.
fn failure_message(err: &WorkflowError) -> String {
    err.user_message()
        .map(str::to_string)
        .unwrap_or_else(|| err.to_string())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(mut cli: Cli) -> Result<()> {
    let mut config = ClientConfig::from_env()?;
    if let Some(api_url) = cli.api_url.as_deref() {
        config = config.with_base_url(api_url)?;
    }
    let service = HttpAuditService::new(config)?;
    let workflow = ReviewWorkflow::new(service);

    workflow.update_metadata(|metadata| {
        metadata.teacher_name = cli.teacher.clone();
        metadata.student_name = cli.student.clone();
        metadata.session_number = cli.session_number;
        metadata.total_sessions = cli.total_sessions;
        if let Some(date) = cli.date {
            metadata.session_date = date;
        }
    })?;

    let mut updates = workflow.subscribe();
    tokio::spawn(async move {
        let mut last = updates.borrow_and_update().phase;
        while updates.changed().await.is_ok() {
            let phase = updates.borrow_and_update().phase;
            if phase != last {
                tracing::debug!(from = %last, to = %phase, "phase changed");
                last = phase;
            }
        }
    });

    let video = MediaFile::from_path(&cli.video).await?;
    workflow.stage_video(video)?;
    if let Some(path) = cli.logo.as_deref() {
        workflow.stage_logo(Some(MediaFile::from_path(path).await?))?;
    }
    if let Some(path) = cli.photo.as_deref() {
        workflow.stage_session_photo(Some(MediaFile::from_path(path).await?))?;
    }

    println!(
        "\n{}  {}\n",
        style("insight").cyan().bold(),
        style("Auditoría pedagógica").dim()
    );
    println!("{}", style("─".repeat(60)).dim());

    let total_start = Instant::now();

    // Step 1: Analyze
    let step_start = Instant::now();
    let spinner = create_spinner("Analizando la clase...");
    if let Err(e) = workflow.submit_analysis().await {
        finish_failed(&spinner, "Análisis fallido");
        anyhow::bail!(failure_message(&e));
    }
    finish_ok(&spinner, "Clase analizada", step_start.elapsed());

    let snapshot = workflow.snapshot();
    if let Some(transcript) = snapshot.transcript.as_deref() {
        println!(
            "\n{}\n{}",
            style("Transcripción:").dim(),
            format_transcript_excerpt(transcript, TRANSCRIPT_PREVIEW_CHARS)
        );
    }

    // Step 2: Review
    let mut edits = cli.draft_edits();
    if let Some(path) = cli.draft_in.as_deref() {
        edits.replacement = Some(load_draft(path).await?);
    }
    if !edits.is_empty() {
        edits.apply(&workflow)?;
        println!("{} Borrador editado", style("✓").green().bold());
    }

    let snapshot = workflow.snapshot();
    let draft = snapshot
        .draft
        .context("el análisis no produjo un borrador")?;
    println!("{}", style("─".repeat(60)).dim());
    println!("{}", format_draft_readable(&draft, &snapshot.metadata));
    println!("{}", style("─".repeat(60)).dim());

    if let Some(path) = cli.draft_out.as_deref() {
        save_draft(&draft, path).await?;
        println!(
            "{} {}",
            style("Borrador:").dim(),
            style(path.display()).cyan()
        );
    }

    if cli.analyze_only {
        return Ok(());
    }

    // Step 3: Generate
    let step_start = Instant::now();
    let spinner = create_spinner("Generando el reporte...");
    if let Err(e) = workflow.submit_report().await {
        finish_failed(&spinner, "Generación fallida");
        anyhow::bail!(failure_message(&e));
    }
    finish_ok(&spinner, "Reporte generado", step_start.elapsed());

    // Step 4: Download
    let has_image = workflow
        .snapshot()
        .report
        .is_some_and(|report| report.report_url.is_some());
    if has_image {
        let step_start = Instant::now();
        let spinner = create_spinner("Descargando el reporte...");
        let image = match workflow.download_report().await {
            Ok(image) => image,
            Err(e) => {
                finish_failed(&spinner, "Descarga fallida");
                anyhow::bail!(failure_message(&e));
            }
        };
        fs::write(&cli.output, &image)
            .await
            .with_context(|| format!("No se pudo escribir {}", cli.output.display()))?;
        finish_ok(&spinner, "Reporte descargado", step_start.elapsed());

        println!(
            "\n{} {}",
            style("Guardado:").dim(),
            style(cli.output.display()).cyan()
        );
    } else {
        println!(
            "{} El servicio no devolvió una imagen del reporte",
            style("!").yellow().bold()
        );
    }

    println!(
        "\n{} {}\n",
        style("Tiempo total:").dim(),
        style(format_duration(total_start.elapsed())).cyan().bold()
    );

    Ok(())
}
