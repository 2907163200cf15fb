use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use scan_dataset_builder::{
    augment::{self, Augmenter},
    capabilities::{StagedExtractor, TextRecognizer},
    config::{AppConfig, AugmentConfig, EmptyTextPolicy, PipelineConfig},
    history::{FileHistory, MemoryHistory},
    llm::LlmManager,
    ocr::{PlainTextReader, TesseractOcr},
    output::MirroredWriter,
    pipeline::Pipeline,
    quota,
    scanner::{self, InputFilter},
};

#[derive(Parser)]
#[command(
    name = "scan-dataset",
    version,
    about = "Construye datasets multilingües a partir de escaneos"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// OCR + metadatos + traducciones de los escaneos.
    Process(ProcessArgs),
    /// Igual que `process`, sobre contenido `.txt` ya clasificado por carpeta.
    Label(ProcessArgs),
    /// Genera variantes sintéticas hasta equilibrar las categorías.
    Augment(AugmentArgs),
    /// Muestra el reparto de variantes sin llamar a ningún servicio.
    Plan(AugmentArgs),
}

#[derive(Args)]
struct ProcessArgs {
    #[arg(long)]
    input: Option<PathBuf>,
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long)]
    history: Option<PathBuf>,
    /// Reintenta en la próxima ejecución los documentos sin texto.
    #[arg(long)]
    retry_empty: bool,
}

#[derive(Args)]
struct AugmentArgs {
    #[arg(long)]
    input: Option<PathBuf>,
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long)]
    history: Option<PathBuf>,
    #[arg(long)]
    target: Option<usize>,
    #[arg(long)]
    min_variants: Option<usize>,
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // 2. Cargar configuración
    let cfg = AppConfig::from_env().context("Error al cargar la configuración")?;
    let run_id = Uuid::new_v4();
    info!("Ejecución {run_id}");

    // 3. Ctrl-C se atiende entre documentos
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Señal de parada recibida; se termina el documento en curso.");
                cancel.store(true, Ordering::SeqCst);
            }
        });
    }

    match cli.command {
        Command::Process(args) => {
            let pipeline_cfg = apply_process_args(cfg.pipeline.clone(), args);
            let ocr = TesseractOcr::new(&cfg.tesseract_cmd, &cfg.ocr_langs)
                .with_rasterizer(&cfg.pdftoppm_cmd);
            run_pipeline(&cfg, pipeline_cfg, ocr, cancel).await
        }
        Command::Label(args) => {
            let mut pipeline_cfg = PipelineConfig {
                input_dir: PathBuf::from("synthetic_content"),
                output_dir: PathBuf::from("synthetic_dataset"),
                history_file: PathBuf::from("processed_synthetic_scans_contents.txt"),
                input_filter: InputFilter::Text,
                type_from_folder: true,
                ..cfg.pipeline.clone()
            };
            pipeline_cfg = apply_process_args(pipeline_cfg, args);
            run_pipeline(&cfg, pipeline_cfg, PlainTextReader, cancel).await
        }
        Command::Augment(args) => {
            let augment_cfg = apply_augment_args(cfg.augment.clone(), args);
            let llm = LlmManager::from_config(&cfg).context("Error inicializando LLM Manager")?;
            let history = FileHistory::open(&augment_cfg.history_file)?;
            let rng = quota::quota_rng(augment_cfg.seed);
            let mut augmenter =
                Augmenter::new(augment_cfg, llm, history, rng).with_cancel_flag(cancel);
            augmenter.run().await?;
            Ok(())
        }
        Command::Plan(args) => {
            let augment_cfg = apply_augment_args(cfg.augment.clone(), args);
            print_plan(&augment_cfg)
        }
    }
}

async fn run_pipeline<R>(
    cfg: &AppConfig,
    pipeline_cfg: PipelineConfig,
    recognizer: R,
    cancel: Arc<AtomicBool>,
) -> Result<()>
where
    R: TextRecognizer,
{
    let llm = LlmManager::from_config(cfg).context("Error inicializando LLM Manager")?;
    let extractor = StagedExtractor::new(recognizer, llm.clone())
        .with_type_from_folder(pipeline_cfg.type_from_folder);
    let writer = MirroredWriter::new(&pipeline_cfg.output_dir);
    let history = FileHistory::open(&pipeline_cfg.history_file)?;

    let mut pipeline =
        Pipeline::new(pipeline_cfg, extractor, llm, writer, history).with_cancel_flag(cancel);
    pipeline.run().await?;
    Ok(())
}

fn apply_process_args(mut cfg: PipelineConfig, args: ProcessArgs) -> PipelineConfig {
    if let Some(input) = args.input {
        cfg.input_dir = input;
    }
    if let Some(output) = args.output {
        cfg.output_dir = output;
    }
    if let Some(history) = args.history {
        cfg.history_file = history;
    }
    if args.retry_empty {
        cfg.empty_text_policy = EmptyTextPolicy::Retry;
    }
    cfg
}

fn apply_augment_args(mut cfg: AugmentConfig, args: AugmentArgs) -> AugmentConfig {
    if let Some(input) = args.input {
        cfg.input_dir = input;
    }
    if let Some(output) = args.output {
        cfg.output_dir = output;
    }
    if let Some(history) = args.history {
        cfg.history_file = history;
    }
    if let Some(target) = args.target {
        cfg.target_per_category = target;
    }
    if let Some(min) = args.min_variants {
        cfg.min_variants_per_file = min;
    }
    if args.seed.is_some() {
        cfg.seed = args.seed;
    }
    cfg
}

fn print_plan(cfg: &AugmentConfig) -> Result<()> {
    let categories = scanner::scan_categories(&cfg.input_dir, InputFilter::Text)?;
    let history = MemoryHistory::snapshot(&cfg.history_file)?;
    let mut rng = quota::quota_rng(cfg.seed);
    let (target, plans) = augment::build_plans(&categories, &history, cfg, &mut rng);

    println!("Objetivo por categoría: {target}");
    for plan in plans {
        println!(
            "{:<24} pendientes={:<5} hechos={:<5} variantes={:<6} (base +{}, {} con una extra)",
            plan.category,
            plan.pending.len(),
            plan.already_done,
            plan.plan.total_variants(),
            plan.plan.base_add,
            plan.plan.remainder
        );
    }
    Ok(())
}
