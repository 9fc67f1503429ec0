use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tplus::models::{AnalysisMode, AppConfig, ResultRecord};
use tplus::selection::DEFAULT_SAMPLE_SIZE;
use tplus::summary::{completion_banner, render_record};
use tplus::{writer, BatchOrchestrator, Selection};

#[derive(Parser, Debug)]
#[command(name = "tplus", about = "T+1 stock recommendations from a language model")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/tplus.toml")]
    config: String,

    /// Analyze a single stock code
    #[arg(short, long, conflicts_with_all = ["stocks", "all"])]
    stock: Option<String>,

    /// Analyze these stock codes
    #[arg(short = 'l', long, num_args = 1.., conflicts_with = "all")]
    stocks: Option<Vec<String>>,

    /// Analyze every stock in the database
    #[arg(short, long)]
    all: bool,

    /// Random sample size when no stocks are named
    #[arg(long, default_value_t = DEFAULT_SAMPLE_SIZE)]
    sample: usize,

    /// Output file
    #[arg(short, long, default_value = "stock_analysis_result.json")]
    output: PathBuf,

    /// Single-prompt analysis instead of the staged pipeline
    #[arg(long)]
    simple: bool,

    /// Append results to the output every N completions
    #[arg(long)]
    save_batch_size: Option<usize>,

    /// Log as JSON lines
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn selection(&self) -> Selection {
        if let Some(code) = &self.stock {
            Selection::One(code.clone())
        } else if let Some(codes) = &self.stocks {
            Selection::List(codes.clone())
        } else if self.all {
            Selection::All
        } else {
            Selection::Sample(self.sample)
        }
    }
}

fn init_tracing(json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: &str) -> Result<AppConfig> {
    let config_str =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read config: {path}"))?;
    toml::from_str(&config_str).with_context(|| format!("Failed to parse config: {path}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let started = Instant::now();
    let records = match run(&cli).await {
        Ok(records) => records,
        Err(e) => {
            tracing::error!("Run failed: {e:#}");
            Vec::new()
        }
    };
    println!("{}", completion_banner(&records, started.elapsed()));
    Ok(())
}

async fn run(cli: &Cli) -> Result<Vec<ResultRecord>> {
    let config = load_config(&cli.config)?;
    let mode = if cli.simple {
        AnalysisMode::Single
    } else {
        config.analysis.mode
    };

    let orchestrator =
        tplus::build_orchestrator(&config, mode).context("Failed to build orchestrator")?;

    let cancel = orchestrator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received interrupt, finishing in-flight analyses");
            cancel.cancel();
        }
    });

    let selection = cli.selection();
    let records = match &selection {
        Selection::One(code) => {
            let record = orchestrator
                .analyze_one(code)
                .await
                .with_context(|| format!("Failed to analyze {code}"))?;
            save(&cli.output, std::slice::from_ref(&record))?;
            vec![record]
        }
        _ => run_batch(&orchestrator, &selection, cli, &config).await?,
    };

    for record in &records {
        println!("{}\n", render_record(record));
    }
    Ok(records)
}

async fn run_batch(
    orchestrator: &BatchOrchestrator,
    selection: &Selection,
    cli: &Cli,
    config: &AppConfig,
) -> Result<Vec<ResultRecord>> {
    let ids = {
        let mut rng = rand::thread_rng();
        selection
            .resolve(orchestrator.market().as_ref(), &mut rng)
            .await
            .context("Failed to select stocks")?
    };

    let options = tplus::batch_options(config, cli.save_batch_size, Some(cli.output.clone()));
    let incremental = matches!(options.batch_size, Some(n) if n > 0);
    tracing::info!(count = ids.len(), "Starting analysis");

    let records = orchestrator
        .analyze_many(&ids, &options)
        .await
        .context("Batch aborted")?;

    if !incremental {
        save(&cli.output, &records)?;
    } else {
        println!("结果已保存到: {}", cli.output.display());
    }
    Ok(records)
}

fn save(path: &Path, records: &[ResultRecord]) -> Result<()> {
    writer::write_all(path, records)
        .with_context(|| format!("Failed to write results: {}", path.display()))?;
    println!("结果已保存到: {}", path.display());
    Ok(())
}
