use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use comfy_table::Table;
use reviewlens_core::config::{PipelineConfig, PublishConfig};
use reviewlens_core::insights::{load_dataset, summarize, DatasetFilter, DatasetInsights};
use reviewlens_core::pipelines::Pipeline;
use reviewlens_core::publish::{GitPublisher, Publisher};
use reviewlens_core::MalformedLinePolicy;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const CONFIG_ENV: &str = "REVIEWLENS_CONFIG";

#[derive(Parser, Debug)]
#[command(author, version, about = "Review sentiment ETL pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract reviews and products, score sentiment, write the dataset and publish it
    Run(RunArgs),
    /// Summarize a processed dataset
    Insights(InsightsArgs),
    /// Publish the processed directory without re-running the pipeline
    Publish(PublishArgs),
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// TOML config file (defaults to $REVIEWLENS_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Newline-delimited JSON review file
    #[arg(long)]
    reviews: Option<PathBuf>,
    /// Product catalog endpoint
    #[arg(long)]
    products_url: Option<String>,
    /// Output CSV path
    #[arg(long)]
    output: Option<PathBuf>,
    /// Abort on the first malformed review line instead of skipping it
    #[arg(long)]
    strict: bool,
    /// Skip the publish stage even when it is configured
    #[arg(long)]
    no_publish: bool,
}

#[derive(Args, Debug, Default)]
struct InsightsArgs {
    #[arg(long)]
    config: Option<PathBuf>,
    /// Processed CSV (defaults to the configured output path)
    #[arg(long)]
    input: Option<PathBuf>,
    /// Keep only these sentiment labels
    #[arg(long = "sentiment")]
    sentiments: Vec<String>,
    /// Keep only these product categories
    #[arg(long = "category")]
    categories: Vec<String>,
    #[arg(long)]
    min_price: Option<f64>,
    #[arg(long)]
    max_price: Option<f64>,
    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug, Default)]
struct PublishArgs {
    #[arg(long)]
    config: Option<PathBuf>,
    /// Directory to publish (defaults to the output directory)
    #[arg(long)]
    dir: Option<PathBuf>,
    /// Remote URL, required when the config has no [publish] table
    #[arg(long)]
    remote: Option<String>,
    #[arg(long)]
    branch: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Insights(args) => insights(args),
        Command::Publish(args) => publish(args).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let path = path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
    match path {
        Some(path) => {
            let config = PipelineConfig::from_path(&path)?;
            info!(path = %path.display(), "Loaded config");
            Ok(config)
        }
        None => Ok(PipelineConfig::default()),
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(reviews) = args.reviews {
        config.extract.reviews_path = reviews;
    }
    if let Some(url) = args.products_url {
        config.extract.products.url = url;
    }
    if let Some(output) = args.output {
        config.output.path = output;
    }
    if args.strict {
        config.extract.malformed_lines = MalformedLinePolicy::Abort;
    }
    if args.no_publish {
        config.publish = None;
    }

    let pipeline = Pipeline::from_config(config)?;
    let report = tokio::select! {
        report = pipeline.run() => report,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted; the previous output artifact was left in place");
            bail!("pipeline run interrupted");
        }
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.is_success() {
        let stage = report
            .failed_stage
            .map(|stage| stage.to_string())
            .unwrap_or_default();
        bail!(
            "pipeline failed during {stage}: {}",
            report.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn insights(args: InsightsArgs) -> Result<()> {
    let input = match args.input {
        Some(input) => input,
        None => load_config(args.config.as_deref())?.output.path,
    };
    let dataset = load_dataset(&input)
        .with_context(|| format!("failed to load dataset {}", input.display()))?;

    let filter = DatasetFilter {
        sentiments: args.sentiments,
        categories: args.categories,
        min_price: args.min_price,
        max_price: args.max_price,
    };
    let slice = filter.apply(&dataset)?;
    if slice.height() == 0 {
        warn!("No rows match the current filters");
    }
    let insights = summarize(&slice, &dataset)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&insights)?);
    } else {
        println!("{}", render_table(&insights));
    }
    Ok(())
}

fn render_table(insights: &DatasetInsights) -> Table {
    let missing = || "-".to_string();
    let mut table = Table::new();
    table.set_header(vec!["Metric", "Value"]);
    table.add_row(vec!["Reviews".to_string(), insights.reviews.to_string()]);
    table.add_row(vec!["Products".to_string(), insights.products.to_string()]);
    table.add_row(vec![
        "Positivity".to_string(),
        match (insights.positivity_pct, insights.positivity_delta) {
            (Some(pct), Some(delta)) => format!("{pct:.1}% ({delta:+.1} pts vs overall)"),
            (Some(pct), None) => format!("{pct:.1}%"),
            _ => missing(),
        },
    ]);
    table.add_row(vec![
        "Average confidence".to_string(),
        insights
            .average_confidence
            .map(|c| format!("{c:.2}"))
            .unwrap_or_else(missing),
    ]);
    table.add_row(vec![
        "Top category".to_string(),
        insights.top_category.clone().unwrap_or_else(missing),
    ]);
    if let Some(counts) = &insights.sentiment_counts {
        for (label, count) in counts {
            let confidence = insights
                .confidence_by_sentiment
                .as_ref()
                .and_then(|by_label| by_label.get(label))
                .map(|c| format!(", confidence {c:.2}"))
                .unwrap_or_default();
            table.add_row(vec![format!("{label} reviews"), format!("{count}{confidence}")]);
        }
    }
    table
}

async fn publish(args: PublishArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let mut publish = match (config.publish.clone(), args.remote) {
        (Some(mut publish), Some(remote)) => {
            publish.remote_url = remote;
            publish
        }
        (None, Some(remote)) => PublishConfig::new(remote),
        (Some(publish), None) => publish,
        (None, None) => bail!("no [publish] table in config and no --remote given"),
    };
    if let Some(branch) = args.branch {
        publish.branch = branch;
    }

    let directory = args
        .dir
        .or_else(|| publish.directory.clone())
        .or_else(|| config.output.parent_directory())
        .context("nothing to publish from: pass --dir or set publish.directory")?;
    let outcome = GitPublisher::new(publish)
        .publish(&directory)
        .await
        .with_context(|| format!("failed to publish {}", directory.display()))?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
