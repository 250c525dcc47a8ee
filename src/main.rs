use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use siteprobe::config::ConfigBuilder;
use siteprobe::{report, Config, FetchMode, SiteAnalyzer};
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Analyze a website and return relevant information: technologies used,
/// cookies set, third-party domains referenced and transport security.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Site to analyze; https:// is assumed when no scheme is given
    url: String,

    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Technology signature file (apps.json format) to use instead of the bundled one
    #[arg(long)]
    corpus: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Let every facet issue its own request instead of sharing one
    #[arg(long, default_value_t = false)]
    per_facet_fetch: bool,

    /// Print the analysis as JSON
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    /// Enable debug logging
    #[arg(long, default_value_t = false)]
    debug: bool,
}

fn init_logging(cli: &Cli) {
    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };
    // keep reqwest/hyper quiet unless RUST_LOG asks otherwise
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("siteprobe={},reqwest=warn,hyper=warn", level))
    });
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let base = match &cli.config {
        Some(path) => Config::from_yaml_file(path)?,
        None => Config::default(),
    };
    let mut builder = ConfigBuilder::from_config(base);
    if let Some(path) = &cli.corpus {
        builder = builder.corpus_path(path.clone());
    }
    if let Some(secs) = cli.timeout {
        builder = builder.timeout_secs(secs);
    }
    if cli.per_facet_fetch {
        builder = builder.fetch_mode(FetchMode::PerFacet);
    }
    Ok(builder.build()?)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(&cli);

    let analyzer = SiteAnalyzer::new(load_config(&cli)?)?;

    if !cli.json {
        println!("Analyzing the site {}", cli.url);
    }

    let analysis = tokio::select! {
        analysis = analyzer.analyze(&cli.url) => analysis?,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, abandoning in-flight requests");
            return Ok(ExitCode::from(130));
        }
    };

    if cli.json {
        println!("{}", report::render_json(&analysis)?);
    } else {
        print!("{}", report::render(&analysis));
    }
    Ok(ExitCode::SUCCESS)
}
