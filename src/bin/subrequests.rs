use anyhow::{Context as AnyhowContext, Result, anyhow};
use clap::Parser;
use http::{HeaderName, HeaderValue};
use std::path::PathBuf;
use std::sync::Arc;
use subrequests::blueprint::loader;
use subrequests::blueprint::manager::BlueprintManager;
use subrequests::multiresponse::OutputFormat;
use subrequests::runtime::executor::ReqwestExecutor;
use subrequests::runtime::manager::SubrequestsManager;
use subrequests::runtime::request::MasterContext;
use tracing::info;
use url::Url;

/// Run a subrequests blueprint against a remote host.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the blueprint JSON file ("-" reads stdin)
    #[arg(long, short)]
    file: PathBuf,

    /// Base URL the subrequests are dispatched against
    #[arg(long, default_value = "http://127.0.0.1:8080/")]
    base_url: String,

    /// Output format: multipart-related or json
    #[arg(long, default_value = "multipart-related")]
    format: String,

    /// Master request headers ("Name: value"), e.g. Host or Authorization
    #[arg(long, short = 'H')]
    header: Vec<String>,

    /// Cookies inherited by every subrequest ("name=value")
    #[arg(long)]
    cookie: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let input = loader::read_blueprint(&cli.file)?;

    let master = build_master_context(&cli)?;
    let format: OutputFormat = cli.format.parse().map_err(|e: String| anyhow!(e))?;
    let base_url =
        Url::parse(&cli.base_url).with_context(|| format!("Invalid base URL {}", cli.base_url))?;

    let blueprint_manager = BlueprintManager::new();
    let tree = blueprint_manager.parse(&input, &master)?;
    info!(waves = tree.num_levels(), "Blueprint parsed");

    let manager = SubrequestsManager::new(Arc::new(ReqwestExecutor::new(base_url)));
    let responses = manager.request(&tree, &master).await?;
    info!(responses = responses.len(), "Blueprint executed");

    let combined = blueprint_manager.combine_responses(&responses, format);
    for (name, value) in combined.headers.iter() {
        if let Ok(value) = value.to_str() {
            eprintln!("{name}: {value}");
        }
    }
    eprintln!("Status: {}", combined.status.as_u16());
    println!("{}", combined.content);
    Ok(())
}

fn build_master_context(cli: &Cli) -> Result<MasterContext> {
    let mut master = MasterContext::default();
    for header in &cli.header {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| anyhow!("Headers must look like \"Name: value\", got {header}"))?;
        master.headers.append(
            HeaderName::from_bytes(name.trim().as_bytes())
                .with_context(|| format!("Invalid header name {name}"))?,
            HeaderValue::from_str(value.trim())
                .with_context(|| format!("Invalid value for header {name}"))?,
        );
    }
    for cookie in &cli.cookie {
        let (name, value) = cookie
            .split_once('=')
            .ok_or_else(|| anyhow!("Cookies must look like \"name=value\", got {cookie}"))?;
        master
            .cookies
            .push((name.to_string(), value.to_string()));
    }
    Ok(master)
}
