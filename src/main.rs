use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use url::Url;

use pagepilot::channel::PageSource;
use pagepilot::config::Config;
use pagepilot::extract;
use pagepilot::llm;
use pagepilot::orchestrator::Orchestrator;
use pagepilot::page::Page;
use pagepilot::populate::populate;
use pagepilot::router::Response;
use pagepilot::snapshot::SuggestionSet;
use pagepilot::store::Store;

#[derive(Parser, Debug)]
#[command(
    name = "pagepilot",
    about = "Extract job postings and form fields from HTML and fill them with LLM suggestions",
    version
)]
struct Args {
    /// Configure the Gemini API key interactively and exit
    #[arg(long)]
    setup: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract a page snapshot and print it as JSON
    Scan {
        /// HTML file to read
        file: PathBuf,
        /// URL the page was saved from
        #[arg(long)]
        url: Option<String>,
        /// Skip the AI page summary
        #[arg(long)]
        no_summary: bool,
    },
    /// Run a full analysis cycle: extract, call the model, fill the form
    Analyze {
        /// HTML file to read
        file: PathBuf,
        /// URL the page was saved from
        #[arg(long)]
        url: Option<String>,
    },
    /// Apply a suggestion JSON object to a page, offline
    Fill {
        /// HTML file to read
        file: PathBuf,
        /// JSON object mapping field names to values
        #[arg(long)]
        suggestions: String,
    },
    /// Deliver a raw protocol message to a page and print the reply
    Message {
        /// HTML file to read
        file: PathBuf,
        /// URL the page was saved from
        #[arg(long)]
        url: Option<String>,
        /// Message JSON in either dialect, e.g. '{"action":"ping"}' or
        /// '{"type":"scanPage"}'
        message: String,
    },
    /// Save the profile JSON used to personalize prompts
    Profile {
        /// JSON describing you (skills, history, contact details)
        json: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pagepilot=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if args.setup {
        return run_setup();
    }

    match args.command {
        Some(Command::Scan {
            file,
            url,
            no_summary,
        }) => run_scan(&file, url, no_summary).await,
        Some(Command::Analyze { file, url }) => run_analyze(&file, url).await,
        Some(Command::Fill { file, suggestions }) => run_fill(&file, &suggestions),
        Some(Command::Message { file, url, message }) => run_message(&file, url, &message).await,
        Some(Command::Profile { json }) => {
            Store::open_default()?.set_profile(&json)?;
            println!("Profile saved.");
            Ok(())
        }
        None => {
            eprintln!("No command given. Try `pagepilot --help`.");
            std::process::exit(2);
        }
    }
}

fn run_setup() -> Result<()> {
    let config = Config::load();
    eprintln!("Enter your Gemini API key (or set {}):", pagepilot::config::API_KEY_ENV);
    eprint!("> ");
    std::io::stderr().flush().ok();

    let mut key = String::new();
    std::io::stdin()
        .read_line(&mut key)
        .context("reading API key")?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("no key entered");
    }

    config.set_api_key(key)?;
    config.save()?;
    println!("API key saved to the system keychain.");
    Ok(())
}

fn load_page_source(file: &Path, url: Option<String>) -> Result<PageSource> {
    let html = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let url = url
        .map(|u| Url::parse(&u).with_context(|| format!("invalid URL {}", u)))
        .transpose()?;
    Ok(PageSource { html, url })
}

async fn run_scan(file: &Path, url: Option<String>, no_summary: bool) -> Result<()> {
    let source = load_page_source(file, url)?;
    let config = Config::load();

    // Summary only when a key is available; extraction itself is offline.
    if !no_summary && config.has_api_key() {
        let store = Store::open_default()?;
        let client = llm::http_client(&config)?;
        let orch = Orchestrator::new(store, client);
        orch.register_tab(1, source);
        let response = orch.scan(1).await?;
        println!("{}", serde_json::to_string_pretty(&response.encode())?);
        return Ok(());
    }

    let page = Page::parse(&source.html, source.url);
    let snapshot = extract::extract(&page);
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

async fn run_analyze(file: &Path, url: Option<String>) -> Result<()> {
    let source = load_page_source(file, url)?;
    let config = Config::load();
    let client = llm::http_client(&config)?;
    let store = Store::open_default()?;

    let orch = Orchestrator::new(store, client);
    orch.register_tab(1, source);
    let outcome = orch.analyze(1).await?;

    println!("{}", serde_json::to_string_pretty(&outcome.record)?);
    if let Some(ack) = outcome.populate {
        println!("{}", serde_json::to_string_pretty(&ack.encode())?);
    }
    for notification in orch.take_notifications() {
        eprintln!("{}", notification.encode());
    }
    Ok(())
}

async fn run_message(file: &Path, url: Option<String>, message: &str) -> Result<()> {
    use pagepilot::channel::spawn_page_context;
    use pagepilot::router::Request;
    use std::time::Duration;

    let value: serde_json::Value =
        serde_json::from_str(message).context("message must be JSON")?;
    let request = Request::decode(&value);

    // Analysis and scan involve the completion API; everything else is
    // answered by the page context directly.
    if request == Request::AnalyzePage {
        println!("{}", Response::Processing.encode());
        return run_analyze(file, url).await;
    }
    if request == Request::Scan {
        let config = Config::load();
        if config.has_api_key() {
            let store = Store::open_default()?;
            let client = llm::http_client(&config)?;
            let orch = Orchestrator::new(store, client);
            orch.register_tab(1, load_page_source(file, url)?);
            let response = orch.scan(1).await?;
            println!("{}", serde_json::to_string_pretty(&response.encode())?);
            return Ok(());
        }
    }

    let handle = spawn_page_context(load_page_source(file, url)?);
    let response = handle.request(request, Duration::from_secs(10)).await?;
    println!("{}", serde_json::to_string_pretty(&response.encode())?);
    Ok(())
}

fn run_fill(file: &Path, suggestions: &str) -> Result<()> {
    let value: serde_json::Value =
        serde_json::from_str(suggestions).context("suggestions must be JSON")?;
    let map = value
        .as_object()
        .context("suggestions must be a JSON object")?;
    let suggestions = SuggestionSet::from_json_object(map);

    let source = load_page_source(file, None)?;
    let mut page = Page::parse(&source.html, None);
    let report = populate(&mut page, &suggestions);

    let ack = Response::PopulateAck {
        applied: report.applied,
        skipped: report.skipped,
        values: report.values,
        events: page.events().to_vec(),
    };
    println!("{}", serde_json::to_string_pretty(&ack.encode())?);
    Ok(())
}
