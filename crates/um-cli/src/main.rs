//! unmodal CLI
//!
//! CLI tool for validating site definitions and running them against saved
//! pages.

mod definitions;
mod tally;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use serde_json::Value;

use um_core::bridge::channel;
use um_core::url::extract_host;
use um_core::{Engine, HtmlDocument, MemoryStore, Page, PageScope, Settings, StoreReporter, TallyStore, Timer};

use crate::definitions::compile;
use crate::tally::JsonFileStore;

/// Marker value in a globals file for a callable page function.
const FUNCTION_MARKER: &str = "[function]";

#[derive(Parser)]
#[command(name = "um-cli")]
#[command(about = "unmodal site definition compiler and tools")]
struct Cli {
    /// Debug-level logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings JSON file
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile every category and report rule counts
    Check {
        /// Directory containing <category>.json files
        #[arg(short, long)]
        definitions: PathBuf,

        /// User overlay keyed by category
        #[arg(long)]
        overlay: Option<PathBuf>,
    },

    /// List the rules that apply to a URL
    Rules {
        #[arg(short, long)]
        definitions: PathBuf,

        #[arg(short, long)]
        url: String,
    },

    /// Evaluate the applicable rules against a saved HTML page
    Run {
        #[arg(short, long)]
        definitions: PathBuf,

        #[arg(short, long)]
        url: String,

        /// Saved page
        #[arg(long)]
        html: PathBuf,

        /// Page globals as JSON; "[function]" values become callables
        #[arg(long)]
        globals: Option<PathBuf>,

        /// Number of passes
        #[arg(short, long, default_value_t = 1)]
        passes: usize,

        /// Write the edited page here
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Accumulate all-time totals in this JSON file
        #[arg(long)]
        tally: Option<PathBuf>,
    },
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match definitions::load_settings(cli.settings.as_deref()) {
        Ok(settings) => match cli.command {
            Commands::Check { definitions, overlay } => cmd_check(&definitions, overlay.as_deref(), &settings),
            Commands::Rules { definitions, url } => cmd_rules(&definitions, &url, &settings),
            Commands::Run {
                definitions,
                url,
                html,
                globals,
                passes,
                output,
                tally,
            } => {
                let options = RunOptions {
                    definitions,
                    url,
                    html,
                    globals,
                    passes,
                    output,
                    tally,
                };
                cmd_run(&options, &settings).await
            }
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn cmd_check(dir: &Path, overlay: Option<&Path>, settings: &Settings) -> Result<(), String> {
    let start = Instant::now();
    let report = compile(dir, overlay, settings)?;

    println!("Definitions in '{}' are valid", dir.display());
    for (category, rules) in &report.per_category {
        println!("  {:<20} {} rules", category, rules);
    }
    println!("  Patterns:  {}", report.index.pattern_count());
    println!("  Rules:     {}", report.index.rule_count());
    println!("  Time:      {:.1}ms", start.elapsed().as_secs_f64() * 1000.0);

    Ok(())
}

fn cmd_rules(dir: &Path, url: &str, settings: &Settings) -> Result<(), String> {
    let report = compile(dir, None, settings)?;
    let rules = report.index.select(url);
    let host = extract_host(url).ok_or_else(|| format!("Not a page URL: {url}"))?;

    println!("{} rules apply to {} ({})", rules.len(), url, host);
    for rule in &rules {
        let guard: Vec<String> = rule.conditions().iter().map(|c| c.to_string()).collect();
        if guard.is_empty() {
            println!("  [{}] always", rule.category());
        } else {
            println!("  [{}] if {}", rule.category(), guard.join(" "));
        }
        for action in rule.actions() {
            println!("      {}", action);
        }
    }

    Ok(())
}

struct RunOptions {
    definitions: PathBuf,
    url: String,
    html: PathBuf,
    globals: Option<PathBuf>,
    passes: usize,
    output: Option<PathBuf>,
    tally: Option<PathBuf>,
}

struct TokioTimer;

impl Timer for TokioTimer {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

async fn cmd_run(options: &RunOptions, settings: &Settings) -> Result<(), String> {
    let report = compile(&options.definitions, None, settings)?;
    let rules = report.index.select(&options.url);
    println!("{} rules apply to {}", rules.len(), options.url);

    let source = fs::read_to_string(&options.html)
        .map_err(|e| format!("Failed to read '{}': {}", options.html.display(), e))?;
    let globals = match &options.globals {
        Some(path) => {
            let text = fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
            serde_json::from_str(&text).map_err(|e| format!("Invalid globals in '{}': {}", path.display(), e))?
        }
        None => Value::Object(Default::default()),
    };

    let (client, endpoint) = channel();
    let server = tokio::spawn(endpoint.serve(page_scope(globals)));

    let mut page = Page::new(HtmlDocument::parse(&source), client, TokioTimer);
    let mut engine = Engine::new(rules);

    match &options.tally {
        Some(path) => {
            let mut reporter = StoreReporter::new(JsonFileStore::new(path));
            run_passes(&mut engine, &mut page, &mut reporter, options.passes).await;
        }
        None => {
            let mut reporter = StoreReporter::new(MemoryStore::new());
            run_passes(&mut engine, &mut page, &mut reporter, options.passes).await;
        }
    }

    println!("Blocked on this page: {}", engine.blocked_counts().total());
    for (category, count) in engine.blocked_counts().iter() {
        println!("  {:<20} {}", category, count);
    }
    println!("Pending rules: {}", engine.pending());

    if let Some(output) = &options.output {
        fs::write(output, page.document.to_html())
            .map_err(|e| format!("Failed to write '{}': {}", output.display(), e))?;
        println!("Wrote edited page to '{}'", output.display());
    }

    // Dropping the client ends the page-side loop.
    drop(page);
    server.await.map_err(|e| format!("Page bridge task failed: {e}"))?;

    Ok(())
}

async fn run_passes<S: TallyStore>(
    engine: &mut Engine,
    page: &mut Page<HtmlDocument, um_core::BridgeClient, TokioTimer>,
    reporter: &mut StoreReporter<S>,
    passes: usize,
) {
    for pass in 1..=passes.max(1) {
        match engine.evaluate(page, reporter).await {
            Ok(summary) => println!(
                "  pass {}: {} evaluated, {} completed, {} pending",
                pass, summary.evaluated, summary.completed, summary.pending
            ),
            Err(e) => println!("  pass {}: aborted: {}", pass, e),
        }
        if engine.is_finished() {
            break;
        }
    }
}

/// Page scope over `globals`, with every `"[function]"` leaf callable.
fn page_scope(globals: Value) -> PageScope {
    let mut paths = Vec::new();
    collect_functions(&globals, String::new(), &mut paths);

    let mut scope = PageScope::new(globals);
    for path in paths {
        let name = path.clone();
        scope.define_function(&path, move |args| {
            tracing::info!("page function {}({}) called", name, args.join(", "));
            Ok(Value::Null)
        });
    }
    scope
}

fn collect_functions(value: &Value, prefix: String, paths: &mut Vec<String>) {
    match value {
        Value::String(s) if s == FUNCTION_MARKER && !prefix.is_empty() => paths.push(prefix),
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                collect_functions(child, path, paths);
            }
        }
        _ => {}
    }
}
