//! Platypus CLI
//!
//! - `platypus answer`: answer a question end to end
//! - `platypus analyze`: ranked candidate queries, their SPARQL form and the
//!   questions that would disambiguate them
//! - `platypus sparql`: SPARQL of the best candidate
//!
//! Without further options the bundled demo parses and knowledge base are
//! used, so the demo questions work out of the box.

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use platypus_analyzer::{plan, rank, Candidate};
use platypus_formula::{render_sparql, SparqlOptions};
use platypus_kb::{
    CachedConnector, Deadline, InMemoryKnowledgeBase, KnowledgeConnector, ResolutionCache,
};
use platypus_nlp::{NlpParser, StaticParser};
use platypus_qa::{JsonLinesRequestLog, QaConfig, QaService};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod render;

const DEMO_KB: &str = include_str!("../../../demos/kb.json");
const DEMO_PARSES: &str = include_str!("../../../demos/parses.conllu");

#[derive(Parser)]
#[command(name = "platypus")]
#[command(author, version, about = "Platypus: natural-language questions over knowledge graphs")]
struct Cli {
    /// Log more (-v info, -vv debug, -vvv trace). `RUST_LOG` wins when set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(flatten)]
    sources: Sources,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Sources {
    /// Configuration file (JSON). Without it, defaults plus `PLATYPUS_*` variables.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Knowledge-base snapshot (JSON); the bundled demo when omitted
    #[arg(long, global = true)]
    kb: Option<PathBuf>,
    /// Pre-computed parses (CoNLL-U with `# text` comments); the bundled demo when omitted
    #[arg(long, global = true)]
    parses: Option<PathBuf>,
    /// Parser service answering in CoNLL-U, used instead of --parses
    #[cfg(feature = "http")]
    #[arg(long, global = true)]
    parser_url: Option<url::Url>,
    /// SPARQL endpoint, used instead of --kb (needs --search-url)
    #[cfg(feature = "http")]
    #[arg(long, global = true, requires = "search_url")]
    sparql_url: Option<url::Url>,
    /// Label search service for entity and relation lookups
    #[cfg(feature = "http")]
    #[arg(long, global = true, requires = "sparql_url")]
    search_url: Option<url::Url>,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question
    Answer {
        question: String,
        /// ISO 639-1 language of the question; guessed when omitted
        #[arg(short, long)]
        language: Option<String>,
        /// Print the response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the ranked candidate queries of a question
    Analyze {
        question: String,
        #[arg(short, long)]
        language: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// Print the SPARQL query of the best candidate
    Sparql {
        question: String,
        #[arg(short, long)]
        language: Option<String>,
    },
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.sources.config.as_deref())?;
    let parser = build_parser(&cli.sources)?;
    let connector = build_connector(&cli.sources, &config)?;
    let mut service = QaService::new(parser.clone(), connector, config.clone());
    if let Some(path) = &config.request_log {
        let log = JsonLinesRequestLog::open(path)
            .with_context(|| format!("opening request log {}", path.display()))?;
        service = service.with_request_log(log);
    }

    match cli.command {
        Commands::Answer {
            question,
            language,
            json,
        } => {
            let response = service.answer(&question, language.as_deref()).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                render::print_response(&question, &response);
            }
            if let Some(kind) = response.error() {
                return Err(anyhow!("request failed: {kind}"));
            }
        }
        Commands::Analyze {
            question,
            language,
            json,
        } => {
            let candidates =
                analyze(&service, parser.as_ref(), &question, language.as_deref()).await?;
            let sparql = SparqlOptions::default();
            if json {
                let rows: Vec<serde_json::Value> = candidates
                    .iter()
                    .map(|c| {
                        serde_json::json!({
                            "candidate": c,
                            "sparql": render_sparql(&c.query, &sparql).ok(),
                        })
                    })
                    .collect();
                let out = serde_json::json!({
                    "candidates": rows,
                    "disambiguation": plan(&candidates),
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                render::print_candidates(&question, &candidates, &sparql);
                render::print_plan(&plan(&candidates));
            }
        }
        Commands::Sparql { question, language } => {
            let candidates =
                analyze(&service, parser.as_ref(), &question, language.as_deref()).await?;
            let best = candidates
                .first()
                .ok_or_else(|| anyhow!("question not understood: {question:?}"))?;
            println!("{}", render_sparql(&best.query, &SparqlOptions::default())?);
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<QaConfig> {
    match path {
        Some(path) => {
            QaConfig::load(path).with_context(|| format!("loading config {}", path.display()))
        }
        None => Ok(QaConfig::from_env()?),
    }
}

fn build_parser(sources: &Sources) -> Result<Arc<dyn NlpParser>> {
    #[cfg(feature = "http")]
    if let Some(url) = &sources.parser_url {
        return Ok(Arc::new(platypus_nlp::http::ConlluHttpParser::new(
            url.clone(),
        )));
    }
    let parser = match &sources.parses {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading parses {}", path.display()))?;
            StaticParser::from_conllu_document(&text)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => StaticParser::from_conllu_document(DEMO_PARSES)?,
    };
    tracing::info!(sentences = parser.len(), "static parser ready");
    Ok(Arc::new(parser))
}

fn build_connector(sources: &Sources, config: &QaConfig) -> Result<Arc<dyn KnowledgeConnector>> {
    let cache = ResolutionCache::new(&config.cache);

    #[cfg(feature = "http")]
    if let (Some(sparql_url), Some(search_url)) = (&sources.sparql_url, &sources.search_url) {
        let remote = platypus_kb::SparqlConnector::new(platypus_kb::SparqlConnectorConfig::new(
            search_url.clone(),
            sparql_url.clone(),
        ));
        return Ok(Arc::new(CachedConnector::new(remote, cache)));
    }

    let kb = match &sources.kb {
        Some(path) => {
            let kb = InMemoryKnowledgeBase::load(path)
                .with_context(|| format!("loading knowledge base {}", path.display()))?;
            tracing::info!(path = %path.display(), "knowledge base loaded");
            kb
        }
        None => InMemoryKnowledgeBase::from_json_str(DEMO_KB)?,
    };
    Ok(Arc::new(CachedConnector::new(kb, cache)))
}

/// Parse and analyze without executing.
async fn analyze(
    service: &QaService,
    parser: &dyn NlpParser,
    question: &str,
    hint: Option<&str>,
) -> Result<Vec<Candidate>> {
    let language = service
        .language_for(question, hint)
        .map_err(|kind| anyhow!("{kind}: {}", hint.unwrap_or_default()))?;
    let deadline = Deadline::after(service.config().global_timeout());
    let trees = parser.parse(question, &language).await?;

    let mut candidates = Vec::new();
    for tree in &trees {
        candidates.extend(service.analyzer().analyze(tree, &language, deadline).await?);
    }
    Ok(rank(candidates, service.config().max_candidates))
}
