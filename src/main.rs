use chessmate::Error;
use chessmate::agent::Evaluator;
use chessmate::agent::OpenAiAgent;
use chessmate::api::AppState;
use chessmate::api::Server;
use chessmate::chess::GameStream;
use chessmate::chess::replay;
use chessmate::config::Config;
use chessmate::embed::OpenAiEmbedder;
use chessmate::embed::Pool;
use chessmate::ingest::Ingestor;
use chessmate::ingest::precheck;
use chessmate::ingest::queue_stats;
use chessmate::openings::Catalogue;
use chessmate::search::Analyzer;
use chessmate::search::Executor;
use chessmate::search::QueryResponse;
use chessmate::store::Retriever;
use chessmate::vector::QdrantStore;
use chessmate::vector::VectorStore;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_postgres::Client;

#[derive(Parser)]
#[command(author, version, about = "Natural-language chess search", long_about = None)]
enum Command {
    #[command(about = "Ingest a PGN file into the metadata store and embedding queue")]
    Ingest {
        #[arg(required = true)]
        path: PathBuf,
    },
    #[command(about = "Answer a natural-language chess question")]
    Query {
        #[arg(required = true)]
        question: String,
    },
    #[command(about = "Run the embedding worker pool")]
    EmbeddingWorker {
        #[arg(long)]
        workers: Option<usize>,
        #[arg(long)]
        poll_sleep: Option<f64>,
    },
    #[command(about = "Print one FEN per ply for each game in a PGN file")]
    Fen {
        #[arg(required = true)]
        path: PathBuf,
    },
    #[command(about = "Report games a bulk archive would fail to ingest")]
    TwicPrecheck {
        #[arg(required = true)]
        path: PathBuf,
    },
    #[command(about = "Serve the HTTP query API")]
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
    #[command(about = "Show embedding queue depth by status")]
    Stats,
}

#[tokio::main]
async fn main() {
    chessmate::log();
    let command = Command::parse();
    if let Err(e) = run(command).await {
        log::error!("{}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(command: Command) -> Result<(), Error> {
    let config = Config::from_env();
    match command {
        Command::Ingest { path } => {
            let client = chessmate::db(config.database_url()?).await?;
            let mut ingestor = Ingestor::new(client, Catalogue::default(), config.max_pending);
            let report = ingestor.run(&path).await?;
            println!(
                "Ingested {} games ({} positions, {} skipped)",
                report.games, report.positions, report.skipped
            );
        }
        Command::Query { question } => match &config.api_url {
            Some(url) => query_remote(url, &question).await?,
            None => {
                let client = Arc::new(chessmate::db(config.database_url()?).await?);
                let executor = executor(&config, client)?;
                let analyzer = Analyzer::new(Catalogue::default());
                let plan = analyzer.analyse(&question)?;
                let response = executor.run(plan).await?;
                render(&response);
            }
        },
        Command::EmbeddingWorker {
            workers,
            poll_sleep,
        } => {
            let client = Arc::new(chessmate::db(config.database_url()?).await?);
            let key = config
                .openai_api_key
                .as_deref()
                .ok_or_else(|| Error::BadInput("OPENAI_API_KEY must be set".to_string()))?;
            let embedder = Arc::new(OpenAiEmbedder::new(key)?);
            let store = QdrantStore::new(&config.qdrant_url)?;
            store.ensure_collection(chessmate::EMBED_DIMENSION).await?;
            let workers = workers.unwrap_or_else(num_cpus::get);
            let poll = Duration::from_secs_f64(poll_sleep.unwrap_or(chessmate::DEFAULT_POLL_SLEEP));
            Pool::new(client, embedder, Arc::new(store), workers, poll)
                .run()
                .await?;
        }
        Command::Fen { path } => {
            let bytes = std::fs::read(&path)?;
            for game in GameStream::new(&bytes)? {
                match replay(&game) {
                    Ok(records) => {
                        for record in records {
                            println!("{}", record.fen);
                        }
                    }
                    Err(e) if e.skippable() => log::warn!("skipping game: {}", e),
                    Err(e) => return Err(e),
                }
            }
        }
        Command::TwicPrecheck { path } => {
            let report = precheck(&std::fs::read(&path)?)?;
            println!("checked {} games", report.games);
            for issue in &report.issues {
                println!(
                    "game #{}: {} - {}: {}",
                    issue.index + 1,
                    issue.white,
                    issue.black,
                    issue.problem
                );
            }
            if !report.is_clean() {
                return Err(Error::BadInput(format!(
                    "{} offending games",
                    report.issues.len()
                )));
            }
        }
        Command::Serve { bind } => {
            let client = Arc::new(chessmate::db(config.database_url()?).await?);
            let state = AppState {
                analyzer: Analyzer::new(Catalogue::default()),
                executor: executor(&config, client)?,
            };
            let bind = bind.unwrap_or_else(|| config.bind.clone());
            Server::run(state, &bind, config.cors_origin.clone()).await?;
        }
        Command::Stats => {
            let client = chessmate::db(config.database_url()?).await?;
            for (status, count) in queue_stats(&client).await? {
                println!("{:>12}  {}", status.as_str(), count);
            }
        }
    }
    Ok(())
}

/// wire the hybrid executor to its capability handles
fn executor(config: &Config, client: Arc<Client>) -> Result<Executor, Error> {
    let retriever: Arc<dyn Retriever> = Arc::new(client);
    let vectors: Arc<dyn VectorStore> = Arc::new(QdrantStore::new(&config.qdrant_url)?);
    let mut executor = Executor::new(retriever, vectors);
    if let Some(key) = &config.openai_api_key {
        executor = executor.with_query_embedder(Arc::new(OpenAiEmbedder::new(key)?));
    }
    if let Some(agent) = &config.agent {
        let client = OpenAiAgent::new(
            &agent.api_key,
            &agent.model,
            &agent.reasoning_effort,
            agent.verbosity.as_deref(),
        )?;
        executor = executor.with_evaluator(Evaluator::new(
            Arc::new(client),
            &agent.model,
            &agent.reasoning_effort,
            agent.weight,
            agent.cache_capacity,
            agent.max_concurrency,
            agent.costs,
        ));
    }
    Ok(executor)
}

async fn query_remote(url: &str, question: &str) -> Result<(), Error> {
    let http = reqwest::Client::new();
    let response = http
        .post(format!("{}/query", url.trim_end_matches('/')))
        .json(&serde_json::json!({ "question": question }))
        .send()
        .await
        .map_err(|e| Error::Unavailable(format!("api ({e})")))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| Error::Transient(e.to_string()))?;
    if status == reqwest::StatusCode::BAD_REQUEST {
        return Err(Error::BadInput(body));
    }
    if !status.is_success() {
        return Err(Error::Unavailable(format!("api returned {status}")));
    }
    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value).unwrap_or(body)),
        Err(_) => println!("{body}"),
    }
    Ok(())
}

fn render(response: &QueryResponse) {
    for warning in &response.warnings {
        log::warn!("{}", warning);
    }
    if response.results.is_empty() {
        println!("No matching games.");
        return;
    }
    for (i, result) in response.results.iter().enumerate() {
        let game = &result.game;
        let date = game
            .played_on
            .map(|d| d.to_string())
            .unwrap_or_else(|| "unknown date".to_string());
        println!(
            "{:>2}. {} - {}  {}  {}  [{:.3}]",
            i + 1,
            game.white_name,
            game.black_name,
            game.result,
            date,
            result.total_score
        );
        if let Some(opening) = &game.opening_name {
            println!("    {}", opening);
        }
        if !result.themes.is_empty() {
            println!("    themes: {}", result.themes.join(", "));
        }
        if let Some(explanation) = &result.explanation {
            println!("    {}", explanation);
        }
    }
    if let Some(agent) = &response.agent {
        println!(
            "agent: {} calls ({} cached), {} in / {} out / {} reasoning tokens, est ${:.4}",
            agent.calls,
            agent.cached,
            agent.input_tokens,
            agent.output_tokens,
            agent.reasoning_tokens,
            agent.cost_usd
        );
    }
}
