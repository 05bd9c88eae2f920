pub mod agent;
pub mod api;
pub mod chess;
pub mod config;
pub mod embed;
pub mod error;
pub mod ingest;
pub mod openings;
pub mod search;
pub mod store;
pub mod vector;

pub use error::Error;

/// dimensional analysis types
pub type Score = f32;
pub type Elo = i32;
pub type Ply = i32;

// embedding queue parameters
pub const MAX_ATTEMPTS: i32 = 5;
pub const CLAIM_BATCH: i64 = 16;
pub const EMBED_BATCH: usize = 16;
pub const PRUNE_BATCH: i64 = 1_000;
pub const DEFAULT_POLL_SLEEP: f64 = 1.0;
pub const DEFAULT_MAX_PENDING: i64 = 250_000;
pub const IN_PROGRESS_TIMEOUT_SECS: f64 = 900.0;
pub const JANITOR_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

// vector parameters
pub const EMBED_DIMENSION: usize = 1536;
pub const FALLBACK_DIMENSION: usize = 8;
pub const VECTOR_SEARCH_LIMIT: usize = 100;

// retrieval and fusion parameters
pub const DEFAULT_LIMIT: usize = 5;
pub const MAX_LIMIT: usize = 50;
pub const OVERFETCH_FACTOR: usize = 10;
pub const OVERFETCH_FLOOR: usize = 50;
pub const VECTOR_WEIGHT: Score = 0.7;
pub const KEYWORD_WEIGHT: Score = 0.3;
pub const NO_HIT_BASE: Score = 0.5;
pub const NO_HIT_STEP: Score = 0.01;
pub const NO_HIT_CAP: Score = 0.7;

// agent parameters
pub const AGENT_WEIGHT: Score = 0.5;
pub const AGENT_MAX_CONCURRENCY: usize = 4;
pub const AGENT_ATTEMPTS: usize = 3;
pub const AGENT_PGN_LIMIT: usize = 4_000;

// external call timeouts
pub const EMBED_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);
pub const AGENT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);
pub const VECTOR_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// initialize logging: the terminal gets info and up, the per-process log
/// file keeps debug, and the HTTP client internals stay out of both
pub fn log() {
    // targets stay visible so agent-telemetry records keep their tag
    let config = simplelog::ConfigBuilder::new()
        .set_target_level(log::LevelFilter::Info)
        .set_thread_level(log::LevelFilter::Off)
        .add_filter_ignore_str("hyper")
        .add_filter_ignore_str("reqwest")
        .build();
    simplelog::CombinedLogger::init(vec![
        simplelog::TermLogger::new(
            log::LevelFilter::Info,
            config.clone(),
            simplelog::TerminalMode::Mixed,
            simplelog::ColorChoice::Auto,
        ),
        simplelog::WriteLogger::new(log::LevelFilter::Debug, config, log_sink()),
    ])
    .expect("logger initialized twice");
}

/// one `logs/chessmate-<start>.log` file per process
fn log_sink() -> std::fs::File {
    let dir = std::path::Path::new("logs");
    std::fs::create_dir_all(dir).expect("logs directory");
    let started = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    std::fs::File::create(dir.join(format!("chessmate-{started}.log"))).expect("log file")
}

/// get a database connection, run schema setup, and return the client
pub async fn db(url: &str) -> Result<tokio_postgres::Client, Error> {
    log::info!("connecting to database");
    let tls = tokio_postgres::tls::NoTls;
    let (client, connection) = tokio_postgres::connect(url, tls).await?;
    tokio::spawn(connection);
    client.batch_execute(store::creates()).await?;
    Ok(client)
}
