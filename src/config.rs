use crate::AGENT_MAX_CONCURRENCY;
use crate::AGENT_WEIGHT;
use crate::DEFAULT_MAX_PENDING;
use crate::Error;
use crate::Score;
use crate::agent::CostRates;

pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6333";
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_AGENT_MODEL: &str = "gpt-5-mini";
pub const DEFAULT_AGENT_EFFORT: &str = "medium";

/// Process configuration, read once from the environment at startup and
/// passed through context.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub qdrant_url: String,
    pub openai_api_key: Option<String>,
    pub max_pending: i64,
    pub api_url: Option<String>,
    pub bind: String,
    pub cors_origin: Option<String>,
    pub agent: Option<AgentConfig>,
}

/// Agent stage configuration; present only when `AGENT_API_KEY` is set.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub api_key: String,
    pub model: String,
    pub reasoning_effort: String,
    pub verbosity: Option<String>,
    pub cache_capacity: usize,
    pub weight: Score,
    pub max_concurrency: usize,
    pub costs: CostRates,
}

impl Config {
    pub fn from_env() -> Self {
        let agent = var("AGENT_API_KEY").map(|api_key| AgentConfig {
            api_key,
            model: var("AGENT_MODEL").unwrap_or_else(|| DEFAULT_AGENT_MODEL.to_string()),
            reasoning_effort: var("AGENT_REASONING_EFFORT")
                .unwrap_or_else(|| DEFAULT_AGENT_EFFORT.to_string()),
            verbosity: var("AGENT_VERBOSITY"),
            cache_capacity: parsed("AGENT_CACHE_CAPACITY", 0),
            weight: parsed("AGENT_WEIGHT", AGENT_WEIGHT),
            max_concurrency: parsed("AGENT_MAX_CONCURRENCY", AGENT_MAX_CONCURRENCY),
            costs: CostRates {
                input_per_1k: parsed("AGENT_COST_INPUT_PER_1K", 0.0),
                output_per_1k: parsed("AGENT_COST_OUTPUT_PER_1K", 0.0),
                reasoning_per_1k: parsed("AGENT_COST_REASONING_PER_1K", 0.0),
            },
        });
        Self {
            database_url: var("DATABASE_URL"),
            qdrant_url: var("QDRANT_URL").unwrap_or_else(|| DEFAULT_QDRANT_URL.to_string()),
            openai_api_key: var("OPENAI_API_KEY"),
            max_pending: parsed("CHESSMATE_MAX_PENDING_EMBEDDINGS", DEFAULT_MAX_PENDING),
            api_url: var("CHESSMATE_API_URL"),
            bind: var("CHESSMATE_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string()),
            cors_origin: var("CHESSMATE_CORS_ORIGIN"),
            agent,
        }
    }

    pub fn database_url(&self) -> Result<&str, Error> {
        self.database_url
            .as_deref()
            .ok_or_else(|| Error::BadInput("DATABASE_URL must be set".to_string()))
    }
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr + Copy>(name: &str, default: T) -> T {
    match var(name) {
        None => default,
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                log::warn!("ignoring unparseable {}={}", name, raw);
                default
            }
        },
    }
}
