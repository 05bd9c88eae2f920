use crate::Error;
use crate::FALLBACK_DIMENSION;
use crate::KEYWORD_WEIGHT;
use crate::NO_HIT_BASE;
use crate::NO_HIT_CAP;
use crate::NO_HIT_STEP;
use crate::Score;
use crate::VECTOR_SEARCH_LIMIT;
use crate::VECTOR_WEIGHT;
use crate::agent::AgentUsage;
use crate::agent::Evaluator;
use crate::embed::Embedder;
use crate::search::Plan;
use crate::store::GameSummary;
use crate::store::Retriever;
use crate::vector::SearchFilter;
use crate::vector::VectorStore;
use serde::Serialize;
use std::collections::HashMap;
use std::collections::HashSet;
use std::hash::Hasher;
use std::sync::Arc;

/// One fused result: the metadata summary plus every score component that
/// went into its rank.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredResult {
    pub game: GameSummary,
    pub vector_score: Score,
    pub keyword_score: Score,
    pub total_score: Score,
    pub agent_score: Option<Score>,
    pub themes: Vec<String>,
    pub explanation: Option<String>,
}

/// Envelope returned to the HTTP and CLI surfaces.
#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub plan: Plan,
    pub results: Vec<ScoredResult>,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentUsage>,
}

/// Hybrid retrieval: metadata overfetch joined with filtered k-NN, fused
/// by weighted score, optionally re-ranked by the agent.
pub struct Executor {
    retriever: Arc<dyn Retriever>,
    vectors: Arc<dyn VectorStore>,
    query_embedder: Option<Arc<dyn Embedder>>,
    evaluator: Option<Evaluator>,
}

impl Executor {
    pub fn new(retriever: Arc<dyn Retriever>, vectors: Arc<dyn VectorStore>) -> Self {
        Self {
            retriever,
            vectors,
            query_embedder: None,
            evaluator: None,
        }
    }

    pub fn with_query_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.query_embedder = Some(embedder);
        self
    }

    pub fn with_evaluator(mut self, evaluator: Evaluator) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub async fn run(&self, plan: Plan) -> Result<QueryResponse, Error> {
        let summaries = self.retriever.search_games(&plan).await.map_err(|e| {
            log::error!("metadata search failed: {}", e);
            Error::Unavailable("metadata store".to_string())
        })?;
        let mut warnings = Vec::new();
        let query_vector = self.query_vector(&plan, &mut warnings).await;
        let filter = payload_filter(&plan);
        let hits = match self
            .vectors
            .search(&query_vector, &filter, VECTOR_SEARCH_LIMIT)
            .await
        {
            Ok(hits) => Some(hits),
            Err(e) => {
                log::warn!("vector search degraded to keyword-only: {}", e);
                warnings.push("Vector search unavailable".to_string());
                None
            }
        };
        // best hit per game; hits for games outside the metadata set drop out
        let best = hits.map(|hits| {
            let mut best = HashMap::<i64, Score>::new();
            for hit in hits {
                let entry = best.entry(hit.payload.game_id).or_insert(0.0);
                if hit.score > *entry {
                    *entry = hit.score;
                }
            }
            best
        });
        let (vector_weight, keyword_weight) = match &best {
            Some(_) => (VECTOR_WEIGHT, KEYWORD_WEIGHT),
            None => (0.0, 1.0),
        };
        let mut results = summaries
            .into_iter()
            .map(|summary| {
                let keyword_score = keyword_score(&plan.keywords, &summary);
                let vector_score = match &best {
                    None => 0.0,
                    Some(best) => best
                        .get(&summary.id)
                        .copied()
                        .unwrap_or_else(|| fallback_vector_score(&plan.keywords, &summary)),
                };
                ScoredResult {
                    total_score: vector_weight * vector_score + keyword_weight * keyword_score,
                    game: summary,
                    vector_score,
                    keyword_score,
                    agent_score: None,
                    themes: Vec::new(),
                    explanation: None,
                }
            })
            .collect::<Vec<ScoredResult>>();
        rank(&mut results);
        results.truncate(plan.limit);
        let mut agent = None;
        if let Some(evaluator) = &self.evaluator {
            let ids = results.iter().map(|r| r.game.id).collect::<Vec<i64>>();
            let details = match self.retriever.fetch_games_with_pgn(&ids).await {
                Ok(details) => details
                    .into_iter()
                    .map(|d| (d.summary.id, d))
                    .collect::<HashMap<_, _>>(),
                Err(e) => {
                    warnings.push(format!("could not load PGNs for agent review: {e}"));
                    HashMap::new()
                }
            };
            let (usage, agent_warnings) = evaluator.rerank(&plan, &mut results, &details).await;
            warnings.extend(agent_warnings);
            results.truncate(plan.limit);
            agent = Some(usage);
        }
        Ok(QueryResponse {
            plan,
            results,
            warnings,
            agent,
        })
    }

    async fn query_vector(&self, plan: &Plan, warnings: &mut Vec<String>) -> Vec<f32> {
        if let Some(embedder) = &self.query_embedder {
            match embedder.embed(std::slice::from_ref(&plan.cleaned_text)).await {
                Ok(mut vectors) if !vectors.is_empty() => return vectors.remove(0),
                Ok(_) => warnings.push("query embedding returned no vector".to_string()),
                Err(e) => warnings.push(format!("query embedding failed: {e}")),
            }
        }
        keyword_hash_vector(&plan.keywords)
    }
}

/// Offline stand-in for a query embedding: bucket each keyword into an
/// 8-dimensional histogram and L2-normalize.
pub fn keyword_hash_vector(keywords: &[String]) -> Vec<f32> {
    let mut vector = vec![0.0f32; FALLBACK_DIMENSION];
    for keyword in keywords {
        let mut hasher = fnv::FnvHasher::default();
        hasher.write(keyword.as_bytes());
        vector[(hasher.finish() % FALLBACK_DIMENSION as u64) as usize] += 1.0;
    }
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        let uniform = 1.0 / (FALLBACK_DIMENSION as f32).sqrt();
        return vec![uniform; FALLBACK_DIMENSION];
    }
    vector.into_iter().map(|x| x / norm).collect()
}

/// Conjunctive payload filter; a lone opening slug narrows the k-NN, while
/// multiple opening candidates stay unfiltered to keep the disjunction.
fn payload_filter(plan: &Plan) -> SearchFilter {
    let mut filter = SearchFilter::default();
    let slugs = plan.opening_slugs();
    if let [slug] = slugs.as_slice() {
        filter = filter.matches("opening_slug", *slug);
    }
    if let Some(white) = plan.rating.white_min {
        filter = filter.at_least("white_elo", white as f64);
    }
    if let Some(black) = plan.rating.black_min {
        filter = filter.at_least("black_elo", black as f64);
    }
    filter
}

fn haystack(summary: &GameSummary) -> String {
    let mut parts = vec![
        summary.white_name.clone(),
        summary.black_name.clone(),
    ];
    if let Some(opening) = &summary.opening_name {
        parts.push(opening.clone());
    }
    if let Some(event) = &summary.event {
        parts.push(event.clone());
    }
    parts.join(" ").to_lowercase()
}

/// share of plan keywords appearing anywhere in the summary text
fn keyword_score(keywords: &[String], summary: &GameSummary) -> Score {
    if keywords.is_empty() {
        return 0.0;
    }
    let text = haystack(summary);
    let matches = keywords.iter().filter(|k| text.contains(k.as_str())).count();
    matches as Score / std::cmp::max(1, keywords.len()) as Score
}

/// heuristic for games the vector search never saw
fn fallback_vector_score(keywords: &[String], summary: &GameSummary) -> Score {
    let text = haystack(summary);
    let tokens = text.split_whitespace().collect::<HashSet<&str>>();
    let overlap = keywords
        .iter()
        .filter(|k| tokens.contains(k.as_str()))
        .count();
    (NO_HIT_BASE + NO_HIT_STEP * overlap as Score).min(NO_HIT_CAP)
}

/// stable descending order by fused score, ties broken by recency then id
pub fn rank(results: &mut [ScoredResult]) {
    results.sort_by(|a, b| {
        b.total_score
            .partial_cmp(&a.total_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.game.played_on.cmp(&a.game.played_on))
            .then_with(|| a.game.id.cmp(&b.game.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::PlanFilter;
    use crate::search::RatingFilter;
    use crate::store::GameDetail;
    use crate::vector::Hit;
    use crate::vector::PointPayload;
    use crate::vector::VectorError;

    struct FakeRetriever {
        games: Vec<GameSummary>,
    }

    #[async_trait::async_trait]
    impl Retriever for FakeRetriever {
        async fn search_games(&self, _plan: &Plan) -> Result<Vec<GameSummary>, Error> {
            Ok(self.games.clone())
        }
        async fn fetch_games_with_pgn(&self, ids: &[i64]) -> Result<Vec<GameDetail>, Error> {
            Ok(ids
                .iter()
                .filter_map(|id| self.games.iter().find(|g| g.id == *id))
                .map(|g| GameDetail {
                    summary: g.clone(),
                    pgn: "1. e4 e5 *".to_string(),
                })
                .collect())
        }
    }

    struct FakeVectors {
        hits: Result<Vec<(i64, f32)>, ()>,
    }

    #[async_trait::async_trait]
    impl VectorStore for FakeVectors {
        async fn upsert_point(
            &self,
            _id: &str,
            _vector: &[f32],
            _payload: &PointPayload,
        ) -> Result<(), VectorError> {
            Ok(())
        }
        async fn search(
            &self,
            _vector: &[f32],
            _filter: &SearchFilter,
            _limit: usize,
        ) -> Result<Vec<Hit>, VectorError> {
            match &self.hits {
                Err(_) => Err(VectorError::Unavailable("connection refused".to_string())),
                Ok(hits) => Ok(hits
                    .iter()
                    .map(|(game_id, score)| Hit {
                        id: format!("{game_id:016x}"),
                        score: *score,
                        payload: PointPayload {
                            game_id: *game_id,
                            white_name: String::new(),
                            black_name: String::new(),
                            white_elo: None,
                            black_elo: None,
                            opening_slug: None,
                            eco_code: None,
                            ply: 1,
                            result: "*".to_string(),
                        },
                    })
                    .collect()),
            }
        }
    }

    fn summary(id: i64, white: &str, black: &str) -> GameSummary {
        GameSummary {
            id,
            white_name: white.to_string(),
            black_name: black.to_string(),
            event: None,
            played_on: None,
            result: "1-0".to_string(),
            eco_code: None,
            opening_slug: None,
            opening_name: None,
            white_elo: None,
            black_elo: None,
        }
    }

    fn plan(keywords: &[&str], limit: usize) -> Plan {
        Plan {
            cleaned_text: keywords.join(" "),
            limit,
            filters: vec![],
            rating: RatingFilter::default(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn fuses_vector_and_keyword_scores() {
        // metadata returns A and B; the vector index knows A and some game C
        // that metadata never surfaced
        let retriever = Arc::new(FakeRetriever {
            games: vec![
                summary(1, "Kasparov, Garry", "Karpov, Anatoly"),
                summary(2, "Short, Nigel", "Timman, Jan"),
            ],
        });
        let vectors = Arc::new(FakeVectors {
            hits: Ok(vec![(1, 0.9), (3, 0.95)]),
        });
        // 4 of 5 keywords hit game A as substrings; "shor" hits B's white
        // player but not B's token set, so B keeps the bare fallback base
        let plan = plan(&["kasparov", "garry", "karpov", "anatoly", "shor"], 5);
        let response = Executor::new(retriever, vectors).run(plan).await.unwrap();
        assert_eq!(response.results.len(), 2);
        let first = &response.results[0];
        let second = &response.results[1];
        assert_eq!(first.game.id, 1);
        assert!((first.total_score - (0.7 * 0.9 + 0.3 * 0.8)).abs() < 1e-6);
        assert_eq!(second.game.id, 2);
        assert!((second.total_score - (0.7 * 0.5 + 0.3 * 0.2)).abs() < 1e-6);
        assert!(response.warnings.is_empty());
    }

    #[tokio::test]
    async fn vector_outage_degrades_to_keyword_only() {
        let retriever = Arc::new(FakeRetriever {
            games: vec![
                summary(1, "Kasparov, Garry", "Karpov, Anatoly"),
                summary(2, "Short, Nigel", "Timman, Jan"),
            ],
        });
        let vectors = Arc::new(FakeVectors { hits: Err(()) });
        let plan = plan(&["kasparov"], 5);
        let response = Executor::new(retriever, vectors).run(plan).await.unwrap();
        assert!(
            response
                .warnings
                .contains(&"Vector search unavailable".to_string())
        );
        let first = &response.results[0];
        assert_eq!(first.game.id, 1);
        assert_eq!(first.vector_score, 0.0);
        assert!((first.total_score - 1.0).abs() < 1e-6);
        assert_eq!(response.results[1].total_score, 0.0);
    }

    #[tokio::test]
    async fn truncates_to_plan_limit() {
        let retriever = Arc::new(FakeRetriever {
            games: (1..=20).map(|i| summary(i, "White", "Black")).collect(),
        });
        let vectors = Arc::new(FakeVectors { hits: Ok(vec![]) });
        let response = Executor::new(retriever, vectors)
            .run(plan(&[], 3))
            .await
            .unwrap();
        assert_eq!(response.results.len(), 3);
        // equal scores: ties resolve by ascending game id
        assert_eq!(response.results[0].game.id, 1);
    }

    #[tokio::test]
    async fn single_opening_filter_reaches_the_vector_store() {
        let plan = Plan {
            cleaned_text: String::new(),
            limit: 5,
            filters: vec![
                PlanFilter::new("opening", "kings_indian_defense"),
                PlanFilter::new("eco_range", "E60-E99"),
            ],
            rating: RatingFilter {
                white_min: Some(2500),
                black_min: None,
                max_rating_delta: None,
            },
            keywords: vec![],
        };
        let filter = payload_filter(&plan);
        assert_eq!(filter.must.len(), 2);
    }

    #[test]
    fn hash_vector_is_normalized() {
        let vector = keyword_hash_vector(&["attack".to_string(), "sacrifice".to_string()]);
        assert_eq!(vector.len(), FALLBACK_DIMENSION);
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_keywords_yield_a_uniform_vector() {
        let vector = keyword_hash_vector(&[]);
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(vector.iter().all(|x| *x > 0.0));
    }
}
