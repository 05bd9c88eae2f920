use crate::AGENT_ATTEMPTS;
use crate::AGENT_PGN_LIMIT;
use crate::Score;
use crate::agent::Agent;
use crate::agent::AgentCache;
use crate::agent::AgentError;
use crate::agent::AgentUsage;
use crate::agent::AgentVerdict;
use crate::agent::CacheKey;
use crate::agent::CostRates;
use crate::agent::parse_verdict;
use crate::agent::record_call;
use crate::search::Plan;
use crate::search::ScoredResult;
use crate::search::rank;
use crate::store::GameDetail;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;
use tokio::sync::Semaphore;

/// Optional re-ranking stage: asks the agent to judge each candidate,
/// blends its score into the fused total, and accounts for every token.
pub struct Evaluator {
    agent: Arc<dyn Agent>,
    cache: AgentCache,
    semaphore: Arc<Semaphore>,
    weight: Score,
    model: String,
    effort: String,
    costs: CostRates,
}

struct Outcome {
    game_id: i64,
    verdict: AgentVerdict,
    usage: AgentUsage,
    warning: Option<String>,
    cached: bool,
}

impl Evaluator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent: Arc<dyn Agent>,
        model: &str,
        effort: &str,
        weight: Score,
        cache_capacity: usize,
        concurrency: usize,
        costs: CostRates,
    ) -> Self {
        Self {
            agent,
            cache: AgentCache::new(cache_capacity),
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            weight,
            model: model.to_string(),
            effort: effort.to_string(),
            costs,
        }
    }

    /// Judges every result concurrently (bounded by the semaphore), merges
    /// `final = (1 - w) * total + w * agent`, and re-sorts.
    pub async fn rerank(
        &self,
        plan: &Plan,
        results: &mut [ScoredResult],
        details: &HashMap<i64, GameDetail>,
    ) -> (AgentUsage, Vec<String>) {
        let fingerprint = plan.fingerprint();
        let outcomes = futures::future::join_all(results.iter().map(|result| {
            let game_id = result.game.id;
            let key = CacheKey {
                model: self.model.clone(),
                effort: self.effort.clone(),
                fingerprint: fingerprint.clone(),
                game_id,
            };
            let prompt = self.prompt(plan, result, details.get(&game_id));
            async move {
                if let Some(verdict) = self.cache.get(&key) {
                    return Outcome {
                        game_id,
                        verdict,
                        usage: AgentUsage {
                            cached: 1,
                            ..AgentUsage::default()
                        },
                        warning: None,
                        cached: true,
                    };
                }
                let _permit = self.semaphore.acquire().await.ok();
                let mut usage = AgentUsage::default();
                match self.call(&prompt, &mut usage).await {
                    Ok(content) => match parse_verdict(&content) {
                        Some(verdict) => Outcome {
                            game_id,
                            verdict,
                            usage,
                            warning: None,
                            cached: false,
                        },
                        None => Outcome {
                            game_id,
                            verdict: AgentVerdict::neutral(),
                            usage,
                            warning: Some(format!(
                                "agent returned malformed judgement for game {game_id}"
                            )),
                            cached: false,
                        },
                    },
                    Err(e) => Outcome {
                        game_id,
                        verdict: AgentVerdict::neutral(),
                        usage,
                        warning: Some(format!("agent evaluation failed for game {game_id}: {e}")),
                        cached: false,
                    },
                }
            }
        }))
        .await;
        let mut usage = AgentUsage::default();
        let mut warnings = Vec::new();
        let mut verdicts = HashMap::new();
        for outcome in outcomes {
            usage.calls += outcome.usage.calls;
            usage.cached += outcome.usage.cached;
            usage.input_tokens += outcome.usage.input_tokens;
            usage.output_tokens += outcome.usage.output_tokens;
            usage.reasoning_tokens += outcome.usage.reasoning_tokens;
            usage.cost_usd += outcome.usage.cost_usd;
            if let Some(warning) = outcome.warning {
                warnings.push(warning);
            }
            if !outcome.cached {
                self.cache.put(
                    CacheKey {
                        model: self.model.clone(),
                        effort: self.effort.clone(),
                        fingerprint: fingerprint.clone(),
                        game_id: outcome.game_id,
                    },
                    outcome.verdict.clone(),
                );
            }
            verdicts.insert(outcome.game_id, outcome.verdict);
        }
        for result in results.iter_mut() {
            if let Some(verdict) = verdicts.get(&result.game.id) {
                result.agent_score = Some(verdict.score);
                result.total_score =
                    (1.0 - self.weight) * result.total_score + self.weight * verdict.score;
                result.themes = verdict.themes.clone();
                result.explanation = verdict.explanation.clone();
            }
        }
        rank(results);
        (usage, warnings)
    }

    /// up to three attempts with jittered delay on transient failure
    async fn call(&self, prompt: &str, usage: &mut AgentUsage) -> Result<String, AgentError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let started = Instant::now();
            match self.agent.complete(prompt).await {
                Ok(reply) => {
                    let cost = self.costs.estimate(
                        reply.input_tokens,
                        reply.output_tokens,
                        reply.reasoning_tokens,
                    );
                    record_call(started.elapsed().as_millis(), &reply, &self.effort, cost);
                    usage.absorb(&reply, cost);
                    return Ok(reply.content);
                }
                Err(e) if e.retryable() && attempt < AGENT_ATTEMPTS => {
                    let jitter = rand::rng().random_range(100..500) * attempt as u64;
                    log::debug!("agent attempt {} failed ({}), retrying", attempt, e);
                    tokio::time::sleep(Duration::from_millis(jitter)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn prompt(
        &self,
        plan: &Plan,
        result: &ScoredResult,
        detail: Option<&GameDetail>,
    ) -> String {
        let mut out = String::from(
            "Judge how well this chess game answers the question. \
             Reply with a JSON object {\"score\": 0.0-1.0, \"themes\": [], \"explanation\": \"\"}.\n",
        );
        out.push_str(&format!("Question: {}\n", plan.cleaned_text));
        for filter in &plan.filters {
            out.push_str(&format!("Filter {} = {}\n", filter.field, filter.value));
        }
        if let Some(white) = plan.rating.white_min {
            out.push_str(&format!("Filter white rating >= {white}\n"));
        }
        if let Some(black) = plan.rating.black_min {
            out.push_str(&format!("Filter black rating >= {black}\n"));
        }
        if let Some(delta) = plan.rating.max_rating_delta {
            out.push_str(&format!("Filter rating gap <= {delta}\n"));
        }
        let game = &result.game;
        out.push_str(&format!(
            "Game: {} vs {}, result {}, eco {}\n",
            game.white_name,
            game.black_name,
            game.result,
            game.eco_code.as_deref().unwrap_or("?"),
        ));
        if let Some(detail) = detail {
            let pgn = if detail.pgn.len() > AGENT_PGN_LIMIT {
                &detail.pgn[..AGENT_PGN_LIMIT]
            } else {
                &detail.pgn
            };
            out.push_str("PGN:\n");
            out.push_str(pgn);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::ScoredResult;
    use crate::search::plan_for_tests;
    use crate::store::GameSummary;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    struct ScriptedAgent {
        calls: AtomicUsize,
        replies: Vec<String>,
    }

    #[async_trait::async_trait]
    impl Agent for ScriptedAgent {
        async fn complete(&self, _prompt: &str) -> Result<crate::agent::AgentReply, AgentError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let content = self
                .replies
                .get(n % self.replies.len())
                .cloned()
                .unwrap_or_default();
            Ok(crate::agent::AgentReply {
                content,
                input_tokens: 10,
                output_tokens: 5,
                reasoning_tokens: 1,
            })
        }
    }

    fn summary(id: i64) -> GameSummary {
        GameSummary {
            id,
            white_name: "White".into(),
            black_name: "Black".into(),
            event: None,
            played_on: None,
            result: "1-0".into(),
            eco_code: None,
            opening_slug: None,
            opening_name: None,
            white_elo: None,
            black_elo: None,
        }
    }

    fn result(id: i64, total: f32) -> ScoredResult {
        ScoredResult {
            game: summary(id),
            vector_score: total,
            keyword_score: 0.0,
            total_score: total,
            agent_score: None,
            themes: Vec::new(),
            explanation: None,
        }
    }

    fn evaluator(agent: ScriptedAgent, cache: usize) -> Evaluator {
        Evaluator::new(
            Arc::new(agent),
            "test-model",
            "low",
            0.5,
            cache,
            4,
            CostRates::default(),
        )
    }

    #[tokio::test]
    async fn merges_agent_scores_and_resorts() {
        let agent = ScriptedAgent {
            calls: AtomicUsize::new(0),
            replies: vec![
                "{\"score\": 0.1, \"themes\": [], \"explanation\": \"dull\"}".into(),
                "{\"score\": 0.9, \"themes\": [\"king_attack\"], \"explanation\": \"sharp\"}".into(),
            ],
        };
        let evaluator = evaluator(agent, 0);
        let mut results = vec![result(1, 0.8), result(2, 0.6)];
        let (usage, warnings) = evaluator
            .rerank(&plan_for_tests(), &mut results, &HashMap::new())
            .await;
        assert!(warnings.is_empty());
        assert_eq!(usage.calls, 2);
        // 0.5 * 0.6 + 0.5 * 0.9 = 0.75 beats 0.5 * 0.8 + 0.5 * 0.1 = 0.45
        assert_eq!(results[0].game.id, 2);
        assert_eq!(results[0].themes, vec!["king_attack"]);
    }

    #[tokio::test]
    async fn malformed_judgement_is_neutral_with_warning() {
        let agent = ScriptedAgent {
            calls: AtomicUsize::new(0),
            replies: vec!["no json here".into()],
        };
        let evaluator = evaluator(agent, 0);
        let mut results = vec![result(1, 0.8)];
        let (_, warnings) = evaluator
            .rerank(&plan_for_tests(), &mut results, &HashMap::new())
            .await;
        assert_eq!(warnings.len(), 1);
        assert_eq!(results[0].agent_score, Some(0.5));
        assert!((results[0].total_score - 0.65).abs() < 1e-6);
    }

    #[tokio::test]
    async fn cache_short_circuits_repeat_queries() {
        let agent = ScriptedAgent {
            calls: AtomicUsize::new(0),
            replies: vec!["{\"score\": 0.7}".into()],
        };
        let evaluator = evaluator(agent, 16);
        let plan = plan_for_tests();
        let mut first = vec![result(1, 0.8)];
        let (usage, _) = evaluator.rerank(&plan, &mut first, &HashMap::new()).await;
        assert_eq!(usage.calls, 1);
        let mut second = vec![result(1, 0.8)];
        let (usage, _) = evaluator.rerank(&plan, &mut second, &HashMap::new()).await;
        assert_eq!(usage.calls, 0);
        assert_eq!(usage.cached, 1);
        assert_eq!(second[0].agent_score, Some(0.7));
    }
}
