use crate::agent::AgentReply;
use serde::Serialize;

/// Per-1k-token price estimates, sourced from environment configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct CostRates {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
    pub reasoning_per_1k: f64,
}

impl CostRates {
    pub fn estimate(&self, input: u64, output: u64, reasoning: u64) -> f64 {
        (input as f64 / 1_000.0) * self.input_per_1k
            + (output as f64 / 1_000.0) * self.output_per_1k
            + (reasoning as f64 / 1_000.0) * self.reasoning_per_1k
    }
}

/// Aggregate usage for one query, returned alongside the results.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct AgentUsage {
    pub calls: u64,
    pub cached: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub reasoning_tokens: u64,
    pub cost_usd: f64,
}

impl AgentUsage {
    pub fn absorb(&mut self, reply: &AgentReply, cost: f64) {
        self.calls += 1;
        self.input_tokens += reply.input_tokens;
        self.output_tokens += reply.output_tokens;
        self.reasoning_tokens += reply.reasoning_tokens;
        self.cost_usd += cost;
    }
}

/// One structured telemetry line per agent call.
pub fn record_call(latency_ms: u128, reply: &AgentReply, effort: &str, cost: f64) {
    log::info!(
        target: "agent-telemetry",
        "latency_ms={} input_tokens={} output_tokens={} reasoning_tokens={} reasoning_effort={} estimated_cost={:.6}",
        latency_ms,
        reply.input_tokens,
        reply.output_tokens,
        reply.reasoning_tokens,
        effort,
        cost,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_estimate_scales_per_thousand() {
        let rates = CostRates {
            input_per_1k: 0.01,
            output_per_1k: 0.03,
            reasoning_per_1k: 0.06,
        };
        let cost = rates.estimate(2_000, 1_000, 500);
        assert!((cost - (0.02 + 0.03 + 0.03)).abs() < 1e-9);
    }

    #[test]
    fn usage_accumulates_across_calls() {
        let mut usage = AgentUsage::default();
        let reply = AgentReply {
            content: String::new(),
            input_tokens: 100,
            output_tokens: 40,
            reasoning_tokens: 10,
        };
        usage.absorb(&reply, 0.002);
        usage.absorb(&reply, 0.002);
        assert_eq!(usage.calls, 2);
        assert_eq!(usage.input_tokens, 200);
        assert!((usage.cost_usd - 0.004).abs() < 1e-9);
    }
}
