//! Token accounting for cost tracking.

use std::ops::{Add, AddAssign};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Token consumption reported by a single provider call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cached_tokens: u64,
    pub reasoning_tokens: u64,
}

impl UsageStats {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            ..Self::default()
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }

    /// Cached prompt tokens are billed at the cached rate, the remainder of
    /// the prompt at the full rate.
    pub fn estimated_cost(&self, pricing: &ModelPricing) -> f64 {
        let uncached = self.prompt_tokens.saturating_sub(self.cached_tokens);
        let per_token = |per_million: f64| per_million / 1_000_000.0;
        uncached as f64 * per_token(pricing.prompt_per_million)
            + self.cached_tokens as f64 * per_token(pricing.cached_prompt_per_million)
            + self.completion_tokens as f64 * per_token(pricing.completion_per_million)
    }
}

impl Add for UsageStats {
    type Output = UsageStats;

    fn add(mut self, rhs: UsageStats) -> UsageStats {
        self += rhs;
        self
    }
}

impl AddAssign for UsageStats {
    fn add_assign(&mut self, rhs: UsageStats) {
        self.prompt_tokens += rhs.prompt_tokens;
        self.completion_tokens += rhs.completion_tokens;
        self.cached_tokens += rhs.cached_tokens;
        self.reasoning_tokens += rhs.reasoning_tokens;
    }
}

/// USD per million tokens.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub prompt_per_million: f64,
    pub cached_prompt_per_million: f64,
    pub completion_per_million: f64,
}

const KNOWN_PRICING: &[(&str, ModelPricing)] = &[
    ("gpt-4o-mini", ModelPricing::new(0.15, 0.075, 0.60)),
    ("gpt-4o", ModelPricing::new(2.50, 1.25, 10.00)),
    ("gpt-4.1-mini", ModelPricing::new(0.40, 0.10, 1.60)),
    ("gpt-4.1", ModelPricing::new(2.00, 0.50, 8.00)),
    ("o4-mini", ModelPricing::new(1.10, 0.275, 4.40)),
    ("gemini-2.0-flash", ModelPricing::new(0.10, 0.025, 0.40)),
    ("gemini-2.5-flash", ModelPricing::new(0.30, 0.075, 2.50)),
    ("gemini-2.5-pro", ModelPricing::new(1.25, 0.31, 10.00)),
    ("claude-3-5-haiku", ModelPricing::new(0.80, 0.08, 4.00)),
    ("claude-sonnet-4", ModelPricing::new(3.00, 0.30, 15.00)),
    ("deepseek-chat", ModelPricing::new(0.27, 0.07, 1.10)),
];

impl ModelPricing {
    pub const fn new(
        prompt_per_million: f64,
        cached_prompt_per_million: f64,
        completion_per_million: f64,
    ) -> Self {
        Self {
            prompt_per_million,
            cached_prompt_per_million,
            completion_per_million,
        }
    }

    /// Longest-prefix lookup in the built-in price table.
    pub fn for_model(model: &str) -> Option<ModelPricing> {
        KNOWN_PRICING
            .iter()
            .filter(|(prefix, _)| model.starts_with(prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, pricing)| *pricing)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub usage: UsageStats,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub attempts: u64,
}

impl UsageSnapshot {
    /// Difference between two snapshots of the same tracker.
    pub fn since(&self, earlier: &UsageSnapshot) -> UsageSnapshot {
        let (now, then) = (&self.usage, &earlier.usage);
        UsageSnapshot {
            usage: UsageStats {
                prompt_tokens: now.prompt_tokens.saturating_sub(then.prompt_tokens),
                completion_tokens: now.completion_tokens.saturating_sub(then.completion_tokens),
                cached_tokens: now.cached_tokens.saturating_sub(then.cached_tokens),
                reasoning_tokens: now.reasoning_tokens.saturating_sub(then.reasoning_tokens),
            },
            successful_calls: self.successful_calls.saturating_sub(earlier.successful_calls),
            failed_calls: self.failed_calls.saturating_sub(earlier.failed_calls),
            attempts: self.attempts.saturating_sub(earlier.attempts),
        }
    }
}

/// Running totals shared by every worker using one client.
#[derive(Debug, Default)]
pub struct UsageTracker {
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
    cached_tokens: AtomicU64,
    reasoning_tokens: AtomicU64,
    successful_calls: AtomicU64,
    failed_calls: AtomicU64,
    attempts: AtomicU64,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, usage: &UsageStats) {
        self.prompt_tokens
            .fetch_add(usage.prompt_tokens, Ordering::Relaxed);
        self.completion_tokens
            .fetch_add(usage.completion_tokens, Ordering::Relaxed);
        self.cached_tokens
            .fetch_add(usage.cached_tokens, Ordering::Relaxed);
        self.reasoning_tokens
            .fetch_add(usage.reasoning_tokens, Ordering::Relaxed);
        self.successful_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        UsageSnapshot {
            usage: UsageStats {
                prompt_tokens: self.prompt_tokens.load(Ordering::Relaxed),
                completion_tokens: self.completion_tokens.load(Ordering::Relaxed),
                cached_tokens: self.cached_tokens.load(Ordering::Relaxed),
                reasoning_tokens: self.reasoning_tokens.load(Ordering::Relaxed),
            },
            successful_calls: self.successful_calls.load(Ordering::Relaxed),
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
        }
    }
}
