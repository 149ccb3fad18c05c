use super::{AdaptiveRateLimiter, RateLimiterStatus};
use crate::config::RateLimiterConfig;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::info;

/// Named limiters shared by every unit that calls the same remote API
#[derive(Default)]
pub struct LimiterRegistry {
    limiters: RwLock<HashMap<String, Arc<AdaptiveRateLimiter>>>,
}

impl LimiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(configs: &HashMap<String, RateLimiterConfig>) -> Self {
        let registry = Self::new();
        for (name, config) in configs {
            registry.insert(Arc::new(AdaptiveRateLimiter::from_config(name, config)));
        }
        info!("Rate limiter registry initialized with {} limiters", configs.len());
        registry
    }

    /// Register a limiter under its own name, replacing any previous one
    pub fn insert(&self, limiter: Arc<AdaptiveRateLimiter>) {
        self.limiters
            .write()
            .insert(limiter.name().to_string(), limiter);
    }

    pub fn get(&self, name: &str) -> Option<Arc<AdaptiveRateLimiter>> {
        self.limiters.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.limiters.read().contains_key(name)
    }

    pub fn reset(&self, name: &str) -> bool {
        match self.get(name) {
            Some(limiter) => {
                limiter.reset();
                true
            }
            None => false,
        }
    }

    pub fn statuses(&self) -> BTreeMap<String, RateLimiterStatus> {
        self.limiters
            .read()
            .iter()
            .map(|(name, limiter)| (name.clone(), limiter.get_status()))
            .collect()
    }
}
