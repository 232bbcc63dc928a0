use service_core::middleware::rate_limit::{create_token_bucket, UnkeyedRateLimiter};
use std::time::Duration;

use crate::config::RateLimitConfig;

/// Operations admitted through their own token bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Registration,
    Login,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Registration => "registration",
            Operation::Login => "login",
        }
    }
}

/// Per-operation admission control. Cloning shares the buckets.
#[derive(Clone)]
pub struct RateGate {
    registration: UnkeyedRateLimiter,
    login: UnkeyedRateLimiter,
}

impl RateGate {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::from_buckets(
            create_token_bucket(
                config.register_burst,
                Duration::from_secs(config.register_refill_seconds),
            ),
            create_token_bucket(
                config.login_burst,
                Duration::from_secs(config.login_refill_seconds),
            ),
        )
    }

    pub fn from_buckets(registration: UnkeyedRateLimiter, login: UnkeyedRateLimiter) -> Self {
        Self {
            registration,
            login,
        }
    }

    /// Take one token from the bucket of `op`. Never blocks.
    pub fn admit(&self, op: Operation) -> bool {
        let bucket = match op {
            Operation::Registration => &self.registration,
            Operation::Login => &self.login,
        };
        bucket.check().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(register_burst: u32, login_burst: u32) -> RateGate {
        RateGate::from_buckets(
            create_token_bucket(register_burst, Duration::from_secs(3600)),
            create_token_bucket(login_burst, Duration::from_secs(3600)),
        )
    }

    #[test]
    fn burst_is_admitted_then_rejected() {
        let gate = gate(2, 1);
        assert!(gate.admit(Operation::Registration));
        assert!(gate.admit(Operation::Registration));
        assert!(!gate.admit(Operation::Registration));
    }

    #[test]
    fn buckets_are_independent() {
        let gate = gate(1, 1);
        assert!(gate.admit(Operation::Registration));
        assert!(!gate.admit(Operation::Registration));
        assert!(gate.admit(Operation::Login));
    }

    #[test]
    fn clones_share_state() {
        let gate = gate(1, 1);
        let clone = gate.clone();
        assert!(clone.admit(Operation::Login));
        assert!(!gate.admit(Operation::Login));
    }
}
