//! Per-client ingress rate limiting. Keyed on
//! whatever client identity the caller extracts (user id, else peer IP).

use std::num::NonZeroU32;

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};

use crate::error::GatewayError;

pub struct IngressLimiter {
    limiter: Option<DefaultKeyedRateLimiter<String>>,
}

impl IngressLimiter {
    /// `per_minute == 0` disables limiting entirely (useful in tests and
    /// single-tenant deployments).
    pub fn per_minute(per_minute: u32) -> Self {
        let limiter = NonZeroU32::new(per_minute).map(|n| RateLimiter::keyed(Quota::per_minute(n)));
        Self { limiter }
    }

    pub fn check(&self, client_key: &str) -> Result<(), GatewayError> {
        match &self.limiter {
            None => Ok(()),
            Some(limiter) => limiter
                .check_key(&client_key.to_string())
                .map_err(|_| GatewayError::RateLimited),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_t_passes_and_t_plus_one_is_limited() {
        let limiter = IngressLimiter::per_minute(5);
        for _ in 0..5 {
            assert!(limiter.check("client-a").is_ok());
        }
        assert_eq!(limiter.check("client-a").unwrap_err(), GatewayError::RateLimited);
    }

    #[test]
    fn clients_are_limited_independently() {
        let limiter = IngressLimiter::per_minute(1);
        assert!(limiter.check("client-a").is_ok());
        assert!(limiter.check("client-b").is_ok());
        assert!(limiter.check("client-a").is_err());
    }

    #[test]
    fn zero_quota_disables_limiting() {
        let limiter = IngressLimiter::per_minute(0);
        for _ in 0..100 {
            assert!(limiter.check("client-a").is_ok());
        }
    }
}
