//! Credential validator
//!
//! Answers "is this username/password pair currently valid?" by consulting
//! the positive cache first and falling back to a RADIUS Access-Request.
//! RADIUS transport errors degrade to a denial.

use crate::auth::cache::AuthCache;
use crate::radius::{AccessDecision, AccessRequester};
use std::sync::Arc;
use tracing::{debug, warn};

/// Cache-then-RADIUS credential validator
pub struct Validator {
    cache: Arc<AuthCache>,
    radius: Arc<dyn AccessRequester>,
}

impl Validator {
    /// Create a validator over the given cache and Access-Request issuer
    pub fn new(cache: Arc<AuthCache>, radius: Arc<dyn AccessRequester>) -> Self {
        Validator { cache, radius }
    }

    /// Validate a username/password pair.
    ///
    /// A cache hit with a matching, unexpired password slides the retention
    /// window and short-circuits RADIUS. Anything else goes to RADIUS:
    /// Accept caches the pair and validates; Reject and transport errors
    /// deny and leave the cache untouched.
    pub async fn validate(&self, username: &str, password: &str) -> bool {
        if self.cache.check_and_refresh(username, password) {
            debug!("Auth cache hit for {}", username);
            return true;
        }

        match self.radius.access_request(username, password).await {
            Ok(AccessDecision::Accept) => {
                self.cache.upsert(username, password);
                true
            }
            Ok(AccessDecision::Reject) => {
                debug!("RADIUS rejected credentials for {}", username);
                false
            }
            Err(e) => {
                warn!("RADIUS exchange failed for {}: {}", username, e);
                false
            }
        }
    }

    /// The cache backing this validator
    pub fn cache(&self) -> &AuthCache {
        &self.cache
    }
}
