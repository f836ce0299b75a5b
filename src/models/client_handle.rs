use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// A live client for one external service, shared by every caller of the pool
#[derive(Debug)]
pub struct ClientHandle<C> {
    pub service_name: String,
    pub handle: Arc<C>,
    pub created_at: DateTime<Utc>,
}

impl<C> ClientHandle<C> {
    pub fn new(service_name: impl Into<String>, client: C, now: DateTime<Utc>) -> Self {
        Self {
            service_name: service_name.into(),
            handle: Arc::new(client),
            created_at: now,
        }
    }

    /// Older than the reuse window
    pub fn is_expired(&self, now: DateTime<Utc>, reuse_ttl: Duration) -> bool {
        now - self.created_at >= crate::clock::to_chrono(reuse_ttl)
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or_default()
    }
}

impl<C> Clone for ClientHandle<C> {
    fn clone(&self) -> Self {
        Self {
            service_name: self.service_name.clone(),
            handle: Arc::clone(&self.handle),
            created_at: self.created_at,
        }
    }
}
