//! Engine lifecycle events, fanned out to whoever is watching the cluster.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::Container;

/// One lifecycle event observed on an engine's container runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Runtime event category (e.g. `"container"`).
    pub kind: String,
    /// Runtime action (e.g. `"start"`, `"die"`, `"destroy"`).
    pub action: String,
    pub time: DateTime<Utc>,
    /// The container the event concerns, resolved at delivery time.
    pub container: Container,
}

/// Receives events as engines report them. Implemented by the cluster
/// aggregator, which re-broadcasts to its own subscribers; callers that only
/// want to watch can implement this directly instead of polling.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: Event);
}
