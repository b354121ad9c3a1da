//! Broker connection pool.
//!
//! Connections are established lazily on first use and reconnected after
//! failure. A dial round walks every bootstrap address once; rounds are
//! spaced by exponential backoff with jitter, starting at 100ms and
//! capped at 10 seconds. When the round budget runs out the pool reports
//! the broker as unavailable.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::broker::{BrokerLink, ClusterMetadata, Connector};
use crate::error::{PipelineError, PipelineResult};

/// Backoff before the second dial round, in milliseconds.
const INITIAL_BACKOFF_MS: u64 = 100;

/// Backoff ceiling, in milliseconds.
const MAX_BACKOFF_MS: u64 = 10_000;

struct PoolState {
    link: Option<Arc<dyn BrokerLink>>,
    metadata: Option<ClusterMetadata>,
}

/// Lazily-dialed, self-healing broker connection.
///
/// One pool serves one pipeline. The pool caches a single live link plus
/// the metadata fetched over it; [`invalidate`](Self::invalidate) drops
/// both after a mid-operation failure so the next call redials.
pub struct ConnectionPool {
    bootstrap: Vec<String>,
    connector: Arc<dyn Connector>,
    max_dial_rounds: u32,
    inner: Mutex<PoolState>,
}

impl ConnectionPool {
    /// Creates a pool over the given bootstrap addresses.
    #[must_use]
    pub fn new(bootstrap: Vec<String>, connector: Arc<dyn Connector>, max_dial_rounds: u32) -> Self {
        Self {
            bootstrap,
            connector,
            max_dial_rounds: max_dial_rounds.max(1),
            inner: Mutex::new(PoolState {
                link: None,
                metadata: None,
            }),
        }
    }

    /// Returns the live link, dialing bootstrap addresses if none is
    /// cached.
    ///
    /// # Errors
    /// Returns [`PipelineError::BrokerUnavailable`] once every address has
    /// failed in every round.
    pub async fn acquire(&self) -> PipelineResult<Arc<dyn BrokerLink>> {
        let mut state = self.inner.lock().await;
        if let Some(link) = &state.link {
            return Ok(Arc::clone(link));
        }

        let mut backoff_ms = INITIAL_BACKOFF_MS;
        let mut attempts = 0u32;

        for round in 0..self.max_dial_rounds {
            for addr in &self.bootstrap {
                attempts += 1;
                match self.connector.dial(addr).await {
                    Ok(link) => {
                        info!(addr = addr.as_str(), attempts, "connected to broker");
                        state.link = Some(Arc::clone(&link));
                        return Ok(link);
                    }
                    Err(error) => {
                        debug!(addr = addr.as_str(), %error, "dial failed");
                    }
                }
            }

            if round + 1 < self.max_dial_rounds {
                let jitter_ms = rand::thread_rng().gen_range(0..=backoff_ms / 4);
                warn!(
                    round = round + 1,
                    backoff_ms = backoff_ms + jitter_ms,
                    "all bootstrap addresses failed, backing off"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms + jitter_ms)).await;
                backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
            }
        }

        Err(PipelineError::BrokerUnavailable {
            addresses: self.bootstrap.len(),
            attempts,
        })
    }

    /// Drops the cached link and metadata after a connection failure.
    pub async fn invalidate(&self) {
        let mut state = self.inner.lock().await;
        if state.link.take().is_some() {
            debug!("broker link invalidated");
        }
        state.metadata = None;
    }

    /// Fetches fresh cluster metadata and caches it.
    ///
    /// # Errors
    /// Propagates dial and metadata-fetch failures.
    pub async fn refresh_metadata(&self) -> PipelineResult<ClusterMetadata> {
        let link = self.acquire().await?;
        let metadata = link.metadata().await?;
        self.inner.lock().await.metadata = Some(metadata.clone());
        Ok(metadata)
    }

    /// Partition count for a topic, from cached metadata or a fresh fetch.
    ///
    /// # Errors
    /// Returns [`PipelineError::UnknownTopic`] if the broker does not know
    /// the topic even after a refresh.
    pub async fn partition_count(&self, topic: &str) -> PipelineResult<u32> {
        {
            let state = self.inner.lock().await;
            if let Some(count) = state.metadata.as_ref().and_then(|m| m.partition_count(topic)) {
                return Ok(count);
            }
        }

        let metadata = self.refresh_metadata().await?;
        metadata
            .partition_count(topic)
            .ok_or_else(|| PipelineError::UnknownTopic(topic.to_string()))
    }
}
