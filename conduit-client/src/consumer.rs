//! Record consumer.
//!
//! One consumer runs one dedicated poll loop:
//!
//! ```text
//! Stopped -> Subscribing -> Polling <-> Processing -> Committing -> Polling
//!                                            |
//!                                            v
//!                                         Stopped (shutdown or terminal error)
//! ```
//!
//! Offsets are committed only after the handler succeeds, so a crash
//! between processing and commit redelivers the record (at-least-once).
//! Handler failures leave the position where it was: the retry policy
//! redelivers the same record after a backoff, and only runs out of
//! attempts if the record never processes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use conduit_core::{ErrorKind, GroupId, Offset, PartitionId, Record};
use conduit_pipeline::DeliveryPipeline;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{ClientError, ClientResult};

/// Attempts made for one commit before its failure surfaces.
const COMMIT_RETRY_ATTEMPTS: u32 = 5;

/// Backoff before the second commit attempt, in milliseconds; doubles per
/// attempt.
const COMMIT_RETRY_BACKOFF_MS: u64 = 100;

/// Where the consumer is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsumerState {
    /// Not running.
    #[default]
    Stopped,
    /// Joining the group and waiting for an assignment.
    Subscribing,
    /// Waiting for records on assigned partitions.
    Polling,
    /// Invoking the handler on fetched records.
    Processing,
    /// Writing a committed offset to the broker.
    Committing,
}

/// What to do when the handler rejects a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Redeliver the same record after `backoff_ms`, up to `max_attempts`
    /// handler invocations; exhaustion stops the consumer with a
    /// processing error.
    Retry {
        /// Total handler invocations per record, including the first.
        max_attempts: u32,
        /// Wait between redeliveries, in milliseconds.
        backoff_ms: u64,
    },
    /// Log the failure, commit past the record, and keep going.
    Skip,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self::Retry {
            max_attempts: 5,
            backoff_ms: 500,
        }
    }
}

/// Consumer configuration.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// The consumer group to join.
    pub group: GroupId,
    /// This member's ID within the group.
    pub member_id: String,
    /// Idle wait between polls that return nothing, in milliseconds.
    pub poll_timeout_ms: u64,
    /// Maximum records fetched per partition per poll.
    pub max_poll_records: u32,
    /// What to do when the handler rejects a record.
    pub failure_policy: FailurePolicy,
}

impl ConsumerConfig {
    /// Creates a configuration with defaults for one group member.
    #[must_use]
    pub fn new(group: GroupId, member_id: impl Into<String>) -> Self {
        Self {
            group,
            member_id: member_id.into(),
            poll_timeout_ms: 100,
            max_poll_records: 500,
            failure_policy: FailurePolicy::default(),
        }
    }
}

/// A record as presented to the handler.
#[derive(Debug, Clone, Copy)]
pub struct Delivery<'a> {
    /// The topic the record came from.
    pub topic: &'a str,
    /// The partition the record came from.
    pub partition: PartitionId,
    /// The record itself, offset filled in.
    pub record: &'a Record,
}

/// Per-record processing callback.
///
/// Invoked once per record, in offset order within a partition. Returning
/// `Err` triggers the configured [`FailurePolicy`].
pub trait MessageHandler: Send {
    /// Processes one delivered record.
    ///
    /// # Errors
    /// The returned kind is logged; the failure policy decides whether
    /// the record is redelivered or skipped.
    fn on_message(&mut self, delivery: Delivery<'_>) -> Result<(), ErrorKind>;
}

impl<F> MessageHandler for F
where
    F: FnMut(Delivery<'_>) -> Result<(), ErrorKind> + Send,
{
    fn on_message(&mut self, delivery: Delivery<'_>) -> Result<(), ErrorKind> {
        self(delivery)
    }
}

/// A running consumer.
///
/// Created by [`Consumer::start`]; stopped by [`Consumer::stop`], which
/// lets the in-flight batch finish and commits what succeeded.
pub struct Consumer {
    shutdown_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<ConsumerState>,
    task: JoinHandle<ClientResult<()>>,
}

impl Consumer {
    /// Spawns the poll loop for `topic` with the given handler.
    pub fn start(
        pipeline: Arc<DeliveryPipeline>,
        config: ConsumerConfig,
        topic: impl Into<String>,
        handler: impl MessageHandler + 'static,
    ) -> Self {
        let topic = topic.into();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(ConsumerState::Stopped);

        info!(
            group = %config.group,
            member_id = config.member_id.as_str(),
            topic = topic.as_str(),
            "consumer starting"
        );
        let task = tokio::spawn(run_loop(
            pipeline,
            config,
            topic,
            handler,
            shutdown_rx,
            state_tx,
        ));

        Self {
            shutdown_tx,
            state_rx,
            task,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConsumerState {
        *self.state_rx.borrow()
    }

    /// Signals shutdown and waits for the loop to finish its in-flight
    /// batch and exit.
    ///
    /// # Errors
    /// Returns the loop's terminal error, if it stopped on one.
    pub async fn stop(self) -> ClientResult<()> {
        let _ = self.shutdown_tx.send(true);
        match self.task.await {
            Ok(result) => result,
            // The loop never panics; a join error means it was aborted.
            Err(join_error) => {
                error!(%join_error, "consumer task did not complete");
                Ok(())
            }
        }
    }
}

/// The dedicated poll loop.
async fn run_loop(
    pipeline: Arc<DeliveryPipeline>,
    config: ConsumerConfig,
    topic: String,
    mut handler: impl MessageHandler,
    mut shutdown_rx: watch::Receiver<bool>,
    state_tx: watch::Sender<ConsumerState>,
) -> ClientResult<()> {
    let result = poll_loop(
        &pipeline,
        &config,
        &topic,
        &mut handler,
        &mut shutdown_rx,
        &state_tx,
    )
    .await;

    let _ = state_tx.send(ConsumerState::Stopped);
    if let Err(error) = &result {
        error!(group = %config.group, topic = topic.as_str(), %error, "consumer stopped on error");
    } else {
        info!(group = %config.group, topic = topic.as_str(), "consumer stopped");
    }
    result
}

async fn poll_loop(
    pipeline: &DeliveryPipeline,
    config: &ConsumerConfig,
    topic: &str,
    handler: &mut impl MessageHandler,
    shutdown_rx: &mut watch::Receiver<bool>,
    state_tx: &watch::Sender<ConsumerState>,
) -> ClientResult<()> {
    let _ = state_tx.send(ConsumerState::Subscribing);
    let assigned = pipeline
        .join_group(&config.group, &config.member_id, topic)
        .await?;
    info!(
        group = %config.group,
        member_id = config.member_id.as_str(),
        partitions = assigned.len(),
        "assignment received"
    );

    // Resume from committed positions; fresh partitions start at the
    // earliest offset.
    let mut positions: HashMap<PartitionId, Offset> = HashMap::new();
    for partition in &assigned {
        let position = pipeline
            .committed(&config.group, topic, *partition)
            .await?
            .unwrap_or_else(Offset::earliest);
        positions.insert(*partition, position);
    }

    // Handler invocations for the record currently blocking a partition.
    let mut attempts: HashMap<PartitionId, (Offset, u32)> = HashMap::new();
    let idle = Duration::from_millis(config.poll_timeout_ms);

    loop {
        if *shutdown_rx.borrow() {
            return Ok(());
        }

        let _ = state_tx.send(ConsumerState::Polling);
        let mut delivered_any = false;
        let mut backoff_until: Option<Duration> = None;

        'partitions: for partition in &assigned {
            let from = positions.get(partition).copied().unwrap_or_else(Offset::earliest);
            let records = match pipeline
                .fetch(topic, *partition, from, config.max_poll_records)
                .await
            {
                Ok(records) => records,
                Err(error) if error.is_transient() => {
                    warn!(partition = %partition, %error, "fetch failed, will retry");
                    continue;
                }
                Err(error) => return Err(error.into()),
            };
            if records.is_empty() {
                continue;
            }
            delivered_any = true;

            let _ = state_tx.send(ConsumerState::Processing);
            for record in &records {
                // Invariant: records arrive in offset order from the
                // position we asked for.
                debug_assert!(record.offset >= from);

                let outcome = handler.on_message(Delivery {
                    topic,
                    partition: *partition,
                    record,
                });

                match outcome {
                    Ok(()) => {
                        let next = record.offset.next();
                        let _ = state_tx.send(ConsumerState::Committing);
                        commit_with_retry(pipeline, &config.group, topic, *partition, next)
                            .await?;
                        positions.insert(*partition, next);
                        attempts.remove(partition);
                        let _ = state_tx.send(ConsumerState::Processing);
                        debug!(
                            partition = %partition,
                            offset = %record.offset,
                            "record processed and committed"
                        );
                    }
                    Err(kind) => {
                        let made = match attempts.get(partition) {
                            Some((offset, count)) if *offset == record.offset => count + 1,
                            _ => 1,
                        };
                        attempts.insert(*partition, (record.offset, made));
                        warn!(
                            partition = %partition,
                            offset = %record.offset,
                            attempts = made,
                            kind = kind.as_str(),
                            "handler rejected record"
                        );

                        match config.failure_policy {
                            FailurePolicy::Skip => {
                                let next = record.offset.next();
                                let _ = state_tx.send(ConsumerState::Committing);
                                commit_with_retry(pipeline, &config.group, topic, *partition, next)
                                    .await?;
                                positions.insert(*partition, next);
                                attempts.remove(partition);
                                let _ = state_tx.send(ConsumerState::Processing);
                            }
                            FailurePolicy::Retry {
                                max_attempts,
                                backoff_ms,
                            } => {
                                if made >= max_attempts {
                                    return Err(ClientError::Processing {
                                        topic: topic.to_string(),
                                        partition: *partition,
                                        offset: record.offset,
                                        attempts: made,
                                    });
                                }
                                // Position stays put; the next poll
                                // redelivers this record.
                                backoff_until = Some(Duration::from_millis(backoff_ms));
                                break 'partitions;
                            }
                        }
                    }
                }
            }
        }

        if let Some(backoff) = backoff_until {
            wait_or_shutdown(shutdown_rx, backoff).await;
        } else if !delivered_any {
            wait_or_shutdown(shutdown_rx, idle).await;
        }
    }
}

/// Commits an offset, retrying transient failures with bounded backoff.
///
/// A dropped connection between processing and commit is routine; the
/// record is already handled, so the commit is worth a few redials before
/// the consumer gives up on it.
async fn commit_with_retry(
    pipeline: &DeliveryPipeline,
    group: &GroupId,
    topic: &str,
    partition: PartitionId,
    offset: Offset,
) -> ClientResult<()> {
    let mut backoff_ms = COMMIT_RETRY_BACKOFF_MS;
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match pipeline.commit(group, topic, partition, offset).await {
            Ok(()) => return Ok(()),
            Err(error) if error.is_transient() && attempt < COMMIT_RETRY_ATTEMPTS => {
                warn!(
                    partition = %partition,
                    offset = %offset,
                    attempt,
                    %error,
                    "commit failed, retrying"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2;
            }
            Err(error) => return Err(error.into()),
        }
    }
}

/// Sleeps, waking early if shutdown is signalled.
async fn wait_or_shutdown(shutdown_rx: &mut watch::Receiver<bool>, duration: Duration) {
    if *shutdown_rx.borrow() {
        return;
    }
    tokio::select! {
        () = tokio::time::sleep(duration) => {}
        _ = shutdown_rx.changed() => {}
    }
}
