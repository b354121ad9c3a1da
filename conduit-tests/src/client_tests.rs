//! Producer routing and consumer commit tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use conduit_catalog::{TopicCatalog, TopicDescriptor};
use conduit_client::{
    Consumer, ConsumerConfig, Delivery, FailurePolicy, Producer, ProducerConfig,
};
use conduit_core::{ErrorKind, GroupId, Offset, PartitionId, Record};
use conduit_pipeline::{
    BrokerLink, ClusterMetadata, Connector, DeliveryPipeline, MemoryCluster, PipelineConfig,
    PipelineError, PipelineResult,
};

use crate::harness::{provisioned_pipeline, test_group, wait_until, Collector};

/// Cluster wrapper that fails the next N offset commits with a connection
/// error before delegating to the in-memory broker.
struct FlakyCommitCluster {
    cluster: MemoryCluster,
    commit_failures: Arc<AtomicU32>,
}

#[async_trait]
impl Connector for FlakyCommitCluster {
    async fn dial(&self, _addr: &str) -> PipelineResult<Arc<dyn BrokerLink>> {
        Ok(Arc::new(Self {
            cluster: self.cluster.clone(),
            commit_failures: Arc::clone(&self.commit_failures),
        }))
    }
}

#[async_trait]
impl BrokerLink for FlakyCommitCluster {
    async fn provision_topic(&self, descriptor: &TopicDescriptor) -> PipelineResult<()> {
        self.cluster.provision_topic(descriptor).await
    }

    async fn append(
        &self,
        topic: &str,
        partition: PartitionId,
        records: Vec<Record>,
    ) -> PipelineResult<Offset> {
        self.cluster.append(topic, partition, records).await
    }

    async fn fetch(
        &self,
        topic: &str,
        partition: PartitionId,
        from: Offset,
        max_records: u32,
    ) -> PipelineResult<Vec<Record>> {
        self.cluster.fetch(topic, partition, from, max_records).await
    }

    async fn commit_offset(
        &self,
        group: &GroupId,
        topic: &str,
        partition: PartitionId,
        offset: Offset,
    ) -> PipelineResult<()> {
        if self.commit_failures.load(Ordering::SeqCst) > 0 {
            self.commit_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(PipelineError::ConnectionLost {
                reason: "injected commit failure".to_string(),
            });
        }
        self.cluster.commit_offset(group, topic, partition, offset).await
    }

    async fn committed_offset(
        &self,
        group: &GroupId,
        topic: &str,
        partition: PartitionId,
    ) -> PipelineResult<Option<Offset>> {
        self.cluster.committed_offset(group, topic, partition).await
    }

    async fn join_group(
        &self,
        group: &GroupId,
        member_id: &str,
        topic: &str,
    ) -> PipelineResult<Vec<PartitionId>> {
        self.cluster.join_group(group, member_id, topic).await
    }

    async fn metadata(&self) -> PipelineResult<ClusterMetadata> {
        self.cluster.metadata().await
    }
}

#[tokio::test]
async fn test_same_key_always_same_partition() {
    let cluster = MemoryCluster::new();
    let pipeline = provisioned_pipeline(&cluster, "t", 8).await;
    let producer = Producer::new(Arc::clone(&pipeline), "t", ProducerConfig::default())
        .await
        .unwrap();

    let mut partitions = Vec::new();
    for i in 0..10 {
        let ack = producer
            .send_and_wait(Record::with_key("customer-7", format!("event-{i}")))
            .await
            .unwrap();
        assert!(ack.success);
        partitions.push(ack.partition);
    }
    partitions.dedup();
    assert_eq!(partitions.len(), 1, "keyed records never change partition");
}

#[tokio::test]
async fn test_single_partition_preserves_send_order() {
    let cluster = MemoryCluster::new();
    let pipeline = provisioned_pipeline(&cluster, "t", 1).await;
    let producer = Producer::new(Arc::clone(&pipeline), "t", ProducerConfig::default())
        .await
        .unwrap();

    for i in 0..20 {
        let ack = producer
            .send_and_wait(Record::new(format!("{i}")))
            .await
            .unwrap();
        assert!(ack.success);
    }

    let (collector, seen) = Collector::new();
    let mut config = ConsumerConfig::new(test_group(), "m1");
    config.poll_timeout_ms = 10;
    let consumer = Consumer::start(Arc::clone(&pipeline), config, "t", collector);

    wait_until("all 20 records consumed", || seen.lock().unwrap().len() == 20).await;
    consumer.stop().await.unwrap();

    let seen = seen.lock().unwrap();
    let values: Vec<String> = seen
        .iter()
        .map(|r| String::from_utf8_lossy(&r.value).into_owned())
        .collect();
    let expected: Vec<String> = (0..20).map(|i| i.to_string()).collect();
    assert_eq!(values, expected, "partition order is send order");
}

#[tokio::test]
async fn test_interleaved_producers_keep_partition_order() {
    let cluster = MemoryCluster::new();
    let pipeline = provisioned_pipeline(&cluster, "t", 1).await;

    let a = Arc::new(
        Producer::new(Arc::clone(&pipeline), "t", ProducerConfig::default())
            .await
            .unwrap(),
    );
    let b = Arc::new(
        Producer::new(Arc::clone(&pipeline), "t", ProducerConfig::default())
            .await
            .unwrap(),
    );

    let task_a = {
        let a = Arc::clone(&a);
        tokio::spawn(async move {
            for i in 0..10 {
                a.send_and_wait(Record::new(format!("a{i}"))).await.unwrap();
            }
        })
    };
    let task_b = {
        let b = Arc::clone(&b);
        tokio::spawn(async move {
            for i in 0..10 {
                b.send_and_wait(Record::new(format!("b{i}"))).await.unwrap();
            }
        })
    };
    task_a.await.unwrap();
    task_b.await.unwrap();

    // However the two interleave, each producer's own records stay in
    // its send order within the partition.
    let records = pipeline
        .fetch("t", PartitionId::new(0), Offset::earliest(), 100)
        .await
        .unwrap();
    assert_eq!(records.len(), 20);
    let of = |prefix: &str| -> Vec<String> {
        records
            .iter()
            .map(|r| String::from_utf8_lossy(&r.value).into_owned())
            .filter(|v| v.starts_with(prefix))
            .collect()
    };
    assert_eq!(of("a"), (0..10).map(|i| format!("a{i}")).collect::<Vec<_>>());
    assert_eq!(of("b"), (0..10).map(|i| format!("b{i}")).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_commit_is_monotonic_and_trails_processing() {
    let cluster = MemoryCluster::new();
    let pipeline = provisioned_pipeline(&cluster, "t", 1).await;
    let partition = PartitionId::new(0);
    let producer = Producer::new(Arc::clone(&pipeline), "t", ProducerConfig::default())
        .await
        .unwrap();
    for i in 0..5 {
        producer
            .send_and_wait(Record::new(format!("{i}")))
            .await
            .unwrap();
    }

    let (collector, seen) = Collector::new();
    let mut config = ConsumerConfig::new(test_group(), "m1");
    config.poll_timeout_ms = 10;
    let consumer = Consumer::start(Arc::clone(&pipeline), config, "t", collector);
    wait_until("all records processed", || seen.lock().unwrap().len() == 5).await;
    consumer.stop().await.unwrap();

    // Having processed offset 4, the committed offset is 5 and a stale
    // commit cannot move it backwards.
    let group = test_group();
    assert_eq!(
        pipeline.committed(&group, "t", partition).await.unwrap(),
        Some(Offset::new(5))
    );
    pipeline
        .commit(&group, "t", partition, Offset::new(2))
        .await
        .unwrap();
    assert_eq!(
        pipeline.committed(&group, "t", partition).await.unwrap(),
        Some(Offset::new(5))
    );
}

#[tokio::test]
async fn test_transient_commit_failure_does_not_stop_consumer() {
    let cluster = MemoryCluster::new();
    let commit_failures = Arc::new(AtomicU32::new(1));
    let connector = FlakyCommitCluster {
        cluster: cluster.clone(),
        commit_failures: Arc::clone(&commit_failures),
    };

    let mut catalog = TopicCatalog::new();
    catalog.declare(TopicDescriptor::builder("t").build()).unwrap();
    let pipeline = Arc::new(DeliveryPipeline::start(
        PipelineConfig::new(vec!["mem://1".to_string()]),
        Arc::new(connector),
    ));
    pipeline.provision(&catalog).await.unwrap();

    let producer = Producer::new(Arc::clone(&pipeline), "t", ProducerConfig::default())
        .await
        .unwrap();
    producer.send_and_wait(Record::new("survives")).await.unwrap();

    let (collector, seen) = Collector::new();
    let mut config = ConsumerConfig::new(test_group(), "m1");
    config.poll_timeout_ms = 10;
    let consumer = Consumer::start(Arc::clone(&pipeline), config, "t", collector);

    wait_until("record processed", || !seen.lock().unwrap().is_empty()).await;

    // The first commit hits the injected failure; the consumer redials
    // and commits instead of dying.
    let partition = PartitionId::new(0);
    let mut committed = None;
    for _ in 0..200 {
        committed = pipeline
            .committed(&test_group(), "t", partition)
            .await
            .unwrap();
        if committed.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    consumer.stop().await.unwrap();

    assert_eq!(committed, Some(Offset::new(1)), "commit lands on the retry");
    assert_eq!(
        commit_failures.load(Ordering::SeqCst),
        0,
        "the injected failure was consumed"
    );
}

#[tokio::test]
async fn test_two_members_split_the_topic() {
    let cluster = MemoryCluster::new();
    let pipeline = provisioned_pipeline(&cluster, "t", 2).await;

    let group = test_group();
    pipeline.join_group(&group, "m1", "t").await.unwrap();
    let second = pipeline.join_group(&group, "m2", "t").await.unwrap();
    let first = pipeline.join_group(&group, "m1", "t").await.unwrap();

    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_ne!(first[0], second[0], "no partition is assigned twice");
}

#[tokio::test]
async fn test_skip_policy_consumes_past_poison_record() {
    let cluster = MemoryCluster::new();
    let pipeline = provisioned_pipeline(&cluster, "t", 1).await;
    let producer = Producer::new(Arc::clone(&pipeline), "t", ProducerConfig::default())
        .await
        .unwrap();
    for value in ["good-0", "poison", "good-1"] {
        producer.send_and_wait(Record::new(value)).await.unwrap();
    }

    let processed = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&processed);
    let mut config = ConsumerConfig::new(test_group(), "m1");
    config.poll_timeout_ms = 10;
    config.failure_policy = FailurePolicy::Skip;
    let consumer = Consumer::start(
        Arc::clone(&pipeline),
        config,
        "t",
        move |delivery: Delivery<'_>| {
            if delivery.record.value.as_ref() == b"poison" {
                return Err(ErrorKind::ProcessingError);
            }
            sink.lock().unwrap().push(delivery.record.value.clone());
            Ok(())
        },
    );

    wait_until("both good records processed", || {
        processed.lock().unwrap().len() == 2
    })
    .await;
    consumer.stop().await.unwrap();

    assert_eq!(
        pipeline
            .committed(&test_group(), "t", PartitionId::new(0))
            .await
            .unwrap(),
        Some(Offset::new(3)),
        "skip commits past the poison record"
    );
}

#[tokio::test]
async fn test_clean_shutdown_mid_stream_loses_nothing() {
    let cluster = MemoryCluster::new();
    let pipeline = provisioned_pipeline(&cluster, "t", 1).await;
    let partition = PartitionId::new(0);
    let producer = Producer::new(Arc::clone(&pipeline), "t", ProducerConfig::default())
        .await
        .unwrap();
    for i in 0..5 {
        producer
            .send_and_wait(Record::new(format!("{i}")))
            .await
            .unwrap();
    }

    // First consumer drains the first half, then stops cleanly with its
    // commits in place.
    let (collector, seen) = Collector::new();
    let mut config = ConsumerConfig::new(test_group(), "m1");
    config.poll_timeout_ms = 10;
    let consumer = Consumer::start(Arc::clone(&pipeline), config.clone(), "t", collector);
    wait_until("first half processed", || seen.lock().unwrap().len() == 5).await;
    consumer.stop().await.unwrap();
    assert_eq!(
        pipeline.committed(&test_group(), "t", partition).await.unwrap(),
        Some(Offset::new(5)),
        "everything processed before the stop is committed"
    );

    // More records arrive while no consumer is running.
    for i in 5..10 {
        producer
            .send_and_wait(Record::new(format!("{i}")))
            .await
            .unwrap();
    }

    // The second consumer resumes exactly where the commits left off.
    let (collector, resumed) = Collector::new();
    let consumer = Consumer::start(Arc::clone(&pipeline), config, "t", collector);
    wait_until("second half processed", || resumed.lock().unwrap().len() == 5).await;
    consumer.stop().await.unwrap();

    let resumed = resumed.lock().unwrap();
    assert_eq!(
        resumed.first().map(|r| r.offset),
        Some(Offset::new(5)),
        "no record is lost or double-processed across a clean restart"
    );
    assert!(resumed.iter().all(|r| r.offset.get() >= 5));
}

#[tokio::test]
async fn test_consumer_idles_without_records() {
    let cluster = MemoryCluster::new();
    let pipeline = provisioned_pipeline(&cluster, "t", 1).await;

    let (collector, seen) = Collector::new();
    let mut config = ConsumerConfig::new(test_group(), "m1");
    config.poll_timeout_ms = 10;
    let consumer = Consumer::start(Arc::clone(&pipeline), config, "t", collector);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(seen.lock().unwrap().is_empty());
    consumer.stop().await.unwrap();
}
