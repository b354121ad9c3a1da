//! End-to-end publish/consume scenarios.

use std::sync::{Arc, Mutex};

use conduit_client::{
    Consumer, ConsumerConfig, Delivery, FailurePolicy, Producer, ProducerConfig,
};
use conduit_core::{ErrorKind, Offset, PartitionId, Record};
use conduit_pipeline::MemoryCluster;

use crate::harness::{provisioned_pipeline, test_group, wait_until, Collector};

#[tokio::test]
async fn test_hello_is_consumed_exactly_once() {
    let cluster = MemoryCluster::new();
    let pipeline = provisioned_pipeline(&cluster, "t", 2).await;

    let (collector, seen) = Collector::new();
    let mut config = ConsumerConfig::new(test_group(), "m1");
    config.poll_timeout_ms = 10;
    let consumer = Consumer::start(Arc::clone(&pipeline), config, "t", collector);

    let producer = Producer::new(Arc::clone(&pipeline), "t", ProducerConfig::default())
        .await
        .unwrap();
    let ack = producer.send_and_wait(Record::new("hello")).await.unwrap();
    assert!(ack.success);
    producer.close().await.unwrap();

    wait_until("hello arrives", || !seen.lock().unwrap().is_empty()).await;
    // Give a redelivery a chance to show up before asserting exactly-once.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    consumer.stop().await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1, "one send, one delivery");
    assert_eq!(seen[0].value.as_ref(), b"hello");
}

#[tokio::test]
async fn test_handler_failure_leaves_commit_and_redelivers() {
    let cluster = MemoryCluster::new();
    let pipeline = provisioned_pipeline(&cluster, "t", 1).await;
    let partition = PartitionId::new(0);
    let producer = Producer::new(Arc::clone(&pipeline), "t", ProducerConfig::default())
        .await
        .unwrap();
    for i in 0..6 {
        producer
            .send_and_wait(Record::new(format!("{i}")))
            .await
            .unwrap();
    }

    // The handler rejects offset 5 on its first delivery only.
    let offsets = Arc::new(Mutex::new(Vec::new()));
    let committed_at_failure = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&offsets);
    let mut config = ConsumerConfig::new(test_group(), "m1");
    config.poll_timeout_ms = 10;
    // A long backoff keeps the redelivery from racing the commit check.
    config.failure_policy = FailurePolicy::Retry {
        max_attempts: 5,
        backoff_ms: 300,
    };
    let consumer = Consumer::start(
        Arc::clone(&pipeline),
        config,
        "t",
        move |delivery: Delivery<'_>| {
            let mut log = sink.lock().unwrap();
            log.push(delivery.record.offset);
            let fifth_deliveries =
                log.iter().filter(|o| **o == Offset::new(5)).count();
            if delivery.record.offset == Offset::new(5) && fifth_deliveries == 1 {
                return Err(ErrorKind::ProcessingError);
            }
            Ok(())
        },
    );

    // Wait for the failed first delivery of offset 5, then check that
    // the commit still sits at 5 (record 4 processed, record 5 not).
    wait_until("offset 5 delivered once", || {
        offsets
            .lock()
            .unwrap()
            .iter()
            .any(|o| *o == Offset::new(5))
    })
    .await;
    *committed_at_failure.lock().unwrap() = pipeline
        .committed(&test_group(), "t", partition)
        .await
        .unwrap();

    // The retry redelivers offset 5 and the handler accepts it.
    wait_until("offset 5 redelivered", || {
        offsets
            .lock()
            .unwrap()
            .iter()
            .filter(|o| **o == Offset::new(5))
            .count()
            >= 2
    })
    .await;
    consumer.stop().await.unwrap();

    assert_eq!(
        *committed_at_failure.lock().unwrap(),
        Some(Offset::new(5)),
        "failure does not commit past the failed record"
    );
    assert_eq!(
        pipeline.committed(&test_group(), "t", partition).await.unwrap(),
        Some(Offset::new(6)),
        "redelivery success commits the record"
    );
}

#[tokio::test]
async fn test_two_consumers_partition_the_work() {
    let cluster = MemoryCluster::new();
    let pipeline = provisioned_pipeline(&cluster, "t", 2).await;

    // Join both members before producing so each owns one partition.
    let group = test_group();
    pipeline.join_group(&group, "m1", "t").await.unwrap();
    pipeline.join_group(&group, "m2", "t").await.unwrap();

    let (collector_a, seen_a) = Collector::new();
    let mut config_a = ConsumerConfig::new(group.clone(), "m1");
    config_a.poll_timeout_ms = 10;
    let consumer_a = Consumer::start(Arc::clone(&pipeline), config_a, "t", collector_a);

    let (collector_b, seen_b) = Collector::new();
    let mut config_b = ConsumerConfig::new(group.clone(), "m2");
    config_b.poll_timeout_ms = 10;
    let consumer_b = Consumer::start(Arc::clone(&pipeline), config_b, "t", collector_b);

    let producer = Producer::new(Arc::clone(&pipeline), "t", ProducerConfig::default())
        .await
        .unwrap();
    for i in 0..8 {
        producer
            .send_and_wait(Record::new(format!("{i}")))
            .await
            .unwrap();
    }

    wait_until("all records consumed across both members", || {
        seen_a.lock().unwrap().len() + seen_b.lock().unwrap().len() == 8
    })
    .await;
    consumer_a.stop().await.unwrap();
    consumer_b.stop().await.unwrap();

    let seen_a = seen_a.lock().unwrap();
    let seen_b = seen_b.lock().unwrap();
    assert!(!seen_a.is_empty() && !seen_b.is_empty(), "both members got work");
    assert!(
        seen_a.iter().all(|r| r.partition == seen_a[0].partition),
        "each member sticks to its own partition"
    );
    assert!(seen_b.iter().all(|r| r.partition == seen_b[0].partition));
    assert_ne!(seen_a[0].partition, seen_b[0].partition);
}

#[tokio::test]
async fn test_fault_injected_publish_still_consumed_once() {
    let cluster = MemoryCluster::new();
    let pipeline = provisioned_pipeline(&cluster, "t", 2).await;

    let (collector, seen) = Collector::new();
    let mut config = ConsumerConfig::new(test_group(), "m1");
    config.poll_timeout_ms = 10;
    let consumer = Consumer::start(Arc::clone(&pipeline), config, "t", collector);

    // Two transient failures before the append lands; defaults allow it.
    cluster.fail_appends(2).await;
    let producer = Producer::new(Arc::clone(&pipeline), "t", ProducerConfig::default())
        .await
        .unwrap();
    let ack = producer
        .send_and_wait(Record::with_key("k", "through the storm"))
        .await
        .unwrap();
    assert!(ack.success);

    wait_until("record consumed", || !seen.lock().unwrap().is_empty()).await;
    consumer.stop().await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].value.as_ref(), b"through the storm");
}
