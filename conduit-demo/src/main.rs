//! Conduit demo binary.
//!
//! Wires the whole pipeline together in one process: declare a topic,
//! provision it on the in-memory cluster, start a consumer that logs
//! every record it receives, publish a greeting, and shut everything
//! down cleanly.
//!
//! ```bash
//! conduit-demo --topic greetings --partitions 2 --message "hola mundo"
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use conduit_catalog::{TopicCatalog, TopicDescriptor};
use conduit_client::{Consumer, ConsumerConfig, Delivery, Producer, ProducerConfig};
use conduit_core::{GroupId, Record};
use conduit_pipeline::{DeliveryPipeline, MemoryCluster, PipelineConfig};

/// Conduit publish/consume demo.
#[derive(Parser, Debug)]
#[command(name = "conduit-demo")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Topic to declare and publish to.
    #[arg(long, default_value = "greetings")]
    topic: String,

    /// Number of partitions for the topic.
    #[arg(long, default_value = "2")]
    partitions: u32,

    /// Replication factor for the topic.
    #[arg(long, default_value = "2")]
    replicas: u32,

    /// Consumer group ID.
    #[arg(long, default_value = "my-group-id")]
    group: String,

    /// The message to publish.
    #[arg(long, default_value = "hello from conduit")]
    message: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!(
        topic = args.topic.as_str(),
        partitions = args.partitions,
        group = args.group.as_str(),
        "starting demo"
    );

    // Declare the topic in the catalog, then provision it on the broker.
    let mut catalog = TopicCatalog::new();
    catalog.declare(
        TopicDescriptor::builder(args.topic.clone())
            .partitions(args.partitions)
            .replicas(args.replicas)
            .build(),
    )?;

    let cluster = MemoryCluster::new();
    let pipeline = Arc::new(DeliveryPipeline::start(
        PipelineConfig::new(vec!["mem://local".to_string()]),
        Arc::new(cluster),
    ));
    pipeline.provision(&catalog).await?;

    // Consumer logs everything it receives and reports back to main.
    let group = GroupId::new(args.group)?;
    let (seen_tx, mut seen_rx) = tokio::sync::mpsc::unbounded_channel();
    let consumer = Consumer::start(
        Arc::clone(&pipeline),
        ConsumerConfig::new(group, "demo-consumer-1"),
        args.topic.clone(),
        move |delivery: Delivery<'_>| {
            info!(
                topic = delivery.topic,
                partition = %delivery.partition,
                offset = %delivery.record.offset,
                value = %String::from_utf8_lossy(&delivery.record.value),
                "message received"
            );
            let _ = seen_tx.send(delivery.record.offset);
            Ok(())
        },
    );

    // Publish the greeting and wait for its acknowledgment.
    let producer = Producer::new(
        Arc::clone(&pipeline),
        args.topic.clone(),
        ProducerConfig::default(),
    )
    .await?;
    let ack = producer.send_and_wait(Record::new(args.message)).await?;
    info!(
        partition = %ack.partition,
        offset = %ack.offset,
        success = ack.success,
        "message published"
    );
    producer.close().await?;

    // Wait for the consumer to see the message, then stop cleanly.
    tokio::time::timeout(Duration::from_secs(5), seen_rx.recv())
        .await
        .map_err(|_| "consumer did not receive the message in time")?;
    consumer.stop().await?;

    if let Ok(pipeline) = Arc::try_unwrap(pipeline) {
        pipeline.shutdown().await;
    }
    info!("demo finished");
    Ok(())
}
