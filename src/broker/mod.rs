use crate::config::BrokerConfig;
use crate::domain::model::JobMessage;
use crate::utils::error::Result;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    BasicRejectOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Owns the AMQP connection, the durable job queue, and the keepalive
/// watchdog that runs alongside long synchronous jobs.
pub struct BrokerConnection {
    connection: Arc<Connection>,
    channel: Channel,
    queue_name: String,
    keepalive: JoinHandle<()>,
}

impl BrokerConnection {
    /// Connects, declares the durable queue, and starts the keepalive task.
    /// Prefetch is pinned to 1: one job at a time, the next delivery waits
    /// for the current acknowledgement.
    pub async fn open(config: &BrokerConfig) -> Result<Self> {
        tracing::info!(
            "Connecting to broker at {}:{} (queue '{}')",
            config.host,
            config.port,
            config.queue_name
        );

        let connection =
            Connection::connect(&config.amqp_url(), ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;

        channel
            .queue_declare(
                &config.queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        channel.basic_qos(1, BasicQosOptions::default()).await?;

        let connection = Arc::new(connection);
        let keepalive = Self::spawn_keepalive(
            connection.clone(),
            Duration::from_secs(config.keepalive_interval_secs),
        );

        Ok(Self {
            connection,
            channel,
            queue_name: config.queue_name.clone(),
            keepalive,
        })
    }

    /// Liveness watchdog on a fixed schedule. lapin drives AMQP heartbeats on
    /// its own reactor, so this task only has to observe the shared handle and
    /// flag a dropped connection while a job keeps the main loop busy.
    fn spawn_keepalive(connection: Arc<Connection>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick fires immediately, skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if connection.status().connected() {
                    tracing::trace!("Broker connection alive");
                } else {
                    tracing::warn!("Broker connection lost, deliveries will stop");
                }
            }
        })
    }

    /// Delivers one message at a time to `handler` until `shutdown` resolves
    /// or the stream ends. Acknowledgement policy:
    /// - handler success: ack
    /// - malformed body: reject without requeue, it can never become valid
    /// - first failure: nack with requeue
    /// - failure of a redelivered message: reject without requeue, leaving it
    ///   to the queue's dead-letter setup
    pub async fn consume<F, Fut, S>(&self, shutdown: S, handler: F) -> Result<()>
    where
        F: Fn(JobMessage) -> Fut,
        Fut: Future<Output = Result<()>>,
        S: Future<Output = ()>,
    {
        let mut consumer = self
            .channel
            .basic_consume(
                &self.queue_name,
                "xnat-courier",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        tracing::info!("Waiting for jobs on queue '{}'", self.queue_name);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, no longer accepting deliveries");
                    break;
                }
                delivery = consumer.next() => {
                    let Some(delivery) = delivery else {
                        tracing::warn!("Consumer stream ended, broker closed the channel");
                        break;
                    };
                    let delivery = delivery?;

                    match JobMessage::from_bytes(&delivery.data) {
                        Err(e) => {
                            tracing::error!("Dropping undeliverable message: {}", e);
                            delivery
                                .reject(BasicRejectOptions { requeue: false })
                                .await?;
                        }
                        Ok(job) => match handler(job).await {
                            Ok(()) => {
                                delivery.ack(BasicAckOptions::default()).await?;
                                tracing::info!("Job acknowledged");
                            }
                            Err(e) if delivery.redelivered => {
                                tracing::error!(
                                    "Job failed on redelivery, giving up on it: {}",
                                    e
                                );
                                delivery
                                    .reject(BasicRejectOptions { requeue: false })
                                    .await?;
                            }
                            Err(e) => {
                                tracing::error!("Job failed, requeueing for one retry: {}", e);
                                delivery
                                    .nack(BasicNackOptions {
                                        requeue: true,
                                        ..Default::default()
                                    })
                                    .await?;
                            }
                        },
                    }
                }
            }
        }

        Ok(())
    }

    /// Publishes a job message to the queue, persistent so it survives a
    /// broker restart along with the durable queue.
    pub async fn publish_job(&self, job: &JobMessage) -> Result<()> {
        let payload = serde_json::to_vec(job)?;
        self.channel
            .basic_publish(
                "",
                &self.queue_name,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default().with_delivery_mode(2),
            )
            .await?
            .await?;
        tracing::info!("Published job for folder: {}", job.folder_path);
        Ok(())
    }

    /// Stops the keepalive task and closes the connection. The queue is left
    /// in place: deleting it here would drop messages other consumers still
    /// hold.
    pub async fn close(self) -> Result<()> {
        self.keepalive.abort();
        self.connection.close(200, "shutdown").await?;
        tracing::info!("Broker connection closed");
        Ok(())
    }
}
