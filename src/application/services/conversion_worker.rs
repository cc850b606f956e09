use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::Instrument;

use crate::application::ports::{
    publish_json, ConvertError, MessageChannel, PartConverter, PartStore,
};
use crate::domain::{ConversionRequest, PartOutcome, PartResult};
use crate::infrastructure::messaging::routing;

/// Minimum spacing between calls to the conversion capability, shared by
/// the whole pool. A rate-limit courtesy, not a correctness requirement.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_call: Mutex::new(None),
        }
    }

    pub async fn wait(&self) {
        if self.interval.is_zero() {
            return;
        }
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.interval {
                tokio::time::sleep(self.interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConversionWorkerConfig {
    /// Number of concurrent consumers over the request queue.
    pub pool_size: usize,
    pub throttle_interval: Duration,
    /// Budgeted timeout per conversion call; a timeout is reported as a
    /// transient failure and retried by the coordinator.
    pub conversion_timeout: Duration,
}

impl Default for ConversionWorkerConfig {
    fn default() -> Self {
        Self {
            pool_size: 3,
            throttle_interval: Duration::from_millis(250),
            conversion_timeout: Duration::from_secs(120),
        }
    }
}

/// Stateless conversion worker. Pulls one request at a time, calls the
/// external conversion capability, and publishes exactly one result tagged
/// with the tracking id, part number, and attempt it received.
///
/// Workers never touch the part tracker: only the coordinator's completion
/// consumer mutates tracking state, which keeps mutation single-writer per
/// session without any cross-worker locking.
pub struct ConversionWorker {
    channel: Arc<dyn MessageChannel>,
    part_store: Arc<dyn PartStore>,
    converter: Arc<dyn PartConverter>,
    throttle: Arc<Throttle>,
    config: ConversionWorkerConfig,
}

impl ConversionWorker {
    pub fn new(
        channel: Arc<dyn MessageChannel>,
        part_store: Arc<dyn PartStore>,
        converter: Arc<dyn PartConverter>,
        config: ConversionWorkerConfig,
    ) -> Self {
        Self {
            channel,
            part_store,
            converter,
            throttle: Arc::new(Throttle::new(config.throttle_interval)),
            config,
        }
    }

    /// Spawns the configured number of competing consumers and returns
    /// their join handles.
    pub fn spawn_pool(self: Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        (0..self.config.pool_size)
            .map(|worker_index| {
                let worker = Arc::clone(&self);
                tokio::spawn(async move { worker.run(worker_index).await })
            })
            .collect()
    }

    pub async fn run(&self, worker_index: usize) {
        let mut rx = match self.channel.consume(routing::CONVERSION_REQUEST_QUEUE).await {
            Ok(rx) => rx,
            Err(e) => {
                tracing::error!(worker_index, error = %e, "Conversion worker could not attach consumer");
                return;
            }
        };

        tracing::info!(worker_index, "Conversion worker started");
        while let Some(delivery) = rx.recv().await {
            let request: ConversionRequest = match serde_json::from_slice(&delivery.payload) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(error = %e, "Discarding malformed conversion request");
                    let _ = delivery.reject(false).await;
                    continue;
                }
            };

            let span = tracing::info_span!(
                "convert_part",
                worker_index,
                document_id = %request.document_id,
                tracking_id = %request.tracking_id,
                part_number = request.part_number,
                attempt = request.attempt,
            );
            async {
                let outcome = self.convert_one(&request).await;

                let result = PartResult::from_request(&request, outcome);
                let routing_key = match result.outcome {
                    PartOutcome::Completed { .. } => routing::CONVERSION_COMPLETED,
                    PartOutcome::Failed { .. } => routing::CONVERSION_FAILED,
                };
                match publish_json(self.channel.as_ref(), routing_key, &result).await {
                    Ok(()) => {
                        let _ = delivery.ack().await;
                    }
                    Err(e) => {
                        // No result was published; requeue so another worker
                        // picks the part up. Publishing twice is harmless (the
                        // tracker is idempotent), losing the part is not.
                        tracing::error!(error = %e, "Result publish failed; requeueing request");
                        let _ = delivery.reject(true).await;
                    }
                }
            }
            .instrument(span)
            .await;
        }
        tracing::info!(worker_index, "Conversion worker stopped: channel closed");
    }

    async fn convert_one(&self, request: &ConversionRequest) -> PartOutcome {
        let data = match self.part_store.get(&request.payload_ref).await {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(error = %e, "Part payload fetch failed");
                return PartOutcome::Failed {
                    error_detail: format!("payload fetch: {e}"),
                };
            }
        };

        self.throttle.wait().await;

        let started = Instant::now();
        match tokio::time::timeout(self.config.conversion_timeout, self.converter.convert(&data))
            .await
        {
            Ok(Ok(output)) => {
                tracing::info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Part converted"
                );
                PartOutcome::Completed { output }
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Conversion failed");
                PartOutcome::Failed {
                    error_detail: e.to_string(),
                }
            }
            Err(_) => {
                let detail = ConvertError::Transient(format!(
                    "conversion timed out after {:?}",
                    self.config.conversion_timeout
                ));
                tracing::warn!(error = %detail, "Conversion timed out");
                PartOutcome::Failed {
                    error_detail: detail.to_string(),
                }
            }
        }
    }
}
