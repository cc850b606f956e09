use std::sync::Arc;
use std::time::Duration;

use partwise::application::ports::{PartConverter, PartStore, PartTracker};
use partwise::application::services::{ConversionWorker, Coordinator, Merger, Splitter};
use partwise::config::{Settings, TrackerBackend};
use partwise::infrastructure::conversion::HttpConverter;
use partwise::infrastructure::messaging::{declare_queues, InMemoryChannel};
use partwise::infrastructure::observability::{init_tracing, TracingConfig};
use partwise::infrastructure::storage::ObjectPartStore;
use partwise::infrastructure::tracking::{create_pool, InMemoryPartTracker, PgPartTracker};

/// Runs every worker role in one process: coordinator dispatch, coordinator
/// completion consumer, the conversion worker pool, and the merger.
/// Multi-process topologies split these across processes under an external
/// supervisor; that wiring stays outside this binary.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing(TracingConfig::default());
    let settings = Settings::from_env();

    let channel = InMemoryChannel::new();
    declare_queues(channel.as_ref()).await?;

    let tracker: Arc<dyn PartTracker> = match settings.tracker.backend {
        TrackerBackend::Memory => {
            tracing::info!("Using in-memory tracker; state will not survive a restart");
            Arc::new(InMemoryPartTracker::new())
        }
        TrackerBackend::Postgres => {
            let url = settings
                .tracker
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL required for postgres tracker"))?;
            let pool = create_pool(url, settings.tracker.max_connections).await?;
            let tracker = PgPartTracker::new(pool);
            tracker.ensure_schema().await?;
            Arc::new(tracker)
        }
    };

    let part_store: Arc<dyn PartStore> =
        Arc::new(ObjectPartStore::local(settings.storage.root_dir.clone())?);

    let converter: Arc<dyn PartConverter> = Arc::new(HttpConverter::new(
        &settings.conversion.converter_url,
        Duration::from_secs(settings.conversion.timeout_secs),
    )?);

    let coordinator = Arc::new(Coordinator::new(
        Arc::clone(&tracker),
        channel.clone(),
        Arc::clone(&part_store),
        Splitter::new(settings.split_policy()),
        settings.retry_policy(),
    ));
    let merger = Arc::new(Merger::new(Arc::clone(&tracker), channel.clone()));
    let workers = Arc::new(ConversionWorker::new(
        channel.clone(),
        Arc::clone(&part_store),
        converter,
        settings.worker_config(),
    ));

    let mut handles = vec![
        tokio::spawn(Arc::clone(&coordinator).run_dispatch_loop()),
        tokio::spawn(coordinator.run_completion_loop()),
        tokio::spawn(merger.run()),
    ];
    handles.extend(workers.spawn_pool());

    tracing::info!("Pipeline running; press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    for handle in handles {
        handle.abort();
    }

    Ok(())
}
