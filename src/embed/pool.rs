use crate::Error;
use crate::JANITOR_INTERVAL;
use crate::PRUNE_BATCH;
use crate::embed::Embedder;
use crate::embed::Worker;
use crate::store::Queue;
use crate::vector::VectorStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_postgres::Client;

/// Pool of N cooperating worker loops plus a janitor that reclaims jobs
/// stranded in_progress by a crashed worker.
pub struct Pool {
    client: Arc<Client>,
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorStore>,
    workers: usize,
    poll_sleep: Duration,
}

impl Pool {
    pub fn new(
        client: Arc<Client>,
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorStore>,
        workers: usize,
        poll_sleep: Duration,
    ) -> Self {
        Self {
            client,
            embedder,
            vectors,
            workers,
            poll_sleep,
        }
    }

    /// Runs until ctrl-c. Startup reconciles queue state: stale claims go
    /// back to pending, already-embedded positions get their jobs closed.
    pub async fn run(self) -> Result<(), Error> {
        let reclaimed = self.client.reclaim_stale().await?;
        if reclaimed > 0 {
            log::warn!("reclaimed {} stale in_progress jobs", reclaimed);
        }
        let pruned = self.client.prune_embedded(PRUNE_BATCH).await?;
        if pruned > 0 {
            log::info!("pruned {} jobs for already-embedded positions", pruned);
        }
        let (tx, rx) = watch::channel(false);
        let mut tasks = JoinSet::new();
        log::info!("starting {} embedding workers", self.workers);
        for _ in 0..self.workers {
            let worker = Worker::new(
                self.client.clone(),
                self.embedder.clone(),
                self.vectors.clone(),
                self.poll_sleep,
                rx.clone(),
            );
            tasks.spawn(worker.run());
        }
        let janitor = self.client.clone();
        let mut janitor_rx = rx.clone();
        tasks.spawn(async move {
            loop {
                let tick = tokio::time::sleep(JANITOR_INTERVAL);
                tokio::select! {
                    _ = tick => {}
                    _ = janitor_rx.changed() => break,
                }
                match janitor.reclaim_stale().await {
                    Ok(0) => {}
                    Ok(n) => log::warn!("janitor reclaimed {} stale jobs", n),
                    Err(e) => log::error!("janitor reclaim failed: {}", e),
                }
            }
        });
        tokio::signal::ctrl_c().await?;
        log::info!("shutdown requested, letting in-flight batches settle");
        let _ = tx.send(true);
        while tasks.join_next().await.is_some() {}
        Ok(())
    }
}
