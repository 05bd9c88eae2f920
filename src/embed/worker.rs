use crate::CLAIM_BATCH;
use crate::embed::Embedder;
use crate::embed::vector_id;
use crate::store::Job;
use crate::store::Positions;
use crate::store::Queue;
use crate::vector::VectorStore;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::watch;
use tokio_postgres::Client;

/// One claim-embed-settle loop. Multiple workers run against the same job
/// table; lock-skipping claims keep their batches disjoint.
pub struct Worker {
    client: Arc<Client>,
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorStore>,
    poll_sleep: Duration,
    shutdown: watch::Receiver<bool>,
    embedded: AtomicUsize,
    failed: AtomicUsize,
}

impl Worker {
    pub fn new(
        client: Arc<Client>,
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorStore>,
        poll_sleep: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            client,
            embedder,
            vectors,
            poll_sleep,
            shutdown,
            embedded: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    pub fn embedded(&self) -> usize {
        self.embedded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    /// runs until the shutdown signal flips; an in-flight batch settles
    /// naturally before the loop exits
    pub async fn run(mut self) {
        loop {
            if *self.shutdown.borrow() {
                break;
            }
            let jobs = match self.client.claim(CLAIM_BATCH).await {
                Ok(jobs) => jobs,
                Err(e) => {
                    log::error!("claim failed: {}", e);
                    self.idle().await;
                    continue;
                }
            };
            if jobs.is_empty() {
                self.idle().await;
                continue;
            }
            self.process(jobs).await;
        }
        log::info!(
            "worker exiting after {} embedded, {} failed",
            self.embedded(),
            self.failed()
        );
    }

    async fn idle(&mut self) {
        let sleep = tokio::time::sleep(self.poll_sleep);
        tokio::select! {
            _ = sleep => {}
            _ = self.shutdown.changed() => {}
        }
    }

    /// one batched embedder call for the whole claim; a whole-batch failure
    /// re-pends every job, a per-item failure re-pends just that job
    async fn process(&self, jobs: Vec<Job>) {
        let fens = jobs.iter().map(|j| j.fen.clone()).collect::<Vec<String>>();
        match self.embedder.embed(&fens).await {
            Err(e) => {
                log::warn!("embedding batch of {} failed: {}", jobs.len(), e);
                for job in &jobs {
                    self.abandon(job, &e.to_string()).await;
                }
            }
            Ok(vectors) => {
                for (job, vector) in jobs.iter().zip(vectors) {
                    self.settle(job, vector).await;
                }
            }
        }
    }

    async fn settle(&self, job: &Job, vector: Vec<f32>) {
        if vector.len() != self.embedder.dimension() {
            self.abandon(job, "vector dimension mismatch").await;
            return;
        }
        let id = vector_id(&job.fen);
        let payload = match self.client.position_payload(job.position_id).await {
            Ok(payload) => payload,
            Err(e) => {
                self.abandon(job, &e.to_string()).await;
                return;
            }
        };
        if let Err(e) = self.vectors.upsert_point(&id, &vector, &payload).await {
            self.abandon(job, &e.to_string()).await;
            return;
        }
        match self.client.settle(job.id, &id).await {
            Ok(()) => {
                self.embedded.fetch_add(1, Ordering::Relaxed);
                log::debug!("job {} embedded as {}", job.id, id);
            }
            Err(e) => self.abandon(job, &e.to_string()).await,
        }
    }

    async fn abandon(&self, job: &Job, reason: &str) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = self.client.fail(job.id, reason, true).await {
            log::error!("job {} could not be failed: {}", job.id, e);
        }
    }
}
