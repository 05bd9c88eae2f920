use crate::Error;
use crate::IN_PROGRESS_TIMEOUT_SECS;
use crate::MAX_ATTEMPTS;
use crate::store::JOBS;
use crate::store::POSITIONS;
use const_format::concatcp;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_postgres::Client;
use tokio_postgres::Transaction;

/// Lifecycle of an embedding job. `pending` rows are claimable; an
/// `in_progress` row is held by exactly one worker via its row lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn all() -> [JobStatus; 4] {
        [
            JobStatus::Pending,
            JobStatus::InProgress,
            JobStatus::Completed,
            JobStatus::Failed,
        ]
    }
}

impl TryFrom<&str> for JobStatus {
    type Error = ();
    fn try_from(s: &str) -> Result<Self, ()> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "in_progress" => Ok(JobStatus::InProgress),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A claimed embedding job, as handed to a worker loop.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: i64,
    pub position_id: i64,
    pub fen: String,
    pub attempts: i32,
}

impl From<&tokio_postgres::Row> for Job {
    fn from(row: &tokio_postgres::Row) -> Self {
        Self {
            id: row.get::<_, i64>(0),
            position_id: row.get::<_, i64>(1),
            fen: row.get::<_, String>(2),
            attempts: row.get::<_, i32>(3),
        }
    }
}

/// Producer-side enqueue, used inside the per-game ingest transaction.
#[async_trait::async_trait]
pub trait Enqueue: Send + Sync {
    async fn enqueue(&self, position_id: i64, fen: &str) -> Result<(), Error>;
}

#[async_trait::async_trait]
impl Enqueue for Transaction<'_> {
    async fn enqueue(&self, position_id: i64, fen: &str) -> Result<(), Error> {
        const SQL: &str = concatcp!(
            "INSERT INTO ", JOBS, " (position_id, fen) ",
            "VALUES ($1, $2) ",
            "ON CONFLICT (position_id) DO NOTHING"
        );
        self.execute(SQL, &[&position_id, &fen]).await?;
        Ok(())
    }
}

/// Consumer-side queue operations. All state transitions happen in single
/// statements, so concurrent workers coordinate purely through row locks.
#[async_trait::async_trait]
pub trait Queue: Send + Sync {
    /// atomically claim up to `limit` pending jobs, oldest first
    async fn claim(&self, limit: i64) -> Result<Vec<Job>, Error>;
    /// mark completed and stamp the owning position's vector id, atomically
    async fn settle(&self, job_id: i64, vector_id: &str) -> Result<(), Error>;
    /// re-pend a retryable failure below the attempt ceiling, else fail it
    async fn fail(&self, job_id: i64, error: &str, retryable: bool) -> Result<(), Error>;
    async fn count_by_status(&self) -> Result<BTreeMap<JobStatus, i64>, Error>;
    /// flip pending jobs whose position already embeds to completed
    async fn prune_embedded(&self, batch: i64) -> Result<u64, Error>;
    /// return timed-out in_progress jobs to pending
    async fn reclaim_stale(&self) -> Result<u64, Error>;
}

#[async_trait::async_trait]
impl Queue for Client {
    async fn claim(&self, limit: i64) -> Result<Vec<Job>, Error> {
        const SQL: &str = concatcp!(
            "UPDATE ", JOBS, " ",
            "SET    status = 'in_progress', ",
            "       started_at = now(), ",
            "       attempts = attempts + 1 ",
            "WHERE  id IN (",
            "    SELECT id FROM ", JOBS, " ",
            "    WHERE  status = 'pending' ",
            "    ORDER BY enqueued_at ASC ",
            "    LIMIT  $1 ",
            "    FOR UPDATE SKIP LOCKED",
            ") ",
            "RETURNING id, position_id, fen, attempts"
        );
        Ok(self
            .query(SQL, &[&limit])
            .await?
            .iter()
            .map(Job::from)
            .collect())
    }

    async fn settle(&self, job_id: i64, vector_id: &str) -> Result<(), Error> {
        const SQL: &str = concatcp!(
            "WITH done AS (",
            "    UPDATE ", JOBS, " ",
            "    SET    status = 'completed', ",
            "           completed_at = now(), ",
            "           last_error = NULL ",
            "    WHERE  id = $1 ",
            "    RETURNING position_id",
            ") ",
            "UPDATE ", POSITIONS, " p ",
            "SET    vector_id = $2 ",
            "FROM   done ",
            "WHERE  p.id = done.position_id"
        );
        self.execute(SQL, &[&job_id, &vector_id]).await?;
        Ok(())
    }

    async fn fail(&self, job_id: i64, error: &str, retryable: bool) -> Result<(), Error> {
        const SQL: &str = concatcp!(
            "UPDATE ", JOBS, " ",
            "SET    status = CASE ",
            "           WHEN $2 AND attempts < ", MAX_ATTEMPTS, " THEN 'pending' ",
            "           ELSE 'failed' ",
            "       END, ",
            "       completed_at = CASE ",
            "           WHEN $2 AND attempts < ", MAX_ATTEMPTS, " THEN NULL ",
            "           ELSE now() ",
            "       END, ",
            "       last_error = $3 ",
            "WHERE  id = $1"
        );
        self.execute(SQL, &[&job_id, &retryable, &error]).await?;
        Ok(())
    }

    async fn count_by_status(&self) -> Result<BTreeMap<JobStatus, i64>, Error> {
        const SQL: &str = concatcp!(
            "SELECT status, COUNT(*) FROM ", JOBS, " GROUP BY status"
        );
        let mut counts = JobStatus::all()
            .into_iter()
            .map(|status| (status, 0))
            .collect::<BTreeMap<JobStatus, i64>>();
        for row in self.query(SQL, &[]).await? {
            if let Ok(status) = JobStatus::try_from(row.get::<_, String>(0).as_str()) {
                counts.insert(status, row.get::<_, i64>(1));
            }
        }
        Ok(counts)
    }

    async fn prune_embedded(&self, batch: i64) -> Result<u64, Error> {
        const SQL: &str = concatcp!(
            "UPDATE ", JOBS, " ",
            "SET    status = 'completed', ",
            "       completed_at = now() ",
            "WHERE  id IN (",
            "    SELECT j.id ",
            "    FROM   ", JOBS, " j ",
            "    JOIN   ", POSITIONS, " p ON p.id = j.position_id ",
            "    WHERE  j.status = 'pending' ",
            "    AND    p.vector_id IS NOT NULL ",
            "    LIMIT  $1",
            ")"
        );
        Ok(self.execute(SQL, &[&batch]).await?)
    }

    async fn reclaim_stale(&self) -> Result<u64, Error> {
        const SQL: &str = concatcp!(
            "UPDATE ", JOBS, " ",
            "SET    status = 'pending', ",
            "       started_at = NULL ",
            "WHERE  status = 'in_progress' ",
            "AND    started_at < now() - make_interval(secs => $1)"
        );
        Ok(self.execute(SQL, &[&IN_PROGRESS_TIMEOUT_SECS]).await?)
    }
}

#[async_trait::async_trait]
impl Queue for Arc<Client> {
    async fn claim(&self, limit: i64) -> Result<Vec<Job>, Error> {
        self.as_ref().claim(limit).await
    }
    async fn settle(&self, job_id: i64, vector_id: &str) -> Result<(), Error> {
        self.as_ref().settle(job_id, vector_id).await
    }
    async fn fail(&self, job_id: i64, error: &str, retryable: bool) -> Result<(), Error> {
        self.as_ref().fail(job_id, error, retryable).await
    }
    async fn count_by_status(&self) -> Result<BTreeMap<JobStatus, i64>, Error> {
        self.as_ref().count_by_status().await
    }
    async fn prune_embedded(&self, batch: i64) -> Result<u64, Error> {
        self.as_ref().prune_embedded(batch).await
    }
    async fn reclaim_stale(&self) -> Result<u64, Error> {
        self.as_ref().reclaim_stale().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_round_trip() {
        for status in JobStatus::all() {
            assert_eq!(JobStatus::try_from(status.as_str()), Ok(status));
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(JobStatus::try_from("done").is_err());
    }
}
