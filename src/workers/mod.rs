use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::{
    jobs::{mark_job_failed, mark_job_succeeded, reserve_job, retry_or_fail, JobQueueError},
    models::Job,
    state::AppState,
};

pub mod notify;

#[derive(Debug)]
pub enum JobExecution {
    Success,
    Retry { delay: Duration, error: String },
    Failed { error: String },
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> &'static str;
    async fn handle(&self, state: Arc<AppState>, job: Job) -> JobExecution;
}

pub struct Worker {
    state: Arc<AppState>,
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(
        state: Arc<AppState>,
        handlers: Vec<Arc<dyn JobHandler>>,
        poll_interval: Duration,
    ) -> Self {
        let map = handlers
            .into_iter()
            .map(|handler| (handler.job_type(), handler))
            .collect();
        Self {
            state,
            handlers: map,
            poll_interval,
        }
    }

    pub async fn run(&self) {
        info!(handlers = self.handlers.len(), "worker started");
        loop {
            match self.tick().await {
                Ok(true) => {}
                Ok(false) => sleep(self.poll_interval).await,
                Err(err) => {
                    error!(error = %err, "worker tick failed");
                    sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Runs at most one job. Returns `true` when a job was processed.
    pub async fn tick(&self) -> Result<bool, JobQueueError> {
        let job_types: Vec<&str> = self.handlers.keys().copied().collect();
        if job_types.is_empty() {
            return Ok(false);
        }

        let mut conn = match self.state.db() {
            Ok(conn) => conn,
            Err(err) => {
                error!(?err, "failed to obtain database connection in worker");
                return Ok(false);
            }
        };

        let job_opt = reserve_job(&mut conn, &job_types)?;
        drop(conn);

        let Some(job) = job_opt else {
            return Ok(false);
        };

        let Some(handler) = self.handlers.get(job.job_type.as_str()) else {
            error!(
                job_id = %job.id,
                job_type = %job.job_type,
                "no handler registered for job type"
            );
            if let Ok(mut conn) = self.state.db() {
                mark_job_failed(&mut conn, job.id, "no handler registered")?;
            }
            return Ok(true);
        };

        let result = handler.handle(self.state.clone(), job.clone()).await;
        let Ok(mut conn) = self.state.db() else {
            error!(job_id = %job.id, "failed to record job outcome due to pool error");
            return Ok(true);
        };
        match result {
            JobExecution::Success => {
                mark_job_succeeded(&mut conn, job.id)?;
                info!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    "job completed successfully"
                );
            }
            JobExecution::Retry { delay, error } => {
                let max_attempts = self.state.config.notification_max_attempts;
                if retry_or_fail(&mut conn, &job, delay, max_attempts, &error)? {
                    warn!(
                        job_id = %job.id,
                        job_type = %job.job_type,
                        attempts = job.attempts,
                        %error,
                        "job will retry"
                    );
                } else {
                    error!(
                        job_id = %job.id,
                        job_type = %job.job_type,
                        attempts = job.attempts,
                        %error,
                        "job gave up after retries"
                    );
                }
            }
            JobExecution::Failed { error } => {
                error!(job_id = %job.id, job_type = %job.job_type, %error, "job failed");
                mark_job_failed(&mut conn, job.id, &error)?;
            }
        }
        Ok(true)
    }
}

pub fn default_handlers() -> Vec<Arc<dyn JobHandler>> {
    vec![Arc::new(notify::NotifyParticipantsJob::new())]
}
