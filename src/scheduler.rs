//! Recurring discovery jobs.
//!
//! A job moves `Idle -> Running -> Idle | IdleWithErrors` each time it runs.
//! Every run updates `last_run_at` and `next_run_at`, even when sources
//! fail, so one bad run never blocks the next.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::context::DiscoveryContext;
use crate::engine::DiscoveryEngine;
use crate::errors::AppError;
use crate::models::{DiscoveryJob, Frequency, JobStatus, StrategyOverrides};
use crate::notifier::{spawn_alert, Notifier};
use crate::repository::LeadRepository;

/// Payload for creating a job.
#[derive(Debug, Clone, Deserialize)]
pub struct NewJob {
    pub industry: String,
    pub location: String,
    pub frequency: Frequency,
    #[serde(default = "default_max_leads_per_run")]
    pub max_leads_per_run: usize,
    #[serde(default)]
    pub min_opportunity_score: u8,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_max_leads_per_run() -> usize {
    25
}

fn default_enabled() -> bool {
    true
}

/// What one job run did.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobRunReport {
    pub job_id: Uuid,
    pub discovered: usize,
    pub duplicates_skipped: usize,
    pub below_threshold: usize,
    pub saved: usize,
    pub high_value: usize,
    pub errors: Vec<String>,
}

#[derive(Default)]
pub struct JobStore {
    jobs: RwLock<Vec<DiscoveryJob>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, new_job: NewJob, now: DateTime<Utc>) -> Result<DiscoveryJob, AppError> {
        if new_job.industry.trim().is_empty() || new_job.location.trim().is_empty() {
            return Err(AppError::BadRequest("industry and location are required".to_string()));
        }
        if new_job.max_leads_per_run == 0 {
            return Err(AppError::BadRequest("max_leads_per_run must be at least 1".to_string()));
        }

        let mut job = DiscoveryJob::new(
            new_job.industry.trim(),
            new_job.location.trim(),
            new_job.frequency,
            new_job.max_leads_per_run,
            new_job.min_opportunity_score,
            now,
        );
        job.enabled = new_job.enabled;

        tracing::info!("Created discovery job {} ({} in {})", job.id, job.industry, job.location);
        self.jobs.write().await.push(job.clone());
        Ok(job)
    }

    pub async fn list(&self) -> Vec<DiscoveryJob> {
        self.jobs.read().await.clone()
    }

    pub async fn get(&self, id: Uuid) -> Option<DiscoveryJob> {
        self.jobs.read().await.iter().find(|j| j.id == id).cloned()
    }

    pub async fn due(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        self.jobs
            .read()
            .await
            .iter()
            .filter(|j| j.is_due(now))
            .map(|j| j.id)
            .collect()
    }

    /// Mark a job running. `None` when it is missing or already running.
    pub async fn start(&self, id: Uuid) -> Option<DiscoveryJob> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.iter_mut().find(|j| j.id == id)?;
        if job.status == JobStatus::Running {
            return None;
        }
        job.status = JobStatus::Running;
        Some(job.clone())
    }

    /// Back to idle with the next run scheduled from `now`.
    pub async fn finish(&self, id: Uuid, now: DateTime<Utc>, had_errors: bool) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
            job.status = if had_errors {
                JobStatus::IdleWithErrors
            } else {
                JobStatus::Idle
            };
            job.last_run_at = Some(now);
            job.next_run_at = now + job.frequency.interval();
        }
    }
}

pub struct DiscoveryScheduler {
    engine: Arc<DiscoveryEngine>,
    jobs: Arc<JobStore>,
    repository: Arc<dyn LeadRepository>,
    notifier: Arc<dyn Notifier>,
    deadline: Duration,
    poll_interval: Duration,
    high_value_threshold: u8,
}

impl DiscoveryScheduler {
    pub fn new(
        engine: Arc<DiscoveryEngine>,
        jobs: Arc<JobStore>,
        repository: Arc<dyn LeadRepository>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            engine,
            jobs,
            repository,
            notifier,
            deadline: Duration::from_secs(60),
            poll_interval: Duration::from_secs(60),
            high_value_threshold: 80,
        }
    }

    pub fn with_timing(mut self, deadline: Duration, poll_interval: Duration) -> Self {
        self.deadline = deadline;
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_high_value_threshold(mut self, threshold: u8) -> Self {
        self.high_value_threshold = threshold;
        self
    }

    pub fn jobs(&self) -> &Arc<JobStore> {
        &self.jobs
    }

    /// Poll for due jobs until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!("Discovery scheduler started (poll every {:?})", self.poll_interval);
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Discovery scheduler stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let reports = self.run_due_with(Utc::now(), &cancel).await;
                    if !reports.is_empty() {
                        tracing::info!("Scheduler ran {} jobs", reports.len());
                    }
                }
            }
        }
    }

    /// Run every enabled job that is due at `now`, one after another.
    pub async fn run_due(&self, now: DateTime<Utc>) -> Vec<JobRunReport> {
        self.run_due_with(now, &CancellationToken::new()).await
    }

    async fn run_due_with(&self, now: DateTime<Utc>, cancel: &CancellationToken) -> Vec<JobRunReport> {
        let mut reports = Vec::new();
        for id in self.jobs.due(now).await {
            if cancel.is_cancelled() {
                break;
            }
            if let Some(report) = self.run_started(id, cancel).await {
                reports.push(report);
            }
        }
        reports
    }

    /// Run one job immediately, whether or not it is due.
    pub async fn run_now(&self, id: Uuid) -> Result<JobRunReport, AppError> {
        if self.jobs.get(id).await.is_none() {
            return Err(AppError::NotFound(format!("job {}", id)));
        }
        self.run_started(id, &CancellationToken::new())
            .await
            .ok_or_else(|| AppError::BadRequest(format!("job {} is already running", id)))
    }

    async fn run_started(&self, id: Uuid, cancel: &CancellationToken) -> Option<JobRunReport> {
        let job = self.jobs.start(id).await?;
        let report = self.execute(&job, cancel).await;
        self.jobs
            .finish(id, Utc::now(), !report.errors.is_empty())
            .await;
        Some(report)
    }

    async fn execute(&self, job: &DiscoveryJob, cancel: &CancellationToken) -> JobRunReport {
        tracing::info!("=== Running job {}: '{}' in '{}' ===", job.id, job.industry, job.location);
        let ctx = DiscoveryContext::with_parent(self.deadline, cancel);
        let mut report = JobRunReport {
            job_id: job.id,
            ..Default::default()
        };

        let outcome = self
            .engine
            .discover_location(
                &ctx,
                &job.industry,
                &job.location,
                Some(job.max_leads_per_run),
                &StrategyOverrides::default(),
            )
            .await;

        report.discovered = outcome.leads.len();
        report.errors.extend(outcome.errors.iter().map(|e| e.to_string()));
        if outcome.all_sources_failed {
            report.errors.push("all sources failed".to_string());
        }

        let mut high_value_names = Vec::new();
        for lead in &outcome.leads {
            match self
                .repository
                .exists(&lead.name, lead.phone.as_deref(), lead.website.as_deref())
                .await
            {
                Ok(true) => {
                    report.duplicates_skipped += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("Existing-lead lookup failed for '{}': {}", lead.name, e);
                    report.errors.push(e.to_string());
                    continue;
                }
            }

            if lead.opportunity_score < job.min_opportunity_score {
                report.below_threshold += 1;
                continue;
            }

            match self.repository.save(lead).await {
                Ok(()) => {
                    report.saved += 1;
                    if lead.opportunity_score >= self.high_value_threshold {
                        report.high_value += 1;
                        high_value_names.push(format!("{} ({})", lead.name, lead.opportunity_score));
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to save lead '{}': {}", lead.name, e);
                    report.errors.push(e.to_string());
                }
            }
        }

        if report.high_value > 0 {
            let summary = format!(
                "{} in {}: {}",
                job.industry,
                job.location,
                high_value_names.iter().take(5).cloned().collect::<Vec<_>>().join(", ")
            );
            spawn_alert(self.notifier.clone(), job.id, report.high_value, summary);
        }

        tracing::info!(
            "Job {} done: {} discovered, {} duplicates, {} below threshold, {} saved, {} high-value",
            job.id,
            report.discovered,
            report.duplicates_skipped,
            report.below_threshold,
            report.saved,
            report.high_value
        );
        report
    }
}
