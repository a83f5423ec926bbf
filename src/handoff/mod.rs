//! Accepting handoffs and draining them for maintenance.
//!
//! Uploads and removals are admitted only while the service is
//! [`ServiceState::Up`]. Admitted work is registered as loading right away
//! and then runs on a single queue shared by every package, so at most one
//! submission touches the ledger and the content tree at a time.
//!
//! ```text
//! Up --maintenance_mode--> Teardown --(admitted work done)--> MaintenanceMode
//!  ^                                                              |
//!  +------------------------resume_service------------------------+
//! ```

use crate::config::StagingLayout;
use crate::core::{LogLine, StagerError, StagerResult, SubmissionLog};
use crate::di::{Attachment, Notification, ServiceContainer};
use crate::package::fs_ops::remove_quietly;
use crate::package::ledger::LedgerEntry;
use crate::package::manager::{PackageManager, VersionSelector};
use crate::progress::{ProgressManager, ProgressState};
use crate::queue::TaskQueue;
use crate::submission::{CleanupArgs, Submission, SubmissionContent, SubmissionManager};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Up,
    Teardown,
    MaintenanceMode,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceState::Up => f.write_str("up"),
            ServiceState::Teardown => f.write_str("teardown"),
            ServiceState::MaintenanceMode => f.write_str("maintenance mode"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Upload,
    Remove,
}

/// Terminal result of an upload or removal
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffOutcome {
    pub submission_id: String,
    pub operation: Operation,
    /// Committed entry of an upload, or the deleted entries of a removal
    pub entries: Vec<LedgerEntry>,
    pub error: Option<String>,
    pub log: Vec<LogLine>,
}

impl HandoffOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone)]
pub enum SubmissionProgress {
    Running(ProgressState),
    Finished(HandoffOutcome),
    Unknown,
}

/// Terminal outcomes kept for polling; the oldest are dropped first.
const MAX_OUTCOMES: usize = 512;

/// Outcomes of finished submissions, bounded to `capacity` entries.
#[derive(Debug)]
struct Outcomes {
    capacity: usize,
    by_id: HashMap<String, HandoffOutcome>,
    order: VecDeque<String>,
}

impl Outcomes {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            by_id: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, submission_id: &str) -> Option<&HandoffOutcome> {
        self.by_id.get(submission_id)
    }

    fn insert(&mut self, outcome: HandoffOutcome) {
        let submission_id = outcome.submission_id.clone();
        if self.by_id.insert(submission_id.clone(), outcome).is_some() {
            self.order.retain(|id| *id != submission_id);
        }
        self.order.push_back(submission_id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.by_id.remove(&oldest);
            }
        }
    }

    fn remove(&mut self, submission_id: &str) {
        if self.by_id.remove(submission_id).is_some() {
            self.order.retain(|id| id != submission_id);
        }
    }
}

/// Cheap to clone; clones share the same engine.
#[derive(Clone)]
pub struct HandoffManager {
    inner: Arc<Inner>,
}

struct Inner {
    submissions: SubmissionManager,
    services: ServiceContainer,
    progress: ProgressManager,
    queue: TaskQueue,
    state: watch::Sender<ServiceState>,
    /// Serializes the state check with task registration
    admission: Mutex<()>,
    outcomes: Mutex<Outcomes>,
    finished: watch::Sender<u64>,
    notification_sender: String,
}

impl HandoffManager {
    /// Build the engine on `layout`, creating its directories.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        layout: &StagingLayout,
        services: ServiceContainer,
        notification_sender: impl Into<String>,
    ) -> StagerResult<Self> {
        layout.ensure()?;
        let packages = Arc::new(PackageManager::new(layout.main_ledger()));
        let handoff_diff = Arc::new(PackageManager::new(layout.diff_ledger()));
        let submissions = SubmissionManager::new(
            packages,
            handoff_diff,
            services.clone(),
            layout.scratch_root.clone(),
        );
        let (state, _) = watch::channel(ServiceState::Up);
        let (finished, _) = watch::channel(0);

        Ok(Self {
            inner: Arc::new(Inner {
                submissions,
                services,
                progress: ProgressManager::new(),
                queue: TaskQueue::new(),
                state,
                admission: Mutex::new(()),
                outcomes: Mutex::new(Outcomes::new(MAX_OUTCOMES)),
                finished,
                notification_sender: notification_sender.into(),
            }),
        })
    }

    pub fn packages(&self) -> &Arc<PackageManager> {
        self.inner.submissions.packages()
    }

    pub fn progress(&self) -> &ProgressManager {
        &self.inner.progress
    }

    pub fn state(&self) -> ServiceState {
        *self.inner.state.borrow()
    }

    /// Receiver of every state change
    pub fn subscribe(&self) -> watch::Receiver<ServiceState> {
        self.inner.state.subscribe()
    }

    /// Reconcile the ledger with the content packages file.
    pub async fn startup(&self) -> StagerResult<Vec<LedgerEntry>> {
        let inner = self.inner.clone();
        self.inner
            .queue
            .run(async move {
                let log = SubmissionLog::new("startup");
                inner
                    .submissions
                    .packages()
                    .sync_packages_file_to_package_manager_file(&log)
                    .await
            })
            .await?
    }

    /// Queue a package upload. Returns the submission id to poll.
    pub fn upload_package(&self, mut submission: Submission) -> StagerResult<String> {
        if submission.submission_id.is_empty() {
            submission.submission_id = uuid::Uuid::new_v4().to_string();
        }
        let submission_id = submission.submission_id.clone();
        self.inner.admit(&submission_id)?;

        let inner = self.inner.clone();
        self.enqueue(&submission_id, async move {
            inner.run_upload(submission).await;
        })?;
        Ok(submission_id)
    }

    /// Queue the removal of one or every version of a package.
    pub fn remove_package(
        &self,
        id: &str,
        version: VersionSelector,
        email: &str,
    ) -> StagerResult<String> {
        let submission_id = uuid::Uuid::new_v4().to_string();
        self.inner.admit(&submission_id)?;

        let inner = self.inner.clone();
        let (id, email, task_id) = (id.to_string(), email.to_string(), submission_id.clone());
        self.enqueue(&submission_id, async move {
            inner.run_remove(task_id, id, version, email).await;
        })?;
        Ok(submission_id)
    }

    fn enqueue<F>(&self, submission_id: &str, job: F) -> StagerResult<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.inner.queue.push(job).inspect_err(|_| {
            self.inner
                .progress
                .set_state(submission_id, ProgressState::Done);
        })
    }

    pub fn get_progress(&self, submission_id: &str) -> SubmissionProgress {
        if let Some(state) = self.inner.progress.get_state(submission_id) {
            return SubmissionProgress::Running(state);
        }
        match self.inner.outcomes().get(submission_id) {
            Some(outcome) => SubmissionProgress::Finished(outcome.clone()),
            None => SubmissionProgress::Unknown,
        }
    }

    /// Wait for a submission to reach its terminal state.
    pub async fn wait_for(&self, submission_id: &str) -> StagerResult<HandoffOutcome> {
        let mut finished = self.inner.finished.subscribe();
        loop {
            match self.get_progress(submission_id) {
                SubmissionProgress::Finished(outcome) => return Ok(outcome),
                SubmissionProgress::Unknown => {
                    return Err(StagerError::InvalidState(format!(
                        "Unknown submission {}",
                        submission_id
                    )))
                }
                SubmissionProgress::Running(_) => {}
            }
            finished.changed().await.map_err(|_| {
                StagerError::InvalidState("handoff manager stopped".to_string())
            })?;
        }
    }

    /// Stop accepting work and wait for admitted work to finish.
    pub async fn maintenance_mode(&self) -> StagerResult<()> {
        let drained = {
            let _admission = self.inner.admission();
            match self.state() {
                ServiceState::Up => {}
                ServiceState::MaintenanceMode => return Ok(()),
                ServiceState::Teardown => {
                    return Err(StagerError::InvalidState(
                        "Maintenance mode is already being entered".to_string(),
                    ))
                }
            }
            self.inner.state.send_replace(ServiceState::Teardown);
            tracing::info!("tearing down, waiting for admitted submissions");
            self.inner.progress.on_all_done()
        };
        drained.await;

        self.inner.state.send_replace(ServiceState::MaintenanceMode);
        tracing::info!("in maintenance mode");
        Ok(())
    }

    /// Accept work again. Waits for a teardown in progress to finish first.
    pub async fn resume_service(&self) -> StagerResult<()> {
        let mut rx = self.inner.state.subscribe();
        loop {
            let current = *rx.borrow_and_update();
            match current {
                ServiceState::Up => {
                    return Err(StagerError::InvalidState(
                        "Service is already up".to_string(),
                    ))
                }
                ServiceState::MaintenanceMode => {
                    let _admission = self.inner.admission();
                    if self.state() != ServiceState::MaintenanceMode {
                        continue;
                    }
                    self.inner.state.send_replace(ServiceState::Up);
                    tracing::info!("service resumed");
                    return Ok(());
                }
                ServiceState::Teardown => {
                    rx.changed().await.map_err(|_| {
                        StagerError::InvalidState("handoff manager stopped".to_string())
                    })?;
                }
            }
        }
    }
}

impl Inner {
    fn admission(&self) -> MutexGuard<'_, ()> {
        self.admission.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn outcomes(&self) -> MutexGuard<'_, Outcomes> {
        self.outcomes.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `submission_id` as loading if the service accepts work.
    fn admit(&self, submission_id: &str) -> StagerResult<()> {
        let _admission = self.admission();
        let state = *self.state.borrow();
        if state != ServiceState::Up {
            return Err(StagerError::ServiceUnavailable(format!(
                "Not accepting submissions while in {}",
                state
            )));
        }
        if self.progress.get_state(submission_id).is_some() {
            return Err(StagerError::InvalidState(format!(
                "Submission {} is already in progress",
                submission_id
            )));
        }
        self.outcomes().remove(submission_id);
        self.progress
            .set_state(submission_id, ProgressState::Loading);
        Ok(())
    }

    async fn run_upload(self: Arc<Self>, submission: Submission) {
        let log = SubmissionLog::new(submission.submission_id.clone());
        log.info("Handoff started");
        let result = self.handoff(&submission, &log).await;
        let outcome = HandoffOutcome {
            submission_id: submission.submission_id.clone(),
            operation: Operation::Upload,
            entries: result.iter().cloned().collect(),
            error: result.err().map(|e| e.to_string()),
            log: Vec::new(),
        };
        self.finish(outcome, &submission.email, &log).await;
    }

    async fn run_remove(
        self: Arc<Self>,
        submission_id: String,
        id: String,
        version: VersionSelector,
        email: String,
    ) {
        let log = SubmissionLog::new(submission_id.clone());
        log.info(format!("Removing {} version {}", id, version));
        let result = {
            let (inner, log) = (self.clone(), log.clone());
            guarded(async move {
                inner
                    .submissions
                    .remove_submission(&id, &version, &log)
                    .await
            })
            .await
        };
        let outcome = HandoffOutcome {
            submission_id,
            operation: Operation::Remove,
            entries: result.as_ref().cloned().unwrap_or_default(),
            error: result.err().map(|e| e.to_string()),
            log: Vec::new(),
        };
        self.finish(outcome, &email, &log).await;
    }

    /// Every step runs on its own task, so a panicking collaborator fails
    /// the step instead of the whole job and cleanup still happens.
    async fn handoff(
        self: &Arc<Self>,
        submission: &Submission,
        log: &SubmissionLog,
    ) -> StagerResult<LedgerEntry> {
        let content = {
            let (inner, submission, log) = (self.clone(), submission.clone(), log.clone());
            guarded(async move { inner.submissions.get_submission(&submission, &log).await })
                .await?
        };

        let result = {
            let (inner, content, submission, log) =
                (self.clone(), content.clone(), submission.clone(), log.clone());
            guarded(async move { inner.stage_load_save(&content, &submission, &log).await })
                .await
        };
        if let Err(e) = &result {
            log.error(format!("Handoff failed ({:?}): {}", e.category(), e));
        }

        let cleanup = {
            let (inner, cleanup_content, log) = (self.clone(), content.clone(), log.clone());
            let submission_id = submission.submission_id.clone();
            let failed = result.is_err();
            guarded(async move {
                let args = CleanupArgs {
                    content: &cleanup_content,
                    submission_id: &submission_id,
                    failed,
                };
                inner.submissions.cleanup_submission(args, &log).await
            })
            .await
        };
        if let Err(e) = cleanup {
            log.error(format!("Cleanup failed: {}", e));
            remove_quietly(&content.download_folder).await;
            remove_quietly(&content.extract_folder).await;
        }
        result
    }

    async fn stage_load_save(
        &self,
        content: &SubmissionContent,
        submission: &Submission,
        log: &SubmissionLog,
    ) -> StagerResult<LedgerEntry> {
        let staged = self
            .submissions
            .stage_submission(content, submission, log)
            .await?;
        self.submissions.load_submission(log).await?;
        self.submissions.save_submission(staged, log).await
    }

    /// Record the outcome, notify, then mark the task done.
    async fn finish(&self, mut outcome: HandoffOutcome, email: &str, log: &SubmissionLog) {
        let verdict = if outcome.succeeded() {
            log.info("Handoff succeeded");
            "succeeded"
        } else {
            "failed"
        };
        outcome.log = log.lines();

        let subject = match outcome.entries.first() {
            Some(entry) => format!("Handoff of {}@{} {}", entry.id, entry.version, verdict),
            None => format!("Handoff {} {}", outcome.submission_id, verdict),
        };
        let notification = Notification {
            sender: self.notification_sender.clone(),
            receiver: email.to_string(),
            subject,
            payload: outcome
                .error
                .clone()
                .unwrap_or_else(|| "Your submission is live.".to_string()),
            attachments: vec![Attachment {
                filename: format!("{}.log", outcome.submission_id),
                content: log.render(),
            }],
        };
        let notifier = self.services.notifier.clone();
        let sent = guarded(async move { notifier.send(notification).await }).await;
        if let Err(e) = sent {
            tracing::warn!(submission_id = %outcome.submission_id, error = %e, "notification failed");
        }

        let submission_id = outcome.submission_id.clone();
        self.outcomes().insert(outcome);
        self.progress.set_state(&submission_id, ProgressState::Done);
        self.finished.send_modify(|n| *n = n.wrapping_add(1));
    }
}

/// Run `job` on its own task, turning a panic into an error.
async fn guarded<F, T>(job: F) -> StagerResult<T>
where
    F: Future<Output = StagerResult<T>> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(job).await {
        Ok(result) => result,
        Err(e) => Err(StagerError::InvalidState(format!("task failed: {}", e))),
    }
}
