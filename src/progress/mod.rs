//! Progress of queued submissions, with barrier waits.
//!
//! A task is either present with some state or absent. Setting a task to
//! [`ProgressState::Done`] removes it, so finished tasks are simply gone.
//! Both barrier waits snapshot the tasks they care about when called, so
//! tasks registered afterwards never hold them up.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressState {
    Loading,
    Done,
    Custom(String),
}

impl fmt::Display for ProgressState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressState::Loading => f.write_str("loading"),
            ProgressState::Done => f.write_str("done"),
            ProgressState::Custom(state) => f.write_str(state),
        }
    }
}

#[derive(Debug, Clone)]
struct TaskEntry {
    state: ProgressState,
    /// Changes each time the id is registered anew after being done
    generation: u64,
    /// Changes each time the task enters `Loading`
    loading_since: u64,
}

#[derive(Debug, Default)]
struct Tasks {
    entries: HashMap<String, TaskEntry>,
    seq: u64,
}

/// Snapshot entry: task id, generation and loading mark at call time.
type Watched = (String, u64, u64);

pub struct ProgressManager {
    tasks: Mutex<Tasks>,
    changes: watch::Sender<u64>,
}

impl Default for ProgressManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressManager {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            tasks: Mutex::new(Tasks::default()),
            changes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Tasks> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_state(&self, task_id: &str, state: ProgressState) {
        {
            let mut tasks = self.lock();
            tasks.seq += 1;
            let seq = tasks.seq;
            match state {
                ProgressState::Done => {
                    tasks.entries.remove(task_id);
                }
                state => {
                    let entering_loading = state == ProgressState::Loading;
                    let entry = tasks
                        .entries
                        .entry(task_id.to_string())
                        .or_insert_with(|| TaskEntry {
                            state: ProgressState::Done,
                            generation: seq,
                            loading_since: 0,
                        });
                    if entering_loading && entry.state != ProgressState::Loading {
                        entry.loading_since = seq;
                    }
                    entry.state = state;
                }
            }
        }
        tracing::trace!(task_id = %task_id, "progress changed");
        self.changes.send_modify(|n| *n = n.wrapping_add(1));
    }

    /// Current state of a task. Finished tasks report `None`.
    pub fn get_state(&self, task_id: &str) -> Option<ProgressState> {
        self.lock().entries.get(task_id).map(|t| t.state.clone())
    }

    /// Every tracked task, sorted by id.
    pub fn tasks(&self) -> Vec<(String, ProgressState)> {
        let mut tasks: Vec<_> = self
            .lock()
            .entries
            .iter()
            .map(|(id, t)| (id.clone(), t.state.clone()))
            .collect();
        tasks.sort_by(|a, b| a.0.cmp(&b.0));
        tasks
    }

    /// Resolves once every task that is `Loading` right now has left that state.
    pub fn on_all_done_loading(&self) -> impl Future<Output = ()> + '_ {
        let rx = self.changes.subscribe();
        let watched = self.snapshot(|t| t.state == ProgressState::Loading);
        self.wait_until(rx, watched, |entry, generation, since| {
            entry.generation != generation
                || entry.state != ProgressState::Loading
                || entry.loading_since != since
        })
    }

    /// Resolves once every task tracked right now is done.
    pub fn on_all_done(&self) -> impl Future<Output = ()> + '_ {
        let rx = self.changes.subscribe();
        let watched = self.snapshot(|_| true);
        self.wait_until(rx, watched, |entry, generation, _| {
            entry.generation != generation
        })
    }

    fn snapshot(&self, filter: impl Fn(&TaskEntry) -> bool) -> Vec<Watched> {
        self.lock()
            .entries
            .iter()
            .filter(|(_, t)| filter(t))
            .map(|(id, t)| (id.clone(), t.generation, t.loading_since))
            .collect()
    }

    /// Wait until `settled` holds for every watched task still present.
    fn wait_until<P>(
        &self,
        mut rx: watch::Receiver<u64>,
        watched: Vec<Watched>,
        settled: P,
    ) -> impl Future<Output = ()> + '_
    where
        P: Fn(&TaskEntry, u64, u64) -> bool + Send + 'static,
    {
        async move {
            loop {
                let done = {
                    let tasks = self.lock();
                    watched.iter().all(|(id, generation, since)| {
                        tasks
                            .entries
                            .get(id)
                            .map_or(true, |entry| settled(entry, *generation, *since))
                    })
                };
                if done {
                    return;
                }
                if rx.changed().await.is_err() {
                    return;
                }
            }
        }
    }
}
