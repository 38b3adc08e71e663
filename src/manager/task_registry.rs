use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crossbeam_channel::Receiver;
use log::{debug, error, info, warn};

use super::notification::NotificationSlot;
use super::watch::Watch;
use crate::config::TrackerConfig;
use crate::error::TaskError;
use crate::models::message::TaskMessage;
use crate::models::task::{TaskId, TaskRecord, TaskStatus};
use crate::worker::worker::{spawn_simulator, CancelHandle, Idle, ProgressSink, Workload};

pub type TaskList = Arc<Vec<TaskRecord>>;

/// Owns every task record of the session and the cancellation handles of
/// the ones still running. All transitions go through here.
pub struct TaskRegistry {
    shared: Arc<Shared>,
}

struct Shared {
    config: TrackerConfig,
    state: Mutex<RegistryState>,
    tasks: Watch<TaskList>,
    notification: NotificationSlot,
}

struct RegistryState {
    next_id: TaskId,
    records: TaskList,
    handles: HashMap<TaskId, CancelHandle>,
    closed: bool,
}

impl TaskRegistry {
    pub fn new(config: TrackerConfig) -> Self {
        TaskRegistry {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(RegistryState {
                    next_id: 1,
                    records: Arc::new(Vec::new()),
                    handles: HashMap::new(),
                    closed: false,
                }),
                tasks: Watch::new(Arc::new(Vec::new())),
                notification: NotificationSlot::new(),
            }),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.shared.config
    }

    /// Starts a simulated task. Returns `None` when the task could not be
    /// created; the reason is published as a notification.
    pub fn start(&self, name: &str, duration_secs: u32) -> Option<TaskId> {
        self.start_with(name, duration_secs, Idle)
    }

    pub fn start_with<W: Workload>(
        &self,
        name: &str,
        duration_secs: u32,
        workload: W,
    ) -> Option<TaskId> {
        match self.shared.register(name, duration_secs, workload) {
            Ok(id) => Some(id),
            Err(e) => {
                error!("Failed to start task '{}': {}", name, e);
                self.shared
                    .notification
                    .publish(&TaskMessage::StartError(e.to_string()));
                None
            }
        }
    }

    /// Cancels a running task. Unknown or finished ids are ignored.
    pub fn cancel(&self, id: TaskId) {
        let handle = {
            let mut state = self.shared.lock();
            let Some(handle) = state.handles.remove(&id) else {
                debug!("Cancel ignored for task '{}': not running.", id);
                return;
            };
            self.shared
                .apply_terminal(&mut state, id, TaskStatus::Cancelled, None);
            handle
        };
        // Not joined: the simulator exits at its next step boundary.
        drop(handle.cancel());
        info!("Task '{}' cancelled.", id);
    }

    pub fn report_progress(&self, id: TaskId, percent: u8) -> bool {
        self.shared.apply_progress(id, percent)
    }

    /// Progress follows the status: 100 for Completed, 0 for Failed and
    /// Cancelled.
    pub fn report_terminal(&self, id: TaskId, status: TaskStatus) -> bool {
        self.shared.finish(id, status, None)
    }

    pub fn tasks(&self) -> TaskList {
        Arc::clone(&self.shared.lock().records)
    }

    pub fn task(&self, id: TaskId) -> Option<TaskRecord> {
        self.shared
            .lock()
            .records
            .iter()
            .find(|record| record.id == id)
            .cloned()
    }

    pub fn active_count(&self) -> usize {
        self.shared.lock().handles.len()
    }

    pub fn observe_tasks(&self) -> Receiver<TaskList> {
        self.shared.tasks.subscribe()
    }

    pub fn observe_notification(&self) -> Receiver<Option<String>> {
        self.shared.notification.subscribe()
    }

    pub fn pending_notification(&self) -> Option<String> {
        self.shared.notification.peek()
    }

    pub fn acknowledge_notification(&self) -> Option<String> {
        self.shared.notification.consume()
    }

    /// Stops every outstanding simulator and discards its handle. Records
    /// are left as they are, so tasks that were running stay `Running`.
    /// Later calls to `start` are refused.
    ///
    /// Simulator threads are signalled, not joined: one blocked inside a
    /// workload step exits when that step returns.
    pub fn shutdown(&self) {
        let handles: Vec<(TaskId, CancelHandle)> = {
            let mut state = self.shared.lock();
            state.closed = true;
            state.handles.drain().collect()
        };
        if handles.is_empty() {
            return;
        }
        info!("Shutting down {} running task(s).", handles.len());
        for (id, handle) in handles {
            drop(handle.cancel());
            debug!("Stop signalled to task '{}'.", id);
        }
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl Drop for TaskRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register<W: Workload>(
        self: &Arc<Self>,
        name: &str,
        duration_secs: u32,
        workload: W,
    ) -> Result<TaskId, TaskError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TaskError::BlankName);
        }
        let duration_secs = if duration_secs == 0 {
            self.config.default_duration_secs
        } else {
            duration_secs
        };

        // Spawning under the lock keeps the simulator's first report from
        // overtaking the record it refers to.
        let mut state = self.lock();
        if state.closed {
            return Err(TaskError::ShutDown);
        }
        let id = state.next_id;
        let handle = spawn_simulator(
            id,
            duration_secs,
            self.config.step_interval,
            Arc::downgrade(self),
            workload,
        )?;

        state.next_id += 1;
        Arc::make_mut(&mut state.records).push(TaskRecord::new(id, name.to_string(), duration_secs));
        state.handles.insert(id, handle);
        self.tasks.set(Arc::clone(&state.records));
        self.notification
            .publish(&TaskMessage::Started(name.to_string()));
        info!("Task '{}' ({}) started for {}s.", id, name, duration_secs);
        Ok(id)
    }

    fn apply_progress(&self, id: TaskId, percent: u8) -> bool {
        let mut state = self.lock();
        let Some(index) = state.records.iter().position(|record| record.id == id) else {
            return false;
        };
        let current = &state.records[index];
        let percent = percent.min(100);
        if !current.is_running() || percent < current.progress {
            return false;
        }
        if percent == current.progress {
            return true;
        }
        let updated = current.with_progress(percent);
        Arc::make_mut(&mut state.records)[index] = updated;
        self.tasks.set(Arc::clone(&state.records));
        debug!("Task '{}' progress: {}%", id, percent);
        true
    }

    fn finish(&self, id: TaskId, status: TaskStatus, reason: Option<String>) -> bool {
        if !status.is_terminal() {
            warn!("Ignoring non-terminal status {} reported for task '{}'.", status, id);
            return false;
        }
        let mut state = self.lock();
        let applied = self.apply_terminal(&mut state, id, status, reason);
        if applied {
            state.handles.remove(&id);
        }
        applied
    }

    /// Moves a running record to `status`. Returns false, changing nothing,
    /// when the record is unknown or already terminal.
    fn apply_terminal(
        &self,
        state: &mut RegistryState,
        id: TaskId,
        status: TaskStatus,
        reason: Option<String>,
    ) -> bool {
        let Some(index) = state.records.iter().position(|record| record.id == id) else {
            return false;
        };
        let current = &state.records[index];
        if !current.is_running() {
            debug!(
                "Task '{}' already {}; ignoring transition to {}.",
                id, current.status, status
            );
            return false;
        }

        let progress = if status == TaskStatus::Completed { 100 } else { 0 };
        let name = current.name.clone();
        let updated = current.with_status(status, progress);
        Arc::make_mut(&mut state.records)[index] = updated;
        self.tasks.set(Arc::clone(&state.records));

        let message = match status {
            TaskStatus::Completed => TaskMessage::Completed(name),
            TaskStatus::Failed => TaskMessage::Failed { name, reason },
            _ => TaskMessage::Cancelled(name),
        };
        self.notification.publish(&message);
        info!("Task '{}' status updated: {}", id, status);
        true
    }
}

impl ProgressSink for Shared {
    fn report_progress(&self, id: TaskId, percent: u8) {
        self.apply_progress(id, percent);
    }

    fn report_completed(&self, id: TaskId) {
        self.finish(id, TaskStatus::Completed, None);
    }

    fn report_failed(&self, id: TaskId, error: &TaskError) {
        self.finish(id, TaskStatus::Failed, Some(error.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{bounded, Sender};
    use std::{thread, time::Duration};

    const WAIT: Duration = Duration::from_secs(5);

    fn fast_registry() -> TaskRegistry {
        TaskRegistry::new(TrackerConfig::default().with_step_interval(Duration::from_millis(2)))
    }

    fn idle_registry() -> TaskRegistry {
        TaskRegistry::new(TrackerConfig::default().with_step_interval(Duration::from_secs(60)))
    }

    fn gate() -> (Sender<()>, impl Workload) {
        let (tx, rx) = bounded::<()>(0);
        let workload = move |step: u32, _total: u32| {
            rx.recv().map_err(|_| TaskError::Step {
                step,
                reason: "gate closed".to_string(),
            })
        };
        (tx, workload)
    }

    fn wait_for<P>(updates: &Receiver<TaskList>, id: TaskId, predicate: P) -> TaskRecord
    where
        P: Fn(&TaskRecord) -> bool,
    {
        loop {
            let list = updates
                .recv_timeout(WAIT)
                .expect("timed out waiting for a task update");
            if let Some(record) = list.iter().find(|record| record.id == id) {
                if predicate(record) {
                    return record.clone();
                }
            }
        }
    }

    #[test]
    fn start_registers_running_records_with_increasing_ids() {
        let registry = idle_registry();
        let first = registry.start("Backup", 3).unwrap();
        let second = registry.start("Sync", 1).unwrap();

        assert!(second > first);
        let tasks = registry.tasks();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id, first);
        assert_eq!(tasks[1].name, "Sync");
        assert!(tasks.iter().all(|t| t.status == TaskStatus::Running && t.progress == 0));
        assert_eq!(registry.active_count(), 2);
        assert_eq!(
            registry.acknowledge_notification().as_deref(),
            Some("Task 'Sync' started successfully!")
        );
    }

    #[test]
    fn blank_name_is_rejected_without_registering() {
        let registry = idle_registry();
        assert_eq!(registry.start("   ", 3), None);
        assert!(registry.tasks().is_empty());
        assert_eq!(registry.active_count(), 0);
        assert_eq!(
            registry.acknowledge_notification().as_deref(),
            Some("Error starting task: task name must not be blank")
        );

        assert_eq!(registry.start("Backup", 3), Some(1));
    }

    #[test]
    fn zero_duration_uses_the_default() {
        let registry = idle_registry();
        let id = registry.start("Backup", 0).unwrap();
        assert_eq!(registry.task(id).unwrap().duration_secs, 5);
    }

    #[test]
    fn five_second_task_steps_by_ten_percent_then_completes() {
        let registry = fast_registry();
        let updates = registry.observe_tasks();
        let id = registry.start("Report", 5).unwrap();

        let mut seen = Vec::new();
        loop {
            let list = updates.recv_timeout(WAIT).unwrap();
            let Some(record) = list.iter().find(|r| r.id == id) else {
                continue;
            };
            seen.push((record.status, record.progress));
            if record.status.is_terminal() {
                break;
            }
        }

        let mut expected: Vec<(TaskStatus, u8)> =
            (0..=10).map(|n| (TaskStatus::Running, n * 10)).collect();
        expected.push((TaskStatus::Completed, 100));
        assert_eq!(seen, expected);
        assert_eq!(registry.active_count(), 0);
        assert_eq!(
            registry.pending_notification().as_deref(),
            Some("Task 'Report' completed successfully!")
        );
    }

    #[test]
    fn cancelling_a_running_task_freezes_it_at_zero() {
        let registry = fast_registry();
        let updates = registry.observe_tasks();
        let (permits, workload) = gate();
        let id = registry.start_with("Backup", 2, workload).unwrap();

        permits.send(()).unwrap();
        permits.send(()).unwrap();
        wait_for(&updates, id, |r| r.progress == 50);

        registry.cancel(id);
        let record = registry.task(id).unwrap();
        assert_eq!(record.status, TaskStatus::Cancelled);
        assert_eq!(record.progress, 0);
        assert_eq!(registry.active_count(), 0);
        assert_eq!(
            registry.acknowledge_notification().as_deref(),
            Some("Task 'Backup' cancelled successfully!")
        );

        drop(permits);
        thread::sleep(Duration::from_millis(50));
        assert!(!registry.report_progress(id, 75));
        assert_eq!(registry.task(id).unwrap(), record);
        assert_eq!(registry.pending_notification(), None);
    }

    #[test]
    fn cancelling_a_completed_task_is_a_no_op() {
        let registry = fast_registry();
        let updates = registry.observe_tasks();
        let id = registry.start("Sync", 1).unwrap();

        let done = wait_for(&updates, id, |r| r.status.is_terminal());
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.progress, 100);
        registry.acknowledge_notification();

        registry.cancel(id);
        assert_eq!(registry.task(id).unwrap(), done);
        assert_eq!(registry.pending_notification(), None);
    }

    #[test]
    fn cancelling_an_unknown_id_changes_nothing() {
        let registry = idle_registry();
        registry.start("Backup", 3).unwrap();
        registry.acknowledge_notification();
        let before = registry.tasks();

        registry.cancel(42);
        registry.cancel(42);

        assert_eq!(registry.tasks(), before);
        assert_eq!(registry.pending_notification(), None);
    }

    #[test]
    fn cancelling_one_task_leaves_the_other_running() {
        let registry = fast_registry();
        let updates = registry.observe_tasks();
        let (permits, workload) = gate();
        let gated = registry.start_with("Upload", 1, workload).unwrap();
        let free = registry.start("Index", 3).unwrap();

        registry.cancel(gated);
        drop(permits);

        let done = wait_for(&updates, free, |r| r.status.is_terminal());
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(registry.task(gated).unwrap().status, TaskStatus::Cancelled);
    }

    #[test]
    fn failing_workload_marks_the_task_failed() {
        let registry = fast_registry();
        let updates = registry.observe_tasks();
        let workload = |step: u32, _total: u32| {
            if step == 2 {
                Err(TaskError::Step {
                    step,
                    reason: "disk full".to_string(),
                })
            } else {
                Ok(())
            }
        };
        let id = registry.start_with("Upload", 2, workload).unwrap();

        let record = wait_for(&updates, id, |r| r.status.is_terminal());
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.progress, 0);
        assert_eq!(registry.active_count(), 0);
        assert_eq!(
            registry.pending_notification().as_deref(),
            Some("Task 'Upload' failed: step 2 failed: disk full")
        );

        registry.cancel(id);
        assert_eq!(registry.task(id).unwrap().status, TaskStatus::Failed);
    }

    #[test]
    fn progress_never_decreases_or_exceeds_hundred() {
        let registry = idle_registry();
        let id = registry.start("Backup", 3).unwrap();

        assert!(registry.report_progress(id, 40));
        assert!(!registry.report_progress(id, 30));
        assert_eq!(registry.task(id).unwrap().progress, 40);
        assert!(registry.report_progress(id, 250));
        assert_eq!(registry.task(id).unwrap().progress, 100);
        assert!(!registry.report_progress(99, 10));
    }

    #[test]
    fn terminal_status_is_never_left() {
        let registry = idle_registry();
        let id = registry.start("Backup", 3).unwrap();

        assert!(!registry.report_terminal(id, TaskStatus::Running));
        assert!(registry.report_terminal(id, TaskStatus::Completed));
        assert!(!registry.report_terminal(id, TaskStatus::Failed));
        assert!(!registry.report_progress(id, 10));

        let record = registry.task(id).unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.progress, 100);
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn shutdown_stops_simulators_and_keeps_records() {
        let registry = idle_registry();
        let first = registry.start("Backup", 3).unwrap();
        registry.start("Sync", 2).unwrap();

        registry.shutdown();
        assert_eq!(registry.active_count(), 0);
        assert!(registry.tasks().iter().all(|t| t.status == TaskStatus::Running));

        registry.cancel(first);
        assert_eq!(registry.task(first).unwrap().status, TaskStatus::Running);
    }

    #[test]
    fn start_is_refused_after_shutdown() {
        let registry = idle_registry();
        registry.start("Backup", 3).unwrap();
        registry.shutdown();
        registry.acknowledge_notification();
        let before = registry.tasks();

        assert_eq!(registry.start("Sync", 1), None);
        assert_eq!(registry.tasks(), before);
        assert_eq!(registry.active_count(), 0);
        assert_eq!(
            registry.acknowledge_notification().as_deref(),
            Some("Error starting task: task registry is shut down")
        );
    }

    #[test]
    fn shutdown_returns_while_a_step_is_blocked() {
        let registry = fast_registry();
        let (permits, workload) = gate();
        let id = registry.start_with("Upload", 2, workload).unwrap();
        thread::sleep(Duration::from_millis(20));

        registry.shutdown();
        assert_eq!(registry.active_count(), 0);

        drop(permits);
        thread::sleep(Duration::from_millis(50));
        let record = registry.task(id).unwrap();
        assert_eq!(record.status, TaskStatus::Running);
        assert_eq!(record.progress, 0);
    }

    #[test]
    fn dropping_the_registry_does_not_wait_for_blocked_steps() {
        let (permits, workload) = gate();
        let registry = fast_registry();
        registry.start_with("Upload", 2, workload).unwrap();
        thread::sleep(Duration::from_millis(20));

        drop(registry);
        drop(permits);
    }

    #[test]
    fn notification_observers_see_each_message() {
        let registry = idle_registry();
        let messages = registry.observe_notification();
        let id = registry.start("Backup", 3).unwrap();
        registry.cancel(id);
        registry.acknowledge_notification();

        let seen: Vec<Option<String>> = messages.try_iter().collect();
        assert_eq!(
            seen,
            vec![
                None,
                Some("Task 'Backup' started successfully!".to_string()),
                Some("Task 'Backup' cancelled successfully!".to_string()),
                None,
            ]
        );
    }
}
