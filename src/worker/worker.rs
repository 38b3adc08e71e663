use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Weak,
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{bounded, select, Receiver, Sender, TryRecvError};
use log::{debug, warn};

use crate::error::TaskError;
use crate::models::task::TaskId;

/// Receives the simulator's callbacks. Implemented by the registry.
pub trait ProgressSink: Send + Sync + 'static {
    fn report_progress(&self, id: TaskId, percent: u8);
    fn report_completed(&self, id: TaskId);
    fn report_failed(&self, id: TaskId, error: &TaskError);
}

/// The work performed at each step. The simulator owns the timing; a
/// workload only decides whether a step succeeded. Cancellation is only
/// observed between steps, so a step should return in bounded time.
pub trait Workload: Send + 'static {
    fn step(&mut self, step: u32, total_steps: u32) -> Result<(), TaskError>;
}

impl<F> Workload for F
where
    F: FnMut(u32, u32) -> Result<(), TaskError> + Send + 'static,
{
    fn step(&mut self, step: u32, total_steps: u32) -> Result<(), TaskError> {
        self(step, total_steps)
    }
}

/// Pure timer: every step succeeds without doing anything.
pub struct Idle;

impl Workload for Idle {
    fn step(&mut self, _step: u32, _total_steps: u32) -> Result<(), TaskError> {
        Ok(())
    }
}

/// Stops a running simulator. Dropping the handle stops it as well, since
/// the simulator treats a disconnected stop channel as a stop request.
pub struct CancelHandle {
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

impl CancelHandle {
    pub fn cancel(self) -> JoinHandle<()> {
        let _ = self.stop.try_send(());
        self.thread
    }
}

pub fn total_steps(duration_secs: u32) -> u32 {
    duration_secs.saturating_mul(2)
}

/// `round(100 * step / total)`, capped at 100.
pub fn progress_for_step(step: u32, total_steps: u32) -> u8 {
    if total_steps == 0 {
        return 100;
    }
    let step = u64::from(step.min(total_steps));
    let total = u64::from(total_steps);
    ((200 * step + total) / (2 * total)) as u8
}

pub fn spawn_simulator<S, W>(
    id: TaskId,
    duration_secs: u32,
    step_interval: Duration,
    sink: Weak<S>,
    workload: W,
) -> Result<CancelHandle, TaskError>
where
    S: ProgressSink,
    W: Workload,
{
    let (stop_tx, stop_rx) = bounded(1);
    let steps = total_steps(duration_secs);
    let thread = thread::Builder::new()
        .name(format!("task-{}", id))
        .spawn(move || run_steps(id, steps, step_interval, stop_rx, sink, workload))?;

    Ok(CancelHandle {
        stop: stop_tx,
        thread,
    })
}

fn run_steps<S, W>(
    id: TaskId,
    steps: u32,
    step_interval: Duration,
    stop: Receiver<()>,
    sink: Weak<S>,
    mut workload: W,
) where
    S: ProgressSink,
    W: Workload,
{
    for step in 1..=steps {
        select! {
            recv(stop) -> _ => {
                debug!("Task '{}' stopped before step {}/{}.", id, step, steps);
                return;
            }
            default(step_interval) => {}
        }

        let result = match panic::catch_unwind(AssertUnwindSafe(|| workload.step(step, steps))) {
            Ok(result) => result,
            Err(payload) => Err(TaskError::Panicked(panic_message(payload.as_ref()))),
        };

        if stop_requested(&stop) {
            debug!("Task '{}' stopped after step {}/{}.", id, step, steps);
            return;
        }
        let Some(sink) = sink.upgrade() else {
            return;
        };
        match result {
            Ok(()) => sink.report_progress(id, progress_for_step(step, steps)),
            Err(e) => {
                warn!("Task '{}' failed at step {}/{}: {}", id, step, steps, e);
                sink.report_failed(id, &e);
                return;
            }
        }
    }

    if let Some(sink) = sink.upgrade() {
        sink.report_completed(id);
    }
}

fn stop_requested(stop: &Receiver<()>) -> bool {
    !matches!(stop.try_recv(), Err(TryRecvError::Empty))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
