use parking_lot::RwLock;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkerState {
    Idle,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerStatus {
    pub worker_index: usize,
    pub current_job_id: Option<String>,
    pub state: WorkerState,
}

impl WorkerStatus {
    fn idle(worker_index: usize) -> Self {
        Self {
            worker_index,
            current_job_id: None,
            state: WorkerState::Idle,
        }
    }
}

/// One status slot per worker.
///
/// Each slot has a single writer, the worker with that index; the progress
/// observer only reads. Slots are locked independently so a reader never
/// holds up more than one worker.
#[derive(Debug)]
pub struct WorkerStatusTable {
    slots: Box<[RwLock<WorkerStatus>]>,
}

impl WorkerStatusTable {
    pub fn new(workers: usize) -> Self {
        Self {
            slots: (0..workers)
                .map(|index| RwLock::new(WorkerStatus::idle(index)))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn update(&self, worker_index: usize, state: WorkerState, job_id: Option<String>) {
        if let Some(slot) = self.slots.get(worker_index) {
            let mut status = slot.write();
            status.state = state;
            status.current_job_id = job_id;
        }
    }

    pub fn snapshot(&self) -> Vec<WorkerStatus> {
        self.slots.iter().map(|slot| slot.read().clone()).collect()
    }
}
