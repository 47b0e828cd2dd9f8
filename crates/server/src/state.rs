use std::sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
};
use wayfarer::worker::{DataManager, Worker, WorkerConfig};

/// Shared server state: the process-wide data manager plus a fixed pool of
/// workers, each handling one request at a time.
pub struct AppState {
    pub data_manager: std::sync::Arc<DataManager>,
    workers: Vec<Mutex<Worker>>,
    next: AtomicUsize,
}

impl AppState {
    pub fn new(data_manager: std::sync::Arc<DataManager>, nb_workers: usize) -> Self {
        let config = WorkerConfig {
            nb_threads: nb_workers,
            ..Default::default()
        };
        let workers = (0..nb_workers.max(1))
            .map(|_| Mutex::new(Worker::new(data_manager.clone(), config.clone())))
            .collect();
        Self {
            data_manager,
            workers,
            next: AtomicUsize::new(0),
        }
    }

    /// Round-robin pick of an idle worker.
    pub fn with_worker<T>(&self, f: impl FnOnce(&mut Worker) -> T) -> T {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        let mut worker = self.workers[index].lock().unwrap();
        f(&mut worker)
    }
}
