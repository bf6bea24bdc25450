//! Worker pool for the load driver
//!
//! Uses native OS threads. Each worker performs blocking network calls, so the
//! number of workers is exactly the number of requests that can be in flight.

use std::io;
use std::thread;

use crate::{Error, Result};

pub mod gate;

pub use gate::StartGate;

/// Fixed-size pool of scoped worker threads
pub struct WorkerPool {
    num_workers: usize,
    name: String,
}

impl WorkerPool {
    /// Create a pool of `num_workers` threads named `<name>-<index>`
    pub fn new(num_workers: usize, name: impl Into<String>) -> Self {
        Self { num_workers: num_workers.max(1), name: name.into() }
    }

    /// Run `worker` on every thread and collect results in worker-index order
    ///
    /// All threads are released together once every worker has been spawned.
    /// Workers may borrow from the caller's stack; they are joined before this
    /// returns.
    pub fn run<T, F>(&self, worker: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(usize) -> T + Sync,
    {
        let gate = StartGate::new();

        thread::scope(|s| {
            let hold = gate.close();
            let mut handles = Vec::with_capacity(self.num_workers);
            let mut spawn_error: Option<io::Error> = None;

            for worker_id in 0..self.num_workers {
                let gate = &gate;
                let worker = &worker;
                let spawned = thread::Builder::new()
                    .name(format!("{}-{}", self.name, worker_id))
                    .spawn_scoped(s, move || gate.wait().then(|| worker(worker_id)));

                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        spawn_error = Some(e);
                        break;
                    }
                }
            }

            match spawn_error {
                Some(e) => {
                    hold.abort();
                    for handle in handles {
                        let _ = handle.join();
                    }
                    Err(Error::Io(e))
                }
                None => {
                    hold.open();
                    // Join everything before inspecting, so no panicked thread is left unjoined
                    let joined: Vec<_> = handles.into_iter().map(|h| h.join()).collect();
                    let mut results = Vec::with_capacity(self.num_workers);
                    for outcome in joined {
                        match outcome {
                            Ok(Some(result)) => results.push(result),
                            Ok(None) => {
                                return Err(Error::Other("worker aborted before start".into()))
                            }
                            Err(_) => return Err(Error::Other("worker thread panicked".into())),
                        }
                    }
                    Ok(results)
                }
            }
        })
    }

    /// Get number of worker threads
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }
}
