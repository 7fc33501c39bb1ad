//! Background workers that decide when a file rotates.
//!
//! Each worker is a named thread parked on a shutdown channel with a timeout;
//! the timeout is the worker's period. Dropping the sending side wakes every
//! worker immediately, so stopping never waits out a sleep.

use std::fs;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::debug;

use crate::{Handle, Result, RotationPolicy};

/// Keeps a handle's rotation workers alive. Stops and joins them on drop.
#[derive(Debug)]
pub struct RotationGuard {
    shutdown: Option<Sender<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl RotationGuard {
    /// Spawn the workers `policy` asks for:
    ///
    /// - size: at start and then every `poll_interval`, rotate if the live
    ///   file is larger than `size_threshold`;
    /// - age: every `age_threshold`, rotate unconditionally;
    /// - retention: every `scan_interval`, scan without rotating.
    pub(crate) fn start(handle: Arc<Handle>, policy: RotationPolicy) -> Result<Self> {
        let policy = Arc::new(policy);
        let (shutdown, stopped) = crossbeam_channel::bounded(0);
        let mut guard = RotationGuard {
            shutdown: Some(shutdown),
            workers: Vec::new(),
        };

        if let Some(threshold) = policy.size_threshold {
            let (handle, policy) = (Arc::clone(&handle), Arc::clone(&policy));
            guard.spawn("size", policy.poll_interval, true, &stopped, move || {
                match fs::metadata(handle.path()) {
                    Ok(metadata) if metadata.len() > threshold => {
                        handle.rotate_and_scan(&policy);
                    }
                    Ok(_) => {}
                    // Mid-rotation or not written yet.
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                    Err(err) => handle.reporter().in_scope(|| {
                        debug!(path = %handle.path().display(), error = %err, "skipping size check")
                    }),
                }
            })?;
        }

        if let Some(every) = policy.age_threshold {
            let (handle, policy) = (Arc::clone(&handle), Arc::clone(&policy));
            guard.spawn("age", every, false, &stopped, move || {
                handle.rotate_and_scan(&policy);
            })?;
        }

        if let Some(every) = policy.scan_interval {
            let (handle, policy) = (Arc::clone(&handle), Arc::clone(&policy));
            guard.spawn("retention", every, false, &stopped, move || {
                handle.scan(&policy);
            })?;
        }

        Ok(guard)
    }

    /// Run `fire` every `every` until stopped; `fire_first` also runs it
    /// once before the first wait.
    fn spawn(
        &mut self,
        kind: &str,
        every: Duration,
        fire_first: bool,
        stopped: &Receiver<()>,
        mut fire: impl FnMut() + Send + 'static,
    ) -> Result<()> {
        let stopped = stopped.clone();
        let worker = thread::Builder::new()
            .name(format!("rotatelog-{}", kind))
            .spawn(move || {
                if fire_first {
                    fire();
                }
                while let Err(RecvTimeoutError::Timeout) = stopped.recv_timeout(every) {
                    fire();
                }
            })?;
        self.workers.push(worker);
        Ok(())
    }

    /// Number of running workers.
    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Stop every worker, waiting for an in-flight rotation to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        drop(self.shutdown.take());
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for RotationGuard {
    fn drop(&mut self) {
        self.shutdown();
    }
}
