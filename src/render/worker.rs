//! Threaded render backend
//!
//! A fixed pool of workers pulls jobs from one shared queue. Each worker
//! opens its own [`Rasterizer`] so engine handles never cross threads.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use flume::{Receiver, Sender};
use log::{debug, error, warn};

use super::request::{
    RenderBackend, RenderCompletion, RenderJob, RenderOutput, RenderTicket, WorkerRequest,
};
use super::shared::{SharedCacheHandle, SharedCacheKey};
use crate::error::RenderFault;
use crate::provider::{Rasterizer, RasterizerFactory};

type CancelSet = Arc<Mutex<HashSet<RenderTicket>>>;

/// [`RenderBackend`] backed by OS threads
pub struct WorkerPool {
    request_tx: Sender<WorkerRequest>,
    response_rx: Receiver<RenderCompletion>,
    cancelled: CancelSet,
    num_workers: usize,
    shut_down: bool,
}

impl WorkerPool {
    /// Spawn `num_workers` workers (at least one)
    #[must_use]
    pub fn spawn(
        factory: RasterizerFactory,
        num_workers: usize,
        shared: Option<SharedCacheHandle>,
    ) -> Self {
        // Workers fan out over a single request queue, which needs MPMC.
        let (request_tx, request_rx) = flume::unbounded();
        let (response_tx, response_rx) = flume::unbounded();
        let cancelled: CancelSet = Arc::new(Mutex::new(HashSet::new()));
        let num_workers = num_workers.max(1);

        for idx in 0..num_workers {
            let rx = request_rx.clone();
            let tx = response_tx.clone();
            let factory = Arc::clone(&factory);
            let cancelled = Arc::clone(&cancelled);
            let shared = shared.clone();

            let spawned = std::thread::Builder::new()
                .name(format!("folio-render-{idx}"))
                .spawn(move || {
                    render_worker(&factory, rx, tx, &cancelled, shared.as_ref());
                });
            if let Err(e) = spawned {
                error!("Failed to spawn render worker {idx}: {e}");
            }
        }

        debug!("Render pool started with {num_workers} workers");

        Self {
            request_tx,
            response_rx,
            cancelled,
            num_workers,
            shut_down: false,
        }
    }

    #[must_use]
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    fn cancelled(&self) -> std::sync::MutexGuard<'_, HashSet<RenderTicket>> {
        self.cancelled.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RenderBackend for WorkerPool {
    fn submit(&mut self, job: RenderJob) {
        if self.shut_down {
            warn!("Render job for page {} submitted after shutdown", job.ticket.page);
            return;
        }
        if self.request_tx.send(WorkerRequest::Render(job)).is_err() {
            warn!("Render workers are gone; job dropped");
        }
    }

    fn cancel(&mut self, ticket: RenderTicket) {
        self.cancelled().insert(ticket);
    }

    fn poll(&mut self) -> Vec<RenderCompletion> {
        let completions: Vec<_> = self.response_rx.try_iter().collect();
        if !completions.is_empty() {
            let mut cancelled = self.cancelled();
            for completion in &completions {
                cancelled.remove(&completion.ticket);
            }
        }
        completions
    }

    fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        for _ in 0..self.num_workers {
            let _ = self.request_tx.send(WorkerRequest::Shutdown);
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn render_worker(
    factory: &RasterizerFactory,
    requests: Receiver<WorkerRequest>,
    responses: Sender<RenderCompletion>,
    cancelled: &Mutex<HashSet<RenderTicket>>,
    shared: Option<&SharedCacheHandle>,
) {
    // A worker that cannot open the document still answers every job, so
    // the cache sees failures instead of waiting for the timeout.
    let mut rasterizer = factory();
    if let Err(fault) = &rasterizer {
        error!("Render worker could not open document: {fault}");
    }

    for request in requests {
        match request {
            WorkerRequest::Render(job) => {
                let result = handle_job(&mut rasterizer, &job, cancelled, shared);
                let completion = RenderCompletion {
                    ticket: job.ticket,
                    result,
                };
                if responses.send(completion).is_err() {
                    break;
                }
            }
            WorkerRequest::Shutdown => break,
        }
    }
}

fn take_cancelled(cancelled: &Mutex<HashSet<RenderTicket>>, ticket: RenderTicket) -> bool {
    cancelled
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&ticket)
}

fn handle_job(
    rasterizer: &mut Result<Box<dyn Rasterizer>, RenderFault>,
    job: &RenderJob,
    cancelled: &Mutex<HashSet<RenderTicket>>,
    shared: Option<&SharedCacheHandle>,
) -> Result<RenderOutput, RenderFault> {
    if take_cancelled(cancelled, job.ticket) {
        return Err(RenderFault::Cancelled);
    }

    let key = SharedCacheKey::from_job(job);
    if let Some(shared) = shared {
        let hit = shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key);
        if let Some(hit) = hit {
            return Ok(hit);
        }
    }

    let rasterizer = rasterizer.as_mut().map_err(|fault| fault.clone())?;
    let raster = rasterizer.rasterize(job.ticket.page, job.scale)?;
    let output = RenderOutput {
        bitmap: Arc::new(raster.bitmap),
        intrinsic: raster.intrinsic,
    };

    if let Some(shared) = shared {
        shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, output.clone());
    }

    if take_cancelled(cancelled, job.ticket) {
        return Err(RenderFault::Cancelled);
    }
    Ok(output)
}
