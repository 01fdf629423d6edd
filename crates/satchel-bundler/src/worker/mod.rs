//! Fixed-size pool of worker threads running asset lifecycles.
//!
//! Workers pull jobs from one shared queue and answer on a per-job oneshot
//! channel, so the coordinator can keep many paths in flight and await each
//! completion independently. Workers never touch the asset graph.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::asset::{self, AssetContext, AssetError, AssetRegistry, ProcessedAsset};
use crate::options::BundlerOptions;
use crate::resolver::PackageDescriptor;
use crate::runtime::Runtime;
use crate::{Error, Result};

/// Everything a worker needs to process one file.
#[derive(Debug, Clone)]
pub struct WorkerRequest {
    pub path: PathBuf,
    pub package: Option<Arc<PackageDescriptor>>,
    pub options: Arc<BundlerOptions>,
}

struct Job {
    request: WorkerRequest,
    reply: oneshot::Sender<std::result::Result<ProcessedAsset, AssetError>>,
}

/// Worker thread pool.
///
/// Dropping the pool closes the queue and joins every thread after its
/// current job.
pub struct WorkerPool {
    sender: Option<mpsc::Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
    completed: Arc<AtomicUsize>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size())
            .field("completed", &self.completed())
            .finish()
    }
}

impl WorkerPool {
    /// Start `size` workers (at least one), each with its own registry clone.
    pub fn new(size: usize, registry: AssetRegistry, runtime: Arc<dyn Runtime>) -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let queue = Arc::new(Mutex::new(receiver));
        let completed = Arc::new(AtomicUsize::new(0));

        let size = size.max(1);
        let mut handles = Vec::with_capacity(size);
        for index in 0..size {
            let queue = Arc::clone(&queue);
            let registry = registry.clone();
            let runtime = Arc::clone(&runtime);
            let completed = Arc::clone(&completed);

            let handle = std::thread::Builder::new()
                .name(format!("satchel-worker-{index}"))
                .spawn(move || worker_loop(&queue, &registry, runtime.as_ref(), &completed))
                .map_err(|e| Error::Worker(format!("failed to spawn worker thread: {e}")))?;
            handles.push(handle);
        }

        tracing::debug!("Started {} worker threads", size);

        Ok(Self {
            sender: Some(sender),
            handles,
            completed,
        })
    }

    /// Number of worker threads.
    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Number of lifecycles run so far, failed ones included.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    /// Run the lifecycle of one file on a worker.
    ///
    /// Asset failures, including panics inside an asset implementation, come
    /// back as [`Error::AssetProcessing`] tagged with the request path.
    pub async fn run(&self, request: WorkerRequest) -> Result<ProcessedAsset> {
        let path = request.path.clone();
        let (reply, response) = oneshot::channel();

        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| Error::Worker("worker pool is shut down".to_string()))?;
        sender
            .send(Job { request, reply })
            .map_err(|_| Error::Worker("worker pool is shut down".to_string()))?;

        match response.await {
            Ok(Ok(processed)) => Ok(processed),
            Ok(Err(err)) => Err(err.into()),
            Err(_) => Err(Error::Worker(format!(
                "worker exited while processing {}",
                path.display()
            ))),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.sender.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(
    queue: &Mutex<mpsc::Receiver<Job>>,
    registry: &AssetRegistry,
    runtime: &dyn Runtime,
    completed: &AtomicUsize,
) {
    loop {
        // The lock is held only while waiting for the next job
        let job = queue.lock().recv();
        let Ok(Job { request, reply }) = job else {
            break;
        };

        tracing::debug!("Processing {}", request.path.display());
        let result = catch_unwind(AssertUnwindSafe(|| {
            run_lifecycle(&request, registry, runtime)
        }))
        .unwrap_or_else(|panic| {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "asset processing panicked".to_string());
            Err(AssetError::new(&request.path, message))
        });

        completed.fetch_add(1, Ordering::Relaxed);
        // The coordinator may have stopped waiting; nothing to do then
        let _ = reply.send(result);
    }
}

/// Run one lifecycle synchronously on the calling thread.
pub fn run_lifecycle(
    request: &WorkerRequest,
    registry: &AssetRegistry,
    runtime: &dyn Runtime,
) -> std::result::Result<ProcessedAsset, AssetError> {
    let cx = AssetContext {
        path: &request.path,
        options: &request.options,
        package: request.package.as_deref(),
        runtime,
        registry,
    };
    let mut asset = registry.create(&request.path);
    asset::process(asset.as_mut(), &cx)
}
