use anyhow::{Context, Result};
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::debug;

/// Background pool for blocking remote calls. Dropping it abandons any
/// outstanding work without waiting.
pub struct Workers {
    runtime: Option<Runtime>,
    handle: Handle,
}

impl Workers {
    pub fn start() -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(32)
            .thread_name("stratus-worker")
            .build()
            .context("start background workers")?;
        let handle = runtime.handle().clone();
        Ok(Self {
            runtime: Some(runtime),
            handle,
        })
    }

    pub fn spawner(&self) -> Spawner {
        Spawner {
            handle: self.handle.clone(),
        }
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        if let Some(rt) = self.runtime.take() {
            debug!("shutting down background workers");
            rt.shutdown_background();
        }
    }
}

/// Cheap, cloneable way to put a blocking job on the worker pool.
#[derive(Clone, Debug)]
pub struct Spawner {
    handle: Handle,
}

impl Spawner {
    pub fn spawn(&self, job: impl FnOnce() + Send + 'static) {
        drop(self.handle.spawn_blocking(job));
    }
}
