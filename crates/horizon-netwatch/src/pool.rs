//! Worker pool for notification dispatch.
//!
//! Native change callbacks arrive on OS or driver threads that must not be
//! blocked by subscriber code. The system sources hand every trigger to this
//! pool, so firings, re-arms, and fan-out all run on dispatch workers.

use std::sync::OnceLock;

use crate::error::{Result, WatchError};

static GLOBAL_POOL: OnceLock<DispatchPool> = OnceLock::new();

/// Configuration for a [`DispatchPool`].
#[derive(Debug, Clone)]
pub struct DispatchPoolConfig {
    /// Worker count. `None` lets rayon pick based on available parallelism.
    pub num_threads: Option<usize>,
    /// Prefix for worker thread names.
    pub thread_name_prefix: String,
    /// Stack size per worker in bytes. `None` uses the platform default.
    pub stack_size: Option<usize>,
}

impl Default for DispatchPoolConfig {
    fn default() -> Self {
        Self {
            num_threads: None,
            thread_name_prefix: "netwatch-dispatch".to_string(),
            stack_size: None,
        }
    }
}

impl DispatchPoolConfig {
    /// Config with an explicit worker count.
    pub fn with_threads(num_threads: usize) -> Self {
        Self {
            num_threads: Some(num_threads),
            ..Default::default()
        }
    }
}

/// A rayon-backed pool dedicated to notification dispatch.
pub struct DispatchPool {
    pool: rayon::ThreadPool,
}

impl DispatchPool {
    /// Creates a pool with the given configuration.
    pub fn new(config: DispatchPoolConfig) -> Result<Self> {
        let prefix = config.thread_name_prefix.clone();
        let mut builder = rayon::ThreadPoolBuilder::new()
            .thread_name(move |index| format!("{prefix}-{index}"));

        if let Some(num_threads) = config.num_threads {
            builder = builder.num_threads(num_threads);
        }
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let pool = builder
            .build()
            .map_err(|e| WatchError::Dispatch(e.to_string()))?;

        tracing::debug!(
            target: "horizon_netwatch::pool",
            num_threads = pool.current_num_threads(),
            "dispatch pool created"
        );

        Ok(Self { pool })
    }

    /// The process-wide dispatch pool, created on first use.
    pub fn global() -> &'static DispatchPool {
        GLOBAL_POOL.get_or_init(|| {
            DispatchPool::new(DispatchPoolConfig::default())
                .expect("failed to create global dispatch pool")
        })
    }

    /// Installs a custom global pool.
    ///
    /// Fails if the global pool was already created, either explicitly or by
    /// a first use of [`global`](Self::global).
    pub fn init_global(config: DispatchPoolConfig) -> Result<&'static DispatchPool> {
        let pool = DispatchPool::new(config)?;
        GLOBAL_POOL.set(pool).map_err(|_| {
            WatchError::Dispatch("global dispatch pool already initialized".to_string())
        })?;
        Ok(GLOBAL_POOL.get().expect("pool was just set"))
    }

    /// Runs `task` on a worker thread. Never blocks the caller.
    pub fn spawn<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.spawn(task);
    }

    /// Number of worker threads in this pool.
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl std::fmt::Debug for DispatchPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchPool")
            .field("num_threads", &self.num_threads())
            .finish()
    }
}
