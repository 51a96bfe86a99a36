//! # Store Executors
//!
//! Execution discipline for the native symbol store.
//!
//! DbgHelp is single-threaded: every call has to come from one thread, and no
//! two calls may overlap. A [`StoreExecutor`] owns the provider and runs units
//! of work against it one at a time. The engine submits each store
//! interaction as a single job and blocks until it completes.
//!
//! - [`WorkerExecutor`]: a dedicated OS thread fed by a task queue, with a
//!   oneshot promise per job. This is what a live session uses.
//! - [`InlineExecutor`]: a mutex around the provider, run on the calling thread.
//!   Same serialization guarantee, no thread. Used by tests and the CLI's
//!   `--inline` mode.
//!
//! ## Example
//!
//! ```rust
//! use symtype_core::executor::{StoreExecutor, WorkerExecutor};
//! use symtype_core::provider::MemoryStore;
//!
//! let executor = WorkerExecutor::spawn("symbols", MemoryStore::new())?;
//! let calls = executor.run(|store| store.stats().field_calls)?;
//! assert_eq!(calls, 0);
//! # Ok::<(), symtype_core::SymtypeError>(())
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::error::{SymtypeError, SymtypeResult};
use crate::provider::SymbolInfoProvider;

/// Runs units of work against a provider, serialized.
pub trait StoreExecutor: Send + Sync
{
    /// The provider jobs receive.
    type Provider: SymbolInfoProvider;

    /// Run `work` against the provider and wait for its result.
    ///
    /// ## Errors
    ///
    /// `WorkerUnavailable` if the executor has shut down, the job panicked,
    /// or the call would deadlock the worker.
    fn run<R, F>(&self, work: F) -> SymtypeResult<R>
    where
        F: FnOnce(&mut Self::Provider) -> R + Send + 'static,
        R: Send + 'static;
}

type Job<P> = Box<dyn FnOnce(&mut P) + Send>;

/// Dedicated worker thread that owns the provider.
///
/// Dropping the executor closes the queue and joins the thread. `run` blocks
/// the calling thread, so async callers should go through
/// `tokio::task::spawn_blocking`.
pub struct WorkerExecutor<P>
{
    sender: Option<mpsc::UnboundedSender<Job<P>>>,
    handle: Option<JoinHandle<()>>,
    worker: ThreadId,
    name: String,
}

impl<P> WorkerExecutor<P>
where
    P: SymbolInfoProvider + Send + 'static,
{
    /// Start a worker thread named `name` that takes ownership of `provider`.
    ///
    /// ## Errors
    ///
    /// `Io` if the thread cannot be spawned.
    pub fn spawn(name: impl Into<String>, provider: P) -> SymtypeResult<Self>
    {
        let name = name.into();
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job<P>>();

        let thread_name = name.clone();
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            let mut provider = provider;
            debug!(worker = %thread_name, "symbol worker started");
            while let Some(job) = receiver.blocking_recv() {
                job(&mut provider);
            }
            debug!(worker = %thread_name, "symbol worker stopped");
        })?;

        Ok(Self {
            sender: Some(sender),
            worker: handle.thread().id(),
            handle: Some(handle),
            name,
        })
    }

    /// Name of the worker thread.
    #[must_use]
    pub fn name(&self) -> &str
    {
        &self.name
    }

    /// Whether the worker still accepts jobs.
    #[must_use]
    pub fn is_running(&self) -> bool
    {
        self.sender.as_ref().is_some_and(|sender| !sender.is_closed())
    }

    /// Stop accepting jobs, let queued ones finish, and join the thread.
    pub fn shutdown(&mut self)
    {
        self.sender = None;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!(worker = %self.name, "symbol worker panicked");
            }
        }
    }
}

impl<P> StoreExecutor for WorkerExecutor<P>
where
    P: SymbolInfoProvider + Send + 'static,
{
    type Provider = P;

    fn run<R, F>(&self, work: F) -> SymtypeResult<R>
    where
        F: FnOnce(&mut P) -> R + Send + 'static,
        R: Send + 'static,
    {
        if thread::current().id() == self.worker {
            return Err(SymtypeError::WorkerUnavailable(format!(
                "{} cannot wait on itself",
                self.name
            )));
        }

        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| SymtypeError::WorkerUnavailable(format!("{} has shut down", self.name)))?;

        let (reply, promise) = oneshot::channel();
        let job: Job<P> = Box::new(move |provider: &mut P| {
            // The caller may have given up waiting; nothing to do then.
            let _ = reply.send(panic::catch_unwind(AssertUnwindSafe(|| work(provider))));
        });

        sender
            .send(job)
            .map_err(|_| SymtypeError::WorkerUnavailable(format!("{} is not accepting work", self.name)))?;

        match promise.blocking_recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(SymtypeError::WorkerUnavailable(format!("job panicked on {}", self.name))),
            Err(_) => Err(SymtypeError::WorkerUnavailable(format!("{} dropped the job", self.name))),
        }
    }
}

impl<P> Drop for WorkerExecutor<P>
{
    fn drop(&mut self)
    {
        self.sender = None;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Provider behind a mutex, run on the calling thread.
#[derive(Debug, Default)]
pub struct InlineExecutor<P>
{
    provider: Mutex<P>,
}

impl<P> InlineExecutor<P>
{
    /// Wrap `provider`.
    #[must_use]
    pub fn new(provider: P) -> Self
    {
        Self {
            provider: Mutex::new(provider),
        }
    }

    /// Take the provider back.
    #[must_use]
    pub fn into_inner(self) -> P
    {
        self.provider.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<P> StoreExecutor for InlineExecutor<P>
where
    P: SymbolInfoProvider + Send,
{
    type Provider = P;

    fn run<R, F>(&self, work: F) -> SymtypeResult<R>
    where
        F: FnOnce(&mut P) -> R + Send + 'static,
        R: Send + 'static,
    {
        let mut provider = self
            .provider
            .lock()
            .map_err(|_| SymtypeError::WorkerUnavailable("inline provider lock poisoned".to_string()))?;
        Ok(work(&mut provider))
    }
}
