use super::context::RequestContext;
use crate::error::{PaymentError, Result};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct Envelope {
    context: Option<RequestContext>,
    job: Job,
}

impl Envelope {
    async fn run(self) {
        let job = AssertUnwindSafe(self.job).catch_unwind();
        let outcome = match self.context {
            Some(context) => context.scope(job).await,
            None => job.await,
        };
        if let Err(panic) = outcome {
            error!("Task panicked: {}", panic_message(&*panic));
        }
    }
}

/// A fixed pool of workers fed from a bounded backlog.
///
/// When every worker is busy and the backlog is full, the submitter runs the task
/// itself, so a burst slows down the producer instead of growing the queue.
/// The submitter's [`RequestContext`] is captured at submission and installed for
/// the task's duration only.
pub struct BoundedExecutor {
    name: String,
    sender: Mutex<Option<mpsc::Sender<Envelope>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl BoundedExecutor {
    /// Spawns `workers` tasks on the current tokio runtime.
    pub fn new(name: impl Into<String>, workers: usize, backlog: usize) -> Result<Self> {
        if workers == 0 || backlog == 0 {
            return Err(PaymentError::InvalidConfig(
                "Executor needs at least one worker and one backlog slot".to_string(),
            ));
        }

        let name = name.into();
        let (sender, receiver) = mpsc::channel(backlog);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let handles = (0..workers)
            .map(|index| {
                let receiver = Arc::clone(&receiver);
                let span = info_span!("worker", name = %format!("{name}-{index}"));
                tokio::spawn(work(receiver).instrument(span))
            })
            .collect();

        Ok(Self {
            name,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(handles),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hands `task` to the pool, or runs it here when the pool is saturated.
    pub async fn execute<F>(&self, task: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let envelope = Envelope {
            context: RequestContext::current(),
            job: Box::pin(task),
        };

        match self.sender()?.try_send(envelope) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(envelope)) => {
                debug!(executor = %self.name, "Backlog full, running task on the caller");
                envelope.run().await;
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(PaymentError::ExecutorShutdown),
        }
    }

    /// Tasks accepted but not yet picked up by a worker.
    pub fn queued(&self) -> usize {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|sender| sender.max_capacity() - sender.capacity())
            .unwrap_or(0)
    }

    /// Stops accepting tasks and waits until the backlog is drained.
    pub async fn shutdown(&self) {
        drop(
            self.sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let workers = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for worker in workers {
            if let Err(e) = worker.await {
                error!(executor = %self.name, "Worker failed: {}", e);
            }
        }
        info!(executor = %self.name, "Executor stopped");
    }

    fn sender(&self) -> Result<mpsc::Sender<Envelope>> {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(PaymentError::ExecutorShutdown)
    }
}

async fn work(receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Envelope>>>) {
    loop {
        let envelope = receiver.lock().await.recv().await;
        match envelope {
            Some(envelope) => envelope.run().await,
            None => break,
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
