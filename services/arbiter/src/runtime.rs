//! Supervised Runtime
//!
//! Starts the arbiter as one task and each producer as its own task, all
//! sharing a single cancellation token. Shutdown cancels the token, waits for
//! every producer, and then waits for the arbiter to finish its cycle.

use crate::arbiter::{ArbiterState, TaskArbiter};
use crate::config::Config;
use crate::outbound::Collaborators;
use crate::queues::{self, EventProducers, EventQueues, QueueClosed};
use crate::registry::SessionRegistry;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, warn};

pub struct TutorRuntime {
    producers: EventProducers,
    cancel: CancellationToken,
    producer_tasks: JoinSet<()>,
    arbiter: JoinHandle<SessionRegistry>,
    state: watch::Receiver<ArbiterState>,
}

impl TutorRuntime {
    /// Starts an arbiter with the default policy, extractor and catalog.
    pub fn start(config: &Config, outbound: Arc<dyn Collaborators>) -> Self {
        Self::start_with(config.queue_capacity, |queues| {
            TaskArbiter::new(config, queues, outbound)
        })
    }

    /// Starts the arbiter returned by `build`, which receives the consumer
    /// side of freshly created queues.
    pub fn start_with<F>(queue_capacity: usize, build: F) -> Self
    where
        F: FnOnce(EventQueues) -> TaskArbiter,
    {
        let (producers, queues) = queues::bounded(queue_capacity);
        let cancel = CancellationToken::new();
        let arbiter = build(queues);
        let state = arbiter.subscribe_state();
        let arbiter = tokio::spawn(arbiter.run(cancel.clone()));
        info!(queue_capacity, "Tutor runtime started.");
        Self {
            producers,
            cancel,
            producer_tasks: JoinSet::new(),
            arbiter,
            state,
        }
    }

    /// A sending handle for code that is not a supervised producer.
    pub fn producers(&self) -> EventProducers {
        self.producers.clone()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Follows the arbiter's state. The receiver outlives the runtime and
    /// reads `Stopped` once the arbiter has finished.
    pub fn state(&self) -> watch::Receiver<ArbiterState> {
        self.state.clone()
    }

    /// Spawns a supervised producer. It is expected to return once the token
    /// is cancelled; a closed queue ends it early.
    pub fn spawn_producer<F, Fut>(&mut self, name: &'static str, producer: F)
    where
        F: FnOnce(EventProducers, CancellationToken) -> Fut,
        Fut: Future<Output = Result<(), QueueClosed>> + Send + 'static,
    {
        let task = producer(self.producers.clone(), self.cancel.clone());
        let span = tracing::info_span!("producer", producer = name);
        self.producer_tasks.spawn(
            async move {
                info!("Producer started.");
                match task.await {
                    Ok(()) => info!("Producer finished."),
                    Err(e) => warn!(error = %e, "Producer stopped early"),
                }
            }
            .instrument(span),
        );
    }

    /// Cancels every task and returns the registry the arbiter ended with.
    pub async fn shutdown(mut self) -> Result<SessionRegistry, JoinError> {
        info!("Shutting down tutor runtime...");
        self.cancel.cancel();
        while let Some(joined) = self.producer_tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Producer task failed");
            }
        }
        let registry = self.arbiter.await?;
        info!(
            active_sessions = registry.active_sessions(),
            "Tutor runtime stopped."
        );
        Ok(registry)
    }
}
