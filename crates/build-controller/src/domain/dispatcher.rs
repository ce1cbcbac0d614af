//! Delivery of watch events to the build and pod handlers
//!
//! Events for different resources are handled concurrently. Events for the
//! same resource key are queued and delivered one at a time in the order they
//! were received; a retryable failure is redelivered after a delay, holding
//! back later events for that key until it succeeds or is given up.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use api_types::Build;
use futures::FutureExt;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::domain::build::BuildHandler;
use crate::domain::build::BuildIndex;
use crate::domain::build::PodHandler;
use crate::domain::build::ReconcileError;

/// A change observed by one of the watchers.
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    BuildApplied(Build),
    BuildDeleted(Build),
    PodApplied(Pod),
    PodDeleted(Pod),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Build,
    Pod,
}

/// Serialization key of an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}/{}", self.kind, self.namespace, self.name)
    }
}

impl ControllerEvent {
    pub fn key(&self) -> ResourceKey {
        let (kind, namespace, name) = match self {
            Self::BuildApplied(build) | Self::BuildDeleted(build) => (
                ResourceKind::Build,
                build.namespace(),
                build.name_any(),
            ),
            Self::PodApplied(pod) | Self::PodDeleted(pod) => {
                (ResourceKind::Pod, pod.namespace(), pod.name_any())
            }
        };
        ResourceKey {
            kind,
            namespace: namespace.unwrap_or_default(),
            name,
        }
    }

    fn action(&self) -> &'static str {
        match self {
            Self::BuildApplied(_) => "build applied",
            Self::BuildDeleted(_) => "build deleted",
            Self::PodApplied(_) => "pod applied",
            Self::PodDeleted(_) => "pod deleted",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Pause before a failed event is delivered again
    pub retry_delay: Duration,
    /// Redeliveries of one event before it is dropped
    pub max_redeliveries: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(5),
            max_redeliveries: 5,
        }
    }
}

/// Events held back behind the delivery in progress for their key.
///
/// A key present in the map has a delivery in progress.
#[derive(Default)]
struct KeyQueues {
    waiting: HashMap<ResourceKey, VecDeque<ControllerEvent>>,
}

impl KeyQueues {
    /// Hands `event` back when its key is idle, marking the key busy.
    /// Otherwise queues it.
    fn admit(&mut self, event: ControllerEvent) -> Option<ControllerEvent> {
        match self.waiting.entry(event.key()) {
            Entry::Occupied(mut queue) => {
                queue.get_mut().push_back(event);
                None
            }
            Entry::Vacant(slot) => {
                slot.insert(VecDeque::new());
                Some(event)
            }
        }
    }

    /// Next event for `key` once its delivery finished, freeing the key when
    /// nothing is waiting.
    fn finish(&mut self, key: &ResourceKey) -> Option<ControllerEvent> {
        let queue = self.waiting.get_mut(key)?;
        let next = queue.pop_front();
        if next.is_none() {
            self.waiting.remove(key);
        }
        next
    }

    fn queued(&self) -> usize {
        self.waiting.values().map(VecDeque::len).sum()
    }
}

/// Routes [`ControllerEvent`]s to the handlers.
pub struct Dispatcher<B, P, X> {
    builds: Arc<B>,
    pods: Arc<P>,
    index: Arc<X>,
    config: DispatcherConfig,
}

impl<B, P, X> Clone for Dispatcher<B, P, X> {
    fn clone(&self) -> Self {
        Self {
            builds: Arc::clone(&self.builds),
            pods: Arc::clone(&self.pods),
            index: Arc::clone(&self.index),
            config: self.config.clone(),
        }
    }
}

impl<B, P, X> Dispatcher<B, P, X>
where
    B: BuildHandler + 'static,
    P: PodHandler + 'static,
    X: BuildIndex + 'static,
{
    pub fn new(builds: Arc<B>, pods: Arc<P>, index: Arc<X>, config: DispatcherConfig) -> Self {
        Self {
            builds,
            pods,
            index,
            config,
        }
    }

    /// Consumes events until the channel closes or `cancellation_token` fires.
    ///
    /// Once the channel closes, queued events are still delivered. On
    /// cancellation queued events and pending redeliveries are abandoned;
    /// handler calls in progress are awaited either way.
    #[tracing::instrument(skip_all)]
    pub async fn run(
        &self,
        mut events: mpsc::Receiver<ControllerEvent>,
        cancellation_token: CancellationToken,
    ) {
        info!("Starting event dispatcher");
        let mut in_flight = JoinSet::new();
        let mut queues = KeyQueues::default();

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    info!("Event dispatcher shutdown requested");
                    break;
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    self.on_delivered(joined, &mut queues, &mut in_flight, &cancellation_token);
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        info!("Event channel closed");
                        break;
                    };
                    if let Some(event) = queues.admit(event) {
                        self.spawn_delivery(&mut in_flight, event, &cancellation_token);
                    }
                }
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            self.on_delivered(joined, &mut queues, &mut in_flight, &cancellation_token);
        }

        let abandoned = queues.queued();
        if abandoned > 0 {
            warn!(abandoned, "Dropped queued events on shutdown");
        }
    }

    fn spawn_delivery(
        &self,
        in_flight: &mut JoinSet<ResourceKey>,
        event: ControllerEvent,
        cancellation_token: &CancellationToken,
    ) {
        let this = self.clone();
        let token = cancellation_token.clone();
        in_flight.spawn(async move {
            let key = event.key();
            let delivery = AssertUnwindSafe(this.deliver(event, token));
            if delivery.catch_unwind().await.is_err() {
                error!(key = %key, "Event handler panicked");
            }
            key
        });
    }

    /// Starts the next queued event for the key whose delivery just ended.
    fn on_delivered(
        &self,
        joined: Result<ResourceKey, tokio::task::JoinError>,
        queues: &mut KeyQueues,
        in_flight: &mut JoinSet<ResourceKey>,
        cancellation_token: &CancellationToken,
    ) {
        let key = match joined {
            Ok(key) => key,
            Err(e) => {
                error!("Event delivery task failed: {e}");
                return;
            }
        };
        if cancellation_token.is_cancelled() {
            return;
        }
        if let Some(next) = queues.finish(&key) {
            self.spawn_delivery(in_flight, next, cancellation_token);
        }
    }

    /// Handles one event, redelivering it while it fails with a retryable error.
    ///
    /// An applied build is replaced by its current copy from the index before
    /// every attempt, and dropped once the build is gone. Callers must not
    /// deliver two events for the same key at once; [`Dispatcher::run`]
    /// ensures this.
    pub async fn deliver(&self, mut event: ControllerEvent, cancellation_token: CancellationToken) {
        let key = event.key();
        let mut redeliveries = 0;

        loop {
            if let ControllerEvent::BuildApplied(build) = &event {
                match self.refresh(build) {
                    Some(current) => event = ControllerEvent::BuildApplied(current),
                    None => {
                        debug!(key = %key, "Build is gone, dropping event");
                        return;
                    }
                }
            }

            let error = match self.dispatch(&event).await {
                Ok(()) => return,
                Err(e) if e.is_retryable() && redeliveries < self.config.max_redeliveries => e,
                Err(e) if e.is_retryable() => {
                    error!(
                        key = %key,
                        redeliveries,
                        error = %e,
                        "Giving up on {}",
                        event.action()
                    );
                    return;
                }
                Err(e) => {
                    error!(key = %key, error = %e, "Failed to handle {}", event.action());
                    return;
                }
            };

            redeliveries += 1;
            warn!(
                key = %key,
                attempt = redeliveries,
                error = %error,
                "Redelivering {} in {:?}",
                event.action(),
                self.config.retry_delay
            );

            tokio::select! {
                _ = cancellation_token.cancelled() => return,
                _ = tokio::time::sleep(self.config.retry_delay) => {}
            }
        }
    }

    /// Current state of `build`, `None` if it no longer exists.
    ///
    /// An unreadable index keeps the stale copy.
    fn refresh(&self, build: &Build) -> Option<Build> {
        match self
            .index
            .get(&build.namespace().unwrap_or_default(), &build.name_any())
        {
            Ok(current) => current,
            Err(e) => {
                warn!(error = %e, "Failed to refresh build, redelivering the last copy");
                Some(build.clone())
            }
        }
    }

    async fn dispatch(&self, event: &ControllerEvent) -> Result<(), ReconcileError> {
        match event {
            ControllerEvent::BuildApplied(build) => self.builds.build_applied(build).await,
            ControllerEvent::BuildDeleted(build) => self.builds.build_deleted(build).await,
            ControllerEvent::PodApplied(pod) => self.pods.pod_applied(pod).await,
            ControllerEvent::PodDeleted(pod) => self.pods.pod_deleted(pod).await,
        }
    }
}
