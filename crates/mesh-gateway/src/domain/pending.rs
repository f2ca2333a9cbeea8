//! Pending Request Tracker - single-completion bookkeeping for in-flight requests.
//!
//! Maps correlation IDs to callers waiting for a bus response, a proxy result,
//! or their deadline.
//!
//! Flow:
//! 1. Dispatcher calls `add()` with the caller's responder
//! 2. Dispatcher calls `schedule_deadline()`
//! 3. Dispatcher sends the request over the bus or the proxy
//! 4. Whichever completion path runs first calls `complete()` and wins
//!    `mark_completed()`; the entry is removed and the caller answered
//! 5. Every later `complete()` for the same id is a no-op
//!
//! Timer and outbound-call cancellation live here so that every completion
//! path cancels them exactly once.

use crate::domain::correlation::CorrelationId;
use crate::domain::route::RouteKey;
use crate::domain::types::{Channel, CompletionSource, GatewayResponse};
use crate::ports::inbound::Responder;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::AbortHandle;
use tracing::{debug, warn};

/// A request waiting for completion.
pub struct PendingRequest {
    /// Route the request matched
    route_key: RouteKey,
    /// Channel it was dispatched on
    channel: Channel,
    /// Service it was dispatched to
    service: String,
    /// Caller handle
    responder: Box<dyn Responder>,
    /// When request was created
    created_at: Instant,
}

impl PendingRequest {
    pub fn new(
        route_key: RouteKey,
        channel: Channel,
        service: impl Into<String>,
        responder: Box<dyn Responder>,
    ) -> Self {
        Self {
            route_key,
            channel,
            service: service.into(),
            responder,
            created_at: Instant::now(),
        }
    }
}

/// Read-only view of a pending entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInfo {
    pub route_key: RouteKey,
    pub channel: Channel,
    pub service: String,
    pub completed: bool,
    pub age: Duration,
}

struct TrackedRequest {
    request: PendingRequest,
    completed: AtomicBool,
    deadline: Mutex<Option<AbortHandle>>,
    outbound: Mutex<Option<AbortHandle>>,
}

impl TrackedRequest {
    fn cancel_deadline(&self) {
        if let Some(handle) = self.deadline.lock().take() {
            handle.abort();
        }
    }

    fn cancel_outbound(&self) {
        if let Some(handle) = self.outbound.lock().take() {
            handle.abort();
        }
    }
}

/// Statistics for the tracker
#[derive(Debug, Default)]
pub struct PendingStats {
    /// Total requests registered
    pub total_registered: AtomicU64,
    /// Completed by a bus response
    pub completed_by_bus: AtomicU64,
    /// Completed by a proxy result
    pub completed_by_proxy: AtomicU64,
    /// Completed by the deadline
    pub total_timeouts: AtomicU64,
    /// Completed with an internal error
    pub total_failed: AtomicU64,
    /// Completions whose caller had already gone away
    pub total_abandoned: AtomicU64,
}

impl PendingStats {
    fn record(&self, source: CompletionSource) {
        let counter = match source {
            CompletionSource::Bus => &self.completed_by_bus,
            CompletionSource::Proxy => &self.completed_by_proxy,
            CompletionSource::Timeout => &self.total_timeouts,
            CompletionSource::Failure => &self.total_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// In-flight requests keyed by correlation id.
#[derive(Default)]
pub struct PendingRequestTracker {
    /// Map of correlation ID to pending request
    pending: DashMap<CorrelationId, TrackedRequest>,
    /// Statistics
    stats: PendingStats,
}

impl PendingRequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending request. Refuses to overwrite an existing id.
    pub fn add(&self, correlation_id: CorrelationId, request: PendingRequest) -> bool {
        match self.pending.entry(correlation_id) {
            Entry::Occupied(occupied) => {
                warn!(correlation_id = %occupied.key(), "Duplicate correlation id refused");
                false
            }
            Entry::Vacant(vacant) => {
                debug!(
                    correlation_id = %vacant.key(),
                    route = %request.route_key,
                    channel = %request.channel,
                    "Registered pending request"
                );
                vacant.insert(TrackedRequest {
                    request,
                    completed: AtomicBool::new(false),
                    deadline: Mutex::new(None),
                    outbound: Mutex::new(None),
                });
                self.stats.total_registered.fetch_add(1, Ordering::Relaxed);
                true
            }
        }
    }

    /// Snapshot of a pending entry.
    pub fn get(&self, correlation_id: &str) -> Option<PendingInfo> {
        self.pending.get(correlation_id).map(|tracked| PendingInfo {
            route_key: tracked.request.route_key.clone(),
            channel: tracked.request.channel,
            service: tracked.request.service.clone(),
            completed: tracked.completed.load(Ordering::Acquire),
            age: tracked.request.created_at.elapsed(),
        })
    }

    /// Set the completed flag and return its previous value.
    ///
    /// Exactly one caller per entry observes `false` and owns the response
    /// write. An unknown id reports `true`: it was completed and removed
    /// already, or never existed. Winning also cancels the deadline timer.
    pub fn mark_completed(&self, correlation_id: &str) -> bool {
        let Some(tracked) = self.pending.get(correlation_id) else {
            return true;
        };

        let previous = tracked.completed.swap(true, Ordering::AcqRel);
        if !previous {
            tracked.cancel_deadline();
        }
        previous
    }

    /// Delete an entry, cancelling its deadline timer and outbound call.
    pub fn remove(&self, correlation_id: &str) -> bool {
        self.take(correlation_id).is_some()
    }

    /// Finish a request: if this caller wins the race, remove the entry and
    /// write `response` to the caller.
    ///
    /// Returns `true` if this call performed the write.
    pub fn complete(
        &self,
        correlation_id: &str,
        response: GatewayResponse,
        source: CompletionSource,
    ) -> bool {
        if self.mark_completed(correlation_id) {
            debug!(
                correlation_id,
                source = %source,
                "Completion ignored (already completed or unknown)"
            );
            return false;
        }

        let Some(tracked) = self.take(correlation_id) else {
            return false;
        };

        let request = tracked.request;
        let status = response.status;
        let elapsed = request.created_at.elapsed();
        self.stats.record(source);

        match source {
            CompletionSource::Timeout => warn!(
                correlation_id,
                route = %request.route_key,
                service = %request.service,
                elapsed_ms = elapsed.as_millis() as u64,
                "Request timed out"
            ),
            _ => debug!(
                correlation_id,
                route = %request.route_key,
                source = %source,
                status,
                elapsed_ms = elapsed.as_millis() as u64,
                "Completed pending request"
            ),
        }

        if !request.responder.respond(response) {
            self.stats.total_abandoned.fetch_add(1, Ordering::Relaxed);
            debug!(correlation_id, "Caller went away before the response");
        }
        true
    }

    /// Spawn the deadline timer for an entry.
    ///
    /// When it fires first the caller receives `504 Timed out`.
    pub fn schedule_deadline(self: &Arc<Self>, correlation_id: &CorrelationId, after: Duration) {
        let tracker = Arc::clone(self);
        let id = correlation_id.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            tracker.complete(id.as_str(), GatewayResponse::timed_out(), CompletionSource::Timeout);
        });
        self.arm_deadline(correlation_id.as_str(), timer.abort_handle());
    }

    /// Attach a deadline timer handle to an entry.
    ///
    /// If the entry is gone or already completed the handle is aborted at
    /// once and `false` is returned.
    pub fn arm_deadline(&self, correlation_id: &str, handle: AbortHandle) -> bool {
        self.attach(correlation_id, handle, |tracked| &tracked.deadline)
    }

    /// Attach the handle of an in-flight outbound call to an entry.
    ///
    /// If the entry is gone or already completed the call is aborted at once.
    pub fn attach_outbound(&self, correlation_id: &str, handle: AbortHandle) -> bool {
        self.attach(correlation_id, handle, |tracked| &tracked.outbound)
    }

    /// Get number of currently pending requests
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Check if a correlation ID is pending
    pub fn is_pending(&self, correlation_id: &str) -> bool {
        self.pending.contains_key(correlation_id)
    }

    /// Get statistics
    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }

    fn take(&self, correlation_id: &str) -> Option<TrackedRequest> {
        let (_, tracked) = self.pending.remove(correlation_id)?;
        tracked.cancel_deadline();
        tracked.cancel_outbound();
        Some(tracked)
    }

    fn attach<F>(&self, correlation_id: &str, handle: AbortHandle, slot: F) -> bool
    where
        F: Fn(&TrackedRequest) -> &Mutex<Option<AbortHandle>>,
    {
        match self.pending.get(correlation_id) {
            Some(tracked) if !tracked.completed.load(Ordering::Acquire) => {
                if let Some(previous) = slot(tracked.value()).lock().replace(handle) {
                    previous.abort();
                }
                true
            }
            _ => {
                handle.abort();
                false
            }
        }
    }
}
