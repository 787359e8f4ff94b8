//! Table of operations awaiting a broker response.
//!
//! The issuing call inserts an entry before its frame is sent, so a response
//! can never arrive for an id the table does not know yet. Whoever removes an
//! entry owns its resolution.
//!
//! Opens whose caller stopped waiting are remembered until the broker
//! answers, so a late success can be undone.

use super::{SessionError, SessionResult};
use crate::message::domain::{CorrelationId, SessionEvent};
use crate::queue::domain::{QueueId, QueueKey};
use crate::session::domain::{OperationKind, RequestId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;

/// Operation awaiting a response.
#[derive(Debug)]
pub(crate) struct PendingOperation {
    pub(crate) kind: OperationKind,
    pub(crate) queue: QueueId,
    pub(crate) correlation_id: CorrelationId,
    pub(crate) deadline: Option<DateTime<Utc>>,
    pub(crate) waiter: Option<oneshot::Sender<SessionEvent>>,
}

/// Request resolved locally while the broker may still act on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Abandoned {
    /// An open that timed out; a late success leaves the queue open on the
    /// broker.
    Open(QueueKey),
    /// A close sent to undo a late open.
    Rollback,
}

#[derive(Debug)]
pub(crate) struct CorrelationTable {
    next_request: AtomicU64,
    entries: Mutex<HashMap<RequestId, PendingOperation>>,
    abandoned: Mutex<HashMap<RequestId, Abandoned>>,
}

impl Default for CorrelationTable {
    fn default() -> Self {
        Self {
            next_request: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
            abandoned: Mutex::new(HashMap::new()),
        }
    }
}

impl CorrelationTable {
    pub(crate) fn next_request_id(&self) -> RequestId {
        RequestId::from_raw(self.next_request.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn insert(
        &self,
        request: RequestId,
        operation: PendingOperation,
    ) -> SessionResult<()> {
        let mut entries = self.entries.lock().map_err(SessionError::internal)?;
        if entries.contains_key(&request) {
            return Err(SessionError::Internal(format!(
                "request {request} is already pending"
            )));
        }
        entries.insert(request, operation);
        Ok(())
    }

    pub(crate) fn remove(&self, request: RequestId) -> SessionResult<Option<PendingOperation>> {
        let mut entries = self.entries.lock().map_err(SessionError::internal)?;
        Ok(entries.remove(&request))
    }

    /// Removes every entry, oldest request first, and forgets abandoned
    /// requests.
    pub(crate) fn drain(&self) -> SessionResult<Vec<(RequestId, PendingOperation)>> {
        let mut entries = self.entries.lock().map_err(SessionError::internal)?;
        self.abandoned
            .lock()
            .map_err(SessionError::internal)?
            .clear();
        let mut drained: Vec<_> = entries.drain().collect();
        drained.sort_by_key(|(request, _)| *request);
        Ok(drained)
    }

    /// Removes every entry whose deadline is at or before `now`, oldest
    /// request first.
    pub(crate) fn take_expired(
        &self,
        now: DateTime<Utc>,
    ) -> SessionResult<Vec<(RequestId, PendingOperation)>> {
        let mut entries = self.entries.lock().map_err(SessionError::internal)?;
        let expired: Vec<RequestId> = entries
            .iter()
            .filter(|(_, operation)| operation.deadline.is_some_and(|deadline| deadline <= now))
            .map(|(request, _)| *request)
            .collect();
        let mut taken: Vec<_> = expired
            .into_iter()
            .filter_map(|request| entries.remove(&request).map(|operation| (request, operation)))
            .collect();
        taken.sort_by_key(|(request, _)| *request);
        Ok(taken)
    }

    /// Returns the oldest request of `kind` pending on `queue`.
    pub(crate) fn find_for_queue(
        &self,
        queue: &QueueId,
        kind: OperationKind,
    ) -> SessionResult<Option<RequestId>> {
        let entries = self.entries.lock().map_err(SessionError::internal)?;
        Ok(entries
            .iter()
            .filter(|(_, operation)| operation.kind == kind && &operation.queue == queue)
            .map(|(request, _)| *request)
            .min())
    }

    /// Returns the oldest post awaiting acknowledgement with `correlation_id`.
    pub(crate) fn find_post(
        &self,
        correlation_id: &CorrelationId,
    ) -> SessionResult<Option<RequestId>> {
        let entries = self.entries.lock().map_err(SessionError::internal)?;
        Ok(entries
            .iter()
            .filter(|(_, operation)| {
                operation.kind == OperationKind::Post && &operation.correlation_id == correlation_id
            })
            .map(|(request, _)| *request)
            .min())
    }

    /// Returns every pending request of `kind`, oldest first.
    pub(crate) fn requests_of(&self, kind: OperationKind) -> SessionResult<Vec<RequestId>> {
        let entries = self.entries.lock().map_err(SessionError::internal)?;
        let mut requests: Vec<_> = entries
            .iter()
            .filter(|(_, operation)| operation.kind == kind)
            .map(|(request, _)| *request)
            .collect();
        requests.sort_unstable();
        Ok(requests)
    }

    pub(crate) fn len(&self) -> SessionResult<usize> {
        let entries = self.entries.lock().map_err(SessionError::internal)?;
        Ok(entries.len())
    }

    pub(crate) fn abandon(&self, request: RequestId, marker: Abandoned) -> SessionResult<()> {
        let mut abandoned = self.abandoned.lock().map_err(SessionError::internal)?;
        abandoned.insert(request, marker);
        Ok(())
    }

    pub(crate) fn take_abandoned(&self, request: RequestId) -> SessionResult<Option<Abandoned>> {
        let mut abandoned = self.abandoned.lock().map_err(SessionError::internal)?;
        Ok(abandoned.remove(&request))
    }
}
