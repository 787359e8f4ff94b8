//! In-memory broker for driving live sessions without a network.
//!
//! The broker answers every request immediately, acknowledges posts on
//! queues opened with ACK and routes each post to every reader queue bound
//! to the same canonical URI. Harness methods refuse opens, hold responses,
//! inject send failures and drop the connection.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc;

use crate::message::domain::{MessageGuid, ResultCode};
use crate::queue::domain::{QueueFlags, QueueKey, Uri};
use crate::session::{
    domain::BrokerEndpoint,
    ports::{
        InboundFrame, OperationResponse, OutboundFrame, PutFrame, Transport, TransportError,
        TransportResult,
    },
};

/// Capacity of the inbound frame channel handed to a session.
const INBOUND_CAPACITY: usize = 1024;

/// Thread-safe loopback broker implementing [`Transport`].
#[derive(Debug, Clone, Default)]
pub struct LoopbackBroker {
    state: Arc<RwLock<LoopbackState>>,
}

#[derive(Debug, Default)]
struct LoopbackState {
    inbound: Option<mpsc::Sender<InboundFrame>>,
    connect_failure: Option<TransportError>,
    send_failures: VecDeque<TransportError>,
    refusals: VecDeque<ResultCode>,
    holding: bool,
    held: Vec<InboundFrame>,
    bindings: HashMap<QueueKey, (Uri, QueueFlags)>,
    sent: Vec<OutboundFrame>,
}

impl LoopbackBroker {
    /// Creates a broker with no connection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next connect attempt fail with `err`.
    ///
    /// # Errors
    ///
    /// Returns a fatal [`TransportError`] if the broker state is unusable.
    pub fn fail_next_connect(&self, err: TransportError) -> TransportResult<()> {
        self.write_state()?.connect_failure = Some(err);
        Ok(())
    }

    /// Makes the next send fail with `err`. A fatal failure also drops the
    /// connection.
    ///
    /// # Errors
    ///
    /// Returns a fatal [`TransportError`] if the broker state is unusable.
    pub fn fail_next_send(&self, err: TransportError) -> TransportResult<()> {
        self.write_state()?.send_failures.push_back(err);
        Ok(())
    }

    /// Answers the next open request with `status` instead of success.
    ///
    /// # Errors
    ///
    /// Returns a fatal [`TransportError`] if the broker state is unusable.
    pub fn refuse_next_open(&self, status: ResultCode) -> TransportResult<()> {
        self.write_state()?.refusals.push_back(status);
        Ok(())
    }

    /// Stops answering until [`Self::release_responses`] is called.
    ///
    /// # Errors
    ///
    /// Returns a fatal [`TransportError`] if the broker state is unusable.
    pub fn hold_responses(&self) -> TransportResult<()> {
        self.write_state()?.holding = true;
        Ok(())
    }

    /// Sends every held response in order and resumes answering.
    ///
    /// # Errors
    ///
    /// Returns a fatal [`TransportError`] when no session is reading.
    pub async fn release_responses(&self) -> TransportResult<()> {
        let (inbound, frames) = {
            let mut state = self.write_state()?;
            state.holding = false;
            (state.inbound.clone(), std::mem::take(&mut state.held))
        };
        forward(inbound, frames).await
    }

    /// Pushes an arbitrary frame to the connected session.
    ///
    /// # Errors
    ///
    /// Returns a fatal [`TransportError`] when no session is reading.
    pub async fn inject(&self, frame: InboundFrame) -> TransportResult<()> {
        let inbound = self.read_state()?.inbound.clone();
        forward(inbound, vec![frame]).await
    }

    /// Reports a lost connection to the session, then closes the stream.
    ///
    /// # Errors
    ///
    /// Returns a fatal [`TransportError`] when no session is reading.
    pub async fn drop_connection(&self, reason: &str) -> TransportResult<()> {
        let inbound = self.write_state()?.inbound.take();
        forward(
            inbound,
            vec![InboundFrame::ConnectionLost {
                reason: reason.to_owned(),
            }],
        )
        .await
    }

    /// Returns whether a session is connected.
    ///
    /// # Errors
    ///
    /// Returns a fatal [`TransportError`] if the broker state is unusable.
    pub fn is_connected(&self) -> TransportResult<bool> {
        Ok(self.read_state()?.inbound.is_some())
    }

    /// Returns every frame received, in arrival order.
    ///
    /// # Errors
    ///
    /// Returns a fatal [`TransportError`] if the broker state is unusable.
    pub fn sent_frames(&self) -> TransportResult<Vec<OutboundFrame>> {
        Ok(self.read_state()?.sent.clone())
    }

    fn read_state(&self) -> TransportResult<RwLockReadGuard<'_, LoopbackState>> {
        self.state
            .read()
            .map_err(|err| TransportError::fatal(err.to_string()))
    }

    fn write_state(&self) -> TransportResult<RwLockWriteGuard<'_, LoopbackState>> {
        self.state
            .write()
            .map_err(|err| TransportError::fatal(err.to_string()))
    }
}

impl LoopbackState {
    fn respond(&mut self, frame: &OutboundFrame) -> Vec<InboundFrame> {
        match frame {
            OutboundFrame::OpenQueue {
                request,
                queue,
                uri,
                flags,
                ..
            } => {
                let status = self.refusals.pop_front().unwrap_or(ResultCode::Success);
                if status.is_success() {
                    self.bindings.insert(*queue, (uri.canonical(), *flags));
                    return vec![InboundFrame::OpenQueueResponse(OperationResponse::success(
                        *request,
                    ))];
                }
                vec![InboundFrame::OpenQueueResponse(OperationResponse::failure(
                    *request,
                    status,
                    "open refused by broker",
                ))]
            }
            OutboundFrame::ConfigureQueue { request, .. } => {
                vec![InboundFrame::ConfigureQueueResponse(
                    OperationResponse::success(*request),
                )]
            }
            OutboundFrame::CloseQueue { request, queue } => {
                self.bindings.remove(queue);
                vec![InboundFrame::CloseQueueResponse(OperationResponse::success(
                    *request,
                ))]
            }
            OutboundFrame::Put(put) => self.route(put),
            OutboundFrame::Confirm { .. } | OutboundFrame::Disconnect => Vec::new(),
        }
    }

    fn route(&self, put: &PutFrame) -> Vec<InboundFrame> {
        let guid = MessageGuid::new_random();
        let mut replies = Vec::new();
        if put.ack_requested {
            replies.push(InboundFrame::Ack {
                request: put.request,
                guid,
                status: ResultCode::Success,
            });
        }
        let Some((target, _)) = self.bindings.get(&put.queue) else {
            return replies;
        };
        let mut readers: Vec<QueueKey> = self
            .bindings
            .iter()
            .filter(|(_, (uri, flags))| flags.is_reader() && uri == target)
            .map(|(key, _)| *key)
            .collect();
        readers.sort_unstable();
        replies.extend(readers.into_iter().map(|reader| InboundFrame::Push {
            queue: reader,
            guid,
            payload: put.payload.clone(),
            codec: put.codec,
        }));
        replies
    }
}

async fn forward(
    inbound: Option<mpsc::Sender<InboundFrame>>,
    frames: Vec<InboundFrame>,
) -> TransportResult<()> {
    if frames.is_empty() {
        return Ok(());
    }
    let sender = inbound.ok_or_else(|| TransportError::fatal("no session is connected"))?;
    for frame in frames {
        sender
            .send(frame)
            .await
            .map_err(|_| TransportError::fatal("session stopped reading"))?;
    }
    Ok(())
}

#[async_trait]
impl Transport for LoopbackBroker {
    async fn connect(
        &self,
        endpoint: &BrokerEndpoint,
    ) -> TransportResult<mpsc::Receiver<InboundFrame>> {
        let mut state = self.write_state()?;
        if let Some(err) = state.connect_failure.take() {
            return Err(err);
        }
        let (sender, receiver) = mpsc::channel(INBOUND_CAPACITY);
        state.inbound = Some(sender);
        state.bindings.clear();
        tracing::debug!(endpoint = %endpoint, "loopback broker accepted connection");
        Ok(receiver)
    }

    async fn send(&self, frame: OutboundFrame) -> TransportResult<()> {
        let (inbound, replies) = {
            let mut state = self.write_state()?;
            if state.inbound.is_none() {
                return Err(TransportError::fatal("not connected"));
            }
            if let Some(err) = state.send_failures.pop_front() {
                if err.is_fatal() {
                    state.inbound = None;
                }
                return Err(err);
            }
            let replies = state.respond(&frame);
            state.sent.push(frame);
            if state.holding {
                state.held.extend(replies);
                (None, Vec::new())
            } else {
                (state.inbound.clone(), replies)
            }
        };
        forward(inbound, replies).await
    }

    async fn disconnect(&self) -> TransportResult<()> {
        let mut state = self.write_state()?;
        state.inbound = None;
        state.bindings.clear();
        Ok(())
    }
}
