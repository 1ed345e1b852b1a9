use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info};

use atende_core::domain::message::InboundMessage;
use atende_core::domain::session::UserId;
use atende_core::domain::tenant::TenantId;
use atende_core::flows::{ConversationEngine, EngineResponse};
use atende_core::integrations::ReplySender;

use crate::envelope::InboundEnvelope;

/// Whatever turns one inbound message into replies. Implemented by the conversation engine.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, message: &InboundMessage, reply: &dyn ReplySender) -> EngineResponse;
}

#[async_trait]
impl MessageHandler for ConversationEngine {
    async fn handle(&self, message: &InboundMessage, reply: &dyn ReplySender) -> EngineResponse {
        self.handle_message(message, reply).await
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("lane for `{0}` stopped before answering")]
    LaneStopped(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaneSettings {
    /// A lane with nothing to do for this long shuts down; the next message opens a new one.
    pub idle_timeout: Duration,
}

impl Default for LaneSettings {
    fn default() -> Self {
        Self { idle_timeout: Duration::from_secs(60) }
    }
}

type LaneKey = (TenantId, UserId);
type LaneFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

struct Job<H> {
    correlation_id: String,
    task: Box<dyn FnOnce(Arc<H>) -> LaneFuture + Send>,
}

/// Enqueueing and lane retirement both happen under this lock, so a job is never handed
/// to a lane that has already decided to stop.
type Lanes<H> = Arc<Mutex<HashMap<LaneKey, mpsc::UnboundedSender<Job<H>>>>>;

/// Serializes work per (tenant, user) while different users proceed concurrently.
pub struct LaneDispatcher<H> {
    handler: Arc<H>,
    settings: LaneSettings,
    lanes: Lanes<H>,
}

impl<H: MessageHandler> LaneDispatcher<H> {
    pub fn new(handler: Arc<H>, settings: LaneSettings) -> Self {
        Self { handler, settings, lanes: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }

    pub async fn open_lanes(&self) -> usize {
        self.lanes.lock().await.len()
    }

    /// Queues the envelope on its user's lane; the receiver resolves once it was handled.
    pub async fn submit(
        &self,
        envelope: InboundEnvelope,
        reply: Arc<dyn ReplySender>,
    ) -> oneshot::Receiver<EngineResponse> {
        let (done, answer) = oneshot::channel();
        let key = envelope.lane_key();
        let correlation_id = envelope.envelope_id.clone();
        let task = move |handler: Arc<H>| -> LaneFuture {
            Box::pin(async move {
                debug!(
                    event_name = "gateway.envelope_dispatched",
                    correlation_id = %envelope.envelope_id,
                    tenant_id = %envelope.message.tenant_id,
                    user_id = %envelope.message.sender_id,
                    "dispatching envelope"
                );
                let response = handler.handle(&envelope.message, reply.as_ref()).await;
                if done.send(response).is_err() {
                    debug!(
                        event_name = "gateway.answer_dropped",
                        correlation_id = %envelope.envelope_id,
                        "submitter stopped waiting"
                    );
                }
            })
        };
        self.enqueue(key, Job { correlation_id, task: Box::new(task) }).await;
        answer
    }

    /// Submits and waits for the engine's answer.
    pub async fn dispatch(
        &self,
        envelope: InboundEnvelope,
        reply: Arc<dyn ReplySender>,
    ) -> Result<EngineResponse, DispatchError> {
        let correlation_id = envelope.envelope_id.clone();
        let answer = self.submit(envelope, reply).await;
        answer.await.map_err(|_| DispatchError::LaneStopped(correlation_id))
    }

    /// Runs `work` on the user's lane, after everything already queued for that user and
    /// before anything queued later. Out-of-band session writes go through here.
    pub async fn run_exclusive<F, Fut, T>(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        correlation_id: impl Into<String>,
        work: F,
    ) -> Result<T, DispatchError>
    where
        F: FnOnce(Arc<H>) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let correlation_id = correlation_id.into();
        let (done, answer) = oneshot::channel();
        let task = move |handler: Arc<H>| -> LaneFuture {
            Box::pin(async move {
                // The caller may have given up; the work itself already ran.
                let _ = done.send(work(handler).await);
            })
        };
        let job = Job { correlation_id: correlation_id.clone(), task: Box::new(task) };
        self.enqueue((tenant_id, user_id), job).await;
        answer.await.map_err(|_| DispatchError::LaneStopped(correlation_id))
    }

    async fn enqueue(&self, key: LaneKey, mut job: Job<H>) {
        let mut lanes = self.lanes.lock().await;
        if let Some(sender) = lanes.get(&key) {
            match sender.send(job) {
                Ok(()) => return,
                Err(mpsc::error::SendError(returned)) => job = returned,
            }
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        // A fresh receiver cannot be closed yet.
        let _ = sender.send(job);
        lanes.insert(key.clone(), sender);
        debug!(
            event_name = "gateway.lane_opened",
            tenant_id = %key.0,
            user_id = %key.1,
            open_lanes = lanes.len(),
            "opened user lane"
        );
        tokio::spawn(run_lane(
            Arc::clone(&self.handler),
            Arc::clone(&self.lanes),
            key,
            receiver,
            self.settings.idle_timeout,
        ));
    }
}

async fn run_lane<H: MessageHandler>(
    handler: Arc<H>,
    lanes: Lanes<H>,
    key: LaneKey,
    mut receiver: mpsc::UnboundedReceiver<Job<H>>,
    idle_timeout: Duration,
) {
    loop {
        match tokio::time::timeout(idle_timeout, receiver.recv()).await {
            Ok(Some(job)) => process(&handler, job).await,
            Ok(None) => break,
            Err(_) => {
                let mut map = lanes.lock().await;
                // A job may have been queued while waiting for the lock.
                if !receiver.is_empty() {
                    continue;
                }
                map.remove(&key);
                break;
            }
        }
    }
    info!(
        event_name = "gateway.lane_closed",
        tenant_id = %key.0,
        user_id = %key.1,
        "closed idle user lane"
    );
}

async fn process<H: MessageHandler>(handler: &Arc<H>, job: Job<H>) {
    let Job { correlation_id, task } = job;
    debug!(event_name = "gateway.lane_job_started", correlation_id = %correlation_id, "lane job");
    task(Arc::clone(handler)).await;
}
