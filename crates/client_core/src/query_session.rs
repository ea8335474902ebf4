//! One conversation and the lifecycle of each of its query turns.
//!
//! A turn moves `Idle -> Sending -> (Streaming | AwaitingFullResponse) ->
//! (Complete | Error)`. Only one turn per session may be outstanding; a
//! submission made while another is in flight is turned away before anything
//! is appended to the log.

use std::{
    pin::pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use futures::StreamExt;
use shared::{
    domain::{Citation, CitationId},
    protocol::{QueryRequest, StreamEvent, StreamQueryRequest},
};
use tokio::sync::{
    broadcast::{self, error::RecvError},
    Mutex,
};
use tracing::{debug, error, info, warn};

use crate::{
    activity::ActivityIndicator,
    citations::CitationIndex,
    error::{ClientError, QueryError},
    stream_decoder::decode_stream,
    transport::RetrievalApi,
    types::{Message, MessageId, MessageStatus},
    ClientEvent,
};

pub const DEFAULT_TOP_K: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// One `POST /api/query`, answer applied in a single step.
    Complete,
    /// `POST /api/query/stream`, answer grown delta by delta.
    Streamed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    pub top_k: u32,
    pub use_reranker: bool,
    pub delivery: Delivery,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            use_reranker: true,
            delivery: Delivery::Complete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    Sending,
    Streaming,
    AwaitingFullResponse,
    Complete,
    Error,
}

#[derive(Debug, Default)]
struct Answer {
    content: Option<String>,
    citations: Vec<Citation>,
    processing_time_ms: Option<f64>,
}

#[derive(Debug)]
struct SessionState {
    messages: Vec<Message>,
    next_message_id: u64,
    phase: TurnPhase,
    citations: CitationIndex,
}

impl SessionState {
    fn allocate_id(&mut self) -> MessageId {
        self.next_message_id += 1;
        MessageId(self.next_message_id)
    }

    fn message_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|message| message.id() == id)
    }
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct QuerySession {
    api: Arc<dyn RetrievalApi>,
    options: QueryOptions,
    state: Mutex<SessionState>,
    in_flight: AtomicBool,
    activity: ActivityIndicator,
    events: broadcast::Sender<ClientEvent>,
}

impl QuerySession {
    pub fn new(api: Arc<dyn RetrievalApi>, options: QueryOptions) -> Self {
        let (events, _) = broadcast::channel(1024);
        Self::new_with_dependencies(api, options, ActivityIndicator::new(), events)
    }

    pub fn new_with_dependencies(
        api: Arc<dyn RetrievalApi>,
        options: QueryOptions,
        activity: ActivityIndicator,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        Self {
            api,
            options,
            state: Mutex::new(SessionState {
                messages: Vec::new(),
                next_message_id: 0,
                phase: TurnPhase::Idle,
                citations: CitationIndex::new(),
            }),
            in_flight: AtomicBool::new(false),
            activity,
            events,
        }
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub async fn phase(&self) -> TurnPhase {
        self.state.lock().await.phase
    }

    /// The conversation log in submission order.
    pub async fn messages(&self) -> Vec<Message> {
        self.state.lock().await.messages.clone()
    }

    pub async fn resolve_citation(&self, citation_id: CitationId) -> Option<Citation> {
        self.state
            .lock()
            .await
            .citations
            .resolve(citation_id)
            .cloned()
    }

    pub async fn citation_scope(&self) -> Option<MessageId> {
        self.state.lock().await.citations.scope()
    }

    /// Empties the conversation. Refused while a turn is outstanding.
    pub async fn clear(&self) -> Result<(), QueryError> {
        let _flight = self.begin_flight()?;
        let mut state = self.state.lock().await;
        state.messages.clear();
        state.citations.clear();
        state.phase = TurnPhase::Idle;
        Ok(())
    }

    /// Runs one query turn to completion and returns the assistant message
    /// in its final state. Transport and server failures do not surface as
    /// `Err`; they leave the message in `MessageStatus::Error`.
    ///
    /// Not cancel-safe: dropping the future mid-turn frees the session for a
    /// new query but leaves the assistant message and the phase where the
    /// turn stopped.
    pub async fn submit(&self, query: &str) -> Result<Message, QueryError> {
        if query.trim().is_empty() {
            return Err(QueryError::Validation("query must not be empty".to_string()));
        }
        let _flight = self.begin_flight()?;
        let _busy = self.activity.enter();

        let mut assistant = {
            let mut state = self.state.lock().await;
            let user = Message::user(state.allocate_id(), query);
            let assistant = Message::assistant_placeholder(state.allocate_id());
            state.citations.scope_to(assistant.id());
            state.phase = TurnPhase::Sending;
            state.messages.push(user.clone());
            state.messages.push(assistant.clone());
            self.emit(ClientEvent::MessageAppended(user));
            self.emit(ClientEvent::MessageAppended(assistant.clone()));
            assistant
        };
        let message_id = assistant.id().0;
        info!(message_id, delivery = ?self.options.delivery, "query turn started");

        let outcome = match self.options.delivery {
            Delivery::Complete => self.run_complete(query).await,
            Delivery::Streamed => self.run_streamed(&mut assistant, query).await,
        };

        match outcome {
            Ok(answer) => self.finish_turn(&mut assistant, answer).await,
            Err(err) => {
                warn!(message_id, error = %err, "query turn failed");
                self.fail_turn(&mut assistant, &err).await;
            }
        }
        info!(message_id, status = ?assistant.status(), "query turn finished");
        Ok(assistant)
    }

    fn begin_flight(&self) -> Result<InFlight<'_>, QueryError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| QueryError::Busy)?;
        Ok(InFlight(&self.in_flight))
    }

    async fn run_complete(&self, query: &str) -> Result<Answer, ClientError> {
        self.set_phase(TurnPhase::AwaitingFullResponse).await;
        let request = QueryRequest {
            query: query.to_string(),
            top_k: self.options.top_k,
            use_reranker: self.options.use_reranker,
            stream: false,
        };
        let response = self.api.query(&request).await?;
        Ok(Answer {
            content: Some(response.response),
            citations: response.citations,
            processing_time_ms: Some(response.processing_time_ms),
        })
    }

    async fn run_streamed(
        &self,
        assistant: &mut Message,
        query: &str,
    ) -> Result<Answer, ClientError> {
        let request = StreamQueryRequest {
            query: query.to_string(),
            top_k: self.options.top_k,
            use_reranker: self.options.use_reranker,
        };
        let source = self.api.query_stream(&request).await?;

        if let Err(err) = assistant.advance(MessageStatus::Streaming) {
            error!(error = %err, "unexpected message transition");
        }
        {
            let mut state = self.state.lock().await;
            state.phase = TurnPhase::Streaming;
            self.sync_message(&mut state, assistant);
        }

        let mut events = pin!(decode_stream(source));
        let mut answer = Answer::default();
        while let Some(event) = events.next().await {
            match event? {
                StreamEvent::Content(delta) => {
                    assistant.push_delta(&delta);
                    let mut state = self.state.lock().await;
                    self.sync_message(&mut state, assistant);
                }
                StreamEvent::Metadata { citations, .. } => answer.citations = citations,
                StreamEvent::Done { processing_time_ms } => {
                    answer.processing_time_ms = processing_time_ms;
                }
            }
        }
        Ok(answer)
    }

    async fn finish_turn(&self, assistant: &mut Message, answer: Answer) {
        if let Err(err) =
            assistant.complete(answer.content, answer.citations, answer.processing_time_ms)
        {
            error!(error = %err, "unexpected message transition");
        }
        let mut state = self.state.lock().await;
        state
            .citations
            .attach(assistant.id(), assistant.citations().unwrap_or_default());
        state.phase = TurnPhase::Complete;
        self.sync_message(&mut state, assistant);
    }

    async fn fail_turn(&self, assistant: &mut Message, err: &ClientError) {
        if let Err(transition) = assistant.fail(&err.reason()) {
            error!(error = %transition, "unexpected message transition");
        }
        let mut state = self.state.lock().await;
        state.phase = TurnPhase::Error;
        self.sync_message(&mut state, assistant);
    }

    /// Copies the turn's working message into the log and announces it.
    fn sync_message(&self, state: &mut SessionState, message: &Message) {
        if let Some(entry) = state.message_mut(message.id()) {
            *entry = message.clone();
        }
        self.emit(ClientEvent::MessageUpdated(message.clone()));
    }

    async fn set_phase(&self, phase: TurnPhase) {
        self.state.lock().await.phase = phase;
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }
}

/// Hands `emit` each new piece of an answer as it grows, until the answer
/// completes or fails. Returns how many bytes of content were emitted.
///
/// Every update carries the whole content so far, so a receiver that lagged
/// behind resumes from the next update it does get.
pub async fn echo_answer(
    mut events: broadcast::Receiver<ClientEvent>,
    mut emit: impl FnMut(&str),
) -> usize {
    let mut emitted = 0;
    loop {
        let message = match events.recv().await {
            Ok(ClientEvent::MessageUpdated(message)) => message,
            Ok(_) => continue,
            Err(RecvError::Lagged(skipped)) => {
                debug!(skipped, "answer echo fell behind");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        if matches!(
            message.status(),
            MessageStatus::Streaming | MessageStatus::Complete
        ) {
            if let Some(delta) = message.content().get(emitted..) {
                if !delta.is_empty() {
                    emit(delta);
                }
                emitted = message.content().len();
            }
        }
        if message.status().is_terminal() {
            break;
        }
    }
    emitted
}

#[cfg(test)]
#[path = "tests/query_session_tests.rs"]
mod tests;
