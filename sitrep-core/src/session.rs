//! ChatSession - the state machine behind one query/response cycle.
//!
//! A run moves through `AwaitingResponse`, `Narrating` and
//! `RevealingFindings` before settling back in `Idle`. The network request
//! and both reveal timers report back through an event channel; every event
//! carries the generation of the run that produced it and is dropped when
//! that run is no longer the live one.
//!
//! The session spawns local tasks, so it must be driven from inside a
//! [`tokio::task::LocalSet`].

use crate::backend::ReportBackend;
use crate::gazetteer::{Coordinate, CoordinateResolver};
use crate::ingest::{ingest, Finding, MalformedResponse};
use crate::reveal::{RevealError, RevealSequencer};
use crate::store::SharedStore;
use crate::transcript::Message;
use crate::typewriter::TypewriterAnimator;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const DEFAULT_TYPEWRITER_MS: u64 = 20;
const DEFAULT_MARKER_MS: u64 = 1000;

pub const DEFAULT_STATUS_TEXT: &str = "Analyzing…";
pub const DEFAULT_ERROR_TEXT: &str =
    "Sorry, the report could not be retrieved. Please try again.";
pub const DEFAULT_CANCELLED_TEXT: &str = "Request cancelled.";

/// Errors surfaced by a session.
///
/// Response and network errors never escape a run; they are turned into the
/// fixed error message in the transcript and kept in
/// [`ChatSession::last_error`] for diagnostics.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error(transparent)]
    MalformedResponse(#[from] MalformedResponse),

    #[error("Network failure: {0}")]
    NetworkFailure(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("No gazetteer entry for {0:?}")]
    UnresolvableLocation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl From<analyst::Error> for SessionError {
    fn from(e: analyst::Error) -> Self {
        match e {
            analyst::Error::Timeout(after) => SessionError::Timeout(after),
            other => SessionError::NetworkFailure(other.to_string()),
        }
    }
}

impl From<RevealError> for SessionError {
    fn from(e: RevealError) -> Self {
        SessionError::InvalidConfiguration(e.to_string())
    }
}

/// Pacing and wording for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Delay between narrative characters.
    pub typewriter_interval: Duration,

    /// Delay between map markers.
    pub marker_interval: Duration,

    /// Transient message shown while waiting for the backend.
    pub status_text: String,

    /// Assistant message shown when a run fails.
    pub error_text: String,

    /// Replaces the transient message when a pending request is cancelled.
    pub cancelled_text: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            typewriter_interval: Duration::from_millis(DEFAULT_TYPEWRITER_MS),
            marker_interval: Duration::from_millis(DEFAULT_MARKER_MS),
            status_text: DEFAULT_STATUS_TEXT.to_string(),
            error_text: DEFAULT_ERROR_TEXT.to_string(),
            cancelled_text: DEFAULT_CANCELLED_TEXT.to_string(),
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `SITREP_TYPEWRITER_MS` and `SITREP_MARKER_MS`, falling back to defaults.
    pub fn from_env() -> Result<Self, SessionError> {
        let mut config = Self::default();
        if let Some(interval) = env_millis("SITREP_TYPEWRITER_MS")? {
            config.typewriter_interval = interval;
        }
        if let Some(interval) = env_millis("SITREP_MARKER_MS")? {
            config.marker_interval = interval;
        }
        Ok(config)
    }

    pub fn with_typewriter_interval(mut self, interval: Duration) -> Self {
        self.typewriter_interval = interval;
        self
    }

    pub fn with_marker_interval(mut self, interval: Duration) -> Self {
        self.marker_interval = interval;
        self
    }

    pub fn with_status_text(mut self, text: impl Into<String>) -> Self {
        self.status_text = text.into();
        self
    }

    pub fn with_error_text(mut self, text: impl Into<String>) -> Self {
        self.error_text = text.into();
        self
    }

    /// Reject intervals the reveal timers cannot run with.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.typewriter_interval.is_zero() {
            return Err(SessionError::InvalidConfiguration(
                "typewriter interval must be positive".to_string(),
            ));
        }
        if self.marker_interval.is_zero() {
            return Err(SessionError::InvalidConfiguration(
                "marker interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_millis(key: &str) -> Result<Option<Duration>, SessionError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|e| {
                SessionError::InvalidConfiguration(format!(
                    "{key} must be a whole number of milliseconds: {e}"
                ))
            }),
        Err(_) => Ok(None),
    }
}

/// Where a session is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    AwaitingResponse,
    Narrating,
    RevealingFindings,
    /// Passed through on the way back to `Idle` after an error.
    Failed,
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, SessionState::Idle)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::AwaitingResponse => "awaiting-response",
            SessionState::Narrating => "narrating",
            SessionState::RevealingFindings => "revealing-findings",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A revealed map marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    /// Index of the finding this marker belongs to in the findings store.
    pub finding: usize,
    pub name: String,
    pub coordinate: Coordinate,
}

/// What happened to a submitted query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// A run started with this generation.
    Accepted { generation: u64 },
    /// Blank input; nothing happened.
    Empty,
    /// A run is in progress; input is disabled until it finishes.
    Busy,
}

#[derive(Debug)]
enum SessionEvent {
    Response {
        generation: u64,
        result: Result<String, analyst::Error>,
    },
    NarrativeComplete {
        generation: u64,
    },
    MarkersComplete {
        generation: u64,
    },
}

impl SessionEvent {
    fn generation(&self) -> u64 {
        match self {
            SessionEvent::Response { generation, .. }
            | SessionEvent::NarrativeComplete { generation }
            | SessionEvent::MarkersComplete { generation } => *generation,
        }
    }
}

/// Coordinates one query/response cycle at a time.
pub struct ChatSession {
    backend: Rc<dyn ReportBackend>,
    resolver: Rc<dyn CoordinateResolver>,
    config: SessionConfig,
    state: SessionState,
    generation: u64,

    transcript: SharedStore<Message>,
    findings: SharedStore<Finding>,
    markers: SharedStore<Marker>,

    typewriter: TypewriterAnimator,
    marker_reveal: RevealSequencer<Marker>,
    request: Option<JoinHandle<()>>,
    pending_findings: Vec<Finding>,

    warnings: Vec<SessionError>,
    last_error: Option<SessionError>,

    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl ChatSession {
    /// Create an idle session.
    pub fn new(
        backend: Rc<dyn ReportBackend>,
        resolver: Rc<dyn CoordinateResolver>,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Self {
            backend,
            resolver,
            config,
            state: SessionState::Idle,
            generation: 0,
            transcript: SharedStore::new(),
            findings: SharedStore::new(),
            markers: SharedStore::new(),
            typewriter: TypewriterAnimator::new(),
            marker_reveal: RevealSequencer::new(),
            request: None,
            pending_findings: Vec::new(),
            warnings: Vec::new(),
            last_error: None,
            events_tx,
            events_rx,
        })
    }

    /// Submit an operator query.
    ///
    /// Appends the user message and the transient status message, then
    /// issues the request in the background.
    pub fn submit(&mut self, input: &str) -> Submission {
        let query = input.trim();
        if query.is_empty() {
            return Submission::Empty;
        }
        if !self.state.is_idle() {
            tracing::debug!(state = %self.state, "rejecting submission while busy");
            return Submission::Busy;
        }

        // Nothing should be running while idle; make sure of it before
        // the stores are touched.
        self.abort_run();
        self.generation += 1;
        let generation = self.generation;
        self.warnings.clear();
        self.last_error = None;

        self.transcript.append(Message::user(query));
        self.transcript
            .append(Message::status(self.config.status_text.clone()));
        self.transition(SessionState::AwaitingResponse);
        tracing::info!(generation, "report requested");

        let backend = Rc::clone(&self.backend);
        let tx = self.events_tx.clone();
        let message = query.to_string();
        self.request = Some(tokio::task::spawn_local(async move {
            let result = backend.submit(&message).await;
            let _ = tx.send(SessionEvent::Response { generation, result });
        }));

        Submission::Accepted { generation }
    }

    /// Abort the current run from any state.
    ///
    /// A pending request's status message is replaced with the cancellation
    /// note; a narrative being typed keeps the prefix already shown; markers
    /// already revealed stay on the map. Returns whether anything was
    /// running.
    pub fn cancel(&mut self) -> bool {
        if self.state.is_idle() {
            return false;
        }

        let was = self.state;
        self.abort_run();
        self.generation += 1;
        self.pending_findings.clear();

        if was == SessionState::AwaitingResponse {
            self.transcript
                .set_last(Message::status(self.config.cancelled_text.clone()));
        }

        tracing::info!(from = %was, "run cancelled");
        self.transition(SessionState::Idle);
        true
    }

    /// Wait for the next event from the request or a reveal timer and apply it.
    pub async fn process_next(&mut self) {
        if let Some(event) = self.events_rx.recv().await {
            self.handle_event(event);
        }
    }

    /// Drive the current run until the session is idle again.
    pub async fn run_until_idle(&mut self) {
        while !self.state.is_idle() {
            self.process_next().await;
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether a new query would be accepted.
    pub fn accepts_input(&self) -> bool {
        self.state.is_idle()
    }

    /// Generation of the most recent run.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The transcript of user, status and assistant messages.
    pub fn transcript(&self) -> &SharedStore<Message> {
        &self.transcript
    }

    /// All findings of the last completed narrative, in backend order.
    pub fn findings(&self) -> &SharedStore<Finding> {
        &self.findings
    }

    /// Markers revealed so far.
    pub fn markers(&self) -> &SharedStore<Marker> {
        &self.markers
    }

    /// Locally recovered problems from the current run.
    pub fn warnings(&self) -> &[SessionError] {
        &self.warnings
    }

    /// The error that ended the most recent failed run.
    pub fn last_error(&self) -> Option<&SessionError> {
        self.last_error.as_ref()
    }

    fn handle_event(&mut self, event: SessionEvent) {
        let generation = event.generation();
        if generation != self.generation {
            tracing::debug!(generation, live = self.generation, "ignoring stale event");
            return;
        }

        match (self.state, event) {
            (SessionState::AwaitingResponse, SessionEvent::Response { result, .. }) => {
                self.on_response(result)
            }
            (SessionState::Narrating, SessionEvent::NarrativeComplete { .. }) => {
                self.on_narrative_complete()
            }
            (SessionState::RevealingFindings, SessionEvent::MarkersComplete { .. }) => {
                self.on_markers_complete()
            }
            (state, event) => {
                tracing::debug!(%state, ?event, "ignoring event not expected in this state")
            }
        }
    }

    fn on_response(&mut self, result: Result<String, analyst::Error>) {
        self.request = None;

        let report = match result
            .map_err(SessionError::from)
            .and_then(|raw| ingest(&raw).map_err(SessionError::from))
        {
            Ok(report) => report,
            Err(e) => return self.fail(e),
        };

        let generation = self.generation;
        let transcript = self.transcript.clone();
        let tx = self.events_tx.clone();
        let started = self.typewriter.start(
            &report.narrative,
            self.config.typewriter_interval,
            move |prefix| transcript.set_last(Message::assistant(prefix)),
            move || {
                let _ = tx.send(SessionEvent::NarrativeComplete { generation });
            },
        );

        match started {
            Ok(_) => {
                tracing::info!(
                    generation,
                    findings = report.findings.len(),
                    "narrating report"
                );
                self.pending_findings = report.findings;
                self.transcript.set_last(Message::assistant(String::new()));
                self.transition(SessionState::Narrating);
            }
            Err(e) => self.fail(e.into()),
        }
    }

    fn on_narrative_complete(&mut self) {
        let findings = std::mem::take(&mut self.pending_findings);

        let mut resolved = Vec::with_capacity(findings.len());
        for (index, finding) in findings.iter().enumerate() {
            match self.resolver.resolve(&finding.name) {
                Some(coordinate) => resolved.push(Marker {
                    finding: index,
                    name: finding.name.clone(),
                    coordinate,
                }),
                None => {
                    tracing::warn!(name = %finding.name, index, "unresolvable location; marker skipped");
                    self.warnings
                        .push(SessionError::UnresolvableLocation(finding.name.clone()));
                }
            }
        }

        let generation = self.generation;
        let markers = resolved.len();
        self.findings.replace(findings);
        self.markers.replace(Vec::new());

        let tx = self.events_tx.clone();
        let started = self.marker_reveal.start(
            resolved,
            self.config.marker_interval,
            self.markers.appender(),
            move || {
                let _ = tx.send(SessionEvent::MarkersComplete { generation });
            },
        );

        match started {
            Ok(_) => {
                tracing::info!(generation, markers, "revealing markers");
                self.transition(SessionState::RevealingFindings);
            }
            Err(e) => {
                // The narrative is already on screen; just end the run.
                tracing::error!(error = %e, "could not start marker reveal");
                self.last_error = Some(e.into());
                self.transition(SessionState::Failed);
                self.transition(SessionState::Idle);
            }
        }
    }

    fn on_markers_complete(&mut self) {
        tracing::info!(generation = self.generation, "report fully revealed");
        self.transition(SessionState::Idle);
    }

    fn fail(&mut self, error: SessionError) {
        tracing::error!(generation = self.generation, %error, "run failed");
        self.request = None;
        self.transcript
            .set_last(Message::assistant(self.config.error_text.clone()));
        self.last_error = Some(error);
        self.transition(SessionState::Failed);
        self.transition(SessionState::Idle);
    }

    fn abort_run(&mut self) {
        if let Some(request) = self.request.take() {
            request.abort();
        }
        self.typewriter.cancel();
        self.marker_reveal.cancel();
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(from = %self.state, to = %next, "session transition");
        self.state = next;
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.abort_run();
    }
}
