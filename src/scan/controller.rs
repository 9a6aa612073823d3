//! Scan lifecycle: the sequential observation loop and its serialized
//! persistence writer.
//!
//! The camera callback never touches session state; it only enqueues
//! observations. One loop per controller drains the queue in delivery
//! order, classifies against the in-memory working copy, and hands every
//! newly found code to a single writer task so session upserts can never
//! interleave and drop an update.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::db::SessionStore;
use crate::models::Session;

use super::config::ScanConfig;
use super::feedback::{FeedbackDebouncer, FeedbackPulse};
use super::reconciler::{Classification, Observation, Reconciler};

/// The camera pipeline has at most one callback in flight, so depth only
/// covers scheduler jitter. A full queue drops the frame; the next frame
/// re-observes the same code.
const OBSERVATION_QUEUE_DEPTH: usize = 16;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("session {0} not found")]
    SessionNotFound(String),
    #[error("scan already active")]
    AlreadyActive,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Outbound stream consumed by the host UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ScanEvent {
    Feedback(FeedbackPulse),
    Progress { found: usize, expected: usize },
    /// A found code failed to persist. The in-memory session already
    /// advanced and scanning continues; durability for this one item is at
    /// risk until the next successful write.
    PersistenceWarning { code: String },
}

pub struct ScanController {
    config: ScanConfig,
    scan_handle: Option<JoinHandle<()>>,
    writer_handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    observations: Option<mpsc::Sender<Observation>>,
}

impl Default for ScanController {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanController {
    pub fn new() -> Self {
        Self::with_config(ScanConfig::default())
    }

    pub fn with_config(config: ScanConfig) -> Self {
        Self {
            config,
            scan_handle: None,
            writer_handle: None,
            cancel_token: None,
            observations: None,
        }
    }

    /// Loads the session and spawns the scan loop plus its persistence
    /// writer. Fails if the session is missing or a scan is already active.
    pub async fn start(
        &mut self,
        session_id: &str,
        store: Arc<dyn SessionStore>,
        events: mpsc::UnboundedSender<ScanEvent>,
    ) -> Result<(), ScanError> {
        if self.scan_handle.is_some() {
            return Err(ScanError::AlreadyActive);
        }

        let session = store
            .get(session_id)
            .await?
            .ok_or_else(|| ScanError::SessionNotFound(session_id.to_string()))?;

        info!(
            "starting scan for session {} ({}/{} codes found)",
            session.id,
            session.found_codes.len(),
            session.expected_codes.len()
        );

        let cancel_token = CancellationToken::new();
        let (obs_tx, obs_rx) = mpsc::channel(OBSERVATION_QUEUE_DEPTH);
        let (write_tx, write_rx) = mpsc::unbounded_channel();

        let writer_handle = tokio::spawn(persist_loop(store, write_rx, events.clone()));
        let scan_handle = tokio::spawn(scan_loop(
            Reconciler::new(session),
            FeedbackDebouncer::from_config(&self.config),
            obs_rx,
            write_tx,
            events,
            cancel_token.clone(),
        ));

        self.scan_handle = Some(scan_handle);
        self.writer_handle = Some(writer_handle);
        self.cancel_token = Some(cancel_token);
        self.observations = Some(obs_tx);
        Ok(())
    }

    /// Enqueues a decoded payload, stamped now. Safe to call from the
    /// camera callback; returns false if the frame was dropped.
    pub fn observe(&self, raw_text: &str) -> bool {
        let Some(sender) = &self.observations else {
            return false;
        };
        match sender.try_send(Observation::new(raw_text, Instant::now())) {
            Ok(()) => true,
            Err(err) => {
                debug!("dropping observation: {err}");
                false
            }
        }
    }

    /// Sender for callers that stamp observations with their own pipeline
    /// timestamps.
    pub fn observation_sender(&self) -> Option<mpsc::Sender<Observation>> {
        self.observations.clone()
    }

    /// Stops the loop, flushes the write queue, and joins both tasks.
    pub async fn stop(&mut self) -> Result<()> {
        self.observations = None;
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.scan_handle.take() {
            handle.await.context("scan loop task failed to join")?;
        }
        // The scan loop owned the write sender; the writer drains whatever
        // is queued and exits.
        if let Some(handle) = self.writer_handle.take() {
            handle.await.context("persistence writer failed to join")?;
        }
        Ok(())
    }
}

async fn scan_loop(
    mut reconciler: Reconciler,
    mut debouncer: FeedbackDebouncer,
    mut observations: mpsc::Receiver<Observation>,
    writes: mpsc::UnboundedSender<Session>,
    events: mpsc::UnboundedSender<ScanEvent>,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("scan loop shutting down");
                break;
            }
            maybe = observations.recv() => {
                let Some(observation) = maybe else { break };
                let classification = reconciler.classify(&observation);

                if let Classification::NewlyFound { code, .. } = &classification {
                    debug!("new code found: {code}");
                    // Exactly one write per not-found to found transition.
                    if writes.send(reconciler.session().clone()).is_err() {
                        warn!("persistence writer gone; new finds are not durable");
                    }
                    let _ = events.send(ScanEvent::Progress {
                        found: reconciler.session().found_codes.len(),
                        expected: reconciler.session().expected_codes.len(),
                    });
                }

                if let Some(pulse) = debouncer.signal(&classification, observation.observed_at) {
                    let _ = events.send(ScanEvent::Feedback(pulse));
                }
            }
        }
    }
}

async fn persist_loop(
    store: Arc<dyn SessionStore>,
    mut writes: mpsc::UnboundedReceiver<Session>,
    events: mpsc::UnboundedSender<ScanEvent>,
) {
    while let Some(session) = writes.recv().await {
        if let Err(err) = store.upsert(&session).await {
            // In-memory state stays authoritative; the scan keeps going.
            warn!("failed to persist session {}: {err:#}", session.id);
            let code = session.found_codes.last().cloned().unwrap_or_default();
            let _ = events.send(ScanEvent::PersistenceWarning { code });
        }
    }
}
