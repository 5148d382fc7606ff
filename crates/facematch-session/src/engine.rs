//! Engine thread owning the session, the embedding source and the store.
//!
//! Every operation is a message to one dedicated OS thread, so reads and
//! mutations never interleave. Recognition additionally carries an
//! in-flight flag: a frame that arrives while a pass is running is
//! skipped rather than queued. The engine thread clears the flag when the
//! pass finishes, so a caller that gives up early cannot release it.

use crate::config::Config;
use crate::session::{RecognitionSession, SessionError, SessionState};
use crate::source::{EmbeddingSource, FrameFeed};
use facematch_core::{Frame, IdentityRecord, RecognitionResult};
use facematch_store::IdentityStore;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub state: SessionState,
    pub identities: usize,
    pub history: usize,
}

/// Counters from one run of [`run_recognition_loop`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub frames: usize,
    pub skipped: usize,
    pub failed: usize,
    pub matches: usize,
}

/// Messages sent from handles to the engine thread.
enum EngineRequest {
    Reload {
        reply: oneshot::Sender<Result<usize, SessionError>>,
    },
    Recognize {
        frame: Frame,
        in_flight: Arc<AtomicBool>,
        reply: oneshot::Sender<Result<Vec<RecognitionResult>, SessionError>>,
    },
    Register {
        name: String,
        frames: Vec<Frame>,
        reply: oneshot::Sender<Result<IdentityRecord, SessionError>>,
    },
    Remove {
        name: String,
        reply: oneshot::Sender<Result<bool, SessionError>>,
    },
    Search {
        prefix: String,
        reply: oneshot::Sender<Vec<String>>,
    },
    History {
        reply: oneshot::Sender<Vec<RecognitionResult>>,
    },
    Status {
        reply: oneshot::Sender<EngineStatus>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    in_flight: Arc<AtomicBool>,
}

/// Clears the in-flight flag if the request never reaches the engine.
/// Once the request is queued the engine thread owns the release.
struct UnsentGuard<'a> {
    flag: &'a AtomicBool,
    armed: bool,
}

impl Drop for UnsentGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.flag.store(false, Ordering::Release);
        }
    }
}

impl EngineHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Clear everything and rebuild from the store. Returns the identity count.
    pub async fn reload(&self) -> Result<usize, EngineError> {
        Ok(self.request(|reply| EngineRequest::Reload { reply }).await??)
    }

    /// Run one recognition pass over `frame`.
    ///
    /// Returns `Ok(None)` without touching the engine if another pass is
    /// still in flight.
    pub async fn recognize(
        &self,
        frame: Frame,
    ) -> Result<Option<Vec<RecognitionResult>>, EngineError> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            tracing::debug!(sequence = frame.sequence, "recognition pass in flight; skipping frame");
            return Ok(None);
        }
        let mut guard = UnsentGuard {
            flag: &self.in_flight,
            armed: true,
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Recognize {
                frame,
                in_flight: Arc::clone(&self.in_flight),
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        guard.armed = false;

        let results = reply_rx.await.map_err(|_| EngineError::ChannelClosed)??;
        Ok(Some(results))
    }

    /// Register `name` from candidate frames. Runs exclusively on the engine thread.
    pub async fn register(
        &self,
        name: &str,
        frames: Vec<Frame>,
    ) -> Result<IdentityRecord, EngineError> {
        let name = name.to_string();
        Ok(self
            .request(|reply| EngineRequest::Register { name, frames, reply })
            .await??)
    }

    pub async fn remove(&self, name: &str) -> Result<bool, EngineError> {
        let name = name.to_string();
        Ok(self.request(|reply| EngineRequest::Remove { name, reply }).await??)
    }

    pub async fn search(&self, prefix: &str) -> Result<Vec<String>, EngineError> {
        let prefix = prefix.to_string();
        self.request(|reply| EngineRequest::Search { prefix, reply }).await
    }

    pub async fn history(&self) -> Result<Vec<RecognitionResult>, EngineError> {
        self.request(|reply| EngineRequest::History { reply }).await
    }

    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        self.request(|reply| EngineRequest::Status { reply }).await
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Loads the models and the registered identities synchronously first,
/// so a missing model or unreadable store fails here rather than on the
/// first request.
pub fn spawn_engine<S>(
    mut source: S,
    store: Box<dyn IdentityStore>,
    config: &Config,
) -> Result<EngineHandle, EngineError>
where
    S: EmbeddingSource + 'static,
{
    let mut session = RecognitionSession::new(config.session_settings());
    session.reload(&mut source, store.as_ref())?;
    tracing::info!(identities = session.len(), "engine loaded identities");

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("facematch-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                handle_request(&mut session, &mut source, store.as_ref(), req);
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle {
        tx,
        in_flight: Arc::new(AtomicBool::new(false)),
    })
}

fn handle_request(
    session: &mut RecognitionSession,
    source: &mut dyn EmbeddingSource,
    store: &dyn IdentityStore,
    req: EngineRequest,
) {
    match req {
        EngineRequest::Reload { reply } => {
            session.clear();
            let result = session.reload(source, store).map(|()| session.len());
            let _ = reply.send(result);
        }
        EngineRequest::Recognize {
            frame,
            in_flight,
            reply,
        } => {
            let result = session.recognize_frame(source, &frame);
            in_flight.store(false, Ordering::Release);
            let _ = reply.send(result);
        }
        EngineRequest::Register {
            name,
            frames,
            reply,
        } => {
            let _ = reply.send(session.register(source, store, &name, &frames));
        }
        EngineRequest::Remove { name, reply } => {
            let _ = reply.send(session.remove(store, &name));
        }
        EngineRequest::Search { prefix, reply } => {
            let _ = reply.send(session.search(&prefix));
        }
        EngineRequest::History { reply } => {
            let _ = reply.send(session.history().cloned().collect());
        }
        EngineRequest::Status { reply } => {
            let _ = reply.send(EngineStatus {
                state: session.state(),
                identities: session.len(),
                history: session.history().count(),
            });
        }
    }
}

/// Feed frames to the engine once per `interval` until the feed runs dry
/// or `stop` flips to `true` (or its sender goes away).
///
/// Stopping drops any pass still in flight. Ticks that land while a pass
/// is running are skipped, not queued.
pub async fn run_recognition_loop<F: FrameFeed>(
    handle: &EngineHandle,
    mut feed: F,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) -> Result<LoopSummary, EngineError> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut summary = LoopSummary::default();

    loop {
        if *stop.borrow() {
            break;
        }

        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        let Some(frame) = feed.next_frame() else {
            break;
        };
        summary.frames += 1;

        tokio::select! {
            result = handle.recognize(frame) => match result {
                Ok(Some(results)) => summary.matches += results.len(),
                Ok(None) => summary.skipped += 1,
                Err(EngineError::ChannelClosed) => return Err(EngineError::ChannelClosed),
                Err(e) => {
                    tracing::warn!(error = %e, "recognition pass failed");
                    summary.failed += 1;
                }
            },
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
                summary.skipped += 1;
            }
        }
    }

    tracing::info!(
        frames = summary.frames,
        skipped = summary.skipped,
        matches = summary.matches,
        "recognition loop stopped"
    );
    Ok(summary)
}
