//! Background redaction with last-request-wins semantics.
//!
//! A session runs at most one meaningful request at a time. Submitting a new image
//! cancels the previous request's token and bumps the request id; anything the
//! old request still delivers is recognised as stale and dropped in
//! [`RedactionSession::accept`].

use std::{
    sync::{Arc, mpsc},
    time::{Duration, Instant},
};

use image::DynamicImage;
use log::{error, info};

use crate::{
    cancel::CancelToken,
    error::RedactError,
    pipeline::{RedactionPipeline, RedactionReport},
};

/// Result delivered by a background request.
pub enum SessionMessage {
    Finished {
        request_id: u64,
        image_id: String,
        redacted: DynamicImage,
        report: RedactionReport,
    },
    Failed {
        request_id: u64,
        image_id: String,
        error: RedactError,
    },
}

impl SessionMessage {
    pub fn request_id(&self) -> u64 {
        match self {
            SessionMessage::Finished { request_id, .. } | SessionMessage::Failed { request_id, .. } => {
                *request_id
            }
        }
    }
}

/// A committed result for the current request.
#[derive(Debug)]
pub struct SessionOutcome {
    pub image_id: String,
    pub redacted: DynamicImage,
    pub report: RedactionReport,
}

pub struct RedactionSession {
    pipeline: Arc<RedactionPipeline>,
    tx: mpsc::Sender<SessionMessage>,
    rx: mpsc::Receiver<SessionMessage>,
    counter: u64,
    current: Option<u64>,
    cancel: Option<CancelToken>,
}

impl RedactionSession {
    pub fn new(pipeline: Arc<RedactionPipeline>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            pipeline,
            tx,
            rx,
            counter: 0,
            current: None,
            cancel: None,
        }
    }

    /// Start redacting `image`, superseding any request still in flight.
    pub fn submit(&mut self, image_id: impl Into<String>, image: DynamicImage) -> u64 {
        self.invalidate();
        self.counter += 1;
        let request_id = self.counter;
        let image_id = image_id.into();
        let token = CancelToken::new();
        self.current = Some(request_id);
        self.cancel = Some(token.clone());

        info!("Launching redaction request {request_id} for {image_id}");
        let pipeline = self.pipeline.clone();
        let tx = self.tx.clone();
        rayon::spawn(move || {
            let payload = match pipeline.redact_cancellable(&image, &token) {
                Ok(Some((redacted, report))) => SessionMessage::Finished {
                    request_id,
                    image_id,
                    redacted,
                    report,
                },
                Ok(None) => {
                    info!("Redaction request {request_id} abandoned");
                    return;
                }
                Err(error) => SessionMessage::Failed {
                    request_id,
                    image_id,
                    error,
                },
            };
            if tx.send(payload).is_err() {
                error!("Session dropped result of redaction request {request_id}");
            }
        });
        request_id
    }

    /// Abandon the current request, e.g. because the consuming view went away.
    pub fn cancel(&mut self) {
        self.invalidate();
    }

    fn invalidate(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        self.current = None;
    }

    pub fn current_request(&self) -> Option<u64> {
        self.current
    }

    pub fn is_busy(&self) -> bool {
        self.current.is_some()
    }

    /// Commit `message` if it belongs to the current request; stale messages are
    /// logged and dropped.
    pub fn accept(&mut self, message: SessionMessage) -> Option<Result<SessionOutcome, RedactError>> {
        if Some(message.request_id()) != self.current {
            match &message {
                SessionMessage::Finished { image_id, .. } => {
                    info!("Ignoring stale redaction result for {image_id}")
                }
                SessionMessage::Failed { error, .. } => {
                    info!("Ignoring stale redaction error: {error}")
                }
            }
            return None;
        }

        self.current = None;
        self.cancel = None;
        Some(match message {
            SessionMessage::Finished {
                image_id,
                redacted,
                report,
                ..
            } => Ok(SessionOutcome {
                image_id,
                redacted,
                report,
            }),
            SessionMessage::Failed { error, .. } => Err(error),
        })
    }

    /// Non-blocking poll for the current request's result.
    pub fn try_recv(&mut self) -> Option<Result<SessionOutcome, RedactError>> {
        while let Ok(message) = self.rx.try_recv() {
            if let Some(result) = self.accept(message) {
                return Some(result);
            }
        }
        None
    }

    /// Wait up to `timeout` for the current request's result.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<Result<SessionOutcome, RedactError>> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            let message = self.rx.recv_timeout(remaining).ok()?;
            if let Some(result) = self.accept(message) {
                return Some(result);
            }
        }
    }
}
