use crate::error::{ConnectionError, Result};
use crate::transceiver::ReceiverState;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;

/// The raw `{type, data}` body a PATCH's `transport_file` field carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportFileRequest {
    #[serde(rename = "type")]
    pub content_type: String,
    pub data: String,
}

const SDP_CONTENT_TYPE: &str = "application/sdp";

struct Slot {
    request: TransportFileRequest,
    sdp: String,
    sources: Vec<sdp::Source>,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            request: TransportFileRequest {
                content_type: SDP_CONTENT_TYPE.to_owned(),
                data: String::new(),
            },
            sdp: String::new(),
            sources: Vec::new(),
        }
    }
}

/// Per-receiver shim: accepts an SDP transport file, parses it, and writes the first
/// source's values onto leg 0 of the owning receiver's staged parameters, while tracking
/// its own staged/active copies of the raw file and parsed sources.
///
/// Holds the [`ReceiverState`] it feeds so step 6 (commit the manager's own state) and
/// step 7 (commit the receiver's leg) can be rolled back together if step 7 fails.
pub struct TransportFileManager {
    receiver: Arc<Mutex<ReceiverState>>,
    staged: Slot,
    active: Slot,
    stage_locked: bool,
    last_updated: Option<SystemTime>,
}

impl TransportFileManager {
    pub fn new(receiver: Arc<Mutex<ReceiverState>>) -> Self {
        Self {
            receiver,
            staged: Slot::default(),
            active: Slot::default(),
            stage_locked: false,
            last_updated: None,
        }
    }

    pub fn staged_request(&self) -> &TransportFileRequest {
        &self.staged.request
    }

    pub fn active_request(&self) -> &TransportFileRequest {
        &self.active.request
    }

    /// Parses `request.data` and, if it yields at least one source, atomically commits
    /// both this manager's staged slot and leg 0 of the receiver's staged parameters. If
    /// writing the receiver's leg fails (e.g. the receiver itself is locked), this
    /// manager's own staged slot is rolled back to its pre-call value.
    pub fn update(&mut self, request: TransportFileRequest) -> Result<()> {
        if self.stage_locked {
            return Err(ConnectionError::staged_locked());
        }
        if request.content_type != SDP_CONTENT_TYPE {
            return Err(ConnectionError::validation(format!(
                "cannot handle transport files of type {}",
                request.content_type
            )));
        }

        let sources = sdp::parse(&request.data)
            .map_err(|e| ConnectionError::validation(format!("could not parse SDP file: {e}")))?;
        if sources.is_empty() {
            return Err(ConnectionError::validation(
                "could not extract sources from SDP file",
            ));
        }

        let previous = std::mem::replace(
            &mut self.staged,
            Slot {
                sdp: request.data.clone(),
                sources: sources.clone(),
                request,
            },
        );

        if let Err(e) = self.receiver.lock().apply_sdp_source(&sources[0]) {
            self.staged = previous;
            return Err(e);
        }

        self.last_updated = Some(SystemTime::now());
        log::debug!("transport file staged, {} source(s) parsed", sources.len());
        Ok(())
    }
}

impl crate::activator::Target for TransportFileManager {
    fn lock(&mut self) {
        self.stage_locked = true;
    }

    fn unlock(&mut self) {
        self.stage_locked = false;
    }

    fn activate(&mut self) -> Result<()> {
        self.active = Slot {
            request: self.staged.request.clone(),
            sdp: self.staged.sdp.clone(),
            sources: self.staged.sources.clone(),
        };
        self.stage_locked = false;
        Ok(())
    }
}
