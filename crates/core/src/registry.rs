use crate::activator::{Activator, ActivationRecord, ActivationRequest, ActivationStatus, Target};
use crate::clock::Clock;
use crate::error::{ConnectionError, Result};
use crate::transceiver::{LegPatch, ReceiverState, SenderState};
use crate::transport_file::{TransportFileManager, TransportFileRequest};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// The three transports the core knows about. `Rtp` is the only one visible under
/// API version `v1.0`; `Mqtt`/`Websocket` additionally require `v1.1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Rtp,
    Mqtt,
    Websocket,
}

impl Transport {
    pub fn urn(self) -> &'static str {
        match self {
            Transport::Rtp => "urn:x-nmos:transport:rtp",
            Transport::Mqtt => "urn:x-nmos:transport:mqtt",
            Transport::Websocket => "urn:x-nmos:transport:websocket",
        }
    }

    fn is_visible_under(self, api_version: ApiVersion) -> bool {
        match api_version {
            ApiVersion::V1_0 => matches!(self, Transport::Rtp),
            ApiVersion::V1_1 => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVersion {
    V1_0,
    V1_1,
}

impl ApiVersion {
    pub fn as_path_segment(self) -> &'static str {
        match self {
            ApiVersion::V1_0 => "v1.0",
            ApiVersion::V1_1 => "v1.1",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransceiverKind {
    Sender,
    Receiver,
}

/// Thin `Target` adapter locking a shared state handle for the duration of one call.
/// Lets the same `Arc<Mutex<_>>` be reachable both directly (for GET/PATCH) and through
/// an `Activator`'s target list (for scheduled/immediate activation).
struct Shared<T>(Arc<Mutex<T>>);

impl<T: Target> Target for Shared<T> {
    fn lock(&mut self) {
        self.0.lock().lock()
    }

    fn unlock(&mut self) {
        self.0.lock().unlock()
    }

    fn activate(&mut self) -> Result<()> {
        self.0.lock().activate()
    }
}

struct SenderEntry {
    state: Arc<Mutex<SenderState>>,
    activator: Arc<Activator>,
    transport: Transport,
}

struct ReceiverEntry {
    state: Arc<Mutex<ReceiverState>>,
    transport_file: Arc<Mutex<TransportFileManager>>,
    activator: Arc<Activator>,
    transport: Transport,
}

/// In-memory id → `{TransceiverState, Activator, optional TransportFileManager}` map.
///
/// One `parking_lot::Mutex` guards each entry's state (via [`Shared`]); the maps
/// themselves are guarded by a coarser lock since registration is rare compared to
/// per-transceiver PATCH traffic.
pub struct Registry {
    senders: Mutex<BTreeMap<String, SenderEntry>>,
    receivers: Mutex<BTreeMap<String, ReceiverEntry>>,
    clock: Arc<dyn Clock>,
}

impl Registry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            senders: Mutex::new(BTreeMap::new()),
            receivers: Mutex::new(BTreeMap::new()),
            clock,
        }
    }

    pub fn add_sender(&self, id: impl Into<String>, transport: Transport, state: SenderState) -> Result<()> {
        let id = id.into();
        let mut senders = self.senders.lock();
        if senders.contains_key(&id) {
            return Err(ConnectionError::duplicate_registration(&id));
        }

        let state = Arc::new(Mutex::new(state));
        let activator = Arc::new(Activator::new(
            vec![Box::new(Shared(state.clone())) as Box<dyn Target>],
            self.clock.clone(),
        ));

        senders.insert(
            id,
            SenderEntry {
                state,
                activator,
                transport,
            },
        );
        Ok(())
    }

    pub fn add_receiver(
        &self,
        id: impl Into<String>,
        transport: Transport,
        state: ReceiverState,
    ) -> Result<()> {
        let id = id.into();
        let mut receivers = self.receivers.lock();
        if receivers.contains_key(&id) {
            return Err(ConnectionError::duplicate_registration(&id));
        }

        let state = Arc::new(Mutex::new(state));
        let transport_file = Arc::new(Mutex::new(TransportFileManager::new(state.clone())));
        let activator = Arc::new(Activator::new(
            vec![
                Box::new(Shared(transport_file.clone())) as Box<dyn Target>,
                Box::new(Shared(state.clone())) as Box<dyn Target>,
            ],
            self.clock.clone(),
        ));

        receivers.insert(
            id,
            ReceiverEntry {
                state,
                transport_file,
                activator,
                transport,
            },
        );
        Ok(())
    }

    pub fn remove_sender(&self, id: &str) -> Result<()> {
        self.senders
            .lock()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ConnectionError::not_found(format!("sender '{id}' not found")))
    }

    pub fn remove_receiver(&self, id: &str) -> Result<()> {
        self.receivers
            .lock()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ConnectionError::not_found(format!("receiver '{id}' not found")))
    }

    pub fn sender_ids(&self) -> Vec<String> {
        self.senders.lock().keys().cloned().collect()
    }

    pub fn receiver_ids(&self) -> Vec<String> {
        self.receivers.lock().keys().cloned().collect()
    }

    fn check_version(&self, transport: Transport, api_version: ApiVersion) -> Result<()> {
        if transport.is_visible_under(api_version) {
            return Ok(());
        }

        Err(ConnectionError::not_supported_for_version(
            format!("transport '{transport:?}' is not exposed under {}", api_version.as_path_segment()),
            ApiVersion::V1_1.as_path_segment(),
        ))
    }

    pub fn sender_transport(&self, api_version: ApiVersion, id: &str) -> Result<Transport> {
        let senders = self.senders.lock();
        let entry = senders
            .get(id)
            .ok_or_else(|| ConnectionError::not_found(format!("sender '{id}' not found")))?;
        self.check_version(entry.transport, api_version)?;
        Ok(entry.transport)
    }

    pub fn receiver_transport(&self, api_version: ApiVersion, id: &str) -> Result<Transport> {
        let receivers = self.receivers.lock();
        let entry = receivers
            .get(id)
            .ok_or_else(|| ConnectionError::not_found(format!("receiver '{id}' not found")))?;
        self.check_version(entry.transport, api_version)?;
        Ok(entry.transport)
    }

    pub fn with_sender<R>(&self, id: &str, f: impl FnOnce(&mut SenderState) -> R) -> Result<R> {
        let senders = self.senders.lock();
        let entry = senders
            .get(id)
            .ok_or_else(|| ConnectionError::not_found(format!("sender '{id}' not found")))?;
        Ok(f(&mut entry.state.lock()))
    }

    pub fn with_receiver<R>(&self, id: &str, f: impl FnOnce(&mut ReceiverState) -> R) -> Result<R> {
        let receivers = self.receivers.lock();
        let entry = receivers
            .get(id)
            .ok_or_else(|| ConnectionError::not_found(format!("receiver '{id}' not found")))?;
        Ok(f(&mut entry.state.lock()))
    }

    /// `(last, active)` activation records for a sender — `last` is the pending/just
    /// accepted request (surfaced from GET `staged/`), `active` describes what's
    /// currently live (surfaced from GET `active/`).
    pub fn sender_activation(&self, id: &str) -> Result<(Option<ActivationRecord>, Option<ActivationRecord>)> {
        let senders = self.senders.lock();
        let entry = senders
            .get(id)
            .ok_or_else(|| ConnectionError::not_found(format!("sender '{id}' not found")))?;
        Ok((entry.activator.last(), entry.activator.active()))
    }

    /// `(last, active)` activation records for a receiver, same shape as
    /// [`Registry::sender_activation`].
    pub fn receiver_activation(&self, id: &str) -> Result<(Option<ActivationRecord>, Option<ActivationRecord>)> {
        let receivers = self.receivers.lock();
        let entry = receivers
            .get(id)
            .ok_or_else(|| ConnectionError::not_found(format!("receiver '{id}' not found")))?;
        Ok((entry.activator.last(), entry.activator.active()))
    }

    /// `(staged, active)` raw transport-file requests for a receiver's
    /// [`TransportFileManager`], surfaced alongside GET `staged/`/`active/` per spec's
    /// "+ transport_file for receivers" column.
    pub fn receiver_transport_file(&self, id: &str) -> Result<(TransportFileRequest, TransportFileRequest)> {
        let receivers = self.receivers.lock();
        let entry = receivers
            .get(id)
            .ok_or_else(|| ConnectionError::not_found(format!("receiver '{id}' not found")))?;
        let manager = entry.transport_file.lock();
        Ok((manager.staged_request().clone(), manager.active_request().clone()))
    }

    /// Drives the full 7-step transactional PATCH sequence for one transceiver. Each
    /// step's error is returned immediately; earlier successful steps remain staged.
    pub fn patch_transceiver(
        &self,
        api_version: ApiVersion,
        kind: TransceiverKind,
        id: &str,
        body: PatchBody,
    ) -> Result<PatchOutcome> {
        match kind {
            TransceiverKind::Sender => self.patch_sender(api_version, id, body),
            TransceiverKind::Receiver => self.patch_receiver(api_version, id, body),
        }
    }

    fn patch_sender(&self, api_version: ApiVersion, id: &str, body: PatchBody) -> Result<PatchOutcome> {
        self.sender_transport(api_version, id)?;

        if let Some(params) = body.transport_params {
            self.with_sender(id, |s| s.patch(params))??;
        }
        if let Some(receiver_id) = body.receiver_id {
            self.with_sender(id, |s| s.set_subscription_id(receiver_id))??;
        }
        if let Some(enable) = body.master_enable {
            self.with_sender(id, |s| s.set_master_enable(enable))??;
        }

        self.run_activation(id, body.activation, ActivatorRef::Sender)
    }

    fn patch_receiver(&self, api_version: ApiVersion, id: &str, body: PatchBody) -> Result<PatchOutcome> {
        self.receiver_transport(api_version, id)?;

        if let Some(file) = body.transport_file {
            let receivers = self.receivers.lock();
            let entry = receivers
                .get(id)
                .ok_or_else(|| ConnectionError::not_found(format!("receiver '{id}' not found")))?;
            entry.transport_file.lock().update(file)?;
        }
        if let Some(params) = body.transport_params {
            self.with_receiver(id, |s| s.patch(params))??;
        }
        if let Some(sender_id) = body.sender_id {
            self.with_receiver(id, |s| s.set_subscription_id(sender_id))??;
        }
        if let Some(enable) = body.master_enable {
            self.with_receiver(id, |s| s.set_master_enable(enable))??;
        }

        self.run_activation(id, body.activation, ActivatorRef::Receiver)
    }

    fn run_activation(
        &self,
        id: &str,
        activation: Option<ActivationRequest>,
        which: ActivatorRef,
    ) -> Result<PatchOutcome> {
        let Some(activation) = activation else {
            return Ok(PatchOutcome { status: 200, record: None });
        };

        let activator = match which {
            ActivatorRef::Sender => {
                let senders = self.senders.lock();
                senders
                    .get(id)
                    .ok_or_else(|| ConnectionError::not_found(format!("sender '{id}' not found")))?
                    .activator
                    .clone()
            }
            ActivatorRef::Receiver => {
                let receivers = self.receivers.lock();
                receivers
                    .get(id)
                    .ok_or_else(|| ConnectionError::not_found(format!("receiver '{id}' not found")))?
                    .activator
                    .clone()
            }
        };

        let (status, record) = activator.parse(activation)?;
        let code = match status {
            ActivationStatus::Immediate | ActivationStatus::Cancelled => 200,
            ActivationStatus::Scheduled => 202,
        };
        Ok(PatchOutcome { status: code, record })
    }
}

enum ActivatorRef {
    Sender,
    Receiver,
}

/// The body of a `.../staged` PATCH, already validated against the external schema by
/// the router layer; only the fields this engine acts on are modelled here.
#[derive(Debug, Deserialize)]
pub struct PatchBody {
    pub transport_file: Option<TransportFileRequest>,
    pub transport_params: Option<Vec<LegPatch>>,
    pub sender_id: Option<Option<String>>,
    pub receiver_id: Option<Option<String>>,
    pub master_enable: Option<bool>,
    pub activation: Option<ActivationRequest>,
}

#[derive(Debug, Serialize)]
pub struct PatchOutcome {
    pub status: u16,
    pub record: Option<crate::activator::ActivationRecord>,
}
