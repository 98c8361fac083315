use crate::registry::{ApiVersion, PatchBody, Registry, TransceiverKind};
use serde::{Deserialize, Serialize};

/// One `{id, params}` entry of a bulk PATCH request body.
#[derive(Debug, Deserialize)]
pub struct BulkEntry {
    pub id: String,
    pub params: PatchBody,
}

#[derive(Debug, Serialize)]
pub struct BulkResult {
    pub id: String,
    pub code: u16,
}

/// Fans a bulk PATCH out to [`Registry::patch_transceiver`] per entry. Entries are not
/// atomic with respect to each other — a failure partway through leaves earlier entries'
/// mutations in place, matching the non-atomic bulk semantics this spec preserves.
pub struct BulkDispatcher<'a> {
    registry: &'a Registry,
}

impl<'a> BulkDispatcher<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    pub fn dispatch(
        &self,
        api_version: ApiVersion,
        kind: TransceiverKind,
        entries: Vec<BulkEntry>,
    ) -> Vec<BulkResult> {
        entries
            .into_iter()
            .map(|entry| {
                let code = match self
                    .registry
                    .patch_transceiver(api_version, kind, &entry.id, entry.params)
                {
                    Ok(outcome) => outcome.status,
                    Err(e) => e.kind.http_status(),
                };
                BulkResult { id: entry.id, code }
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::clock::FakeClock;
    use crate::registry::Transport;
    use crate::transceiver::{ReceiverState, SenderState};
    use std::sync::Arc;

    #[test]
    fn partial_failure_does_not_block_other_entries() {
        let registry = Registry::new(Arc::new(FakeClock::new((0, 0))));
        registry
            .add_sender("s-1", Transport::Rtp, SenderState::new(1, false, false))
            .unwrap();
        registry
            .add_receiver("r-1", Transport::Rtp, ReceiverState::new(1, false, false))
            .unwrap();

        let dispatcher = BulkDispatcher::new(&registry);
        let results = dispatcher.dispatch(
            ApiVersion::V1_0,
            TransceiverKind::Sender,
            vec![
                BulkEntry {
                    id: "s-1".to_owned(),
                    params: PatchBody {
                        transport_file: None,
                        transport_params: None,
                        sender_id: None,
                        receiver_id: None,
                        master_enable: Some(true),
                        activation: None,
                    },
                },
                BulkEntry {
                    id: "does-not-exist".to_owned(),
                    params: PatchBody {
                        transport_file: None,
                        transport_params: None,
                        sender_id: None,
                        receiver_id: None,
                        master_enable: None,
                        activation: None,
                    },
                },
            ],
        );

        assert_eq!(results[0].code, 200);
        assert_eq!(results[1].code, 404);
    }
}
