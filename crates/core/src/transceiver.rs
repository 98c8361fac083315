use crate::error::{ConnectionError, Result};
use crate::params::{
    ActiveReceiverLeg, ActiveSenderLeg, Constraint, LegConstraints, StagedReceiverLeg, StagedSenderLeg,
};
use crate::resolve::{resolve_receiver_leg, resolve_sender_leg, AddressSelector, DefaultAddressSelector};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use serde_json::json;
use serde_json::Value as Json;
use std::net::IpAddr;

/// Driver hook invoked once `active` has been updated, before the call returns success
/// to the caller. A failure here rolls `active` back to its previous value.
pub type ActivateCallback = Box<dyn Fn() -> std::result::Result<(), String> + Send + Sync>;

fn validate_uuid(id: &str) -> Result<()> {
    uuid::Uuid::parse_str(id)
        .map(|_| ())
        .map_err(|_| ConnectionError::validation(format!("'{id}' is not a valid UUID")))
}

/// Sparse patch applied to one leg: only keys already present in the staged leg may be
/// supplied, and values serialize to the same wire shape `Value<T>` expects (`"auto"` or
/// a concrete JSON value).
pub type LegPatch = serde_json::Map<String, Json>;

/// The two-slot (`staged`/`active`) store for one sender, plus its lock flag, per-leg
/// constraints and the driver's activation callback.
///
/// All mutating methods honour `stage_locked`: while set, every method that would touch
/// `staged` fails with [`ConnectionError::staged_locked`]. Only the owning [`Activator`]
/// calls [`SenderState::lock`]/[`SenderState::unlock`].
///
/// [`Activator`]: crate::activator::Activator
pub struct SenderState {
    staged: Vec<StagedSenderLeg>,
    active: Vec<ActiveSenderLeg>,
    constraints: Vec<LegConstraints>,
    stage_locked: bool,
    master_enable: bool,
    receiver_id: Option<String>,
    enable_fec: bool,
    enable_rtcp: bool,
    activate_callback: Option<ActivateCallback>,
    source_selector: Box<dyn AddressSelector>,
    destination_selector: Box<dyn AddressSelector>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderStagedView {
    pub transport_params: Vec<StagedSenderLeg>,
    pub master_enable: bool,
    pub receiver_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderActiveView {
    pub transport_params: Vec<ActiveSenderLeg>,
    pub master_enable: bool,
    pub receiver_id: Option<String>,
}

impl SenderState {
    pub fn new(legs: usize, enable_fec: bool, enable_rtcp: bool) -> Self {
        let mut state = Self {
            staged: (0..legs).map(|_| StagedSenderLeg::default_staged()).collect(),
            active: Vec::new(),
            constraints: (0..legs).map(|_| LegConstraints::new()).collect(),
            stage_locked: false,
            master_enable: false,
            receiver_id: None,
            enable_fec,
            enable_rtcp,
            activate_callback: None,
            source_selector: Box::new(DefaultAddressSelector),
            destination_selector: Box::new(DefaultAddressSelector),
        };
        state.active = state.resolve_all();
        state
    }

    pub fn with_activate_callback(mut self, cb: ActivateCallback) -> Self {
        self.activate_callback = Some(cb);
        self
    }

    pub fn with_selectors(
        mut self,
        source: Box<dyn AddressSelector>,
        destination: Box<dyn AddressSelector>,
    ) -> Self {
        self.source_selector = source;
        self.destination_selector = destination;
        self
    }

    fn resolve_all(&self) -> Vec<ActiveSenderLeg> {
        self.staged
            .iter()
            .zip(&self.constraints)
            .map(|(leg, constraints)| {
                resolve_sender_leg(
                    leg,
                    constraints,
                    self.source_selector.as_ref(),
                    self.destination_selector.as_ref(),
                )
            })
            .collect()
    }

    pub fn get_staged(&self) -> SenderStagedView {
        SenderStagedView {
            transport_params: self.staged.clone(),
            master_enable: self.master_enable,
            receiver_id: self.receiver_id.clone(),
        }
    }

    pub fn get_active(&self) -> SenderActiveView {
        SenderActiveView {
            transport_params: self.active.clone(),
            master_enable: self.master_enable,
            receiver_id: self.receiver_id.clone(),
        }
    }

    pub fn get_constraints(&self) -> Vec<LegConstraints> {
        self.constraints
            .iter()
            .map(|leg| strip_internal(leg, self.enable_fec, self.enable_rtcp))
            .collect()
    }

    /// A JSON-schema fragment per leg: base property names merged with that leg's
    /// enum/min/max constraints, FEC/RTCP properties stripped when this sender was built
    /// without them.
    pub fn get_params_schema(&self) -> Vec<Json> {
        self.constraints
            .iter()
            .map(|leg| schema_for_leg(leg, self.enable_fec, self.enable_rtcp))
            .collect()
    }

    pub fn set_constraints(&mut self, leg: usize, constraints: LegConstraints) {
        self.constraints[leg] = constraints;
    }

    fn ensure_unlocked(&self) -> Result<()> {
        if self.stage_locked {
            Err(ConnectionError::staged_locked())
        } else {
            Ok(())
        }
    }

    /// Applies a partial update to each leg. `updates.len()` must equal the leg count;
    /// any key not already present on the staged leg is rejected, and every value is
    /// checked against that leg's enum/min/max constraints before being applied.
    pub fn patch(&mut self, updates: Vec<LegPatch>) -> Result<()> {
        self.ensure_unlocked()?;
        if updates.len() != self.staged.len() {
            return Err(ConnectionError::validation(format!(
                "expected {} leg patches, got {}",
                self.staged.len(),
                updates.len()
            )));
        }

        let mut next = self.staged.clone();
        for ((leg, update), constraints) in next.iter_mut().zip(updates).zip(&self.constraints) {
            apply_sender_patch(leg, &update, constraints)?;
        }

        self.staged = next;
        log::debug!("sender staged parameters patched");
        Ok(())
    }

    pub fn set_master_enable(&mut self, enable: bool) -> Result<()> {
        self.ensure_unlocked()?;
        self.master_enable = enable;
        Ok(())
    }

    pub fn set_subscription_id(&mut self, id: Option<String>) -> Result<()> {
        self.ensure_unlocked()?;
        if let Some(id) = &id {
            validate_uuid(id)?;
        }
        self.receiver_id = id;
        Ok(())
    }
}

impl crate::activator::Target for SenderState {
    fn lock(&mut self) {
        self.stage_locked = true;
    }

    fn unlock(&mut self) {
        self.stage_locked = false;
    }

    fn activate(&mut self) -> Result<()> {
        let old = self.active.clone();
        self.active = self.resolve_all();
        self.stage_locked = false;

        if let Some(cb) = &self.activate_callback {
            if let Err(e) = cb() {
                self.active = old;
                log::warn!("activation failed, active rolled back: {e}");
                return Err(ConnectionError::callback_failure(e));
            }
        }

        Ok(())
    }
}

/// The two-slot store for one receiver. Identical locking/patch/activation shape to
/// [`SenderState`]; differs in leg field set and the extra `sender_id` subscription key.
pub struct ReceiverState {
    staged: Vec<StagedReceiverLeg>,
    active: Vec<ActiveReceiverLeg>,
    constraints: Vec<LegConstraints>,
    stage_locked: bool,
    master_enable: bool,
    sender_id: Option<String>,
    enable_fec: bool,
    enable_rtcp: bool,
    activate_callback: Option<ActivateCallback>,
    interface_selector: Box<dyn AddressSelector>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverStagedView {
    pub transport_params: Vec<StagedReceiverLeg>,
    pub master_enable: bool,
    pub sender_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverActiveView {
    pub transport_params: Vec<ActiveReceiverLeg>,
    pub master_enable: bool,
    pub sender_id: Option<String>,
}

impl ReceiverState {
    pub fn new(legs: usize, enable_fec: bool, enable_rtcp: bool) -> Self {
        let mut state = Self {
            staged: (0..legs).map(|_| StagedReceiverLeg::default_staged()).collect(),
            active: Vec::new(),
            constraints: (0..legs)
                .map(|_| {
                    let mut c = LegConstraints::new();
                    c.insert(
                        "interface_ip".to_owned(),
                        Constraint::enumeration(["auto"]),
                    );
                    c
                })
                .collect(),
            stage_locked: false,
            master_enable: false,
            sender_id: None,
            enable_fec,
            enable_rtcp,
            activate_callback: None,
            interface_selector: Box::new(DefaultAddressSelector),
        };
        state.active = state.resolve_all();
        state
    }

    pub fn with_activate_callback(mut self, cb: ActivateCallback) -> Self {
        self.activate_callback = Some(cb);
        self
    }

    pub fn with_selector(mut self, selector: Box<dyn AddressSelector>) -> Self {
        self.interface_selector = selector;
        self
    }

    fn resolve_all(&self) -> Vec<ActiveReceiverLeg> {
        self.staged
            .iter()
            .zip(&self.constraints)
            .map(|(leg, constraints)| {
                resolve_receiver_leg(leg, constraints, self.interface_selector.as_ref())
            })
            .collect()
    }

    pub fn get_staged(&self) -> ReceiverStagedView {
        ReceiverStagedView {
            transport_params: self.staged.clone(),
            master_enable: self.master_enable,
            sender_id: self.sender_id.clone(),
        }
    }

    pub fn get_active(&self) -> ReceiverActiveView {
        ReceiverActiveView {
            transport_params: self.active.clone(),
            master_enable: self.master_enable,
            sender_id: self.sender_id.clone(),
        }
    }

    /// `interface_ip`'s enum always carries the literal `"auto"` internally, per the
    /// invariant that at least one concrete address is reported externally; it is
    /// stripped here since this is the externally-visible view.
    pub fn get_constraints(&self) -> Vec<LegConstraints> {
        self.constraints
            .iter()
            .map(|leg| strip_internal(leg, self.enable_fec, self.enable_rtcp))
            .collect()
    }

    /// A JSON-schema fragment per leg: base property names merged with that leg's
    /// enum/min/max constraints, FEC/RTCP properties stripped when this receiver was
    /// built without them.
    pub fn get_params_schema(&self) -> Vec<Json> {
        self.constraints
            .iter()
            .map(|leg| schema_for_leg(leg, self.enable_fec, self.enable_rtcp))
            .collect()
    }

    pub fn set_constraints(&mut self, leg: usize, constraints: LegConstraints) {
        self.constraints[leg] = constraints;
    }

    fn ensure_unlocked(&self) -> Result<()> {
        if self.stage_locked {
            Err(ConnectionError::staged_locked())
        } else {
            Ok(())
        }
    }

    pub fn patch(&mut self, updates: Vec<LegPatch>) -> Result<()> {
        self.ensure_unlocked()?;
        if updates.len() != self.staged.len() {
            return Err(ConnectionError::validation(format!(
                "expected {} leg patches, got {}",
                self.staged.len(),
                updates.len()
            )));
        }

        let mut next = self.staged.clone();
        for ((leg, update), constraints) in next.iter_mut().zip(updates).zip(&self.constraints) {
            apply_receiver_patch(leg, &update, constraints)?;
        }

        self.staged = next;
        log::debug!("receiver staged parameters patched");
        Ok(())
    }

    /// Writes the first ingested SDP source directly onto leg 0, bypassing JSON patch
    /// validation — called by the [`TransportFileManager`] after a successful parse.
    ///
    /// [`TransportFileManager`]: crate::transport_file::TransportFileManager
    pub fn apply_sdp_source(&mut self, source: &sdp::Source) -> Result<()> {
        self.ensure_unlocked()?;
        let leg = self
            .staged
            .get_mut(0)
            .ok_or_else(|| ConnectionError::validation("receiver has no legs"))?;

        if let Some(dest) = source.dest {
            leg.multicast_ip = Value::Concrete(dest);
        }
        leg.destination_port = Value::Concrete(source.port);
        leg.rtp_enabled = true;
        if let Some(src) = source.source {
            leg.source_ip = Value::Concrete(src);
        }

        Ok(())
    }

    pub fn set_master_enable(&mut self, enable: bool) -> Result<()> {
        self.ensure_unlocked()?;
        self.master_enable = enable;
        Ok(())
    }

    pub fn set_subscription_id(&mut self, id: Option<String>) -> Result<()> {
        self.ensure_unlocked()?;
        if let Some(id) = &id {
            validate_uuid(id)?;
        }
        self.sender_id = id;
        Ok(())
    }
}

impl crate::activator::Target for ReceiverState {
    fn lock(&mut self) {
        self.stage_locked = true;
    }

    fn unlock(&mut self) {
        self.stage_locked = false;
    }

    fn activate(&mut self) -> Result<()> {
        let old = self.active.clone();
        self.active = self.resolve_all();
        self.stage_locked = false;

        if let Some(cb) = &self.activate_callback {
            if let Err(e) = cb() {
                self.active = old;
                log::warn!("activation failed, active rolled back: {e}");
                return Err(ConnectionError::callback_failure(e));
            }
        }

        Ok(())
    }
}

/// Rejects `value` if it falls outside `constraint`'s enum/min/max, mirroring the
/// external schema validator's per-field constraint check. A field with no entry in the
/// leg's constraint map is unconstrained.
fn check_constraint(constraints: &LegConstraints, field: &str, value: &Json) -> Result<()> {
    let Some(constraint) = constraints.get(field) else {
        return Ok(());
    };

    if let Some(allowed) = &constraint.enum_values {
        let candidate = match value {
            Json::String(s) => s.clone(),
            Json::Number(n) => n.to_string(),
            _ => return Ok(()),
        };
        if !allowed.iter().any(|v| v == &candidate) {
            return Err(ConnectionError::validation(format!(
                "'{candidate}' is not a permitted value for '{field}'"
            )));
        }
    }

    if let Some(n) = value.as_i64() {
        if let Some(minimum) = constraint.minimum {
            if n < minimum {
                return Err(ConnectionError::validation(format!(
                    "'{field}' must be >= {minimum}"
                )));
            }
        }
        if let Some(maximum) = constraint.maximum {
            if n > maximum {
                return Err(ConnectionError::validation(format!(
                    "'{field}' must be <= {maximum}"
                )));
            }
        }
    }

    Ok(())
}

/// A JSON-schema-shaped fragment for one leg: `{"type": "object", "properties": {...}}`
/// with an `enum`/`minimum`/`maximum` entry per constrained field, FEC/RTCP properties
/// stripped when the transceiver was built without them.
fn schema_for_leg(constraints: &LegConstraints, enable_fec: bool, enable_rtcp: bool) -> Json {
    let mut properties = serde_json::Map::new();
    for (key, constraint) in strip_internal(constraints, enable_fec, enable_rtcp) {
        let mut property = serde_json::Map::new();
        if let Some(values) = &constraint.enum_values {
            property.insert("enum".to_owned(), json!(values));
        }
        if let Some(minimum) = constraint.minimum {
            property.insert("minimum".to_owned(), json!(minimum));
        }
        if let Some(maximum) = constraint.maximum {
            property.insert("maximum".to_owned(), json!(maximum));
        }
        properties.insert(key, Json::Object(property));
    }
    json!({ "type": "object", "properties": properties })
}

fn strip_internal(leg: &LegConstraints, enable_fec: bool, enable_rtcp: bool) -> LegConstraints {
    leg.iter()
        .filter(|(key, _)| {
            (enable_fec || !key.starts_with("fec")) && (enable_rtcp || !key.starts_with("rtcp"))
        })
        .map(|(key, constraint)| {
            let mut constraint = constraint.clone();
            if let Some(values) = &mut constraint.enum_values {
                values.retain(|v| v != "auto");
            }
            (key.clone(), constraint)
        })
        .collect()
}

fn json_ip(value: &Json) -> Result<IpAddr> {
    value
        .as_str()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ConnectionError::validation(format!("'{value}' is not a valid address")))
}

fn json_port(value: &Json) -> Result<u16> {
    value
        .as_u64()
        .and_then(|n| u16::try_from(n).ok())
        .ok_or_else(|| ConnectionError::validation(format!("'{value}' is not a valid port")))
}

fn patch_addr_field(field: &mut Value<IpAddr>, value: &Json) -> Result<()> {
    *field = match value.as_str() {
        Some("auto") => Value::Auto,
        _ => Value::Concrete(json_ip(value)?),
    };
    Ok(())
}

fn patch_port_field(field: &mut Value<u16>, value: &Json) -> Result<()> {
    *field = match value.as_str() {
        Some("auto") => Value::Auto,
        _ => Value::Concrete(json_port(value)?),
    };
    Ok(())
}

macro_rules! unknown_key {
    ($key:expr) => {
        return Err(ConnectionError::validation(format!(
            "unknown transport parameter '{}'",
            $key
        )))
    };
}

fn apply_sender_patch(leg: &mut StagedSenderLeg, update: &LegPatch, constraints: &LegConstraints) -> Result<()> {
    for (key, value) in update {
        check_constraint(constraints, key, value)?;
        match key.as_str() {
            "source_ip" => patch_addr_field(&mut leg.source_ip, value)?,
            "destination_ip" => patch_addr_field(&mut leg.destination_ip, value)?,
            "source_port" => patch_port_field(&mut leg.source_port, value)?,
            "destination_port" => patch_port_field(&mut leg.destination_port, value)?,
            "rtp_enabled" => {
                leg.rtp_enabled = value
                    .as_bool()
                    .ok_or_else(|| ConnectionError::validation("rtp_enabled must be a bool"))?
            }
            "fec_enabled" => {
                leg.fec_enabled = value
                    .as_bool()
                    .ok_or_else(|| ConnectionError::validation("fec_enabled must be a bool"))?
            }
            "fec_destination_ip" => patch_addr_field(&mut leg.fec_destination_ip, value)?,
            "fec1D_destination_port" => patch_port_field(&mut leg.fec1_d_destination_port, value)?,
            "fec2D_destination_port" => patch_port_field(&mut leg.fec2_d_destination_port, value)?,
            "fec1D_source_port" => patch_port_field(&mut leg.fec1_d_source_port, value)?,
            "fec2D_source_port" => patch_port_field(&mut leg.fec2_d_source_port, value)?,
            "rtcp_enabled" => {
                leg.rtcp_enabled = value
                    .as_bool()
                    .ok_or_else(|| ConnectionError::validation("rtcp_enabled must be a bool"))?
            }
            "rtcp_destination_ip" => patch_addr_field(&mut leg.rtcp_destination_ip, value)?,
            "rtcp_source_port" => patch_port_field(&mut leg.rtcp_source_port, value)?,
            "rtcp_destination_port" => patch_port_field(&mut leg.rtcp_destination_port, value)?,
            other => unknown_key!(other),
        }
    }
    Ok(())
}

fn apply_receiver_patch(leg: &mut StagedReceiverLeg, update: &LegPatch, constraints: &LegConstraints) -> Result<()> {
    for (key, value) in update {
        check_constraint(constraints, key, value)?;
        match key.as_str() {
            "source_ip" => patch_addr_field(&mut leg.source_ip, value)?,
            "multicast_ip" => patch_addr_field(&mut leg.multicast_ip, value)?,
            "interface_ip" => patch_addr_field(&mut leg.interface_ip, value)?,
            "destination_port" => patch_port_field(&mut leg.destination_port, value)?,
            "rtp_enabled" => {
                leg.rtp_enabled = value
                    .as_bool()
                    .ok_or_else(|| ConnectionError::validation("rtp_enabled must be a bool"))?
            }
            "fec_enabled" => {
                leg.fec_enabled = value
                    .as_bool()
                    .ok_or_else(|| ConnectionError::validation("fec_enabled must be a bool"))?
            }
            "fec_destination_ip" => patch_addr_field(&mut leg.fec_destination_ip, value)?,
            "fec1D_destination_port" => patch_port_field(&mut leg.fec1_d_destination_port, value)?,
            "fec2D_destination_port" => patch_port_field(&mut leg.fec2_d_destination_port, value)?,
            "rtcp_enabled" => {
                leg.rtcp_enabled = value
                    .as_bool()
                    .ok_or_else(|| ConnectionError::validation("rtcp_enabled must be a bool"))?
            }
            "rtcp_destination_ip" => patch_addr_field(&mut leg.rtcp_destination_ip, value)?,
            "rtcp_destination_port" => patch_port_field(&mut leg.rtcp_destination_port, value)?,
            other => unknown_key!(other),
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::activator::Target;

    #[test]
    fn staged_defaults_resolve_to_concrete_active() {
        let sender = SenderState::new(1, false, false);
        assert_eq!(sender.get_active().transport_params[0].destination_port, 5004);
    }

    #[test]
    fn patch_rejects_unknown_key() {
        let mut sender = SenderState::new(1, false, false);
        let mut update = LegPatch::new();
        update.insert("not_a_field".into(), Json::Bool(true));
        assert!(sender.patch(vec![update]).is_err());
    }

    #[test]
    fn patch_rejects_value_outside_enum_constraint() {
        let mut sender = SenderState::new(1, false, false);
        sender.set_constraints(0, {
            let mut c = LegConstraints::new();
            c.insert("destination_port".into(), Constraint::enumeration(["5004", "5006"]));
            c
        });

        let mut update = LegPatch::new();
        update.insert("destination_port".into(), Json::from(6000));
        assert!(sender.patch(vec![update]).is_err());
    }

    #[test]
    fn patch_rejects_value_outside_range_constraint() {
        let mut sender = SenderState::new(1, false, false);
        sender.set_constraints(0, {
            let mut c = LegConstraints::new();
            c.insert("destination_port".into(), Constraint::range(5000, 5100));
            c
        });

        let mut update = LegPatch::new();
        update.insert("destination_port".into(), Json::from(6000));
        assert!(sender.patch(vec![update]).is_err());

        let mut update = LegPatch::new();
        update.insert("destination_port".into(), Json::from(5050));
        assert!(sender.patch(vec![update]).is_ok());
    }

    #[test]
    fn params_schema_merges_constraints_and_strips_disabled_fec_rtcp() {
        let mut sender = SenderState::new(1, false, false);
        sender.set_constraints(0, {
            let mut c = LegConstraints::new();
            c.insert("destination_port".into(), Constraint::range(5000, 5100));
            c.insert("fec_enabled".into(), Constraint::unconstrained());
            c.insert("rtcp_enabled".into(), Constraint::unconstrained());
            c
        });

        let schema = &sender.get_params_schema()[0];
        let properties = schema["properties"].as_object().unwrap();
        assert_eq!(properties["destination_port"]["minimum"], 5000);
        assert!(!properties.contains_key("fec_enabled"));
        assert!(!properties.contains_key("rtcp_enabled"));
    }

    #[test]
    fn patch_rejected_while_locked() {
        let mut sender = SenderState::new(1, false, false);
        sender.lock();
        let mut update = LegPatch::new();
        update.insert("destination_port".into(), Json::from(6000));
        assert!(sender.patch(vec![update]).is_err());
    }

    #[test]
    fn activate_rolls_back_on_callback_failure() {
        let mut sender =
            SenderState::new(1, false, false).with_activate_callback(Box::new(|| Err("boom".into())));

        let mut update = LegPatch::new();
        update.insert("destination_port".into(), Json::from(6000));
        sender.patch(vec![update]).unwrap();

        let before = sender.get_active().transport_params[0].destination_port;
        assert!(sender.activate().is_err());
        assert_eq!(sender.get_active().transport_params[0].destination_port, before);
    }

    #[test]
    fn receiver_sdp_source_fills_leg_zero() {
        let mut receiver = ReceiverState::new(1, false, false);
        let source = sdp::Source {
            media_type: sdp::MediaType::Video,
            port: 5000,
            dest: Some("232.25.176.223".parse().unwrap()),
            source: Some("172.29.226.31".parse().unwrap()),
        };
        receiver.apply_sdp_source(&source).unwrap();

        let staged = receiver.get_staged();
        assert_eq!(staged.transport_params[0].destination_port, Value::Concrete(5000));
        assert_eq!(
            staged.transport_params[0].multicast_ip,
            Value::Concrete("232.25.176.223".parse().unwrap())
        );
        assert_eq!(
            staged.transport_params[0].source_ip,
            Value::Concrete("172.29.226.31".parse().unwrap())
        );
    }
}
