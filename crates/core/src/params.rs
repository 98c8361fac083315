use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FecMode {
    #[serde(rename = "1D")]
    OneD,
    #[serde(rename = "2D")]
    TwoD,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FecType {
    #[serde(rename = "XOR")]
    Xor,
    #[serde(rename = "ReedSolomon")]
    ReedSolomon,
}

/// A sender's staged leg. Every address/port may be `"auto"`; `rtp_enabled` and the FEC
/// mode/type/block fields have no sentinel form and are always concrete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedSenderLeg {
    pub source_ip: Value<IpAddr>,
    pub destination_ip: Value<IpAddr>,
    pub source_port: Value<u16>,
    pub destination_port: Value<u16>,
    pub rtp_enabled: bool,

    pub fec_enabled: bool,
    pub fec_destination_ip: Value<IpAddr>,
    pub fec_mode: FecMode,
    pub fec_type: FecType,
    pub fec_block_width: u32,
    pub fec_block_height: u32,
    pub fec1_d_source_port: Value<u16>,
    pub fec2_d_source_port: Value<u16>,
    pub fec1_d_destination_port: Value<u16>,
    pub fec2_d_destination_port: Value<u16>,

    pub rtcp_enabled: bool,
    pub rtcp_destination_ip: Value<IpAddr>,
    pub rtcp_source_port: Value<u16>,
    pub rtcp_destination_port: Value<u16>,
}

impl StagedSenderLeg {
    /// `staged` starts with addresses/ports at `"auto"`, RTP enabled and FEC/RTCP
    /// disabled, per the registration-time defaults.
    pub fn default_staged() -> Self {
        Self {
            source_ip: Value::Auto,
            destination_ip: Value::Auto,
            source_port: Value::Auto,
            destination_port: Value::Concrete(5004),
            rtp_enabled: true,

            fec_enabled: false,
            fec_destination_ip: Value::Auto,
            fec_mode: FecMode::OneD,
            fec_type: FecType::Xor,
            fec_block_width: 4,
            fec_block_height: 4,
            fec1_d_source_port: Value::Auto,
            fec2_d_source_port: Value::Auto,
            fec1_d_destination_port: Value::Auto,
            fec2_d_destination_port: Value::Auto,

            rtcp_enabled: false,
            rtcp_destination_ip: Value::Auto,
            rtcp_source_port: Value::Auto,
            rtcp_destination_port: Value::Auto,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveSenderLeg {
    pub source_ip: IpAddr,
    pub destination_ip: IpAddr,
    pub source_port: u16,
    pub destination_port: u16,
    pub rtp_enabled: bool,

    pub fec_enabled: bool,
    pub fec_destination_ip: IpAddr,
    pub fec_mode: FecMode,
    pub fec_type: FecType,
    pub fec_block_width: u32,
    pub fec_block_height: u32,
    pub fec1_d_source_port: u16,
    pub fec2_d_source_port: u16,
    pub fec1_d_destination_port: u16,
    pub fec2_d_destination_port: u16,

    pub rtcp_enabled: bool,
    pub rtcp_destination_ip: IpAddr,
    pub rtcp_source_port: u16,
    pub rtcp_destination_port: u16,
}

/// A receiver's staged leg. Replaces `source_ip/destination_ip` with
/// `source_ip, multicast_ip, interface_ip` and has no sender-only FEC source-port fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedReceiverLeg {
    pub source_ip: Value<IpAddr>,
    pub multicast_ip: Value<IpAddr>,
    pub interface_ip: Value<IpAddr>,
    pub destination_port: Value<u16>,
    pub rtp_enabled: bool,

    pub fec_enabled: bool,
    pub fec_destination_ip: Value<IpAddr>,
    pub fec_mode: FecMode,
    pub fec_type: FecType,
    pub fec1_d_destination_port: Value<u16>,
    pub fec2_d_destination_port: Value<u16>,

    pub rtcp_enabled: bool,
    pub rtcp_destination_ip: Value<IpAddr>,
    pub rtcp_destination_port: Value<u16>,
}

impl StagedReceiverLeg {
    pub fn default_staged() -> Self {
        Self {
            source_ip: Value::Auto,
            multicast_ip: Value::Auto,
            interface_ip: Value::Auto,
            destination_port: Value::Concrete(5004),
            rtp_enabled: true,

            fec_enabled: false,
            fec_destination_ip: Value::Auto,
            fec_mode: FecMode::OneD,
            fec_type: FecType::Xor,
            fec1_d_destination_port: Value::Auto,
            fec2_d_destination_port: Value::Auto,

            rtcp_enabled: false,
            rtcp_destination_ip: Value::Auto,
            rtcp_destination_port: Value::Auto,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveReceiverLeg {
    pub source_ip: Option<IpAddr>,
    pub multicast_ip: Option<IpAddr>,
    pub interface_ip: IpAddr,
    pub destination_port: u16,
    pub rtp_enabled: bool,

    pub fec_enabled: bool,
    pub fec_destination_ip: IpAddr,
    pub fec_mode: FecMode,
    pub fec_type: FecType,
    pub fec1_d_destination_port: u16,
    pub fec2_d_destination_port: u16,

    pub rtcp_enabled: bool,
    pub rtcp_destination_ip: IpAddr,
    pub rtcp_destination_port: u16,
}

/// A single constraint on one parameter: either an enumeration of permitted values or a
/// numeric range. Both are optional so a field can be left unconstrained.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Constraint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<i64>,
}

impl Constraint {
    pub fn unconstrained() -> Self {
        Self::default()
    }

    pub fn enumeration(values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            enum_values: Some(values.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn range(minimum: i64, maximum: i64) -> Self {
        Self {
            minimum: Some(minimum),
            maximum: Some(maximum),
            ..Self::default()
        }
    }
}

/// Per-leg constraint map, keyed by parameter name.
pub type LegConstraints = std::collections::BTreeMap<String, Constraint>;
