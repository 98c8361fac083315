use crate::params::{ActiveReceiverLeg, ActiveSenderLeg, LegConstraints, StagedReceiverLeg, StagedSenderLeg};
use crate::value::Value;
use std::net::IpAddr;

/// Driver-supplied policy for resolving an address field whose staged value is `"auto"`.
///
/// The default implementation picks the first concrete entry in the field's constraint
/// enum, falling back to `127.0.0.1` with a warning if the enum has no concrete entries —
/// matching the built-in defaults described for `source_ip`/`interface_ip`/`destination_ip`.
pub trait AddressSelector: Send + Sync {
    fn select(&self, field: &str, enum_values: &[IpAddr]) -> IpAddr;
}

pub struct DefaultAddressSelector;

impl AddressSelector for DefaultAddressSelector {
    fn select(&self, field: &str, enum_values: &[IpAddr]) -> IpAddr {
        if let Some(addr) = enum_values.first() {
            *addr
        } else {
            log::warn!("no registered address for '{field}', defaulting to 127.0.0.1 (must not be used in production)");
            IpAddr::from([127, 0, 0, 1])
        }
    }
}

fn enum_addresses(constraints: &LegConstraints, field: &str) -> Vec<IpAddr> {
    constraints
        .get(field)
        .and_then(|c| c.enum_values.as_ref())
        .map(|values| {
            values
                .iter()
                .filter(|v| v.as_str() != "auto")
                .filter_map(|v| v.parse().ok())
                .collect()
        })
        .unwrap_or_default()
}

fn resolve_port(staged: Value<u16>, default: u16) -> u16 {
    match staged {
        Value::Concrete(v) => v,
        Value::Auto => default,
    }
}

fn resolve_addr(staged: Value<IpAddr>, default: IpAddr) -> IpAddr {
    match staged {
        Value::Concrete(v) => v,
        Value::Auto => default,
    }
}

/// Expands a sender's staged leg to a fully concrete active leg.
///
/// Keys are resolved in the fixed order documented for senders so that, e.g., the FEC and
/// RTCP port offsets can reference the already-resolved `destination_port`/`source_port`.
/// Pure with respect to `staged`; the only side effects are the selector calls and any
/// warning logs from the built-in address defaults.
pub fn resolve_sender_leg(
    staged: &StagedSenderLeg,
    constraints: &LegConstraints,
    source_selector: &dyn AddressSelector,
    destination_selector: &dyn AddressSelector,
) -> ActiveSenderLeg {
    let source_ip = match staged.source_ip {
        Value::Concrete(v) => v,
        Value::Auto => source_selector.select("source_ip", &enum_addresses(constraints, "source_ip")),
    };

    let destination_ip = match staged.destination_ip {
        Value::Concrete(v) => v,
        Value::Auto => destination_selector
            .select("destination_ip", &enum_addresses(constraints, "destination_ip")),
    };

    let source_port = resolve_port(staged.source_port, 5004);
    let destination_port = resolve_port(staged.destination_port, 5004);

    let fec_destination_ip = resolve_addr(staged.fec_destination_ip, destination_ip);
    let fec1_d_destination_port = resolve_port(staged.fec1_d_destination_port, destination_port + 2);
    let fec2_d_destination_port = resolve_port(staged.fec2_d_destination_port, destination_port + 4);
    let fec1_d_source_port = resolve_port(staged.fec1_d_source_port, source_port + 2);
    let fec2_d_source_port = resolve_port(staged.fec2_d_source_port, source_port + 4);

    let rtcp_source_port = resolve_port(staged.rtcp_source_port, source_port + 1);
    let rtcp_destination_ip = resolve_addr(staged.rtcp_destination_ip, destination_ip);
    let rtcp_destination_port = resolve_port(staged.rtcp_destination_port, destination_port + 1);

    ActiveSenderLeg {
        source_ip,
        destination_ip,
        source_port,
        destination_port,
        rtp_enabled: staged.rtp_enabled,
        fec_enabled: staged.fec_enabled,
        fec_destination_ip,
        fec_mode: staged.fec_mode,
        fec_type: staged.fec_type,
        fec_block_width: staged.fec_block_width,
        fec_block_height: staged.fec_block_height,
        fec1_d_source_port,
        fec2_d_source_port,
        fec1_d_destination_port,
        fec2_d_destination_port,
        rtcp_enabled: staged.rtcp_enabled,
        rtcp_destination_ip,
        rtcp_source_port,
        rtcp_destination_port,
    }
}

/// Expands a receiver's staged leg to a fully concrete active leg.
///
/// `interface_ip` plays the role `source_ip` plays for a sender: driver-selected when
/// staged as `"auto"`. `fec_destination_ip`/`rtcp_destination_ip` prefer `multicast_ip`
/// when one was staged, falling back to `interface_ip` otherwise.
pub fn resolve_receiver_leg(
    staged: &StagedReceiverLeg,
    constraints: &LegConstraints,
    interface_selector: &dyn AddressSelector,
) -> ActiveReceiverLeg {
    let interface_ip = match staged.interface_ip {
        Value::Concrete(v) => v,
        Value::Auto => {
            interface_selector.select("interface_ip", &enum_addresses(constraints, "interface_ip"))
        }
    };

    let multicast_ip = staged.multicast_ip.as_concrete().copied();
    let source_ip = staged.source_ip.as_concrete().copied();

    let destination_port = resolve_port(staged.destination_port, 5004);

    let multicast_or_interface = multicast_ip.unwrap_or(interface_ip);
    let fec_destination_ip = resolve_addr(staged.fec_destination_ip, multicast_or_interface);
    let fec1_d_destination_port = resolve_port(staged.fec1_d_destination_port, destination_port + 2);
    let fec2_d_destination_port = resolve_port(staged.fec2_d_destination_port, destination_port + 4);

    let rtcp_destination_ip = resolve_addr(staged.rtcp_destination_ip, multicast_or_interface);
    let rtcp_destination_port = resolve_port(staged.rtcp_destination_port, destination_port + 1);

    ActiveReceiverLeg {
        source_ip,
        multicast_ip,
        interface_ip,
        destination_port,
        rtp_enabled: staged.rtp_enabled,
        fec_enabled: staged.fec_enabled,
        fec_destination_ip,
        fec_mode: staged.fec_mode,
        fec_type: staged.fec_type,
        fec1_d_destination_port,
        fec2_d_destination_port,
        rtcp_enabled: staged.rtcp_enabled,
        rtcp_destination_ip,
        rtcp_destination_port,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn port_offsets_are_monotonic() {
        let mut staged = StagedSenderLeg::default_staged();
        staged.destination_port = Value::Concrete(6000);
        staged.source_port = Value::Concrete(6000);

        let active = resolve_sender_leg(
            &staged,
            &BTreeMap::new(),
            &DefaultAddressSelector,
            &DefaultAddressSelector,
        );

        assert_eq!(active.rtcp_destination_port, 6001);
        assert_eq!(active.fec1_d_destination_port, 6002);
        assert_eq!(active.fec2_d_destination_port, 6004);
        assert_eq!(active.fec1_d_source_port, 6002);
        assert_eq!(active.fec2_d_source_port, 6004);
    }

    #[test]
    fn receiver_fec_prefers_multicast_over_interface() {
        let mut staged = StagedReceiverLeg::default_staged();
        staged.multicast_ip = Value::Concrete("232.0.0.5".parse().unwrap());

        let active = resolve_receiver_leg(&staged, &BTreeMap::new(), &DefaultAddressSelector);

        assert_eq!(active.fec_destination_ip, "232.0.0.5".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn default_destination_ip_is_loopback_with_warning() {
        let staged = StagedSenderLeg::default_staged();
        let active = resolve_sender_leg(
            &staged,
            &BTreeMap::new(),
            &DefaultAddressSelector,
            &DefaultAddressSelector,
        );
        assert_eq!(active.destination_ip, IpAddr::from([127, 0, 0, 1]));
    }
}
