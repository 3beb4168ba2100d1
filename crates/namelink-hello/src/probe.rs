//! Probe name construction and parsing.
//!
//! Probe names have the form `/<neighbor>/NLSR/INFO/<sender>` where the final
//! component carries the sender's router name as a wire-encoded blob. Reply
//! data names are the probe name with a version component appended. The
//! parsers here recover the neighbor from each shape and return `None` for
//! names that do not match, which callers treat as a silent drop.

use namelink_core::{INFO_COMPONENT, NLSR_COMPONENT, NameComponent, RouterName};

/// Build the probe name `/<neighbor>/NLSR/INFO/<sender-wire-encoded>`.
pub fn probe_name(neighbor: &RouterName, sender: &RouterName) -> RouterName {
    neighbor
        .clone()
        .append(NameComponent::generic(NLSR_COMPONENT))
        .append(NameComponent::generic(INFO_COMPONENT))
        .append(NameComponent::generic(sender.wire_encode()))
}

/// The namespace a router answers hello probes under: `/<router>/NLSR/INFO`.
pub fn hello_filter_prefix(router: &RouterName) -> RouterName {
    router
        .clone()
        .append(NameComponent::generic(NLSR_COMPONENT))
        .append(NameComponent::generic(INFO_COMPONENT))
}

/// Extract the probing neighbor from an inbound probe name.
///
/// The neighbor is wire-encoded in the final component; the penultimate
/// component must be `INFO`.
#[must_use]
pub fn neighbor_from_inbound(name: &RouterName) -> Option<RouterName> {
    if !has_info_at(name, 1) {
        return None;
    }
    let blob = name.get_from_end(0)?;
    if !blob.is_generic() {
        return None;
    }
    RouterName::wire_decode(blob.value()).ok()
}

/// Extract the probed neighbor from a timed-out probe name.
///
/// The neighbor is the probe name with `NLSR/INFO/<sender>` removed; the
/// penultimate component must be `INFO`.
#[must_use]
pub fn neighbor_from_timeout(name: &RouterName) -> Option<RouterName> {
    if !has_info_at(name, 1) {
        return None;
    }
    Some(name.drop_back(3))
}

/// Extract the responding neighbor from a validated reply data name.
///
/// Data names carry a trailing version component, so `INFO` sits third from
/// the end and the neighbor is the name with the last four components
/// removed.
#[must_use]
pub fn neighbor_from_validated_data(name: &RouterName) -> Option<RouterName> {
    if !has_info_at(name, 2) {
        return None;
    }
    Some(name.drop_back(4))
}

fn has_info_at(name: &RouterName, offset_from_end: usize) -> bool {
    name.get_from_end(offset_from_end)
        .is_some_and(|c| c.is_generic_value(INFO_COMPONENT))
}
