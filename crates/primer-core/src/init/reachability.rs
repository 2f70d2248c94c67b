//! Type-reached propagation

use crate::types::RuntimeType;

/// Mark `hub` and everything above it as reached.
///
/// Walks the supertype chain and, at each step, the interfaces reachable from
/// that type. The walk stops at the first untracked type: by the hierarchy
/// rule, everything above it is untracked too.
///
/// No lock is taken. The hierarchy is marked again on every slow-path entry,
/// including repeated attempts on a type in the error state and concurrent
/// callers waiting on a type being initialized; the only write ever made is
/// `NotReached -> Reached`, so redundant and racing walks are harmless.
pub fn mark_type_reached(hub: &RuntimeType) {
    let mut current = Some(hub);
    while let Some(ty) = current {
        let info = ty.init_record();
        if !info.is_tracked() {
            break;
        }
        info.mark_reached();
        tracing::trace!(type_name = ty.name(), "type reached");

        reach_interfaces(ty);
        current = ty.super_type().map(|s| &**s);
    }
}

fn reach_interfaces(hub: &RuntimeType) {
    let origin_tracked = hub.init_record().is_tracked();
    for iface in hub.interfaces() {
        let info = iface.init_record();
        // Already handled by an earlier walk, or untracked all the way up
        if info.is_type_reached_or_untracked() {
            continue;
        }
        if origin_tracked {
            info.mark_reached();
        }
        reach_interfaces(iface);
    }
}
