//! Provider selection policy.
//!
//! Everything here is pure: the orchestrator owns the state and asks these
//! functions what to do with it.

use crate::{ProviderKind, ProviderPreference};
use serde::Serialize;

/// Last known reachability of the real backends. The dummy generator is
/// always available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Availability {
    pub local: bool,
    pub hosted: bool,
}

impl Availability {
    pub fn get(&self, kind: ProviderKind) -> bool {
        match kind {
            ProviderKind::Local => self.local,
            ProviderKind::Hosted => self.hosted,
            ProviderKind::Dummy => true,
        }
    }
}

/// The real backend that isn't `kind`.
fn alternate(kind: ProviderKind) -> Option<ProviderKind> {
    match kind {
        ProviderKind::Local => Some(ProviderKind::Hosted),
        ProviderKind::Hosted => Some(ProviderKind::Local),
        ProviderKind::Dummy => None,
    }
}

/// First available real backend in auto-mode preference order.
fn best_available(availability: Availability) -> Option<ProviderKind> {
    ProviderKind::REAL
        .into_iter()
        .find(|kind| availability.get(*kind))
}

/// Pick the startup provider from the probe results.
///
/// Forced mode takes the preferred backend if reachable, otherwise falls
/// back once to the other real backend, otherwise the dummy generator.
/// Auto mode takes the first reachable of local, hosted, dummy.
pub fn initial_selection(preference: ProviderPreference, availability: Availability) -> ProviderKind {
    match preference {
        ProviderPreference::Forced(ProviderKind::Dummy) => ProviderKind::Dummy,
        ProviderPreference::Forced(preferred) => {
            if availability.get(preferred) {
                preferred
            } else {
                alternate(preferred)
                    .filter(|other| availability.get(*other))
                    .unwrap_or(ProviderKind::Dummy)
            }
        }
        ProviderPreference::Auto => best_available(availability).unwrap_or(ProviderKind::Dummy),
    }
}

/// Backends to try for one message, in order. Always ends with the dummy
/// generator, which never fails.
///
/// Forced mode tries only the current provider; it never crosses over to
/// the other real backend mid-conversation. Auto mode tries the current
/// provider, then the remaining real backends, skipping any that are not
/// configured.
pub fn attempt_order(
    preference: ProviderPreference,
    current: ProviderKind,
    configured: impl Fn(ProviderKind) -> bool,
) -> Vec<ProviderKind> {
    let mut order = Vec::with_capacity(3);

    match preference {
        ProviderPreference::Forced(_) => {
            if current.is_real() && configured(current) {
                order.push(current);
            }
        }
        ProviderPreference::Auto => {
            if current.is_real() && configured(current) {
                order.push(current);
            }
            for kind in ProviderKind::REAL {
                if kind != current && configured(kind) {
                    order.push(kind);
                }
            }
        }
    }

    order.push(ProviderKind::Dummy);
    order
}

/// Decide whether a refresh should switch the current provider.
///
/// Returns `Some(new)` to switch, `None` to stay. Forced mode never
/// switches. In auto mode a real provider is only abandoned when it is
/// down and the alternate is up, and at least one of them changed state
/// since the previous probe; a recovered preferred backend does not take
/// over from a working one. From the dummy generator, the first reachable
/// real backend is taken.
pub fn refresh_decision(
    preference: ProviderPreference,
    current: ProviderKind,
    previous: Availability,
    latest: Availability,
) -> Option<ProviderKind> {
    if preference.forced().is_some() {
        return None;
    }

    match alternate(current) {
        None => best_available(latest),
        Some(other) => {
            let current_down = !latest.get(current);
            let other_up = latest.get(other);
            let changed = previous.get(current) || !previous.get(other);
            (current_down && other_up && changed).then_some(other)
        }
    }
}
