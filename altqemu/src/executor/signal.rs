//! Signal name lookup.

use nix::sys::signal::Signal;
use std::str::FromStr;

/// Signal substituted for names that cannot be resolved.
pub const DEFAULT_SIGNAL: Signal = Signal::SIGINT;

/// Resolve a signal name such as `SIGTERM`, `term` or `SIGhup`.
pub fn lookup(name: &str) -> Option<Signal> {
    let upper = name.trim().to_ascii_uppercase();
    if upper.is_empty() {
        return None;
    }
    let full = if upper.starts_with("SIG") {
        upper
    } else {
        format!("SIG{}", upper)
    };
    Signal::from_str(&full).ok()
}

/// Resolve `name`, falling back to [`DEFAULT_SIGNAL`].
///
/// The boolean is false when the fallback was used.
pub fn lookup_or_default(name: &str) -> (Signal, bool) {
    match lookup(name) {
        Some(signal) => (signal, true),
        None => (DEFAULT_SIGNAL, false),
    }
}
