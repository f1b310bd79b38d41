use std::fmt::Display;

/// Severity of a peer's misbehavior, applied to its score.
///
/// The score store is external to sync; these actions map onto score
/// penalties there. Tolerance is expressed as roughly how many occurrences
/// a peer survives before being banned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerAction {
    /// The peer is malicious or fundamentally broken. Disconnect and ban.
    Fatal,
    /// Strong misbehavior signal. A peer survives only a few of these.
    LowToleranceError,
    /// Moderate misbehavior signal.
    MidToleranceError,
    /// Weak signal, likely ordinary network flakiness.
    HighToleranceError,
}

impl Display for PeerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerAction::Fatal => write!(f, "fatal"),
            PeerAction::LowToleranceError => write!(f, "low tolerance"),
            PeerAction::MidToleranceError => write!(f, "mid tolerance"),
            PeerAction::HighToleranceError => write!(f, "high tolerance"),
        }
    }
}
