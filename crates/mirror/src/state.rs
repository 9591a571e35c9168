use std::fmt;

/// Lifecycle of a replica's link to the remote store.
///
/// `Uninitialized -> Loading -> Mirroring <-> Disconnected`; `Closed` is
/// terminal and reachable from every state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MirrorState {
    /// Local only; `mirror` has not succeeded yet.
    #[default]
    Uninitialized,
    /// Connecting and loading snapshots.
    Loading,
    /// Live: local writes are forwarded, remote deltas applied.
    Mirroring,
    /// Channel lost. Local reads and writes keep working.
    Disconnected,
    Closed,
}

impl MirrorState {
    pub fn as_str(self) -> &'static str {
        match self {
            MirrorState::Uninitialized => "uninitialized",
            MirrorState::Loading => "loading",
            MirrorState::Mirroring => "mirroring",
            MirrorState::Disconnected => "disconnected",
            MirrorState::Closed => "closed",
        }
    }

    /// Returns true once the replica has been attached to a channel.
    pub fn is_attached(self) -> bool {
        matches!(
            self,
            MirrorState::Loading | MirrorState::Mirroring | MirrorState::Disconnected
        )
    }
}

impl fmt::Display for MirrorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
