//! Per-flag toggle state machine.
//!
//! Each `(market, shop)` favorite flag moves through four states:
//!
//! ```text
//! Unfavorited --begin--> FavoritePending --success--> Favorited
//!                                        --failure--> Unfavorited
//! Favorited --begin--> UnfavoritePending --success--> Unfavorited
//!                                        --failure--> Favorited
//! ```
//!
//! The pending states are what the UI shows optimistically while the remote
//! confirmation is in flight; a failure rolls the flag back to where it was.

/// State of one favorite flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagState {
    /// Not favorited; no request in flight.
    Unfavorited,
    /// Locally favorited, awaiting remote confirmation.
    FavoritePending,
    /// Favorited and remotely confirmed.
    Favorited,
    /// Locally un-favorited, awaiting remote confirmation.
    UnfavoritePending,
}

impl FlagState {
    /// Start a toggle. Returns the pending state, or `None` when a request
    /// is already in flight (callers serialize, so this is a logic guard,
    /// not an expected path).
    #[must_use]
    pub const fn begin_toggle(self) -> Option<Self> {
        match self {
            Self::Unfavorited => Some(Self::FavoritePending),
            Self::Favorited => Some(Self::UnfavoritePending),
            Self::FavoritePending | Self::UnfavoritePending => None,
        }
    }

    /// Resolve an in-flight toggle. Success commits the pending direction;
    /// failure rolls back to the pre-toggle state. Identity on settled
    /// states.
    #[must_use]
    pub const fn resolve(self, success: bool) -> Self {
        match (self, success) {
            (Self::FavoritePending, true) | (Self::UnfavoritePending, false) => Self::Favorited,
            (Self::FavoritePending, false) | (Self::UnfavoritePending, true) => Self::Unfavorited,
            (settled, _) => settled,
        }
    }

    /// What the UI should display right now: pending states show the
    /// optimistic value.
    #[must_use]
    pub const fn shows_favorited(self) -> bool {
        matches!(self, Self::Favorited | Self::FavoritePending)
    }

    /// True while a remote confirmation is in flight.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::FavoritePending | Self::UnfavoritePending)
    }

    /// The settled state matching a durable presence flag.
    #[must_use]
    pub const fn from_stored(favorited: bool) -> Self {
        if favorited {
            Self::Favorited
        } else {
            Self::Unfavorited
        }
    }
}

#[cfg(test)]
mod tests {
    use super::FlagState;

    #[test]
    fn test_favorite_confirmed() {
        let state = FlagState::Unfavorited.begin_toggle().expect("begins");
        assert_eq!(state, FlagState::FavoritePending);
        assert!(state.shows_favorited());
        assert_eq!(state.resolve(true), FlagState::Favorited);
    }

    #[test]
    fn test_favorite_rolled_back() {
        let state = FlagState::Unfavorited.begin_toggle().expect("begins");
        assert_eq!(state.resolve(false), FlagState::Unfavorited);
    }

    #[test]
    fn test_unfavorite_confirmed() {
        let state = FlagState::Favorited.begin_toggle().expect("begins");
        assert_eq!(state, FlagState::UnfavoritePending);
        assert!(!state.shows_favorited());
        assert_eq!(state.resolve(true), FlagState::Unfavorited);
    }

    #[test]
    fn test_unfavorite_rolled_back() {
        let state = FlagState::Favorited.begin_toggle().expect("begins");
        assert_eq!(state.resolve(false), FlagState::Favorited);
    }

    #[test]
    fn test_begin_while_pending_is_rejected() {
        assert_eq!(FlagState::FavoritePending.begin_toggle(), None);
        assert_eq!(FlagState::UnfavoritePending.begin_toggle(), None);
    }

    #[test]
    fn test_resolve_on_settled_state_is_identity() {
        assert_eq!(FlagState::Favorited.resolve(true), FlagState::Favorited);
        assert_eq!(FlagState::Unfavorited.resolve(false), FlagState::Unfavorited);
    }

    #[test]
    fn test_from_stored() {
        assert_eq!(FlagState::from_stored(true), FlagState::Favorited);
        assert_eq!(FlagState::from_stored(false), FlagState::Unfavorited);
    }
}
