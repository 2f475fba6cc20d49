//! Session events for UI integration
//!
//! Every [`CallSession`](crate::CallSession) fans its notable changes out over a
//! `tokio::sync::broadcast` channel. Subscribers that fall behind lose the
//! oldest events; the current picture is always available from
//! [`CallSession::snapshot`](crate::CallSession::snapshot).
//!
//! ```rust,no_run
//! # use telecare_call_core::{CallSession, SessionEvent};
//! # async fn example(session: CallSession) {
//! let mut events = session.subscribe();
//! while let Ok(event) = events.recv().await {
//!     match event {
//!         SessionEvent::StateChanged { current, .. } => println!("state: {}", current),
//!         SessionEvent::ParticipantLeft { identity, .. } => println!("{} left", identity),
//!         SessionEvent::Ended { .. } => break,
//!         _ => {}
//!     }
//! }
//! # }
//! ```

use chrono::{DateTime, Utc};

use crate::media::{PublishTier, TierFailure};
use crate::registry::RemoteParticipantInfo;
use crate::rtc::{MediaKind, ParticipantId};
use crate::session::{CallState, SessionId};

#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The orchestrator moved between states
    StateChanged {
        session_id: SessionId,
        previous: CallState,
        current: CallState,
        timestamp: DateTime<Utc>,
    },

    /// One or more acquisition tiers failed; `tier` is what was obtained
    MediaDegraded {
        session_id: SessionId,
        tier: PublishTier,
        failures: Vec<TierFailure>,
    },

    /// A remote participant appeared or changed what it publishes
    ParticipantUpdated {
        session_id: SessionId,
        participant: RemoteParticipantInfo,
    },

    /// A remote participant left the channel
    ParticipantLeft {
        session_id: SessionId,
        identity: ParticipantId,
    },

    /// Mute or camera toggle applied to a local track
    LocalTrackToggled {
        session_id: SessionId,
        kind: MediaKind,
        enabled: bool,
    },

    /// Teardown finished; `teardown_errors` were logged and swallowed
    Ended {
        session_id: SessionId,
        teardown_errors: usize,
    },
}

impl SessionEvent {
    pub fn session_id(&self) -> &SessionId {
        match self {
            SessionEvent::StateChanged { session_id, .. }
            | SessionEvent::MediaDegraded { session_id, .. }
            | SessionEvent::ParticipantUpdated { session_id, .. }
            | SessionEvent::ParticipantLeft { session_id, .. }
            | SessionEvent::LocalTrackToggled { session_id, .. }
            | SessionEvent::Ended { session_id, .. } => session_id,
        }
    }
}
