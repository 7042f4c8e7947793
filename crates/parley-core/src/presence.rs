//! Connectivity, presence and the transient connectivity notice.

use std::collections::BTreeSet;
use std::time::Duration;

use tokio::time::Instant;

use crate::message::ParticipantId;

/// How long a notice stays up unless cleared earlier.
pub const NOTICE_WINDOW: Duration = Duration::from_secs(3);

/// The two connectivity signals the engine acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionState {
    /// A live, authenticated channel exists.
    pub is_connected: bool,
    /// The device reports network access.
    pub is_online: bool,
}

impl ConnectionState {
    /// Returns true if best-effort emits and queue replay may run.
    #[must_use]
    pub const fn can_emit(self) -> bool {
        self.is_connected && self.is_online
    }
}

/// What a notice is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// The device lost network access.
    Offline,
    /// Messages are waiting in the offline queue.
    MessagesQueued {
        /// Queue length when the notice was raised.
        count: usize,
    },
}

impl std::fmt::Display for NoticeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Offline => f.write_str("You are offline"),
            Self::MessagesQueued { count: 1 } => {
                f.write_str("1 message will be sent when you are back online")
            }
            Self::MessagesQueued { count } => {
                write!(f, "{count} messages will be sent when you are back online")
            }
        }
    }
}

/// A notice currently on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notice {
    /// Content.
    pub kind: NoticeKind,
    /// When it was raised.
    pub raised_at: Instant,
    /// Identifies this raise, so a stale expiry does not clear a newer notice.
    pub generation: u64,
}

/// Change of the device network flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Network came back.
    CameOnline,
    /// Network went away.
    WentOffline,
}

/// Tracks network state, online participants and the current notice.
#[derive(Debug)]
pub struct PresenceTracker {
    online: bool,
    online_users: BTreeSet<ParticipantId>,
    notice: Option<Notice>,
    generation: u64,
}

impl PresenceTracker {
    /// Creates a tracker with the given initial network state.
    #[must_use]
    pub const fn new(online: bool) -> Self {
        Self {
            online,
            online_users: BTreeSet::new(),
            notice: None,
            generation: 0,
        }
    }

    /// Device network flag.
    #[must_use]
    pub const fn is_online(&self) -> bool {
        self.online
    }

    /// Updates the network flag; returns the transition if it changed.
    pub const fn set_online(&mut self, online: bool) -> Option<Transition> {
        if self.online == online {
            return None;
        }
        self.online = online;
        if online {
            Some(Transition::CameOnline)
        } else {
            Some(Transition::WentOffline)
        }
    }

    /// Replaces the presence snapshot.
    pub fn set_online_users(&mut self, users: impl IntoIterator<Item = ParticipantId>) {
        self.online_users = users.into_iter().collect();
    }

    /// Participants the server reports as online.
    pub fn online_users(&self) -> impl Iterator<Item = &ParticipantId> {
        self.online_users.iter()
    }

    /// Raises a notice, replacing the current one. Returns its generation.
    pub fn raise(&mut self, kind: NoticeKind) -> u64 {
        self.generation += 1;
        self.notice = Some(Notice {
            kind,
            raised_at: Instant::now(),
            generation: self.generation,
        });
        self.generation
    }

    /// Clears the notice raised as `generation`, if it is still showing.
    pub fn expire(&mut self, generation: u64) -> bool {
        if self.notice.is_some_and(|n| n.generation == generation) {
            self.notice = None;
            true
        } else {
            false
        }
    }

    /// Clears the offline notice.
    pub fn clear_offline(&mut self) -> bool {
        self.clear_if(|kind| kind == NoticeKind::Offline)
    }

    /// Clears the queued-messages notice.
    pub fn clear_queued(&mut self) -> bool {
        self.clear_if(|kind| matches!(kind, NoticeKind::MessagesQueued { .. }))
    }

    fn clear_if(&mut self, pred: impl FnOnce(NoticeKind) -> bool) -> bool {
        if self.notice.is_some_and(|n| pred(n.kind)) {
            self.notice = None;
            true
        } else {
            false
        }
    }

    /// Notice currently showing, if it is within the window.
    #[must_use]
    pub fn notice(&self) -> Option<Notice> {
        self.notice
            .filter(|n| n.raised_at.elapsed() < NOTICE_WINDOW)
    }
}
