//! Engine configuration.

use crate::conversation::Participant;

/// Settings for one engine instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// The signed-in participant.
    pub me: Participant,
    /// Network state assumed until the first report.
    pub initially_online: bool,
    /// Capacity of the command channel.
    pub command_capacity: usize,
    /// Capacity of the event broadcast; slow subscribers lag past this.
    pub event_capacity: usize,
}

impl EngineConfig {
    /// Default settings for `me`.
    #[must_use]
    pub const fn new(me: Participant) -> Self {
        Self {
            me,
            initially_online: true,
            command_capacity: 64,
            event_capacity: 256,
        }
    }

    /// Sets the initial network state.
    #[must_use]
    pub const fn initially_online(mut self, online: bool) -> Self {
        self.initially_online = online;
        self
    }
}
