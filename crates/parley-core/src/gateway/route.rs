//! Where a message goes after its durable write returns.

use parley_net::FailureKind;

use crate::presence::ConnectionState;

/// Result class of the durable write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurableOutcome {
    /// The backend stored the message.
    Persisted,
    /// The backend refused the message; retrying will not help.
    Rejected,
    /// The backend could not be reached or failed transiently.
    Unreachable,
}

impl DurableOutcome {
    /// Classifies a durable write result.
    #[must_use]
    pub fn of<T>(result: &parley_net::Result<T>) -> Self {
        match result {
            Ok(_) => Self::Persisted,
            Err(e) => match e.classify() {
                FailureKind::Rejected => Self::Rejected,
                FailureKind::Transient => Self::Unreachable,
            },
        }
    }
}

/// Next step for a sent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendRoute {
    /// Apply the backend confirmation.
    Confirm,
    /// Mark failed and tell the user.
    Fail,
    /// Emit on the live channel.
    Emit,
    /// Store in the offline queue.
    Enqueue,
}

/// Decides what to do with a message once its durable write returned.
///
/// | outcome     | connected and online | otherwise |
/// |-------------|----------------------|-----------|
/// | persisted   | confirm              | confirm   |
/// | rejected    | fail                 | fail      |
/// | unreachable | emit                 | enqueue   |
#[must_use]
pub const fn route(outcome: DurableOutcome, state: ConnectionState) -> SendRoute {
    match outcome {
        DurableOutcome::Persisted => SendRoute::Confirm,
        DurableOutcome::Rejected => SendRoute::Fail,
        DurableOutcome::Unreachable if state.can_emit() => SendRoute::Emit,
        DurableOutcome::Unreachable => SendRoute::Enqueue,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    const fn state(is_connected: bool, is_online: bool) -> ConnectionState {
        ConnectionState {
            is_connected,
            is_online,
        }
    }

    #[test]
    fn test_persisted_always_confirms() {
        for connected in [false, true] {
            for online in [false, true] {
                assert_eq!(
                    route(DurableOutcome::Persisted, state(connected, online)),
                    SendRoute::Confirm
                );
            }
        }
    }

    #[test]
    fn test_unreachable_needs_both_signals_to_emit() {
        assert_eq!(route(DurableOutcome::Unreachable, state(true, true)), SendRoute::Emit);
        assert_eq!(route(DurableOutcome::Unreachable, state(true, false)), SendRoute::Enqueue);
        assert_eq!(route(DurableOutcome::Unreachable, state(false, true)), SendRoute::Enqueue);
        assert_eq!(route(DurableOutcome::Unreachable, state(false, false)), SendRoute::Enqueue);
    }

    #[test]
    fn test_rejected_never_queues() {
        assert_eq!(route(DurableOutcome::Rejected, state(false, false)), SendRoute::Fail);
    }

    #[test]
    fn test_classification() {
        let timeout: parley_net::Result<()> =
            Err(parley_net::Error::Timeout(Duration::from_secs(15)));
        assert_eq!(DurableOutcome::of(&timeout), DurableOutcome::Unreachable);

        let refused: parley_net::Result<()> = Err(parley_net::Error::Status {
            status: 400,
            message: "recipient blocked".into(),
        });
        assert_eq!(DurableOutcome::of(&refused), DurableOutcome::Rejected);

        assert_eq!(DurableOutcome::of(&Ok(())), DurableOutcome::Persisted);
    }
}
