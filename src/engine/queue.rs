//! Command queue entries and the retry policy
//!
//! The queue itself is a bounded tokio mpsc channel owned by the driver
//! loop; this module holds the entry type and the policy deciding when an
//! attempt is retried and when it is abandoned.

use std::time::Duration;

use tokio::time::Instant;

use crate::protocol::Frame;

/// One queued outbound command
#[derive(Debug, Clone)]
pub struct PendingCommand {
    pub frame: Frame,
    /// Attempts already consumed by failed sends or response timeouts
    pub retry_count: u32,
    pub submitted_at: Instant,
    /// True for commands whose attempt completes only on a matching reply
    pub await_response: bool,
}

impl PendingCommand {
    pub fn new(frame: Frame, await_response: bool, now: Instant) -> Self {
        Self {
            frame,
            retry_count: 0,
            submitted_at: now,
            await_response,
        }
    }

    /// Copy of this command for the next attempt
    pub fn next_attempt(&self) -> Self {
        let mut next = self.clone();
        next.retry_count += 1;
        next
    }
}

/// Bounds on attempts and response waits
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt, so `max_retries + 1` attempts total
    pub max_retries: u32,
    pub response_timeout: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, response_timeout: Duration) -> Self {
        Self {
            max_retries,
            response_timeout,
        }
    }

    /// True while the command still has attempts left
    pub fn should_retry(&self, cmd: &PendingCommand) -> bool {
        cmd.retry_count < self.max_retries
    }
}

/// A sent command waiting for its reply
#[derive(Debug)]
pub struct AwaitingSlot {
    pub cmd: PendingCommand,
    pub deadline: Instant,
}

impl AwaitingSlot {
    pub fn new(cmd: PendingCommand, sent_at: Instant, policy: &RetryPolicy) -> Self {
        Self {
            cmd,
            deadline: sent_at + policy.response_timeout,
        }
    }

    /// Replies are correlated by command code
    pub fn matches(&self, frame: &Frame) -> bool {
        frame.command == self.cmd.frame.command
    }

    pub fn expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::{CMD_AC_INFO, CMD_SET_ESS_POWER};
    use crate::protocol::VeBusCodec;

    #[test]
    fn test_retry_budget() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1000));
        let now = Instant::now();
        let mut cmd = PendingCommand::new(VeBusCodec::ess_power(500, 1), false, now);

        let mut attempts = 1;
        while policy.should_retry(&cmd) {
            cmd = cmd.next_attempt();
            attempts += 1;
        }
        // max_retries = 3 allows four attempts in total
        assert_eq!(attempts, 4);
        assert_eq!(cmd.retry_count, 3);
    }

    #[test]
    fn test_zero_retries_means_single_attempt() {
        let policy = RetryPolicy::new(0, Duration::from_millis(1000));
        let cmd = PendingCommand::new(VeBusCodec::device_reset(), false, Instant::now());
        assert!(!policy.should_retry(&cmd));
    }

    #[test]
    fn test_awaiting_slot_matching_and_deadline() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1000));
        let sent_at = Instant::now();
        let cmd = PendingCommand::new(VeBusCodec::ess_power(100, 1), true, sent_at);
        let slot = AwaitingSlot::new(cmd, sent_at, &policy);

        assert!(slot.matches(&Frame::simple(0x00, CMD_SET_ESS_POWER, vec![0x01])));
        assert!(!slot.matches(&Frame::simple(0x00, CMD_AC_INFO, vec![0u8; 12])));

        assert!(!slot.expired(sent_at + Duration::from_millis(999)));
        assert!(slot.expired(sent_at + Duration::from_millis(1000)));
    }
}
