//! Outbound transport seam.
//!
//! The routing and journey engines never talk to a channel provider
//! directly; they hand text to an [`OutboundSender`] and observe a boolean
//! delivery outcome. Concrete transports live outside this workspace core.

/// Channel-agnostic outbound delivery contract.
///
/// Implementations must be safe to call from concurrent worker jobs and
/// should apply their own network timeouts; callers treat `false` as a
/// terminal delivery failure, not a retry signal.
pub trait OutboundSender: Send + Sync {
    /// Sends `text` to `recipient`, returning whether delivery was accepted.
    fn send(&self, recipient: &str, text: &str) -> bool;
}

/// Sink transport that records nothing and accepts everything. Useful for
/// wiring dry runs and tests that only assert on state transitions.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOutboundSender;

impl OutboundSender for NullOutboundSender {
    fn send(&self, _recipient: &str, _text: &str) -> bool {
        true
    }
}
