//! Submission nonce counter

use tracing::debug;

/// Sequential nonce source owned by the batch submitter. Seeded once from the
/// signer's pending transaction count and advanced exactly once per batch the
/// node accepted; a nonce handed to a send is never handed out again.
#[derive(Debug)]
pub struct NonceCounter {
    start: u64,
    next: u64,
}

impl NonceCounter {
    pub fn new(pending_count: u64) -> Self {
        Self {
            start: pending_count,
            next: pending_count,
        }
    }

    /// Nonce the next batch will carry
    pub fn peek(&self) -> u64 {
        self.next
    }

    /// Record that the batch carrying `nonce` was dispatched
    pub fn commit(&mut self, nonce: u64) {
        debug_assert_eq!(nonce, self.next, "nonces must be committed in order");
        self.next = nonce + 1;
        debug!("Nonce {} consumed, next is {}", nonce, self.next);
    }

    /// Value observed at startup
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Number of nonces consumed by this run
    pub fn consumed(&self) -> u64 {
        self.next - self.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_pending_count() {
        let counter = NonceCounter::new(17);
        assert_eq!(counter.peek(), 17);
        assert_eq!(counter.start(), 17);
        assert_eq!(counter.consumed(), 0);
    }

    #[test]
    fn test_peek_does_not_advance() {
        let mut counter = NonceCounter::new(3);
        assert_eq!(counter.peek(), 3);
        assert_eq!(counter.peek(), 3);

        counter.commit(3);
        assert_eq!(counter.peek(), 4);
        counter.commit(4);
        assert_eq!(counter.peek(), 5);
        assert_eq!(counter.consumed(), 2);
    }
}
