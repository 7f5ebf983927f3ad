//! HTTP/2 flow control as seen by the call engine.
//!
//! The credit ledger itself belongs to the transport. The engine withdraws
//! credit before sending and reconciles received bytes before reading on.
//! [`CreditWindow`] is an in-memory ledger implementing both directions,
//! usable by transports that do not keep their own.

use parking_lot::Mutex;
use std::future::Future;
use tokio::sync::Notify;

/// Default initial window size (RFC 7540 Section 6.9.2).
pub const DEFAULT_WINDOW_SIZE: u32 = 65_535;

/// Largest legal window (RFC 7540 Section 6.9.1).
pub const MAX_WINDOW_SIZE: i64 = 0x7fff_ffff;

/// Window for data this side sends.
pub trait OutgoingFlowControl {
    /// Take up to `wanted` bytes of credit.
    ///
    /// Suspends while the window is exhausted. Returns the number of bytes
    /// granted, which is at least one unless `wanted` is zero.
    fn withdraw_credit(&self, wanted: usize) -> impl Future<Output = usize> + Send;

    /// Put credit back, either unused withdrawals or a peer WINDOW_UPDATE.
    fn receive_credit(&self, amount: usize);
}

/// Window for data this side receives.
pub trait IncomingFlowControl {
    /// Record credit to hand back to the peer on the next `update_window`.
    fn add_credit(&self, amount: usize);

    /// Record `amount` received bytes. Returns the remaining window, which
    /// is negative if the peer overran it.
    fn consume_credit(&self, amount: usize) -> i64;

    /// Announce accumulated credit to the peer if enough has built up.
    /// Returns whether an update was sent.
    fn update_window(&self) -> impl Future<Output = bool> + Send;
}

/// Outcome of one send step across the stream and connection windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grant {
    /// Bytes that may go out now.
    pub send: usize,
    /// Stream credit to return because the connection granted less.
    pub refund: usize,
}

impl Grant {
    /// Whether this step carries everything that was wanted.
    pub fn is_complete(&self, wanted: usize) -> bool {
        self.send == wanted
    }
}

/// Reconcile the stream grant with the connection grant for one step.
///
/// The step is bounded by the smaller grant; stream credit the connection
/// could not match is refunded.
pub fn split_grant(wanted: usize, stream_granted: usize, conn_granted: usize) -> Grant {
    let send = wanted.min(stream_granted).min(conn_granted);
    Grant {
        send,
        refund: stream_granted - send,
    }
}

#[derive(Debug)]
struct Ledger {
    /// Current window; negative after an overrun.
    window: i64,
    /// Consumed bytes not yet announced back to the peer.
    pending: u64,
    /// Announce once `pending` reaches this.
    update_threshold: u64,
    /// Total credit announced so far.
    announced: u64,
}

/// In-memory credit ledger for one scope and direction.
///
/// Outgoing use: `withdraw_credit` suspends until `receive_credit` makes
/// room. Incoming use: `add_credit` accumulates credit that
/// `update_window` folds back into the window once half of the initial
/// window is pending.
#[derive(Debug)]
pub struct CreditWindow {
    ledger: Mutex<Ledger>,
    notify: Notify,
}

impl CreditWindow {
    /// Create a window with `initial` bytes of credit.
    pub fn new(initial: u32) -> Self {
        Self {
            ledger: Mutex::new(Ledger {
                window: i64::from(initial),
                pending: 0,
                // Send update when half the window has been consumed.
                update_threshold: u64::from(initial / 2).max(1),
                announced: 0,
            }),
            notify: Notify::new(),
        }
    }

    /// Current window size.
    pub fn available(&self) -> i64 {
        self.ledger.lock().window
    }

    /// Credit recorded but not yet announced.
    pub fn pending_update(&self) -> u64 {
        self.ledger.lock().pending
    }

    /// Total credit announced by `update_window`.
    pub fn announced(&self) -> u64 {
        self.ledger.lock().announced
    }
}

impl Default for CreditWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

impl OutgoingFlowControl for CreditWindow {
    async fn withdraw_credit(&self, wanted: usize) -> usize {
        if wanted == 0 {
            return 0;
        }
        loop {
            // Registered before the check so a concurrent receive_credit
            // cannot slip between the check and the wait.
            let notified = self.notify.notified();
            {
                let mut ledger = self.ledger.lock();
                if ledger.window > 0 {
                    let granted = (ledger.window as u64).min(wanted as u64);
                    ledger.window -= granted as i64;
                    return granted as usize;
                }
            }
            notified.await;
        }
    }

    fn receive_credit(&self, amount: usize) {
        if amount == 0 {
            return;
        }
        {
            let mut ledger = self.ledger.lock();
            ledger.window = (ledger.window + amount as i64).min(MAX_WINDOW_SIZE);
        }
        self.notify.notify_waiters();
    }
}

impl IncomingFlowControl for CreditWindow {
    fn add_credit(&self, amount: usize) {
        self.ledger.lock().pending += amount as u64;
    }

    fn consume_credit(&self, amount: usize) -> i64 {
        let mut ledger = self.ledger.lock();
        ledger.window -= amount as i64;
        ledger.window
    }

    async fn update_window(&self) -> bool {
        let mut ledger = self.ledger.lock();
        if ledger.pending < ledger.update_threshold {
            return false;
        }
        let increment = ledger.pending;
        ledger.window = (ledger.window + increment as i64).min(MAX_WINDOW_SIZE);
        ledger.announced += increment;
        ledger.pending = 0;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_split_grant_full() {
        let g = split_grant(100, 100, 100);
        assert_eq!(g, Grant { send: 100, refund: 0 });
        assert!(g.is_complete(100));
    }

    #[test]
    fn test_split_grant_connection_short() {
        let g = split_grant(100, 100, 40);
        assert_eq!(g, Grant { send: 40, refund: 60 });
        assert!(!g.is_complete(100));
    }

    #[test]
    fn test_split_grant_stream_short() {
        let g = split_grant(100, 30, 30);
        assert_eq!(g, Grant { send: 30, refund: 0 });
        assert!(!g.is_complete(100));
    }

    #[test]
    fn test_split_grant_zero() {
        assert_eq!(split_grant(0, 0, 0), Grant { send: 0, refund: 0 });
    }

    #[test]
    fn test_split_grant_never_exceeds_either() {
        for wanted in 0..20 {
            for sg in 0..=wanted {
                for cg in 0..=sg {
                    let g = split_grant(wanted, sg, cg);
                    assert!(g.send <= sg);
                    assert!(g.send <= cg);
                    assert_eq!(g.send + g.refund, sg);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_withdraw_within_window() {
        let w = CreditWindow::new(100);
        assert_eq!(w.withdraw_credit(30).await, 30);
        assert_eq!(w.available(), 70);
        assert_eq!(w.withdraw_credit(500).await, 70);
        assert_eq!(w.available(), 0);
        assert_eq!(w.withdraw_credit(0).await, 0);
    }

    #[tokio::test]
    async fn test_receive_credit_returns_refund() {
        let w = CreditWindow::new(100);
        let granted = w.withdraw_credit(80).await;
        w.receive_credit(granted - 20);
        assert_eq!(w.available(), 80);
    }

    #[tokio::test]
    async fn test_withdraw_waits_for_credit() {
        let w = Arc::new(CreditWindow::new(0));
        let waiter = {
            let w = w.clone();
            tokio::spawn(async move { w.withdraw_credit(10).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        w.receive_credit(4);
        assert_eq!(waiter.await.unwrap(), 4);
        assert_eq!(w.available(), 0);
    }

    #[tokio::test]
    async fn test_incoming_update_threshold() {
        let w = CreditWindow::new(100);

        w.add_credit(20);
        assert_eq!(w.consume_credit(20), 80);
        assert!(!w.update_window().await);
        assert_eq!(w.pending_update(), 20);

        w.add_credit(30);
        assert_eq!(w.consume_credit(30), 50);
        assert!(w.update_window().await);
        assert_eq!(w.available(), 100);
        assert_eq!(w.pending_update(), 0);
        assert_eq!(w.announced(), 50);
    }

    #[test]
    fn test_consume_past_window_goes_negative() {
        let w = CreditWindow::new(10);
        assert_eq!(w.consume_credit(15), -5);
    }

    #[test]
    fn test_receive_credit_capped() {
        let w = CreditWindow::new(MAX_WINDOW_SIZE as u32);
        w.receive_credit(10);
        assert_eq!(w.available(), MAX_WINDOW_SIZE);
    }
}
