//! # Interrupt Deferral Channel
//!
//! Hands an edge interrupt over to exactly one consumer task. The producer
//! side is lock-free and safe in interrupt context: it bumps a pending
//! count and notifies the bound consumer. The consumer blocks on its task
//! notification and drains the count in one swap, so a burst of edges
//! taken before it runs arrives as one token carrying the burst size.
//!
//! A notification is never lost: if the consumer drains between the
//! producer's increment and its notify, the notify leaves the consumer's
//! notified flag set and the next wait returns at once, finds nothing and
//! waits again.

use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::config::Tick;
use crate::kernel::{IsrNotify, Kernel};
use crate::task::TaskId;

const NO_CONSUMER: usize = usize::MAX;

/// Single-consumer, coalescing signal from interrupt to task context.
#[derive(Debug)]
pub struct DeferralChannel {
    pending: AtomicU32,
    consumer: AtomicUsize,
}

impl DeferralChannel {
    pub const fn new() -> Self {
        Self {
            pending: AtomicU32::new(0),
            consumer: AtomicUsize::new(NO_CONSUMER),
        }
    }

    /// Designate the task that drains this channel.
    pub fn bind(&self, consumer: TaskId) {
        self.consumer.store(consumer, Ordering::Release);
    }

    /// Bound consumer, if any.
    pub fn consumer(&self) -> Option<TaskId> {
        match self.consumer.load(Ordering::Acquire) {
            NO_CONSUMER => None,
            id => Some(id),
        }
    }

    /// Producer side. Interrupt-safe, never blocks.
    ///
    /// Records one edge, wakes the consumer and requests a context switch
    /// when the consumer outranks the interrupted task. Returns whether a
    /// switch was requested. Edges arriving before a consumer is bound stay
    /// pending.
    pub fn signal<N: IsrNotify>(&self, isr: &N) -> bool {
        self.pending.fetch_add(1, Ordering::AcqRel);
        let Some(consumer) = self.consumer() else {
            return false;
        };
        let switch = isr.notify_from_isr(consumer);
        if switch {
            isr.yield_from_isr();
        }
        switch
    }

    /// Take every pending edge without blocking.
    #[inline]
    pub fn try_take(&self) -> Option<u32> {
        match self.pending.swap(0, Ordering::AcqRel) {
            0 => None,
            n => Some(n),
        }
    }

    /// Consumer side. Blocks until at least one edge is pending, then
    /// returns how many coalesced. `None` when `timeout` ticks pass first.
    ///
    /// Wakeups that find nothing pending block again for the remainder of
    /// `timeout` only.
    pub fn wait<K: Kernel>(&self, kernel: &K, timeout: Option<Tick>) -> Option<u32> {
        let deadline = timeout.map(|t| kernel.tick_count().saturating_add(t));
        loop {
            if let Some(edges) = self.try_take() {
                return Some(edges);
            }
            let remaining = match deadline {
                Some(deadline) => {
                    let left = deadline.saturating_sub(kernel.tick_count());
                    if left == 0 {
                        return None;
                    }
                    Some(left)
                }
                None => None,
            };
            if !kernel.wait_notification(remaining) {
                return self.try_take();
            }
        }
    }
}

impl Default for DeferralChannel {
    fn default() -> Self {
        Self::new()
    }
}
