use std::time::Duration;

use tokio::time::{Instant, Sleep, sleep};
use tracing::debug;

/// Coalesces pushed items into a single flush after a quiescent interval, or
/// immediately once `max_buffered` is reached.
///
/// Invariant: while the buffer is non-empty exactly one flush is pending;
/// every push reschedules that single timer. Size preemption triggers a
/// synchronous flush instead of waiting on the timer.
pub struct DebouncedAggregator<T> {
    buffer: Vec<T>,
    buffered_size: usize,
    interval: Duration,
    max_buffered: usize,
    deadline: Option<Pin<Box<Sleep>>>,
}

use std::pin::Pin;

impl<T> DebouncedAggregator<T> {
    pub fn new(interval: Duration, max_buffered: usize) -> Self {
        Self {
            buffer: Vec::new(),
            buffered_size: 0,
            interval,
            max_buffered,
            deadline: None,
        }
    }

    /// Push an item with its measured size (bytes for raw output, code
    /// points for decoded text). Returns `Some(batch)` if the push itself
    /// preempted the timer by crossing `max_buffered`.
    pub fn push(&mut self, item: T, size: usize) -> Option<Vec<T>> {
        if size == 0 {
            return None;
        }

        self.buffer.push(item);
        self.buffered_size += size;

        if self.buffered_size >= self.max_buffered {
            debug!(
                event = "aggregator.size_preempt",
                buffered_size = self.buffered_size,
                max_buffered = self.max_buffered,
            );
            return Some(self.take());
        }

        self.deadline = Some(Box::pin(sleep(self.interval)));
        None
    }

    /// Wait for the pending flush timer to fire. Resolves immediately and
    /// forever pending if the buffer is currently empty — callers should
    /// select! this against other branches and only await it while non-empty.
    pub async fn wait_for_flush(&mut self) -> Vec<T> {
        loop {
            match &mut self.deadline {
                None => std::future::pending::<()>().await,
                Some(sleep) => {
                    sleep.as_mut().await;
                    break;
                }
            }
        }
        self.take()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Best-effort final flush on cancellation, per the spec's cancellation
    /// guarantee.
    pub fn drain(&mut self) -> Vec<T> {
        self.take()
    }

    fn take(&mut self) -> Vec<T> {
        self.buffered_size = 0;
        self.deadline = None;
        std::mem::take(&mut self.buffer)
    }

    #[cfg(test)]
    fn next_deadline(&self) -> Option<Instant> {
        self.deadline.as_ref().map(|s| s.deadline())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_push_is_a_no_op() {
        let mut agg: DebouncedAggregator<String> =
            DebouncedAggregator::new(Duration::from_millis(50), 1024);
        assert!(agg.push(String::new(), 0).is_none());
        assert!(agg.is_empty());
        assert!(agg.next_deadline().is_none());
    }

    #[test]
    fn size_preempt_triggers_immediate_flush_in_push_order() {
        let mut agg: DebouncedAggregator<&'static str> = DebouncedAggregator::new(
            Duration::from_secs(60),
            10,
        );
        assert!(agg.push("abcde", 5).is_none());
        let flushed = agg.push("fghij", 5).expect("size preempt should flush");
        assert_eq!(flushed, vec!["abcde", "fghij"]);
        assert!(agg.is_empty());
    }

    #[test]
    fn push_reschedules_the_single_pending_timer() {
        let mut agg: DebouncedAggregator<&'static str> =
            DebouncedAggregator::new(Duration::from_millis(100), 1024);
        agg.push("a", 1);
        let first = agg.next_deadline().unwrap();
        std::thread::sleep(Duration::from_millis(5));
        agg.push("b", 1);
        let second = agg.next_deadline().unwrap();
        assert!(second > first, "second push must push the deadline out");
    }

    #[tokio::test(start_paused = true)]
    async fn timer_flush_preserves_push_order() {
        let mut agg: DebouncedAggregator<i32> =
            DebouncedAggregator::new(Duration::from_millis(20), 1024);
        agg.push(1, 1);
        agg.push(2, 1);
        agg.push(3, 1);
        let flushed = agg.wait_for_flush().await;
        assert_eq!(flushed, vec![1, 2, 3]);
    }

    #[test]
    fn drain_returns_whatever_is_buffered() {
        let mut agg: DebouncedAggregator<i32> =
            DebouncedAggregator::new(Duration::from_secs(60), 1024);
        agg.push(1, 1);
        agg.push(2, 1);
        let drained = agg.drain();
        assert_eq!(drained, vec![1, 2]);
        assert!(agg.is_empty());
    }
}
