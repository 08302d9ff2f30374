//! In-process broadcast for the calibration token.
//!
//! One producer appends to a bounded ring buffer; each observer polls it on
//! a fixed interval and receives only what it has not seen yet. Single
//! process only: a multi-instance deployment needs a shared pub/sub topic
//! behind the same `push`/`since` contract.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use plantops_core::ServiceError;

use crate::model::CalibrationScanEvent;

struct Ring {
    /// Newest first, tagged with a monotonically increasing sequence.
    events: VecDeque<(u64, CalibrationScanEvent)>,
    last_seq: u64,
}

/// Fixed-capacity, newest-first buffer of calibration scans.
pub struct CalibrationBuffer {
    token: String,
    capacity: usize,
    ring: Mutex<Ring>,
}

impl CalibrationBuffer {
    pub fn new(token: &str, capacity: usize) -> Self {
        Self {
            token: token.to_string(),
            capacity,
            ring: Mutex::new(Ring {
                events: VecDeque::with_capacity(capacity),
                last_seq: 0,
            }),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn is_calibration_token(&self, raw: &str) -> bool {
        raw == self.token
    }

    fn lock(&self) -> MutexGuard<'_, Ring> {
        self.ring.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append an event, evicting the oldest past capacity. Returns the
    /// event's sequence number.
    pub fn push(&self, event: CalibrationScanEvent) -> Result<u64, ServiceError> {
        if !self.is_calibration_token(&event.token) {
            return Err(ServiceError::Validation(
                "token is not the calibration token".into(),
            ));
        }
        let mut ring = self.lock();
        ring.last_seq += 1;
        let seq = ring.last_seq;
        ring.events.push_front((seq, event));
        ring.events.truncate(self.capacity);
        Ok(seq)
    }

    /// Current contents, newest first.
    pub fn snapshot(&self) -> Vec<CalibrationScanEvent> {
        self.lock().events.iter().map(|(_, e)| e.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events newer than `cursor`, oldest first, and the new cursor.
    ///
    /// Events evicted before the observer polled are simply missed.
    pub fn since(&self, cursor: u64) -> (Vec<CalibrationScanEvent>, u64) {
        let ring = self.lock();
        let delta = ring
            .events
            .iter()
            .rev()
            .filter(|(seq, _)| *seq > cursor)
            .map(|(_, e)| e.clone())
            .collect();
        (delta, ring.last_seq.max(cursor))
    }
}

/// One frame of an observer stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    Connected,
    Events(Vec<CalibrationScanEvent>),
    KeepAlive,
}

/// Start an observer loop and hand back its frame channel.
///
/// The loop sends `Connected`, then on every tick any new events followed
/// by a keep-alive. It stops as soon as the receiver is dropped.
pub fn observe(buffer: Arc<CalibrationBuffer>, poll: Duration) -> mpsc::Receiver<StreamFrame> {
    let (tx, rx) = mpsc::channel(16);

    tokio::spawn(async move {
        if tx.send(StreamFrame::Connected).await.is_err() {
            return;
        }
        debug!("calibration observer connected");

        let mut cursor = 0;
        let mut ticker = tokio::time::interval(poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                _ = ticker.tick() => {
                    let (delta, next) = buffer.since(cursor);
                    cursor = next;
                    if !delta.is_empty() && tx.send(StreamFrame::Events(delta)).await.is_err() {
                        break;
                    }
                    if tx.send(StreamFrame::KeepAlive).await.is_err() {
                        break;
                    }
                }
            }
        }
        debug!("calibration observer disconnected");
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(n: usize) -> CalibrationScanEvent {
        CalibrationScanEvent {
            timestamp: format!("2025-01-01T00:00:{:02}.000Z", n % 60),
            token: "qr_calibration".into(),
            user_agent: format!("agent-{n}"),
            success: true,
        }
    }

    #[test]
    fn rejects_other_tokens() {
        let buf = CalibrationBuffer::new("qr_calibration", 50);
        let mut e = event(0);
        e.token = "qr_abc123".into();
        assert!(matches!(buf.push(e), Err(ServiceError::Validation(_))));
        assert!(buf.is_empty());
    }

    #[test]
    fn capacity_evicts_oldest() {
        let buf = CalibrationBuffer::new("qr_calibration", 50);
        for n in 0..51 {
            buf.push(event(n)).unwrap();
            assert!(buf.len() <= 50);
        }
        let snap = buf.snapshot();
        assert_eq!(snap.len(), 50);
        assert_eq!(snap[0].user_agent, "agent-50");
        assert_eq!(snap[49].user_agent, "agent-1");
        assert!(snap.iter().all(|e| e.user_agent != "agent-0"));
    }

    #[test]
    fn since_returns_chronological_delta() {
        let buf = CalibrationBuffer::new("qr_calibration", 50);
        for n in 0..3 {
            buf.push(event(n)).unwrap();
        }
        let (first, cursor) = buf.since(0);
        let agents: Vec<_> = first.iter().map(|e| e.user_agent.as_str()).collect();
        assert_eq!(agents, ["agent-0", "agent-1", "agent-2"]);

        let (none, same) = buf.since(cursor);
        assert!(none.is_empty());
        assert_eq!(same, cursor);

        buf.push(event(3)).unwrap();
        let (next, _) = buf.since(cursor);
        assert_eq!(next, vec![event(3)]);
    }

    #[test]
    fn slow_observer_misses_evicted_events() {
        let buf = CalibrationBuffer::new("qr_calibration", 2);
        for n in 0..5 {
            buf.push(event(n)).unwrap();
        }
        let (delta, cursor) = buf.since(0);
        assert_eq!(delta, vec![event(3), event(4)]);
        assert_eq!(cursor, 5);
    }

    #[tokio::test]
    async fn observer_streams_backlog_then_deltas() {
        let buf = Arc::new(CalibrationBuffer::new("qr_calibration", 50));
        buf.push(event(0)).unwrap();

        let mut rx = observe(buf.clone(), Duration::from_millis(10));
        assert_eq!(rx.recv().await, Some(StreamFrame::Connected));
        assert_eq!(rx.recv().await, Some(StreamFrame::Events(vec![event(0)])));
        assert_eq!(rx.recv().await, Some(StreamFrame::KeepAlive));

        buf.push(event(1)).unwrap();
        loop {
            match rx.recv().await {
                Some(StreamFrame::KeepAlive) => continue,
                Some(StreamFrame::Events(delta)) => {
                    assert_eq!(delta, vec![event(1)]);
                    break;
                }
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn observer_stops_when_receiver_dropped() {
        let buf = Arc::new(CalibrationBuffer::new("qr_calibration", 50));
        let mut rx = observe(buf.clone(), Duration::from_millis(10));
        assert_eq!(rx.recv().await, Some(StreamFrame::Connected));
        drop(rx);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(Arc::strong_count(&buf), 1);
    }
}
