//! Bounded frame queues.
//!
//! Exactly one producer and one consumer per queue, capacity 3 by
//! default. Two flavors, matching the two thread/async seams:
//!
//! - [`frame_queue`]: capture thread -> async sender loop. The producer
//!   blocks until space (block-until-space policy; the capture source
//!   paces itself, so backpressure here throttles capture rather than
//!   discarding frames).
//! - [`display_queue`]: async receiver loop -> display thread. The
//!   producer never blocks; if the display cannot keep up the incoming
//!   frame is dropped (drop-newest policy; stalling reception would only
//!   make every later frame stale).

use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, TrySendError};
use tokio::sync::mpsc;

use crate::{PipelineError, PipelineResult};

/// Build a capture-side frame queue.
pub fn frame_queue<T>(depth: usize) -> (FrameProducer<T>, FrameConsumer<T>) {
    let (tx, rx) = mpsc::channel(depth);
    (FrameProducer { tx }, FrameConsumer { rx })
}

/// Producer half, used from a dedicated thread.
pub struct FrameProducer<T> {
    tx: mpsc::Sender<T>,
}

impl<T> FrameProducer<T> {
    /// Block until the queue has space. Errors only when the consumer
    /// is gone, which the capture loop treats as shutdown.
    pub fn send_blocking(&self, item: T) -> PipelineResult<()> {
        self.tx
            .blocking_send(item)
            .map_err(|_| PipelineError::QueueClosed)
    }
}

/// Consumer half, used from the async pipeline loop.
pub struct FrameConsumer<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> FrameConsumer<T> {
    /// Await the next frame; `None` when the producer is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }
}

/// Build a display-side queue.
pub fn display_queue<T>(depth: usize) -> (DisplayProducer<T>, DisplayConsumer<T>) {
    let (tx, rx) = bounded(depth);
    (DisplayProducer { tx }, DisplayConsumer { rx })
}

/// Producer half, used from the async receive loop.
pub struct DisplayProducer<T> {
    tx: crossbeam_channel::Sender<T>,
}

impl<T> DisplayProducer<T> {
    /// Offer a frame without blocking. Returns `false` if the queue is
    /// full and the frame was dropped.
    pub fn offer(&self, item: T) -> PipelineResult<bool> {
        match self.tx.try_send(item) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => Ok(false),
            Err(TrySendError::Disconnected(_)) => Err(PipelineError::QueueClosed),
        }
    }
}

/// Consumer half, used from the display thread.
pub struct DisplayConsumer<T> {
    rx: crossbeam_channel::Receiver<T>,
}

/// Outcome of a timed pop on the display queue.
pub enum DisplayPop<T> {
    Frame(T),
    /// Timed out; caller polls the shutdown token and retries
    Empty,
    /// Producer gone; the stream is over
    Closed,
}

impl<T> DisplayConsumer<T> {
    /// Pop the next frame, waiting at most `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> DisplayPop<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => DisplayPop::Frame(item),
            Err(RecvTimeoutError::Timeout) => DisplayPop::Empty,
            Err(RecvTimeoutError::Disconnected) => DisplayPop::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_queue_drops_newest_when_full() {
        let (tx, rx) = display_queue(3);
        assert!(tx.offer(1).unwrap());
        assert!(tx.offer(2).unwrap());
        assert!(tx.offer(3).unwrap());
        assert!(!tx.offer(4).unwrap());

        match rx.pop_timeout(Duration::from_millis(10)) {
            DisplayPop::Frame(v) => assert_eq!(v, 1),
            _ => panic!("expected a frame"),
        }
        assert!(tx.offer(4).unwrap());
    }

    #[test]
    fn display_queue_reports_closed_producer() {
        let (tx, rx) = display_queue::<u32>(3);
        drop(tx);
        assert!(matches!(
            rx.pop_timeout(Duration::from_millis(10)),
            DisplayPop::Closed
        ));
    }

    #[tokio::test]
    async fn frame_queue_bridges_thread_to_async() {
        let (tx, mut rx) = frame_queue(3);

        let producer = std::thread::spawn(move || {
            for i in 0..10u32 {
                tx.send_blocking(i).unwrap();
            }
        });

        for expected in 0..10u32 {
            assert_eq!(rx.recv().await, Some(expected));
        }
        assert_eq!(rx.recv().await, None);
        producer.join().unwrap();
    }
}
