use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::error::{Result, RouterError};

/// Outbound frames queued per node before `send` applies backpressure.
const OUTBOUND_QUEUE: usize = 128;

/// One storage node's control connection, as the scheduling engine sees it.
///
/// Outbound writes are serialized through a bounded queue drained by a
/// dedicated writer task, so a frame is always written whole with respect to
/// other concurrent senders and never while the scheduler lock is held.
///
/// The load statistics are plain atomics; every mutation that the scheduler
/// ranks on happens under the caller's scheduler lock, the atomics only make
/// the reads safe from diagnostic paths.
pub struct NodeHandle {
    id: u16,
    outbound: mpsc::Sender<Vec<u8>>,
    /// Requests dispatched to this node and not yet health-reported.
    in_flight: AtomicU64,
    /// Bit pattern of the f64 average response time the node last reported.
    avg_response_ns: AtomicU64,
    /// Position in the scheduler's backing array. Owned by the scheduler.
    index: AtomicUsize,
}

impl NodeHandle {
    /// Wraps the write half of a node's control connection and spawns its
    /// writer task.
    pub fn new<W>(id: u16, writer: W) -> Arc<Self>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        tokio::spawn(write_loop(id, writer, rx));
        Arc::new(Self {
            id,
            outbound: tx,
            in_flight: AtomicU64::new(0),
            avg_response_ns: AtomicU64::new(0f64.to_bits()),
            index: AtomicUsize::new(0),
        })
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    /// Enqueues a frame for delivery to the node.
    ///
    /// Waits only when the node's outbound queue is full; fails if the
    /// writer task has stopped.
    pub async fn send(&self, frame: Vec<u8>) -> Result<()> {
        self.outbound
            .send(frame)
            .await
            .map_err(|_| RouterError::NodeGone(self.id))
    }

    /// One more request routed to this node.
    pub fn record_dispatch(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    /// A health report means the node finished serving one request: the
    /// in-flight counter drops by one (never below zero) and the reported
    /// average overwrites the stored one. The node computes the moving
    /// average itself; the router only relays it.
    pub fn record_health(&self, avg_response_ns: f64) {
        let _ = self
            .in_flight
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            });
        self.avg_response_ns
            .store(avg_response_ns.to_bits(), Ordering::Relaxed);
    }

    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn avg_response_ns(&self) -> f64 {
        f64::from_bits(self.avg_response_ns.load(Ordering::Relaxed))
    }

    pub(crate) fn index(&self) -> usize {
        self.index.load(Ordering::Relaxed)
    }

    pub(crate) fn set_index(&self, index: usize) {
        self.index.store(index, Ordering::Relaxed);
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle")
            .field("id", &self.id)
            .field("in_flight", &self.in_flight())
            .field("avg_response_ns", &self.avg_response_ns())
            .finish()
    }
}

/// Drains the outbound queue onto the node's socket.
///
/// A failed write is logged and the node kept in rotation; there is no
/// eviction protocol, a dead connection surfaces here until shutdown.
async fn write_loop<W>(id: u16, mut writer: W, mut rx: mpsc::Receiver<Vec<u8>>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        match writer.write_all(&frame).await {
            Ok(()) => debug!(node_id = id, len = frame.len(), "frame sent to node"),
            Err(e) => error!(node_id = id, error = %e, "socket write to node failed"),
        }
    }
    debug!(node_id = id, "node writer task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_dispatch_increments_in_flight() {
        let node = NodeHandle::new(1, tokio::io::sink());
        assert_eq!(node.in_flight(), 0);
        node.record_dispatch();
        node.record_dispatch();
        assert_eq!(node.in_flight(), 2);
    }

    #[tokio::test]
    async fn test_health_decrements_and_overwrites_average() {
        let node = NodeHandle::new(1, tokio::io::sink());
        node.record_dispatch();
        node.record_health(50_000_000.0);
        assert_eq!(node.in_flight(), 0);
        assert_eq!(node.avg_response_ns(), 50_000_000.0);

        // The reported value is authoritative, not blended locally.
        node.record_dispatch();
        node.record_health(10_000_000.0);
        assert_eq!(node.avg_response_ns(), 10_000_000.0);
    }

    #[tokio::test]
    async fn test_in_flight_never_underflows() {
        let node = NodeHandle::new(1, tokio::io::sink());
        node.record_health(1.0);
        node.record_health(2.0);
        assert_eq!(node.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_send_writes_whole_frame() {
        let (tx, mut rx) = tokio::io::duplex(64);
        let node = NodeHandle::new(7, tx);
        node.send(vec![1, 2, 3, 4]).await.unwrap();

        let mut buf = [0u8; 4];
        rx.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_fresh_node_has_zero_average() {
        let node = NodeHandle::new(1, tokio::io::sink());
        assert_eq!(node.avg_response_ns(), 0.0);
    }
}
