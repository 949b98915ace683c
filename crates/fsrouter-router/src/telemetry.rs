use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// One significant router transition.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum TelemetryEvent {
    NodeJoined {
        node_id: u16,
    },
    ClientDispatched {
        node_id: u16,
        client: String,
        in_flight: u64,
    },
    HealthReported {
        node_id: u16,
        avg_response_ns: f64,
        in_flight: u64,
    },
    PortForwarded {
        client: String,
    },
}

/// Fire-and-forget telemetry sink.
///
/// `record` pushes onto an unbounded channel and returns immediately; a
/// background task does the persistence. The router never blocks waiting on
/// telemetry, and a stopped consumer just means events are dropped.
#[derive(Clone)]
pub struct Telemetry {
    tx: Option<mpsc::UnboundedSender<TelemetryEvent>>,
}

impl Telemetry {
    /// Consumer that logs every event through `tracing`.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(log_events(rx));
        Self { tx: Some(tx) }
    }

    /// Consumer that appends one JSON object per line to `writer`.
    pub fn spawn_with_writer<W>(writer: W) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_events(writer, rx));
        Self { tx: Some(tx) }
    }

    /// Discards every event. For tests.
    pub fn sink() -> Self {
        Self { tx: None }
    }

    pub fn record(&self, event: TelemetryEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

async fn log_events(mut rx: mpsc::UnboundedReceiver<TelemetryEvent>) {
    while let Some(event) = rx.recv().await {
        info!(target: "fsrouter::telemetry", ?event);
    }
}

async fn write_events<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<TelemetryEvent>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(event) = rx.recv().await {
        let mut line = match serde_json::to_vec(&event) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to serialize telemetry event");
                continue;
            }
        };
        line.push(b'\n');
        if let Err(e) = writer.write_all(&line).await {
            warn!(error = %e, "telemetry writer failed, dropping further events");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};

    #[tokio::test]
    async fn test_events_serialize_as_json_lines() {
        let (tx, rx) = tokio::io::duplex(1024);
        let telemetry = Telemetry::spawn_with_writer(tx);

        telemetry.record(TelemetryEvent::NodeJoined { node_id: 3 });
        telemetry.record(TelemetryEvent::PortForwarded {
            client: "10.0.0.1:5000".to_string(),
        });

        let mut lines = BufReader::new(rx).lines();
        let first = lines.next_line().await.unwrap().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&first).unwrap();
        assert_eq!(parsed["event"], "node-joined");
        assert_eq!(parsed["node_id"], 3);

        let second = lines.next_line().await.unwrap().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&second).unwrap();
        assert_eq!(parsed["event"], "port-forwarded");
        assert_eq!(parsed["client"], "10.0.0.1:5000");
    }

    #[tokio::test]
    async fn test_sink_discards_silently() {
        let telemetry = Telemetry::sink();
        telemetry.record(TelemetryEvent::ClientDispatched {
            node_id: 1,
            client: "c".to_string(),
            in_flight: 1,
        });
    }
}
