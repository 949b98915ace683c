use std::net::{SocketAddr, SocketAddrV4};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{info, warn};

use fsrouter_proto::{encode_addr_v4, Frame, MessageType, ProtoError};

use crate::error::{Result, RouterError};
use crate::node::NodeHandle;
use crate::pending::PendingClients;
use crate::scheduler::{Policy, Scheduler};
use crate::telemetry::{Telemetry, TelemetryEvent};

/// Shared state handed to every connection-handling task. Constructed once
/// at startup; no ambient globals.
pub struct RouterContext {
    /// The single lock guarding every scheduler mutation, so that
    /// dispatch-and-increment is one atomic step to all concurrent
    /// dispatchers.
    scheduler: Mutex<Scheduler>,
    pending: PendingClients,
    telemetry: Telemetry,
}

impl RouterContext {
    /// Scheduler contents for diagnostics; consistent only because it takes
    /// the same lock mutation does.
    pub async fn scheduler_snapshot(&self) -> Vec<Arc<NodeHandle>> {
        self.scheduler.lock().await.snapshot()
    }

    pub fn pending_clients(&self) -> usize {
        self.pending.len()
    }
}

/// Accepts connections, classifies each by its first frame, and routes it to
/// the node-join, client-join or shutdown path. Health checks and
/// port-forwards arrive on already-joined node connections.
pub struct Router {
    listener: TcpListener,
    ctx: Arc<RouterContext>,
}

impl Router {
    /// Binds the listening socket. Failure here is the only error fatal to
    /// the process.
    pub async fn bind(addr: SocketAddr, policy: Policy, telemetry: Telemetry) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, ?policy, "router listening");
        Ok(Self {
            listener,
            ctx: Arc::new(RouterContext {
                scheduler: Mutex::new(Scheduler::new(policy)),
                pending: PendingClients::new(),
                telemetry,
            }),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn context(&self) -> Arc<RouterContext> {
        Arc::clone(&self.ctx)
    }

    /// The accept loop. Returns cleanly on a `Shutdown` frame; every other
    /// per-connection failure is local and does not terminate the loop.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            let (mut stream, peer) = self.listener.accept().await?;

            let (frame, raw) = match read_frame(&mut stream).await {
                Ok(Some(pair)) => pair,
                Ok(None) => {
                    info!(%peer, "peer disconnected before sending a frame");
                    continue;
                }
                Err(e) => {
                    warn!(%peer, error = %e, "bad first frame, closing connection");
                    continue;
                }
            };

            match frame {
                Frame::Shutdown => {
                    info!(%peer, "shutdown frame received, stopping accept loop");
                    return Ok(());
                }
                Frame::NodeJoin { node_id } => {
                    info!(node_id, %peer, "new storage node");
                    spawn_handler(peer, handle_node(Arc::clone(&self.ctx), stream, node_id));
                }
                Frame::ClientJoin { return_addr } => {
                    info!(%peer, client = %return_addr, "new client");
                    spawn_handler(
                        peer,
                        handle_client(Arc::clone(&self.ctx), stream, return_addr, raw),
                    );
                }
                unexpected @ (Frame::PortForward { .. } | Frame::HealthCheck { .. }) => {
                    warn!(
                        %peer,
                        tag = ?unexpected.message_type(),
                        "unsupported first frame, closing connection"
                    );
                }
            }
        }
    }
}

/// Runs one connection handler to completion, logging its error. All
/// handler failures are connection-local.
fn spawn_handler<F>(peer: SocketAddr, handler: F)
where
    F: std::future::Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = handler.await {
            warn!(%peer, error = %e, "connection handler failed");
        }
    });
}

/// Node-join path: register the node with the scheduler, then serve its
/// control connection until it closes.
async fn handle_node(ctx: Arc<RouterContext>, stream: TcpStream, node_id: u16) -> Result<()> {
    let (read_half, write_half) = stream.into_split();
    let node = NodeHandle::new(node_id, write_half);

    ctx.scheduler.lock().await.join(Arc::clone(&node));
    ctx.telemetry.record(TelemetryEvent::NodeJoined { node_id });

    node_loop(ctx, read_half, node).await
}

/// Reads frames off a joined node's control connection: health reports and
/// port-forward replies, until read error or orderly shutdown.
async fn node_loop(
    ctx: Arc<RouterContext>,
    mut read_half: OwnedReadHalf,
    node: Arc<NodeHandle>,
) -> Result<()> {
    loop {
        let frame = match read_frame(&mut read_half).await {
            Ok(Some((frame, _raw))) => frame,
            Ok(None) => {
                info!(node_id = node.id(), "node control connection closed");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        match frame {
            Frame::HealthCheck { avg_response_ns } => {
                handle_health(&ctx, &node, avg_response_ns).await;
            }
            Frame::PortForward {
                client_addr,
                listener_addr,
            } => {
                if let Err(e) = handle_port_forward(&ctx, client_addr, listener_addr).await {
                    // The client may have already given up; drop silently.
                    warn!(node_id = node.id(), error = %e, "port-forward dropped");
                }
            }
            unexpected => {
                warn!(
                    node_id = node.id(),
                    tag = ?unexpected.message_type(),
                    "unsupported frame on node connection, closing"
                );
                return Ok(());
            }
        }
    }
}

/// Health report: the node finished a request and relayed its own moving
/// average. Counter decrement, average overwrite and heap fix happen as one
/// step under the scheduler lock.
async fn handle_health(ctx: &Arc<RouterContext>, node: &Arc<NodeHandle>, avg_response_ns: f64) {
    let in_flight;
    {
        let mut scheduler = ctx.scheduler.lock().await;
        node.record_health(avg_response_ns);
        in_flight = node.in_flight();
        if let Err(e) = scheduler.rebalance(node) {
            warn!(node_id = node.id(), error = %e, "rebalance after health report failed");
        }
    }
    ctx.telemetry.record(TelemetryEvent::HealthReported {
        node_id: node.id(),
        avg_response_ns,
        in_flight,
    });
}

/// Port-forward reply: claim the pending client and relay the node's
/// data-transfer listener address to it, then let the client connection
/// close. The data transfer itself happens out-of-band between node and
/// client.
async fn handle_port_forward(
    ctx: &Arc<RouterContext>,
    client_addr: SocketAddrV4,
    listener_addr: SocketAddrV4,
) -> Result<()> {
    let key = client_addr.to_string();
    let mut client = ctx
        .pending
        .take(&key)
        .ok_or_else(|| RouterError::ClientNotFound(key.clone()))?;

    client.write_all(&encode_addr_v4(&listener_addr)).await?;
    ctx.telemetry
        .record(TelemetryEvent::PortForwarded { client: key });
    Ok(())
}

/// Client-join path: pick a node, mark the dispatch, park the client for the
/// port-forward reply, and forward the client's original join frame to the
/// node.
async fn handle_client(
    ctx: Arc<RouterContext>,
    stream: TcpStream,
    return_addr: SocketAddrV4,
    raw_frame: Vec<u8>,
) -> Result<()> {
    let (node, in_flight) = {
        let mut scheduler = ctx.scheduler.lock().await;
        // No nodes means this request fails; the router does not retry.
        let node = scheduler.dispatch()?;
        node.record_dispatch();
        scheduler.rebalance(&node)?;
        let in_flight = node.in_flight();
        (node, in_flight)
    };

    let key = return_addr.to_string();
    // Park the client before the forward so the node's reply cannot race
    // the registry insert.
    ctx.pending.insert(key.clone(), stream);

    // The frame already carries the client's return address, encoded by the
    // client itself; the node gets it verbatim.
    node.send(raw_frame).await?;

    ctx.telemetry.record(TelemetryEvent::ClientDispatched {
        node_id: node.id(),
        client: key,
        in_flight,
    });
    Ok(())
}

/// Reads one fixed-size frame: tag byte first, then exactly the remainder
/// the tag calls for.
///
/// Returns `Ok(None)` on orderly close at a frame boundary. A connection
/// that ends mid-frame delivered fewer bytes than the frame size, which is
/// a protocol violation.
async fn read_frame<R>(reader: &mut R) -> Result<Option<(Frame, Vec<u8>)>>
where
    R: AsyncRead + Unpin,
{
    let mut tag = [0u8; 1];
    match reader.read_exact(&mut tag).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let msg_type = MessageType::try_from(tag[0])?;
    let mut buf = vec![0u8; msg_type.frame_len()];
    buf[0] = tag[0];
    if buf.len() > 1 {
        reader.read_exact(&mut buf[1..]).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                RouterError::Protocol(ProtoError::ShortFrame {
                    expected: msg_type.frame_len(),
                })
            } else {
                RouterError::Io(e)
            }
        })?;
    }

    let frame = Frame::decode(&buf)?;
    Ok(Some((frame, buf)))
}
