use dashmap::DashMap;
use tokio::net::TcpStream;
use tracing::warn;

/// Short-lived association from a client's return address (string form) to
/// its held control connection, so an asynchronous port-forward reply can be
/// correlated back to the right client.
///
/// Lives beside the scheduler lock, not under it: lookups are atomic
/// get-and-remove on a concurrent map, keeping the hot dispatch path down to
/// a single lock acquisition.
#[derive(Default)]
pub struct PendingClients {
    inner: DashMap<String, TcpStream>,
}

impl PendingClients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Holds `conn` until the matching port-forward arrives. At most one
    /// entry per address: a replaced entry is logged and its connection
    /// dropped.
    pub fn insert(&self, addr: String, conn: TcpStream) {
        if self.inner.insert(addr.clone(), conn).is_some() {
            warn!(client = %addr, "replaced pending client entry, dropping stale connection");
        }
    }

    /// Atomic get-and-remove: an entry is consumed exactly once, by
    /// whichever port-forward reply claims it first.
    pub fn take(&self, addr: &str) -> Option<TcpStream> {
        self.inner.remove(addr).map(|(_, conn)| conn)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
