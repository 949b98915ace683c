use std::str::FromStr;
use std::sync::Arc;

use crate::error::{Result, RouterError};
use crate::node::NodeHandle;

/// Load-scheduling policy. A closed set: the dispatcher stays
/// policy-agnostic because all three share the same peek-then-mutate
/// contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Nodes drawn from a flat list at an advancing cursor, wrapping modulo
    /// list length. Never reorders, unaffected by statistics.
    RoundRobin,
    /// Fewer in-flight requests wins; ties broken arbitrarily.
    LeastConnections,
    /// Fewer in-flight requests wins first; on equal in-flight counts,
    /// lower average response time wins.
    LeastResponseTime,
}

impl Policy {
    fn is_priority(self) -> bool {
        !matches!(self, Policy::RoundRobin)
    }

    /// Whether `a` ranks strictly ahead of `b` for dispatch.
    ///
    /// A fresh node (zero load, zero average) is maximally eligible under
    /// both priority policies, so new nodes get flooded first until they
    /// accumulate a worse reading. Deliberate.
    fn ranks_before(self, a: &NodeHandle, b: &NodeHandle) -> bool {
        match self {
            Policy::RoundRobin => false,
            Policy::LeastConnections => a.in_flight() < b.in_flight(),
            Policy::LeastResponseTime => {
                let (load_a, load_b) = (a.in_flight(), b.in_flight());
                if load_a != load_b {
                    return load_a < load_b;
                }
                a.avg_response_ns() < b.avg_response_ns()
            }
        }
    }
}

impl FromStr for Policy {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "round-robin" => Ok(Policy::RoundRobin),
            "least-connections" => Ok(Policy::LeastConnections),
            "least-response-time" => Ok(Policy::LeastResponseTime),
            other => Err(RouterError::UnknownPolicy(other.to_string())),
        }
    }
}

/// The scheduling engine: an ordered collection of node handles under one
/// policy.
///
/// For priority policies the backing array is a binary min-heap under
/// [`Policy::ranks_before`], and every handle's index field tracks its true
/// position through every reorder. Callers serialize all mutation
/// (`join`, `dispatch` plus the follow-up counter increment, `rebalance`)
/// behind a single lock so that dispatch-and-increment is one atomic step
/// to every concurrent dispatcher.
pub struct Scheduler {
    policy: Policy,
    nodes: Vec<Arc<NodeHandle>>,
    cursor: usize,
}

impl Scheduler {
    pub fn new(policy: Policy) -> Self {
        Self {
            policy,
            nodes: Vec::new(),
            cursor: 0,
        }
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Inserts a newly joined node. O(log n) for priority policies.
    pub fn join(&mut self, node: Arc<NodeHandle>) {
        node.set_index(self.nodes.len());
        self.nodes.push(node);
        if self.policy.is_priority() {
            self.sift_up(self.nodes.len() - 1);
        }
    }

    /// Returns the currently-best node without removing it.
    ///
    /// The same node typically keeps serving more than one in-flight
    /// request, so it must stay in the structure and keep being ranked
    /// against the others. The caller increments the node's load counter
    /// afterward and rebalances, all under the same lock.
    pub fn dispatch(&mut self) -> Result<Arc<NodeHandle>> {
        if self.nodes.is_empty() {
            return Err(RouterError::NoNodesAvailable);
        }
        match self.policy {
            Policy::RoundRobin => {
                let node = Arc::clone(&self.nodes[self.cursor]);
                self.cursor = (self.cursor + 1) % self.nodes.len();
                Ok(node)
            }
            Policy::LeastConnections | Policy::LeastResponseTime => {
                Ok(Arc::clone(&self.nodes[0]))
            }
        }
    }

    /// Re-establishes heap order around a node whose statistics changed,
    /// in O(log n) from its last known index.
    pub fn rebalance(&mut self, node: &Arc<NodeHandle>) -> Result<()> {
        if !self.policy.is_priority() {
            return Ok(());
        }
        let index = node.index();
        let placed = self
            .nodes
            .get(index)
            .is_some_and(|occupant| Arc::ptr_eq(occupant, node));
        if !placed {
            return Err(RouterError::StaleIndex {
                node_id: node.id(),
                index,
            });
        }
        let index = self.sift_up(index);
        self.sift_down(index);
        Ok(())
    }

    /// Ordered copy of the backing array, for diagnostics and telemetry.
    /// Only consistent under the same lock that guards mutation.
    pub fn snapshot(&self) -> Vec<Arc<NodeHandle>> {
        self.nodes.clone()
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.nodes.swap(i, j);
        self.nodes[i].set_index(i);
        self.nodes[j].set_index(j);
    }

    /// Moves the node at `i` toward the root while it outranks its parent.
    /// Returns its final index.
    fn sift_up(&mut self, mut i: usize) -> usize {
        while i > 0 {
            let parent = (i - 1) / 2;
            if !self
                .policy
                .ranks_before(&self.nodes[i], &self.nodes[parent])
            {
                break;
            }
            self.swap(i, parent);
            i = parent;
        }
        i
    }

    /// Moves the node at `i` toward the leaves while a child outranks it.
    fn sift_down(&mut self, mut i: usize) {
        loop {
            let left = 2 * i + 1;
            let right = left + 1;
            let mut best = i;
            if left < self.nodes.len()
                && self.policy.ranks_before(&self.nodes[left], &self.nodes[best])
            {
                best = left;
            }
            if right < self.nodes.len()
                && self
                    .policy
                    .ranks_before(&self.nodes[right], &self.nodes[best])
            {
                best = right;
            }
            if best == i {
                return;
            }
            self.swap(i, best);
            i = best;
        }
    }
}
