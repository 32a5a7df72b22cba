//! The registry of playing peers: every control connection that issued a
//! start-play and is being streamed to.

use crate::task_session::SessionMessage;
use log::{trace, warn};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender as USender;

// session ids are handed out once per process and never reused; id 0 stays
// reserved as the failure value on the wire
static NEXT_ID: AtomicU32 = AtomicU32::new(1);

/// One playing peer. Owned by the registry; session and heartbeat tasks only
/// look records up by key.
#[derive(Debug)]
pub struct Peer {
    pub id: u32,
    /// letterbox of the session task owning the control channel
    pub send: USender<SessionMessage>,
    /// where broadcast datagrams go; absent until the peer registers over udp
    pub udp_peer: Option<SocketAddr>,
    pub last_heartbeat: Instant,
}

#[derive(Debug, Default)]
pub struct Registry {
    peers: HashMap<SocketAddr, Peer>,
}

pub type SharedRegistry = Arc<Mutex<Registry>>;

impl Registry {
    pub fn shared() -> SharedRegistry {
        Arc::new(Mutex::new(Registry::default()))
    }

    /// Enroll a control channel and hand out a fresh session id. Returns
    /// `None` when the channel is already enrolled, leaving the first
    /// enrollment intact.
    pub fn add(&mut self, ctl_peer: SocketAddr, send: USender<SessionMessage>) -> Option<u32> {
        if self.peers.contains_key(&ctl_peer) {
            warn!("repeat add tcp://{}", ctl_peer);
            return None;
        }

        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        self.peers.insert(ctl_peer, Peer {
            id,
            send,
            udp_peer: None,
            last_heartbeat: Instant::now(),
        });

        trace!("add id:{} tcp://{}", id, ctl_peer);
        Some(id)
    }

    /// Drop a peer. A double remove is an anomaly worth logging but nothing
    /// more, termination paths are allowed to race.
    pub fn remove(&mut self, ctl_peer: SocketAddr) {
        if self.peers.remove(&ctl_peer).is_none() {
            warn!("repeat remove tcp://{}", ctl_peer);
        } else {
            trace!("remove tcp://{}", ctl_peer);
        }
    }

    /// Refresh a peer's liveness stamp. Returns false for unknown peers.
    pub fn touch(&mut self, ctl_peer: SocketAddr) -> bool {
        match self.peers.get_mut(&ctl_peer) {
            Some(peer) => {
                peer.last_heartbeat = Instant::now();
                true
            }
            None => false,
        }
    }

    pub fn last_heartbeat(&self, ctl_peer: SocketAddr) -> Option<Instant> {
        self.peers.get(&ctl_peer).map(|peer| peer.last_heartbeat)
    }

    /// Bind a session id to the datagram address it registered from.
    /// Linear scan, session counts stay in the tens.
    pub fn fill_udp_peer(&mut self, id: u32, udp_peer: SocketAddr) -> bool {
        match self.peers.values_mut().find(|peer| peer.id == id) {
            Some(peer) => {
                trace!("fill udp peer id:{} udp://{}", id, udp_peer);
                peer.udp_peer = Some(udp_peer);
                true
            }
            None => false,
        }
    }

    /// Datagram addresses of every peer that registered one. Peers that never
    /// registered are skipped by broadcast but still heartbeat-supervised.
    pub fn udp_targets(&self) -> Vec<SocketAddr> {
        self.peers.values().filter_map(|peer| peer.udp_peer).collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    fn ctl(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    #[test]
    fn ids_are_positive_and_strictly_increasing() {
        let mut registry = Registry::default();
        let (send, _recv) = unbounded_channel();

        let first = registry.add(ctl(4000), send.clone()).unwrap();
        let second = registry.add(ctl(4001), send.clone()).unwrap();
        let third = registry.add(ctl(4002), send).unwrap();

        assert!(first > 0);
        assert!(second > first);
        assert!(third > second);
    }

    #[test]
    fn repeat_add_is_rejected() {
        let mut registry = Registry::default();
        let (send, _recv) = unbounded_channel();

        let id = registry.add(ctl(4100), send.clone()).unwrap();
        assert_eq!(registry.add(ctl(4100), send), None);

        // the first enrollment is untouched
        assert!(registry.fill_udp_peer(id, ctl(9999)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_tolerates_a_double_remove() {
        let mut registry = Registry::default();
        let (send, _recv) = unbounded_channel();

        registry.add(ctl(4200), send).unwrap();
        registry.remove(ctl(4200));
        registry.remove(ctl(4200));
        assert!(registry.is_empty());
    }

    #[test]
    fn broadcast_skips_peers_without_a_datagram_endpoint() {
        let mut registry = Registry::default();
        let (send, _recv) = unbounded_channel();

        let registered = registry.add(ctl(4300), send.clone()).unwrap();
        registry.add(ctl(4301), send).unwrap();

        let udp_peer = ctl(5300);
        assert!(registry.fill_udp_peer(registered, udp_peer));
        assert_eq!(registry.udp_targets(), vec![udp_peer]);
    }

    #[test]
    fn unknown_id_does_not_register() {
        let mut registry = Registry::default();
        assert!(!registry.fill_udp_peer(123_456, ctl(5400)));
    }

    #[test]
    fn touch_refreshes_known_peers_only() {
        let mut registry = Registry::default();
        let (send, _recv) = unbounded_channel();

        registry.add(ctl(4500), send).unwrap();
        let before = registry.last_heartbeat(ctl(4500)).unwrap();
        assert!(registry.touch(ctl(4500)));
        assert!(registry.last_heartbeat(ctl(4500)).unwrap() >= before);

        assert!(!registry.touch(ctl(4501)));
    }
}
