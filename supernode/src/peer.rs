use std::{
    net::Ipv4Addr,
    sync::atomic::{AtomicU64, Ordering},
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_derive::{Deserialize, Serialize};
use crate::{
    error::{Result, SupernodeError},
    filter::PageFilter,
    lock_pool::LockPool,
};

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PeerCreateRequest {

    #[serde(alias = "IP")]
    pub ip: String,

    #[serde(alias = "HostName")]
    pub host_name: String,

    #[serde(alias = "Port", default)]
    pub port: u16,

    #[serde(alias = "Version", default)]
    pub version: String,

}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {

    // "{hostname}-{ip}-{unix nanos}".
    pub id: String,

    pub ip: Ipv4Addr,

    pub host_name: String,

    pub port: u16,

    pub version: String,

    pub created: DateTime<Utc>,

    // Registration order, breaks ties between equal timestamps.
    #[serde(skip)]
    seq: u64,

}

// Registry of every peer known to the supernode.
#[derive(Debug, Default)]
pub struct PeerRegistry {

    peers: DashMap<String, PeerInfo>,

    next_seq: AtomicU64,

    locks: LockPool,

}

impl PeerRegistry {

    pub fn new(locks: LockPool) -> Self {
        Self {
            peers: DashMap::new(),
            next_seq: AtomicU64::new(0),
            locks,
        }
    }

    // Adds a peer and returns its generated id.
    pub fn register(&self, req: &PeerCreateRequest) -> Result<String> {
        let ip: Ipv4Addr = req.ip.parse()
            .map_err(|_| SupernodeError::InvalidValue(format!("peer IP: {}", req.ip)))?;
        if req.host_name.trim().is_empty() {
            return Err(SupernodeError::InvalidValue("peer hostname is empty".to_string()));
        }

        let created = Utc::now();
        let id = format!(
            "{}-{}-{}",
            req.host_name,
            ip,
            created.timestamp_nanos_opt().unwrap_or_default(),
        );
        let info = PeerInfo {
            id: id.clone(),
            ip,
            host_name: req.host_name.clone(),
            port: req.port,
            version: req.version.clone(),
            created,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        };
        self.peers.insert(id.clone(), info);
        tracing::info!("registered peer {}", id);
        Ok(id)
    }

    pub fn deregister(&self, peer_id: &str) -> Result<()> {
        if peer_id.is_empty() {
            return Err(SupernodeError::EmptyValue("peerID".to_string()));
        }
        match self.peers.remove(peer_id) {
            Some(_) => {
                tracing::info!("deregistered peer {}", peer_id);
                Ok(())
            },
            None => Err(SupernodeError::DataNotFound(format!("peer {}", peer_id))),
        }
    }

    pub async fn get(&self, peer_id: &str) -> Result<PeerInfo> {
        let _guard = self.locks.read(peer_id).await;
        self.get_info(peer_id)
    }

    fn get_info(&self, peer_id: &str) -> Result<PeerInfo> {
        if peer_id.is_empty() {
            return Err(SupernodeError::EmptyValue("peerID".to_string()));
        }
        self.peers
            .get(peer_id)
            .map(|p| p.value().clone())
            .ok_or_else(|| SupernodeError::DataNotFound(format!("peer {}", peer_id)))
    }

    // Peers in registration order, optionally paged.
    pub fn list(&self, filter: Option<&PageFilter>) -> Vec<PeerInfo> {
        let peers: Vec<PeerInfo> = self.peers.iter().map(|p| p.value().clone()).collect();
        let by_created = |a: &PeerInfo, b: &PeerInfo| {
            a.created.cmp(&b.created).then(a.seq.cmp(&b.seq))
        };
        match filter {
            Some(filter) => filter.page(peers, by_created),
            None => {
                let mut peers = peers;
                peers.sort_by(by_created);
                peers
            },
        }
    }

    pub fn all_peer_ids(&self) -> Vec<String> {
        self.peers.iter().map(|p| p.key().clone()).collect()
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
    use crate::filter::SortDirect;

    fn request(ip: &str, host: &str) -> PeerCreateRequest {
        PeerCreateRequest {
            ip: ip.to_string(),
            host_name: host.to_string(),
            port: 65001,
            version: "0.3.0".to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_and_get() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let registry = PeerRegistry::new(LockPool::new());
        let id = registry.register(&request("192.168.10.11", "foo"))?;
        assert!(id.starts_with("foo-192.168.10.11-"));

        let peer = registry.get(&id).await?;
        assert_eq!(peer.ip, Ipv4Addr::new(192, 168, 10, 11));
        assert_eq!(peer.port, 65001);
        assert_eq!(registry.all_peer_ids(), vec![id.clone()]);

        registry.deregister(&id)?;
        assert!(registry.get(&id).await.unwrap_err().is_data_not_found());
        assert!(registry.deregister(&id).unwrap_err().is_data_not_found());
        Ok(())
    }

    #[test]
    fn test_register_validation() {
        let registry = PeerRegistry::new(LockPool::new());
        assert!(matches!(
            registry.register(&request("192.168.10.256", "foo")),
            Err(SupernodeError::InvalidValue(_)),
        ));
        assert!(matches!(
            registry.register(&request("::1", "foo")),
            Err(SupernodeError::InvalidValue(_)),
        ));
        assert!(matches!(
            registry.register(&request("10.0.0.1", " ")),
            Err(SupernodeError::InvalidValue(_)),
        ));
    }

    #[test]
    fn test_list_order_and_paging() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let registry = PeerRegistry::new(LockPool::new());
        let ids: Vec<String> = (1..=5)
            .map(|i| registry.register(&request(&format!("10.0.0.{}", i), "host")))
            .collect::<Result<_>>()?;

        let listed: Vec<String> = registry.list(None).into_iter().map(|p| p.id).collect();
        assert_eq!(listed, ids);

        let filter = PageFilter { page_num: 0, page_size: 2, sort_direct: SortDirect::Desc, ..Default::default() };
        let listed: Vec<String> = registry.list(Some(&filter)).into_iter().map(|p| p.id).collect();
        assert_eq!(listed, vec![ids[4].clone(), ids[3].clone()]);
        Ok(())
    }
}
