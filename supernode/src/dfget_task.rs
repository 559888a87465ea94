use std::collections::HashMap;
use dashmap::DashMap;
use serde_derive::{Deserialize, Serialize};
use crate::error::{Result, SupernodeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DfgetTaskStatus {
    #[default]
    Waiting,
    Running,
    Success,
    Failed,
}

// Download session of one client for one task.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DfgetTask {

    pub cid: String,

    pub task_id: String,

    pub peer_id: String,

    // Where the peer offers the file to other peers over http.
    pub path: String,

    pub piece_size: i32,

    pub status: DfgetTaskStatus,

    pub call_system: String,

    pub dfdaemon: bool,

    // Supernode address the client registered with.
    pub supernode_ip: String,

}

// Registry of dfget tasks keyed by (client id, task id).
#[derive(Debug, Default)]
pub struct DfgetTaskRegistry {

    tasks: DashMap<String, DfgetTask>,

    // "{peerID}@{taskID}" -> client id.
    peer_to_cid: DashMap<String, String>,

}

fn task_key(cid: &str, task_id: &str) -> Result<String> {
    if cid.is_empty() {
        return Err(SupernodeError::EmptyValue("cID".to_string()));
    }
    if task_id.is_empty() {
        return Err(SupernodeError::EmptyValue("taskID".to_string()));
    }
    Ok(format!("{}@{}", cid, task_id))
}

fn peer_key(peer_id: &str, task_id: &str) -> Result<String> {
    if peer_id.is_empty() {
        return Err(SupernodeError::EmptyValue("peerID".to_string()));
    }
    if task_id.is_empty() {
        return Err(SupernodeError::EmptyValue("taskID".to_string()));
    }
    Ok(format!("{}@{}", peer_id, task_id))
}

impl DfgetTaskRegistry {

    pub fn new() -> Self {
        Self::default()
    }

    // Adds or replaces the session, new sessions start as WAITING.
    pub fn add(&self, task: DfgetTask) -> Result<()> {
        if task.path.is_empty() {
            return Err(SupernodeError::EmptyValue("path".to_string()));
        }
        let key = task_key(&task.cid, &task.task_id)?;
        let pkey = peer_key(&task.peer_id, &task.task_id)?;
        self.peer_to_cid.insert(pkey, task.cid.clone());
        tracing::debug!("add dfget task {}", key);
        self.tasks.insert(key, task);
        Ok(())
    }

    pub fn get(&self, cid: &str, task_id: &str) -> Result<DfgetTask> {
        let key = task_key(cid, task_id)?;
        self.tasks
            .get(&key)
            .map(|t| t.value().clone())
            .ok_or_else(|| SupernodeError::DataNotFound(format!("dfget task {}", key)))
    }

    pub fn update_status(&self, cid: &str, task_id: &str, status: DfgetTaskStatus) -> Result<()> {
        let key = task_key(cid, task_id)?;
        let mut task = self.tasks
            .get_mut(&key)
            .ok_or_else(|| SupernodeError::DataNotFound(format!("dfget task {}", key)))?;
        // A finished session stays finished.
        if task.status != DfgetTaskStatus::Success {
            task.status = status;
        }
        Ok(())
    }

    pub fn delete(&self, cid: &str, task_id: &str) -> Result<()> {
        let key = task_key(cid, task_id)?;
        let (_, task) = self.tasks
            .remove(&key)
            .ok_or_else(|| SupernodeError::DataNotFound(format!("dfget task {}", key)))?;
        if let Ok(pkey) = peer_key(&task.peer_id, task_id) {
            self.peer_to_cid.remove_if(&pkey, |_, c| c == cid);
        }
        Ok(())
    }

    pub fn cid_by_peer_and_task(&self, peer_id: &str, task_id: &str) -> Result<String> {
        let pkey = peer_key(peer_id, task_id)?;
        self.peer_to_cid
            .get(&pkey)
            .map(|c| c.value().clone())
            .ok_or_else(|| SupernodeError::DataNotFound(format!("cid of {}", pkey)))
    }

    pub fn cids_by_task(&self, task_id: &str) -> Vec<String> {
        self.tasks
            .iter()
            .filter(|t| t.task_id == task_id)
            .map(|t| t.cid.clone())
            .collect()
    }

    // Client id -> task id of every session the peer takes part in.
    pub fn cids_and_tasks_by_peer(&self, peer_id: &str) -> HashMap<String, String> {
        self.tasks
            .iter()
            .filter(|t| t.peer_id == peer_id)
            .map(|t| (t.cid.clone(), t.task_id.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(cid: &str, task_id: &str, peer_id: &str) -> DfgetTask {
        DfgetTask {
            cid: cid.to_string(),
            task_id: task_id.to_string(),
            peer_id: peer_id.to_string(),
            path: "/peer/file/taskFileName".to_string(),
            piece_size: 4 * 1024 * 1024,
            call_system: "foo".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_add_and_update() -> Result<()> {
        let registry = DfgetTaskRegistry::new();
        registry.add(task("foo", "test1", "peer1"))?;
        assert_eq!(registry.get("foo", "test1")?.status, DfgetTaskStatus::Waiting);

        registry.update_status("foo", "test1", DfgetTaskStatus::Failed)?;
        assert_eq!(registry.get("foo", "test1")?.status, DfgetTaskStatus::Failed);

        registry.update_status("foo", "test1", DfgetTaskStatus::Success)?;
        registry.update_status("foo", "test1", DfgetTaskStatus::Running)?;
        assert_eq!(registry.get("foo", "test1")?.status, DfgetTaskStatus::Success);

        assert!(registry.update_status("bar", "test1", DfgetTaskStatus::Running).unwrap_err().is_data_not_found());
        assert!(matches!(registry.add(task("", "t", "p")), Err(SupernodeError::EmptyValue(_))));
        Ok(())
    }

    #[test]
    fn test_cid_by_peer_and_task() -> Result<()> {
        let registry = DfgetTaskRegistry::new();
        registry.add(task("foo", "test1", "peer1"))?;
        registry.add(task("bar", "test2", "peer2"))?;

        assert_eq!(registry.cid_by_peer_and_task("peer1", "test1")?, "foo");
        assert!(registry.cid_by_peer_and_task("", "").is_err());
        assert!(registry.cid_by_peer_and_task("peer1", "").is_err());
        assert!(registry.cid_by_peer_and_task("peer1", "test2").is_err());
        assert!(registry.cid_by_peer_and_task("peer2", "test1").is_err());
        Ok(())
    }

    #[test]
    fn test_lookups_and_delete() -> Result<()> {
        let registry = DfgetTaskRegistry::new();
        registry.add(task("foo", "test1", "peer1"))?;
        registry.add(task("bar", "test1", "peer2"))?;
        registry.add(task("baz", "test2", "peer1"))?;

        let mut cids = registry.cids_by_task("test1");
        cids.sort();
        assert_eq!(cids, vec!["bar", "foo"]);

        let by_peer = registry.cids_and_tasks_by_peer("peer1");
        assert_eq!(by_peer.len(), 2);
        assert_eq!(by_peer["baz"], "test2");

        registry.delete("foo", "test1")?;
        assert!(registry.get("foo", "test1").is_err());
        assert!(registry.cid_by_peer_and_task("peer1", "test1").is_err());
        assert_eq!(registry.cid_by_peer_and_task("peer1", "test2")?, "baz");
        assert!(registry.delete("foo", "test1").unwrap_err().is_data_not_found());
        Ok(())
    }
}
