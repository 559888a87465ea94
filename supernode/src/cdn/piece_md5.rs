use std::collections::BTreeMap;
use dashmap::DashMap;
use crate::error::SupernodeError;
use super::{CdnError, Result};

// Piece md5 values of cached tasks kept in memory, "{md5}:{framedLen}".
#[derive(Debug, Default)]
pub struct PieceMd5s {
    tasks: DashMap<String, BTreeMap<i32, String>>,
}

// Formats the value stored for a piece of `framed_len` bytes.
pub fn piece_md5_value(md5: &str, framed_len: usize) -> String {
    format!("{}:{}", md5, framed_len)
}

impl PieceMd5s {

    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, task_id: &str, piece_num: i32, value: String) {
        self.tasks
            .entry(task_id.to_string())
            .or_default()
            .insert(piece_num, value);
    }

    pub fn get(&self, task_id: &str, piece_num: i32) -> Result<String> {
        self.tasks
            .get(task_id)
            .and_then(|pieces| pieces.get(&piece_num).cloned())
            .ok_or_else(|| CdnError::Store(SupernodeError::DataNotFound(format!(
                "piece md5 of task {} piece {}", task_id, piece_num,
            ))))
    }

    // Every piece md5 of the task in piece order, fails on gaps.
    pub fn get_all(&self, task_id: &str) -> Result<Vec<String>> {
        let pieces = self.tasks
            .get(task_id)
            .ok_or_else(|| CdnError::Store(SupernodeError::DataNotFound(format!("piece md5s of task {}", task_id))))?;
        let mut values = Vec::with_capacity(pieces.len());
        for (expected, (num, value)) in pieces.iter().enumerate() {
            if *num != expected as i32 {
                return Err(CdnError::Store(SupernodeError::DataNotFound(format!(
                    "piece md5 of task {} piece {}", task_id, expected,
                ))));
            }
            values.push(value.clone());
        }
        Ok(values)
    }

    pub fn remove(&self, task_id: &str) {
        self.tasks.remove(task_id);
    }

}
