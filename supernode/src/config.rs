use std::{
    net::Ipv4Addr,
    path::PathBuf,
    time::Duration,
};

// Prefix of every client id that belongs to the supernode itself.
pub const SUPER_NODE_CID_PREFIX: &str = "cdnnode:";

// Piece framing: 4 byte header and 1 byte trailer.
pub const PIECE_HEAD_SIZE: usize = 4;
pub const PIECE_WRAP_SIZE: usize = 5;
pub const PIECE_TAIL_CHAR: u8 = 0x7f;

pub const DEFAULT_PIECE_SIZE: i32 = 4 * 1024 * 1024;
pub const DEFAULT_PIECE_SIZE_LIMIT: i32 = 15 * 1024 * 1024;

// Name of the store bucket holding the cdn files.
pub const DOWNLOAD_HOME: &str = "download";

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

#[derive(Debug, Clone)]
pub struct Config {

    // Port the api server listens on.
    pub listen_port: u16,

    // Port peers download cdn files from.
    pub download_port: u16,

    // Working directory of the supernode.
    pub home_dir: PathBuf,

    // Root of the local store, the download bucket lives below it.
    pub download_path: PathBuf,

    // Address advertised to peers for pulling pieces from the supernode.
    pub advertise_ip: Ipv4Addr,

    // Host name the supernode registers itself with.
    pub host_name: String,

    // Maximum number of cdn pipelines running at once.
    pub scheduler_core_pool_size: usize,

    // Uploads a single peer may serve at once.
    pub peer_up_limit: i32,

    // Pieces a single client may download at once.
    pub peer_down_limit: i32,

    // Service failures after which a peer stops being scheduled.
    pub elimination_limit: i32,

    // Failures between two peers after which the pair is blacklisted.
    pub failure_count_limit: i32,

    // Bandwidth of a single origin download, bytes per second.
    pub link_limit: u64,

    // Bandwidth left to the rest of the system, bytes per second.
    pub system_reserved_bandwidth: u64,

    // Total bandwidth available to the supernode, bytes per second.
    pub max_bandwidth: u64,

    pub enable_profiler: bool,

    pub debug: bool,

    // How long an unreachable url is remembered.
    pub fail_access_interval: Duration,

    pub gc_initial_delay: Duration,

    pub gc_meta_interval: Duration,

    // Tasks not accessed for this long are collected.
    pub task_expire_time: Duration,

    // Delay between a peer reporting itself down and its removal.
    pub peer_gc_delay: Duration,

    pub gc_disk_interval: Duration,

    // Disk gc is skipped while free space is above this, in bytes.
    pub young_gc_threshold: u64,

    // Below this every unused task file is collected, in bytes.
    pub full_gc_threshold: u64,

    // Tasks re-accessed within their interval plus this are kept longer.
    pub interval_threshold: Duration,

    // Share of candidate tasks removed by one disk gc pass, out of 10.
    pub clean_ratio: usize,

    // Writer workers of a single cdn pipeline.
    pub cdn_writer_routine_limit: usize,

    // Derived from the advertise ip, see set_cid_prefix.
    cid_prefix: String,

    // Peer id the supernode registered itself with.
    super_pid: String,

}

impl Default for Config {
    fn default() -> Self {
        let home_dir = PathBuf::from("/home/admin/supernode");
        let mut config = Self {
            listen_port: 8002,
            download_port: 8001,
            download_path: home_dir.join("repo"),
            home_dir,
            advertise_ip: Ipv4Addr::LOCALHOST,
            host_name: std::env::var("HOSTNAME").unwrap_or_else(|_| "supernode".to_string()),
            scheduler_core_pool_size: 10,
            peer_up_limit: 5,
            peer_down_limit: 4,
            elimination_limit: 5,
            failure_count_limit: 5,
            link_limit: 20 * MIB,
            system_reserved_bandwidth: 20 * MIB,
            max_bandwidth: 200 * MIB,
            enable_profiler: false,
            debug: false,
            fail_access_interval: Duration::from_secs(3 * 60),
            gc_initial_delay: Duration::from_secs(6),
            gc_meta_interval: Duration::from_secs(2 * 60),
            task_expire_time: Duration::from_secs(3 * 60),
            peer_gc_delay: Duration::from_secs(3 * 60),
            gc_disk_interval: Duration::from_secs(15),
            young_gc_threshold: 100 * GIB,
            full_gc_threshold: 5 * GIB,
            interval_threshold: Duration::from_secs(2 * 60 * 60),
            clean_ratio: 1,
            cdn_writer_routine_limit: 4,
            cid_prefix: String::new(),
            super_pid: String::new(),
        };
        config.set_cid_prefix(Ipv4Addr::LOCALHOST);
        config
    }
}

impl Config {

    pub fn set_cid_prefix(&mut self, ip: Ipv4Addr) {
        self.cid_prefix = format!("{}{}~", SUPER_NODE_CID_PREFIX, ip);
    }

    // Client id the supernode uses for the given task.
    pub fn super_cid(&self, task_id: &str) -> String {
        format!("{}{}", self.cid_prefix, task_id)
    }

    pub fn is_super_cid(&self, cid: &str) -> bool {
        cid.starts_with(&self.cid_prefix)
    }

    pub fn set_super_pid(&mut self, pid: String) {
        self.super_pid = pid;
    }

    pub fn super_pid(&self) -> &str {
        &self.super_pid
    }

    pub fn is_super_pid(&self, pid: &str) -> bool {
        !self.super_pid.is_empty() && pid == self.super_pid
    }

    // Rate shared by every origin download.
    pub fn origin_bandwidth(&self) -> u64 {
        self.max_bandwidth.saturating_sub(self.system_reserved_bandwidth)
    }

    // Directory holding the download bucket.
    pub fn download_home(&self) -> PathBuf {
        self.download_path.join(DOWNLOAD_HOME)
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_super_ids() {
        let mut config = Config::default();
        config.set_cid_prefix(Ipv4Addr::new(10, 0, 0, 1));
        config.set_super_pid("supernode-10.0.0.1-1".to_string());

        let cid = config.super_cid("abc");
        assert_eq!(cid, "cdnnode:10.0.0.1~abc");
        assert!(config.is_super_cid(&cid));
        assert!(!config.is_super_cid("client-abc"));
        assert!(config.is_super_pid("supernode-10.0.0.1-1"));
        assert!(!config.is_super_pid(""));
    }

    #[test]
    fn test_origin_bandwidth() {
        let mut config = Config::default();
        assert_eq!(config.origin_bandwidth(), 180 * MIB);
        config.system_reserved_bandwidth = config.max_bandwidth + 1;
        assert_eq!(config.origin_bandwidth(), 0);
    }
}
