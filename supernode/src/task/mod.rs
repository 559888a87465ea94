use std::{collections::HashMap, sync::Arc};
use dashmap::DashMap;
use reqwest::StatusCode;
use serde_derive::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::Instrument;
use crate::{
    cdn::{CdnManager, Md5Source},
    config::Config,
    dfget_task::{DfgetTask, DfgetTaskRegistry, DfgetTaskStatus},
    error::{Result, SupernodeError},
    filter::PageFilter,
    lock_pool::LockPool,
    origin::OriginClient,
    peer::PeerRegistry,
    progress::{PieceSelector, PieceStatus, ProgressEngine},
    range::{piece_num, piece_range},
    scheduler::{PieceResult, Scheduler},
    util::{millis, now_millis},
};

mod util;

pub use util::{convert_headers, generate_task_id};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CdnStatus {
    #[default]
    Waiting,
    Running,
    Success,
    Failed,
    SourceError,
}

impl CdnStatus {

    // The pipeline is not running and has not succeeded, so it may be
    // triggered again.
    pub fn is_frozen(self) -> bool {
        matches!(self, CdnStatus::Waiting | CdnStatus::Failed | CdnStatus::SourceError)
    }

}

// A logical download, shared by every client asking for the same file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Task {

    pub id: String,

    #[serde(rename = "rawURL")]
    pub raw_url: String,

    // Raw url without the filtered query params.
    #[serde(rename = "taskURL")]
    pub task_url: String,

    pub md5: String,

    pub identifier: String,

    pub headers: HashMap<String, String>,

    // Length of the framed file in the cache once the cdn succeeded.
    pub file_length: i64,

    // Length advertised by the origin, -1 when unknown.
    pub http_file_length: i64,

    pub piece_size: i32,

    pub piece_total: i32,

    pub cdn_status: CdnStatus,

    pub real_md5: String,

}

// Outcome of a cdn run, or a status change requested through the api.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {

    pub cdn_status: CdnStatus,

    #[serde(default)]
    pub file_length: Option<i64>,

    #[serde(default)]
    pub real_md5: Option<String>,

}

impl TaskUpdate {

    pub fn status(cdn_status: CdnStatus) -> Self {
        Self {
            cdn_status,
            file_length: None,
            real_md5: None,
        }
    }

    pub fn success(file_length: i64, real_md5: &str) -> Self {
        Self {
            cdn_status: CdnStatus::Success,
            file_length: Some(file_length),
            real_md5: Some(real_md5.to_string()),
        }
    }

}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskCreateRequest {

    #[serde(rename = "cID")]
    pub cid: String,

    pub call_system: String,

    pub dfdaemon: bool,

    // Query params left out of the task url.
    pub filter: Vec<String>,

    pub headers: HashMap<String, String>,

    pub identifier: String,

    pub md5: String,

    // Where the client serves the file to other peers.
    pub path: String,

    #[serde(rename = "peerID")]
    pub peer_id: String,

    #[serde(rename = "rawURL")]
    pub raw_url: String,

    // Overrides the filtered raw url when set.
    #[serde(rename = "taskURL")]
    pub task_url: String,

    #[serde(rename = "supernodeIP")]
    pub supernode_ip: String,

}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCreateResponse {

    #[serde(rename = "ID")]
    pub id: String,

    pub file_length: i64,

    pub piece_size: i32,

}

// Where a client stands in its download, as reported with each pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    Started,
    Running,
    Finished,
}

impl ClientStatus {

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "700" => Some(ClientStatus::Started),
            "701" => Some(ClientStatus::Running),
            "702" => Some(ClientStatus::Finished),
            _ => None,
        }
    }

}

// Result of the last piece transfer a client reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PieceOutcome {
    Failed,
    Success,
    Invalid,
    #[serde(rename = "SEMISUC")]
    SemiSuccess,
}

impl PieceOutcome {

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "500" => Some(PieceOutcome::Failed),
            "501" => Some(PieceOutcome::Success),
            "502" => Some(PieceOutcome::Invalid),
            "503" => Some(PieceOutcome::SemiSuccess),
            _ => None,
        }
    }

    fn piece_status(self) -> Option<PieceStatus> {
        match self {
            PieceOutcome::Success => Some(PieceStatus::Success),
            PieceOutcome::Failed => Some(PieceStatus::Failed),
            PieceOutcome::SemiSuccess => Some(PieceStatus::SemiSuccess),
            PieceOutcome::Invalid => None,
        }
    }

}

#[derive(Debug, Clone, Default)]
pub struct PiecePullRequest {

    // Peer the reported piece was pulled from.
    pub dst_pid: String,

    pub piece_range: String,

    pub piece_result: Option<PieceOutcome>,

    pub client_status: Option<ClientStatus>,

}

#[derive(Debug, Clone)]
pub struct PieceUpdateRequest {

    pub client_id: String,

    pub dst_pid: String,

    pub piece_status: PieceOutcome,

}

// Where and how a client pulls one piece.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PieceInfo {

    // Client id of the peer serving the piece.
    #[serde(skip)]
    pub cid: String,

    #[serde(rename = "pID")]
    pub pid: String,

    pub path: String,

    #[serde(rename = "peerIP")]
    pub peer_ip: String,

    pub peer_port: u16,

    #[serde(rename = "pieceMD5")]
    pub piece_md5: String,

    pub piece_range: String,

    pub piece_size: i32,

}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishInfo {

    pub md5: String,

    pub file_length: i64,

}

// Answer to a piece pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullPieces {

    // Nothing more to pull. Carries the file summary when the client
    // holds every piece of a finished cdn.
    Finished(Option<FinishInfo>),

    Continue(Vec<PieceInfo>),

}

// Registry of tasks. Deduplicates registrations, starts the cdn once per
// task and answers piece pulls.
pub struct TaskRegistry {

    config: Arc<Config>,

    tasks: DashMap<String, Task>,

    // Millis of the last registration or pull of each task.
    access_times: DashMap<String, i64>,

    // Millis at which the origin answered 404 for the task.
    unreachable: DashMap<String, i64>,

    locks: LockPool,

    peers: Arc<PeerRegistry>,

    dfget_tasks: Arc<DfgetTaskRegistry>,

    progress: Arc<ProgressEngine>,

    cdn: Arc<CdnManager>,

    scheduler: Scheduler,

    origin: OriginClient,

    // Bounds the cdn pipelines running at once.
    cdn_slots: Arc<Semaphore>,

}

impl TaskRegistry {

    pub fn new(
        config: Arc<Config>,
        locks: LockPool,
        peers: Arc<PeerRegistry>,
        dfget_tasks: Arc<DfgetTaskRegistry>,
        progress: Arc<ProgressEngine>,
        cdn: Arc<CdnManager>,
        origin: OriginClient,
    ) -> Self {
        Self {
            scheduler: Scheduler::new(config.clone(), progress.clone()),
            cdn_slots: Arc::new(Semaphore::new(config.scheduler_core_pool_size.max(1))),
            tasks: DashMap::new(),
            access_times: DashMap::new(),
            unreachable: DashMap::new(),
            config,
            locks,
            peers,
            dfget_tasks,
            progress,
            cdn,
            origin,
        }
    }

    // Registers a client for the download, creating the task and starting
    // its cdn when needed.
    #[tracing::instrument(skip(self, req), fields(url = %req.raw_url, cid = %req.cid))]
    pub async fn register(self: &Arc<Self>, req: &TaskCreateRequest) -> Result<TaskCreateResponse> {
        util::validate(req)?;

        let task = self.add_or_update_task(req).await?;
        tracing::debug!("registering client {} for task {}", req.cid, task.id);

        let _guard = self.locks.read(&task.id).await;
        self.access_times.insert(task.id.clone(), now_millis());

        self.dfget_tasks.add(DfgetTask {
            cid: req.cid.clone(),
            task_id: task.id.clone(),
            peer_id: req.peer_id.clone(),
            path: req.path.clone(),
            piece_size: task.piece_size,
            status: DfgetTaskStatus::Waiting,
            call_system: req.call_system.clone(),
            dfdaemon: req.dfdaemon,
            supernode_ip: req.supernode_ip.clone(),
        })?;

        let result = self.progress
            .init_progress(&task.id, &req.peer_id, &req.cid)
            .and_then(|_| {
                self.trigger_cdn(&task.id).map_err(|e| {
                    SupernodeError::SystemError(format!("failed to trigger cdn: {}", e))
                })
            });
        if let Err(e) = result {
            if let Err(e) = self.dfget_tasks.delete(&req.cid, &task.id) {
                tracing::error!("failed to roll back dfget task of client {}: {}", req.cid, e);
            }
            return Err(e);
        }

        Ok(TaskCreateResponse {
            id: task.id,
            file_length: task.http_file_length,
            piece_size: task.piece_size,
        })
    }

    async fn add_or_update_task(&self, req: &TaskCreateRequest) -> Result<Task> {
        let task_url = if req.task_url.is_empty() {
            util::filter_url_param(&req.raw_url, &req.filter)
        } else {
            req.task_url.clone()
        };
        let task_id = generate_task_id(&task_url, &req.md5, &req.identifier, &req.headers);

        let _guard = self.locks.write(&task_id).await;

        if let Some(since) = self.unreachable.get(&task_id).map(|t| *t) {
            if now_millis() - since < millis(self.config.fail_access_interval) {
                return Err(SupernodeError::UrlNotReachable(format!(
                    "cached taskID {} url {}", task_id, req.raw_url,
                )));
            }
            self.unreachable.remove(&task_id);
        }

        let new_task = Task {
            id: task_id.clone(),
            raw_url: req.raw_url.clone(),
            task_url,
            md5: req.md5.clone(),
            identifier: req.identifier.clone(),
            headers: req.headers.clone(),
            piece_total: -1,
            ..Default::default()
        };
        let mut task = match self.tasks.get(&task_id) {
            Some(existing) if !util::equals_task(&existing, &new_task) => {
                return Err(SupernodeError::TaskIdDuplicate(task_id));
            },
            Some(existing) => existing.clone(),
            None => new_task,
        };
        if task.http_file_length != 0 {
            return Ok(task);
        }

        let length = match self.http_file_length(&task_id, &task.raw_url, &req.headers).await {
            Ok(length) => length,
            Err(e @ SupernodeError::UrlNotReachable(_)) => {
                self.unreachable.insert(task_id, now_millis());
                return Err(e);
            },
            Err(e @ SupernodeError::AuthenticationRequired(_)) => return Err(e),
            Err(e) => {
                tracing::error!("failed to get file length of task {}: {}", task_id, e);
                -1
            },
        };
        tracing::info!("file length of task {} is {}", task_id, length);

        task.http_file_length = length;
        task.headers = req.headers.clone();
        task.piece_size = util::compute_piece_size(length);
        task.piece_total = util::piece_total(length, task.piece_size);
        self.tasks.insert(task_id, task.clone());
        Ok(task)
    }

    // Length the origin advertises, -1 when it does not answer with one.
    async fn http_file_length(&self, task_id: &str, url: &str, headers: &HashMap<String, String>) -> Result<i64> {
        let (length, code) = self.origin
            .content_length(url, headers)
            .await
            .map_err(|e| SupernodeError::UnknownError(format!("failed to get http file length: {}", e)))?;
        if code == StatusCode::UNAUTHORIZED || code == StatusCode::PROXY_AUTHENTICATION_REQUIRED {
            return Err(SupernodeError::AuthenticationRequired(format!("taskID {} code {}", task_id, code)));
        }
        if code != StatusCode::OK && code != StatusCode::PARTIAL_CONTENT {
            tracing::warn!("unexpected code {} getting the length of task {}", code, task_id);
            if code == StatusCode::NOT_FOUND {
                return Err(SupernodeError::UrlNotReachable(format!("taskID {} url {}", task_id, url)));
            }
            return Ok(-1);
        }
        Ok(length)
    }

    // Starts the cdn of the task unless it is running or done.
    fn trigger_cdn(self: &Arc<Self>, task_id: &str) -> Result<()> {
        let (task, previous) = {
            let mut task = self.tasks
                .get_mut(task_id)
                .ok_or_else(|| SupernodeError::DataNotFound(format!("task {}", task_id)))?;
            if !task.cdn_status.is_frozen() {
                tracing::info!("cdn of task {} is {:?}, not triggering", task_id, task.cdn_status);
                return Ok(());
            }
            let previous = task.cdn_status;
            task.cdn_status = CdnStatus::Running;
            (task.clone(), previous)
        };

        if previous == CdnStatus::Waiting {
            if let Err(e) = self.init_cdn_node(&task) {
                tracing::error!("failed to init cdn node of task {}: {}", task_id, e);
                if let Some(mut task) = self.tasks.get_mut(task_id) {
                    task.cdn_status = previous;
                }
                return Err(e);
            }
        }

        let registry = self.clone();
        let span = tracing::info_span!("cdn_trigger", task = %task.id);
        tokio::spawn(async move {
            let Ok(_permit) = registry.cdn_slots.clone().acquire_owned().await else {
                return;
            };
            let update = registry.cdn.trigger_cdn(&task).await;
            match registry.update(&task.id, &update).await {
                Ok(()) => tracing::info!("cdn of task {} ended as {:?}", task.id, update.cdn_status),
                Err(e) => tracing::error!("failed to update task {} after cdn: {}", task.id, e),
            }
        }.instrument(span));
        tracing::info!("started cdn of task {}", task_id);
        Ok(())
    }

    // The supernode takes part in the task as a peer serving the cache.
    fn init_cdn_node(&self, task: &Task) -> Result<()> {
        let cid = self.config.super_cid(&task.id);
        let pid = self.config.super_pid().to_string();
        self.dfget_tasks.add(DfgetTask {
            cid: cid.clone(),
            task_id: task.id.clone(),
            peer_id: pid.clone(),
            path: self.cdn.get_http_path(&task.id),
            piece_size: task.piece_size,
            status: DfgetTaskStatus::Waiting,
            ..Default::default()
        })?;
        self.progress.init_progress(&task.id, &pid, &cid)
    }

    pub fn get(&self, task_id: &str) -> Result<Task> {
        if task_id.is_empty() {
            return Err(SupernodeError::EmptyValue("taskID".to_string()));
        }
        self.tasks
            .get(task_id)
            .map(|t| t.value().clone())
            .ok_or_else(|| SupernodeError::DataNotFound(format!("task {}", task_id)))
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.tasks.contains_key(task_id)
    }

    // Tasks ordered by id, optionally paged.
    pub fn list(&self, filter: Option<&PageFilter>) -> Vec<Task> {
        let tasks: Vec<Task> = self.tasks.iter().map(|t| t.value().clone()).collect();
        let by_id = |a: &Task, b: &Task| a.id.cmp(&b.id);
        match filter {
            Some(filter) => filter.page(tasks, by_id),
            None => {
                let mut tasks = tasks;
                tasks.sort_by(by_id);
                tasks
            },
        }
    }

    // Applies a status change. A successful task never changes again, and
    // only a success carries the length and md5.
    pub async fn update(&self, task_id: &str, update: &TaskUpdate) -> Result<()> {
        let _guard = self.locks.write(task_id).await;
        self.update_task(task_id, update)
    }

    fn update_task(&self, task_id: &str, update: &TaskUpdate) -> Result<()> {
        if task_id.is_empty() {
            return Err(SupernodeError::EmptyValue("taskID".to_string()));
        }
        let mut task = self.tasks
            .get_mut(task_id)
            .ok_or_else(|| SupernodeError::DataNotFound(format!("task {}", task_id)))?;
        if task.cdn_status == CdnStatus::Success {
            return Ok(());
        }
        if update.cdn_status != CdnStatus::Success {
            task.cdn_status = update.cdn_status;
            return Ok(());
        }

        if let Some(length) = update.file_length.filter(|l| *l != 0) {
            task.file_length = length;
        }
        if let Some(md5) = update.real_md5.as_ref().filter(|m| !m.is_empty()) {
            task.real_md5 = md5.clone();
        }
        let piece_total = util::piece_total(update.file_length.unwrap_or_default(), task.piece_size);
        if piece_total != 0 {
            task.piece_total = piece_total;
        }
        task.cdn_status = CdnStatus::Success;
        Ok(())
    }

    pub async fn check_task_status(&self, task_id: &str) -> Result<bool> {
        let _guard = self.locks.read(task_id).await;
        Ok(self.get(task_id)?.cdn_status == CdnStatus::Success)
    }

    // Forgets the task, its files and progress are left to the callers.
    pub fn delete(&self, task_id: &str) {
        self.access_times.remove(task_id);
        self.unreachable.remove(task_id);
        self.tasks.remove(task_id);
    }

    // Task id and millis of last access of every task.
    pub fn access_times(&self) -> Vec<(String, i64)> {
        self.access_times
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }

    // Applies the client's report and tells it what to pull next.
    #[tracing::instrument(skip(self, req))]
    pub async fn get_pieces(&self, task_id: &str, cid: &str, req: &PiecePullRequest) -> Result<PullPieces> {
        let _guard = self.locks.read(task_id).await;

        let status = match (req.client_status, req.piece_result) {
            (Some(ClientStatus::Started), _) => DfgetTaskStatus::Waiting,
            (Some(ClientStatus::Running), _) => DfgetTaskStatus::Running,
            (Some(ClientStatus::Finished), Some(PieceOutcome::Success)) => DfgetTaskStatus::Success,
            (Some(ClientStatus::Finished), _) => DfgetTaskStatus::Failed,
            (None, _) => {
                return Err(SupernodeError::InvalidValue(format!(
                    "failed to convert piece result {:?} and status {:?}", req.piece_result, req.client_status,
                )))
            },
        };

        let dfget_task = self.dfget_tasks.get(cid, task_id)?;
        let task = self.get(task_id)?;
        self.access_times.insert(task.id.clone(), now_millis());

        match status {
            DfgetTaskStatus::Waiting => {
                self.dfget_tasks.update_status(cid, task_id, DfgetTaskStatus::Running)?;
                tracing::info!("client {} starts task {}", cid, task_id);
                self.available_pieces(cid, &task, &dfget_task).await
            },
            DfgetTaskStatus::Running => {
                self.apply_piece_result(cid, &task, req, &dfget_task)?;
                self.available_pieces(cid, &task, &dfget_task).await
            },
            status => {
                self.dfget_tasks.update_status(cid, task_id, status)?;
                tracing::info!("client {} finished task {} as {:?}", cid, task_id, status);
                Ok(PullPieces::Finished(None))
            },
        }
    }

    fn apply_piece_result(&self, cid: &str, task: &Task, req: &PiecePullRequest, dfget_task: &DfgetTask) -> Result<()> {
        let piece = piece_num(&req.piece_range);
        if piece == -1 {
            return Err(SupernodeError::InvalidValue(format!("pieceRange: {}", req.piece_range)));
        }
        let status = req.piece_result
            .and_then(PieceOutcome::piece_status)
            .ok_or_else(|| SupernodeError::InvalidValue(format!(
                "failed to convert result {:?} to piece status", req.piece_result,
            )))?;
        tracing::debug!(
            "client {} reports piece {} from {} as {:?}",
            cid, piece, req.dst_pid, status,
        );
        self.progress.update_progress(&task.id, cid, &dfget_task.peer_id, &req.dst_pid, piece, status)
    }

    async fn available_pieces(&self, cid: &str, task: &Task, dfget_task: &DfgetTask) -> Result<PullPieces> {
        match task.cdn_status {
            CdnStatus::Failed | CdnStatus::SourceError => {
                return Err(SupernodeError::CdnFail(format!("taskID {}", task.id)));
            },
            CdnStatus::Waiting => {
                return Err(SupernodeError::PeerWait(format!("taskID {} cdn status is waiting", task.id)));
            },
            _ => {},
        }

        let succeeded = self.progress
            .get_piece_progress_by_cid(&task.id, cid, PieceSelector::Success)
            .unwrap_or_default();
        if task.cdn_status == CdnStatus::Success
            && task.piece_total > 0
            && succeeded.len() == task.piece_total as usize
        {
            if let Err(e) = self.dfget_tasks.update_status(cid, &task.id, DfgetTaskStatus::Success) {
                tracing::error!("failed to mark client {} of task {} successful: {}", cid, task.id, e);
            }
            return Ok(PullPieces::Finished(Some(FinishInfo {
                md5: task.real_md5.clone(),
                file_length: task.file_length,
            })));
        }

        let results = self.scheduler.schedule(&task.id, cid, &dfget_task.peer_id)?;
        tracing::debug!("scheduled {} pieces for client {}", results.len(), cid);
        if results.is_empty() {
            return Err(SupernodeError::PeerWait(format!("taskID {} clientID {}", task.id, cid)));
        }

        let mut infos = Vec::with_capacity(results.len());
        for result in &results {
            let mut info = match self.piece_info(result, task.piece_size).await {
                Ok(info) => info,
                Err(e) => {
                    tracing::warn!(
                        "dropping piece {} of task {} from {}: {}",
                        result.piece_num, task.id, result.dst_pid, e,
                    );
                    self.scheduler.cancel(cid, result);
                    continue;
                },
            };
            if self.config.is_super_pid(&info.pid) && !dfget_task.supernode_ip.is_empty() {
                info.peer_ip = dfget_task.supernode_ip.clone();
            }
            infos.push(info);
        }
        if infos.is_empty() {
            return Err(SupernodeError::PeerWait(format!("taskID {} clientID {}", task.id, cid)));
        }
        Ok(PullPieces::Continue(infos))
    }

    async fn piece_info(&self, result: &PieceResult, piece_size: i32) -> Result<PieceInfo> {
        let cid = self.dfget_tasks.cid_by_peer_and_task(&result.dst_pid, &result.task_id)?;
        let dst_task = self.dfget_tasks.get(&cid, &result.task_id)?;
        let peer = self.peers.get(&result.dst_pid).await?;
        let piece_md5 = match self.cdn.get_piece_md5(&result.task_id, result.piece_num, "", Md5Source::Default).await {
            Ok(md5) => md5,
            Err(e) => {
                tracing::warn!("no md5 for piece {} of task {}: {}", result.piece_num, result.task_id, e);
                String::new()
            },
        };
        Ok(PieceInfo {
            cid,
            pid: result.dst_pid.clone(),
            path: dst_task.path,
            peer_ip: peer.ip.to_string(),
            peer_port: peer.port,
            piece_md5,
            piece_range: piece_range(result.piece_num, piece_size),
            piece_size,
        })
    }

    // Records a finished piece transfer reported outside of a pull.
    pub async fn update_piece_status(&self, task_id: &str, piece_range: &str, req: &PieceUpdateRequest) -> Result<()> {
        let piece = piece_num(piece_range);
        if piece == -1 {
            return Err(SupernodeError::InvalidValue(format!(
                "pieceRange {} of task {} client {}", piece_range, task_id, req.client_id,
            )));
        }

        // One less client pulling from the supernode.
        if self.config.is_super_pid(&req.dst_pid) {
            self.progress.update_super_load(task_id, -1, -1);
        }

        let src_task = self.dfget_tasks.get(&req.client_id, task_id)?;
        let status = req.piece_status
            .piece_status()
            .ok_or_else(|| SupernodeError::InvalidValue(format!("result: {:?}", req.piece_status)))?;
        self.progress.update_progress(task_id, &req.client_id, &src_task.peer_id, &req.dst_pid, piece, status)
    }

}
