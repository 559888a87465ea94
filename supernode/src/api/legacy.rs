use std::collections::HashMap;
use axum::{
    body::Bytes,
    extract::{Query, State},
    Json,
};
use serde_derive::{Deserialize, Serialize};
use crate::{
    error::SupernodeError,
    peer::PeerCreateRequest,
    piece_error::PieceErrorRequest,
    range::piece_num,
    task::{
        convert_headers,
        ClientStatus,
        PieceInfo,
        PieceOutcome,
        PiecePullRequest,
        PieceUpdateRequest,
        PullPieces,
        TaskCreateRequest,
    },
};
use super::{
    result::{
        error_code,
        parse_json,
        ApiResult,
        ResultInfo,
        GET_PEER_DOWN,
        GET_PIECE_REPORT,
        PEER_CONTINUE,
        PEER_FINISH,
        SUCCESS,
    },
    ApiState,
};

// Registration of a dfget client, creating its peer and task at once.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskRegisterRequest {

    pub raw_url: String,

    pub task_url: String,

    pub md5: String,

    pub identifier: String,

    pub version: String,

    pub port: u16,

    pub path: String,

    pub ip: String,

    pub host_name: String,

    pub cid: String,

    pub call_system: String,

    pub dfdaemon: bool,

    // "key:value" lines.
    pub headers: Vec<String>,

    pub super_node_ip: String,

}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponseData {

    pub task_id: String,

    pub file_length: i64,

    pub piece_size: i32,

}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PullPieceTaskResponseContinueData {

    pub range: String,

    pub piece_num: i32,

    pub piece_size: i32,

    pub piece_md5: String,

    pub cid: String,

    pub peer_ip: String,

    pub peer_port: u16,

    pub path: String,

    pub down_link: i32,

}

pub async fn registry(
    State(state): State<ApiState>,
    body: Bytes,
) -> ApiResult<Json<ResultInfo<RegisterResponseData>>> {
    let req: TaskRegisterRequest = parse_json(&body)?;
    let node = &state.node;

    let peer_req = PeerCreateRequest {
        ip: req.ip.clone(),
        host_name: req.host_name.clone(),
        port: req.port,
        version: req.version.clone(),
    };
    let peer_id = node.peers.register(&peer_req).map_err(|e| {
        tracing::error!("failed to register peer {:?}: {}", peer_req, e);
        SupernodeError::SystemError(format!("failed to register peer: {}", e))
    })?;

    let task_req = TaskCreateRequest {
        cid: req.cid,
        call_system: req.call_system,
        dfdaemon: req.dfdaemon,
        headers: convert_headers(&req.headers),
        identifier: req.identifier,
        md5: req.md5,
        path: req.path,
        peer_id,
        raw_url: req.raw_url,
        task_url: req.task_url,
        supernode_ip: req.super_node_ip,
        ..Default::default()
    };
    let resp = node.tasks.register(&task_req).await.map_err(|e| {
        tracing::error!("failed to register task of client {}: {}", task_req.cid, e);
        e
    })?;

    Ok(Json(ResultInfo::with_data(SUCCESS, RegisterResponseData {
        task_id: resp.id,
        file_length: resp.file_length,
        piece_size: resp.piece_size,
    })))
}

fn param<'a>(query: &'a HashMap<String, String>, key: &str) -> &'a str {
    query.get(key).map(String::as_str).unwrap_or_default()
}

// Errors of a pull are answered with http 200 and the matching result code.
pub async fn pull_piece_task(
    State(state): State<ApiState>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<ResultInfo<serde_json::Value>> {
    let node = &state.node;
    let task_id = param(&query, "taskId");
    let src_cid = param(&query, "srcCid");

    let mut req = PiecePullRequest {
        piece_range: param(&query, "range").to_string(),
        piece_result: PieceOutcome::from_code(param(&query, "result")),
        client_status: ClientStatus::from_code(param(&query, "status")),
        ..Default::default()
    };
    let dst_cid = param(&query, "dstCid");
    if !dst_cid.is_empty() {
        match node.dfget_tasks.get(dst_cid, task_id) {
            Ok(dst) => req.dst_pid = dst.peer_id,
            Err(e) => tracing::warn!(
                "no dfget task of client {} for task {}, pulled by {}: {}",
                dst_cid, task_id, src_cid, e,
            ),
        }
    }

    let pieces = match node.tasks.get_pieces(task_id, src_cid, &req).await {
        Ok(PullPieces::Finished(info)) => {
            return Json(ResultInfo {
                code: PEER_FINISH,
                msg: String::new(),
                data: info.and_then(|i| serde_json::to_value(i).ok()),
            });
        },
        Ok(PullPieces::Continue(pieces)) => pieces,
        Err(e) => {
            if matches!(e, SupernodeError::CdnFail(_)) {
                tracing::error!("task {}: failed to get pieces for {}: {}", task_id, src_cid, e);
            }
            return Json(ResultInfo { code: error_code(&e), msg: e.to_string(), data: None });
        },
    };

    let data: Vec<PullPieceTaskResponseContinueData> = pieces
        .into_iter()
        .map(continue_data)
        .collect();
    Json(ResultInfo {
        code: PEER_CONTINUE,
        msg: String::new(),
        data: serde_json::to_value(data).ok(),
    })
}

fn continue_data(piece: PieceInfo) -> PullPieceTaskResponseContinueData {
    PullPieceTaskResponseContinueData {
        piece_num: piece_num(&piece.piece_range),
        range: piece.piece_range,
        piece_size: piece.piece_size,
        piece_md5: piece.piece_md5,
        cid: piece.cid,
        peer_ip: piece.peer_ip,
        peer_port: piece.peer_port,
        path: piece.path,
        down_link: 0,
    }
}

pub async fn report_piece(
    State(state): State<ApiState>,
    Query(query): Query<HashMap<String, String>>,
) -> ApiResult<Json<ResultInfo<()>>> {
    let task_id = param(&query, "taskId");
    let src_cid = param(&query, "cid");
    let dst_cid = param(&query, "dstCid");
    let piece_range = param(&query, "pieceRange");

    let dst = state.node.dfget_tasks.get(dst_cid, task_id)?;
    let req = PieceUpdateRequest {
        client_id: src_cid.to_string(),
        dst_pid: dst.peer_id,
        piece_status: PieceOutcome::Success,
    };
    if let Err(e) = state.node.tasks.update_piece_status(task_id, piece_range, &req).await {
        tracing::error!("failed to update piece status {:?}: {}", req, e);
        return Err(e.into());
    }
    Ok(Json(ResultInfo::with_code(GET_PIECE_REPORT)))
}

pub async fn report_service_down(
    State(state): State<ApiState>,
    Query(query): Query<HashMap<String, String>>,
) -> ApiResult<Json<ResultInfo<()>>> {
    let task_id = param(&query, "taskId");
    let cid = param(&query, "cid");

    let dfget_task = state.node.dfget_tasks.get(cid, task_id)?;
    if let Err(e) = state.node.progress.update_peer_service_down(&dfget_task.peer_id) {
        tracing::warn!("peer {} not marked down: {}", dfget_task.peer_id, e);
    }
    Ok(Json(ResultInfo::with_code(GET_PEER_DOWN)))
}

// A piece the client could not verify, checked against the cache when the
// supernode served it.
pub async fn report_piece_error(
    State(state): State<ApiState>,
    body: Bytes,
) -> ApiResult<Json<ResultInfo<()>>> {
    let req: PieceErrorRequest = parse_json(&body)?;
    state.node.piece_errors.handle(&req).await?;
    Ok(Json(ResultInfo::with_code(SUCCESS)))
}
