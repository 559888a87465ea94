use std::collections::HashMap;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use crate::{
    filter::PageFilter,
    piece_error::PieceErrorRequest,
    task::{Task, TaskCreateRequest, TaskCreateResponse, TaskUpdate},
};
use super::{
    result::{parse_json, ApiResult, ResultInfo, SUCCESS},
    ApiState,
};

pub async fn register_task(
    State(state): State<ApiState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<ResultInfo<TaskCreateResponse>>)> {
    let req: TaskCreateRequest = parse_json(&body)?;
    let resp = state.node.tasks.register(&req).await?;
    Ok((StatusCode::CREATED, Json(ResultInfo::with_data(SUCCESS, resp))))
}

pub async fn get_task(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ResultInfo<Task>>> {
    Ok(Json(ResultInfo::with_data(SUCCESS, state.node.tasks.get(&id)?)))
}

pub async fn list_tasks(
    State(state): State<ApiState>,
    Query(query): Query<HashMap<String, String>>,
) -> ApiResult<Json<ResultInfo<Vec<Task>>>> {
    let filter = PageFilter::from_query(&query, None)?;
    Ok(Json(ResultInfo::with_data(SUCCESS, state.node.tasks.list(Some(&filter)))))
}

pub async fn update_task(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<ResultInfo<()>>> {
    let update: TaskUpdate = parse_json(&body)?;
    state.node.tasks.update(&id, &update).await?;
    Ok(Json(ResultInfo::with_code(SUCCESS)))
}

// Drops the task and its client sessions, cached files stay for disk gc.
pub async fn delete_task(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ResultInfo<()>>> {
    state.node.tasks.get(&id)?;
    state.node.gc.gc_task(&id, false).await;
    Ok(Json(ResultInfo::with_code(SUCCESS)))
}

pub async fn report_piece_error(
    State(state): State<ApiState>,
    Path((id, range)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<Json<ResultInfo<()>>> {
    let mut req: PieceErrorRequest = parse_json(&body)?;
    if req.task_id.is_empty() {
        req.task_id = id;
    }
    if req.range.is_empty() {
        req.range = range;
    }
    state.node.piece_errors.handle(&req).await?;
    Ok(Json(ResultInfo::with_code(SUCCESS)))
}
