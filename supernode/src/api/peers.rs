use std::collections::HashMap;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_derive::Serialize;
use crate::{
    filter::PageFilter,
    peer::{PeerCreateRequest, PeerInfo},
};
use super::{
    result::{parse_json, ApiResult, ResultInfo, SUCCESS},
    ApiState,
};

#[derive(Debug, Serialize)]
pub struct PeerCreateResponse {

    #[serde(rename = "ID")]
    pub id: String,

}

pub async fn register_peer(
    State(state): State<ApiState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<ResultInfo<PeerCreateResponse>>)> {
    let req: PeerCreateRequest = parse_json(&body)?;
    let id = state.node.peers.register(&req)?;
    Ok((StatusCode::CREATED, Json(ResultInfo::with_data(SUCCESS, PeerCreateResponse { id }))))
}

// Forgets the peer together with its client sessions and progress.
pub async fn deregister_peer(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ResultInfo<()>>> {
    state.node.peers.get(&id).await?;
    state.node.gc.gc_peer(&id).await;
    Ok(Json(ResultInfo::with_code(SUCCESS)))
}

pub async fn get_peer(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ResultInfo<PeerInfo>>> {
    let peer = state.node.peers.get(&id).await?;
    Ok(Json(ResultInfo::with_data(SUCCESS, peer)))
}

pub async fn list_peers(
    State(state): State<ApiState>,
    Query(query): Query<HashMap<String, String>>,
) -> ApiResult<Json<ResultInfo<Vec<PeerInfo>>>> {
    let filter = PageFilter::from_query(&query, None)?;
    Ok(Json(ResultInfo::with_data(SUCCESS, state.node.peers.list(Some(&filter)))))
}
