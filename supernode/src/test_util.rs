use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    path::Path,
    time::Duration,
};
use axum::{
    extract::State,
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use crate::{
    config::DOWNLOAD_HOME,
    peer::PeerCreateRequest,
    range::parse_http_range,
    task::{CdnStatus, Task, TaskCreateRequest},
    Config,
    Supernode,
};

type TestResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;

// Supernode storing its cache below `dir`, with every gc loop left to the test.
pub fn supernode(dir: &Path, tweak: impl FnOnce(&mut Config)) -> TestResult<Supernode> {
    let mut config = Config::default();
    config.download_path = dir.to_path_buf();
    config.host_name = "supernode".to_string();
    tweak(&mut config);
    Ok(Supernode::new(config)?)
}

// Cached blob of the task below the download root.
pub fn blob_path(root: &Path, task_id: &str) -> std::path::PathBuf {
    root.join(DOWNLOAD_HOME).join(&task_id[..3]).join(task_id)
}

// Registers a client peer and returns its id.
pub fn register_peer(node: &Supernode, ip: &str) -> TestResult<String> {
    Ok(node.peers.register(&PeerCreateRequest {
        ip: ip.to_string(),
        host_name: format!("host-{}", ip),
        port: 65001,
        version: "0.3.0".to_string(),
    })?)
}

pub fn task_request(url: &str, cid: &str, peer_id: &str) -> TaskCreateRequest {
    TaskCreateRequest {
        cid: cid.to_string(),
        peer_id: peer_id.to_string(),
        raw_url: url.to_string(),
        path: format!("/peer/file/{}", cid),
        supernode_ip: "10.0.0.9".to_string(),
        ..Default::default()
    }
}

// Polls the task until its cdn stops running.
pub async fn wait_for_cdn(node: &Supernode, task_id: &str) -> TestResult<Task> {
    for _ in 0..500 {
        let task = node.tasks.get(task_id)?;
        if task.cdn_status != CdnStatus::Running {
            return Ok(task);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Err(format!("cdn of task {} still running", task_id).into())
}

// Origin http server serving one file, bound to a random local port.
pub struct Origin {

    addr: SocketAddr,

    state: Arc<OriginState>,

    handle: tokio::task::JoinHandle<()>,

}

struct OriginState {

    body: Vec<u8>,

    // GET requests that transferred file content.
    downloads: AtomicUsize,

    // Delay before answering a download.
    delay: Duration,

}

impl Origin {

    pub const ETAG: &'static str = "\"v1\"";

    pub const LAST_MODIFIED: &'static str = "Tue, 14 Nov 2023 22:13:20 GMT";

    pub async fn start(body: Vec<u8>) -> std::io::Result<Self> {
        Self::start_with_delay(body, Duration::ZERO).await
    }

    pub async fn start_with_delay(body: Vec<u8>, delay: Duration) -> std::io::Result<Self> {
        let state = Arc::new(OriginState {
            body,
            downloads: AtomicUsize::new(0),
            delay,
        });
        let app = Router::new()
            .route("/file", get(serve_file))
            .route("/norange", get(serve_whole))
            .route("/auth", get(|| async { StatusCode::UNAUTHORIZED }))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(Self { addr, state, handle })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn downloads(&self) -> usize {
        self.state.downloads.load(Ordering::SeqCst)
    }

}

impl Drop for Origin {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn with_validators(status: StatusCode, body: Vec<u8>, extra: Option<String>) -> Response {
    let len = body.len().to_string();
    let mut resp = (
        status,
        [
            (header::ETAG, Origin::ETAG.to_string()),
            (header::LAST_MODIFIED, Origin::LAST_MODIFIED.to_string()),
            (header::CONTENT_LENGTH, len),
        ],
        body,
    ).into_response();
    if let Some(content_range) = extra.and_then(|v| v.parse().ok()) {
        resp.headers_mut().insert(header::CONTENT_RANGE, content_range);
    }
    resp
}

async fn serve_file(State(state): State<Arc<OriginState>>, method: Method, headers: HeaderMap) -> Response {
    let not_modified = header_str(&headers, header::IF_NONE_MATCH) == Some(Origin::ETAG)
        || header_str(&headers, header::IF_MODIFIED_SINCE) == Some(Origin::LAST_MODIFIED);
    if not_modified {
        return StatusCode::NOT_MODIFIED.into_response();
    }

    let range = header_str(&headers, header::RANGE).map(str::to_string);
    let length = state.body.len() as i64;
    match range {
        Some(range) => {
            let parsed = match parse_http_range(&range, length) {
                Ok(parsed) if parsed.len() == 1 => parsed[0],
                _ => return StatusCode::RANGE_NOT_SATISFIABLE.into_response(),
            };
            if method == Method::GET && range != "bytes=0-0" {
                tokio::time::sleep(state.delay).await;
                state.downloads.fetch_add(1, Ordering::SeqCst);
            }
            let part = state.body[parsed.start as usize..=parsed.end as usize].to_vec();
            let content_range = format!("bytes {}-{}/{}", parsed.start, parsed.end, length);
            with_validators(StatusCode::PARTIAL_CONTENT, part, Some(content_range))
        },
        None => {
            if method == Method::GET {
                tokio::time::sleep(state.delay).await;
                state.downloads.fetch_add(1, Ordering::SeqCst);
            }
            with_validators(StatusCode::OK, state.body.clone(), None)
        },
    }
}

async fn serve_whole(State(state): State<Arc<OriginState>>, method: Method) -> Response {
    if method == Method::GET {
        state.downloads.fetch_add(1, Ordering::SeqCst);
    }
    (
        [(header::CONTENT_LENGTH, state.body.len().to_string())],
        state.body.clone(),
    ).into_response()
}
