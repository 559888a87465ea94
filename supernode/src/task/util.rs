use std::collections::{HashMap, HashSet};
use crate::{
    config::{DEFAULT_PIECE_SIZE, DEFAULT_PIECE_SIZE_LIMIT},
    error::{Result, SupernodeError},
    util::sha256_hex,
};
use super::{Task, TaskCreateRequest};

// Salt mixed into every task id.
const TASK_ID_KEY: &str = ">I$pg-~AS~sP'rqu_`Oh&lz#9]\"=;nE%";

const MIB: i64 = 1024 * 1024;

// Id of the logical download described by the url, the file signature and
// the pinned range if any.
pub fn generate_task_id(task_url: &str, md5: &str, identifier: &str, headers: &HashMap<String, String>) -> String {
    let sign = if !md5.is_empty() { md5 } else { identifier };
    let data = match headers.get("Range") {
        Some(range) => format!("{}{}{}{}{}", TASK_ID_KEY, task_url, sign, range, TASK_ID_KEY),
        None => format!("{}{}{}{}", TASK_ID_KEY, task_url, sign, TASK_ID_KEY),
    };
    sha256_hex(data.as_bytes())
}

// Drops the query params named in `filters` from the url.
pub fn filter_url_param(url: &str, filters: &[String]) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };
    if filters.is_empty() || query.trim().is_empty() {
        return url.to_string();
    }
    let filters: HashSet<&str> = filters.iter().map(String::as_str).collect();
    let params: Vec<&str> = query
        .split('&')
        .filter(|param| {
            let key = param.split_once('=').map(|(k, _)| k).unwrap_or(param);
            !filters.contains(key)
        })
        .collect();
    if params.is_empty() {
        return base.to_string();
    }
    format!("{}?{}", base, params.join("&"))
}

pub fn is_valid_url(raw: &str) -> bool {
    match url::Url::parse(raw) {
        Ok(u) => matches!(u.scheme(), "http" | "https") && u.host_str().is_some_and(|h| !h.is_empty()),
        Err(_) => false,
    }
}

// Turns "Key: value" lines into a header map, repeated keys are joined with commas.
pub fn convert_headers(lines: &[String]) -> HashMap<String, String> {
    let mut headers: HashMap<String, String> = HashMap::new();
    for line in lines {
        let Some((k, v)) = line.split_once(':') else {
            continue;
        };
        let (k, v) = (k.trim(), v.trim());
        if v.is_empty() {
            continue;
        }
        headers
            .entry(k.to_string())
            .and_modify(|existing| {
                existing.push(',');
                existing.push_str(v);
            })
            .or_insert_with(|| v.to_string());
    }
    headers
}

// Piece size for a file of the given length, growing by 1 MiB per 100 MiB
// above 200 MiB.
pub fn compute_piece_size(length: i64) -> i32 {
    if length <= 200 * MIB {
        return DEFAULT_PIECE_SIZE;
    }
    let gap_count = length / (100 * MIB);
    let size = (gap_count - 2) * MIB + DEFAULT_PIECE_SIZE as i64;
    size.min(DEFAULT_PIECE_SIZE_LIMIT as i64) as i32
}

pub fn piece_total(length: i64, piece_size: i32) -> i32 {
    if length <= 0 || piece_size <= 0 {
        return 0;
    }
    ((length + piece_size as i64 - 1) / piece_size as i64) as i32
}

// Whether two tasks describe the same download, md5 wins over the identifier.
pub fn equals_task(existing: &Task, new: &Task) -> bool {
    if existing.task_url != new.task_url {
        return false;
    }
    if !existing.md5.is_empty() {
        return existing.md5 == new.md5;
    }
    existing.identifier == new.identifier
}

pub fn validate(req: &TaskCreateRequest) -> Result<()> {
    if !is_valid_url(&req.raw_url) {
        return Err(SupernodeError::InvalidValue(format!("raw url: {}", req.raw_url)));
    }
    if req.path.is_empty() {
        return Err(SupernodeError::EmptyValue("path".to_string()));
    }
    if req.cid.is_empty() {
        return Err(SupernodeError::EmptyValue("cID".to_string()));
    }
    if req.peer_id.is_empty() {
        return Err(SupernodeError::EmptyValue("peerID".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_task_id() {
        let none = HashMap::new();
        let id = generate_task_id("http://a.b/c", "", "", &none);
        assert_eq!(id.len(), 64);
        assert_eq!(id, generate_task_id("http://a.b/c", "", "", &none));

        // md5 takes precedence over the identifier.
        assert_eq!(
            generate_task_id("http://a.b/c", "m", "i", &none),
            generate_task_id("http://a.b/c", "m", "", &none),
        );
        assert_ne!(
            generate_task_id("http://a.b/c", "", "i", &none),
            generate_task_id("http://a.b/c", "", "", &none),
        );

        let ranged = HashMap::from([("Range".to_string(), "bytes=0-9".to_string())]);
        assert_ne!(generate_task_id("http://a.b/c", "", "", &ranged), id);
    }

    #[test]
    fn test_filter_url_param() {
        let filters = vec!["token".to_string(), "t".to_string()];
        assert_eq!(filter_url_param("http://a.b/c?token=1&x=2&t", &filters), "http://a.b/c?x=2");
        assert_eq!(filter_url_param("http://a.b/c?token=1", &filters), "http://a.b/c");
        assert_eq!(filter_url_param("http://a.b/c?x=1", &[]), "http://a.b/c?x=1");
        assert_eq!(filter_url_param("http://a.b/c", &filters), "http://a.b/c");

        // Urls differing only in filtered params end up as the same task.
        let none = HashMap::new();
        assert_eq!(
            generate_task_id(&filter_url_param("http://a.b/c?token=1", &filters), "", "", &none),
            generate_task_id(&filter_url_param("http://a.b/c?token=2", &filters), "", "", &none),
        );
    }

    #[test]
    fn test_is_valid_url() {
        assert!(is_valid_url("http://a.b/c"));
        assert!(is_valid_url("https://127.0.0.1:8080/x?y=1"));
        assert!(!is_valid_url("ftp://a.b/c"));
        assert!(!is_valid_url("a.b/c"));
        assert!(!is_valid_url(""));
    }

    #[test]
    fn test_convert_headers() {
        let lines = vec![
            "Accept: a".to_string(),
            "Accept:b".to_string(),
            "Empty: ".to_string(),
            "garbage".to_string(),
        ];
        let headers = convert_headers(&lines);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers["Accept"], "a,b");
    }

    #[test]
    fn test_compute_piece_size() {
        assert_eq!(compute_piece_size(-1), DEFAULT_PIECE_SIZE);
        assert_eq!(compute_piece_size(200 * MIB), DEFAULT_PIECE_SIZE);
        assert_eq!(compute_piece_size(300 * MIB), DEFAULT_PIECE_SIZE + MIB as i32);
        assert_eq!(compute_piece_size(100_000 * MIB), DEFAULT_PIECE_SIZE_LIMIT);
        assert_eq!(piece_total(16, DEFAULT_PIECE_SIZE), 1);
        assert_eq!(piece_total(21, 10), 3);
        assert_eq!(piece_total(-1, 10), 0);
    }
}
