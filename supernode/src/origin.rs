use std::{collections::HashMap, time::Duration};
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{header, Method, StatusCode};
use crate::error::{Result, SupernodeError};

// Timeout of the probing requests, downloads have none.
const PROBE_TIMEOUT: Duration = Duration::from_secs(4);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

// Http client for the origin servers files are pulled from.
#[derive(Debug, Clone)]
pub struct OriginClient {
    client: reqwest::Client,
}

// Formats millis since epoch as an http date.
pub fn format_http_time(millis: i64) -> Option<String> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|t| t.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
}

// Parses an http date into millis since epoch.
pub fn parse_http_time(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|t| t.with_timezone(&Utc).timestamp_millis())
}

impl OriginClient {

    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;
        Ok(Self { client })
    }

    fn request(
        &self,
        method: Method,
        url: &str,
        headers: &HashMap<String, String>,
        timeout: Option<Duration>,
    ) -> reqwest::RequestBuilder {
        let mut req = self.client.request(method, url);
        for (k, v) in headers {
            req = req.header(k.as_str(), v.as_str());
        }
        if let Some(timeout) = timeout {
            req = req.timeout(timeout);
        }
        req
    }

    // Content length advertised by the origin and the status code of the probe,
    // -1 when the length is unknown.
    pub async fn content_length(&self, url: &str, headers: &HashMap<String, String>) -> Result<(i64, StatusCode)> {
        let resp = self.request(Method::HEAD, url, headers, Some(PROBE_TIMEOUT))
            .send()
            .await?;
        let length = resp.headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(-1);
        tracing::debug!("origin {} answered {} with length {}", url, resp.status(), length);
        Ok((length, resp.status()))
    }

    pub async fn is_support_range(&self, url: &str, headers: &HashMap<String, String>) -> Result<bool> {
        let mut headers = headers.clone();
        headers.insert("Range".to_string(), "bytes=0-0".to_string());
        let resp = self.request(Method::GET, url, &headers, Some(PROBE_TIMEOUT))
            .send()
            .await?;
        Ok(resp.status() == StatusCode::PARTIAL_CONTENT)
    }

    // Asks the origin whether the file changed since it was cached.
    // Without validators the cache always counts as expired.
    pub async fn is_expired(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        last_modified: i64,
        etag: &str,
    ) -> Result<bool> {
        if last_modified <= 0 && etag.is_empty() {
            return Ok(true);
        }
        let mut headers = headers.clone();
        if let Some(since) = format_http_time(last_modified).filter(|_| last_modified > 0) {
            headers.insert(header::IF_MODIFIED_SINCE.to_string(), since);
        }
        if !etag.is_empty() {
            headers.insert(header::IF_NONE_MATCH.to_string(), etag.to_string());
        }
        let resp = self.request(Method::GET, url, &headers, Some(PROBE_TIMEOUT))
            .send()
            .await?;
        Ok(resp.status() != StatusCode::NOT_MODIFIED)
    }

    // Starts a download, the body is left unread for the caller.
    pub async fn download<F>(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        check_code: F,
    ) -> Result<reqwest::Response>
    where
        F: Fn(StatusCode) -> bool,
    {
        let resp = self.request(Method::GET, url, headers, None)
            .send()
            .await?;
        let status = resp.status();
        if check_code(status) {
            return Ok(resp);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::PROXY_AUTHENTICATION_REQUIRED {
            return Err(SupernodeError::UrlNotReachable(format!("{} requires authentication", url)));
        }
        Err(SupernodeError::UnknownError(format!("unexpected status code {} from {}", status, url)))
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::Origin;

    #[test]
    fn test_http_time() {
        let formatted = format_http_time(1_700_000_000_000).unwrap();
        assert_eq!(formatted, "Tue, 14 Nov 2023 22:13:20 GMT");
        assert_eq!(parse_http_time(&formatted), Some(1_700_000_000_000));
        assert_eq!(parse_http_time("yesterday"), None);
    }

    #[tokio::test]
    async fn test_probes() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let origin = Origin::start(b"hello world".to_vec()).await?;
        let client = OriginClient::new()?;
        let headers = HashMap::new();

        let (length, status) = client.content_length(&origin.url("/file"), &headers).await?;
        assert_eq!((length, status), (11, StatusCode::OK));
        let (_, status) = client.content_length(&origin.url("/missing"), &headers).await?;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (_, status) = client.content_length(&origin.url("/auth"), &headers).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        assert!(client.is_support_range(&origin.url("/file"), &headers).await?);
        assert!(!client.is_support_range(&origin.url("/norange"), &headers).await?);

        assert!(client.is_expired(&origin.url("/file"), &headers, 0, "").await?);
        assert!(!client.is_expired(&origin.url("/file"), &headers, 0, Origin::ETAG).await?);
        assert!(client.is_expired(&origin.url("/file"), &headers, 0, "\"other\"").await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_download_codes() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let origin = Origin::start(b"hello world".to_vec()).await?;
        let client = OriginClient::new()?;
        let mut headers = HashMap::new();

        let resp = client.download(&origin.url("/file"), &headers, |c| c == StatusCode::OK).await?;
        assert_eq!(resp.bytes().await?.as_ref(), b"hello world");

        headers.insert("Range".to_string(), "bytes=6-".to_string());
        let resp = client.download(&origin.url("/file"), &headers, |c| c == StatusCode::PARTIAL_CONTENT).await?;
        assert_eq!(resp.bytes().await?.as_ref(), b"world");

        let err = client.download(&origin.url("/auth"), &HashMap::new(), |c| c == StatusCode::OK).await;
        assert!(matches!(err, Err(SupernodeError::UrlNotReachable(_))));
        Ok(())
    }
}
