use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use md5::{Digest, Md5};
use tokio::sync::Mutex;
use super::{CdnError, Result};

// Byte budget refilled at a fixed rate, the capacity is one second worth.
#[derive(Debug)]
pub struct TokenBucket {

    last_refill: Instant,

    tokens: f64,

    // Bytes per second, zero means unlimited.
    rate: f64,

    capacity: f64,

}

pub type SharedBucket = Arc<Mutex<TokenBucket>>;

impl TokenBucket {

    pub fn new(rate: u64) -> Self {
        let rate = rate as f64;
        Self {
            last_refill: Instant::now(),
            tokens: rate,
            rate,
            capacity: rate,
        }
    }

    pub fn shared(rate: u64) -> SharedBucket {
        Arc::new(Mutex::new(Self::new(rate)))
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        self.last_refill = now;
        self.tokens = f64::min(self.capacity, self.tokens + elapsed.as_secs_f64() * self.rate);
    }

}

// Waits until `amount` bytes may pass the bucket.
pub async fn consume(bucket: &SharedBucket, amount: usize) {
    let amount = amount as f64;
    let (rate, capacity) = {
        let b = bucket.lock().await;
        (b.rate, b.capacity)
    };
    if rate <= 0.0 {
        return;
    }

    // Chunks larger than the bucket wait their average share instead.
    if amount > capacity {
        tokio::time::sleep(Duration::from_secs_f64(amount / rate)).await;
        return;
    }

    loop {
        let wait = {
            let mut b = bucket.lock().await;
            b.refill();
            if b.tokens >= amount {
                b.tokens -= amount;
                return;
            }
            Duration::from_secs_f64(((amount - b.tokens) / rate).max(0.001))
        };
        tokio::time::sleep(wait).await;
    }
}

// Pulls chunks off a body stream no faster than every bucket allows,
// folding them into a running md5.
pub struct LimitReader<S> {

    stream: S,

    buckets: Vec<SharedBucket>,

    md5: Md5,

}

impl<S, E> LimitReader<S>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{

    // `md5` carries the digest of content fetched by an earlier attempt.
    pub fn new(stream: S, buckets: Vec<SharedBucket>, md5: Option<Md5>) -> Self {
        Self {
            stream,
            buckets,
            md5: md5.unwrap_or_default(),
        }
    }

    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        let chunk = match self.stream.next().await {
            None => return Ok(None),
            Some(Err(e)) => return Err(CdnError::Source(format!("failed to read origin body: {}", e))),
            Some(Ok(chunk)) => chunk,
        };
        for bucket in &self.buckets {
            consume(bucket, chunk.len()).await;
        }
        self.md5.update(&chunk);
        Ok(Some(chunk))
    }

    // Hex md5 of everything read, including the seeded digest.
    pub fn md5(&self) -> String {
        hex::encode(self.md5.clone().finalize())
    }

}
