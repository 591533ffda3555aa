//! Seekable reader over an HTTP episode enclosure.
//!
//! Fetches fixed-size byte ranges on demand and keeps the last block in
//! memory. Hosts that ignore `Range` and answer `200 OK` with the whole file
//! are handled by keeping the full body as one block.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use symphonia::core::io::MediaSource;

#[derive(Clone, Debug)]
pub struct HttpRangeConfig {
    /// Bytes per range request.
    pub block_size: usize,
    pub timeout: Duration,
}

impl Default for HttpRangeConfig {
    fn default() -> Self {
        Self {
            block_size: 256 * 1024,
            timeout: Duration::from_secs(15),
        }
    }
}

/// One fetched block and what the server told us about the whole resource.
struct Fetched {
    start: u64,
    data: Vec<u8>,
    total: Option<u64>,
}

pub struct HttpRangeSource {
    url: String,
    config: HttpRangeConfig,
    pos: u64,
    len: Option<u64>,
    block: Vec<u8>,
    block_start: u64,
    cancel: Option<Arc<AtomicBool>>,
}

impl HttpRangeSource {
    pub fn new(url: String, config: HttpRangeConfig, cancel: Option<Arc<AtomicBool>>) -> Self {
        Self {
            url,
            config,
            pos: 0,
            len: None,
            block: Vec::new(),
            block_start: 0,
            cancel,
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|c| c.load(Ordering::Relaxed))
    }

    fn block_end(&self) -> u64 {
        self.block_start.saturating_add(self.block.len() as u64)
    }

    fn in_block(&self, pos: u64) -> bool {
        !self.block.is_empty() && pos >= self.block_start && pos < self.block_end()
    }

    fn ensure_len(&mut self) -> io::Result<u64> {
        if let Some(len) = self.len {
            return Ok(len);
        }
        let fetched = self.fetch(0, 0)?;
        self.store(fetched);
        self.len
            .ok_or_else(|| io::Error::other("content length unavailable"))
    }

    fn fetch(&self, start: u64, end: u64) -> io::Result<Fetched> {
        let range = format!("bytes={start}-{end}");
        let began = Instant::now();
        let resp = ureq::get(&self.url)
            .config()
            .timeout_per_call(Some(self.config.timeout))
            .build()
            .header("Range", &range)
            .call()
            .map_err(|e| io::Error::other(format!("http range request failed: {e}")))?;

        let status = resp.status();
        let content_range = resp
            .headers()
            .get("Content-Range")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let content_length = resp
            .headers()
            .get("Content-Length")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());

        let mut data = Vec::new();
        let (_, body) = resp.into_parts();
        body.into_reader()
            .read_to_end(&mut data)
            .map_err(|e| io::Error::other(format!("http read failed: {e}")))?;

        let took = began.elapsed();
        if took > Duration::from_millis(500) {
            tracing::debug!(
                took_ms = took.as_millis() as u64,
                bytes = data.len(),
                range = range.as_str(),
                "slow range fetch"
            );
        }

        match status {
            ureq::http::StatusCode::PARTIAL_CONTENT => Ok(Fetched {
                start,
                data,
                total: content_range.as_deref().and_then(content_range_total),
            }),
            // Range ignored: the body is the whole resource from byte 0.
            ureq::http::StatusCode::OK => Ok(Fetched {
                start: 0,
                total: content_length.or(Some(data.len() as u64)),
                data,
            }),
            ureq::http::StatusCode::RANGE_NOT_SATISFIABLE => Ok(Fetched {
                start,
                data: Vec::new(),
                total: content_range.as_deref().and_then(content_range_total),
            }),
            other => Err(io::Error::other(format!("unexpected http status {other}"))),
        }
    }

    fn store(&mut self, fetched: Fetched) {
        if let Some(total) = fetched.total {
            self.len = Some(total);
        }
        self.block_start = fetched.start;
        self.block = fetched.data;
    }

    fn refill(&mut self) -> io::Result<()> {
        let start = self.pos;
        let mut end = start.saturating_add(self.config.block_size.max(1) as u64 - 1);
        if let Some(len) = self.len.filter(|len| *len > 0) {
            end = end.min(len - 1);
        }
        let fetched = self.fetch(start, end)?;
        self.store(fetched);
        Ok(())
    }
}

impl Read for HttpRangeSource {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() || self.cancelled() {
            return Ok(0);
        }
        if self.len.is_some_and(|len| self.pos >= len) {
            return Ok(0);
        }
        if !self.in_block(self.pos) {
            self.refill()?;
            if !self.in_block(self.pos) {
                return Ok(0);
            }
        }

        let offset = (self.pos - self.block_start) as usize;
        let n = (self.block.len() - offset).min(out.len());
        out[..n].copy_from_slice(&self.block[offset..offset + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for HttpRangeSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.pos = match pos {
            SeekFrom::Start(x) => x,
            SeekFrom::Current(d) => offset_by(self.pos, d),
            SeekFrom::End(d) => {
                let len = self.ensure_len()?;
                offset_by(len, d)
            }
        };
        Ok(self.pos)
    }
}

impl MediaSource for HttpRangeSource {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        self.len
    }
}

/// Total size from `bytes start-end/total`; `None` for `*` or malformed values.
fn content_range_total(header: &str) -> Option<u64> {
    let (_, total) = header.split_once('/')?;
    total.trim().parse::<u64>().ok()
}

fn offset_by(base: u64, delta: i64) -> u64 {
    if delta >= 0 {
        base.saturating_add(delta as u64)
    } else {
        base.saturating_sub(delta.unsigned_abs())
    }
}
