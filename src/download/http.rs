//! HTTP(S) archive downloads.
//!
//! A download first issues a `HEAD` request to learn the archive's file name
//! and freshness headers. The body is only transferred when the cached copy
//! is missing or stale:
//!
//! - a recorded `ETag` equal to the server's means the cache is current
//! - a remote `Last-Modified` not newer than the cached file's mtime means
//!   the cache is current
//!
//! Bodies stream into a `.part` file that is renamed into place once
//! complete, so an interrupted transfer never looks like a cached archive.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, CONTENT_DISPOSITION, ETAG, LAST_MODIFIED};
use time::format_description::well_known::Rfc2822;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::error::BuildError;
use crate::fsutil::{ensure_dir, mtime};
use crate::status::StatusFile;

const USER_AGENT: &str = concat!("toolchain-builder/", env!("CARGO_PKG_VERSION"));
const PROGRESS_STEP: u64 = 8 * 1024 * 1024;

/// HTTP client for `url`. Loopback hosts bypass any configured proxy.
pub fn client_for(url: &str) -> Result<Client> {
    let mut builder = Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(30));
    if is_loopback(url) {
        builder = builder.no_proxy();
    }
    builder
        .build()
        .map_err(|e| network_error(url, e))
}

fn is_loopback(url: &str) -> bool {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .is_some_and(|host| host == "localhost" || host == "127.0.0.1" || host == "[::1]")
}

fn network_error(url: &str, err: impl std::fmt::Display) -> anyhow::Error {
    BuildError::Network {
        url: url.to_string(),
        reason: err.to_string(),
    }
    .into()
}

fn check_status(url: &str, response: Response) -> Result<Response> {
    response
        .error_for_status()
        .map_err(|e| network_error(url, e))
}

/// Fetch a small resource into memory (patches, config.sub).
pub fn fetch_bytes(url: &str) -> Result<Vec<u8>> {
    let client = client_for(url)?;
    let response = client
        .get(url)
        .send()
        .map_err(|e| network_error(url, e))?;
    let response = check_status(url, response)?;
    let bytes = response.bytes().map_err(|e| network_error(url, e))?;
    Ok(bytes.to_vec())
}

/// Downloads one URL into an archive directory.
pub struct HttpDownloader {
    url: String,
    client: Client,
}

impl HttpDownloader {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        let client = client_for(&url)?;
        Ok(Self { url, client })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Make sure the archive is present in `archive_dir` and return its path.
    ///
    /// `status` records the response `ETag` and the archive path for later
    /// runs.
    pub fn download(&self, archive_dir: &Path, status: &StatusFile) -> Result<PathBuf> {
        ensure_dir(archive_dir)?;

        let head = self
            .client
            .head(&self.url)
            .send()
            .map_err(|e| network_error(&self.url, e))?;
        let head = check_status(&self.url, head)?;
        let headers = head.headers();

        let filename = content_disposition_filename(headers)
            .or_else(|| url_filename(head.url().path()))
            .ok_or_else(|| {
                BuildError::Configuration(format!(
                    "cannot derive an archive file name from '{}'",
                    self.url
                ))
            })?;
        let output = archive_dir.join(&filename);
        let remote_etag = header_str(headers, ETAG);

        if output.is_file() {
            if let (Some(remote), Some(recorded)) = (&remote_etag, status.get_str("etag")?) {
                if *remote == recorded {
                    info!("{filename} unchanged (etag), skipping download");
                    return Ok(output);
                }
            }
            if let (Some(remote), Some(local)) = (
                header_str(headers, LAST_MODIFIED).and_then(|v| parse_http_date(&v)),
                mtime(&output),
            ) {
                if remote <= local {
                    info!("{filename} not modified, skipping download");
                    self.record(status, &output, remote_etag.as_deref())?;
                    return Ok(output);
                }
            }
        }

        info!("downloading {filename}");
        let response = self
            .client
            .get(&self.url)
            .send()
            .map_err(|e| network_error(&self.url, e))?;
        let response = check_status(&self.url, response)?;
        let etag = header_str(response.headers(), ETAG).or(remote_etag);
        self.stream_to(response, &output)?;

        self.record(status, &output, etag.as_deref())?;
        Ok(output)
    }

    fn record(&self, status: &StatusFile, output: &Path, etag: Option<&str>) -> Result<()> {
        status.set_str("archive", &output.display().to_string())?;
        if let Some(etag) = etag {
            status.set_str("etag", etag)?;
        }
        Ok(())
    }

    fn stream_to(&self, mut response: Response, output: &Path) -> Result<()> {
        let total = response.content_length();
        let partial = PathBuf::from(format!("{}.part", output.display()));
        let file = File::create(&partial).map_err(|e| BuildError::Filesystem {
            path: partial.clone(),
            reason: e.to_string(),
        })?;
        let mut writer = BufWriter::new(file);

        let mut buf = vec![0u8; 64 * 1024];
        let mut received: u64 = 0;
        let mut next_report = PROGRESS_STEP;
        loop {
            let n = match response.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(network_error(&self.url, e)),
            };
            writer
                .write_all(&buf[..n])
                .with_context(|| format!("writing '{}'", partial.display()))?;
            received += n as u64;
            if received >= next_report {
                match total {
                    Some(total) => debug!("{received}/{total} bytes of {}", self.url),
                    None => debug!("{received} bytes of {}", self.url),
                }
                next_report += PROGRESS_STEP;
            }
        }
        writer
            .flush()
            .with_context(|| format!("writing '{}'", partial.display()))?;

        if let Some(total) = total {
            if received != total {
                return Err(network_error(
                    &self.url,
                    format!("body ended after {received} of {total} bytes"),
                ));
            }
        }
        fs::rename(&partial, output)
            .with_context(|| format!("moving download into '{}'", output.display()))?;
        Ok(())
    }
}

fn header_str(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
}

/// File name from a `Content-Disposition` header, preferring the RFC 5987
/// `filename*` form. Any directory part is dropped.
pub fn content_disposition_filename(headers: &HeaderMap) -> Option<String> {
    let value = header_str(headers, CONTENT_DISPOSITION)?;
    let mut plain = None;
    let mut extended = None;

    for param in value.split(';').skip(1) {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        let raw = raw.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                // charset'language'value
                let encoded = raw.rsplit('\'').next().unwrap_or(raw);
                extended = Some(percent_decode(encoded));
            }
            "filename" => plain = Some(raw.trim_matches('"').to_string()),
            _ => {}
        }
    }

    extended.or(plain).and_then(|name| sanitize(&name))
}

/// Last path segment of a URL path.
pub fn url_filename(path: &str) -> Option<String> {
    path.rsplit('/')
        .find(|s| !s.is_empty())
        .and_then(|s| sanitize(&percent_decode(s)))
}

fn sanitize(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next()?.trim();
    if base.is_empty() || base == "." || base == ".." {
        None
    } else {
        Some(base.to_string())
    }
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Parse an HTTP date (`Wed, 21 Oct 2015 07:28:00 GMT`).
pub fn parse_http_date(value: &str) -> Option<SystemTime> {
    let normalized = match value.trim().strip_suffix(" GMT") {
        Some(stem) => format!("{stem} +0000"),
        None => value.trim().to_string(),
    };
    OffsetDateTime::parse(&normalized, &Rfc2822)
        .ok()
        .map(SystemTime::from)
}
