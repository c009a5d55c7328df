//! Fixtures shared by unit tests: a canned build state, a local HTTP server
//! and helpers for writing archives and fake tools.

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::state::BuildState;

/// State carrying the directory keys every handler needs, rooted at `root`.
pub fn dirs_state(root: &Path) -> BuildState {
    let mut state = BuildState::new();
    state.set("prefix_dir", root.join("x86_64"));
    state.set("logs_dir", root.join("setup/x86_64/log"));
    state.set("builds_dir", root.join("setup/x86_64/build"));
    state.set("status_dir", root.join("setup/x86_64/status"));
    state.set("sources_dir", root.join("setup/src"));
    state.set("archives_dir", root.join("setup/archive"));
    state.set("toolchain_name", "x86_64");
    state.set("target_triple", "x86_64-linux-musl");
    state.set("parent_target_triple", "x86_64-linux-gnu");
    state.set("cpu_count", "2");
    state
}

/// An environment holding only the test process's `PATH`.
pub fn path_env() -> BTreeMap<String, String> {
    BTreeMap::from([(
        "PATH".to_string(),
        std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/bin".into()),
    )])
}

/// Gzipped tarball of `(path, content, mode)` entries.
pub fn tar_gz(entries: &[(&str, &str, u32)]) -> Vec<u8> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, content, mode) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(content.len() as u64);
        header.set_mode(*mode);
        header.set_mtime(1_500_000_000);
        header.set_cksum();
        builder
            .append_data(&mut header, path, content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Write an executable shell script `dir/name`.
pub fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// One file served by [`HttpFixture`].
#[derive(Clone)]
pub struct Route {
    path: String,
    body: Vec<u8>,
    etag: Option<String>,
    last_modified: Option<String>,
}

impl Route {
    pub fn file(path: &str, body: Vec<u8>) -> Self {
        Self {
            path: path.to_string(),
            body,
            etag: None,
            last_modified: None,
        }
    }

    pub fn etag(mut self, etag: &str) -> Self {
        self.etag = Some(etag.to_string());
        self
    }

    pub fn last_modified(mut self, date: &str) -> Self {
        self.last_modified = Some(date.to_string());
        self
    }
}

type Hits = Arc<Mutex<BTreeMap<(String, String), usize>>>;

/// Minimal HTTP/1.1 server on a loopback port, one connection per request.
pub struct HttpFixture {
    port: u16,
    hits: Hits,
}

impl HttpFixture {
    pub fn start(routes: Vec<Route>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let hits: Hits = Arc::default();
        let routes: Arc<BTreeMap<String, Route>> =
            Arc::new(routes.into_iter().map(|r| (r.path.clone(), r)).collect());

        let counter = Arc::clone(&hits);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                serve(stream, &routes, &counter);
            }
        });

        Self { port, hits }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    pub fn gets(&self, path: &str) -> usize {
        self.count("GET", path)
    }

    pub fn heads(&self, path: &str) -> usize {
        self.count("HEAD", path)
    }

    fn count(&self, method: &str, path: &str) -> usize {
        self.hits
            .lock()
            .unwrap()
            .get(&(method.to_string(), path.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// URL on a loopback port nothing listens on.
    pub fn dead_url(path: &str) -> String {
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        format!("http://127.0.0.1:{port}{path}")
    }
}

fn serve(stream: TcpStream, routes: &BTreeMap<String, Route>, hits: &Hits) {
    let mut reader = BufReader::new(&stream);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) if line == "\r\n" || line == "\n" => break,
            Ok(_) => {}
        }
    }

    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();
    *hits
        .lock()
        .unwrap()
        .entry((method.clone(), path.clone()))
        .or_default() += 1;

    let mut out = &stream;
    let Some(route) = routes.get(&path) else {
        let _ = out.write_all(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
        return;
    };

    let mut head = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n",
        route.body.len()
    );
    if let Some(etag) = &route.etag {
        head.push_str(&format!("ETag: {etag}\r\n"));
    }
    if let Some(date) = &route.last_modified {
        head.push_str(&format!("Last-Modified: {date}\r\n"));
    }
    head.push_str("\r\n");

    let _ = out.write_all(head.as_bytes());
    if method == "GET" {
        let _ = out.write_all(&route.body);
    }
    let _ = out.flush();
}
