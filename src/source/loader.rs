//! Proxy list files
//!
//! Plain text, one upstream per line. Lines starting with `#` and blank
//! lines are ignored. Accepted forms, each optionally prefixed with a
//! `scheme://`:
//!
//! - `ip:port:user:pass`
//! - `user:pass@ip:port`
//! - `ip:port`
//! - `ip`

use crate::error::{GatewayError, GatewayResult};
use crate::helper::PeriodicTask;
use crate::pool::{ProxyPool, ProxyRecord, ProxyType};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, warn};

/// Counts from loading one list file
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    /// Records new to the pool
    pub loaded: usize,
    /// Malformed lines
    pub skipped: usize,
    /// Valid lines whose URL was already pooled
    pub duplicates: usize,
}

fn parse_port(raw: &str, line: &str) -> GatewayResult<u16> {
    match raw.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(GatewayError::Format(format!(
            "invalid port {:?} in proxy line: {}",
            raw, line
        ))),
    }
}

fn check_part(part: &str, what: &str, line: &str) -> GatewayResult<()> {
    if part.is_empty() || part.chars().any(char::is_whitespace) {
        return Err(GatewayError::Format(format!(
            "invalid {} in proxy line: {}",
            what, line
        )));
    }
    Ok(())
}

/// Parse one list line into a record of `proxy_type`
///
/// Returns `Ok(None)` for comments and blank lines.
pub fn parse_proxy_line(line: &str, proxy_type: ProxyType) -> GatewayResult<Option<ProxyRecord>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let body = match line.split_once("://") {
        Some((_, rest)) => rest,
        None => line,
    };

    let (host, port, credentials) = match body.rsplit_once('@') {
        Some((userinfo, hostport)) => {
            let (user, pass) = userinfo.split_once(':').ok_or_else(|| {
                GatewayError::Format(format!("missing password in proxy line: {}", line))
            })?;
            let (host, port) = hostport.rsplit_once(':').ok_or_else(|| {
                GatewayError::Format(format!("missing port in proxy line: {}", line))
            })?;
            (host, Some(parse_port(port, line)?), Some((user, pass)))
        }
        None => {
            let parts: Vec<&str> = body.split(':').collect();
            match parts.as_slice() {
                [host] => (*host, None, None),
                [host, port] => (*host, Some(parse_port(port, line)?), None),
                [host, port, user, pass] => {
                    (*host, Some(parse_port(port, line)?), Some((*user, *pass)))
                }
                _ => {
                    return Err(GatewayError::Format(format!(
                        "unrecognized proxy line: {}",
                        line
                    )))
                }
            }
        }
    };

    check_part(host, "host", line)?;
    let url = match port {
        Some(port) => format!("{}://{}:{}", proxy_type.scheme(), host, port),
        None => format!("{}://{}", proxy_type.scheme(), host),
    };

    let mut record = ProxyRecord::new(url, proxy_type);
    if let Some((user, pass)) = credentials {
        check_part(user, "username", line)?;
        check_part(pass, "password", line)?;
        record = record.with_credentials(user, pass);
    }

    record.endpoint()?;
    Ok(Some(record))
}

/// Load every valid line of `path` into `pool` as `proxy_type` records
///
/// Malformed lines are logged and skipped.
pub async fn load_proxies_with_type(
    path: &Path,
    proxy_type: ProxyType,
    pool: &ProxyPool,
) -> Result<LoadReport> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to open proxy list file: {:?}", path))?;

    let mut report = LoadReport::default();
    for (lineno, line) in content.lines().enumerate() {
        match parse_proxy_line(line, proxy_type) {
            Ok(Some(record)) => {
                if pool.add(record).await {
                    report.loaded += 1;
                } else {
                    report.duplicates += 1;
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Skipping {:?} line {}: {}", path, lineno + 1, e);
                report.skipped += 1;
            }
        }
    }

    info!(
        "Loaded {} {} proxies from {:?} ({} skipped, {} duplicates)",
        report.loaded, proxy_type, path, report.skipped, report.duplicates
    );
    Ok(report)
}

/// Load the HTTP and SOCKS5 list files
///
/// Fails if either file cannot be read or the pool is still empty.
pub async fn load_proxies_from_files(
    http_file: Option<&Path>,
    socks5_file: Option<&Path>,
    pool: &ProxyPool,
) -> Result<()> {
    if let Some(path) = http_file {
        load_proxies_with_type(path, ProxyType::Http, pool)
            .await
            .context("Failed to load HTTP proxies")?;
    }

    if let Some(path) = socks5_file {
        load_proxies_with_type(path, ProxyType::Socks5, pool)
            .await
            .context("Failed to load SOCKS5 proxies")?;
    }

    if pool.is_empty().await {
        bail!("No valid proxies found in any file");
    }

    Ok(())
}

#[derive(Debug)]
struct WatchedFile {
    path: PathBuf,
    proxy_type: ProxyType,
    modified: Option<SystemTime>,
}

async fn modified_time(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}

/// Periodic task reloading list files whose modification time changed
pub struct FileWatchTask {
    pool: Arc<ProxyPool>,
    files: Vec<WatchedFile>,
    interval: Duration,
}

impl FileWatchTask {
    /// Watch the given files, remembering their current modification times
    pub async fn new(
        pool: Arc<ProxyPool>,
        http_file: Option<PathBuf>,
        socks5_file: Option<PathBuf>,
        interval: Duration,
    ) -> Self {
        let mut files = Vec::new();
        for (path, proxy_type) in [(http_file, ProxyType::Http), (socks5_file, ProxyType::Socks5)] {
            if let Some(path) = path {
                let modified = modified_time(&path).await;
                files.push(WatchedFile {
                    path,
                    proxy_type,
                    modified,
                });
            }
        }

        FileWatchTask {
            pool,
            files,
            interval,
        }
    }
}

#[async_trait]
impl PeriodicTask for FileWatchTask {
    fn name(&self) -> &str {
        "file-watch"
    }

    async fn next_delay(&self) -> Duration {
        self.interval
    }

    async fn run_once(&mut self) {
        for file in &mut self.files {
            let Some(modified) = modified_time(&file.path).await else {
                debug!("Cannot stat proxy list {:?}", file.path);
                continue;
            };
            if file.modified == Some(modified) {
                continue;
            }

            info!(
                "{} proxy file {:?} changed, reloading",
                file.proxy_type, file.path
            );
            if let Err(e) = load_proxies_with_type(&file.path, file.proxy_type, &self.pool).await {
                error!("Error reloading {} proxies: {:#}", file.proxy_type, e);
            }
            file.modified = Some(modified);
        }
    }
}
