pub mod cache;
pub mod cli;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod settings;

use std::io::Write;

use anyhow::{Context, Result};
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Uri};
use tracing::info;

use crate::cache::{AsyncDiskCache, CacheRequest, ResponseMetadata, UserInfo, UserValue};
use crate::cli::{Command, StoreArgs};
use crate::settings::Settings;

pub async fn run(settings: Settings, command: Command) -> Result<()> {
    let cache = AsyncDiskCache::open(settings.cache_config())
        .await
        .with_context(|| format!("failed to open cache at {}", settings.cache_dir.display()))?;
    let mut stdout = std::io::stdout().lock();
    execute(&cache, command, &mut stdout).await
}

/// Runs one CLI command against `cache`, writing its output to `out`.
pub async fn execute<W: Write>(
    cache: &AsyncDiskCache,
    command: Command,
    out: &mut W,
) -> Result<()> {
    match command {
        Command::Store(args) => store(cache, args, out).await,
        Command::Get { url, output } => {
            let entry = cache
                .retrieve(request_for(&url)?)
                .await?
                .with_context(|| format!("no cached entry for {url}"))?;
            match output {
                Some(path) => std::fs::write(&path, &entry.body)
                    .with_context(|| format!("failed to write {}", path.display()))?,
                None => out.write_all(&entry.body)?,
            }
            Ok(())
        }
        Command::Has { url } => {
            let present = cache.has_entry(request_for(&url)?).await?;
            writeln!(out, "{present}")?;
            Ok(())
        }
        Command::Remove { url } => {
            let removed = cache.remove(request_for(&url)?).await?;
            writeln!(out, "{}", if removed { "removed" } else { "not cached" })?;
            Ok(())
        }
        Command::Clear => {
            cache.clear().await?;
            writeln!(out, "cleared")?;
            Ok(())
        }
        Command::Stats { metrics } => {
            let disk = cache.blocking();
            writeln!(out, "root: {}", disk.root().display())?;
            writeln!(out, "layout: {:?}", disk.layout())?;
            writeln!(out, "entries: {}", disk.len())?;
            writeln!(out, "current_size: {}", disk.current_size())?;
            writeln!(out, "max_size: {}", disk.max_size())?;
            if metrics {
                out.write_all(&crate::metrics::gather()?)?;
            }
            Ok(())
        }
    }
}

async fn store<W: Write>(cache: &AsyncDiskCache, args: StoreArgs, out: &mut W) -> Result<()> {
    let body = std::fs::read(&args.body)
        .with_context(|| format!("failed to read body from {}", args.body.display()))?;
    let status = StatusCode::from_u16(args.status)
        .with_context(|| format!("invalid status {}", args.status))?;

    let mut metadata = ResponseMetadata::new(args.url.clone(), args.mime)
        .with_status(status)
        .with_headers(header_map(&args.headers)?);
    if let Some(encoding) = args.text_encoding {
        metadata = metadata.with_text_encoding(encoding);
    }
    let user_info = (!args.user_info.is_empty()).then(|| typed_user_info(args.user_info));

    let mut request = request_for(&args.url)?;
    request.offline = args.offline;

    let report = if args.offline {
        cache
            .store_offline(request, metadata, Bytes::from(body), user_info)
            .await?
    } else {
        Some(cache.store(request, metadata, Bytes::from(body), user_info).await?)
    };

    match report {
        Some(report) => {
            info!(
                key = %report.key,
                size = report.size,
                evicted = report.evicted.len(),
                "stored entry"
            );
            if report.retained() {
                writeln!(out, "stored {} ({} bytes)", report.key, report.size)?;
            } else {
                writeln!(out, "stored {} but evicted it to respect max_size", report.key)?;
            }
        }
        None => writeln!(out, "skipped: response not eligible for offline storage")?,
    }
    Ok(())
}

fn request_for(url: &str) -> Result<CacheRequest> {
    let uri = url
        .parse::<Uri>()
        .with_context(|| format!("invalid url `{url}`"))?;
    Ok(CacheRequest::new(uri))
}

fn header_map(pairs: &[(String, String)]) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        let name = HeaderName::try_from(name.as_str())
            .with_context(|| format!("invalid header name `{name}`"))?;
        let value = HeaderValue::from_str(value)
            .with_context(|| format!("invalid value for header `{name}`"))?;
        headers.append(name, value);
    }
    Ok(headers)
}

/// CLI user info values are typed when they look like a bool or an integer.
fn typed_user_info(pairs: Vec<(String, String)>) -> UserInfo {
    pairs
        .into_iter()
        .map(|(key, raw)| {
            let value = if let Ok(flag) = raw.parse::<bool>() {
                UserValue::Bool(flag)
            } else if let Ok(number) = raw.parse::<i64>() {
                UserValue::Integer(number)
            } else {
                UserValue::Text(raw)
            };
            (key, value)
        })
        .collect()
}
