mod support;

use anyhow::Result;
use clap::Parser;

use pagestash::cache::{AsyncDiskCache, CacheLayout, CacheRequest};
use pagestash::cli::Cli;
use pagestash::execute;
use pagestash::settings::Settings;

use support::*;

struct Harness {
    dirs: TestDirs,
    config: std::path::PathBuf,
    cache: AsyncDiskCache,
}

impl Harness {
    async fn new(extra_config: &str) -> Result<Self> {
        let dirs = TestDirs::new()?;
        let config = dirs.write_config(extra_config)?;
        let settings = Settings::load_from(Some(config.clone()))?;
        let cache = AsyncDiskCache::open(settings.cache_config()).await?;
        Ok(Self {
            dirs,
            config,
            cache,
        })
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let config = self.config.display().to_string();
        let mut argv = vec!["pagestash", "--config", config.as_str()];
        argv.extend_from_slice(args);
        let cli = Cli::try_parse_from(argv)?;
        let mut out = Vec::new();
        execute(&self.cache, cli.command, &mut out).await?;
        Ok(String::from_utf8(out)?)
    }
}

#[tokio::test]
async fn store_get_has_remove() -> Result<()> {
    let harness = Harness::new("").await?;
    let body = harness.dirs.write_file("page.html", b"<h1>hello</h1>")?;
    let body = body.display().to_string();

    let stored = harness
        .run(&[
            "store",
            "https://example.com/page",
            &body,
            "--mime",
            "text/html",
            "--header",
            "Cache-Control: max-age=60",
            "--user-info",
            "pinned=true",
            "--user-info",
            "visits=3",
        ])
        .await?;
    assert!(stored.starts_with("stored "), "unexpected output: {stored}");

    assert_eq!(harness.run(&["get", "https://example.com/page"]).await?, "<h1>hello</h1>");
    assert_eq!(harness.run(&["has", "https://example.com/page"]).await?, "true\n");

    let entry = harness
        .cache
        .retrieve(request("https://example.com/page"))
        .await?
        .expect("stored through the cli");
    assert_eq!(entry.metadata.mime_type, "text/html");
    assert_eq!(entry.metadata.headers["cache-control"], "max-age=60");
    let info = entry.user_info.expect("user info");
    assert_eq!(serde_json::to_string(&info)?, r#"{"pinned":true,"visits":3}"#);

    let output = harness.dirs.work_dir.join("out.html");
    let output_arg = output.display().to_string();
    harness
        .run(&["get", "https://example.com/page", "--output", &output_arg])
        .await?;
    assert_eq!(std::fs::read(&output)?, b"<h1>hello</h1>");

    assert_eq!(harness.run(&["remove", "https://example.com/page"]).await?, "removed\n");
    assert_eq!(harness.run(&["remove", "https://example.com/page"]).await?, "not cached\n");
    assert_eq!(harness.run(&["has", "https://example.com/page"]).await?, "false\n");
    assert!(harness.run(&["get", "https://example.com/page"]).await.is_err());
    Ok(())
}

#[tokio::test]
async fn offline_store_skips_error_responses() -> Result<()> {
    let harness = Harness::new("layout = \"split\"\n").await?;
    let body = harness.dirs.write_file("missing.html", b"not found")?;
    let body = body.display().to_string();

    let skipped = harness
        .run(&["store", "https://example.com/gone", &body, "--status", "404", "--offline"])
        .await?;
    assert!(skipped.starts_with("skipped"), "unexpected output: {skipped}");

    harness
        .run(&["store", "https://example.com/ok", &body, "--offline"])
        .await?;
    let offline = CacheRequest::offline("https://example.com/ok".parse()?);
    assert!(harness.cache.has_entry(offline).await?);
    assert_eq!(harness.cache.blocking().layout(), CacheLayout::Split);
    Ok(())
}

#[tokio::test]
async fn clear_and_stats() -> Result<()> {
    let harness = Harness::new("max_size = 4096\n").await?;
    let body = harness.dirs.write_file("a.txt", b"aaaa")?;
    let body = body.display().to_string();
    harness.run(&["store", "foo://bar", &body]).await?;

    let stats = harness.run(&["stats", "--metrics"]).await?;
    assert!(stats.contains("entries: 1"), "unexpected stats: {stats}");
    assert!(stats.contains("max_size: 4096"));
    assert!(stats.contains("cache_store_total"));

    assert_eq!(harness.run(&["clear"]).await?, "cleared\n");
    let stats = harness.run(&["stats"]).await?;
    assert!(stats.contains("entries: 0"));
    assert!(stats.contains("current_size: 0"));
    Ok(())
}

#[tokio::test]
async fn store_rejects_bad_input() -> Result<()> {
    let harness = Harness::new("").await?;
    let body = harness.dirs.write_file("b.txt", b"b")?;
    let body = body.display().to_string();

    assert!(
        harness
            .run(&["store", "https://example.com/", &body, "--status", "42"])
            .await
            .is_err()
    );
    assert!(
        harness
            .run(&["store", "https://example.com/", "/nonexistent/body"])
            .await
            .is_err()
    );
    assert!(harness.run(&["has", "not a url"]).await.is_err());
    Ok(())
}
