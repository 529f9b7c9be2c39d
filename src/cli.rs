use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Parser)]
#[command(name = "pagestash", about = "Disk-backed offline cache for page resources")]
pub struct Cli {
    /// Path to the configuration file (defaults to ./pagestash.toml if present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Store a response body under a URL.
    Store(StoreArgs),
    /// Print the cached body for a URL, or write it to a file.
    Get {
        url: String,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Report whether a URL is cached.
    Has { url: String },
    /// Delete the entry for a URL.
    Remove { url: String },
    /// Delete every entry and the manifest.
    Clear,
    /// Show cache usage.
    Stats {
        /// Also print counters in the Prometheus text format.
        #[arg(long)]
        metrics: bool,
    },
}

#[derive(Debug, Clone, Args)]
pub struct StoreArgs {
    pub url: String,
    /// File holding the response body.
    pub body: PathBuf,
    #[arg(long, default_value = "application/octet-stream")]
    pub mime: String,
    #[arg(long, default_value_t = 200)]
    pub status: u16,
    #[arg(long)]
    pub text_encoding: Option<String>,
    /// Response header as `Name: value`; repeatable.
    #[arg(long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,
    /// User info entry as `key=value`; repeatable.
    #[arg(long = "user-info", value_parser = parse_user_info)]
    pub user_info: Vec<(String, String)>,
    /// Apply offline admission rules instead of storing unconditionally.
    #[arg(long)]
    pub offline: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("header `{raw}` must look like `Name: value`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("header `{raw}` has an empty name"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn parse_user_info(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("user info `{raw}` must look like `key=value`"))?;
    if key.is_empty() {
        return Err(format!("user info `{raw}` has an empty key"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_store_with_repeated_flags() {
        let cli = Cli::try_parse_from([
            "pagestash",
            "--config",
            "cache.toml",
            "store",
            "https://example.com/",
            "body.html",
            "--mime",
            "text/html",
            "--header",
            "Cache-Control: max-age=60",
            "--header",
            "ETag:\"abc\"",
            "--user-info",
            "foo=bar",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("cache.toml")));
        let Command::Store(args) = cli.command else {
            panic!("expected store command");
        };
        assert_eq!(args.mime, "text/html");
        assert_eq!(args.status, 200);
        assert_eq!(
            args.headers,
            vec![
                ("Cache-Control".to_string(), "max-age=60".to_string()),
                ("ETag".to_string(), "\"abc\"".to_string()),
            ]
        );
        assert_eq!(args.user_info, vec![("foo".to_string(), "bar".to_string())]);
    }

    #[test]
    fn rejects_malformed_pairs() {
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(": value").is_err());
        assert!(parse_user_info("novalue").is_err());
        assert!(parse_user_info("=x").is_err());
        assert_eq!(
            parse_user_info("a=b=c").unwrap(),
            ("a".to_string(), "b=c".to_string())
        );
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from(["pagestash", "stats", "--config", "x.toml", "--metrics"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert!(matches!(cli.command, Command::Stats { metrics: true }));
    }
}
