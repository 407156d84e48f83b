use anyhow::Context;
use clap::Parser;
use dav2s3::{
    load_config, log_summary, write_report, BatchReport, ConfigError, Pipeline, S3Uploader,
    SearchFilter, SearchType, StdinConfirm, TransferContext, WebDavFetcher,
};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dav2s3")]
#[command(
    about = "Download files from a WebDAV folder, upload them to S3 and clean up after verification",
    long_about = None
)]
#[command(version)]
struct Args {
    /// Configuration file (YAML)
    #[arg(short = 'c', long = "config", default_value = "default.yaml")]
    config: PathBuf,

    /// Source folder below `webdav.base_path`; the base itself if omitted
    #[arg(short = 's', long = "source")]
    source_folder: Option<String>,

    /// Target folder in the bucket; bucket root if omitted
    #[arg(short = 't', long = "target")]
    target_folder: Option<String>,

    /// Upload every file of this local folder and touch nothing on WebDAV
    #[arg(short = 'u', long = "upload")]
    upload: Option<PathBuf>,

    /// Delete source files on WebDAV once their upload is verified
    #[arg(short = 'd', long = "delete")]
    delete: bool,

    /// Verbose output; asks for confirmation before any deletion
    #[arg(short, long)]
    verbose: bool,

    /// Never ask for confirmation before deleting
    #[arg(short = 'n', long = "no-confirm")]
    no_confirm: bool,

    /// Search mask used to select files; requires -f
    #[arg(short = 'k', long = "search-type", value_enum)]
    search_type: Option<SearchType>,

    /// Search value matching the type given with -k
    #[arg(short = 'f', long = "search-value")]
    search_value: Option<String>,

    /// Local staging directory
    #[arg(long, default_value = "temp")]
    temp_dir: PathBuf,

    /// Stop at the first failed file and exit non-zero
    #[arg(long)]
    fail_fast: bool,

    /// Write a JSON transfer report to this file
    #[arg(long)]
    report: Option<PathBuf>,
}

/// Accepts the single-dash `-help` spelling as well.
fn normalize_args<I: IntoIterator<Item = OsString>>(args: I) -> Vec<OsString> {
    args.into_iter()
        .map(|a| if a == "-help" { OsString::from("--help") } else { a })
        .collect()
}

fn build_context(args: &Args) -> Result<TransferContext, ConfigError> {
    let filter = SearchFilter::from_flags(args.search_type, args.search_value.as_deref())?;
    let config = load_config(&args.config)?;

    let mut ctx = TransferContext::new(config);
    ctx.staging_dir = args.temp_dir.clone();
    ctx.source_folder = args.source_folder.clone();
    ctx.target_prefix = args.target_folder.clone().unwrap_or_default();
    ctx.filter = filter;
    ctx.confirm_deletions = !args.no_confirm && (args.verbose || args.delete);
    ctx.fail_fast = args.fail_fast;
    ctx.delete_remote = args.delete && args.upload.is_none();
    ctx.verbose = args.verbose;
    Ok(ctx)
}

async fn run(args: &Args, ctx: &TransferContext) -> anyhow::Result<BatchReport> {
    let fetcher = WebDavFetcher::new(&ctx.config.webdav)?;
    let uploader = S3Uploader::new(&ctx.config.s3).await;
    let pipeline = Pipeline::new(ctx, &fetcher, &uploader, &StdinConfirm);

    let resources = match &args.upload {
        Some(dir) => {
            info!("Upload flag detected, WebDAV will not be contacted");
            pipeline
                .local_resources(dir)
                .with_context(|| format!("Cannot read local folder {:?}", dir))?
        }
        None => pipeline
            .discover()
            .await
            .with_context(|| format!("Cannot list WebDAV folder {}", ctx.source_path()))?,
    };

    Ok(pipeline.run(resources).await?)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse_from(normalize_args(std::env::args_os()));
    dotenvy::dotenv().ok();

    // Initialize tracing
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("dav2s3={}", log_level))),
        )
        .init();

    let ctx = match build_context(&args) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("❌ Configuration error: {}", e);
            return ExitCode::from(2);
        }
    };

    info!("🚀 dav2s3 - WebDAV to S3 transfer");
    info!("Bucket: {}", ctx.config.s3.bucket);
    info!("Staging directory: {:?}", ctx.staging_dir);
    if let (Some(kind), Some(value)) = (args.search_type, args.search_value.as_deref()) {
        info!("Search: {} = {}", kind, value);
    }

    let report = match run(&args, &ctx).await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            return ExitCode::from(1);
        }
    };

    log_summary(&report);
    if let Some(path) = &args.report {
        if let Err(e) = write_report(&report, path) {
            warn!("Could not write report to {:?}: {}", path, e);
        }
    }

    if ctx.fail_fast && report.has_failures() {
        ExitCode::from(1)
    } else {
        info!("✅ Transfer finished");
        ExitCode::SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_dash_help_is_rewritten() {
        let args = normalize_args(["dav2s3", "-help", "-v"].map(OsString::from));
        assert_eq!(args, ["dav2s3", "--help", "-v"].map(OsString::from).to_vec());
    }

    #[test]
    fn test_parse_flags() {
        let args = Args::try_parse_from([
            "dav2s3", "-c", "prod.yaml", "-s", "deprecation", "-t", "logs/", "-d", "-n", "-k",
            "date-from", "-f", "03-01-2024",
        ])
        .unwrap();
        assert_eq!(args.config, PathBuf::from("prod.yaml"));
        assert_eq!(args.source_folder.as_deref(), Some("deprecation"));
        assert_eq!(args.search_type, Some(SearchType::DateFrom));
        assert!(args.delete && args.no_confirm && !args.verbose);
        assert_eq!(args.temp_dir, PathBuf::from("temp"));
    }

    #[test]
    fn test_short_help_exits_with_usage() {
        let err = Args::try_parse_from(["dav2s3", "-h"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_filter_flags_checked_before_config() {
        let args = Args::try_parse_from(["dav2s3", "-c", "/missing.yaml", "-k", "ext"]).unwrap();
        let err = build_context(&args).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFilter(_)));
    }
}
