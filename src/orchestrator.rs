//! Main orchestration logic: one resource at a time through
//! fetch → upload → verify → (remote delete) → cleanup.

use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::config::TransferContext;
use crate::confirm::Confirm;
use crate::error::{CleanupError, TransferError, VerificationError};
use crate::fetch::Fetcher;
use crate::stage::{list_files, Stager};
use crate::types::{BatchReport, Resource, TransferRecord, TransferState};
use crate::upload::Uploader;
use crate::verify::verify_upload;

/// The transfer pipeline with its collaborators injected.
pub struct Pipeline<'a> {
    ctx: &'a TransferContext,
    stager: Stager,
    fetcher: &'a dyn Fetcher,
    uploader: &'a dyn Uploader,
    confirm: &'a dyn Confirm,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        ctx: &'a TransferContext,
        fetcher: &'a dyn Fetcher,
        uploader: &'a dyn Uploader,
        confirm: &'a dyn Confirm,
    ) -> Self {
        Self {
            ctx,
            stager: Stager::new(ctx.staging_dir.clone()),
            fetcher,
            uploader,
            confirm,
        }
    }

    /// Lists the source folder and turns the entries that pass the search
    /// filter into resources.
    pub async fn discover(&self) -> Result<Vec<Resource>, TransferError> {
        let folder = self.ctx.source_path();
        let entries = self.fetcher.list(&folder).await?;
        if entries.is_empty() {
            info!("Source folder {} is empty, nothing to transfer", folder);
            return Ok(Vec::new());
        }

        let total = entries.len();
        let resources: Vec<Resource> = entries
            .iter()
            .filter(|e| self.ctx.filter.as_ref().map_or(true, |f| f.matches(e)))
            .map(|e| Resource::from_remote(e, &self.ctx.staging_dir, &self.ctx.target_prefix))
            .collect();
        info!(
            "{} of {} file(s) in {} selected for transfer",
            resources.len(),
            total,
            folder
        );
        Ok(resources)
    }

    /// Resources for every regular file in `dir` (upload-only mode).
    pub fn local_resources(&self, dir: &Path) -> Result<Vec<Resource>, TransferError> {
        let resources: Vec<Resource> = list_files(dir)?
            .iter()
            .filter_map(|p| Resource::from_local(p, &self.ctx.target_prefix))
            .collect();
        info!("{} local file(s) in {:?} selected for upload", resources.len(), dir);
        Ok(resources)
    }

    /// Runs every resource through the pipeline, in order.
    ///
    /// A failed resource does not stop the batch unless `fail_fast` is set.
    /// The staging directory is created first when any resource comes from
    /// WebDAV.
    ///
    /// # Arguments
    ///
    /// * `resources` - Output of [`Pipeline::discover`] or
    ///   [`Pipeline::local_resources`]
    ///
    /// # Returns
    ///
    /// A [`BatchReport`] with one record per processed resource, or an error
    /// if the staging directory cannot be created.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use dav2s3::{load_config, Pipeline, S3Uploader, StdinConfirm, TransferContext, WebDavFetcher};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let ctx = TransferContext::new(load_config("default.yaml")?);
    /// let fetcher = WebDavFetcher::new(&ctx.config.webdav)?;
    /// let uploader = S3Uploader::new(&ctx.config.s3).await;
    /// let pipeline = Pipeline::new(&ctx, &fetcher, &uploader, &StdinConfirm);
    ///
    /// let report = pipeline.run(pipeline.discover().await?).await?;
    /// println!("{} failed", report.count(dav2s3::TransferState::Failed));
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run(&self, resources: Vec<Resource>) -> Result<BatchReport, TransferError> {
        let started = Instant::now();
        if resources.iter().any(Resource::is_remote) {
            self.stager.ensure_directory()?;
        }

        let pb = self.progress_bar(resources.len());
        let mut report = BatchReport::default();

        for resource in resources {
            pb.set_message(resource.name.clone());
            let record = self.process(resource).await;
            pb.inc(1);

            let failed = record.is_failed();
            report.records.push(record);
            if failed && self.ctx.fail_fast {
                warn!("Fail-fast is set, stopping the batch");
                report.aborted = true;
                break;
            }
        }

        pb.finish_and_clear();
        report.elapsed = started.elapsed();
        Ok(report)
    }

    /// Takes one resource as far through the pipeline as it can go.
    ///
    /// # Arguments
    ///
    /// * `resource` - The file to transfer
    ///
    /// # Returns
    ///
    /// The final record. Errors are not returned: a failed step leaves the
    /// record `FAILED` with its reason, keeping the flags of the steps that
    /// completed.
    pub async fn process(&self, resource: Resource) -> TransferRecord {
        let mut record = TransferRecord::new(resource);
        if let Err(e) = self.advance(&mut record).await {
            error!("❌ {} failed: {}", record.resource.name, e);
            if let Err(e) = record.mark_failed(e.to_string()) {
                warn!("Cannot mark {} as failed: {}", record.resource.name, e);
            }
        }
        record
    }

    async fn advance(&self, record: &mut TransferRecord) -> Result<(), TransferError> {
        let resource = record.resource.clone();

        // PENDING → FETCHED
        if resource.is_remote() {
            if self.stager.is_staged(&resource.name) {
                warn!(
                    "{} already exists in {:?}, overwriting it",
                    resource.name,
                    self.stager.dir()
                );
            }
            info!("⬇️  Downloading {}", resource.name);
            let outcome = self.fetcher.fetch(&resource, &resource.staged_path).await?;
            info!("Fetched {} ({} bytes)", resource.name, outcome.bytes);
            record.mark_fetched(resource.staged_path.clone(), Some(outcome.md5))?;
        } else {
            // Local files are already in place; adopt them as staged.
            tokio::fs::metadata(&resource.staged_path).await?;
            record.mark_fetched(resource.staged_path.clone(), None)?;
        }

        // FETCHED → UPLOADED
        info!(
            "⬆️  Uploading {} to {}/{}",
            resource.name,
            self.uploader.bucket(),
            resource.s3_key
        );
        self.uploader
            .upload(&resource.staged_path, &resource.s3_key)
            .await?;
        record.mark_uploaded()?;

        // UPLOADED → VERIFIED
        let remote = self
            .uploader
            .head(&resource.s3_key)
            .await
            .map_err(VerificationError::from)?;
        verify_upload(
            &resource.staged_path,
            &resource.s3_key,
            record.md5(),
            remote.as_ref(),
            self.ctx.config.s3.verify_checksum,
        )
        .await?;
        record.mark_verified()?;

        if !resource.is_remote() {
            // Upload-only: the operator's own files are never deleted.
            return Ok(());
        }

        if self.ctx.delete_remote {
            self.delete_remote(record).await?;
        }

        // VERIFIED → CLEANED
        self.cleanup(record)
    }

    /// Asks for confirmation when the run requires it.
    fn approved(&self, prompt: &str) -> bool {
        !self.ctx.confirm_deletions || self.confirm.confirm(prompt)
    }

    async fn delete_remote(&self, record: &mut TransferRecord) -> Result<(), TransferError> {
        let name = record.resource.name.clone();
        let href = record.resource.webdav_path.as_deref().unwrap_or(&name);
        let prompt = format!(
            "---> Attention! {}{} will be deleted from WebDAV. Confirm?",
            self.ctx.config.webdav.url, href
        );
        if !self.approved(&prompt) {
            info!("Keeping {} on WebDAV", name);
            return Ok(());
        }

        match self.fetcher.delete(&record.resource).await {
            Ok(()) => record.mark_remote_deleted(),
            Err(e) => {
                warn!("Could not delete {} from WebDAV: {}", name, e);
                Ok(())
            }
        }
    }

    fn cleanup(&self, record: &mut TransferRecord) -> Result<(), TransferError> {
        let path = record.resource.staged_path.clone();
        let prompt = format!(
            "{} was uploaded to {}/{}. Remove the temporary copy {:?}?",
            record.resource.name,
            self.uploader.bucket(),
            record.resource.s3_key,
            path
        );
        if !self.approved(&prompt) {
            info!("Keeping staged file {:?}", path);
            return Ok(());
        }

        match self.stager.cleanup(&path) {
            Ok(()) => {
                info!("{} was uploaded. Removed temporary copy.", record.resource.name);
                record.mark_cleaned()
            }
            Err(e @ CleanupError::Missing(_)) => {
                warn!("{}", e);
                record.mark_cleaned()
            }
            Err(e) => {
                warn!("{}", e);
                Ok(())
            }
        }
    }

    /// The bar shares stderr with log output and confirmation prompts.
    fn shows_progress(&self, stderr_is_tty: bool) -> bool {
        stderr_is_tty && !self.ctx.verbose && !self.ctx.confirm_deletions
    }

    fn progress_bar(&self, len: usize) -> indicatif::ProgressBar {
        if !self.shows_progress(atty::is(atty::Stream::Stderr)) {
            return indicatif::ProgressBar::hidden();
        }
        let pb = indicatif::ProgressBar::new(len as u64);
        if let Ok(style) = indicatif::ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg} | {elapsed_precise} elapsed")
        {
            pb.set_style(style.progress_chars("█▓▒░ "));
        }
        pb
    }
}

/// Logs per-state counts and the elapsed time of a finished batch.
pub fn log_summary(report: &BatchReport) {
    let elapsed = Duration::from_millis(report.elapsed.as_millis() as u64);
    info!(
        "Processed {} file(s) in {}: {} cleaned, {} verified, {} failed",
        report.records.len(),
        humantime::format_duration(elapsed),
        report.count(TransferState::Cleaned),
        report.count(TransferState::Verified),
        report.count(TransferState::Failed),
    );
    for record in report.records.iter().filter(|r| r.is_failed()) {
        error!(
            "{}: {}",
            record.resource.name,
            record.failure().unwrap_or("unknown error")
        );
        if record.staged_path().map(Path::exists).unwrap_or(false) {
            warn!(
                "Staged copy of {} kept at {:?} for inspection",
                record.resource.name, record.resource.staged_path
            );
        }
    }
    if report.aborted {
        warn!("Batch stopped early; remaining files were not processed");
    }
}

/// Persists `report` as pretty-printed JSON.
pub fn write_report(report: &BatchReport, path: &Path) -> Result<(), TransferError> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)?;
    info!("Persisted transfer report to {:?}", path);
    Ok(())
}
