//! Download engine: wires the extractor registry, the downloaders and the
//! task state machine into one submit, prepare, download pipeline.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info, instrument, warn};
use vidfetch_extractor::extractor::default_registry_with_client;
use vidfetch_extractor::media::{select_best, select_by_id};
use vidfetch_extractor::{ExtractorRegistry, Format, MediaInfo};

use crate::client::create_client;
use crate::config::DownloaderConfig;
use crate::downloader::{Downloader, HlsDownloader, HttpDownloader};
use crate::error::{DownloadError, Result};
use crate::output::output_path;
use crate::progress::ProgressListener;
use crate::task::{DownloadTask, TaskSnapshot, TaskState, normalize_url};

pub struct DownloadEngine {
    config: DownloaderConfig,
    registry: ExtractorRegistry,
    downloaders: Vec<Arc<dyn Downloader>>,
    /// Normalized urls of live submissions
    submitted: Mutex<HashSet<String>>,
}

impl DownloadEngine {
    pub fn new(
        config: DownloaderConfig,
        registry: ExtractorRegistry,
        downloaders: Vec<Arc<dyn Downloader>>,
    ) -> Self {
        Self {
            config,
            registry,
            downloaders,
            submitted: Mutex::new(HashSet::new()),
        }
    }

    /// Engine with the bundled extractors and downloaders sharing one client.
    pub fn from_config(config: DownloaderConfig) -> Result<Self> {
        let client = create_client(&config)?;
        let registry = default_registry_with_client(client.clone());
        let downloaders: Vec<Arc<dyn Downloader>> = vec![
            Arc::new(HlsDownloader::new(client.clone(), config.clone())),
            Arc::new(HttpDownloader::new(client, config.clone())),
        ];
        Ok(Self::new(config, registry, downloaders))
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    pub fn registry(&self) -> &ExtractorRegistry {
        &self.registry
    }

    /// First registered downloader accepting `format`.
    pub fn find_downloader(&self, format: &Format) -> Option<&Arc<dyn Downloader>> {
        self.downloaders.iter().find(|d| d.suitable(format))
    }

    /// Create a pending task, rejecting a url that is already submitted.
    pub fn submit(&self, url: &str) -> Result<DownloadTask> {
        let key = normalize_url(url);
        if key.is_empty() {
            return Err(DownloadError::invalid_url(url, "empty url"));
        }
        if !self.submitted.lock().insert(key) {
            return Err(DownloadError::DuplicateTask {
                url: url.trim().to_string(),
            });
        }

        let mut task = DownloadTask::new(url);
        task.set_state(TaskState::Pending)?;
        info!(url = task.url(), id = %task.id(), "Task submitted");
        Ok(task)
    }

    /// Forget a submission so the url can be submitted again.
    pub fn release(&self, url: &str) -> bool {
        self.submitted.lock().remove(&normalize_url(url))
    }

    pub fn is_submitted(&self, url: &str) -> bool {
        self.submitted.lock().contains(&normalize_url(url))
    }

    /// Run extraction without creating a task.
    pub async fn extract(&self, url: &str) -> Result<MediaInfo> {
        Ok(self.registry.extract(url.trim()).await?)
    }

    /// Extract, select and bind a format, then render the output path.
    ///
    /// A task that already has a format keeps it; extraction then only
    /// refreshes its url and metadata.
    #[instrument(skip(self, task), fields(url = task.url()))]
    pub async fn prepare(&self, task: &mut DownloadTask) -> Result<()> {
        task.set_state(TaskState::Prepare)?;
        match self.resolve(task).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Preparation failed");
                task.fail(&e)?;
                Err(e)
            }
        }
    }

    async fn resolve(&self, task: &mut DownloadTask) -> Result<()> {
        let info = self.registry.extract(task.url()).await?;
        let selected = match task.format() {
            Some(bound) => select_by_id(&info.formats, bound.format_id()),
            None => select_best(&info.formats),
        };
        let format = selected.cloned().ok_or_else(|| DownloadError::NoFormats {
            url: task.url().to_string(),
        })?;

        let path = output_path(
            &self.config.output_template,
            &self.config.output_dir,
            &info,
            &format,
        );
        info!(
            format_id = format.format_id(),
            protocol = %format.protocol(),
            quality = format.quality(),
            path = %path.display(),
            "Format selected"
        );

        task.bind_format(format)?;
        task.set_media_info(info);
        task.set_output_path(path);
        Ok(())
    }

    /// Transfer a prepared, paused or failed task.
    ///
    /// Returns `Ok(true)` on success and `Ok(false)` when the task was paused
    /// or cancelled. Any other outcome moves the task to `Error`.
    #[instrument(skip(self, task, listener), fields(url = task.url()))]
    pub async fn download(
        &self,
        task: &mut DownloadTask,
        listener: Arc<dyn ProgressListener>,
    ) -> Result<bool> {
        if task.control().is_cancelled() {
            info!("Task was cancelled, not starting");
            return Ok(false);
        }

        let (info, format, path) = match (task.media_info(), task.format(), task.file_path()) {
            (Some(info), Some(format), Some(path)) => {
                (info.clone(), format.clone(), path.to_path_buf())
            }
            _ => {
                return Err(DownloadError::Internal {
                    reason: "task must be prepared before download".to_string(),
                });
            }
        };

        task.control().resume();
        task.set_listener(Arc::clone(&listener));
        task.set_state(TaskState::Downloading)?;

        match self.transfer(task, &info, &format, &path).await {
            Ok(true) => {
                task.set_state(TaskState::Success)?;
                // The downloader may have settled on a different extension.
                let path = task.file_path().map(Path::to_path_buf).unwrap_or(path);
                info!(path = %path.display(), bytes = task.counters().downloaded(), "Task completed");
                listener.on_complete(&path);
                Ok(true)
            }
            Ok(false) => {
                task.interrupt()?;
                Ok(false)
            }
            Err(e) if e.is_cancelled() => {
                task.interrupt()?;
                Ok(false)
            }
            Err(e) => {
                error!(error = %e, "Task failed");
                task.fail(&e)?;
                listener.on_error(&e.to_string());
                Err(e)
            }
        }
    }

    async fn transfer(
        &self,
        task: &mut DownloadTask,
        info: &MediaInfo,
        format: &Format,
        path: &Path,
    ) -> Result<bool> {
        let downloader =
            self.find_downloader(format)
                .ok_or_else(|| DownloadError::NoSuitableDownloader {
                    format_id: format.format_id().to_string(),
                    protocol: format.protocol().to_string(),
                })?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::filesystem(parent, e))?;
        }

        info!(downloader = downloader.name(), "Starting transfer");
        downloader.perform_download(task, info, format, path).await
    }

    /// Submit, prepare and download one url.
    ///
    /// With `ignore_errors` a failure is logged and the failed task's snapshot
    /// is returned instead of the error. `Ok(None)` means the url was skipped.
    pub async fn process(
        &self,
        url: &str,
        listener: Arc<dyn ProgressListener>,
    ) -> Result<Option<TaskSnapshot>> {
        let mut task = match self.submit(url) {
            Ok(task) => task,
            Err(e) if self.config.ignore_errors => {
                warn!(url, error = %e, "Skipping url");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let result = match self.prepare(&mut task).await {
            Ok(()) => self.download(&mut task, listener).await.map(|_| ()),
            Err(e) => Err(e),
        };
        self.release(url);

        match result {
            Ok(()) => Ok(Some(task.snapshot())),
            Err(e) if self.config.ignore_errors => {
                error!(url, error = %e, "Download failed, continuing");
                Ok(Some(task.snapshot()))
            }
            Err(e) => Err(e),
        }
    }

    /// [`Self::process`] each url in order, stopping at the first error unless
    /// `ignore_errors` is set.
    pub async fn process_all<I, S>(
        &self,
        urls: I,
        listener: Arc<dyn ProgressListener>,
    ) -> Result<Vec<TaskSnapshot>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut snapshots = Vec::new();
        for url in urls {
            if let Some(snapshot) = self.process(url.as_ref(), Arc::clone(&listener)).await? {
                snapshots.push(snapshot);
            }
        }
        Ok(snapshots)
    }

    /// Where the fragments of an HLS download to `output_path` are kept.
    pub fn fragment_dir(&self, output_path: &Path) -> PathBuf {
        crate::downloader::hls::fragment_dir(output_path, self.config.cache_dir.as_deref())
    }
}

impl std::fmt::Debug for DownloadEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadEngine")
            .field("registry", &self.registry)
            .field(
                "downloaders",
                &self.downloaders.iter().map(|d| d.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}
