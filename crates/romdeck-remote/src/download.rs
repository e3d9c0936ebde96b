//! ROM content download with resume support

use crate::client::ApiClient;
use crate::RemoteError;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Download progress information
#[derive(Debug, Clone)]
pub struct DownloadProgress {
    /// Total bytes to download
    pub total: u64,
    /// Bytes downloaded so far
    pub downloaded: u64,
    /// Download speed in bytes per second
    pub speed: u64,
    /// Estimated time remaining in seconds
    pub eta: u64,
    /// Current state
    pub state: DownloadState,
}

impl DownloadProgress {
    /// Get progress as percentage (0-100)
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            0
        } else {
            ((self.downloaded as f64 / self.total as f64) * 100.0) as u8
        }
    }
}

/// Download state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Pending,
    Downloading,
    Completed,
    Failed,
}

/// Downloads ROM content to local storage with resume support
pub struct RomDownloader {
    download_dir: PathBuf,
    max_retries: u32,
    progress: Arc<Mutex<Option<DownloadProgress>>>,
}

impl RomDownloader {
    pub fn new(download_dir: PathBuf, max_retries: u32) -> Self {
        Self {
            download_dir,
            max_retries,
            progress: Arc::new(Mutex::new(None)),
        }
    }

    /// Download one ROM file, resuming a previous partial transfer if the
    /// server honors range requests. Returns the final path.
    pub async fn download(
        &self,
        api: &ApiClient,
        rom_id: i64,
        file_name: &str,
        expected_size: u64,
    ) -> Result<PathBuf, RemoteError> {
        fs::create_dir_all(&self.download_dir)?;

        let output_path = self.download_dir.join(file_name);
        let partial_path = self.download_dir.join(format!("{file_name}.partial"));

        let resume_from = if partial_path.exists() {
            fs::metadata(&partial_path)?.len()
        } else {
            0
        };

        tracing::info!(
            "Downloading rom {} ({} bytes, resuming from {})",
            rom_id,
            expected_size,
            resume_from
        );

        {
            let mut progress = self.progress.lock().expect("progress mutex poisoned");
            *progress = Some(DownloadProgress {
                total: expected_size,
                downloaded: resume_from,
                speed: 0,
                eta: 0,
                state: DownloadState::Downloading,
            });
        }

        let mut last_error = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                tracing::warn!("Retry attempt {} of {}", attempt + 1, self.max_retries);
                tokio::time::sleep(std::time::Duration::from_secs(2u64.pow(attempt))).await;
            }

            match self
                .download_with_resume(api, rom_id, file_name, &partial_path, resume_from)
                .await
            {
                Ok(()) => {
                    fs::rename(&partial_path, &output_path)?;

                    {
                        let mut progress =
                            self.progress.lock().expect("progress mutex poisoned");
                        if let Some(ref mut p) = *progress {
                            p.state = DownloadState::Completed;
                            p.downloaded = expected_size;
                        }
                    }

                    return Ok(output_path);
                }
                Err(e) => {
                    last_error = Some(e);
                }
            }
        }

        {
            let mut progress = self.progress.lock().expect("progress mutex poisoned");
            if let Some(ref mut p) = *progress {
                p.state = DownloadState::Failed;
            }
        }

        Err(last_error
            .unwrap_or_else(|| RemoteError::Download("Unknown download error".to_string())))
    }

    async fn download_with_resume(
        &self,
        api: &ApiClient,
        rom_id: i64,
        file_name: &str,
        path: &Path,
        resume_from: u64,
    ) -> Result<(), RemoteError> {
        let range = (resume_from > 0).then(|| format!("bytes={resume_from}-"));
        let download = api.download_rom(rom_id, file_name, range.as_deref()).await?;

        // A server ignoring the range restarts the transfer from scratch
        let mut downloaded = if download.partial { resume_from } else { 0 };
        if !download.partial && resume_from > 0 {
            fs::remove_file(path)?;
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        let mut stream = download.response.bytes_stream();
        let mut last_update = std::time::Instant::now();
        let mut bytes_since_update = 0u64;

        use futures_util::StreamExt;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)?;

            downloaded += chunk.len() as u64;
            bytes_since_update += chunk.len() as u64;

            // Update progress every 100ms
            let now = std::time::Instant::now();
            let elapsed = now.duration_since(last_update);

            if elapsed.as_millis() >= 100 {
                let speed = (bytes_since_update as f64 / elapsed.as_secs_f64()) as u64;

                let mut progress = self.progress.lock().expect("progress mutex poisoned");
                if let Some(ref mut p) = *progress {
                    p.downloaded = downloaded;
                    p.speed = speed;

                    if speed > 0 && p.total > downloaded {
                        p.eta = (p.total - downloaded) / speed;
                    }
                }

                last_update = now;
                bytes_since_update = 0;
            }
        }

        file.sync_all()?;
        Ok(())
    }

    /// Get current progress
    pub fn progress(&self) -> Option<DownloadProgress> {
        self.progress.lock().expect("progress mutex poisoned").clone()
    }

    /// Clean up partial downloads
    pub fn cleanup(&self) -> Result<(), RemoteError> {
        if self.download_dir.exists() {
            for entry in fs::read_dir(&self.download_dir)? {
                let entry = entry?;
                let path = entry.path();

                if path.extension().is_some_and(|e| e == "partial") {
                    fs::remove_file(path)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percent() {
        let progress = DownloadProgress {
            total: 100,
            downloaded: 50,
            speed: 10,
            eta: 5,
            state: DownloadState::Downloading,
        };

        assert_eq!(progress.percent(), 50);
    }

    #[test]
    fn test_progress_percent_zero_total() {
        let progress = DownloadProgress {
            total: 0,
            downloaded: 0,
            speed: 0,
            eta: 0,
            state: DownloadState::Pending,
        };

        assert_eq!(progress.percent(), 0);
    }

    #[test]
    fn test_cleanup_removes_partials() {
        let dir = tempfile::tempdir().unwrap();
        let partial = dir.path().join("game.iso.partial");
        let complete = dir.path().join("game.iso");
        std::fs::write(&partial, b"half").unwrap();
        std::fs::write(&complete, b"full").unwrap();

        let downloader = RomDownloader::new(dir.path().to_path_buf(), 3);
        downloader.cleanup().unwrap();

        assert!(!partial.exists());
        assert!(complete.exists());
    }
}
