use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info};

use super::{UpdateEvent, UpdateSource};
use crate::error::UpdateError;
use crate::types::DownloadProgress;

const MANIFEST_TIMEOUT: Duration = Duration::from_secs(10);

/// `GET <manifest url>` response.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateManifest {
    pub version: String,
    pub url: String,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Update source backed by a static JSON manifest and a downloadable installer.
pub struct HttpUpdateSource {
    manifest_url: String,
    current_version: String,
    download_dir: PathBuf,
    http: reqwest::Client,
    downloaded: Mutex<Option<PathBuf>>,
}

impl HttpUpdateSource {
    pub fn new(
        manifest_url: impl Into<String>,
        current_version: impl Into<String>,
        download_dir: impl Into<PathBuf>,
    ) -> Result<Self, UpdateError> {
        let manifest_url = manifest_url.into();
        if !(manifest_url.starts_with("http://") || manifest_url.starts_with("https://")) {
            return Err(UpdateError::Manifest(format!(
                "manifest url must be http(s), got {:?}",
                manifest_url
            )));
        }
        let current_version = current_version.into();
        let http = reqwest::Client::builder()
            .user_agent(format!("third-eye-shell/{}", current_version))
            .build()?;
        Ok(Self {
            manifest_url,
            current_version,
            download_dir: download_dir.into(),
            http,
            downloaded: Mutex::new(None),
        })
    }

    pub fn downloaded_path(&self) -> Option<PathBuf> {
        self.downloaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn fetch_manifest(&self) -> Result<UpdateManifest, UpdateError> {
        let response = self
            .http
            .get(&self.manifest_url)
            .timeout(MANIFEST_TIMEOUT)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(UpdateError::Status(response.status().as_u16()));
        }
        let manifest: UpdateManifest = response.json().await?;
        if manifest.version.trim().is_empty() || manifest.url.trim().is_empty() {
            return Err(UpdateError::Manifest("version and url are required".into()));
        }
        Ok(manifest)
    }

    async fn check_and_download(
        &self,
        events: &mpsc::UnboundedSender<UpdateEvent>,
    ) -> Result<Option<String>, UpdateError> {
        let manifest = self.fetch_manifest().await?;
        if !is_newer(&self.current_version, &manifest.version) {
            info!(
                current = %self.current_version,
                latest = %manifest.version,
                "no newer version published"
            );
            return Ok(None);
        }

        info!(
            current = %self.current_version,
            latest = %manifest.version,
            "new version available"
        );
        if let Some(notes) = &manifest.notes {
            debug!("release notes: {}", notes);
        }
        let _ = events.send(UpdateEvent::Available {
            version: manifest.version.clone(),
        });

        let path = self.download(&manifest, events).await?;
        *self
            .downloaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(path);
        Ok(Some(manifest.version))
    }

    async fn download(
        &self,
        manifest: &UpdateManifest,
        events: &mpsc::UnboundedSender<UpdateEvent>,
    ) -> Result<PathBuf, UpdateError> {
        let mut response = self.http.get(&manifest.url).send().await?;
        if !response.status().is_success() {
            return Err(UpdateError::Status(response.status().as_u16()));
        }
        let total = response.content_length().unwrap_or(0);

        tokio::fs::create_dir_all(&self.download_dir).await?;
        let path = self.download_dir.join(artifact_name(&manifest.url));
        let mut file = tokio::fs::File::create(&path).await?;
        let mut hasher = Sha256::new();
        let started = Instant::now();
        let mut transferred: u64 = 0;

        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            hasher.update(&chunk);
            transferred += chunk.len() as u64;

            let secs = started.elapsed().as_secs_f64();
            let _ = events.send(UpdateEvent::Downloading(DownloadProgress {
                percent: if total > 0 {
                    (transferred as f64 / total as f64 * 100.0).min(100.0)
                } else {
                    0.0
                },
                transferred,
                total,
                speed: if secs > 0.0 {
                    transferred as f64 / secs
                } else {
                    0.0
                },
            }));
        }
        file.flush().await?;
        drop(file);

        if let Some(expected) = &manifest.sha256 {
            let actual = format!("{:x}", hasher.finalize());
            if !actual.eq_ignore_ascii_case(expected.trim()) {
                let _ = tokio::fs::remove_file(&path).await;
                return Err(UpdateError::Checksum {
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        mark_executable(&path)?;
        info!(path = %path.display(), bytes = transferred, "update downloaded");
        Ok(path)
    }
}

#[async_trait]
impl UpdateSource for HttpUpdateSource {
    async fn check(&self, events: mpsc::UnboundedSender<UpdateEvent>) {
        let _ = events.send(UpdateEvent::Checking);
        let terminal = match self.check_and_download(&events).await {
            Ok(Some(version)) => UpdateEvent::Downloaded { version },
            Ok(None) => UpdateEvent::NotAvailable,
            Err(e) => {
                error!(url = %self.manifest_url, "update check failed: {:?}", e);
                UpdateEvent::Error(e.to_string())
            }
        };
        let _ = events.send(terminal);
    }

    fn install(&self) -> Result<(), UpdateError> {
        let path = self.downloaded_path().ok_or(UpdateError::Unavailable)?;
        info!(path = %path.display(), "launching update installer");
        Command::new(&path).spawn()?;
        Ok(())
    }
}

/// File name for the downloaded artifact, taken from the url's last path segment.
fn artifact_name(url: &str) -> String {
    url.split(|c: char| c == '?' || c == '#')
        .next()
        .and_then(|u| u.rsplit('/').next())
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .unwrap_or("third-eye-update")
        .to_string()
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// `true` when `latest` sorts after `current`.
pub fn is_newer(current: &str, latest: &str) -> bool {
    compare_versions(current, latest) == Ordering::Less
}

/// Numeric major.minor.patch comparison; a pre-release sorts before its release.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let (a_nums, a_pre) = parse_version(a);
    let (b_nums, b_pre) = parse_version(b);
    a_nums.cmp(&b_nums).then_with(|| match (a_pre, b_pre) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => x.cmp(y),
    })
}

fn parse_version(version: &str) -> ([u64; 3], Option<&str>) {
    let version = version.trim();
    let version = version.strip_prefix('v').unwrap_or(version);
    let (core, pre) = match version.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (version, None),
    };
    let core = core.split('+').next().unwrap_or(core);
    let mut nums = [0u64; 3];
    for (slot, part) in nums.iter_mut().zip(core.split('.')) {
        *slot = part.parse().unwrap_or(0);
    }
    (nums, pre)
}
