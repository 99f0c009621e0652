//! Model provisioning: make sure the checkpoint directory exists locally,
//! fetching every artifact from remote storage when it does not.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Environment variable naming the remote artifact location.
pub const MODEL_PATH_ENV: &str = "MODEL_PATH";
pub const DEFAULT_MODEL_PATH: &str = "gs://swiss-knife/org_ag/vocalizer/xttsv2_mixed";
/// Checkpoint directory name under the server's model directory.
pub const CHECKPOINT_SUBDIR: &str = "xtts_artifacts";

const GCS_API_BASE: &str = "https://storage.googleapis.com";

/// Where model artifacts come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactSource {
    /// `gs://bucket/prefix`
    Gcs { bucket: String, prefix: String },
    /// A directory on the local filesystem (`file://path` or a bare path).
    Local(PathBuf),
}

impl ArtifactSource {
    pub fn parse(location: &str) -> anyhow::Result<Self> {
        let location = location.trim();
        if location.is_empty() {
            anyhow::bail!("Artifact location is empty");
        }

        if let Some(rest) = location.strip_prefix("gs://") {
            let rest = rest.trim_matches('/');
            let (bucket, prefix) = match rest.split_once('/') {
                Some((bucket, prefix)) => (bucket, prefix.trim_end_matches('/')),
                None => (rest, ""),
            };
            if bucket.is_empty() {
                anyhow::bail!("Invalid gs:// path: {location}");
            }
            return Ok(Self::Gcs {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
            });
        }

        if let Some(path) = location.strip_prefix("file://") {
            return Ok(Self::Local(PathBuf::from(path)));
        }

        if location.contains("://") {
            anyhow::bail!("Unsupported artifact location: {location}");
        }

        Ok(Self::Local(PathBuf::from(location)))
    }

    pub fn fetcher(&self) -> Arc<dyn ArtifactFetcher> {
        match self {
            Self::Gcs { bucket, prefix } => Arc::new(GcsFetcher::new(bucket, prefix)),
            Self::Local(root) => Arc::new(LocalFetcher::new(root)),
        }
    }
}

impl fmt::Display for ArtifactSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gcs { bucket, prefix } if prefix.is_empty() => write!(f, "gs://{bucket}"),
            Self::Gcs { bucket, prefix } => write!(f, "gs://{bucket}/{prefix}"),
            Self::Local(root) => write!(f, "{}", root.display()),
        }
    }
}

/// Copies every file of a remote folder into a local directory.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Populate `dest` and return how many files were written.
    async fn fetch_all(&self, dest: &Path) -> anyhow::Result<usize>;
}

/// Return `<model_dir>/xtts_artifacts`, fetching its contents first if the
/// directory does not exist yet. An existing directory is trusted as is.
pub async fn ensure_checkpoint_dir(
    model_dir: &Path,
    fetcher: &dyn ArtifactFetcher,
) -> anyhow::Result<PathBuf> {
    let checkpoint_dir = model_dir.join(CHECKPOINT_SUBDIR);
    if checkpoint_dir.exists() {
        debug!("Checkpoint directory {} already present", checkpoint_dir.display());
        return Ok(checkpoint_dir);
    }

    tokio::fs::create_dir_all(&checkpoint_dir)
        .await
        .with_context(|| format!("Failed to create {}", checkpoint_dir.display()))?;

    info!("Fetching model artifacts into {}", checkpoint_dir.display());
    match fetcher.fetch_all(&checkpoint_dir).await {
        Ok(count) => {
            info!("Fetched {} artifact file(s)", count);
            Ok(checkpoint_dir)
        }
        Err(e) => {
            // An empty directory would be mistaken for a complete checkpoint next time.
            if let Err(cleanup) = tokio::fs::remove_dir_all(&checkpoint_dir).await {
                warn!("Could not remove {}: {cleanup}", checkpoint_dir.display());
            }
            Err(e.context("Failed to fetch model artifacts"))
        }
    }
}

#[derive(Deserialize)]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectMeta>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct ObjectMeta {
    name: String,
}

/// Google Cloud Storage folder fetcher using the JSON API.
///
/// `STORAGE_EMULATOR_HOST` redirects requests to an emulator and
/// `GCS_ACCESS_TOKEN`, when set, is sent as a bearer token.
#[derive(Debug, Clone)]
pub struct GcsFetcher {
    client: reqwest::Client,
    api_base: String,
    bucket: String,
    prefix: String,
    access_token: Option<String>,
}

impl GcsFetcher {
    pub fn new(bucket: &str, prefix: &str) -> Self {
        let api_base = std::env::var("STORAGE_EMULATOR_HOST")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| GCS_API_BASE.to_string());
        let access_token = std::env::var("GCS_ACCESS_TOKEN")
            .ok()
            .filter(|v| !v.trim().is_empty());

        Self {
            client: reqwest::Client::new(),
            api_base,
            bucket: bucket.to_string(),
            prefix: prefix.trim_matches('/').to_string(),
            access_token,
        }
    }

    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.to_string();
        self
    }

    fn objects_url(&self, object: Option<&str>) -> anyhow::Result<Url> {
        let mut url = Url::parse(&self.api_base)
            .with_context(|| format!("Invalid storage API base: {}", self.api_base))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow::anyhow!("Storage API base cannot hold a path: {}", self.api_base))?;
            segments
                .pop_if_empty()
                .extend(["storage", "v1", "b", self.bucket.as_str(), "o"]);
            if let Some(object) = object {
                // pushed as one segment, so '/' in the object name is escaped
                segments.push(object);
            }
        }
        Ok(url)
    }

    fn request(&self, url: Url) -> reqwest::RequestBuilder {
        let builder = self.client.get(url);
        match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn list_objects(&self) -> anyhow::Result<Vec<String>> {
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.objects_url(None)?;
            if !self.prefix.is_empty() {
                url.query_pairs_mut()
                    .append_pair("prefix", &format!("{}/", self.prefix));
            }
            if let Some(token) = &page_token {
                url.query_pairs_mut().append_pair("pageToken", token);
            }

            let page: ObjectList = self
                .request(url)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await
                .context("Malformed object listing")?;

            names.extend(page.items.into_iter().map(|item| item.name));
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(names)
    }

    /// Path of `object` relative to the fetched folder, or `None` for
    /// folder placeholders and names that would escape the destination.
    fn relative_path(&self, object: &str) -> Option<PathBuf> {
        let relative = if self.prefix.is_empty() {
            object
        } else {
            object.strip_prefix(&self.prefix)?.strip_prefix('/')?
        };
        if relative.is_empty() || relative.ends_with('/') {
            return None;
        }

        let path = PathBuf::from(relative);
        if path.components().all(|c| matches!(c, Component::Normal(_))) {
            Some(path)
        } else {
            None
        }
    }

    async fn download(&self, object: &str, dest: &Path) -> anyhow::Result<()> {
        let mut url = self.objects_url(Some(object))?;
        url.query_pairs_mut().append_pair("alt", "media");

        let mut response = self.request(url).send().await?.error_for_status()?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write to a temporary file first, then rename
        let mut temp_path = dest.as_os_str().to_owned();
        temp_path.push(".part");
        let temp_path = PathBuf::from(temp_path);

        let mut file = tokio::fs::File::create(&temp_path).await?;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&temp_path, dest).await?;
        Ok(())
    }
}

#[async_trait]
impl ArtifactFetcher for GcsFetcher {
    async fn fetch_all(&self, dest: &Path) -> anyhow::Result<usize> {
        let objects = self
            .list_objects()
            .await
            .with_context(|| format!("Failed to list gs://{}/{}", self.bucket, self.prefix))?;

        let mut count = 0usize;
        for object in objects {
            let Some(relative) = self.relative_path(&object) else {
                continue;
            };
            let target = dest.join(&relative);
            info!("Downloading gs://{}/{} -> {}", self.bucket, object, target.display());
            self.download(&object, &target)
                .await
                .with_context(|| format!("Failed to download gs://{}/{}", self.bucket, object))?;
            count += 1;
        }

        if count == 0 {
            anyhow::bail!("No artifacts found under gs://{}/{}", self.bucket, self.prefix);
        }
        Ok(count)
    }
}

/// Copies a local directory tree.
#[derive(Debug, Clone)]
pub struct LocalFetcher {
    root: PathBuf,
}

impl LocalFetcher {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ArtifactFetcher for LocalFetcher {
    async fn fetch_all(&self, dest: &Path) -> anyhow::Result<usize> {
        if !self.root.is_dir() {
            anyhow::bail!("No such directory: {}", self.root.display());
        }

        let root = self.root.clone();
        let dest = dest.to_path_buf();
        let count = tokio::task::spawn_blocking(move || copy_tree(&root, &dest))
            .await?
            .with_context(|| format!("Failed to copy artifacts from {}", self.root.display()))?;

        if count == 0 {
            anyhow::bail!("No artifacts found under {}", self.root.display());
        }
        Ok(count)
    }
}

fn copy_tree(src: &Path, dest: &Path) -> std::io::Result<usize> {
    let mut copied = 0usize;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            std::fs::create_dir_all(&target)?;
            copied += copy_tree(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}
