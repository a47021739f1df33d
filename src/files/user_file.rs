use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use crate::api::{BatchAppsApi, FileQuery};
use crate::error::{BatchAppsError, Result};
use crate::models::{CloudFile, QuerySpecifier, SubmitSpecifier};

/// Result of a single file upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded,
    Skipped,
}

/// A user file, either on the local disk or referenced from the cloud
#[derive(Debug, Clone)]
pub struct UserFile {
    name: String,
    path: String,
    url: Option<String>,
    exists: bool,
    last_modified: String,
    checksum: String,
}

impl UserFile {
    /// File at a local path
    ///
    /// A path that is not a file is accepted but flagged as missing.
    pub fn local(path: impl AsRef<Path>) -> Self {
        let path = normalise(path.as_ref());
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let exists = path.is_file();
        if !exists {
            tracing::warn!("Unable to verify existence of new file: {}", path.display());
        }

        let mut file = Self {
            name,
            path: path.to_string_lossy().to_string(),
            url: None,
            exists,
            last_modified: String::new(),
            checksum: String::new(),
        };
        file.last_modified = file.read_last_modified();
        file.checksum = file.read_checksum();
        file
    }

    /// File known to the cloud
    pub fn remote(cloud_file: &CloudFile) -> Self {
        Self {
            name: cloud_file.name.clone(),
            path: cloud_file.original_file_path.clone().unwrap_or_default(),
            url: cloud_file.link.href.clone(),
            exists: false,
            last_modified: cloud_file.last_modified_time.clone().unwrap_or_default(),
            checksum: String::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        Path::new(&self.path)
    }

    /// Cloud url, for files created from a cloud reference
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Whether the file was found on the local disk
    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn last_modified(&self) -> &str {
        &self.last_modified
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// Size of the local file, 0 when it does not exist
    pub fn len(&self) -> u64 {
        if !self.exists {
            return 0;
        }
        std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn windows_path(&self) -> String {
        self.path.replace('/', "\\")
    }

    fn read_last_modified(&self) -> String {
        if !self.exists {
            tracing::debug!("Can't get last modified time for unverified file");
            return String::new();
        }

        match std::fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(modified) => DateTime::<Utc>::from(modified)
                .format("%Y-%m-%dT%H:%M:%SZ")
                .to_string(),
            Err(e) => {
                tracing::debug!("Can't get last modified time: {}", e);
                String::new()
            }
        }
    }

    fn read_checksum(&self) -> String {
        if !self.exists {
            tracing::debug!("Can't get checksum for unverified file");
            return String::new();
        }

        let digest = || -> std::io::Result<String> {
            let mut file = std::fs::File::open(&self.path)?;
            let mut hasher = Sha256::new();
            let mut block = [0u8; 8192];
            loop {
                let read = file.read(&mut block)?;
                if read == 0 {
                    break;
                }
                hasher.update(&block[..read]);
            }
            Ok(hasher
                .finalize()
                .iter()
                .map(|b| format!("{:02x}", b))
                .collect())
        };

        digest().unwrap_or_else(|e| {
            tracing::debug!("Can't get checksum: {}", e);
            String::new()
        })
    }

    /// Compare the current local timestamp with another file's
    pub fn compare_lastmodified(&self, other: &UserFile) -> bool {
        let current = self.read_last_modified();
        !current.is_empty() && current == other.last_modified
    }

    fn require_exists(&self) -> Result<()> {
        if self.exists {
            return Ok(());
        }
        Err(BatchAppsError::FileMissing(format!(
            "File is not found to exist at path: {}",
            self.path
        )))
    }

    /// Specification used to look the file up in the cloud
    pub fn create_query_specifier(&self) -> Result<QuerySpecifier> {
        self.require_exists()?;
        let spec = QuerySpecifier {
            file_name: self.name.clone(),
            timestamp: self.last_modified.clone(),
            original_path: Some(self.windows_path()),
        };
        tracing::debug!("File specification: {:?}", spec);
        Ok(spec)
    }

    /// Specification used to reference the file in a job submission
    pub fn create_submit_specifier(&self) -> Result<SubmitSpecifier> {
        self.require_exists()?;
        let spec = SubmitSpecifier {
            name: self.name.clone(),
            timestamp: self.last_modified.clone(),
        };
        tracing::debug!("File specification: {:?}", spec);
        Ok(spec)
    }

    /// Upload the file unless an identical copy is already in the cloud
    pub async fn upload(&self, api: &BatchAppsApi, force: bool) -> Result<UploadOutcome> {
        if !force {
            tracing::info!("Checking if file {} has been previously uploaded", self.name);
            let uploaded = self.is_uploaded(api).await?;
            tracing::info!("Uploaded: {}", uploaded.is_some());
            if uploaded.is_some() {
                return Ok(UploadOutcome::Skipped);
            }
        }

        tracing::info!("Uploading file {}", self.name);
        api.send_file(self).await?;
        Ok(UploadOutcome::Uploaded)
    }

    /// Cloud copy with the same name and timestamp, if any
    pub async fn is_uploaded(&self, api: &BatchAppsApi) -> Result<Option<UserFile>> {
        let spec = self.create_query_specifier()?;
        let matches = api
            .query_files(&FileQuery::Specifications(vec![spec]))
            .await?;

        Ok(matches
            .iter()
            .map(UserFile::remote)
            .find(|remote| remote.name == self.name && self.compare_lastmodified(remote)))
    }

    /// Download the uploaded counterpart of this file into `download_dir`
    ///
    /// Returns `None` when the file has never been uploaded.
    pub async fn download(&self, api: &BatchAppsApi, download_dir: &Path) -> Result<Option<PathBuf>> {
        let uploaded = match self.is_uploaded(api).await {
            Ok(Some(uploaded)) => uploaded,
            Ok(None) => {
                tracing::debug!("File has not been previously uploaded. Cannot download file.");
                return Ok(None);
            }
            Err(BatchAppsError::FileMissing(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let size = api.props_file(&uploaded).await?;
        let path = api.get_file(&uploaded, size, download_dir, false).await?;
        tracing::info!("Successfully downloaded file to {}", download_dir.display());
        Ok(Some(path))
    }
}

/// Lexically normalise a path, resolving `.` and `..` components
fn normalise(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

impl fmt::Display for UserFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl PartialEq for UserFile {
    fn eq(&self, other: &Self) -> bool {
        if self.exists && other.exists {
            return self.checksum == other.checksum && self.name == other.name;
        }
        self.path == other.path
    }
}

impl Eq for UserFile {}

// Equal files always share a name, whichever branch of `eq` matched
impl Hash for UserFile {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// Files order by name. Unequal files sharing a name are unordered.
impl PartialOrd for UserFile {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            return Some(Ordering::Equal);
        }
        match self.name.cmp(&other.name) {
            Ordering::Equal => None,
            ordering => Some(ordering),
        }
    }
}
