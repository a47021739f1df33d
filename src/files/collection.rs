use futures::stream::{self, StreamExt};
use std::fmt;
use std::sync::Arc;

use super::user_file::UserFile;
use crate::api::{BatchAppsApi, FileQuery};
use crate::error::{BatchAppsError, Result};
use crate::models::{QuerySpecifier, SubmitSpecifier};

/// Upper bound on concurrent uploads
pub const MAX_UPLOAD_THREADS: usize = 10;

/// Number of files checked per query call
pub const DEFAULT_QUERY_BATCH: usize = 50;

/// Ordered set of unique user files
#[derive(Clone)]
pub struct FileCollection {
    api: Arc<BatchAppsApi>,
    files: Vec<UserFile>,
}

impl FileCollection {
    pub fn new(api: Arc<BatchAppsApi>) -> Self {
        Self {
            api,
            files: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, UserFile> {
        self.files.iter()
    }

    pub fn contains(&self, file: &UserFile) -> bool {
        self.files.contains(file)
    }

    /// Add a single file, which must not already be in the collection
    pub fn add(&mut self, file: UserFile) -> Result<()> {
        if self.files.contains(&file) {
            return Err(BatchAppsError::FileInvalid(format!(
                "Only unique UserFile objects can be added to collection, {} is already present",
                file
            )));
        }
        tracing::debug!("Adding UserFile object to collection: {}", file);
        self.files.push(file);
        Ok(())
    }

    /// Add many files, dropping duplicates
    pub fn add_all<I>(&mut self, files: I)
    where
        I: IntoIterator<Item = UserFile>,
    {
        tracing::debug!("Adding list object to collection");
        let mut dropped = false;
        for file in files {
            if self.files.contains(&file) {
                dropped = true;
            } else {
                self.files.push(file);
            }
        }
        if dropped {
            tracing::warn!("Some invalid or duplicated userfiles removed from list");
        }
    }

    /// Append the files of another collection
    pub fn extend(&mut self, other: &FileCollection) {
        tracing::debug!("Extending file collection with: {}", other);
        for file in &other.files {
            if !self.files.contains(file) {
                self.files.push(file.clone());
            }
        }
    }

    pub fn get(&self, index: usize) -> Option<&UserFile> {
        self.files.get(index)
    }

    /// All files with the given name
    pub fn get_by_name(&self, name: &str) -> Result<Vec<&UserFile>> {
        let matches: Vec<_> = self.files.iter().filter(|f| f.name() == name).collect();
        if matches.is_empty() {
            return Err(BatchAppsError::FileMissing(
                "Requested file is not in the collection".to_string(),
            ));
        }
        Ok(matches)
    }

    /// Remove a file, returning whether it was present
    pub fn remove(&mut self, file: &UserFile) -> bool {
        match self.files.iter().position(|f| f == file) {
            Some(index) => {
                tracing::debug!("Removing userfile object {}", file);
                self.files.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn remove_index(&mut self, index: usize) -> Option<UserFile> {
        if index >= self.files.len() {
            return None;
        }
        let removed = self.files.remove(index);
        tracing::debug!("Removing userfile {} from index: {}", removed, index);
        Some(removed)
    }

    /// Remove the first file with the given name
    pub fn remove_name(&mut self, name: &str) -> Option<UserFile> {
        tracing::debug!("Removing first userfile with name: {}", name);
        let index = self.files.iter().position(|f| f.name() == name)?;
        Some(self.files.remove(index))
    }

    /// Remove every file with the given name, returning how many were removed
    pub fn delete_name(&mut self, name: &str) -> usize {
        let before = self.files.len();
        self.files.retain(|f| f.name() != name);
        before - self.files.len()
    }

    /// Query specifications of every file
    pub fn query_message(&self) -> Result<Vec<QuerySpecifier>> {
        self.files.iter().map(UserFile::create_query_specifier).collect()
    }

    /// Submission specifications of every file
    pub fn submit_message(&self) -> Result<Vec<SubmitSpecifier>> {
        self.files.iter().map(UserFile::create_submit_specifier).collect()
    }

    /// Upload the files of the collection
    ///
    /// Unless `force` is set, files already in the cloud are skipped. With
    /// `threads` set, up to that many files (at most 10) are uploaded at once.
    /// Returns the files that failed to upload along with the reason.
    pub async fn upload(&self, force: bool, threads: Option<usize>) -> Result<Vec<(UserFile, String)>> {
        let file_set = if force {
            tracing::debug!("Uploading files regardless of whether they've been uploaded before");
            self.clone()
        } else {
            tracing::info!("Checking to see if files in collection exist in the cloud");
            self.is_uploaded(DEFAULT_QUERY_BATCH).await?
        };

        let concurrency = upload_concurrency(threads);
        tracing::debug!(
            "Uploading {} files with {} parallel uploads",
            file_set.len(),
            concurrency
        );

        let api = &self.api;
        let failed = stream::iter(file_set.files)
            .map(|file| async move {
                tracing::debug!("About to upload file: {}", file);
                match file.upload(api, true).await {
                    Ok(_) => None,
                    Err(e) => {
                        tracing::error!("Failed to upload {}: {}", file, e);
                        let reason = e.to_string();
                        Some((file, reason))
                    }
                }
            })
            .buffer_unordered(concurrency)
            .filter_map(|result| async move { result })
            .collect::<Vec<_>>()
            .await;

        Ok(failed)
    }

    /// Files of the collection that still need to be uploaded
    pub async fn is_uploaded(&self, per_call: usize) -> Result<FileCollection> {
        let mut file_set = self.clone();
        let specs = self.query_message()?;
        tracing::debug!("File collection specification: {:?}", specs);

        for chunk in specs.chunks(per_call.max(1)) {
            tracing::info!("Checking {} files for prior uploads", chunk.len());
            let found = self
                .api
                .query_files(&FileQuery::Specifications(chunk.to_vec()))
                .await?;
            tracing::info!(
                "{} of {} files have already been uploaded",
                found.len(),
                chunk.len()
            );

            for remote in found.iter().map(UserFile::remote) {
                file_set
                    .files
                    .retain(|f| !(f.name() == remote.name() && f.compare_lastmodified(&remote)));
            }
        }

        tracing::debug!("Files that still need to be uploaded: {}", file_set);
        Ok(file_set)
    }
}

impl fmt::Display for FileCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.files.iter().map(UserFile::name).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

impl fmt::Debug for FileCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.files.iter()).finish()
    }
}

impl<'a> IntoIterator for &'a FileCollection {
    type Item = &'a UserFile;
    type IntoIter = std::slice::Iter<'a, UserFile>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}

/// Parallel uploads for a requested thread count
fn upload_concurrency(threads: Option<usize>) -> usize {
    threads
        .filter(|t| *t >= 1)
        .map(|t| t.min(MAX_UPLOAD_THREADS))
        .unwrap_or(1)
}
