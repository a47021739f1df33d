use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::collection::FileCollection;
use super::user_file::UserFile;
use crate::api::{BatchAppsApi, FileQuery};
use crate::error::{BatchAppsError, Result};
use crate::models::QuerySpecifier;

/// Entry point for working with user files
pub struct FileManager {
    api: Arc<BatchAppsApi>,
}

impl FileManager {
    pub fn new(api: Arc<BatchAppsApi>) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &Arc<BatchAppsApi> {
        &self.api
    }

    pub fn create_file(&self, path: impl AsRef<Path>) -> UserFile {
        tracing::info!("Creating new userfile at path: {}", path.as_ref().display());
        UserFile::local(path)
    }

    /// Collection of the given files with duplicates removed
    pub fn create_file_set<I>(&self, files: I) -> FileCollection
    where
        I: IntoIterator<Item = UserFile>,
    {
        let mut collection = FileCollection::new(Arc::clone(&self.api));
        collection.add_all(files);
        tracing::info!(
            "Creating new FileCollection with included userfiles: {}",
            collection.len()
        );
        collection
    }

    /// Collection of the files in a directory whose names match `pattern`
    ///
    /// `pattern` is a shell-style glob supporting `*`, `?` and `[...]`
    /// classes. Hidden files are skipped unless the pattern starts with `.`.
    pub fn files_from_dir(
        &self,
        top_dir: impl AsRef<Path>,
        recursive: bool,
        pattern: &str,
    ) -> Result<FileCollection> {
        let top_dir = top_dir.as_ref();
        if !top_dir.is_dir() {
            return Err(BatchAppsError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Supplied directory invalid: {}", top_dir.display()),
            )));
        }
        tracing::info!(
            "Creating FileCollection from contents of directory: {}",
            top_dir.display()
        );

        let matcher = FilePattern::new(pattern)?;
        let mut found = Vec::new();
        collect_files(top_dir, recursive, &matcher, &mut found)?;

        tracing::debug!(
            "Collected files: {:?}",
            found
                .iter()
                .filter_map(|p| p.file_name())
                .collect::<Vec<_>>()
        );
        Ok(self.create_file_set(found.into_iter().map(UserFile::local)))
    }

    /// All files uploaded by the user
    pub async fn list_files(&self) -> Result<Vec<UserFile>> {
        let files = self.api.list_files().await?;
        Ok(files.iter().map(UserFile::remote).collect())
    }

    /// Cloud files matching a name and timestamp, and optionally a path
    pub async fn find_file(
        &self,
        name: &str,
        last_modified: &str,
        full_path: Option<&str>,
    ) -> Result<Vec<UserFile>> {
        let spec = QuerySpecifier {
            file_name: name.to_string(),
            timestamp: last_modified.to_string(),
            original_path: full_path.map(str::to_string),
        };
        let matches = self
            .api
            .query_files(&FileQuery::Specifications(vec![spec]))
            .await?;
        Ok(matches.iter().map(UserFile::remote).collect())
    }

    /// Cloud files with any of the given names
    pub async fn find_files(&self, names: &[String]) -> Result<Vec<UserFile>> {
        let matches = self
            .api
            .query_files(&FileQuery::Names(names.to_vec()))
            .await?;
        Ok(matches.iter().map(UserFile::remote).collect())
    }
}

/// Shell-style file name pattern
///
/// Supports `*`, `?`, `[seq]` and `[!seq]`. Like a shell glob, names
/// starting with `.` only match when the pattern does too.
struct FilePattern {
    regex: Regex,
    match_hidden: bool,
}

impl FilePattern {
    fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(&glob_to_regex(pattern)).map_err(|e| {
            BatchAppsError::Validation(format!("Invalid file pattern {}: {}", pattern, e))
        })?;
        Ok(Self {
            regex,
            match_hidden: pattern.starts_with('.'),
        })
    }

    fn is_match(&self, name: &str) -> bool {
        (self.match_hidden || !name.starts_with('.')) && self.regex.is_match(name)
    }
}

/// Translate a shell glob into an anchored regex
fn glob_to_regex(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::from("^");
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => match class_end(&chars, i + 1) {
                Some(end) => {
                    let mut body = &chars[i + 1..end];
                    out.push('[');
                    if let Some(('!', rest)) = body.split_first() {
                        out.push('^');
                        body = rest;
                    }
                    for c in body {
                        // Ranges stay live, everything else is literal
                        if matches!(c, '\\' | '[' | ']' | '&' | '~' | '^') {
                            out.push('\\');
                        }
                        out.push(*c);
                    }
                    out.push(']');
                    i = end;
                }
                None => out.push_str(r"\["),
            },
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }

    out.push('$');
    out
}

/// Index of the `]` closing a class whose body starts at `start`
///
/// A `]` right after `[` or `[!` belongs to the class.
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start;
    if chars.get(j) == Some(&'!') {
        j += 1;
    }
    if chars.get(j) == Some(&']') {
        j += 1;
    }
    while j < chars.len() {
        if chars[j] == ']' {
            return Some(j);
        }
        j += 1;
    }
    None
}

fn collect_files(
    dir: &Path,
    recursive: bool,
    matcher: &FilePattern,
    found: &mut Vec<PathBuf>,
) -> Result<()> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    let mut subdirs = Vec::new();
    for path in entries {
        if path.is_file() {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if matcher.is_match(&name) {
                found.push(path);
            }
        } else if recursive && path.is_dir() {
            subdirs.push(path);
        }
    }

    for sub in subdirs {
        tracing::debug!("Searching in {}", sub.display());
        collect_files(&sub, recursive, matcher, found)?;
    }
    Ok(())
}
