//! Durable staging area for review comments not yet submitted.
//!
//! Staged comments outlive the in-memory conversation cache: they are
//! persisted as one JSON file per pull request, keyed by a filesystem-safe
//! lowercase string derived from the composite key, and folded into the
//! graph as synthetic pending nodes until the review is submitted. Deleting
//! the last staged comment deletes the file.

pub mod synthetic;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::CompositeKey;

const REVIEW_FILE_VERSION: &str = "1.0.0";

/// Errors surfaced by the pending review store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReviewStoreError {
    /// The store directory could not be opened or created.
    #[error("failed to open review store directory {directory}: {message}")]
    DirectoryUnavailable {
        /// The configured directory.
        directory: Utf8PathBuf,
        /// Error detail from the filesystem.
        message: String,
    },

    /// Reading or writing a review file failed.
    #[error("review file I/O failed: {message}")]
    Io {
        /// Error detail from the filesystem.
        message: String,
    },

    /// A review file held contents that could not be (de)serialised.
    #[error("review file is malformed: {message}")]
    Malformed {
        /// Error detail from serde.
        message: String,
    },
}

/// Filesystem-safe key addressing one pull request's staged review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewKey(String);

impl ReviewKey {
    /// Derives the key from a composite pull request key.
    #[must_use]
    pub fn from_composite(key: &CompositeKey) -> Self {
        Self(key.review_store_key())
    }

    /// Borrows the key string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// A staged review comment awaiting submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingReviewComment {
    /// Store-assigned id (creation time in milliseconds).
    pub id: String,
    /// File the comment anchors to.
    pub file_path: Utf8PathBuf,
    /// Anchor line.
    pub start_line: u32,
    /// End line for multi-line comments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
    /// Comment text.
    pub text: String,
    /// When the comment was staged.
    pub created_at: DateTime<Utc>,
}

/// A review comment about to be staged; the store assigns id and stamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReviewComment {
    /// File the comment anchors to.
    pub file_path: Utf8PathBuf,
    /// Anchor line.
    pub start_line: u32,
    /// End line for multi-line comments.
    pub end_line: Option<u32>,
    /// Comment text.
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewFile {
    version: String,
    comments: Vec<PendingReviewComment>,
}

/// File-keyed JSON store of staged review comments.
#[derive(Debug)]
pub struct PendingReviewStore {
    root: Dir,
}

impl PendingReviewStore {
    /// Opens (creating if necessary) the store rooted at `directory`.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewStoreError::DirectoryUnavailable`] when the directory
    /// cannot be created or opened.
    pub fn open(directory: &Utf8Path) -> Result<Self, ReviewStoreError> {
        Dir::create_ambient_dir_all(directory, ambient_authority()).map_err(|error| {
            ReviewStoreError::DirectoryUnavailable {
                directory: directory.to_owned(),
                message: error.to_string(),
            }
        })?;
        let root = Dir::open_ambient_dir(directory, ambient_authority()).map_err(|error| {
            ReviewStoreError::DirectoryUnavailable {
                directory: directory.to_owned(),
                message: error.to_string(),
            }
        })?;
        Ok(Self { root })
    }

    /// Stages a comment, assigning its id from the creation stamp.
    ///
    /// Multi-line comments anchor on their end line, matching how the
    /// provider renders them once submitted.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewStoreError`] when the review file cannot be read or
    /// written.
    pub fn add(
        &self,
        key: &ReviewKey,
        comment: NewReviewComment,
        created_at: DateTime<Utc>,
    ) -> Result<PendingReviewComment, ReviewStoreError> {
        let mut file = self.load(key)?;
        let staged = PendingReviewComment {
            id: created_at.timestamp_millis().to_string(),
            file_path: comment.file_path,
            start_line: comment.end_line.unwrap_or(comment.start_line),
            end_line: comment.end_line,
            text: comment.text,
            created_at,
        };
        file.comments.push(staged.clone());
        self.save(key, &file)?;
        Ok(staged)
    }

    /// Returns the staged comments, empty when none are staged.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewStoreError`] when the review file cannot be read.
    pub fn comments(&self, key: &ReviewKey) -> Result<Vec<PendingReviewComment>, ReviewStoreError> {
        Ok(self.load(key)?.comments)
    }

    /// Whether any comments are staged for the key.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewStoreError`] when the review file cannot be read.
    pub fn exists(&self, key: &ReviewKey) -> Result<bool, ReviewStoreError> {
        Ok(!self.load(key)?.comments.is_empty())
    }

    /// Rewrites the text of a staged comment; returns the updated comment,
    /// or `None` when no comment with the id is staged.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewStoreError`] when the review file cannot be read or
    /// written.
    pub fn update(
        &self,
        key: &ReviewKey,
        comment_id: &str,
        text: &str,
    ) -> Result<Option<PendingReviewComment>, ReviewStoreError> {
        let mut file = self.load(key)?;
        let Some(comment) = file
            .comments
            .iter_mut()
            .find(|comment| comment.id == comment_id)
        else {
            return Ok(None);
        };
        comment.text = text.to_owned();
        let updated = comment.clone();
        self.save(key, &file)?;
        Ok(Some(updated))
    }

    /// Deletes a staged comment; deleting the last one removes the file.
    /// Returns the comments remaining after the deletion.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewStoreError`] when the review file cannot be read or
    /// written.
    pub fn delete_comment(
        &self,
        key: &ReviewKey,
        comment_id: &str,
    ) -> Result<Vec<PendingReviewComment>, ReviewStoreError> {
        let mut file = self.load(key)?;
        file.comments.retain(|comment| comment.id != comment_id);
        if file.comments.is_empty() {
            self.delete_review(key)?;
        } else {
            self.save(key, &file)?;
        }
        Ok(file.comments)
    }

    /// Removes the whole staged review, tolerating an absent file.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewStoreError::Io`] when the file exists but cannot be
    /// removed.
    pub fn delete_review(&self, key: &ReviewKey) -> Result<(), ReviewStoreError> {
        match self.root.remove_file(Self::file_name(key)) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(ReviewStoreError::Io {
                message: error.to_string(),
            }),
        }
    }

    fn file_name(key: &ReviewKey) -> String {
        format!("pending-review-{}.json", key.as_str())
    }

    fn load(&self, key: &ReviewKey) -> Result<ReviewFile, ReviewStoreError> {
        let contents = match self.root.read_to_string(Self::file_name(key)) {
            Ok(contents) => contents,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ReviewFile {
                    version: REVIEW_FILE_VERSION.to_owned(),
                    comments: Vec::new(),
                });
            }
            Err(error) => {
                return Err(ReviewStoreError::Io {
                    message: error.to_string(),
                });
            }
        };
        serde_json::from_str(&contents).map_err(|error| ReviewStoreError::Malformed {
            message: error.to_string(),
        })
    }

    fn save(&self, key: &ReviewKey, file: &ReviewFile) -> Result<(), ReviewStoreError> {
        let serialised =
            serde_json::to_string(file).map_err(|error| ReviewStoreError::Malformed {
                message: error.to_string(),
            })?;
        self.root
            .write(Self::file_name(key), serialised.as_bytes())
            .map_err(|error| ReviewStoreError::Io {
                message: error.to_string(),
            })
    }
}
