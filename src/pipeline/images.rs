//! Photo buckets with stable, gap-free ordinals.
//!
//! The store holds one ordered list per bucket the schema declares. Uploads
//! arrive in batches; a batch is either accepted whole or rejected whole.
//! Removing an image shifts everything after it down by one so ordinals stay
//! contiguous.

use crate::document::BucketImages;
use crate::error::ComposeError;
use crate::model::CategorizedImage;
use crate::schema::ReportSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Default maximum number of files accepted in one upload batch.
pub const DEFAULT_MAX_FILES_PER_BATCH: usize = 10;

/// Default extension allow-list.
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// One file in an upload batch: its original name plus where the hosted
/// copy lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUpload {
    pub file_name: String,
    pub reference: String,
}

impl ImageUpload {
    pub fn new(file_name: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            reference: reference.into(),
        }
    }

    /// Upload whose reference is a local path; the file name is taken from it.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            file_name,
            reference: path.to_string_lossy().into_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Bucket {
    name: String,
    title: String,
    images: Vec<CategorizedImage>,
}

/// Fixed set of named photo buckets for one report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageCategoryStore {
    buckets: Vec<Bucket>,
    max_files_per_batch: usize,
    allowed_extensions: Vec<String>,
}

impl ImageCategoryStore {
    /// Empty store with the default batch limit and extension allow-list.
    pub fn for_schema(schema: &ReportSchema) -> Self {
        Self::new(
            schema,
            DEFAULT_MAX_FILES_PER_BATCH,
            DEFAULT_ALLOWED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        )
    }

    pub fn new(
        schema: &ReportSchema,
        max_files_per_batch: usize,
        allowed_extensions: Vec<String>,
    ) -> Self {
        Self {
            buckets: schema
                .buckets
                .iter()
                .map(|b| Bucket {
                    name: b.name.clone(),
                    title: b.title.clone(),
                    images: Vec::new(),
                })
                .collect(),
            max_files_per_batch,
            allowed_extensions: allowed_extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    pub fn max_files_per_batch(&self) -> usize {
        self.max_files_per_batch
    }

    pub fn allowed_extensions(&self) -> &[String] {
        &self.allowed_extensions
    }

    /// Append a batch to `bucket`, returning the bucket's new contents.
    ///
    /// Checks run in order: known bucket, batch size, extensions. Nothing is
    /// stored unless every check passes.
    pub fn add_batch(
        &mut self,
        bucket: &str,
        uploads: Vec<ImageUpload>,
    ) -> Result<&[CategorizedImage], ComposeError> {
        let idx = self.bucket_index(bucket)?;

        if uploads.len() > self.max_files_per_batch {
            return Err(ComposeError::BatchSize {
                limit: self.max_files_per_batch,
                attempted: uploads.len(),
            });
        }

        let rejected: Vec<String> = uploads
            .iter()
            .filter(|u| !self.extension_allowed(&u.file_name))
            .map(|u| u.file_name.clone())
            .collect();
        if !rejected.is_empty() {
            return Err(ComposeError::FileType {
                files: rejected,
                allowed: self.allowed_extensions.clone(),
            });
        }

        let target = &mut self.buckets[idx];
        let count = uploads.len();
        for upload in uploads {
            let ordinal = target.images.len();
            target.images.push(CategorizedImage {
                category: target.name.clone(),
                reference: upload.reference,
                file_name: upload.file_name,
                ordinal,
            });
        }
        info!(
            "Added {} images to '{}' ({} total)",
            count,
            target.name,
            target.images.len()
        );
        Ok(&target.images)
    }

    /// Remove the image at `index`, re-compacting the ordinals behind it.
    pub fn remove(&mut self, bucket: &str, index: usize) -> Result<CategorizedImage, ComposeError> {
        let idx = self.bucket_index(bucket)?;
        let target = &mut self.buckets[idx];
        if index >= target.images.len() {
            return Err(ComposeError::ImageIndexOutOfRange {
                bucket: bucket.to_string(),
                index,
                len: target.images.len(),
            });
        }
        let removed = target.images.remove(index);
        for (ordinal, img) in target.images.iter_mut().enumerate().skip(index) {
            img.ordinal = ordinal;
        }
        debug!("Removed image #{} '{}' from '{}'", index, removed.file_name, bucket);
        Ok(removed)
    }

    /// Drop every image in `bucket`.
    pub fn clear(&mut self, bucket: &str) -> Result<(), ComposeError> {
        let idx = self.bucket_index(bucket)?;
        self.buckets[idx].images.clear();
        Ok(())
    }

    pub fn images(&self, bucket: &str) -> Result<&[CategorizedImage], ComposeError> {
        let idx = self.bucket_index(bucket)?;
        Ok(&self.buckets[idx].images)
    }

    /// `(bucket, image count)` in schema order.
    pub fn counts(&self) -> Vec<(String, usize)> {
        self.buckets
            .iter()
            .map(|b| (b.name.clone(), b.images.len()))
            .collect()
    }

    pub fn total(&self) -> usize {
        self.buckets.iter().map(|b| b.images.len()).sum()
    }

    /// Copy of every bucket, for document assembly.
    pub fn snapshot(&self) -> Vec<BucketImages> {
        self.buckets
            .iter()
            .map(|b| BucketImages {
                bucket: b.name.clone(),
                title: b.title.clone(),
                images: b.images.clone(),
            })
            .collect()
    }

    fn bucket_index(&self, bucket: &str) -> Result<usize, ComposeError> {
        self.buckets
            .iter()
            .position(|b| b.name == bucket)
            .ok_or_else(|| ComposeError::UnknownBucket {
                bucket: bucket.to_string(),
                known: self.buckets.iter().map(|b| b.name.clone()).collect(),
            })
    }

    fn extension_allowed(&self, file_name: &str) -> bool {
        Path::new(file_name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| self.allowed_extensions.contains(&ext))
    }
}
