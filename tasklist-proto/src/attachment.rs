//! Attachment references and the diff that drives blob cleanup.
//!
//! Images are bare URLs; files carry a display name next to their URL.
//! Both are validated when deserialized, so a stored JSON column or a
//! request body with an empty URL never reaches the repository as a
//! typed value.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::task::ValidationError;

/// Reference to an uploaded image blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageRef(String);

impl ImageRef {
    /// Creates an image reference from a non-empty URL.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyAttachmentUrl`] if the URL is blank.
    pub fn new(url: impl Into<String>) -> Result<Self, ValidationError> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(ValidationError::EmptyAttachmentUrl);
        }
        Ok(Self(url))
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ImageRef {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ImageRef> for String {
    fn from(value: ImageRef) -> Self {
        value.0
    }
}

#[derive(Deserialize)]
struct RawFileRef {
    name: String,
    url: String,
}

/// Reference to an uploaded file blob with its display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawFileRef")]
pub struct FileRef {
    name: String,
    url: String,
}

impl FileRef {
    /// Creates a file reference.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyFileName`] or
    /// [`ValidationError::EmptyAttachmentUrl`] for blank fields.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Result<Self, ValidationError> {
        let (name, url) = (name.into(), url.into());
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyFileName);
        }
        if url.trim().is_empty() {
            return Err(ValidationError::EmptyAttachmentUrl);
        }
        Ok(Self { name, url })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl TryFrom<RawFileRef> for FileRef {
    type Error = ValidationError;

    fn try_from(raw: RawFileRef) -> Result<Self, Self::Error> {
        Self::new(raw.name, raw.url)
    }
}

/// The attachment columns of a single task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attachments {
    pub images: Vec<ImageRef>,
    pub files: Vec<FileRef>,
}

impl Attachments {
    #[must_use]
    pub const fn new(images: Vec<ImageRef>, files: Vec<FileRef>) -> Self {
        Self { images, files }
    }

    /// Every referenced URL, images first, duplicates removed, first
    /// occurrence order kept.
    #[must_use]
    pub fn urls(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.images
            .iter()
            .map(ImageRef::url)
            .chain(self.files.iter().map(FileRef::url))
            .filter(|url| seen.insert(*url))
            .collect()
    }

    /// URLs referenced now but no longer referenced once `images` and/or
    /// `files` replace the current lists.
    ///
    /// A `None` list is left as is. Images compare by value and files by
    /// URL. A URL that moves from one list to the other is not reported,
    /// since its blob is still referenced after the update.
    #[must_use]
    pub fn removed_urls(
        &self,
        images: Option<&[ImageRef]>,
        files: Option<&[FileRef]>,
    ) -> Vec<String> {
        let next_images = images.unwrap_or(&self.images);
        let next_files = files.unwrap_or(&self.files);
        let kept: HashSet<&str> = next_images
            .iter()
            .map(ImageRef::url)
            .chain(next_files.iter().map(FileRef::url))
            .collect();

        self.urls()
            .into_iter()
            .filter(|url| !kept.contains(url))
            .map(str::to_string)
            .collect()
    }
}
