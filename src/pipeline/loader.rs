//! Document loading from disk.
//!
//! Text files become one page scored on density; images become one page that
//! is handed to the oracle verbatim. PDF is accepted at intake but has no
//! decoder here.

use std::path::Path;

use thiserror::Error;

use crate::config::{ALLOWED_EXTENSIONS, MAX_FILE_SIZE};
use crate::models::{DocumentContent, PageContent, PageImage};

/// Plain-text formats the loader reads directly, on top of the intake list.
pub const TEXT_EXTENSIONS: &[&str] = &["txt", "md"];

/// Characters at which a page's text density saturates.
const DENSITY_FULL_CHARS: f64 = 2000.0;
/// Words at which a page's word score saturates.
const WORDS_FULL: f64 = 50.0;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("File too large: {size} bytes (limit {limit})")]
    TooLarge { size: u64, limit: u64 },
}

/// Turns a file into page content for the pipeline.
pub trait DocumentLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<DocumentContent, LoaderError>;
}

/// Lowercased extension, if any.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Whether intake accepts this file at all.
pub fn is_allowed_file(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| {
        ALLOWED_EXTENSIONS.contains(&ext.as_str()) || TEXT_EXTENSIONS.contains(&ext.as_str())
    })
}

/// Legibility from text alone: mean of char density and word-count scores.
pub fn text_legibility(text: &str) -> f64 {
    let chars = text.chars().filter(|c| !c.is_whitespace()).count() as f64;
    let words = text.split_whitespace().count() as f64;
    let density = (chars / DENSITY_FULL_CHARS).min(1.0);
    let word_score = (words / WORDS_FULL).min(1.0);
    (density + word_score) / 2.0
}

fn image_mime(ext: &str) -> Option<&'static str> {
    match ext {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        _ => None,
    }
}

pub struct FileLoader {
    max_size: u64,
}

impl Default for FileLoader {
    fn default() -> Self {
        Self {
            max_size: MAX_FILE_SIZE,
        }
    }
}

impl FileLoader {
    pub fn with_max_size(max_size: u64) -> Self {
        Self { max_size }
    }
}

impl DocumentLoader for FileLoader {
    fn load(&self, path: &Path) -> Result<DocumentContent, LoaderError> {
        let ext = extension_of(path).unwrap_or_default();
        let is_text = TEXT_EXTENSIONS.contains(&ext.as_str());
        let mime = image_mime(&ext);
        if !is_text && mime.is_none() {
            return Err(LoaderError::UnsupportedType(if ext.is_empty() {
                "(none)".to_string()
            } else {
                ext
            }));
        }

        let size = std::fs::metadata(path)?.len();
        if size > self.max_size {
            return Err(LoaderError::TooLarge {
                size,
                limit: self.max_size,
            });
        }

        let bytes = std::fs::read(path)?;
        let page = match mime {
            Some(mime_type) => PageContent {
                page_number: 1,
                text: String::new(),
                image: Some(PageImage {
                    mime_type: mime_type.to_string(),
                    data: bytes,
                }),
                legibility_score: 1.0,
                image_count: 1,
            },
            None => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                PageContent {
                    page_number: 1,
                    legibility_score: text_legibility(&text),
                    text,
                    image: None,
                    image_count: 0,
                }
            }
        };

        tracing::debug!(
            path = %path.display(),
            size,
            legibility = page.legibility_score,
            "Loaded document"
        );
        Ok(DocumentContent::from_pages(vec![page]))
    }
}
