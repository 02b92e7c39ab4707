use serde::{Deserialize, Serialize};

/// Pages scoring at or below this are considered unreadable.
pub const LEGIBILITY_THRESHOLD: f64 = 0.3;

/// Raw page image handed to the oracle as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageImage {
    pub mime_type: String,
    #[serde(skip)]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageContent {
    pub page_number: u32,
    pub text: String,
    pub image: Option<PageImage>,
    pub legibility_score: f64,
    pub image_count: u32,
}

/// Per-document content supplied by the parsing collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentContent {
    pub total_pages: u32,
    pub total_images: u32,
    pub is_legible: bool,
    pub pages: Vec<PageContent>,
}

impl DocumentContent {
    /// Assemble from pages, deriving totals and legibility.
    pub fn from_pages(pages: Vec<PageContent>) -> Self {
        let total_images = pages.iter().map(|p| p.image_count).sum();
        let is_legible = !pages.is_empty()
            && pages.iter().all(|p| p.legibility_score > LEGIBILITY_THRESHOLD);
        Self {
            total_pages: pages.len() as u32,
            total_images,
            is_legible,
            pages,
        }
    }

    /// Page text joined with single spaces, as the scanner sees it.
    pub fn combined_text(&self) -> String {
        let mut all = String::new();
        for page in &self.pages {
            if !page.text.is_empty() {
                all.push_str(&page.text);
                all.push(' ');
            }
        }
        all
    }

    pub fn pre_check(&self) -> PreCheck {
        PreCheck {
            total_pages: self.total_pages,
            total_images: self.total_images,
            is_legible: self.is_legible,
        }
    }
}

/// Pre-check metadata echoed in every pipeline outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreCheck {
    pub total_pages: u32,
    pub total_images: u32,
    pub is_legible: bool,
}
