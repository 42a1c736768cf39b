//! File filtering logic for the scanner.

use crate::core::record::ImageFormat;
use std::collections::HashSet;
use std::path::Path;

const DEFAULT_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "heic", "heif", "tif", "tiff", "webp", "dng", "nef", "cr2", "cr3",
    "arw", "rw2", "orf", "raf",
];

/// What the filter decided for one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    /// Hidden file, ignored without counting
    Hidden,
    Supported(ImageFormat),
    Unsupported,
}

/// Filters files to determine if they are supported images
pub struct ImageFilter {
    /// File extensions to include
    extensions: HashSet<String>,
    /// Whether to include hidden files
    include_hidden: bool,
}

impl ImageFilter {
    /// Create a new filter with default supported extensions
    pub fn new() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            include_hidden: false,
        }
    }

    /// Include hidden files (starting with .)
    pub fn with_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }

    /// Narrow the accepted extensions; unknown formats stay unsupported
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions.into_iter().map(|e| e.to_lowercase()).collect();
        self
    }

    pub fn is_hidden(name: &str) -> bool {
        name.starts_with('.')
    }

    /// Decide what to do with a file
    pub fn classify(&self, path: &Path) -> FilterDecision {
        if !self.include_hidden {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if Self::is_hidden(name) {
                    return FilterDecision::Hidden;
                }
            }
        }

        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return FilterDecision::Unsupported;
        };
        let ext_lower = ext.to_lowercase();
        let format = ImageFormat::from_extension(&ext_lower);
        if format.is_supported() && self.extensions.contains(&ext_lower) {
            FilterDecision::Supported(format)
        } else {
            FilterDecision::Unsupported
        }
    }
}

impl Default for ImageFilter {
    fn default() -> Self {
        Self::new()
    }
}
