//! Admission filters applied to raw bytes before anything is stored.
//!
//! Filters run in a fixed order (size, type, resolution) and stop at the
//! first failure. Every criterion is optional and an unset one always
//! passes, so a request without criteria skips the chain entirely.

use std::io::Cursor;

use hoard_core::models::FilterCriteria;

/// One admission predicate.
pub trait ImportFilter: Send + Sync {
    /// Short name used in rejection messages.
    fn name(&self) -> &'static str;

    fn passes(&self, criteria: &FilterCriteria, bytes: &[u8]) -> bool;
}

pub struct FileSizeFilter;

impl ImportFilter for FileSizeFilter {
    fn name(&self) -> &'static str {
        "Filesize"
    }

    fn passes(&self, criteria: &FilterCriteria, bytes: &[u8]) -> bool {
        let size = bytes.len() as u64;
        criteria.max_file_size.map_or(true, |max| size <= max)
            && criteria.min_file_size.map_or(true, |min| size >= min)
    }
}

/// Allow-list over the type sniffed from content. Undetectable content
/// fails once a list is set.
pub struct FileTypeFilter;

impl ImportFilter for FileTypeFilter {
    fn name(&self) -> &'static str {
        "Filetype"
    }

    fn passes(&self, criteria: &FilterCriteria, bytes: &[u8]) -> bool {
        let Some(allowed) = &criteria.allowed_file_types else {
            return true;
        };
        let Some(kind) = infer::get(bytes) else {
            return false;
        };
        let detected = normalize_extension(kind.extension());
        allowed
            .iter()
            .any(|ext| normalize_extension(ext) == detected)
    }
}

fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
    match ext.as_str() {
        "jpeg" => "jpg".to_string(),
        "tiff" => "tif".to_string(),
        _ => ext,
    }
}

/// Width and height bounds. Only reads the image header.
pub struct ResolutionFilter;

impl ImportFilter for ResolutionFilter {
    fn name(&self) -> &'static str {
        "Resolution"
    }

    fn passes(&self, criteria: &FilterCriteria, bytes: &[u8]) -> bool {
        if !criteria.has_resolution_bounds() {
            return true;
        }
        let Some((width, height)) = image_dimensions(bytes) else {
            return false;
        };
        criteria.max_width.map_or(true, |max| width <= max)
            && criteria.min_width.map_or(true, |min| width >= min)
            && criteria.max_height.map_or(true, |max| height <= max)
            && criteria.min_height.map_or(true, |min| height >= min)
    }
}

fn image_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

/// Ordered set of filters.
pub struct FilterChain {
    filters: Vec<Box<dyn ImportFilter>>,
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::new(vec![
            Box::new(FileSizeFilter),
            Box::new(FileTypeFilter),
            Box::new(ResolutionFilter),
        ])
    }
}

impl FilterChain {
    pub fn new(filters: Vec<Box<dyn ImportFilter>>) -> Self {
        Self { filters }
    }

    /// Name of the first filter that rejects the bytes, if any.
    pub fn first_failure(&self, criteria: &FilterCriteria, bytes: &[u8]) -> Option<&'static str> {
        if criteria.is_empty() {
            return None;
        }
        self.filters
            .iter()
            .find(|f| !f.passes(criteria, bytes))
            .map(|f| f.name())
    }

    /// Rejection message for the first failing filter, if any.
    pub fn check(&self, criteria: &FilterCriteria, bytes: &[u8]) -> Option<String> {
        self.first_failure(criteria, bytes)
            .map(|name| format!("Failed {} filter", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::new(width, height);
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn empty_criteria_pass_anything() {
        let chain = FilterChain::default();
        assert_eq!(chain.check(&FilterCriteria::default(), b"junk"), None);
    }

    #[test]
    fn size_bounds() {
        let chain = FilterChain::default();
        let criteria = FilterCriteria {
            max_file_size: Some(4),
            ..Default::default()
        };
        assert_eq!(chain.check(&criteria, b"1234"), None);
        assert_eq!(
            chain.check(&criteria, b"12345").as_deref(),
            Some("Failed Filesize filter")
        );

        let criteria = FilterCriteria {
            min_file_size: Some(10),
            ..Default::default()
        };
        assert_eq!(chain.first_failure(&criteria, b"short"), Some("Filesize"));
    }

    #[test]
    fn type_allow_list_uses_sniffed_type() {
        let chain = FilterChain::default();
        let criteria = FilterCriteria {
            allowed_file_types: Some(vec![".PNG".into()]),
            ..Default::default()
        };
        assert_eq!(chain.check(&criteria, &png(2, 2)), None);
        assert_eq!(chain.first_failure(&criteria, b"not an image"), Some("Filetype"));

        let criteria = FilterCriteria {
            allowed_file_types: Some(vec!["jpeg".into()]),
            ..Default::default()
        };
        assert_eq!(chain.first_failure(&criteria, &png(2, 2)), Some("Filetype"));
    }

    #[test]
    fn resolution_bounds_compare_matching_axes() {
        let chain = FilterChain::default();
        let wide = png(40, 10);

        let criteria = FilterCriteria {
            max_width: Some(50),
            max_height: Some(20),
            ..Default::default()
        };
        assert_eq!(chain.check(&criteria, &wide), None);

        let criteria = FilterCriteria {
            max_width: Some(30),
            ..Default::default()
        };
        assert_eq!(chain.first_failure(&criteria, &wide), Some("Resolution"));

        let criteria = FilterCriteria {
            min_height: Some(11),
            ..Default::default()
        };
        assert_eq!(chain.first_failure(&criteria, &wide), Some("Resolution"));
    }

    #[test]
    fn undecodable_bytes_fail_only_with_resolution_bounds() {
        let chain = FilterChain::default();
        let size_only = FilterCriteria {
            max_file_size: Some(1024),
            ..Default::default()
        };
        assert_eq!(chain.check(&size_only, b"garbage"), None);

        let with_bounds = FilterCriteria {
            min_width: Some(1),
            ..Default::default()
        };
        assert_eq!(chain.first_failure(&with_bounds, b"garbage"), Some("Resolution"));
    }

    #[test]
    fn chain_short_circuits_in_order() {
        let chain = FilterChain::default();
        let criteria = FilterCriteria {
            max_file_size: Some(1),
            allowed_file_types: Some(vec!["gif".into()]),
            min_width: Some(1000),
            ..Default::default()
        };
        assert_eq!(chain.first_failure(&criteria, &png(2, 2)), Some("Filesize"));
    }
}
