// Vidshelf - Commands Module
// The surface external collaborators (CLI, a web front end) call into.
// Malformed input is rejected here with `Validation` before anything is written.

pub mod media;
pub mod scans;

pub use media::*;
pub use scans::*;

use crate::error::{VidshelfError, Result};

const MAX_TAG_NAME_CHARS: usize = 100;

/// Trimmed, lowercased tag name; empty or over-long names are rejected.
pub fn normalize_tag_name(name: &str) -> Result<String> {
    let name = name.trim().to_lowercase();
    if name.is_empty() {
        return Err(VidshelfError::Validation("Tag name is empty".to_string()));
    }
    if name.chars().count() > MAX_TAG_NAME_CHARS {
        return Err(VidshelfError::Validation(format!(
            "Tag name longer than {} characters",
            MAX_TAG_NAME_CHARS
        )));
    }
    Ok(name)
}

fn validate_page(limit: Option<i64>, offset: Option<i64>) -> Result<()> {
    if let Some(limit) = limit {
        if limit < 0 {
            return Err(VidshelfError::Validation(format!("Negative limit: {}", limit)));
        }
    }
    if let Some(offset) = offset {
        if offset < 0 {
            return Err(VidshelfError::Validation(format!("Negative offset: {}", offset)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_tag_name() {
        assert_eq!(normalize_tag_name(" Beach ").unwrap(), "beach");
        assert!(normalize_tag_name("").is_err());
        assert!(normalize_tag_name(&"x".repeat(101)).is_err());
        assert!(normalize_tag_name(&"x".repeat(100)).is_ok());
    }

    #[test]
    fn test_validate_page() {
        assert!(validate_page(None, None).is_ok());
        assert!(validate_page(Some(10), Some(0)).is_ok());
        assert!(validate_page(Some(-1), None).is_err());
        assert!(validate_page(None, Some(-5)).is_err());
    }
}
