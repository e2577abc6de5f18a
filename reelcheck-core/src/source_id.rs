//! Submission identifier normalisation.

use crate::error::{ReelcheckError, Result};

const PERMALINK_KINDS: [&str; 3] = ["reel", "p", "tv"];

/// Reduce a shortcode or permalink to the bare source id.
///
/// Accepts `ABC123`, `https://www.instagram.com/reel/ABC123/?igsh=...`,
/// `/p/ABC123` and `/tv/ABC123`.
pub fn normalize_source_id(input: &str) -> Result<String> {
    let trimmed = input.trim();
    let without_query = trimmed
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_end_matches('/');

    let segments: Vec<&str> = without_query.split('/').filter(|s| !s.is_empty()).collect();
    let id = segments
        .windows(2)
        .find(|pair| PERMALINK_KINDS.contains(&pair[0]))
        .map(|pair| pair[1])
        .or_else(|| {
            // Bare shortcode
            (!without_query.contains('/')).then_some(without_query)
        })
        .ok_or_else(|| {
            ReelcheckError::invalid(format!("unrecognised source id or permalink: {trimmed}"))
        })?;

    if id.is_empty() {
        return Err(ReelcheckError::invalid("source id must not be empty"));
    }
    if id.chars().any(char::is_whitespace) {
        return Err(ReelcheckError::invalid(format!(
            "source id must not contain whitespace: {id:?}"
        )));
    }
    Ok(id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_shortcode() {
        assert_eq!(normalize_source_id("  C3xYz_-9 ").unwrap(), "C3xYz_-9");
    }

    #[test]
    fn test_permalinks() {
        for url in [
            "https://www.instagram.com/reel/C3xYz/",
            "https://instagram.com/p/C3xYz?igsh=abc",
            "instagram.com/tv/C3xYz#comments",
            "/reel/C3xYz",
        ] {
            assert_eq!(normalize_source_id(url).unwrap(), "C3xYz", "{url}");
        }
    }

    #[test]
    fn test_empty_and_unknown_paths_rejected() {
        for input in ["", "   ", "https://instagram.com/explore/", "a b"] {
            assert!(
                matches!(
                    normalize_source_id(input),
                    Err(ReelcheckError::InvalidParameter(_))
                ),
                "{input:?}"
            );
        }
    }
}
