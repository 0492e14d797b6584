pub mod listing;
pub mod screens;
pub mod theatre;

use scraper::ElementRef;
use thiserror::Error;

/// Required theatre fields that a detail page failed to provide.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("no theatre name in breadcrumb")]
    MissingName,
    #[error("no street address or locality")]
    MissingAddress,
    #[error("no facts block with a screen count")]
    MissingScreens,
}

/// Trimmed text content of an element and all its descendants.
pub(crate) fn text_of(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Site-relative paths ("/…") are joined onto `origin`; anything else is kept.
pub(crate) fn absolutize(origin: &str, href: &str) -> String {
    if href.starts_with('/') {
        format!("{}{}", origin, href)
    } else {
        href.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolutize_only_touches_site_paths() {
        let origin = "http://cinematreasures.org";
        assert_eq!(
            absolutize(origin, "/theaters/42"),
            "http://cinematreasures.org/theaters/42"
        );
        assert_eq!(absolutize(origin, "https://example.com/"), "https://example.com/");
        assert_eq!(absolutize(origin, "mailto:x@y.z"), "mailto:x@y.z");
    }
}
