//! Extraction of declared icons from HTML pages

use scraper::{Html, Selector};

/// Collect the `href` of every `<link>` whose `rel` mentions `icon`, in
/// document order. Covers `icon`, `shortcut icon`, `apple-touch-icon` and
/// `mask-icon`.
pub fn extract_icon_links(html: &str) -> Vec<String> {
    let Ok(selector) = Selector::parse("link[rel][href]") else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    document
        .select(&selector)
        .filter(|element| {
            element
                .value()
                .attr("rel")
                .is_some_and(|rel| rel.to_ascii_lowercase().contains("icon"))
        })
        .filter_map(|element| element.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_icon_links_in_document_order() {
        let html = r##"<!doctype html>
<html><head>
  <link rel="stylesheet" href="/style.css">
  <link rel="apple-touch-icon" href="/apple.png">
  <link rel="Shortcut Icon" href=" /favicon.png ">
  <link rel="mask-icon" href="/mask.svg" color="#000">
  <link rel="icon" href="">
  <link rel="preload" href="/font.woff2">
</head><body><link rel="icon" href="/late.ico"></body></html>"##;

        assert_eq!(
            extract_icon_links(html),
            vec!["/apple.png", "/favicon.png", "/mask.svg", "/late.ico"]
        );
    }

    #[test]
    fn test_no_links() {
        assert!(extract_icon_links("<html><head><title>x</title></head></html>").is_empty());
        assert!(extract_icon_links("not html at all").is_empty());
    }
}
