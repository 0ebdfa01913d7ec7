//! Web page fetching and text extraction.
//!
//! [`fetch_page`] downloads a page (following redirects) and hands the HTML
//! to [`extract_page`], a pure function. `scraper::Html` is not `Send`, so
//! parsing happens strictly after the last await and the parsed document
//! never crosses an await point.

use std::time::Duration;

use scraper::{ElementRef, Html, Selector};

use crate::error::{Error, Result};

/// Extracted title and text of a fetched page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub title: String,
    pub body: String,
    /// Final URL after redirects.
    pub url: String,
}

/// Fetch a page over HTTP(S) and extract its readable text.
pub async fn fetch_page(url: &str) -> Result<FetchedPage> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(Error::InvalidArgument(format!(
            "url must be http(s): {}",
            url
        )));
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| Error::Upstream(format!("failed to build HTTP client: {}", e)))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| Error::Upstream(format!("fetch failed for {}: {}", url, e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::Upstream(format!(
            "fetch failed for {}: HTTP {}",
            url, status
        )));
    }

    let final_url = response.url().to_string();
    let html = response
        .text()
        .await
        .map_err(|e| Error::Upstream(format!("fetch failed for {}: {}", url, e)))?;

    Ok(extract_page(&html, final_url))
}

/// Extract title and readable text from an HTML document.
///
/// The content root is the first match of `main`, `article`, `[role="main"]`,
/// `.content`, or `#content`, falling back to `body`. Script, style, nav,
/// header, and footer subtrees are skipped.
pub fn extract_page(html: &str, url: String) -> FetchedPage {
    let document = Html::parse_document(html);

    let title = extract_title(&document);

    let content_root = ["main", "article", "[role=\"main\"]", ".content", "#content"]
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|sel| document.select(&sel).next())
        .or_else(|| {
            Selector::parse("body")
                .ok()
                .and_then(|sel| document.select(&sel).next())
        });

    let mut parts = Vec::new();
    if let Some(root) = content_root {
        collect_text(root, &mut parts);
    }

    FetchedPage {
        title,
        body: parts.join("\n\n"),
        url,
    }
}

fn extract_title(document: &Html) -> String {
    for selector in ["title", "h1"] {
        if let Ok(sel) = Selector::parse(selector) {
            if let Some(el) = document.select(&sel).next() {
                let text = el.text().collect::<String>().trim().to_string();
                if !text.is_empty() {
                    return text;
                }
            }
        }
    }
    "Untitled".to_string()
}

/// Recursively collect text nodes, skipping non-content subtrees.
fn collect_text(element: ElementRef, parts: &mut Vec<String>) {
    use scraper::node::Node;

    if matches!(
        element.value().name(),
        "script" | "style" | "noscript" | "nav" | "header" | "footer"
    ) {
        return;
    }

    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    parts.push(trimmed.to_string());
                }
            }
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    collect_text(child_element, parts);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_title_and_main_content() {
        let html = r#"
            <html><head><title>My Page</title></head>
            <body>
                <nav>Site nav</nav>
                <main><h2>Section</h2><p>Hello world.</p></main>
                <footer>Footer junk</footer>
            </body></html>
        "#;
        let page = extract_page(html, "https://example.com/p".to_string());
        assert_eq!(page.title, "My Page");
        assert!(page.body.contains("Hello world."));
        assert!(!page.body.contains("Site nav"));
        assert!(!page.body.contains("Footer junk"));
    }

    #[test]
    fn falls_back_to_h1_and_body() {
        let html = "<html><body><h1>Heading</h1><p>Text</p><script>var x;</script></body></html>";
        let page = extract_page(html, "https://example.com".to_string());
        assert_eq!(page.title, "Heading");
        assert!(page.body.contains("Text"));
        assert!(!page.body.contains("var x"));
    }

    #[test]
    fn untitled_when_empty() {
        let page = extract_page("<html><body></body></html>", "u".to_string());
        assert_eq!(page.title, "Untitled");
        assert_eq!(page.body, "");
    }
}
