//! Anti-forgery token extraction
//!
//! The products page hands out the token the search API expects in the
//! `X-Csrf-Token` header. It appears either as a meta tag or as an inline
//! script assignment, depending on the page revision:
//!
//! - `<meta name="csrf-token" content="...">`
//! - `'X-CSRF-TOKEN': '...'` inside an `ajaxSetup` headers object

use scraper::{Html, Selector};

/// Textual key of the inline script assignment
const SCRIPT_TOKEN_KEY: &str = "X-CSRF-TOKEN";

/// Extracts the anti-forgery token from the handshake page
///
/// # Returns
///
/// * `Some(String)` - The token, meta tag preferred over inline script
/// * `None` - The page carries no token
///
/// # Example
///
/// ```
/// use nargh::transport::extract_csrf_token;
///
/// let html = r#"<html><head><meta name="csrf-token" content="abc123"></head></html>"#;
/// assert_eq!(extract_csrf_token(html), Some("abc123".to_string()));
/// ```
pub fn extract_csrf_token(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    extract_meta_token(&document).or_else(|| extract_script_token(html))
}

/// Reads the token from `<meta name="csrf-token">`
fn extract_meta_token(document: &Html) -> Option<String> {
    let selector = Selector::parse("meta[name='csrf-token'][content]").ok()?;

    document
        .select(&selector)
        .filter_map(|element| element.value().attr("content"))
        .map(|content| content.trim().to_string())
        .find(|content| !content.is_empty())
}

/// Reads the token from an inline `'X-CSRF-TOKEN': '...'` assignment
///
/// Everything between the key and the closing brace of the headers
/// object is taken, stripped of quotes and the separating colon, and cut
/// at the first comma or line break.
fn extract_script_token(html: &str) -> Option<String> {
    let start = html.find(SCRIPT_TOKEN_KEY)? + SCRIPT_TOKEN_KEY.len();
    let rest = &html[start..];
    let end = rest.find('}').unwrap_or(rest.len());

    let token: String = rest[..end]
        .split([',', '\n'])
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| !matches!(c, '\'' | '"' | ':'))
        .collect();
    let token = token.trim();

    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
