//! Self-contained HTML artifacts
//!
//! A LOCAL artifact is one HTML file holding:
//! - the encoded document in a `application/json` script tag
//! - every asset as base64 in its own script tag, addressed by `#asset-<hash>`
//! - the viewer stylesheet and script
//!
//! The document JSON is embedded with `</` written as `<\/` and `<!--` as
//! `<\u0021--`, so only the element's own end tag closes it. Both rewrites
//! are valid JSON escapes that compact JSON output never contains, and
//! [`extract_document`] undoes them exactly.

use crate::error::RenderError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use folio_asset::ContentHash;
use std::collections::BTreeMap;
use std::fmt::Write as _;

pub(crate) const TEMPLATE: &str = include_str!("../viewer/template.html");
pub(crate) const VIEWER_JS: &str = include_str!("../viewer/viewer.js");
pub(crate) const VIEWER_CSS: &str = include_str!("../viewer/viewer.css");

/// External prefix used for assets embedded in the same file
pub(crate) const EMBED_PREFIX: &str = "#asset-";

const DOCUMENT_OPEN: &str = r#"<script type="application/json" id="folio-document">"#;
const ASSET_OPEN: &str = r#"<script type="application/octet-stream" id="asset-"#;
const SCRIPT_CLOSE: &str = "</script>";

/// Placeholders a template must contain, each exactly once
pub const PLACEHOLDERS: [&str; 5] = ["title", "viewer_css", "document", "assets", "viewer_js"];

/// Check that `template` has every placeholder exactly once and no others
///
/// # Errors
/// `RenderError::TemplateFailure` naming the first offending placeholder
pub fn check_template(template: &str) -> Result<(), RenderError> {
    let mut counts: BTreeMap<&str, usize> = PLACEHOLDERS.iter().map(|p| (*p, 0)).collect();
    for name in placeholders(template) {
        match counts.get_mut(name) {
            Some(count) => *count += 1,
            None => {
                return Err(RenderError::TemplateFailure(format!(
                    "unknown placeholder {{{{{name}}}}}"
                )))
            }
        }
    }
    for name in PLACEHOLDERS {
        match counts[name] {
            1 => {}
            0 => {
                return Err(RenderError::TemplateFailure(format!(
                    "missing placeholder {{{{{name}}}}}"
                )))
            }
            _ => {
                return Err(RenderError::TemplateFailure(format!(
                    "placeholder {{{{{name}}}}} appears more than once"
                )))
            }
        }
    }
    Ok(())
}

fn placeholders(template: &str) -> impl Iterator<Item = &str> {
    let mut rest = template;
    std::iter::from_fn(move || {
        let start = rest.find("{{")?;
        let end = rest[start..].find("}}")? + start;
        let name = &rest[start + 2..end];
        rest = &rest[end + 2..];
        Some(name.trim())
    })
}

/// Substitute placeholders in one pass, so inserted values are never scanned
pub(crate) fn fill(template: &str, values: &BTreeMap<&str, String>) -> Result<String, RenderError> {
    check_template(template)?;
    let extra: usize = values.values().map(String::len).sum();
    let mut out = String::with_capacity(template.len() + extra);
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start..].find("}}") else {
            break;
        };
        let end = start + len;
        let name = rest[start + 2..end].trim();
        let value = values.get(name).ok_or_else(|| {
            RenderError::TemplateFailure(format!("no value for placeholder {{{{{name}}}}}"))
        })?;
        out.push_str(&rest[..start]);
        out.push_str(value);
        rest = &rest[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Embed document JSON in a script element
pub(crate) fn embed_json(bytes: &[u8]) -> Result<String, RenderError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| RenderError::Malformed(format!("document is not UTF-8: {e}")))?;
    Ok(text.replace("</", "<\\/").replace("<!--", "<\\u0021--"))
}

/// Asset script tags, one per asset
pub(crate) fn asset_tags<'a, I>(assets: I) -> String
where
    I: IntoIterator<Item = (&'a ContentHash, &'a str, &'a [u8])>,
{
    let mut out = String::new();
    for (hash, mime_type, data) in assets {
        // Writing to a String cannot fail.
        let _ = writeln!(
            out,
            r#"{ASSET_OPEN}{hash}" data-mime="{}">{}{SCRIPT_CLOSE}"#,
            escape_html(mime_type),
            STANDARD.encode(data),
        );
    }
    out
}

/// Minimal HTML text and attribute escaping
pub(crate) fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn script_body<'a>(html: &'a str, open: &str) -> Option<&'a str> {
    let start = html.find(open)? + open.len();
    let len = html[start..].find(SCRIPT_CLOSE)?;
    Some(&html[start..start + len])
}

/// Recover the encoded document embedded in a LOCAL artifact
///
/// # Errors
/// `RenderError::Malformed` if the artifact has no document element
pub fn extract_document(html: &str) -> Result<Vec<u8>, RenderError> {
    let body = script_body(html, DOCUMENT_OPEN)
        .ok_or_else(|| RenderError::Malformed("no embedded document".to_string()))?;
    Ok(body
        .replace("<\\u0021--", "<!--")
        .replace("<\\/", "</")
        .into_bytes())
}

/// Recover every embedded asset payload, verifying hashes
///
/// # Errors
/// `RenderError::Malformed` for unparsable tags, bad base64 or payloads that
/// do not match their hash
pub fn extract_assets(html: &str) -> Result<BTreeMap<ContentHash, Vec<u8>>, RenderError> {
    let mut assets = BTreeMap::new();
    let mut rest = html;
    while let Some(pos) = rest.find(ASSET_OPEN) {
        rest = &rest[pos + ASSET_OPEN.len()..];
        let hash_end = rest
            .find('"')
            .ok_or_else(|| RenderError::Malformed("unterminated asset id".to_string()))?;
        let hash: ContentHash = rest[..hash_end]
            .parse()
            .map_err(|e| RenderError::Malformed(format!("bad asset id: {e}")))?;
        let body_start = rest
            .find('>')
            .ok_or_else(|| RenderError::Malformed("unterminated asset tag".to_string()))?
            + 1;
        let body_len = rest[body_start..]
            .find(SCRIPT_CLOSE)
            .ok_or_else(|| RenderError::Malformed("unterminated asset body".to_string()))?;
        let data = STANDARD
            .decode(rest[body_start..body_start + body_len].trim())
            .map_err(|e| RenderError::Malformed(format!("asset {}: {e}", hash.short())))?;
        if ContentHash::compute(&data) != hash {
            return Err(RenderError::Malformed(format!(
                "asset {} does not match its hash",
                hash.short()
            )));
        }
        assets.insert(hash, data);
        rest = &rest[body_start + body_len..];
    }
    Ok(assets)
}
