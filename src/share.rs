//! Share links and startup query handling
//!
//! A document opened by reference is shared as `?file=<encoded reference>`.
//! Small inline documents travel inside the link as `?pdf=<base64>`. Anything
//! else can only be shared as a template pointing at the file name.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Url;

/// Query parameter carrying a reference
pub const FILE_PARAM: &str = "file";
/// Query parameter carrying embedded base64 content
pub const EMBED_PARAM: &str = "pdf";

/// A link that reopens the current document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareLink {
    /// Points at the document's reference
    Reference { url: String, embed_code: String },
    /// Carries the document itself
    Embedded { url: String, embed_code: String },
    /// Local document too large to embed; the link is only a template
    LocalOnly { template_url: String, embed_code: String },
}

impl ShareLink {
    pub fn url(&self) -> &str {
        match self {
            ShareLink::Reference { url, .. } | ShareLink::Embedded { url, .. } => url,
            ShareLink::LocalOnly { template_url, .. } => template_url,
        }
    }

    pub fn embed_code(&self) -> &str {
        match self {
            ShareLink::Reference { embed_code, .. }
            | ShareLink::Embedded { embed_code, .. }
            | ShareLink::LocalOnly { embed_code, .. } => embed_code,
        }
    }

    pub fn is_local_only(&self) -> bool {
        matches!(self, ShareLink::LocalOnly { .. })
    }
}

/// Build the share link for a document shown at `page_url`
pub fn build_share_link(
    page_url: &str,
    reference: Option<&str>,
    embedded: Option<&str>,
    name: &str,
) -> ShareLink {
    let base = page_base(page_url);

    if let Some(reference) = reference {
        let param = same_origin_path(page_url, reference).unwrap_or_else(|| reference.to_string());
        let url = format!("{}?{}={}", base, FILE_PARAM, urlencoding::encode(&param));
        let embed_code = embed_code(&url);
        return ShareLink::Reference { url, embed_code };
    }

    if let Some(embedded) = embedded {
        // Base64 may contain `+` and `/`, which must survive query decoding
        let url = format!("{}?{}={}", base, EMBED_PARAM, urlencoding::encode(embedded));
        let embed_code = embed_code(&url);
        return ShareLink::Embedded { url, embed_code };
    }

    let template_url = format!("{}?{}={}", base, FILE_PARAM, urlencoding::encode(name));
    let embed_code = embed_code(&template_url);
    ShareLink::LocalOnly {
        template_url,
        embed_code,
    }
}

/// `<iframe>` snippet embedding `url`
pub fn embed_code(url: &str) -> String {
    format!(
        r#"<iframe src="{}" width="100%" height="600px" style="border:none;"></iframe>"#,
        url
    )
}

/// What the viewer should open at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupRequest {
    /// `?file=` reference, already decoded
    Reference(String),
    /// `?pdf=` base64 content, not yet decoded
    Embedded(String),
    /// Nothing to open; ask the user for a source
    Prompt,
}

/// Parse a startup query string (with or without the leading `?`)
///
/// `file` wins over `pdf` when both are present.
pub fn parse_startup_query(query: &str) -> StartupRequest {
    let query = query.trim_start_matches('?');
    let mut file = None;
    let mut embedded = None;

    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let value = decode_component(value);
        match key {
            FILE_PARAM if file.is_none() && !value.is_empty() => file = Some(value),
            EMBED_PARAM if embedded.is_none() && !value.is_empty() => embedded = Some(value),
            _ => {}
        }
    }

    match (file, embedded) {
        (Some(reference), _) => StartupRequest::Reference(reference),
        (None, Some(content)) => StartupRequest::Embedded(content),
        (None, None) => StartupRequest::Prompt,
    }
}

/// Decode `?pdf=` content into document bytes
pub fn decode_embedded(content: &str) -> Result<Vec<u8>, base64::DecodeError> {
    // Unencoded links turn `+` into spaces
    let normalized: String = content.trim().replace(' ', "+");
    STANDARD.decode(normalized)
}

/// Base64 form of `data`, used for `?pdf=` links
pub fn encode_embedded(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Display name derived from a reference: its last path segment
pub fn name_from_reference(reference: &str) -> String {
    let path = reference
        .split(['?', '#'])
        .next()
        .unwrap_or(reference);

    path.rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            urlencoding::decode(segment)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| segment.to_string())
        })
        .unwrap_or_else(|| "document.pdf".to_string())
}

fn decode_component(value: &str) -> String {
    let spaced = value.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

/// Page URL without query or fragment
fn page_base(page_url: &str) -> String {
    match Url::parse(page_url) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => page_url
            .split(['?', '#'])
            .next()
            .unwrap_or(page_url)
            .to_string(),
    }
}

/// Path, query and fragment of `reference` when it lives on the page's origin
fn same_origin_path(page_url: &str, reference: &str) -> Option<String> {
    let page = Url::parse(page_url).ok()?;
    let target = page.join(reference).ok()?;
    if target.origin() != page.origin() {
        return None;
    }

    let mut path = target.path().to_string();
    if let Some(query) = target.query() {
        path.push('?');
        path.push_str(query);
    }
    if let Some(fragment) = target.fragment() {
        path.push('#');
        path.push_str(fragment);
    }
    Some(path)
}
