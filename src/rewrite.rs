/// Root-relative base reference served by the worker's UI.
pub(crate) const ROOT_HREF: &str = "href=\"/\"";

/// Point the document's root-relative `href="/"` at `origin`.
///
/// Exactly one literal replacement: the first `href="/"` becomes
/// `href="<origin>/"`. Every other occurrence, and any document without one,
/// is left byte-for-byte unchanged. A trailing `/` on `origin` is not doubled.
pub fn rewrite_root_href(body: &str, origin: &str) -> String {
    let origin = origin.trim_end_matches('/');
    body.replacen(ROOT_HREF, &format!("href=\"{origin}/\""), 1)
}
