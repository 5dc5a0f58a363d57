//! Reference gating and resolution.
//!
//! Only local, DITA-format references are harvested. A reference that passes
//! the gate is resolved against the directory of the document containing it
//! and normalized to a forward-slash path.

use std::path::Path;
use std::sync::LazyLock;

use quick_xml::events::BytesStart;
use regex::Regex;

use docweave_shared::FragmentKey;
use docweave_xml::attribute;

const INTERNET_LINK_MARK: &str = "://";

/// `scheme:` prefix (two or more characters, so `C:\` is not a scheme).
static URI_SCHEME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]+:").expect("URI scheme regex"));

/// Apply the href gate to a trigger element and resolve its key.
///
/// Returns `None` when the reference is absent, external, non-local or not
/// DITA.
pub fn gate(trigger: &BytesStart<'_>, source: &Path) -> Option<FragmentKey> {
    let href = attribute(trigger, "href")?;
    if href.contains(INTERNET_LINK_MARK) || URI_SCHEME_RE.is_match(&href) {
        return None;
    }
    let scope_ok = attribute(trigger, "scope").is_none_or(|s| s.eq_ignore_ascii_case("local"));
    let format_ok = attribute(trigger, "format").is_none_or(|f| f.eq_ignore_ascii_case("dita"));
    if !scope_ok || !format_ok {
        return None;
    }
    Some(FragmentKey::from_resolved(&resolve(source, &href)))
}

/// Resolve `href` against the document at `source`, keeping any `#fragment`.
///
/// A fragment-only reference (`#t1`) points back into `source` itself.
pub fn resolve(source: &Path, href: &str) -> String {
    let (path, fragment) = match href.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment)),
        None => (href, None),
    };

    let joined = if path.is_empty() {
        to_slashes(source)
    } else if path.starts_with('/') {
        path.to_string()
    } else {
        match source.parent().map(to_slashes).filter(|dir| !dir.is_empty()) {
            Some(dir) => format!("{dir}/{path}"),
            None => path.to_string(),
        }
    };

    let mut resolved = normalize(&joined);
    if let Some(fragment) = fragment {
        resolved.push('#');
        resolved.push_str(fragment);
    }
    resolved
}

/// Collapse `.` and `..` segments and unify separators to `/`.
pub fn normalize(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let absolute = unified.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if absolute => {}
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }

    let body = segments.join("/");
    if absolute { format!("/{body}") } else { body }
}

fn to_slashes(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
