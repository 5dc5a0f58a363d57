//! Element identification by name and by `class` type marker.
//!
//! Specialized vocabularies rename elements but keep the base type in the
//! `class` attribute (`- topic/body mytype/mybody `), so the passes look at
//! the marker first and fall back to the literal element name only when the
//! attribute is absent.

use quick_xml::events::{BytesEnd, BytesStart};

use docweave_shared::{DocweaveError, Result};

/// A base type such as `topic/body`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeMarker {
    pub module: &'static str,
    pub element: &'static str,
}

impl TypeMarker {
    pub const fn new(module: &'static str, element: &'static str) -> Self {
        Self { module, element }
    }

    /// True if `class` carries this marker, or if there is no class and the
    /// element is literally named after it.
    pub fn matches(&self, name: &str, class: Option<&str>) -> bool {
        match class {
            Some(class) => class.contains(&format!(" {}/{} ", self.module, self.element)),
            None => name == self.element,
        }
    }
}

pub const TOPIC_TOPIC: TypeMarker = TypeMarker::new("topic", "topic");
pub const TOPIC_PROLOG: TypeMarker = TypeMarker::new("topic", "prolog");
pub const TOPIC_METADATA: TypeMarker = TypeMarker::new("topic", "metadata");
pub const TOPIC_BODY: TypeMarker = TypeMarker::new("topic", "body");
pub const TOPIC_RELATED_LINKS: TypeMarker = TypeMarker::new("topic", "related-links");
pub const MAP_TOPICMETA: TypeMarker = TypeMarker::new("map", "topicmeta");
pub const MAP_TOPICREF: TypeMarker = TypeMarker::new("map", "topicref");
pub const MAP_NAVREF: TypeMarker = TypeMarker::new("map", "navref");
pub const MAP_ANCHOR: TypeMarker = TypeMarker::new("map", "anchor");
pub const MAP_RELTABLE: TypeMarker = TypeMarker::new("map", "reltable");

/// Prolog children that follow `metadata` in schema order. Seeing one of these
/// inside a prolog proves the prolog has no metadata container.
pub const AFTER_METADATA_IN_PROLOG: [TypeMarker; 5] = [
    TypeMarker::new("topic", "resourceid"),
    TypeMarker::new("topic", "data"),
    TypeMarker::new("topic", "data-about"),
    TypeMarker::new("topic", "foreign"),
    TypeMarker::new("topic", "unknown"),
];

/// The base element name recorded in a class marker (`- map/author ` → `author`).
pub fn generalized_name(class: &str) -> Option<&str> {
    let after = &class[class.find('/')? + 1..];
    let name = after.split_whitespace().next()?;
    (!name.is_empty()).then_some(name)
}

/// True if some token of `class` names `element` as its base type.
pub fn class_names(class: &str, element: &str) -> bool {
    class
        .split_whitespace()
        .filter_map(|token| token.split_once('/'))
        .any(|(_, name)| name == element)
}

/// Qualified name of a start tag.
pub fn element_name(e: &BytesStart<'_>) -> Result<String> {
    std::str::from_utf8(e.name().as_ref())
        .map(str::to_string)
        .map_err(|err| DocweaveError::parse(format!("element name is not UTF-8: {err}")))
}

/// Qualified name of an end tag.
pub fn end_name(e: &BytesEnd<'_>) -> Result<String> {
    std::str::from_utf8(e.name().as_ref())
        .map(str::to_string)
        .map_err(|err| DocweaveError::parse(format!("element name is not UTF-8: {err}")))
}

/// Attribute value with entities unescaped where possible; undeclared entities
/// are left as written.
pub fn attribute(e: &BytesStart<'_>, key: &str) -> Option<String> {
    let attr = e.try_get_attribute(key).ok().flatten()?;
    Some(match attr.unescape_value() {
        Ok(value) => value.into_owned(),
        Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_prefers_class_over_name() {
        assert!(TOPIC_BODY.matches("body", None));
        assert!(TOPIC_BODY.matches("conbody", Some("- topic/body concept/conbody ")));
        assert!(!TOPIC_BODY.matches("body", Some("- topic/section ")));
        assert!(!TOPIC_BODY.matches("conbody", None));
    }

    #[test]
    fn generalized_name_from_class() {
        assert_eq!(generalized_name("- map/author "), Some("author"));
        assert_eq!(generalized_name("- topic/keywords mine/kw "), Some("keywords"));
        assert_eq!(generalized_name("nonsense"), None);
        assert_eq!(generalized_name(""), None);
    }

    #[test]
    fn class_token_match_is_exact() {
        assert!(class_names("- topic/data topic/data-about ", "data-about"));
        assert!(!class_names("- topic/data-about ", "data"));
    }

    #[test]
    fn attribute_lookup() {
        let start = BytesStart::from_content(r#"topicref href="a.dita#t1" scope="local""#, 8);
        assert_eq!(element_name(&start).unwrap(), "topicref");
        assert_eq!(attribute(&start, "href").as_deref(), Some("a.dita#t1"));
        assert_eq!(attribute(&start, "format"), None);
    }
}
