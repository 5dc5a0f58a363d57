//! Identity-path matching (rewrite side).
//!
//! Every open element contributes its `id` (or [`NULL_ID`]) to the identity
//! path. Once the path is at least as long as the target, its trailing slice
//! is compared for exact equality; a match arms injection for the rest of the
//! document.

/// Stand-in for elements without an `id`.
pub const NULL_ID: &str = "null";

/// Wrapper element that never contributes to the identity path.
const WRAPPER_ELEMENT: &str = "dita";

#[derive(Debug, Clone)]
pub struct IdentityMatcher {
    target: Option<Vec<String>>,
    path: Vec<String>,
    armed: bool,
}

impl IdentityMatcher {
    /// `None` arms on the first non-wrapper element.
    pub fn new(target: Option<Vec<String>>) -> Self {
        Self {
            target: target.filter(|t| !t.is_empty()),
            path: Vec::new(),
            armed: false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Feed an element start. Returns `true` if this element armed the scope.
    pub fn open(&mut self, name: &str, id: Option<&str>) -> bool {
        if self.armed || is_wrapper(name) {
            return false;
        }
        self.path.push(id.unwrap_or(NULL_ID).to_string());
        self.armed = match &self.target {
            None => true,
            Some(target) => suffix_equals(&self.path, target),
        };
        self.armed
    }

    /// Feed an element end.
    pub fn close(&mut self, name: &str) {
        if !self.armed && !is_wrapper(name) {
            self.path.pop();
        }
    }
}

fn is_wrapper(name: &str) -> bool {
    name.eq_ignore_ascii_case(WRAPPER_ELEMENT)
}

/// Exact equality of the trailing slice of `path` with `target`.
pub fn suffix_equals(path: &[String], target: &[String]) -> bool {
    path.len() >= target.len() && path[path.len() - target.len()..] == *target
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(ids: &[&str]) -> Option<Vec<String>> {
        Some(ids.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn unscoped_arms_on_first_element() {
        let mut m = IdentityMatcher::new(None);
        assert!(!m.open("dita", None));
        assert!(m.open("topic", Some("t1")));
        assert!(m.is_armed());
    }

    #[test]
    fn arms_on_matching_id() {
        let mut m = IdentityMatcher::new(target(&["t2"]));
        m.open("dita", None);
        assert!(!m.open("topic", Some("t1")));
        m.close("topic");
        assert!(m.open("topic", Some("t2")));
    }

    #[test]
    fn nested_id_path() {
        let mut m = IdentityMatcher::new(target(&["outer", "inner"]));
        assert!(!m.open("topic", Some("inner")));
        m.close("topic");
        assert!(!m.open("topic", Some("outer")));
        assert!(!m.open("title", None));
        m.close("title");
        assert!(m.open("topic", Some("inner")));
        assert_eq!(m.path(), ["outer", "inner"]);
    }

    #[test]
    fn stays_armed_after_scope_closes() {
        let mut m = IdentityMatcher::new(target(&["t1"]));
        m.open("topic", Some("t1"));
        m.close("topic");
        assert!(m.is_armed());
        assert!(!m.open("topic", Some("t2")));
        assert!(m.is_armed());
    }

    #[test]
    fn missing_ids_use_sentinel() {
        let mut m = IdentityMatcher::new(target(&["null", "t1"]));
        m.open("map", None);
        assert!(m.open("topic", Some("t1")));
    }

    #[test]
    fn empty_target_behaves_as_unscoped() {
        let mut m = IdentityMatcher::new(Some(vec![]));
        assert!(m.open("topic", None));
    }
}
