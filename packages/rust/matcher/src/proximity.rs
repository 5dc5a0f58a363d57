//! Proximity matching over the ancestor context (harvest side).
//!
//! A pattern such as `topicref/topicmeta` names a *trigger* element and a
//! set of *terminal* elements. A terminal element activates a capture when
//! the trailing ancestor names line up with the pattern segments; the capture
//! ends when a terminal element closes at the depth it started from.
//!
//! Segment comparison is substring containment (`"topicref".contains(name)`),
//! and the terminal segment is the terminal names joined with trailing
//! spaces. This is looser than set membership and is kept that way on
//! purpose: corpora tuned against this behaviour rely on it.

use std::collections::BTreeSet;

use docweave_shared::{DocweaveError, Result};

/// Parsed trigger/terminal pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    trigger: String,
    terminals: BTreeSet<String>,
    /// `[trigger, "t1 t2 "]`, compared against the trailing ancestors.
    segments: Vec<String>,
}

impl PathPattern {
    /// Parse `trigger/terminal[/terminal...]`.
    pub fn parse(text: &str) -> Result<Self> {
        let mut parts = text.split('/');
        let trigger = parts.next().unwrap_or_default().trim().to_string();
        if trigger.is_empty() {
            return Err(DocweaveError::validation(format!(
                "pattern '{text}' has no trigger element"
            )));
        }

        let terminals: BTreeSet<String> = parts
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        if terminals.is_empty() {
            return Err(DocweaveError::validation(format!(
                "pattern '{text}' has no terminal element"
            )));
        }

        let joined: String = terminals.iter().map(|t| format!("{t} ")).collect();
        Ok(Self {
            segments: vec![trigger.clone(), joined],
            trigger,
            terminals,
        })
    }

    pub fn trigger(&self) -> &str {
        &self.trigger
    }

    pub fn is_trigger(&self, name: &str) -> bool {
        self.trigger == name
    }

    pub fn is_terminal(&self, name: &str) -> bool {
        self.terminals.contains(name)
    }

    /// Pattern depth: how many trailing ancestors are compared.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Does the trailing slice of `ancestors` satisfy every segment?
    pub fn matches_suffix(&self, ancestors: &[String]) -> bool {
        let Some(start) = ancestors.len().checked_sub(self.segments.len()) else {
            return false;
        };
        self.segments
            .iter()
            .zip(&ancestors[start..])
            .all(|(segment, ancestor)| segment.contains(ancestor.as_str()))
    }
}

/// Capture phase of the proximity matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchState {
    Idle,
    /// Inside a capture; `depth` counts elements opened since activation.
    Active { depth: usize },
}

/// Result of feeding one event to the matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Event is outside any capture.
    Outside,
    /// Event opened a capture (and belongs to it).
    Activated,
    /// Event is inside an ongoing capture.
    Inside,
    /// Event closed the capture (and belongs to it).
    Deactivated,
}

impl Transition {
    /// Whether the event that produced this transition is part of a capture.
    pub fn captured(self) -> bool {
        !matches!(self, Transition::Outside)
    }
}

/// Ancestor context plus capture state for one document pass.
#[derive(Debug, Clone)]
pub struct ProximityMatcher {
    pattern: PathPattern,
    ancestors: Vec<String>,
    state: MatchState,
}

impl ProximityMatcher {
    pub fn new(pattern: PathPattern) -> Self {
        Self {
            pattern,
            ancestors: Vec::new(),
            state: MatchState::Idle,
        }
    }

    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    pub fn state(&self) -> MatchState {
        self.state
    }

    /// Ancestor names outside any capture (frozen while capturing).
    pub fn ancestors(&self) -> &[String] {
        &self.ancestors
    }

    /// Forget all context before a new document.
    pub fn reset(&mut self) {
        self.ancestors.clear();
        self.state = MatchState::Idle;
    }

    /// Feed an element start.
    pub fn open(&mut self, name: &str) -> Transition {
        match self.state {
            MatchState::Active { depth } => {
                self.state = MatchState::Active { depth: depth + 1 };
                Transition::Inside
            }
            MatchState::Idle => {
                self.ancestors.push(name.to_string());
                if self.pattern.is_terminal(name) && self.pattern.matches_suffix(&self.ancestors) {
                    self.state = MatchState::Active { depth: 1 };
                    Transition::Activated
                } else {
                    Transition::Outside
                }
            }
        }
    }

    /// Feed an element end.
    pub fn close(&mut self, name: &str) -> Transition {
        match self.state {
            MatchState::Active { depth } => {
                let depth = depth.saturating_sub(1);
                if depth == 0 && self.pattern.is_terminal(name) {
                    self.state = MatchState::Idle;
                    self.ancestors.pop();
                    Transition::Deactivated
                } else {
                    self.state = MatchState::Active { depth };
                    Transition::Inside
                }
            }
            MatchState::Idle => {
                self.ancestors.pop();
                Transition::Outside
            }
        }
    }

    /// Text, CDATA and PIs belong to a capture only while one is active.
    pub fn content(&self) -> Transition {
        match self.state {
            MatchState::Active { .. } => Transition::Inside,
            MatchState::Idle => Transition::Outside,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(text: &str) -> ProximityMatcher {
        ProximityMatcher::new(PathPattern::parse(text).unwrap())
    }

    #[test]
    fn parse_pattern_segments() {
        let p = PathPattern::parse("topicref/topicmeta/keywords").unwrap();
        assert_eq!(p.trigger(), "topicref");
        assert!(p.is_terminal("topicmeta"));
        assert!(p.is_terminal("keywords"));
        assert!(!p.is_terminal("topicref"));
        assert_eq!(p.depth(), 2);
    }

    #[test]
    fn parse_rejects_incomplete_patterns() {
        assert!(PathPattern::parse("").is_err());
        assert!(PathPattern::parse("topicref").is_err());
        assert!(PathPattern::parse("/topicmeta").is_err());
    }

    #[test]
    fn activates_on_terminal_under_trigger() {
        let mut m = matcher("topicref/topicmeta");
        assert_eq!(m.open("map"), Transition::Outside);
        assert_eq!(m.open("topicref"), Transition::Outside);
        assert_eq!(m.open("topicmeta"), Transition::Activated);
        assert_eq!(m.open("keywords"), Transition::Inside);
        assert_eq!(m.content(), Transition::Inside);
        assert_eq!(m.close("keywords"), Transition::Inside);
        assert_eq!(m.close("topicmeta"), Transition::Deactivated);
        assert_eq!(m.ancestors(), ["map", "topicref"]);
        assert_eq!(m.close("topicref"), Transition::Outside);
        assert_eq!(m.ancestors(), ["map"]);
    }

    #[test]
    fn terminal_elsewhere_does_not_activate() {
        let mut m = matcher("topicref/topicmeta");
        m.open("map");
        assert_eq!(m.open("topicmeta"), Transition::Outside);
        assert_eq!(m.state(), MatchState::Idle);
    }

    #[test]
    fn nested_terminal_closes_at_activation_depth() {
        let mut m = matcher("topicref/topicmeta");
        m.open("topicref");
        m.open("topicmeta");
        m.open("topicmeta");
        assert_eq!(m.close("topicmeta"), Transition::Inside);
        assert_eq!(m.close("topicmeta"), Transition::Deactivated);
    }

    #[test]
    fn ancestors_frozen_during_capture() {
        let mut m = matcher("topicref/topicmeta");
        m.open("topicref");
        m.open("topicmeta");
        m.open("a");
        m.open("b");
        assert_eq!(m.ancestors(), ["topicref", "topicmeta"]);
    }

    #[test]
    fn substring_looseness_is_preserved() {
        // "ref" is contained in "topicref", so it satisfies the trigger segment.
        let mut m = matcher("topicref/topicmeta");
        m.open("ref");
        assert_eq!(m.open("topicmeta"), Transition::Activated);
    }

    #[test]
    fn too_shallow_context_never_matches() {
        let mut m = matcher("topicref/topicmeta");
        assert_eq!(m.open("topicmeta"), Transition::Outside);
    }
}
