//! Ordered path classification table.
//!
//! Each rule is a segment pattern matched against the leading segments of
//! the path relative to the town root. The first matching rule wins, so
//! more specific layouts (`deacon/dogs/boot`) sit above their parents.

use crate::models::Role;

/// One segment of a rule pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    /// Segment must equal this text.
    Literal(&'static str),
    /// Any segment; captured as the rig name.
    Rig,
    /// Any segment; captured as the worker name.
    Worker,
}

/// How a rule's pattern must cover the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extent {
    /// Path has exactly the pattern's segments.
    Exact,
    /// Pattern matches the leading segments; anything may follow.
    Prefix,
}

/// Pattern mapped to a role.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    /// Segment pattern.
    pub pattern: &'static [Segment],
    /// Required coverage of the path.
    pub extent: Extent,
    /// Role assigned on match.
    pub role: Role,
}

use Segment::{Literal, Rig, Worker};

/// Classification rules in priority order.
pub const RULES: &[Rule] = &[
    Rule {
        pattern: &[],
        extent: Extent::Exact,
        role: Role::Mayor,
    },
    Rule {
        pattern: &[Literal("mayor")],
        extent: Extent::Prefix,
        role: Role::Mayor,
    },
    Rule {
        pattern: &[Literal("deacon"), Literal("dogs"), Literal("boot")],
        extent: Extent::Prefix,
        role: Role::Boot,
    },
    Rule {
        pattern: &[Literal("deacon")],
        extent: Extent::Prefix,
        role: Role::Deacon,
    },
    Rule {
        pattern: &[Rig, Literal("mayor")],
        extent: Extent::Prefix,
        role: Role::Mayor,
    },
    Rule {
        pattern: &[Rig, Literal("witness")],
        extent: Extent::Prefix,
        role: Role::Witness,
    },
    Rule {
        pattern: &[Rig, Literal("refinery")],
        extent: Extent::Prefix,
        role: Role::Refinery,
    },
    Rule {
        pattern: &[Rig, Literal("polecats"), Worker],
        extent: Extent::Prefix,
        role: Role::Polecat,
    },
    Rule {
        pattern: &[Rig, Literal("crew"), Worker],
        extent: Extent::Prefix,
        role: Role::Crew,
    },
];

/// Outcome of classifying a relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMatch {
    /// Matched role, or [`Role::Unknown`].
    pub role: Role,
    /// Rig segment, when the layout has one.
    pub rig: Option<String>,
    /// Worker segment for polecat and crew layouts.
    pub worker: Option<String>,
}

impl PathMatch {
    fn unknown(rig: Option<String>) -> Self {
        Self {
            role: Role::Unknown,
            rig,
            worker: None,
        }
    }
}

impl Rule {
    fn apply(&self, segments: &[&str]) -> Option<PathMatch> {
        let fits = match self.extent {
            Extent::Exact => segments.len() == self.pattern.len(),
            Extent::Prefix => segments.len() >= self.pattern.len(),
        };
        if !fits {
            return None;
        }

        let mut rig = None;
        let mut worker = None;
        for (segment, part) in self.pattern.iter().zip(segments) {
            match segment {
                Literal(text) if part == text => {}
                Literal(_) => return None,
                Rig => rig = Some((*part).to_owned()),
                Worker => worker = Some((*part).to_owned()),
            }
        }

        Some(PathMatch {
            role: self.role,
            rig,
            worker,
        })
    }
}

/// Classify a relative path given as segments. Empty means the town root.
#[must_use]
pub fn classify(segments: &[&str]) -> PathMatch {
    RULES
        .iter()
        .find_map(|rule| rule.apply(segments))
        .unwrap_or_else(|| PathMatch::unknown(segments.first().map(|s| (*s).to_owned())))
}
