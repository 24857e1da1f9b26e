//! Route classification for step pages
//!
//! Each step has one canonical route plus deprecated aliases that older links
//! and bookmarks still use. Both resolve to the same step.

use crate::step::StepKey;

/// Deprecated routes that still resolve to a step.
pub const ROUTE_ALIASES: &[(StepKey, &str)] = &[
    (StepKey::Naming, "/nameconsulting"),
    (StepKey::Naming, "/namingconsulting"),
    (StepKey::Naming, "/brand/naming"),
    (StepKey::Concept, "/conceptconsulting"),
    (StepKey::Concept, "/homepageconsulting"),
    (StepKey::Concept, "/brand/concept"),
    (StepKey::Story, "/brandstoryconsulting"),
    (StepKey::Story, "/storyconsulting"),
    (StepKey::Story, "/brand/story/interview"),
    (StepKey::Logo, "/logoconsulting"),
    (StepKey::Logo, "/brand/logo"),
];

/// Strip query string, fragment and trailing slashes, and lowercase the path.
pub fn normalize_route(path: &str) -> String {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let trimmed = path[..end].trim().trim_end_matches('/');
    let lowered = trimmed.to_ascii_lowercase();
    if lowered.is_empty() {
        "/".to_string()
    } else if lowered.starts_with('/') {
        lowered
    } else {
        format!("/{}", lowered)
    }
}

/// Resolve a path to the step whose page it renders.
///
/// Sub-paths of a step route (e.g. `/brand/logo/interview/result`) belong to that step.
/// The longest matching pattern wins so `/brand/story/interview` is not shadowed by
/// `/brand/story`.
pub fn step_for_route(path: &str) -> Option<StepKey> {
    let path = normalize_route(path);
    StepKey::ORDER
        .iter()
        .map(|step| (*step, step.route()))
        .chain(ROUTE_ALIASES.iter().copied())
        .filter(|(_, pattern)| matches_prefix(&path, pattern))
        .max_by_key(|(_, pattern)| pattern.len())
        .map(|(step, _)| step)
}

fn matches_prefix(path: &str, pattern: &str) -> bool {
    path == pattern
        || path
            .strip_prefix(pattern)
            .is_some_and(|rest| rest.starts_with('/'))
}
