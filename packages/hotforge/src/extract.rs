//! Lexical reference extraction.
//!
//! Deliberately over-approximates: the scan recognizes reference
//! statements textually and never resolves language semantics. A false
//! positive costs one redundant recompile; a false negative would leave a
//! stale artifact live, so every reference form that resolves to an
//! existing source must be reported.

use lazy_static::lazy_static;
use regex::Regex;

use crate::source::{group_of, SourceLocator};

lazy_static! {
    /// Direct and wildcard reference form, e.g. `import pkg.Name;` or
    /// `import pkg.*;`.
    static ref DIRECT_REF: Regex = Regex::new(r"(?i)import (.+?);").unwrap();

    /// Qualified member form, e.g. `import static pkg.Name.member;`.
    /// The capture is the owning unit.
    static ref STATIC_REF: Regex = Regex::new(r"(?i)import static (.+)\..+?;").unwrap();
}

/// Units referenced by one unit's source text.
///
/// Includes direct references whose source exists, every member of a
/// wildcard-referenced group that exists on disk, the unit named by a
/// qualified member reference, and every unit residing in `unit`'s own
/// group (implicit same-group visibility). References into groups that
/// only materialize at runtime resolve to nothing and are not tracked.
///
/// The result may contain duplicates and `unit` itself; edge recording
/// dedups and drops self references.
pub fn referenced_units(unit: &str, source: &str, locator: &dyn SourceLocator) -> Vec<String> {
    let mut refs = Vec::new();

    for caps in DIRECT_REF.captures_iter(source) {
        let name = &caps[1];
        if let Some(group) = name.strip_suffix(".*") {
            if locator.group_exists(group) {
                refs.extend(locator.units_in_group(group));
            }
        } else if locator.exists(name) {
            refs.push(name.to_string());
        }
    }

    for caps in STATIC_REF.captures_iter(source) {
        let name = &caps[1];
        if locator.exists(name) {
            refs.push(name.to_string());
        }
    }

    refs.extend(locator.units_in_group(group_of(unit)));
    refs
}
