//! # Slugs
//!
//! URL identifiers derived from store names.
//!
//! Collisions are resolved with a numeric suffix: `oysters`, `oysters-2`,
//! `oysters-3` and so on. The suffix is one more than the number of existing
//! slugs in the family, bumped further if that candidate is already taken
//! (a family with a gap, e.g. after a rename, would otherwise collide).
//!
//! A renamed store never collides with its own slug: if the new name lands in
//! the family it already belongs to, the slug stays put.
use std::sync::LazyLock;

use regex::Regex;

pub const FALLBACK_SLUG: &str = "store";

static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}]+").expect("separator pattern compiles"));

pub fn slugify(name: &str) -> String {
    let lowered = name.to_lowercase();
    let slug = SEPARATORS.replace_all(&lowered, "-");
    let slug = slug.trim_matches('-');

    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug.to_string()
    }
}

/// Whether `candidate` is `base` itself or `base-<digits>`, ignoring case.
pub fn in_family(base: &str, candidate: &str) -> bool {
    let base = base.to_lowercase();
    let candidate = candidate.to_lowercase();

    match candidate.strip_prefix(&base) {
        Some("") => true,
        Some(rest) => rest
            .strip_prefix('-')
            .is_some_and(|digits| digits.chars().all(|c| c.is_ascii_digit())),
        None => false,
    }
}

pub fn unique_slug<S: AsRef<str>>(base: &str, existing: &[S]) -> String {
    let family = existing
        .iter()
        .filter(|slug| in_family(base, slug.as_ref()))
        .count();

    if family == 0 {
        return base.to_string();
    }

    let taken = |candidate: &str| {
        existing
            .iter()
            .any(|slug| slug.as_ref().eq_ignore_ascii_case(candidate))
    };

    let mut suffix = family + 1;
    let mut candidate = format!("{base}-{suffix}");
    while taken(&candidate) {
        suffix += 1;
        candidate = format!("{base}-{suffix}");
    }

    candidate
}

/// Slug for a store currently at `current` whose name now slugifies to `base`.
pub fn reslug<S: AsRef<str>>(base: &str, current: &str, existing: &[S]) -> String {
    if in_family(base, current) {
        return current.to_string();
    }

    let others: Vec<&str> = existing
        .iter()
        .map(AsRef::as_ref)
        .filter(|slug| !slug.eq_ignore_ascii_case(current))
        .collect();

    unique_slug(base, &others)
}
