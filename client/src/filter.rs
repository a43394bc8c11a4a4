//! Substitution-aware word masking.
//!
//! Each blocked word compiles to one case-insensitive regex whose letters
//! also accept common look-alike characters (`a` matches `@` and `4`, `s`
//! matches `$` and `5`, and so on). A match is replaced by one `*` per
//! matched character.
//!
//! A match must sit between non-word characters or the ends of the text.
//! `\b` is not enough here: look-alikes such as `@` and `$` are not word
//! characters themselves, so `@ss` has no word boundary before the `@`.
//!
//! This is a courtesy filter, not a moderation boundary.

use regex::{Captures, Regex};
use tracing::warn;

/// Look-alike characters accepted for a letter.
const SUBSTITUTIONS: &[(char, &str)] = &[
    ('a', "[a@4]"),
    ('i', "[i1!]"),
    ('o', "[o0]"),
    ('e', "[e3]"),
    ('s', "[s$5]"),
    ('t', "[t7]"),
    ('l', "[l1]"),
];

#[derive(Debug, Clone, Default)]
pub struct ContentFilter {
    patterns: Vec<Regex>,
}

impl ContentFilter {
    /// Compile a filter from a blocked-word list. Blank entries are skipped;
    /// an entry that fails to compile is logged and skipped.
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut patterns = Vec::new();
        for word in words {
            let word = word.as_ref().trim();
            if word.is_empty() {
                continue;
            }
            match Regex::new(&word_pattern(word)) {
                Ok(re) => patterns.push(re),
                Err(e) => warn!(word, error = %e, "filter: skipping blocked word"),
            }
        }
        Self { patterns }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Mask every blocked word in `text`. Returns the new text and whether
    /// anything was replaced.
    #[must_use]
    pub fn apply(&self, text: &str) -> (String, bool) {
        let mut out = text.to_owned();
        let mut changed = false;
        for re in &self.patterns {
            // The edge groups consume their separator, so `bad bad` needs a
            // second pass for the occurrence that shares it.
            while re.is_match(&out) {
                let next = re.replace_all(&out, mask).into_owned();
                if next == out {
                    break;
                }
                out = next;
                changed = true;
            }
        }
        (out, changed)
    }
}

fn word_pattern(word: &str) -> String {
    let mut body = String::new();
    for c in word.to_lowercase().chars() {
        match SUBSTITUTIONS.iter().find(|(letter, _)| *letter == c) {
            Some((_, class)) => body.push_str(class),
            None => body.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    format!(r"(?i)(^|\W)({body})(\W|$)")
}

fn mask(caps: &Captures<'_>) -> String {
    format!("{}{}{}", &caps[1], "*".repeat(caps[2].chars().count()), &caps[3])
}

#[cfg(test)]
#[path = "filter_test.rs"]
mod tests;
