//! The protected payload: one line from a fixed list.

use rand_core::{OsRng, RngCore};

/// Lines served to holders of a valid session token.
pub const FACTS: &[&str] = &[
    "Beautiful is better than ugly.",
    "Explicit is better than implicit.",
    "Simple is better than complex.",
    "Complex is better than complicated.",
    "Flat is better than nested.",
    "Sparse is better than dense.",
    "Readability counts.",
    "Special cases aren't special enough to break the rules.",
    "Although practicality beats purity.",
    "Errors should never pass silently.",
    "Unless explicitly silenced.",
    "In the face of ambiguity, refuse the temptation to guess.",
    "There should be one-- and preferably only one --obvious way to do it.",
    "Now is better than never.",
    "Although never is often better than *right* now.",
    "If the implementation is hard to explain, it's a bad idea.",
    "If the implementation is easy to explain, it may be a good idea.",
];

/// Picks a line uniformly enough for a demo payload.
#[must_use]
pub fn random_fact() -> &'static str {
    let index = OsRng.next_u32() as usize % FACTS.len();
    FACTS[index]
}
