//! Marker syntax and matching.
//!
//! Markers are written in the document text itself. Block markers
//! (`{#each ...}`, `{/each}`, `{#if ...}`, `{:else}`, `{/if}`) delimit
//! regions of the document; inline markers (`{expr}`, `{#image expr}`) are
//! replaced in place.

use std::sync::LazyLock;

use regex::Regex;

// The regexes are shared so they must stay stateless; offsets returned by
// `find` and friends are byte offsets into the haystack.
static EACH_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{#each\s+([^{}]+?)\s+as\s+([^{}]+?)\s*\}").unwrap());
static IF_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{#if\s+([^{}]+?)\s*\}").unwrap());
static IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{#image\s+([^{}]+?)\s*\}").unwrap());

// A variable must not start with `#` (block or image opening), `/` (block
// closing) or `:` (else), so the patterns never overlap.
static VARIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}#/:][^{}]*)\}").unwrap());

const EACH_CLOSE: &str = "{/each}";
const ELSE: &str = "{:else}";
const IF_CLOSE: &str = "{/if}";

/// A parsed marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Marker {
    EachOpen { iterable: String, binding: String },
    EachClose,
    IfOpen { condition: String },
    Else,
    IfClose,
    Image { expr: String },
    Variable { expr: String },
}

impl Marker {
    /// Block markers delimit regions; inline markers are substituted in
    /// place.
    pub fn is_block(&self) -> bool {
        !matches!(self, Marker::Image { .. } | Marker::Variable { .. })
    }
}

/// A marker found in a string, with its byte span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Found {
    pub start: usize,
    pub end: usize,
    pub marker: Marker,
}

/// Finds all markers in `text`, sorted by position.
pub(crate) fn find_markers(text: &str) -> Vec<Found> {
    let mut found = Vec::new();

    for caps in EACH_OPEN.captures_iter(text) {
        let m = caps.get(0).unwrap();
        found.push(Found {
            start: m.start(),
            end: m.end(),
            marker: Marker::EachOpen {
                iterable: caps[1].trim().to_owned(),
                binding: caps[2].trim().to_owned(),
            },
        });
    }
    for caps in IF_OPEN.captures_iter(text) {
        let m = caps.get(0).unwrap();
        found.push(Found {
            start: m.start(),
            end: m.end(),
            marker: Marker::IfOpen {
                condition: caps[1].trim().to_owned(),
            },
        });
    }
    for caps in IMAGE.captures_iter(text) {
        let m = caps.get(0).unwrap();
        found.push(Found {
            start: m.start(),
            end: m.end(),
            marker: Marker::Image {
                expr: caps[1].trim().to_owned(),
            },
        });
    }
    for caps in VARIABLE.captures_iter(text) {
        let m = caps.get(0).unwrap();
        found.push(Found {
            start: m.start(),
            end: m.end(),
            marker: Marker::Variable {
                expr: caps[1].trim().to_owned(),
            },
        });
    }
    for (literal, marker) in [
        (EACH_CLOSE, Marker::EachClose),
        (ELSE, Marker::Else),
        (IF_CLOSE, Marker::IfClose),
    ] {
        for (start, matched) in text.match_indices(literal) {
            found.push(Found {
                start,
                end: start + matched.len(),
                marker: marker.clone(),
            });
        }
    }

    found.sort_by_key(|f| f.start);
    found
}

/// Finds the inline markers (variables and images) in `text`, sorted by
/// position.
pub(crate) fn find_inline(text: &str) -> Vec<Found> {
    let mut found = find_markers(text);
    found.retain(|f| !f.marker.is_block());
    found
}

/// Finds the earliest block marker in `text`.
pub(crate) fn first_block_marker(text: &str) -> Option<Found> {
    find_markers(text).into_iter().find(|f| f.marker.is_block())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_variable() {
        let found = find_markers("Yo {nom} !");
        assert_eq!(
            found,
            vec![Found {
                start: 3,
                end: 8,
                marker: Marker::Variable {
                    expr: String::from("nom")
                },
            }]
        );
    }

    #[test]
    fn find_each_open_captures() {
        let found = find_markers("{#each données.courses as course}");
        assert_eq!(found.len(), 1);
        assert_eq!(
            found[0].marker,
            Marker::EachOpen {
                iterable: String::from("données.courses"),
                binding: String::from("course"),
            }
        );
    }

    #[test]
    fn find_all_sorted_by_position() {
        let text = "{#if ok}{x}{:else}{y}{/if}";
        let markers: Vec<Marker> = find_markers(text).into_iter().map(|f| f.marker).collect();
        assert_eq!(
            markers,
            vec![
                Marker::IfOpen {
                    condition: String::from("ok")
                },
                Marker::Variable {
                    expr: String::from("x")
                },
                Marker::Else,
                Marker::Variable {
                    expr: String::from("y")
                },
                Marker::IfClose,
            ]
        );
    }

    #[test]
    fn closing_markers_are_not_variables() {
        assert!(find_inline("{/each}{:else}{/if}").is_empty());
    }

    #[test]
    fn image_marker() {
        let found = find_inline("{#image photo}");
        assert_eq!(
            found[0].marker,
            Marker::Image {
                expr: String::from("photo")
            }
        );
    }

    #[test]
    fn first_block_marker_skips_variables() {
        let found = first_block_marker("{x} and {/each}").unwrap();
        assert_eq!(found.marker, Marker::EachClose);
        assert_eq!(found.start, 8);
    }

    #[test]
    fn expression_whitespace_is_trimmed() {
        let found = find_markers("{ nom }");
        assert_eq!(
            found[0].marker,
            Marker::Variable {
                expr: String::from("nom")
            }
        );
    }
}
