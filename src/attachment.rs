//! Signed attachment references embedded in entity bodies.
//!
//! The file store serves attachments through time-limited signed URLs: a
//! reference looks like `https://files.example.com/ws/sig=<token>/notes/a.png`,
//! where the token is re-minted on every read and everything after the token
//! segment is the stable path of the underlying resource.
//!
//! Because the token rotates per fetch, two reads of an unchanged body
//! differ byte-for-byte. [`stabilize_body`] substitutes previously-seen
//! reference text wherever the stable path matches, so an unchanged
//! attachment keeps its old reference and value comparison stays meaningful.

use std::collections::HashMap;

/// Marker that introduces the signature segment of a reference.
pub const DEFAULT_SIGNATURE_MARKER: &str = "/sig=";

/// Characters that end a reference token when scanning free text or HTML.
const BOUNDARY_CHARS: [char; 7] = ['"', '\'', '<', '>', '(', ')', '`'];

fn is_boundary(ch: char) -> bool {
    ch.is_whitespace() || BOUNDARY_CHARS.contains(&ch)
}

/// A signed reference found in a body, with its stable resource path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRef<'a> {
    /// Byte range of the full reference text within the body.
    pub start: usize,
    pub end: usize,
    /// The reference text itself, signature included.
    pub text: &'a str,
    /// Resource path after the signature segment; survives token rotation.
    pub stable_path: &'a str,
}

/// Scan a body for signed references.
///
/// A reference is the maximal run of non-boundary characters around an
/// occurrence of `marker`. Occurrences whose signature segment is not
/// followed by a path are ignored.
pub fn extract_refs<'a>(body: &'a str, marker: &str) -> Vec<SignedRef<'a>> {
    let mut refs = Vec::new();
    if marker.is_empty() {
        return refs;
    }

    let mut search_from = 0;
    while let Some(found) = body[search_from..].find(marker) {
        let marker_at = search_from + found;

        // Expand left to the start of the token.
        let start = body[..marker_at]
            .rfind(is_boundary)
            .map(|idx| idx + body[idx..].chars().next().map_or(1, char::len_utf8))
            .unwrap_or(0);

        // Expand right to the end of the token.
        let end = body[marker_at..]
            .find(is_boundary)
            .map(|idx| marker_at + idx)
            .unwrap_or(body.len());

        let text = &body[start..end];
        let after_marker = marker_at + marker.len();

        // The stable path begins after the '/' that closes the token.
        if let Some(slash) = body[after_marker.min(end)..end].find('/') {
            let path_start = after_marker + slash + 1;
            if path_start < end {
                refs.push(SignedRef {
                    start,
                    end,
                    text,
                    stable_path: &body[path_start..end],
                });
            }
        }

        search_from = end.max(after_marker);
    }
    refs
}

/// Substitute old reference text into `new_body` wherever the stable path
/// matches a reference in `old_body`.
///
/// References whose stable path did not appear in the old body are kept as
/// sent; only re-signed copies of already-known resources are rewritten.
pub fn stabilize_body(old_body: &str, new_body: &str, marker: &str) -> String {
    let old_refs = extract_refs(old_body, marker);
    if old_refs.is_empty() {
        return new_body.to_string();
    }

    let by_path: HashMap<&str, &str> = old_refs
        .iter()
        .map(|reference| (reference.stable_path, reference.text))
        .collect();

    let mut result = String::with_capacity(new_body.len());
    let mut cursor = 0;
    for reference in extract_refs(new_body, marker) {
        result.push_str(&new_body[cursor..reference.start]);
        match by_path.get(reference.stable_path) {
            Some(old_text) => result.push_str(old_text),
            None => result.push_str(reference.text),
        }
        cursor = reference.end;
    }
    result.push_str(&new_body[cursor..]);
    result
}
