//! Vendor-id rewrite rules for the discussion family.
//!
//! A freshly created discussion starts life with a single root note whose id
//! is of the unresolvable "individual note" kind. When the first real reply
//! arrives it carries a new id of the resolvable "discussion" kind, and the
//! cached node's ids must be rewritten to match before the reply attaches.
//! The id encodings are vendor strings (`gid://<vendor>/<Kind>/<number>`),
//! so the rules here are deliberately kept as small pure functions.

/// Kind-path marker for resolvable discussion ids.
const DISCUSSION_KIND: &str = "/Discussion/";

/// Kind-path marker for the placeholder discussion wrapping a lone note.
const INDIVIDUAL_NOTE_DISCUSSION_KIND: &str = "/IndividualNoteDiscussion/";

/// Kind-path marker for a plain note id.
const NOTE_KIND: &str = "/Note/";

/// Kind-path marker for a note promoted into a resolvable discussion.
const DISCUSSION_NOTE_KIND: &str = "/DiscussionNote/";

/// Returns the trailing numeric segment of a kind-prefixed id.
#[must_use]
pub fn trailing_segment(id: &str) -> &str {
    id.rsplit('/').next().unwrap_or(id)
}

/// Whether the id carries the resolvable "discussion" kind.
#[must_use]
pub fn is_discussion_id(id: &str) -> bool {
    id.contains(DISCUSSION_KIND)
}

/// Whether the id carries the placeholder "individual note discussion" kind.
#[must_use]
pub fn is_individual_note_discussion_id(id: &str) -> bool {
    id.contains(INDIVIDUAL_NOTE_DISCUSSION_KIND)
}

/// Rewrites a plain note id into its resolvable discussion-note form.
#[must_use]
pub fn promote_note_id(id: &str) -> String {
    id.replace(NOTE_KIND, DISCUSSION_NOTE_KIND)
}

/// Whether a placeholder discussion id and a resolvable discussion id refer
/// to the same thread (their trailing segments match).
#[must_use]
pub fn same_thread(placeholder_id: &str, discussion_id: &str) -> bool {
    is_individual_note_discussion_id(placeholder_id)
        && trailing_segment(placeholder_id) == trailing_segment(discussion_id)
}
