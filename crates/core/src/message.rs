//! Commit message synthesis and formatting.

use std::collections::BTreeMap;

use crate::config::CommitFormatConfig;
use crate::models::{ChangeKind, Changeset, FileChange};

/// Placeholder that the template must contain.
pub const MESSAGE_PLACEHOLDER: &str = "{message}";

/// Derive a non-empty commit message for a changeset.
///
/// A comment that is non-empty after trimming is returned verbatim.
/// Otherwise the changes are tallied per kind (Added, Changed, Deleted,
/// Moved) into e.g. `Add 3 file(s), Delete 1 file(s)`, and a changeset with
/// nothing at all becomes `Update (changeset <id>)`.
pub fn synthesize_message(changeset_id: i64, comment: &str, changes: &[FileChange]) -> String {
    if !comment.trim().is_empty() {
        return comment.to_string();
    }

    let mut tally: BTreeMap<ChangeKind, usize> = BTreeMap::new();
    for change in changes {
        *tally.entry(change.kind).or_default() += 1;
    }

    if tally.is_empty() {
        return format!("Update (changeset {})", changeset_id);
    }

    ChangeKind::ALL
        .iter()
        .filter_map(|kind| {
            tally
                .get(kind)
                .map(|count| format!("{} {} file(s)", kind.verb(), count))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Applies the configured commit-message template.
pub struct CommitFormatter {
    template: String,
}

impl CommitFormatter {
    pub fn new(config: &CommitFormatConfig) -> Self {
        Self {
            template: config.template.clone(),
        }
    }

    /// Synthesize the message for `changeset` and render it through the
    /// template.
    ///
    /// Placeholders: `{message}`, `{changeset}`, `{branch}`, `{owner}`,
    /// `{date}`.
    pub fn format(&self, changeset: &Changeset) -> String {
        let message = synthesize_message(changeset.id, &changeset.comment, &changeset.changes);
        if self.template == MESSAGE_PLACEHOLDER {
            return message;
        }
        // {message} last, so placeholders inside the comment stay literal.
        self.template
            .replace("{changeset}", &changeset.id.to_string())
            .replace("{branch}", &changeset.branch)
            .replace("{owner}", &changeset.owner)
            .replace("{date}", &changeset.timestamp)
            .replace(MESSAGE_PLACEHOLDER, &message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changes(added: usize, changed: usize, deleted: usize, moved: usize) -> Vec<FileChange> {
        let mut out = Vec::new();
        out.extend((0..moved).map(|i| FileChange::moved(format!("/m{}", i), format!("/n{}", i))));
        out.extend((0..deleted).map(|i| FileChange::deleted(format!("/d{}", i))));
        out.extend((0..changed).map(|i| FileChange::changed(format!("/c{}", i))));
        out.extend((0..added).map(|i| FileChange::added(format!("/a{}", i))));
        out
    }

    #[test]
    fn test_comment_returned_verbatim() {
        let msg = synthesize_message(1, "  Fix \"parser\" $HOME\n", &changes(2, 0, 0, 0));
        assert_eq!(msg, "  Fix \"parser\" $HOME\n");
    }

    #[test]
    fn test_tally_added_and_deleted() {
        assert_eq!(
            synthesize_message(7, "", &changes(3, 0, 1, 0)),
            "Add 3 file(s), Delete 1 file(s)"
        );
    }

    #[test]
    fn test_tally_order_is_fixed() {
        // Input order is moved, deleted, changed, added; output order is not.
        assert_eq!(
            synthesize_message(7, "   ", &changes(1, 2, 3, 4)),
            "Add 1 file(s), Update 2 file(s), Delete 3 file(s), Move 4 file(s)"
        );
    }

    #[test]
    fn test_fallback_message() {
        assert_eq!(synthesize_message(42, "", &[]), "Update (changeset 42)");
        assert_eq!(synthesize_message(42, " \t\n", &[]), "Update (changeset 42)");
    }

    #[test]
    fn test_deterministic() {
        let input = changes(2, 1, 0, 1);
        let a = synthesize_message(5, "", &input);
        let b = synthesize_message(5, "", &input);
        assert_eq!(a, b);
    }

    fn changeset(comment: &str) -> Changeset {
        Changeset {
            id: 12,
            branch: "/main/feature-x".into(),
            comment: comment.into(),
            owner: "bob".into(),
            timestamp: "2024-03-15T10:23:45+01:00".into(),
            changes: changes(1, 0, 0, 0),
        }
    }

    #[test]
    fn test_default_template_is_identity() {
        let fmt = CommitFormatter::new(&CommitFormatConfig::default());
        assert_eq!(fmt.format(&changeset("Hello")), "Hello");
        assert_eq!(fmt.format(&changeset("")), "Add 1 file(s)");
    }

    #[test]
    fn test_custom_template() {
        let config = CommitFormatConfig {
            template: "{message}\n\nPlastic-Changeset: cs:{changeset}\nPlastic-Branch: {branch}\nPlastic-Owner: {owner}".into(),
        };
        let fmt = CommitFormatter::new(&config);
        assert_eq!(
            fmt.format(&changeset("Hello")),
            "Hello\n\nPlastic-Changeset: cs:12\nPlastic-Branch: /main/feature-x\nPlastic-Owner: bob"
        );
    }

    #[test]
    fn test_placeholders_in_comment_stay_literal() {
        let config = CommitFormatConfig {
            template: "{message} (cs:{changeset})".into(),
        };
        let fmt = CommitFormatter::new(&config);
        assert_eq!(fmt.format(&changeset("use {owner}")), "use {owner} (cs:12)");
    }
}
