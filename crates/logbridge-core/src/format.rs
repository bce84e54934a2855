//! Human-readable rendering of entries

use crate::types::Entry;

/// Render an entry as `{tag} [{session}] {LEVEL}: {text} ({source})`, with
/// any stack text indented on the following lines.
pub fn render_entry(entry: &Entry) -> String {
    let mut line = String::new();

    if let Some(tag) = &entry.tag {
        line.push_str(tag);
        line.push(' ');
    }

    line.push_str(&format!(
        "[{}] {}: {}",
        entry.session_prefix(),
        entry.level.label(),
        entry.text
    ));

    if let Some(source) = &entry.source {
        line.push_str(&format!(" ({})", source));
    }

    if let Some(stack) = &entry.stack {
        for frame in stack.lines().filter(|l| !l.trim().is_empty()) {
            line.push_str("\n    ");
            line.push_str(frame.trim());
        }
    }

    line
}
