//! Removal of markdown code fences around model output.

/// Fence delimiter.
const FENCE: &str = "```";

/// Strips one opening fence line (with any language tag) and one closing
/// fence line from `text`, then trims it.
///
/// Text without fences comes back trimmed and otherwise unchanged. Fences in
/// the middle of the text are left alone. A single-line
/// ```` ```json {"a": 1}``` ```` is unwrapped too.
pub fn strip_fences(text: &str) -> &str {
    let mut body = text.trim();

    if !body.contains('\n') {
        return strip_inline(body);
    }

    if body.starts_with(FENCE) {
        body = body.split_once('\n').map_or("", |(_, rest)| rest);
    }

    match body.rsplit_once('\n') {
        Some((head, last)) if last.trim() == FENCE => body = head,
        None if body.trim() == FENCE => body = "",
        _ => {}
    }

    body.trim()
}

/// Language tags recognised at the start of a one-line fence.
const LANGUAGE_TAGS: &[&str] = &[
    "json", "python", "python3", "py", "sh", "bash", "shell", "text", "txt",
];

/// Length of a language tag at the start of an inline fence body, or 0 when
/// the first word is code rather than a tag.
fn tag_len(inner: &str) -> usize {
    let end = inner
        .find(|ch: char| !(ch.is_ascii_alphanumeric() || matches!(ch, '_' | '+' | '-')))
        .unwrap_or(inner.len());
    let word = &inner[..end];
    let rest = &inner[end..];

    let known = LANGUAGE_TAGS.iter().any(|tag| tag.eq_ignore_ascii_case(word));
    let ends_at_content =
        rest.is_empty() || rest.starts_with(char::is_whitespace) || rest.starts_with(['{', '[']);
    if known && ends_at_content {
        end
    } else {
        0
    }
}

fn strip_inline(line: &str) -> &str {
    let Some(inner) = line.strip_prefix(FENCE) else {
        return line;
    };
    let inner = inner.strip_suffix(FENCE).unwrap_or(inner);
    inner[tag_len(inner)..].trim()
}
