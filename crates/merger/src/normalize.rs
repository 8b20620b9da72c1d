/// Collapse runs of blank lines into one, drop blank lines at both ends and
/// terminate the text with exactly one newline.
///
/// Whitespace-only lines count as blank and are emptied. This also applies
/// inside multi-line string literals.
pub fn normalize_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 1);
    let mut pending_blank = false;

    for line in text.lines() {
        if line.trim().is_empty() {
            pending_blank = !out.is_empty();
            continue;
        }
        if pending_blank {
            out.push('\n');
            pending_blank = false;
        }
        out.push_str(line);
        out.push('\n');
    }

    if out.is_empty() {
        out.push('\n');
    }
    out
}
