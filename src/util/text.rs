use std::borrow::Cow;

/// Flattens feed-supplied text to a single terminal-safe line.
///
/// ANSI CSI (`ESC [ ... final`) and OSC (`ESC ] ... BEL|ST`) sequences are
/// removed entirely. Other control characters are dropped, except tab,
/// newline and carriage return, which become a single space. Runs of
/// whitespace are collapsed and the result is trimmed.
///
/// Returns `Cow::Borrowed` when nothing needs changing.
pub fn single_line(s: &str) -> Cow<'_, str> {
    let clean = !s.chars().any(char::is_control)
        && !s.contains("  ")
        && s.trim().len() == s.len();
    if clean {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    let mut pending_space = false;

    while let Some(c) = chars.next() {
        match c {
            '\u{1b}' => match chars.peek() {
                Some('[') => {
                    chars.next();
                    // Parameter bytes until the final byte 0x40..=0x7e
                    for c in chars.by_ref() {
                        if ('\u{40}'..='\u{7e}').contains(&c) {
                            break;
                        }
                    }
                }
                Some(']') => {
                    chars.next();
                    while let Some(c) = chars.next() {
                        if c == '\u{07}' {
                            break;
                        }
                        if c == '\u{1b}' && chars.peek() == Some(&'\\') {
                            chars.next();
                            break;
                        }
                    }
                }
                _ => {}
            },
            c if c.is_whitespace() => pending_space = true,
            c if c.is_control() => {}
            c => {
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                out.push(c);
            }
        }
    }

    Cow::Owned(out)
}
