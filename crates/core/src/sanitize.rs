//! Text sanitization for TTS input
//!
//! Normalizes script text into a form TTS backends handle well: smart
//! quotes and dashes become plain ASCII, markup tags are stripped, and
//! whitespace is collapsed. Pure function, no I/O.

/// Sanitize one line of script text for synthesis.
pub fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    let mut last_was_space = false;

    for c in text.chars() {
        if in_tag {
            if c == '>' {
                in_tag = false;
            }
            continue;
        }
        let mapped: Option<char> = match c {
            '<' => {
                in_tag = true;
                None
            }
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => Some('\''),
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' => Some('"'),
            '\u{2013}' | '\u{2014}' | '\u{2015}' | '\u{2212}' => Some('-'),
            '\u{2026}' => {
                out.push_str("...");
                last_was_space = false;
                None
            }
            '\u{00A0}' => Some(' '),
            c if c.is_whitespace() => Some(' '),
            c => Some(c),
        };
        if let Some(m) = mapped {
            if m == ' ' {
                if last_was_space {
                    continue;
                }
                last_was_space = true;
            } else {
                last_was_space = false;
            }
            out.push(m);
        }
    }

    out.trim().to_string()
}
