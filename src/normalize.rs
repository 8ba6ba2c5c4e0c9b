//! # Text normalization
//!
//! Cleans extracted text before it is chunked:
//!
//! - whitespace runs inside a paragraph collapse to a single space,
//! - any whitespace run holding two or more newlines becomes exactly one blank line (`"\n\n"`),
//! - NUL and every other non-whitespace control character is dropped, as are byte-order
//!   marks and U+FFFD replacement characters left behind by lossy decoding,
//! - leading and trailing whitespace is trimmed.
//!
//! The output only ever contains `' '` and `"\n\n"` as separators, so normalizing twice
//! is the same as normalizing once.
//!
//! [`normalize_with_offsets`] additionally reports where every raw character landed in the
//! normalized string. Extraction segments are described in raw coordinates; the document
//! processor uses the offset map to project them onto the text the chunker actually sees.
//!
//! ```rust
//! use study_rag::normalize::normalize;
//!
//! let cleaned = normalize("  Cells   divide.\n\n\n\nMitosis\x00 has\n phases. ");
//! assert_eq!(cleaned, "Cells divide.\n\nMitosis has phases.");
//! ```

/// Normalize raw extracted text. Pure and idempotent.
pub fn normalize(raw: &str) -> String {
    normalize_with_offsets(raw).0
}

/// Normalize `raw` and return the char offset map alongside the cleaned text.
///
/// The map has `raw.chars().count() + 1` entries. `map[i]` is the char position in the
/// normalized text at which raw char `i` lands; dropped characters map to the end of the
/// output produced so far. The final entry is the normalized length. The map is non-decreasing, so a raw
/// half-open range `[s, e)` projects to `[map[s], map[e])`.
pub fn normalize_with_offsets(raw: &str) -> (String, Vec<usize>) {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::with_capacity(raw.len());
    let mut out_len = 0usize;
    let mut map = Vec::with_capacity(chars.len() + 1);

    let mut pending_space = false;
    let mut pending_newlines = 0usize;

    for (i, &c) in chars.iter().enumerate() {
        map.push(out_len);

        // "\r\n" counts once; a lone '\r' is a newline.
        let c = if c == '\r' {
            if chars.get(i + 1) == Some(&'\n') {
                continue;
            }
            '\n'
        } else {
            c
        };

        if c.is_whitespace() {
            pending_space = true;
            if c == '\n' {
                pending_newlines += 1;
            }
            continue;
        }

        if is_noise(c) {
            continue;
        }

        if pending_space && out_len > 0 {
            if pending_newlines >= 2 {
                out.push_str("\n\n");
                out_len += 2;
            } else {
                out.push(' ');
                out_len += 1;
            }
        }
        pending_space = false;
        pending_newlines = 0;

        // The separator just emitted belongs before this char, so re-point it.
        if let Some(last) = map.last_mut() {
            *last = out_len;
        }
        out.push(c);
        out_len += 1;
    }

    map.push(out_len);
    (out, map)
}

fn is_noise(c: char) -> bool {
    c.is_control() || c == '\u{feff}' || c == '\u{fffd}'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_inline_whitespace_and_newlines() {
        assert_eq!(normalize("a \t b\nc"), "a b c");
    }

    #[test]
    fn keeps_at_most_one_blank_line_between_paragraphs() {
        assert_eq!(normalize("first\n\n\n\n\nsecond"), "first\n\nsecond");
        assert_eq!(normalize("first\n \t\nsecond"), "first\n\nsecond");
        assert_eq!(normalize("first\r\n\r\nsecond"), "first\n\nsecond");
    }

    #[test]
    fn strips_control_characters_and_decoding_debris() {
        assert_eq!(normalize("\u{feff}nu\x00ll\x07 byte\u{fffd}s"), "null bytes");
    }

    #[test]
    fn trims_both_ends() {
        assert_eq!(normalize("\n\n   body text  \n\n"), "body text");
        assert_eq!(normalize(" \n\t "), "");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn is_idempotent_on_messy_input() {
        let raw = " A  line.\r\nAnother\x0b\n\n\n\nPara\u{a0}two \x00 end.\n";
        let once = normalize(raw);
        assert_eq!(normalize(&once), once);
    }

    #[test]
    fn offset_map_projects_raw_ranges() {
        let raw = "  ab   cd\n\n\nef";
        let (text, map) = normalize_with_offsets(raw);
        assert_eq!(text, "ab cd\n\nef");
        assert_eq!(map.len(), raw.chars().count() + 1);

        // "cd" sits at raw 7..9 and normalized 3..5.
        assert_eq!((map[7], map[9]), (3, 5));
        // "ef" sits at raw 12..14 and normalized 7..9.
        assert_eq!((map[12], map[14]), (7, 9));
        assert_eq!(*map.last().unwrap(), text.chars().count());
        assert!(map.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn handles_multibyte_characters() {
        let (text, map) = normalize_with_offsets("é  ß\n\n\nü");
        assert_eq!(text, "é ß\n\nü");
        assert_eq!(map[3], 2);
        assert_eq!(*map.last().unwrap(), 6);
    }
}
