//! Canonical keys for decoded symbol payloads.
//!
//! Decoders routinely emit trailing control bytes or embedded line breaks
//! that are invisible on screen but byte-distinct. Everything downstream
//! keys sessions by the normalized form, so two payloads that differ only
//! by such characters are the same code.

/// Strips every Unicode category-C character (control, format, private-use)
/// from `raw`, including `\n` and `\r`. Pure and total.
pub fn normalize(raw: &str) -> String {
    raw.chars().filter(|c| !is_other_category(*c)).collect()
}

/// Membership in the Unicode "Other" categories we strip: Cc via
/// `char::is_control`, Cf and Co by range. Cs cannot occur in a `char`;
/// Cn (unassigned) is deliberately left alone.
fn is_other_category(c: char) -> bool {
    if c.is_control() {
        return true;
    }

    matches!(
        c,
        // Cf: format characters
        '\u{00AD}'
            | '\u{0600}'..='\u{0605}'
            | '\u{061C}'
            | '\u{06DD}'
            | '\u{070F}'
            | '\u{08E2}'
            | '\u{180E}'
            | '\u{200B}'..='\u{200F}'
            | '\u{202A}'..='\u{202E}'
            | '\u{2060}'..='\u{2064}'
            | '\u{2066}'..='\u{206F}'
            | '\u{FEFF}'
            | '\u{FFF9}'..='\u{FFFB}'
            | '\u{110BD}'
            | '\u{110CD}'
            | '\u{1BCA0}'..='\u{1BCA3}'
            | '\u{1D173}'..='\u{1D17A}'
            | '\u{E0001}'
            | '\u{E0020}'..='\u{E007F}'
            // Co: private use
            | '\u{E000}'..='\u{F8FF}'
            | '\u{F0000}'..='\u{FFFFD}'
            | '\u{100000}'..='\u{10FFFD}'
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_newlines_and_carriage_returns() {
        assert_eq!(normalize("ABC-123\n"), "ABC-123");
        assert_eq!(normalize("ABC\r\n-123"), "ABC-123");
    }

    #[test]
    fn variants_differing_only_by_control_chars_collapse() {
        let plain = "item/42";
        let noisy = "item\u{0000}/4\u{200B}2\r";
        assert_eq!(normalize(plain), normalize(noisy));
    }

    #[test]
    fn strips_format_and_private_use_characters() {
        assert_eq!(normalize("\u{FEFF}code\u{00AD}1\u{E000}"), "code1");
    }

    #[test]
    fn leaves_printable_text_untouched() {
        assert_eq!(normalize("Ärmel Größe 42 — ок"), "Ärmel Größe 42 — ок");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn whitespace_other_than_line_breaks_survives() {
        // Tabs are Cc and go; plain spaces stay.
        assert_eq!(normalize("a b\tc"), "a bc");
    }
}
