//! XML 1.0 character classes (§2.2, §2.3).

/// `#x9 | #xA | #xD | [#x20-#xD7FF] | [#xE000-#xFFFD] | [#x10000-#x10FFFF]`
pub(crate) fn is_xml_char(c: char) -> bool {
    matches!(c as u32,
        0x09 | 0x0A | 0x0D | 0x20..=0xD7FF | 0xE000..=0xFFFD | 0x0001_0000..=0x0010_FFFF
    )
}

pub(crate) fn is_name_start_char(c: char) -> bool {
    matches!(c,
        ':' | 'A'..='Z' | '_' | 'a'..='z' |
        '\u{C0}'..='\u{D6}' | '\u{D8}'..='\u{F6}' | '\u{F8}'..='\u{2FF}' |
        '\u{370}'..='\u{37D}' | '\u{37F}'..='\u{1FFF}' |
        '\u{200C}'..='\u{200D}' | '\u{2070}'..='\u{218F}' |
        '\u{2C00}'..='\u{2FEF}' | '\u{3001}'..='\u{D7FF}' |
        '\u{F900}'..='\u{FDCF}' | '\u{FDF0}'..='\u{FFFD}' |
        '\u{10000}'..='\u{EFFFF}'
    )
}

pub(crate) fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || matches!(c,
            '-' | '.' | '0'..='9' | '\u{B7}' |
            '\u{300}'..='\u{36F}' | '\u{203F}'..='\u{2040}'
        )
}

/// `true` if `name` matches the `Name` production.
pub(crate) fn is_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(is_name_start_char) && chars.all(is_name_char)
}

/// The first character of `text` outside the `Char` production.
pub(crate) fn first_invalid_char(text: &str) -> Option<char> {
    text.chars().find(|&c| !is_xml_char(c))
}

/// Checks that every quoted attribute value in a start tag's attribute
/// area is followed by whitespace, `/`, or the end of the tag.
pub(crate) fn attributes_are_separated(raw: &[u8]) -> bool {
    let mut quote = None;
    let mut bytes = raw.iter().copied().peekable();
    while let Some(b) = bytes.next() {
        match quote {
            Some(q) if b == q => {
                quote = None;
                if let Some(&next) = bytes.peek() {
                    if !matches!(next, b' ' | b'\t' | b'\n' | b'\r' | b'/') {
                        return false;
                    }
                }
            }
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None => {}
        }
    }
    true
}
