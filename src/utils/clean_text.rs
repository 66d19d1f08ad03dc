/// Strips decorative symbols, emoji and control characters from `text`.
///
/// The transform works line by line: the text is split on `\n`, every line
/// is stripped and trimmed, and the lines are joined back with `\n`, so the
/// number of lines never changes. Both keyword filtering and text replacement
/// match against this cleaned form, which lets a keyword surrounded by emoji
/// still match.
pub fn clean_text(text: &str) -> String {
    text.split('\n')
        .map(clean_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn clean_line(line: &str) -> String {
    let kept: String = line.chars().filter(|c| is_kept(*c)).collect();
    kept.trim().to_string()
}

fn is_kept(c: char) -> bool {
    match c {
        ' '..='~' | '\t' => true,
        _ if c.is_control() => false,
        _ if is_emoji(c) || is_invisible(c) => false,
        _ => c.is_alphanumeric() || is_combining_mark(c) || is_text_punctuation(c) || c.is_whitespace(),
    }
}

fn is_emoji(c: char) -> bool {
    matches!(c as u32,
        0x1F000..=0x1FAFF   // mahjong, cards, enclosed, pictographs, emoticons, transport, supplemental
        | 0x2600..=0x27BF   // misc symbols + dingbats
        | 0x2190..=0x21FF   // arrows
        | 0x2300..=0x23FF   // misc technical (watch, hourglass, ...)
        | 0x2B00..=0x2BFF   // misc symbols and arrows
        | 0x25A0..=0x25FF   // geometric shapes
        | 0x3030 | 0x303D | 0x3297 | 0x3299
        | 0x00A9 | 0x00AE | 0x2122 | 0x2139
    )
}

// Zero-width joiners, variation selectors and tag characters glue emoji
// sequences together and are invisible on their own.
fn is_invisible(c: char) -> bool {
    matches!(c as u32,
        0x200B..=0x200F
        | 0x2028..=0x202E
        | 0x2060..=0x206F
        | 0xFE00..=0xFE0F
        | 0xFEFF
        | 0xE0000..=0xE007F
    )
}

fn is_combining_mark(c: char) -> bool {
    matches!(c as u32,
        0x0300..=0x036F
        | 0x0483..=0x0489
        | 0x0591..=0x05BD
        | 0x0610..=0x061A
        | 0x064B..=0x065F
        | 0x0900..=0x0903
        | 0x093A..=0x094F
        | 0x1AB0..=0x1AFF
        | 0x1DC0..=0x1DFF
        | 0x20D0..=0x20FF
    )
}

fn is_text_punctuation(c: char) -> bool {
    matches!(c,
        '¡' | '§' | '«' | '¶' | '·' | '»' | '¿'
        | '\u{2010}'..='\u{2027}'
        | '\u{2030}'..='\u{205E}'
        | '\u{3001}'..='\u{3003}'
        | '\u{3008}'..='\u{3011}'
        | '\u{FF01}'..='\u{FF0F}'
        | '\u{FF1A}'..='\u{FF20}'
    )
}
