//! Filesystem-safe filename sanitization.
//!
//! Rules applied in order: strip emoji and invisible formatting characters,
//! strip controls, replace reserved characters with `_`, collapse runs,
//! trim, guard reserved device names, and cap the length at 255 bytes while
//! preserving the extension. The whole pipeline is idempotent.

const NAME_MAX: usize = 255;

/// Stems that name devices on Windows filesystems; prefixed with `_` so the
/// library stays portable.
const RESERVED_STEMS: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

fn is_emoji_or_symbol(c: char) -> bool {
    let cp = c as u32;
    matches!(cp,
        0x1F000..=0x1FAFF   // emoji, symbols, pictographs (incl. regional indicators)
        | 0x2600..=0x27BF   // misc symbols, dingbats
        | 0x2B00..=0x2BFF   // arrows and symbols
        | 0xFE00..=0xFE0F   // variation selectors
    )
}

fn is_invisible_format(c: char) -> bool {
    let cp = c as u32;
    matches!(cp,
        0x200B..=0x200F     // zero-width and directional marks
        | 0x202A..=0x202E   // bidi embedding/override
        | 0x2060..=0x2064   // word joiner and invisibles
        | 0xFEFF            // BOM / zero-width no-break
    )
}

fn is_reserved_char(c: char) -> bool {
    matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*')
}

fn reserved_stem(name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or(name);
    RESERVED_STEMS
        .iter()
        .any(|r| stem.eq_ignore_ascii_case(r))
}

/// Truncate to `NAME_MAX` bytes on a char boundary, keeping the extension.
fn truncate_preserving_extension(name: &str) -> String {
    if name.len() <= NAME_MAX {
        return name.to_string();
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((s, e)) if !s.is_empty() && e.len() < NAME_MAX => (s, format!(".{}", e)),
        _ => (name, String::new()),
    };
    let budget = NAME_MAX - ext.len();
    let mut take = budget.min(stem.len());
    while take > 0 && !stem.is_char_boundary(take) {
        take -= 1;
    }
    format!("{}{}", &stem[..take], ext)
}

/// Rules 4 and 5: collapse runs of dots, whitespace, and underscores, then
/// trim leading/trailing whitespace and dots.
fn collapse_and_trim(name: &str) -> String {
    let mut collapsed = String::with_capacity(name.len());
    let mut prev: Option<char> = None;
    for c in name.chars() {
        let class = if c == '.' {
            Some('.')
        } else if c.is_whitespace() {
            Some(' ')
        } else if c == '_' {
            Some('_')
        } else {
            None
        };
        match class {
            Some(repr) => {
                if prev != Some(repr) {
                    collapsed.push(repr);
                }
                prev = Some(repr);
            }
            None => {
                collapsed.push(c);
                prev = None;
            }
        }
    }
    collapsed
        .trim_matches(|c: char| c.is_whitespace() || c == '.')
        .to_string()
}

/// Sanitize a candidate filename. Idempotent: applying it twice yields the
/// same string.
pub fn sanitize_filename(name: &str) -> String {
    // Rules 1-3: drop emoji/invisibles/controls, replace reserved chars.
    let mut cleaned = String::with_capacity(name.len());
    for c in name.chars() {
        if is_emoji_or_symbol(c) || is_invisible_format(c) || c.is_control() {
            continue;
        }
        if is_reserved_char(c) {
            cleaned.push('_');
        } else {
            cleaned.push(c);
        }
    }

    // Rules 4-5.
    let trimmed = collapse_and_trim(&cleaned);

    // Rule 6: guard reserved device names.
    let guarded = if reserved_stem(&trimmed) {
        format!("_{}", trimmed)
    } else {
        trimmed
    };

    // Rule 7: length cap. The cut can land next to a dot in the stem and
    // create a run rules 4-5 never saw, so a shortened name goes through
    // them once more.
    let truncated = truncate_preserving_extension(&guarded);
    if truncated.len() < guarded.len() {
        collapse_and_trim(&truncated)
    } else {
        truncated
    }
}
