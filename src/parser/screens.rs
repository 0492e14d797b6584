use tracing::debug;

use crate::db::Screens;

const PLURAL_SUFFIX_LEN: usize = 8; // " screens"
const SINGULAR_SUFFIX_LEN: usize = 7; // " screen"

/// Screen count from fact text such as "2 screens" or "1 screen".
///
/// Chops a fixed-length suffix (8 chars when the text ends in `s`, 7
/// otherwise) and parses the rest. Text that does not parse is kept verbatim.
pub fn parse_screens(text: &str) -> Screens {
    let suffix = if text.ends_with('s') {
        PLURAL_SUFFIX_LEN
    } else {
        SINGULAR_SUFFIX_LEN
    };

    let chars = text.chars().count();
    let parsed = chars
        .checked_sub(suffix)
        .map(|keep| text.chars().take(keep).collect::<String>())
        .and_then(|head| head.trim().parse::<i64>().ok());

    match parsed {
        Some(n) => Screens::Count(n),
        None => {
            debug!("Unparsable screen count {:?}, keeping text", text);
            Screens::Raw(text.to_string())
        }
    }
}
