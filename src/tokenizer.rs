use serde::{Deserialize, Serialize};
use strum_macros::Display;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TokenType {
    Char,
    Space,
    Punctuation,
    Newline,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TokenLanguage {
    English,
    Chinese,
    Separator,
    Other,
}

/// One typed unit, derived from a single source character. The
/// `attach_to_previous` flag is a rendering hint (punctuation clings to
/// the preceding glyph); it carries no correctness meaning.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub char: char,
    #[serde(rename = "type")]
    pub kind: TokenType,
    pub language: TokenLanguage,
    pub attach_to_previous: bool,
}

/// Punctuation that renders attached to the preceding glyph. ASCII plus
/// the common CJK marks.
const PUNCTUATION: &[char] = &[
    '.', ',', '!', '?', ';', ':', '\'', '"', '(', ')', '[', ']', '{', '}', '-', '_', '/', '\\',
    '@', '#', '$', '%', '^', '&', '*', '+', '=', '<', '>', '~', '`', '|', '，', '。', '！', '？',
    '；', '：', '“', '”', '‘', '’', '（', '）', '【', '】', '《', '》', '、', '…', '—', '·',
];

fn is_punctuation(c: char) -> bool {
    PUNCTUATION.contains(&c)
}

fn classify_language(c: char) -> TokenLanguage {
    let cp = c as u32;
    if (0x3400..=0x9FBF).contains(&cp) {
        TokenLanguage::Chinese
    } else if c.is_ascii_alphanumeric() {
        TokenLanguage::English
    } else {
        TokenLanguage::Other
    }
}

/// Iterate a string one UTF-16 code unit at a time, the granularity the
/// whole engine indexes by. Lone surrogate halves (astral characters are
/// two code units) decode to U+FFFD; they stay two independent tokens so
/// positions downstream remain one-per-code-unit.
pub fn code_unit_chars(text: &str) -> impl Iterator<Item = char> + '_ {
    text.encode_utf16()
        .map(|unit| char::from_u32(unit as u32).unwrap_or(char::REPLACEMENT_CHARACTER))
}

/// Segment `text` into tokens. Pure and total: any input produces a
/// token list, the empty string an empty one.
///
/// Rules, per code unit:
/// - `\r` is dropped entirely (Windows line endings).
/// - `\n` emits a newline token and breaks the attach chain.
/// - ASCII space and U+3000 emit a space token; punctuation from the
///   fixed set emits a punctuation token. Both attach to the previous
///   token unless they open the text or follow a newline.
/// - everything else is a plain char token classified by language.
pub fn tokenize_text(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    // false at the start of the text and right after a newline
    let mut can_attach = false;

    for c in code_unit_chars(text) {
        match c {
            '\r' => {}
            '\n' => {
                tokens.push(Token {
                    char: c,
                    kind: TokenType::Newline,
                    language: TokenLanguage::Separator,
                    attach_to_previous: false,
                });
                can_attach = false;
            }
            ' ' | '\u{3000}' => {
                tokens.push(Token {
                    char: c,
                    kind: TokenType::Space,
                    language: TokenLanguage::Separator,
                    attach_to_previous: can_attach,
                });
                can_attach = true;
            }
            c if is_punctuation(c) => {
                tokens.push(Token {
                    char: c,
                    kind: TokenType::Punctuation,
                    language: TokenLanguage::Separator,
                    attach_to_previous: can_attach,
                });
                can_attach = true;
            }
            c => {
                tokens.push(Token {
                    char: c,
                    kind: TokenType::Char,
                    language: classify_language(c),
                    attach_to_previous: false,
                });
                can_attach = true;
            }
        }
    }

    tokens
}
