use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::tokenizer::{tokenize_text, Token};

/// Immutable bundle of original text, its token sequence, and
/// identifying metadata. Safe to share read-only between a live session
/// and a recorder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextSource {
    pub id: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    pub tokens: Vec<Token>,
}

#[derive(Clone, Debug, Default)]
pub struct TextSourceOptions {
    pub id: Option<String>,
    pub locale: Option<String>,
    pub tokens: Option<Vec<Token>>,
}

/// Build a text source with a random id unless one is supplied. Tokens
/// default to tokenizer output over `content`.
pub fn create_text_source(content: &str, options: TextSourceOptions) -> Result<TextSource, Error> {
    if content.is_empty() {
        return Err(Error::EmptyContent);
    }

    let id = options
        .id
        .unwrap_or_else(|| format!("source-{:08x}", rand::thread_rng().gen::<u32>()));
    let tokens = options.tokens.unwrap_or_else(|| tokenize_text(content));

    Ok(TextSource {
        id,
        content: content.to_string(),
        locale: options.locale,
        tokens,
    })
}

/// Sequential-id factory for callers that want deterministic ids
/// (fixtures, tests). Owns its counter; no module-level state.
#[derive(Debug, Default)]
pub struct TextSourceFactory {
    counter: u64,
}

impl TextSourceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &mut self,
        content: &str,
        mut options: TextSourceOptions,
    ) -> Result<TextSource, Error> {
        if options.id.is_none() {
            self.counter += 1;
            options.id = Some(format!("source-{}", self.counter));
        }
        create_text_source(content, options)
    }

    pub fn reset(&mut self) {
        self.counter = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use crate::tokenizer::TokenType;

    #[test]
    fn test_empty_content_rejected() {
        let result = create_text_source("", TextSourceOptions::default());
        assert_matches!(result, Err(Error::EmptyContent));
    }

    #[test]
    fn test_tokens_default_from_content() {
        let source = create_text_source("hi there", TextSourceOptions::default()).unwrap();

        assert_eq!(source.content, "hi there");
        assert_eq!(source.tokens.len(), 8);
        assert_eq!(source.tokens[2].kind, TokenType::Space);
    }

    #[test]
    fn test_supplied_tokens_are_kept() {
        let tokens = tokenize_text("ab");
        let source = create_text_source(
            "ab",
            TextSourceOptions {
                tokens: Some(tokens.clone()),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(source.tokens, tokens);
    }

    #[test]
    fn test_explicit_id_and_locale() {
        let source = create_text_source(
            "ab",
            TextSourceOptions {
                id: Some("fixture".into()),
                locale: Some("en".into()),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(source.id, "fixture");
        assert_eq!(source.locale.as_deref(), Some("en"));
    }

    #[test]
    fn test_random_ids_are_distinct() {
        let a = create_text_source("ab", TextSourceOptions::default()).unwrap();
        let b = create_text_source("ab", TextSourceOptions::default()).unwrap();

        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_factory_ids_are_sequential_and_resettable() {
        let mut factory = TextSourceFactory::new();

        let a = factory.create("ab", TextSourceOptions::default()).unwrap();
        let b = factory.create("cd", TextSourceOptions::default()).unwrap();
        assert_eq!(a.id, "source-1");
        assert_eq!(b.id, "source-2");

        factory.reset();
        let c = factory.create("ef", TextSourceOptions::default()).unwrap();
        assert_eq!(c.id, "source-1");
    }

    #[test]
    fn test_factory_respects_explicit_id() {
        let mut factory = TextSourceFactory::new();
        let source = factory
            .create(
                "ab",
                TextSourceOptions {
                    id: Some("mine".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(source.id, "mine");
    }
}
