//! Formula tokenizer
//!
//! Splits a formula into numbers, metric identifiers, function names,
//! operators and punctuation. Whitespace is skipped. Positions are character
//! offsets into the formula.

use std::str::FromStr;

use kpi_model::{is_segment_char, MetricId};
use rust_decimal::Decimal;

use crate::error::{FormulaError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(Decimal),
    /// `segment.segment.segment`
    Identifier(MetricId),
    /// Bare word, only valid as a function name
    Name(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
    Comma,
}

impl Token {
    pub fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("number {}", n),
            Token::Identifier(id) => format!("identifier '{}'", id),
            Token::Name(name) => format!("name '{}'", name),
            Token::Plus => "'+'".to_string(),
            Token::Minus => "'-'".to_string(),
            Token::Star => "'*'".to_string(),
            Token::Slash => "'/'".to_string(),
            Token::Caret => "'^'".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::Comma => "','".to_string(),
        }
    }

    pub fn is_operator(&self) -> bool {
        matches!(
            self,
            Token::Plus | Token::Minus | Token::Star | Token::Slash | Token::Caret
        )
    }
}

/// Token with its starting character offset
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

/// A maximal run of segment characters and dots
pub(crate) fn is_word_char(c: char) -> bool {
    is_segment_char(c) || c == '.'
}

/// Classification of a word run
pub(crate) enum Word {
    Identifier(MetricId),
    Number(Decimal),
    Name(String),
}

/// Classify a word run as identifier, number or bare name
///
/// Returns `None` when the run is none of them (e.g. `a.b`, `1.2.x.y`).
pub(crate) fn classify_word(word: &str) -> Option<Word> {
    if word.contains('.') {
        let segments: Vec<&str> = word.split('.').collect();
        if segments.len() == 3 && segments.iter().all(|s| !s.is_empty()) {
            return Some(Word::Identifier(MetricId::new(word)));
        }
        return parse_number(word).map(Word::Number);
    }

    if word.chars().all(|c| c.is_ascii_digit()) {
        return parse_number(word).map(Word::Number);
    }

    Some(Word::Name(word.to_string()))
}

fn parse_number(word: &str) -> Option<Decimal> {
    let dots = word.chars().filter(|c| *c == '.').count();
    let digits_ok = word.chars().all(|c| c.is_ascii_digit() || c == '.');
    if !digits_ok || dots > 1 || word == "." {
        return None;
    }
    Decimal::from_str(word).ok()
}

/// Tokenize a formula
pub fn tokenize(formula: &str) -> Result<Vec<Spanned>> {
    let chars: Vec<char> = formula.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];

        if c.is_whitespace() {
            pos += 1;
            continue;
        }

        let single = match c {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '^' => Some(Token::Caret),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            ',' => Some(Token::Comma),
            _ => None,
        };
        if let Some(token) = single {
            tokens.push(Spanned {
                token,
                position: pos,
            });
            pos += 1;
            continue;
        }

        if !is_word_char(c) {
            return Err(FormulaError::malformed(
                pos,
                format!("unexpected character '{}'", c),
            ));
        }

        let start = pos;
        while pos < chars.len() && is_word_char(chars[pos]) {
            pos += 1;
        }
        let word: String = chars[start..pos].iter().collect();

        let token = match classify_word(&word) {
            Some(Word::Identifier(id)) => Token::Identifier(id),
            Some(Word::Number(n)) => Token::Number(n),
            Some(Word::Name(name)) => Token::Name(name),
            None => {
                return Err(FormulaError::malformed(
                    start,
                    format!("'{}' is neither a number nor a metric identifier", word),
                ))
            },
        };
        tokens.push(Spanned {
            token,
            position: start,
        });
    }

    Ok(tokens)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn kinds(formula: &str) -> Vec<Token> {
        tokenize(formula)
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_tokenize_arithmetic() {
        let tokens = kinds("(1 - a.b.c / 2.5) * 100");
        assert_eq!(tokens.len(), 9);
        assert_eq!(tokens[0], Token::LParen);
        assert_eq!(tokens[1], Token::Number(Decimal::ONE));
        assert_eq!(tokens[3], Token::Identifier(MetricId::new("a.b.c")));
        assert_eq!(tokens[5], Token::Number(Decimal::from_str("2.5").unwrap()));
        assert_eq!(tokens[8], Token::Number(Decimal::from(100)));
    }

    #[test]
    fn test_tokenize_cjk_identifier() {
        let tokens = kinds("中压拓扑.拓扑不一致.数量*2");
        assert_eq!(
            tokens[0],
            Token::Identifier(MetricId::new("中压拓扑.拓扑不一致.数量"))
        );
        assert_eq!(tokens[1], Token::Star);
    }

    #[test]
    fn test_tokenize_function_name() {
        let tokens = kinds("max(a.b.c, 3)");
        assert_eq!(tokens[0], Token::Name("max".to_string()));
        assert_eq!(tokens[1], Token::LParen);
        assert_eq!(tokens[3], Token::Comma);
    }

    #[test]
    fn test_positions_are_char_offsets() {
        let tokens = tokenize("数.量.值 + 1").unwrap();
        assert_eq!(tokens[0].position, 0);
        assert_eq!(tokens[1].position, 6);
        assert_eq!(tokens[2].position, 8);
    }

    #[test]
    fn test_rejects_two_segment_word() {
        let err = tokenize("a.b + 1").unwrap_err();
        assert!(matches!(
            err,
            FormulaError::MalformedExpression { position: 0, .. }
        ));
    }

    #[test]
    fn test_rejects_unknown_character() {
        let err = tokenize("a.b.c % 2").unwrap_err();
        assert!(matches!(
            err,
            FormulaError::MalformedExpression { position: 6, .. }
        ));
    }

    #[test]
    fn test_rejects_double_dot_number() {
        assert!(tokenize("1..5").is_err());
    }
}
