//! Tokenizer for the IR textual format (spec.md §4.3). Grounded on
//! `examples/original_source/src/ir/serialization/scanner.cc`: punctuation
//! is scanned character-by-character, identifiers are `[A-Za-z][A-Za-z0-9_]*`,
//! and a token starting with `0x`/`0X` is an `Address` rather than a
//! `Number`. Newlines are significant tokens (they terminate instructions
//! and block/function headers); all other whitespace is skipped.

use katara_common::{Position, Span};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Token {
    Identifier(String),
    Number(String),
    Address(String),
    StringLit(String),
    NewLine,
    Eof,
    Hash,
    Percent,
    Colon,
    LBrace,
    RBrace,
    At,
    Comma,
    LParen,
    RParen,
    Lt,
    Gt,
    Equal,
    Arrow,
    Unknown(char),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Identifier(s) => write!(f, "identifier '{}'", s),
            Token::Number(s) => write!(f, "number '{}'", s),
            Token::Address(s) => write!(f, "address '{}'", s),
            Token::StringLit(s) => write!(f, "string \"{}\"", s),
            Token::NewLine => write!(f, "new line"),
            Token::Eof => write!(f, "end of file"),
            Token::Hash => write!(f, "'#'"),
            Token::Percent => write!(f, "'%'"),
            Token::Colon => write!(f, "':'"),
            Token::LBrace => write!(f, "'{{'"),
            Token::RBrace => write!(f, "'}}'"),
            Token::At => write!(f, "'@'"),
            Token::Comma => write!(f, "','"),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
            Token::Lt => write!(f, "'<'"),
            Token::Gt => write!(f, "'>'"),
            Token::Equal => write!(f, "'='"),
            Token::Arrow => write!(f, "'=>'"),
            Token::Unknown(c) => write!(f, "unexpected character '{}'", c),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanErrorKind {
    UnexpectedToken,
    NumberCannotBeRepresented,
    AddressCannotBeRepresented,
    EOFInsteadOfEscapedCharacter,
    EOFInsteadOfStringEndQuote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanError {
    pub kind: ScanErrorKind,
    pub span: Span,
    pub message: String,
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.span)
    }
}

pub struct Scanner<'a> {
    bytes: &'a [u8],
    pos: Position,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { bytes: source.as_bytes(), pos: Position::start() }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos.offset as usize).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos.offset as usize + ahead).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos = self.pos.advance(byte);
        Some(byte)
    }

    fn slice(&self, start: u32, end: u32) -> &'a str {
        std::str::from_utf8(&self.bytes[start as usize..end as usize]).unwrap_or("")
    }

    /// Skips spaces/tabs/carriage-returns (never `\n`, which is its own
    /// token) and `#`-introduced comments up to (not including) the
    /// terminating newline, per spec.md §6.
    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\r') => {
                    self.bump();
                }
                Some(b'#') => {
                    while !matches!(self.peek(), None | Some(b'\n')) {
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    pub fn next_token(&mut self) -> Result<(Token, Span), ScanError> {
        self.skip_trivia();
        let start = self.pos;
        let Some(byte) = self.peek() else {
            return Ok((Token::Eof, Span::new(start, self.pos)));
        };
        let token = match byte {
            b'\n' => {
                self.bump();
                Token::NewLine
            }
            b'#' => {
                self.bump();
                Token::Hash
            }
            b'%' => {
                self.bump();
                Token::Percent
            }
            b':' => {
                self.bump();
                Token::Colon
            }
            b'{' => {
                self.bump();
                Token::LBrace
            }
            b'}' => {
                self.bump();
                Token::RBrace
            }
            b'@' => {
                self.bump();
                Token::At
            }
            b',' => {
                self.bump();
                Token::Comma
            }
            b'(' => {
                self.bump();
                Token::LParen
            }
            b')' => {
                self.bump();
                Token::RParen
            }
            b'<' => {
                self.bump();
                Token::Lt
            }
            b'>' => {
                self.bump();
                Token::Gt
            }
            b'=' => {
                self.bump();
                if self.peek() == Some(b'>') {
                    self.bump();
                    Token::Arrow
                } else {
                    Token::Equal
                }
            }
            b'"' => return self.scan_string(start),
            c if c.is_ascii_alphabetic() || c == b'_' => return Ok(self.scan_identifier(start)),
            c if c.is_ascii_digit() || c == b'-' || c == b'+' => return self.scan_number(start),
            other => {
                self.bump();
                Token::Unknown(other as char)
            }
        };
        Ok((token, Span::new(start, self.pos)))
    }

    fn scan_identifier(&mut self, start: Position) -> (Token, Span) {
        self.bump();
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
            self.bump();
        }
        let text = self.slice(start.offset, self.pos.offset).to_string();
        (Token::Identifier(text), Span::new(start, self.pos))
    }

    fn scan_number(&mut self, start: Position) -> Result<(Token, Span), ScanError> {
        self.bump();
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric()) {
            self.bump();
        }
        let text = self.slice(start.offset, self.pos.offset).to_string();
        let span = Span::new(start, self.pos);
        if text.starts_with("0x") || text.starts_with("0X") || text.starts_with("-0x") {
            let digits = text.trim_start_matches('-').trim_start_matches("0x").trim_start_matches("0X");
            if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ScanError {
                    kind: ScanErrorKind::AddressCannotBeRepresented,
                    span,
                    message: "the token cannot be represented as an address".to_string(),
                });
            }
            Ok((Token::Address(text), span))
        } else {
            Ok((Token::Number(text), span))
        }
    }

    fn scan_string(&mut self, start: Position) -> Result<(Token, Span), ScanError> {
        self.bump();
        let mut content = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(ScanError {
                        kind: ScanErrorKind::EOFInsteadOfStringEndQuote,
                        span: Span::new(start, self.pos),
                        message: "reached end of file before a closing '\"'".to_string(),
                    });
                }
                Some(b'"') => {
                    self.bump();
                    break;
                }
                Some(b'\\') => {
                    self.bump();
                    match self.peek() {
                        None => {
                            return Err(ScanError {
                                kind: ScanErrorKind::EOFInsteadOfEscapedCharacter,
                                span: Span::new(start, self.pos),
                                message: "reached end of file while scanning an escape sequence".to_string(),
                            });
                        }
                        Some(escaped) => {
                            content.push(escaped as char);
                            self.bump();
                        }
                    }
                }
                Some(other) => {
                    content.push(other as char);
                    self.bump();
                }
            }
        }
        Ok((Token::StringLit(content), Span::new(start, self.pos)))
    }

    /// Convenience used by tests and by the parser's lookahead: scans the
    /// whole input into a flat token list, stopping (inclusively) at EOF.
    pub fn scan_all(mut self) -> Result<Vec<(Token, Span)>, ScanError> {
        let mut tokens = Vec::new();
        loop {
            let (token, span) = self.next_token()?;
            let is_eof = token == Token::Eof;
            tokens.push((token, span));
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        Scanner::new(src).scan_all().unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn scans_punctuation_and_identifiers() {
        assert_eq!(
            kinds("@func0 { %1 }"),
            vec![
                Token::At,
                Token::Identifier("func0".to_string()),
                Token::LBrace,
                Token::Percent,
                Token::Number("1".to_string()),
                Token::RBrace,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn distinguishes_address_from_number() {
        assert_eq!(kinds("0x1f"), vec![Token::Address("0x1f".to_string()), Token::Eof]);
        assert_eq!(kinds("42"), vec![Token::Number("42".to_string()), Token::Eof]);
    }

    #[test]
    fn equal_vs_arrow() {
        assert_eq!(kinds("="), vec![Token::Equal, Token::Eof]);
        assert_eq!(kinds("=>"), vec![Token::Arrow, Token::Eof]);
    }

    #[test]
    fn comments_run_to_end_of_line() {
        assert_eq!(kinds("%1 # a comment\n%2"), vec![
            Token::Percent,
            Token::Number("1".to_string()),
            Token::NewLine,
            Token::Percent,
            Token::Number("2".to_string()),
            Token::Eof,
        ]);
    }

    #[test]
    fn string_literal_unescapes_backslashes() {
        let tokens = Scanner::new(r#""a\"b\\c""#).scan_all().unwrap();
        assert_eq!(tokens[0].0, Token::StringLit("a\"b\\c".to_string()));
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = Scanner::new("\"abc").scan_all().unwrap_err();
        assert_eq!(err.kind, ScanErrorKind::EOFInsteadOfStringEndQuote);
    }

    #[test]
    fn malformed_address_is_an_error() {
        let err = Scanner::new("0x").scan_all().unwrap_err();
        assert_eq!(err.kind, ScanErrorKind::AddressCannotBeRepresented);
    }
}
