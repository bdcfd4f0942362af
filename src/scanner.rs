use crate::token::{Token, TokenKind};

/// Scans Lox source text into a lazily-produced stream of [`Token`]s.
///
/// Operates on raw bytes rather than `char`s: every token boundary in
/// the Lox grammar falls on an ASCII byte (punctuation, digits,
/// `_A-Za-z`, the `"` string delimiter, `//`), so indexing by byte
/// offset is both correct for arbitrary UTF-8 source and a good deal
/// cheaper than decoding codepoints to find them. String bodies may
/// contain arbitrary UTF-8 bytes; the scanner never looks inside them
/// except to find the closing quote and count newlines.
pub struct Scanner<'src> {
    source: &'src str,
    start: usize,
    current: usize,
    line: u32,
}

impl<'src> Scanner<'src> {
    pub fn new(source: &'src str) -> Self {
        Scanner { source, start: 0, current: 0, line: 1 }
    }

    /// Produces the next token. Past end of input this keeps returning
    /// `Eof` tokens indefinitely, so callers never need to special-case
    /// "ran off the end" separately from "the next token is Eof".
    pub fn next_token(&mut self) -> Token<'src> {
        self.skip_whitespace_and_comments();
        self.start = self.current;

        let Some(c) = self.advance() else {
            return self.make_token(TokenKind::Eof);
        };

        match c {
            b'(' => self.make_token(TokenKind::LeftParen),
            b')' => self.make_token(TokenKind::RightParen),
            b'{' => self.make_token(TokenKind::LeftBrace),
            b'}' => self.make_token(TokenKind::RightBrace),
            b',' => self.make_token(TokenKind::Comma),
            b'.' => self.make_token(TokenKind::Dot),
            b'-' => self.make_token(TokenKind::Minus),
            b'+' => self.make_token(TokenKind::Plus),
            b';' => self.make_token(TokenKind::Semicolon),
            b'*' => self.make_token(TokenKind::Star),
            b'/' => self.make_token(TokenKind::Slash),
            b'!' => {
                let kind = if self.eat(b'=') { TokenKind::BangEqual } else { TokenKind::Bang };
                self.make_token(kind)
            }
            b'=' => {
                let kind = if self.eat(b'=') { TokenKind::EqualEqual } else { TokenKind::Equal };
                self.make_token(kind)
            }
            b'<' => {
                let kind = if self.eat(b'=') { TokenKind::LessEqual } else { TokenKind::Less };
                self.make_token(kind)
            }
            b'>' => {
                let kind =
                    if self.eat(b'=') { TokenKind::GreaterEqual } else { TokenKind::Greater };
                self.make_token(kind)
            }
            b'"' => self.string(),
            b'0'..=b'9' => self.number(),
            c if is_ident_start(c) => self.identifier(),
            _ => Token::error("Unexpected character.", self.line),
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\r') | Some(b'\t') => {
                    self.current += 1;
                }
                Some(b'\n') => {
                    self.line += 1;
                    self.current += 1;
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while self.peek().is_some() && self.peek() != Some(b'\n') {
                        self.current += 1;
                    }
                }
                _ => return,
            }
        }
    }

    fn string(&mut self) -> Token<'src> {
        while let Some(c) = self.peek() {
            if c == b'"' {
                break;
            }
            if c == b'\n' {
                self.line += 1;
            }
            self.current += 1;
        }

        if self.peek().is_none() {
            return Token::error("Unterminated string.", self.line);
        }

        // consume the closing quote
        self.current += 1;
        self.make_token(TokenKind::String)
    }

    fn number(&mut self) -> Token<'src> {
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.current += 1;
        }

        if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(b'0'..=b'9')) {
            self.current += 1; // consume '.'
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.current += 1;
            }
        }

        self.make_token(TokenKind::Number)
    }

    fn identifier(&mut self) -> Token<'src> {
        while matches!(self.peek(), Some(c) if is_ident_continue(c)) {
            self.current += 1;
        }

        self.make_token(self.identifier_kind())
    }

    /// Hand-rolled trie over the lexeme's bytes, same shape as clox's
    /// `identifierType`: walk shared prefixes, then compare the
    /// distinguishing suffix in one shot.
    fn identifier_kind(&self) -> TokenKind {
        let text = &self.source[self.start..self.current];
        match text {
            "and" => TokenKind::And,
            "class" => TokenKind::Class,
            "else" => TokenKind::Else,
            "false" => TokenKind::False,
            "for" => TokenKind::For,
            "fun" => TokenKind::Fun,
            "if" => TokenKind::If,
            "nil" => TokenKind::Nil,
            "or" => TokenKind::Or,
            "print" => TokenKind::Print,
            "return" => TokenKind::Return,
            "super" => TokenKind::Super,
            "this" => TokenKind::This,
            "true" => TokenKind::True,
            "var" => TokenKind::Var,
            "while" => TokenKind::While,
            _ => TokenKind::Identifier,
        }
    }

    fn make_token(&self, kind: TokenKind) -> Token<'src> {
        Token::new(kind, &self.source[self.start..self.current], self.line)
    }

    fn advance(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.current += 1;
        Some(byte)
    }

    fn eat(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.current += 1;
            true
        } else {
            false
        }
    }

    fn peek(&self) -> Option<u8> {
        self.source.as_bytes().get(self.current).copied()
    }

    fn peek_at(&self, distance: usize) -> Option<u8> {
        self.source.as_bytes().get(self.current + distance).copied()
    }
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut scanner = Scanner::new(source);
        let mut out = Vec::new();
        loop {
            let token = scanner.next_token();
            let done = token.kind == TokenKind::Eof;
            out.push(token.kind);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn scans_punctuation_and_operators() {
        assert_eq!(
            kinds("(){};,.+-*/!=<=>===!<>"),
            vec![
                TokenKind::LeftParen,
                TokenKind::RightParen,
                TokenKind::LeftBrace,
                TokenKind::RightBrace,
                TokenKind::Semicolon,
                TokenKind::Comma,
                TokenKind::Dot,
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Star,
                TokenKind::Slash,
                TokenKind::BangEqual,
                TokenKind::LessEqual,
                TokenKind::GreaterEqual,
                TokenKind::EqualEqual,
                TokenKind::Bang,
                TokenKind::Less,
                TokenKind::Greater,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn scans_keywords_vs_identifiers() {
        assert_eq!(
            kinds("var orchid or andy and"),
            vec![
                TokenKind::Var,
                TokenKind::Identifier,
                TokenKind::Or,
                TokenKind::Identifier,
                TokenKind::And,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn scans_numbers() {
        let mut scanner = Scanner::new("123 4.56 7.");
        assert_eq!(scanner.next_token().lexeme, "123");
        assert_eq!(scanner.next_token().lexeme, "4.56");
        let dot_number = scanner.next_token();
        assert_eq!(dot_number.lexeme, "7");
        assert_eq!(scanner.next_token().kind, TokenKind::Dot);
    }

    #[test]
    fn tracks_lines_across_strings_and_comments() {
        let mut scanner = Scanner::new("\"a\nb\" // comment\nvar");
        let string_tok = scanner.next_token();
        assert_eq!(string_tok.kind, TokenKind::String);
        assert_eq!(string_tok.line, 1);
        let var_tok = scanner.next_token();
        assert_eq!(var_tok.kind, TokenKind::Var);
        assert_eq!(var_tok.line, 3);
    }

    #[test]
    fn unterminated_string_is_an_error_token() {
        let mut scanner = Scanner::new("\"never closed");
        let token = scanner.next_token();
        assert_eq!(token.kind, TokenKind::Error);
        assert_eq!(token.lexeme, "Unterminated string.");
    }

    #[test]
    fn keeps_returning_eof_past_end() {
        let mut scanner = Scanner::new("");
        assert_eq!(scanner.next_token().kind, TokenKind::Eof);
        assert_eq!(scanner.next_token().kind, TokenKind::Eof);
        assert_eq!(scanner.next_token().kind, TokenKind::Eof);
    }
}
