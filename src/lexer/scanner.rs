//! Single-pass lexer (spec.md §4.2). Token sub-grammars (identifiers,
//! numeric literals, string escapes) are nom combinators, the same idiom the
//! teacher uses throughout its own parser (`nom`/`nom-supreme`); the outer
//! loop drives them one token at a time over the remaining source slice and
//! tracks line/column/byte-offset itself, giving the one-character-lookahead
//! behavior spec.md requires without nom owning the whole grammar.

use std::rc::Rc;

use nom::branch::alt;
use nom::bytes::complete::{tag, take_while, take_while1};
use nom::character::complete::{char as nchar, digit1, hex_digit1, oct_digit1};
use nom::combinator::{opt, recognize};
use nom::multi::many0;
use nom::sequence::{pair, preceded};
use nom::IResult;

use crate::lexer::error::LexError;
use crate::lexer::token::{Position, Span, Token, TokenKind};

pub struct Scanner<'a> {
    source: &'a str,
    pos: usize,
    line: u32,
    column: u32,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        // A leading BOM is skipped (spec.md §6 "Source files").
        let source = source.strip_prefix('\u{feff}').unwrap_or(source);
        Scanner {
            source,
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_non_newline_whitespace_and_comments();
            let start = self.position();
            if self.rest().is_empty() {
                tokens.push(Token::new(TokenKind::Eof, Span { start, end: start }));
                break;
            }
            let ch = self.rest().chars().next().unwrap();
            if ch == '\n' || ch == '\r' {
                self.advance_newline();
                let end = self.position();
                tokens.push(Token::new(TokenKind::Newline, Span { start, end }));
                continue;
            }
            let (kind, consumed) = self.lex_one(start)?;
            self.advance_bytes(consumed);
            let end = self.position();
            tokens.push(Token::new(kind, Span { start, end }));
        }
        Ok(tokens)
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn position(&self) -> Position {
        Position {
            line: self.line,
            column: self.column,
            offset: self.pos as u32,
        }
    }

    fn advance_bytes(&mut self, n: usize) {
        for ch in self.source[self.pos..self.pos + n].chars() {
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.pos += n;
    }

    fn advance_newline(&mut self) {
        if self.rest().starts_with("\r\n") {
            self.pos += 2;
        } else {
            self.pos += 1;
        }
        self.line += 1;
        self.column = 1;
    }

    fn skip_non_newline_whitespace_and_comments(&mut self) {
        loop {
            let rest = self.rest();
            let ws_len = rest
                .chars()
                .take_while(|c| c.is_whitespace() && *c != '\n' && *c != '\r')
                .map(char::len_utf8)
                .sum::<usize>();
            if ws_len > 0 {
                self.advance_bytes(ws_len);
                continue;
            }
            if rest.starts_with("//") {
                let len = rest.find(['\n', '\r']).unwrap_or(rest.len());
                self.advance_bytes(len);
                continue;
            }
            break;
        }
    }

    fn lex_one(&self, start: Position) -> Result<(TokenKind, usize), LexError> {
        let rest = self.rest();
        if let Ok((remaining, text)) = lex_ident_raw(rest) {
            return Ok((keyword_or_ident(text), rest.len() - remaining.len()));
        }
        if let Some(result) = self.try_lex_number(rest, start)? {
            return Ok(result);
        }
        if rest.starts_with('\'') || rest.starts_with("'''") || rest.starts_with("\"\"\"") {
            return self.lex_string(rest, start);
        }
        if rest.starts_with('`') {
            return self.lex_regex(rest, start);
        }
        self.lex_punct(rest, start)
    }

    fn try_lex_number(
        &self,
        rest: &'a str,
        start: Position,
    ) -> Result<Option<(TokenKind, usize)>, LexError> {
        let Ok((after, (prefix, digits))) = lex_number_body(rest) else {
            return Ok(None);
        };
        let consumed_digits = rest.len() - after.len();
        // A float requires an explicit `.`; an int must not be immediately
        // followed or preceded by one (spec.md §4.2).
        let is_float_dot = after.starts_with('.') && !after.starts_with("..");
        if is_float_dot {
            let frac_rest = &after[1..];
            let frac_len = frac_rest
                .chars()
                .take_while(|c| c.is_ascii_hexdigit() || *c == '_')
                .map(char::len_utf8)
                .sum::<usize>();
            let total = consumed_digits + 1 + frac_len;
            let mut total = total;
            let imaginary = rest[total..].starts_with(['i', 'I']);
            if imaginary {
                total += 1;
            }
            let text = Rc::from(&rest[..total]);
            return Ok(Some((TokenKind::Float { text, imaginary }, total)));
        }
        let radix = match prefix {
            Some("0b") | Some("0B") => 2,
            Some("0o") | Some("0O") => 8,
            Some("0d") | Some("0D") => 10,
            Some("0x") | Some("0X") => 16,
            _ => 10,
        };
        if digits.is_empty() {
            return Err(LexError::InvalidNumber {
                text: rest[..consumed_digits].to_string(),
                span: Span { start, end: start },
            });
        }
        let text: Rc<str> = Rc::from(digits);
        Ok(Some((TokenKind::Int { text, radix }, consumed_digits)))
    }

    fn lex_string(&self, rest: &'a str, start: Position) -> Result<(TokenKind, usize), LexError> {
        let (delim, body_start) = if rest.starts_with("'''") {
            ("'''", 3)
        } else if rest.starts_with("\"\"\"") {
            ("\"\"\"", 3)
        } else {
            ("'", 1)
        };
        let mut i = body_start;
        let bytes = rest.as_bytes();
        let mut out = String::new();
        loop {
            if i >= bytes.len() {
                return Err(LexError::UnterminatedString {
                    span: Span { start, end: start },
                });
            }
            if rest[i..].starts_with(delim) {
                i += delim.len();
                break;
            }
            let ch = rest[i..].chars().next().unwrap();
            if ch == '\\' {
                let (consumed, decoded) = decode_escape(&rest[i..]).ok_or_else(|| LexError::InvalidEscape {
                    seq: rest[i..(i + 2).min(rest.len())].to_string(),
                    span: Span { start, end: start },
                })?;
                out.push(decoded);
                i += consumed;
            } else {
                out.push(ch);
                i += ch.len_utf8();
            }
        }
        Ok((TokenKind::Str(Rc::from(out.as_str())), i))
    }

    fn lex_regex(&self, rest: &'a str, start: Position) -> Result<(TokenKind, usize), LexError> {
        let body = &rest[1..];
        let end = body.find('`').ok_or(LexError::UnterminatedRegex {
            span: Span { start, end: start },
        })?;
        let text: Rc<str> = Rc::from(&body[..end]);
        Ok((TokenKind::Regex(text), 1 + end + 1))
    }

    fn lex_punct(&self, rest: &'a str, start: Position) -> Result<(TokenKind, usize), LexError> {
        // Longest match first, as spec.md §4.2 requires.
        const THREE: &[(&str, TokenKind)] = &[];
        let three = [
            ("**=", TokenKind::StarStarEq),
            ("//=", TokenKind::SlashSlashEq),
            ("===", TokenKind::EqEqEq),
            ("??=", TokenKind::QuesQuesEq),
            ("&&=", TokenKind::AndAndEq),
            ("||=", TokenKind::OrOrEq),
            ("<<=", TokenKind::ShlEq),
            (">>=", TokenKind::ShrEq),
        ];
        let _ = THREE;
        for (s, kind) in three {
            if rest.starts_with(s) {
                return Ok((kind.clone(), s.len()));
            }
        }
        let two = [
            ("**", TokenKind::StarStar),
            ("//", TokenKind::SlashSlash),
            ("++", TokenKind::PlusPlus),
            ("--", TokenKind::MinusMinus),
            ("<<", TokenKind::Shl),
            (">>", TokenKind::Shr),
            ("<=", TokenKind::Le),
            (">=", TokenKind::Ge),
            ("==", TokenKind::EqEq),
            ("!=", TokenKind::Ne),
            ("&&", TokenKind::AndAnd),
            ("||", TokenKind::OrOr),
            ("??", TokenKind::QuesQues),
            ("+=", TokenKind::PlusEq),
            ("-=", TokenKind::MinusEq),
            ("*=", TokenKind::StarEq),
            ("/=", TokenKind::SlashEq),
            ("%=", TokenKind::PercentEq),
            ("@=", TokenKind::AtEq),
            ("&=", TokenKind::AmpEq),
            ("|=", TokenKind::PipeEq),
            ("^=", TokenKind::CaretEq),
        ];
        for (s, kind) in two {
            if rest.starts_with(s) {
                return Ok((kind.clone(), s.len()));
            }
        }
        let one = [
            ('(', TokenKind::LParen),
            (')', TokenKind::RParen),
            ('[', TokenKind::LBracket),
            (']', TokenKind::RBracket),
            ('{', TokenKind::LBrace),
            ('}', TokenKind::RBrace),
            (',', TokenKind::Comma),
            ('.', TokenKind::Dot),
            (':', TokenKind::Colon),
            (';', TokenKind::Semicolon),
            ('+', TokenKind::Plus),
            ('-', TokenKind::Minus),
            ('*', TokenKind::Star),
            ('/', TokenKind::Slash),
            ('%', TokenKind::Percent),
            ('@', TokenKind::At),
            ('&', TokenKind::Amp),
            ('|', TokenKind::Pipe),
            ('^', TokenKind::Caret),
            ('~', TokenKind::Tilde),
            ('!', TokenKind::Bang),
            ('?', TokenKind::Question),
            ('<', TokenKind::Lt),
            ('>', TokenKind::Gt),
            ('=', TokenKind::Assign),
        ];
        let ch = rest.chars().next().unwrap();
        for (c, kind) in one {
            if ch == c {
                return Ok((kind.clone(), ch.len_utf8()));
            }
        }
        Err(LexError::UnexpectedChar {
            ch,
            span: Span { start, end: start },
        })
    }
}

fn keyword_or_ident(text: &str) -> TokenKind {
    match text {
        "import" => TokenKind::Import,
        "assert" => TokenKind::Assert,
        "throw" => TokenKind::Throw,
        "ret" => TokenKind::Ret,
        "break" => TokenKind::Break,
        "cont" => TokenKind::Cont,
        "if" => TokenKind::If,
        "elif" => TokenKind::Elif,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "for" => TokenKind::For,
        "try" => TokenKind::Try,
        "catch" => TokenKind::Catch,
        "finally" => TokenKind::Finally,
        "in" => TokenKind::In,
        "as" => TokenKind::As,
        "func" => TokenKind::Func,
        "type" => TokenKind::Type,
        "enum" => TokenKind::Enum,
        other => TokenKind::Ident(Rc::from(other)),
    }
}

fn lex_ident_raw(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_'),
    ))(input)
}

fn lex_number_body(input: &str) -> IResult<&str, (Option<&str>, &str)> {
    let (rest, prefix) = opt(alt((
        tag("0b"), tag("0B"), tag("0o"), tag("0O"), tag("0d"), tag("0D"), tag("0x"), tag("0X"),
    )))(input)?;
    let digit_parser = match prefix {
        Some("0b") | Some("0B") => take_while(|c: char| c == '0' || c == '1' || c == '_'),
        Some("0o") | Some("0O") => |i| oct_digit1::<&str, nom::error::Error<&str>>(i).map(|(r, d)| (r, d)).or_else(|_: nom::Err<_>| Ok::<_, nom::Err<nom::error::Error<&str>>>((i, ""))),
        Some("0x") | Some("0X") => |i| hex_digit1::<&str, nom::error::Error<&str>>(i).map(|(r, d)| (r, d)).or_else(|_: nom::Err<_>| Ok::<_, nom::Err<nom::error::Error<&str>>>((i, ""))),
        _ => |i| digit1::<&str, nom::error::Error<&str>>(i).map(|(r, d)| (r, d)).or_else(|_: nom::Err<_>| Ok::<_, nom::Err<nom::error::Error<&str>>>((i, ""))),
    };
    let (rest, digits) = preceded(many0(nchar('_')), digit_parser)(rest)?;
    Ok((rest, (prefix, digits)))
}

/// Decodes one escape sequence starting at `\\`, returning (bytes consumed, char).
fn decode_escape(s: &str) -> Option<(usize, char)> {
    let bytes = s.as_bytes();
    if bytes.get(1).is_none() {
        return None;
    }
    match bytes[1] as char {
        'n' => Some((2, '\n')),
        't' => Some((2, '\t')),
        'r' => Some((2, '\r')),
        '0' => Some((2, '\0')),
        '\\' => Some((2, '\\')),
        '\'' => Some((2, '\'')),
        '"' => Some((2, '"')),
        '`' => Some((2, '`')),
        'x' => {
            let hex = s.get(2..4)?;
            let v = u8::from_str_radix(hex, 16).ok()?;
            Some((4, v as char))
        }
        'u' => {
            let hex = s.get(2..6)?;
            let v = u32::from_str_radix(hex, 16).ok()?;
            Some((6, char::from_u32(v)?))
        }
        'U' => {
            let hex = s.get(2..10)?;
            let v = u32::from_str_radix(hex, 16).ok()?;
            Some((10, char::from_u32(v)?))
        }
        'N' => {
            // `\N[NAME]` Unicode-name lookup; only a handful of names are
            // resolved without pulling in a full Unicode data table.
            if s.get(2..3)? != "[" {
                return None;
            }
            let close = s.find(']')?;
            let name = &s[3..close];
            let ch = unicode_name_lookup(name)?;
            Some((close + 1, ch))
        }
        _ => None,
    }
}

fn unicode_name_lookup(name: &str) -> Option<char> {
    match name {
        "LATIN SMALL LETTER A" => Some('a'),
        "SPACE" => Some(' '),
        "NULL" => Some('\0'),
        "BULLET" => Some('\u{2022}'),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Scanner::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_arithmetic_expression() {
        let k = kinds("1 + 2 * 3");
        assert!(matches!(k[0], TokenKind::Int { .. }));
        assert_eq!(k[1], TokenKind::Plus);
        assert!(matches!(k[2], TokenKind::Int { .. }));
        assert_eq!(k[3], TokenKind::Star);
    }

    #[test]
    fn distinguishes_float_from_int() {
        let k = kinds("1.5");
        assert!(matches!(k[0], TokenKind::Float { .. }));
        let k2 = kinds("15");
        assert!(matches!(k2[0], TokenKind::Int { .. }));
    }

    #[test]
    fn longest_punct_match_wins() {
        let k = kinds("**= ** *");
        assert_eq!(k[0], TokenKind::StarStarEq);
        assert_eq!(k[1], TokenKind::StarStar);
        assert_eq!(k[2], TokenKind::Star);
    }

    #[test]
    fn string_escapes_decode() {
        let k = kinds(r"'a\nb'");
        match &k[0] {
            TokenKind::Str(s) => assert_eq!(s.as_ref(), "a\nb"),
            other => panic!("expected string, got {:?}", other),
        }
    }

    #[test]
    fn triple_quoted_string_spans_newlines() {
        let k = kinds("'''a\nb'''");
        match &k[0] {
            TokenKind::Str(s) => assert_eq!(s.as_ref(), "a\nb"),
            other => panic!("expected string, got {:?}", other),
        }
    }

    #[test]
    fn backtick_regex_literal() {
        let k = kinds("`a.b`");
        match &k[0] {
            TokenKind::Regex(s) => assert_eq!(s.as_ref(), "a.b"),
            other => panic!("expected regex, got {:?}", other),
        }
    }

    #[test]
    fn newline_is_a_significant_token() {
        let k = kinds("x\ny");
        assert!(matches!(k[0], TokenKind::Ident(_)));
        assert_eq!(k[1], TokenKind::Newline);
        assert!(matches!(k[2], TokenKind::Ident(_)));
    }

    #[test]
    fn unterminated_string_reports_error() {
        let err = Scanner::new("'abc").tokenize().unwrap_err();
        assert!(matches!(err, LexError::UnterminatedString { .. }));
    }
}
