use crate::error::ScriptError;
use crate::parse::MAX_NESTING;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Number(f64),
    Str(String),
    Template(Vec<TemplateChunk>),

    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semi,
    Dot,
    Question,
    Colon,
    Arrow,

    Assign,
    PlusAssign,
    MinusAssign,
    Eq,
    StrictEq,
    NotEq,
    StrictNotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    AndAnd,
    OrOr,
    PlusPlus,
    MinusMinus,

    Eof,
}

/// A piece of a template literal: raw text or the tokens of a `${...}` hole.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateChunk {
    Text(String),
    Code(Vec<Token>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::Ident(name) => return write!(f, "`{name}`"),
            TokenKind::Number(n) => return write!(f, "number `{n}`"),
            TokenKind::Str(_) => "string literal",
            TokenKind::Template(_) => "template literal",
            TokenKind::LParen => "`(`",
            TokenKind::RParen => "`)`",
            TokenKind::LBrace => "`{`",
            TokenKind::RBrace => "`}`",
            TokenKind::Comma => "`,`",
            TokenKind::Semi => "`;`",
            TokenKind::Dot => "`.`",
            TokenKind::Question => "`?`",
            TokenKind::Colon => "`:`",
            TokenKind::Arrow => "`=>`",
            TokenKind::Assign => "`=`",
            TokenKind::PlusAssign => "`+=`",
            TokenKind::MinusAssign => "`-=`",
            TokenKind::Eq => "`==`",
            TokenKind::StrictEq => "`===`",
            TokenKind::NotEq => "`!=`",
            TokenKind::StrictNotEq => "`!==`",
            TokenKind::Lt => "`<`",
            TokenKind::Le => "`<=`",
            TokenKind::Gt => "`>`",
            TokenKind::Ge => "`>=`",
            TokenKind::Plus => "`+`",
            TokenKind::Minus => "`-`",
            TokenKind::Star => "`*`",
            TokenKind::Slash => "`/`",
            TokenKind::Percent => "`%`",
            TokenKind::Bang => "`!`",
            TokenKind::AndAnd => "`&&`",
            TokenKind::OrOr => "`||`",
            TokenKind::PlusPlus => "`++`",
            TokenKind::MinusMinus => "`--`",
            TokenKind::Eof => "end of input",
        };
        f.write_str(text)
    }
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, ScriptError> {
    tokenize_with_limit(source, MAX_NESTING)
}

/// Like [`tokenize`], rejecting template literals nested deeper than `max_nesting`.
pub fn tokenize_with_limit(source: &str, max_nesting: usize) -> Result<Vec<Token>, ScriptError> {
    Lexer::new(source, 1, max_nesting).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    tokens: Vec<Token>,
    /// Template holes that may still open inside this one.
    holes_left: usize,
}

impl Lexer {
    fn new(source: &str, line: usize, holes_left: usize) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line,
            tokens: Vec::new(),
            holes_left,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn push(&mut self, kind: TokenKind, line: usize) {
        self.tokens.push(Token { kind, line });
    }

    fn run(mut self) -> Result<Vec<Token>, ScriptError> {
        while let Some(c) = self.peek() {
            let line = self.line;
            match c {
                c if c.is_whitespace() => {
                    self.bump();
                }
                '/' if self.peek_next() == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                '/' if self.peek_next() == Some('*') => {
                    self.bump();
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('*') if self.eat('/') => break,
                            Some(_) => {}
                            None => return Err(ScriptError::syntax(line, "unterminated comment")),
                        }
                    }
                }
                '"' | '\'' => {
                    self.bump();
                    let text = self.string(c, line)?;
                    self.push(TokenKind::Str(text), line);
                }
                '`' => {
                    self.bump();
                    let chunks = self.template(line)?;
                    self.push(TokenKind::Template(chunks), line);
                }
                c if c.is_ascii_digit() => {
                    let n = self.number(line)?;
                    self.push(TokenKind::Number(n), line);
                }
                c if c.is_alphabetic() || c == '_' || c == '$' => {
                    let mut name = String::new();
                    while let Some(c) = self.peek() {
                        if c.is_alphanumeric() || c == '_' || c == '$' {
                            name.push(c);
                            self.bump();
                        } else {
                            break;
                        }
                    }
                    self.push(TokenKind::Ident(name), line);
                }
                _ => {
                    self.bump();
                    let kind = self.punct(c, line)?;
                    self.push(kind, line);
                }
            }
        }
        let line = self.line;
        self.push(TokenKind::Eof, line);
        Ok(self.tokens)
    }

    fn punct(&mut self, c: char, line: usize) -> Result<TokenKind, ScriptError> {
        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semi,
            '.' => TokenKind::Dot,
            '?' => TokenKind::Question,
            ':' => TokenKind::Colon,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '+' if self.eat('+') => TokenKind::PlusPlus,
            '+' if self.eat('=') => TokenKind::PlusAssign,
            '+' => TokenKind::Plus,
            '-' if self.eat('-') => TokenKind::MinusMinus,
            '-' if self.eat('=') => TokenKind::MinusAssign,
            '-' => TokenKind::Minus,
            '=' if self.eat('>') => TokenKind::Arrow,
            '=' if self.eat('=') => {
                if self.eat('=') {
                    TokenKind::StrictEq
                } else {
                    TokenKind::Eq
                }
            }
            '=' => TokenKind::Assign,
            '!' if self.eat('=') => {
                if self.eat('=') {
                    TokenKind::StrictNotEq
                } else {
                    TokenKind::NotEq
                }
            }
            '!' => TokenKind::Bang,
            '<' if self.eat('=') => TokenKind::Le,
            '<' => TokenKind::Lt,
            '>' if self.eat('=') => TokenKind::Ge,
            '>' => TokenKind::Gt,
            '&' if self.eat('&') => TokenKind::AndAnd,
            '|' if self.eat('|') => TokenKind::OrOr,
            other => {
                return Err(ScriptError::syntax(
                    line,
                    format!("unexpected character `{other}`"),
                ));
            }
        };
        Ok(kind)
    }

    fn escape(&mut self, line: usize) -> Result<char, ScriptError> {
        match self.bump() {
            Some('n') => Ok('\n'),
            Some('t') => Ok('\t'),
            Some('r') => Ok('\r'),
            Some('0') => Ok('\0'),
            Some(c) => Ok(c),
            None => Err(ScriptError::syntax(line, "unterminated string literal")),
        }
    }

    fn string(&mut self, quote: char, line: usize) -> Result<String, ScriptError> {
        let mut text = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(text),
                Some('\\') => text.push(self.escape(line)?),
                Some('\n') | None => {
                    return Err(ScriptError::syntax(line, "unterminated string literal"));
                }
                Some(c) => text.push(c),
            }
        }
    }

    fn template(&mut self, line: usize) -> Result<Vec<TemplateChunk>, ScriptError> {
        let mut chunks = Vec::new();
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('`') => break,
                Some('\\') => text.push(self.escape(line)?),
                Some('$') if self.peek() == Some('{') => {
                    self.bump();
                    if !text.is_empty() {
                        chunks.push(TemplateChunk::Text(std::mem::take(&mut text)));
                    }
                    if self.holes_left == 0 {
                        return Err(ScriptError::syntax(line, "template literal nested too deeply"));
                    }
                    let hole_line = self.line;
                    let code = self.template_hole(line)?;
                    let mut tokens = Lexer::new(&code, hole_line, self.holes_left - 1).run()?;
                    // Drop the nested Eof; the parser appends its own.
                    tokens.pop();
                    chunks.push(TemplateChunk::Code(tokens));
                }
                Some(c) => text.push(c),
                None => return Err(ScriptError::syntax(line, "unterminated template literal")),
            }
        }
        if !text.is_empty() || chunks.is_empty() {
            chunks.push(TemplateChunk::Text(text));
        }
        Ok(chunks)
    }

    /// Source text of a `${...}` hole, up to the matching close brace.
    fn template_hole(&mut self, line: usize) -> Result<String, ScriptError> {
        let mut depth = 0usize;
        let mut code = String::new();
        let mut quote: Option<char> = None;
        loop {
            let Some(c) = self.bump() else {
                return Err(ScriptError::syntax(line, "unterminated template literal"));
            };
            match quote {
                Some(q) => {
                    if c == '\\' {
                        code.push(c);
                        if let Some(next) = self.bump() {
                            code.push(next);
                        }
                        continue;
                    }
                    if c == q {
                        quote = None;
                    }
                }
                None => match c {
                    '\'' | '"' => quote = Some(c),
                    '{' => depth += 1,
                    '}' if depth == 0 => return Ok(code),
                    '}' => depth -= 1,
                    _ => {}
                },
            }
            code.push(c);
        }
    }

    fn number(&mut self, line: usize) -> Result<f64, ScriptError> {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                if c != '_' {
                    text.push(c);
                }
                self.bump();
            } else {
                break;
            }
        }
        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            text.push('.');
            self.bump();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
        }
        text.parse::<f64>()
            .map_err(|_| ScriptError::syntax(line, format!("invalid number `{text}`")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_operators_prefer_longest_match() {
        assert_eq!(
            kinds("a === b !== c => d"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::StrictEq,
                TokenKind::Ident("b".into()),
                TokenKind::StrictNotEq,
                TokenKind::Ident("c".into()),
                TokenKind::Arrow,
                TokenKind::Ident("d".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_lines_are_tracked_across_comments() {
        let tokens = tokenize("a\n// note\n/* x\n y */ b").unwrap();
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[1].line, 4);
    }

    #[test]
    fn test_template_holes_are_lexed() {
        let tokens = tokenize("`n = ${n + 1}!`").unwrap();
        let TokenKind::Template(chunks) = &tokens[0].kind else {
            panic!("expected template");
        };
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], TemplateChunk::Text("n = ".into()));
        assert!(matches!(&chunks[1], TemplateChunk::Code(code) if code.len() == 3));
        assert_eq!(chunks[2], TemplateChunk::Text("!".into()));
    }

    #[test]
    fn test_unterminated_string_reports_line() {
        let err = tokenize("\nconsole.log('oops").unwrap_err();
        assert_eq!(err.line(), Some(2));
    }

    #[test]
    fn test_template_nesting_is_bounded() {
        let mut source = "1".to_string();
        for _ in 0..3 {
            source = format!("`${{{source}}}`");
        }
        assert!(tokenize_with_limit(&source, 3).is_ok());

        let err = tokenize_with_limit(&source, 2).unwrap_err();
        assert!(err.to_string().contains("nested too deeply"));
    }
}
