//! Template text parsing.
//!
//! The template text is a relaxed literal structure: `#` comments, objects
//! and lists separated by commas and/or newlines, bare or double-quoted keys,
//! and single-quoted strings holding expressions. Text that does not open
//! with `{` is the body of an implicit top-level object.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::expr::Expression;
use crate::template::TemplateNode;

/// Remove `#` comments, honouring both quote kinds and `\` escapes.
///
/// Line structure and the columns of everything before a comment are
/// preserved, so positions reported later still point into the original text.
pub fn strip_comments(text: &str) -> String {
    text.split('\n')
        .map(strip_line_comment)
        .collect::<Vec<_>>()
        .join("\n")
}

fn strip_line_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (index, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (Some(_), '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (None, '\'' | '"') => quote = Some(c),
            (None, '#') => return line.get(..index).unwrap_or(line),
            _ => {}
        }
    }
    line
}

/// Parse template text into its node tree.
///
/// # Errors
///
/// Returns [`Error::TemplateSyntax`] with the line and column of the first
/// problem found.
pub fn parse(text: &str) -> Result<TemplateNode> {
    let cleaned = strip_comments(text);
    let tokens = tokenize(&cleaned)?;
    let mut parser = Parser { tokens, pos: 0 };
    parser.parse_document()
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Colon,
    Comma,
    Newline,
    Word(String),
    Number(Value),
    Text(String),
    Expression(String),
    End,
}

impl Tok {
    fn describe(&self) -> String {
        match self {
            Self::LBrace => "'{'".to_string(),
            Self::RBrace => "'}'".to_string(),
            Self::LBracket => "'['".to_string(),
            Self::RBracket => "']'".to_string(),
            Self::Colon => "':'".to_string(),
            Self::Comma => "','".to_string(),
            Self::Newline => "end of line".to_string(),
            Self::Word(word) => format!("'{word}'"),
            Self::Number(n) => format!("number {n}"),
            Self::Text(text) => format!("string \"{text}\""),
            Self::Expression(source) => format!("expression '{source}'"),
            Self::End => "end of template".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    line: usize,
    column: usize,
}

fn tokenize(text: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut last_line = 1;
    let mut last_column = 1;

    for (line_index, line) in text.split('\n').enumerate() {
        let line_no = line_index + 1;
        if line_index > 0 {
            tokens.push(Token {
                tok: Tok::Newline,
                line: line_no - 1,
                column: last_column,
            });
        }

        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;
        while let Some(&c) = chars.get(i) {
            let column = i + 1;
            let tok = match c {
                ' ' | '\t' | '\r' => {
                    i += 1;
                    continue;
                }
                '{' => single(&mut i, Tok::LBrace),
                '}' => single(&mut i, Tok::RBrace),
                '[' => single(&mut i, Tok::LBracket),
                ']' => single(&mut i, Tok::RBracket),
                ':' => single(&mut i, Tok::Colon),
                ',' => single(&mut i, Tok::Comma),
                '"' | '\'' => {
                    let (content, next) = quoted(&chars, i, line_no)?;
                    i = next;
                    if c == '"' {
                        Tok::Text(content)
                    } else {
                        Tok::Expression(content)
                    }
                }
                c if c.is_ascii_digit() || c == '-' => {
                    let start = i;
                    while chars
                        .get(i)
                        .is_some_and(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
                    {
                        i += 1;
                    }
                    let literal: String = chars.get(start..i).unwrap_or_default().iter().collect();
                    match serde_json::from_str::<Value>(&literal) {
                        Ok(number @ Value::Number(_)) => Tok::Number(number),
                        _ => {
                            return Err(Error::template_syntax(
                                line_no,
                                column,
                                format!("invalid number '{literal}'"),
                            ))
                        }
                    }
                }
                c if c.is_alphabetic() || c == '_' => {
                    let start = i;
                    while chars
                        .get(i)
                        .is_some_and(|c| c.is_alphanumeric() || matches!(c, '_' | '-'))
                    {
                        i += 1;
                    }
                    Tok::Word(chars.get(start..i).unwrap_or_default().iter().collect())
                }
                other => {
                    return Err(Error::template_syntax(
                        line_no,
                        column,
                        format!("unexpected character '{other}'"),
                    ))
                }
            };
            tokens.push(Token {
                tok,
                line: line_no,
                column,
            });
        }

        last_line = line_no;
        last_column = chars.len() + 1;
    }

    tokens.push(Token {
        tok: Tok::End,
        line: last_line,
        column: last_column,
    });
    Ok(tokens)
}

fn single(i: &mut usize, tok: Tok) -> Tok {
    *i += 1;
    tok
}

fn quoted(chars: &[char], start: usize, line: usize) -> Result<(String, usize)> {
    let Some(&quote) = chars.get(start) else {
        return Err(Error::template_syntax(line, start + 1, "expected string"));
    };
    let mut content = String::new();
    let mut i = start + 1;
    loop {
        match chars.get(i) {
            None => {
                return Err(Error::template_syntax(
                    line,
                    start + 1,
                    "unterminated string (strings cannot span lines)",
                ))
            }
            Some(&c) if c == quote => return Ok((content, i + 1)),
            Some('\\') => {
                let escaped = chars.get(i + 1).copied().ok_or_else(|| {
                    Error::template_syntax(line, start + 1, "unterminated string")
                })?;
                match (quote, escaped) {
                    ('"', 'n') => content.push('\n'),
                    ('"', 't') => content.push('\t'),
                    ('"', other) => content.push(other),
                    // Expressions keep their own escapes; only the quote itself is unwrapped.
                    (_, '\'') => content.push('\''),
                    (_, other) => {
                        content.push('\\');
                        content.push(other);
                    }
                }
                i += 2;
            }
            Some(&c) => {
                content.push(c);
                i += 1;
            }
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.pos).or_else(|| self.tokens.last())
    }

    fn peek(&self) -> &Tok {
        self.current().map_or(&Tok::End, |token| &token.tok)
    }

    fn position(&self) -> (usize, usize) {
        self.current()
            .map_or((1, 1), |token| (token.line, token.column))
    }

    fn advance(&mut self) -> Token {
        let token = self.current().cloned().unwrap_or(Token {
            tok: Tok::End,
            line: 1,
            column: 1,
        });
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, reason: impl Into<String>) -> Error {
        let (line, column) = self.position();
        Error::template_syntax(line, column, reason)
    }

    fn skip_newlines(&mut self) {
        while *self.peek() == Tok::Newline {
            self.advance();
        }
    }

    /// Consume the separators after an entry: newlines and at most one comma.
    fn separator(&mut self) -> Result<bool> {
        let mut seen = false;
        let mut comma = false;
        loop {
            match self.peek() {
                Tok::Newline => seen = true,
                Tok::Comma if comma => return Err(self.error("unexpected ','")),
                Tok::Comma => {
                    comma = true;
                    seen = true;
                }
                _ => return Ok(seen),
            }
            self.advance();
        }
    }

    fn parse_document(&mut self) -> Result<TemplateNode> {
        self.skip_newlines();
        let root = if *self.peek() == Tok::LBrace {
            self.parse_value()?
        } else {
            self.parse_object_body(&Tok::End)?
        };
        self.skip_newlines();
        if *self.peek() != Tok::End {
            return Err(self.error(format!(
                "unexpected {} after the template body",
                self.peek().describe()
            )));
        }
        match root {
            TemplateNode::Object(_) => Ok(root),
            _ => Err(Error::template_syntax(1, 1, "template root must be an object")),
        }
    }

    fn parse_object_body(&mut self, closer: &Tok) -> Result<TemplateNode> {
        let mut entries: Vec<(String, TemplateNode)> = Vec::new();
        loop {
            self.skip_newlines();
            if self.peek() == closer {
                break;
            }

            let (line, column) = self.position();
            let key = match self.advance().tok {
                Tok::Word(word) => word,
                Tok::Text(text) => text,
                other => {
                    return Err(Error::template_syntax(
                        line,
                        column,
                        format!("expected a key, found {}", other.describe()),
                    ))
                }
            };
            if entries.iter().any(|(existing, _)| *existing == key) {
                return Err(Error::template_syntax(
                    line,
                    column,
                    format!("duplicate key '{key}'"),
                ));
            }
            if *self.peek() != Tok::Colon {
                return Err(self.error(format!(
                    "expected ':' after key '{key}', found {}",
                    self.peek().describe()
                )));
            }
            self.advance();
            self.skip_newlines();
            let value = self.parse_value()?;
            entries.push((key, value));

            if !self.separator()? && self.peek() != closer {
                return Err(self.error(format!(
                    "expected ',' or a new line between entries, found {}",
                    self.peek().describe()
                )));
            }
        }
        Ok(TemplateNode::Object(entries))
    }

    fn parse_list_body(&mut self) -> Result<TemplateNode> {
        let mut items = Vec::new();
        loop {
            self.skip_newlines();
            if *self.peek() == Tok::RBracket {
                break;
            }
            items.push(self.parse_value()?);
            if !self.separator()? && *self.peek() != Tok::RBracket {
                return Err(self.error(format!(
                    "expected ',' or a new line between list items, found {}",
                    self.peek().describe()
                )));
            }
        }
        Ok(TemplateNode::List(items))
    }

    fn parse_value(&mut self) -> Result<TemplateNode> {
        let token = self.advance();
        match token.tok {
            Tok::LBrace => {
                let node = self.parse_object_body(&Tok::RBrace)?;
                self.close(&Tok::RBrace, token.line, token.column)?;
                Ok(node)
            }
            Tok::LBracket => {
                let node = self.parse_list_body()?;
                self.close(&Tok::RBracket, token.line, token.column)?;
                Ok(node)
            }
            Tok::Text(text) => Ok(TemplateNode::Literal(Value::String(text))),
            Tok::Number(number) => Ok(TemplateNode::Literal(number)),
            Tok::Word(word) => match word.as_str() {
                "true" => Ok(TemplateNode::Literal(Value::Bool(true))),
                "false" => Ok(TemplateNode::Literal(Value::Bool(false))),
                "null" => Ok(TemplateNode::Literal(Value::Null)),
                _ => Err(Error::template_syntax(
                    token.line,
                    token.column,
                    format!("unexpected bare word '{word}'; quote text with \"...\" or expressions with '...'"),
                )),
            },
            Tok::Expression(source) => Expression::parse(&source)
                .map(TemplateNode::Expr)
                .map_err(|err| {
                    Error::template_syntax(
                        token.line,
                        token.column + 1 + err.offset,
                        format!("in expression '{source}': {}", err.reason),
                    )
                }),
            other => Err(Error::template_syntax(
                token.line,
                token.column,
                format!("expected a value, found {}", other.describe()),
            )),
        }
    }

    fn close(&mut self, closer: &Tok, line: usize, column: usize) -> Result<()> {
        if self.peek() == closer {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!(
                "expected {} to close the one opened at line {line}, column {column}",
                closer.describe()
            )))
        }
    }
}
