//! Scanning of custom directive tags in template source.
//!
//! Handlebars does not tell helpers where in the source they were called from, so directives that
//! depend on their position are found here and rewritten before the template is compiled.

use ::std::{
    error::Error,
    fmt::{self, Display, Formatter},
};

/// Text that opens a mustache tag.
pub(crate) const OPEN: &str = "{{";

/// A saved cursor location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Position {
    offset: usize,
    line_start: usize,
    line: usize,
    column: usize,
}

impl Position {
    const START: Self = Self {
        offset: 0,
        line_start: 0,
        line: 1,
        column: 0,
    };

    /// Byte offset into the source.
    pub(crate) fn offset(self) -> usize {
        self.offset
    }

    /// 1-based line number.
    pub(crate) fn line(self) -> usize {
        self.line
    }

    /// 0-based column, counted in characters.
    pub(crate) fn column(self) -> usize {
        self.column
    }
}

/// Seekable cursor over template source that keeps track of lines and columns.
pub(crate) struct Cursor<'s> {
    src: &'s str,
    pos: Position,
}

impl<'s> Cursor<'s> {
    pub(crate) fn new(src: &'s str) -> Self {
        Self {
            src,
            pos: Position::START,
        }
    }

    pub(crate) fn position(&self) -> Position {
        self.pos
    }

    pub(crate) fn seek(&mut self, pos: Position) {
        self.pos = pos;
    }

    pub(crate) fn rest(&self) -> &'s str {
        &self.src[self.pos.offset..]
    }

    /// Source text between `from` and the cursor.
    pub(crate) fn since(&self, from: Position) -> &'s str {
        &self.src[from.offset..self.pos.offset]
    }

    pub(crate) fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    pub(crate) fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos.offset += c.len_utf8();
        if c == '\n' {
            self.pos.line += 1;
            self.pos.line_start = self.pos.offset;
            self.pos.column = 0;
        } else {
            self.pos.column += 1;
        }
        Some(c)
    }

    pub(crate) fn eat(&mut self, s: &str) -> bool {
        if !self.rest().starts_with(s) {
            return false;
        }
        for _ in s.chars() {
            self.bump();
        }
        true
    }

    pub(crate) fn skip_whitespace(&mut self) {
        while self.peek().map_or(false, char::is_whitespace) {
            self.bump();
        }
    }

    /// Move to the start of the next occurrence of `pattern`, or to the end if there is none.
    pub(crate) fn advance_to(&mut self, pattern: &str) -> bool {
        let Some(index) = self.rest().find(pattern) else {
            while self.bump().is_some() {}
            return false;
        };
        let target = self.pos.offset + index;
        while self.pos.offset < target {
            self.bump();
        }
        true
    }

    /// Seek back to the start of the current line, returning the text that was skipped over.
    ///
    /// Returns `None` if the line buffer can't be sliced at the cursor.
    fn rewind_line(&mut self) -> Option<&'s str> {
        let line = self.src.get(self.pos.line_start..self.pos.offset);
        self.pos.offset = self.pos.line_start;
        self.pos.column = 0;
        line
    }
}

/// Indentation of the line the cursor is on, counted up to the cursor's column.
///
/// The cursor ends up where it started.
pub(crate) fn indentation(cursor: &mut Cursor<'_>) -> usize {
    let saved = cursor.position();
    let line = cursor.rewind_line();
    let width = indent_width(line, saved.column());
    cursor.seek(saved);
    width
}

/// Number of leading spaces in `line`, looking no further than `column` characters.
///
/// Without a line to look at, assume the directive directly follows an [`OPEN`] at the start of
/// its indentation.
pub(crate) fn indent_width(line: Option<&str>, column: usize) -> usize {
    match line {
        Some(line) => line.chars().take(column).take_while(|&c| c == ' ').count(),
        None => column.saturating_sub(OPEN.len()),
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Argument<'s> {
    Positional(&'s str),
    Hash { key: &'s str, value: &'s str },
}

/// Arguments of a tag, as written in the source.
#[derive(Debug)]
pub(crate) struct Signature<'s> {
    pub(crate) arguments: Vec<Argument<'s>>,
    /// Where the closing `}}` starts, or the `~` in front of it.
    pub(crate) close: Position,
}

/// One occurrence of a directive.
#[derive(Debug)]
pub(crate) struct Tag<'s> {
    /// Position of the directive's keyword.
    pub(crate) keyword: Position,
    pub(crate) indent: usize,
    pub(crate) signature: Signature<'s>,
}

/// Find every `{{keyword ...}}` tag in `src`.
///
/// Comments and escaped tags are skipped. Anything that doesn't look like the directive is left
/// for handlebars to deal with.
pub(crate) fn scan<'s>(src: &'s str, keyword: &'static str) -> Result<Vec<Tag<'s>>, ParseError> {
    let mut cursor = Cursor::new(src);
    let mut tags = Vec::new();

    while cursor.advance_to(OPEN) {
        let escaped = src[..cursor.position().offset()].ends_with('\\');
        cursor.eat(OPEN);
        if escaped {
            continue;
        }

        if cursor.eat("!") {
            let close = if cursor.eat("--") { "--}}" } else { "}}" };
            // An unclosed comment is reported by handlebars.
            if !cursor.advance_to(close) {
                break;
            }
            cursor.eat(close);
            continue;
        }

        if cursor.eat(OPEN) {
            // An unclosed raw block is reported by handlebars.
            if !skip_raw_block(&mut cursor) {
                break;
            }
            continue;
        }

        let after_open = cursor.position();
        cursor.eat("{");
        cursor.eat("~");
        let block = cursor.eat("#");
        cursor.skip_whitespace();

        let keyword_pos = cursor.position();
        let indent = indentation(&mut cursor);
        if !eat_keyword(&mut cursor, keyword) {
            cursor.seek(after_open);
            continue;
        }
        if block {
            return Err(ParseError::new(keyword, keyword_pos, ParseErrorKind::Block));
        }

        let signature = parse_signature(&mut cursor, keyword, keyword_pos)?;
        tags.push(Tag {
            keyword: keyword_pos,
            indent,
            signature,
        });
    }

    Ok(tags)
}

/// Skip the rest of a `{{{{helper}}}} ... {{{{/helper}}}}` block, whose body handlebars leaves
/// unparsed. The cursor starts just after the opening `{{{{`.
fn skip_raw_block(cursor: &mut Cursor<'_>) -> bool {
    const CLOSE: &str = "}}}}";

    let start = cursor.position();
    if !cursor.advance_to(CLOSE) {
        return false;
    }
    let helper = cursor.since(start).split_whitespace().next().unwrap_or("");
    cursor.eat(CLOSE);

    let end = ["{{{{/", helper, CLOSE].concat();
    if !cursor.advance_to(&end) {
        return false;
    }
    cursor.eat(&end);
    true
}

fn eat_keyword(cursor: &mut Cursor<'_>, keyword: &str) -> bool {
    let Some(after) = cursor.rest().strip_prefix(keyword) else {
        return false;
    };
    let boundary = after
        .chars()
        .next()
        .map_or(true, |c| c.is_whitespace() || c == '}' || c == '~');
    boundary && cursor.eat(keyword)
}

/// Parse the arguments of a tag up to and including its closing `}}`.
fn parse_signature<'s>(
    cursor: &mut Cursor<'s>,
    tag: &'static str,
    keyword: Position,
) -> Result<Signature<'s>, ParseError> {
    let mut arguments = Vec::new();

    loop {
        cursor.skip_whitespace();
        let start = cursor.position();

        let rest = cursor.rest();
        if rest.starts_with("~}}") || rest.starts_with("}}") {
            cursor.eat("~");
            cursor.eat("}}");
            return Ok(Signature {
                arguments,
                close: start,
            });
        }
        if rest.is_empty() {
            return Err(ParseError::new(tag, keyword, ParseErrorKind::Unclosed));
        }

        let word = scan_word(cursor);
        if !word.is_empty() && cursor.peek() == Some('=') {
            cursor.bump();
            let value = scan_value(cursor, tag)?;
            arguments.push(Argument::Hash { key: word, value });
        } else {
            cursor.seek(start);
            arguments.push(Argument::Positional(scan_value(cursor, tag)?));
        }
    }
}

fn scan_value<'s>(cursor: &mut Cursor<'s>, tag: &'static str) -> Result<&'s str, ParseError> {
    let start = cursor.position();
    match cursor.peek() {
        Some(quote @ ('"' | '\'')) => {
            cursor.bump();
            scan_string(cursor, quote, tag, start)?;
        }
        Some('(') => {
            let mut depth = 0_usize;
            loop {
                match cursor.bump() {
                    Some('(') => depth += 1,
                    Some(')') => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    Some(quote @ ('"' | '\'')) => {
                        let string_start = cursor.position();
                        scan_string(cursor, quote, tag, string_start)?;
                    }
                    Some(_) => {}
                    None => {
                        return Err(ParseError::new(
                            tag,
                            start,
                            ParseErrorKind::UnbalancedParenthesis,
                        ))
                    }
                }
            }
        }
        _ => {
            if scan_word(cursor).is_empty() {
                let c = cursor.peek().unwrap_or('}');
                return Err(ParseError::new(tag, start, ParseErrorKind::Unexpected(c)));
            }
        }
    }
    Ok(cursor.since(start))
}

fn scan_string(
    cursor: &mut Cursor<'_>,
    quote: char,
    tag: &'static str,
    start: Position,
) -> Result<(), ParseError> {
    loop {
        match cursor.bump() {
            Some('\\') => {
                cursor.bump();
            }
            Some(c) if c == quote => return Ok(()),
            Some(_) => {}
            None => {
                return Err(ParseError::new(
                    tag,
                    start,
                    ParseErrorKind::UnterminatedString,
                ))
            }
        }
    }
}

fn scan_word<'s>(cursor: &mut Cursor<'s>) -> &'s str {
    let start = cursor.position();
    while cursor
        .peek()
        .map_or(false, |c| !c.is_whitespace() && !"=(){}\"'~".contains(c))
    {
        cursor.bump();
    }
    cursor.since(start)
}

#[derive(Debug)]
pub(crate) struct ParseError {
    tag: &'static str,
    line: usize,
    column: usize,
    kind: ParseErrorKind,
}

impl ParseError {
    pub(crate) fn new(tag: &'static str, at: Position, kind: ParseErrorKind) -> Self {
        Self {
            tag,
            line: at.line(),
            column: at.column() + 1,
            kind,
        }
    }

    pub(crate) fn kind(&self) -> &ParseErrorKind {
        &self.kind
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to parse `{}` at line {}, column {}",
            self.tag, self.line, self.column
        )
    }
}

impl Error for ParseError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.kind)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ParseErrorKind {
    Unclosed,
    UnterminatedString,
    UnbalancedParenthesis,
    Unexpected(char),
    Block,
    MissingTemplate,
    ReservedArgument(&'static str),
}

impl Display for ParseErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unclosed => f.write_str("no closing `}}`"),
            Self::UnterminatedString => f.write_str("unterminated string literal"),
            Self::UnbalancedParenthesis => f.write_str("no closing `)`"),
            Self::Unexpected(c) => write!(f, "unexpected character `{c}`"),
            Self::Block => f.write_str("directive cannot be used as a block"),
            Self::MissingTemplate => f.write_str("expected a template path"),
            Self::ReservedArgument(name) => {
                write!(f, "`{name}` is computed from the source and cannot be passed")
            }
        }
    }
}

impl Error for ParseErrorKind {}
