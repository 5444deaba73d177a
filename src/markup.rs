//! Markup tokens for reading segments.
//!
//! Segment content is a small HTML fragment (`<b>`, `<br>`, the occasional
//! `<span>`). Rewriting passes copy tags and entities through byte-for-byte and
//! only insert markup around visible text.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

/// One lexical unit of a markup fragment. Every variant borrows its raw source
/// slice, so concatenating `raw()` over all tokens reproduces the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    Tag(Tag<'a>),
    Text(&'a str),
    /// A character reference such as `&amp;` or `&#233;`.
    Entity(&'a str),
}

impl<'a> Token<'a> {
    pub fn raw(&self) -> &'a str {
        match self {
            Token::Tag(tag) => tag.raw,
            Token::Text(text) | Token::Entity(text) => text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Open,
    Close,
    /// Explicit `<x/>` or a void element like `<br>`.
    SelfClosing,
    /// Comments, doctypes, processing instructions.
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag<'a> {
    pub raw: &'a str,
    pub name: &'a str,
    pub kind: TagKind,
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track", "wbr",
];

impl<'a> Tag<'a> {
    /// `None` when the bracketed text is not a real tag (`< 4`, `</>`).
    fn new(raw: &'a str, name_len: usize, kind: TagKind) -> Option<Self> {
        let name_start = if kind == TagKind::Close { 2 } else { 1 };
        let name = raw.get(name_start..name_start + name_len)?;
        if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
            return None;
        }
        let kind = if kind == TagKind::Open && VOID_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(name)) {
            TagKind::SelfClosing
        } else {
            kind
        };
        Some(Tag { raw, name, kind })
    }

    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn is_open(&self, name: &str) -> bool {
        self.kind == TagKind::Open && self.is(name)
    }

    pub fn is_close(&self, name: &str) -> bool {
        self.kind == TagKind::Close && self.is(name)
    }

    /// Decoded value of attribute `name`, `Some("")` for a bare attribute.
    pub fn attr(&self, name: &str) -> Option<String> {
        if self.kind != TagKind::Open && self.kind != TagKind::SelfClosing {
            return None;
        }
        let inner = &self.raw[1..self.raw.len() - 1];
        let inner = inner.strip_suffix('/').unwrap_or(inner);
        let start = BytesStart::from_content(inner, self.name.len());
        start
            .html_attributes()
            .filter_map(Result::ok)
            .find(|a| a.key.as_ref().eq_ignore_ascii_case(name.as_bytes()))
            .map(|a| decode_entities(&String::from_utf8_lossy(&a.value)))
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
    }
}

/// Split `markup` into tags, text runs and entities. A `<` or `&` that does not
/// start a well-formed tag or entity is kept as text.
///
/// Tags are read with quick-xml in lenient mode (no end-name checks, unmatched
/// ends allowed). Every token is sliced from the input, so the output always
/// concatenates back to `markup`.
pub fn tokenize(markup: &str) -> Vec<Token<'_>> {
    let mut out = TokenSink { markup, tokens: Vec::new(), text: None };
    let mut cursor = 0;
    'restart: while cursor < markup.len() {
        let base = cursor;
        let mut reader = Reader::from_str(&markup[base..]);
        let config = reader.config_mut();
        config.check_end_names = false;
        config.allow_unmatched_ends = true;

        loop {
            let event = reader.read_event();
            let consumed = base + usize::try_from(reader.buffer_position()).unwrap_or(usize::MAX);
            let tag = match event {
                Ok(Event::Eof) => break 'restart,
                Ok(Event::Text(text)) => {
                    out.text(cursor, cursor + text.len());
                    cursor += text.len();
                    continue;
                }
                Ok(Event::GeneralRef(reference)) => {
                    let end = cursor + reference.len() + 2;
                    if entity_end(markup.as_bytes(), cursor) == Some(end) {
                        out.text(cursor, end);
                        cursor = end;
                        continue;
                    }
                    None
                }
                Ok(Event::Start(e)) => tag_at(markup, cursor, consumed, e.name().as_ref().len(), TagKind::Open),
                Ok(Event::Empty(e)) => {
                    tag_at(markup, cursor, consumed, e.name().as_ref().len(), TagKind::SelfClosing)
                }
                Ok(Event::End(e)) => tag_at(markup, cursor, consumed, e.name().as_ref().len(), TagKind::Close),
                Ok(_) => markup
                    .get(cursor..consumed)
                    .filter(|raw| raw.starts_with('<'))
                    .map(|raw| Tag { raw, name: "", kind: TagKind::Other }),
                Err(_) => None,
            };
            match tag {
                Some(tag) => {
                    out.tag(tag);
                    cursor += tag.raw.len();
                }
                None => {
                    // Not markup after all: keep one character as text and rescan after it.
                    let Some(first) = markup[cursor..].chars().next() else {
                        break 'restart;
                    };
                    let skip = first.len_utf8();
                    out.text(cursor, cursor + skip);
                    cursor += skip;
                    continue 'restart;
                }
            }
        }
    }
    if cursor < markup.len() {
        out.text(cursor, markup.len());
    }
    out.finish()
}

fn tag_at(markup: &str, start: usize, end: usize, name_len: usize, kind: TagKind) -> Option<Tag<'_>> {
    Tag::new(markup.get(start..end)?, name_len, kind)
}

/// Accumulates tokens, merging adjacent text and splitting out entities.
struct TokenSink<'a> {
    markup: &'a str,
    tokens: Vec<Token<'a>>,
    /// Pending text range not yet pushed.
    text: Option<(usize, usize)>,
}

impl<'a> TokenSink<'a> {
    fn text(&mut self, start: usize, end: usize) {
        let mut pos = start;
        while let Some(found) = self.markup[pos..end].find('&') {
            let amp = pos + found;
            match entity_end(&self.markup.as_bytes()[..end], amp) {
                Some(entity_end) => {
                    self.extend_text(pos, amp);
                    self.flush_text();
                    self.tokens.push(Token::Entity(&self.markup[amp..entity_end]));
                    pos = entity_end;
                }
                None => {
                    self.extend_text(pos, amp + 1);
                    pos = amp + 1;
                }
            }
        }
        self.extend_text(pos, end);
    }

    fn extend_text(&mut self, start: usize, end: usize) {
        if start < end {
            let from = self.text.map_or(start, |(from, _)| from);
            self.text = Some((from, end));
        }
    }

    fn flush_text(&mut self) {
        if let Some((from, to)) = self.text.take() {
            self.tokens.push(Token::Text(&self.markup[from..to]));
        }
    }

    fn tag(&mut self, tag: Tag<'a>) {
        self.flush_text();
        self.tokens.push(Token::Tag(tag));
    }

    fn finish(mut self) -> Vec<Token<'a>> {
        self.flush_text();
        self.tokens
    }
}

fn entity_end(bytes: &[u8], start: usize) -> Option<usize> {
    const MAX_ENTITY_LEN: usize = 32;
    let body = bytes.get(start + 1..)?;
    let len = body
        .iter()
        .take(MAX_ENTITY_LEN)
        .take_while(|b| b.is_ascii_alphanumeric() || **b == b'#')
        .count();
    (len > 0 && body.get(len) == Some(&b';')).then_some(start + 1 + len + 1)
}

/// Index of the tag closing the element opened at `tokens[open]`.
pub fn matching_close(tokens: &[Token<'_>], open: usize) -> Option<usize> {
    let Some(Token::Tag(opening)) = tokens.get(open) else {
        return None;
    };
    let mut depth = 0usize;
    for (idx, token) in tokens.iter().enumerate().skip(open) {
        if let Token::Tag(tag) = token {
            if tag.is_open(opening.name) {
                depth += 1;
            } else if tag.is_close(opening.name) {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
        }
    }
    None
}

/// Visible text of a fragment: tags dropped, entities decoded.
pub fn plain_text(markup: &str) -> String {
    let mut out = String::with_capacity(markup.len());
    for token in tokenize(markup) {
        match token {
            Token::Tag(_) => {}
            Token::Text(text) => out.push_str(text),
            Token::Entity(raw) => out.push_str(&decode_entities(raw)),
        }
    }
    out
}

pub const WORD_CLASS: &str = "word";

/// Wrap every visible word in `<span class="word" data-word-index="n">` so the
/// host can paint per-word highlights. Punctuation-only runs stay unwrapped.
/// Words already wrapped by an earlier pass are counted, not wrapped again.
/// Returns the rewritten markup and the number of indexed words.
pub fn index_words(markup: &str) -> (String, usize) {
    let tokens = tokenize(markup);
    let mut out = String::with_capacity(markup.len() * 2);
    let mut count = 0usize;
    let mut i = 0;
    while i < tokens.len() {
        match tokens[i] {
            Token::Tag(tag) if tag.is_open("span") && tag.has_class(WORD_CLASS) => {
                let stop = matching_close(&tokens, i).map_or(tokens.len(), |c| c + 1);
                for token in &tokens[i..stop] {
                    out.push_str(token.raw());
                }
                count += 1;
                i = stop;
                continue;
            }
            Token::Text(text) => {
                let mut rest = text;
                while !rest.is_empty() {
                    let ws = rest.len() - rest.trim_start().len();
                    out.push_str(&rest[..ws]);
                    rest = &rest[ws..];
                    let word_len = rest.find(char::is_whitespace).unwrap_or(rest.len());
                    let word = &rest[..word_len];
                    if word.chars().any(char::is_alphanumeric) {
                        out.push_str(&format!(
                            "<span class=\"{WORD_CLASS}\" data-word-index=\"{count}\">{word}</span>"
                        ));
                        count += 1;
                    } else {
                        out.push_str(word);
                    }
                    rest = &rest[word_len..];
                }
            }
            other => out.push_str(other.raw()),
        }
        i += 1;
    }
    (out, count)
}

/// Decode the handful of character references reading content actually uses.
/// Unknown references are kept verbatim.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    for token in tokenize_entities(text) {
        match token {
            Token::Entity(raw) => match decode_entity(&raw[1..raw.len() - 1]) {
                Some(c) => out.push(c),
                None => out.push_str(raw),
            },
            other => out.push_str(other.raw()),
        }
    }
    out
}

// Entity-only scan: attribute values may legitimately contain '<'.
fn tokenize_entities(text: &str) -> Vec<Token<'_>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'&' {
            if let Some(end) = entity_end(bytes, i) {
                if text_start < i {
                    tokens.push(Token::Text(&text[text_start..i]));
                }
                tokens.push(Token::Entity(&text[i..end]));
                i = end;
                text_start = end;
                continue;
            }
        }
        i += 1;
    }
    if text_start < bytes.len() {
        tokens.push(Token::Text(&text[text_start..]));
    }
    tokens
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        "aacute" => Some('á'),
        "eacute" => Some('é'),
        "iacute" => Some('í'),
        "oacute" => Some('ó'),
        "uacute" => Some('ú'),
        "ntilde" => Some('ñ'),
        "iexcl" => Some('¡'),
        "iquest" => Some('¿'),
        _ => {
            let digits = name.strip_prefix('#')?;
            let value = match digits.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => digits.parse().ok()?,
            };
            char::from_u32(value)
        }
    }
}

/// Escape for use inside a double-quoted attribute value.
pub fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape for use as element text.
pub fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
