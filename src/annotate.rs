//! Vocabulary annotation of segment markup.
//!
//! Matching runs over the visible text of a segment: entities count as the
//! character they stand for, and inline formatting (`<b>`, `<i>`, ...) is
//! transparent. Every whole-word, case-insensitive occurrence of a glossary
//! word is wrapped in
//!
//! ```html
//! <span class="vocab-word" data-word="teeth">Teeth</span>
//! ```
//!
//! An occurrence that crosses a formatting tag is split into one span per
//! side, the later ones marked `data-continued`, so the output stays well
//! nested. Spans produced by an earlier pass are recognised and passed
//! through, so annotating already annotated markup changes nothing.

use crate::content::{IGNORED_PUNCTUATION, VocabularyMap};
use crate::markup::{self, Tag, TagKind, Token};

pub const VOCAB_CLASS: &str = "vocab-word";
const CONTINUED_ATTR: &str = "data-continued";

/// Formatting tags a glossary phrase may run across.
const INLINE_TAGS: &[&str] = &["b", "strong", "i", "em", "u"];

/// Stands in for an entity we cannot decode; never part of a word.
const OPAQUE: char = '\u{fffd}';

/// A click target for the host to bind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VocabMatch {
    /// Source text covered by the target, as written in the segment.
    pub matched_text: String,
    /// Glossary word used to look the definition up.
    pub canonical_word: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedMarkup {
    pub markup: String,
    pub matches: Vec<VocabMatch>,
}

struct Phrase {
    /// Lower-cased normalized word; a single ' ' stands for any whitespace run.
    chars: Vec<char>,
    canonical: String,
}

/// One visible character and the source bytes it came from.
#[derive(Clone, Copy)]
struct Visible {
    c: char,
    start: usize,
    end: usize,
}

/// Matcher compiled from one [`VocabularyMap`]; reuse it for every segment
/// of a reading.
pub struct VocabAnnotator {
    phrases: Vec<Phrase>,
}

impl VocabAnnotator {
    pub fn new(vocab: &VocabularyMap) -> Self {
        let mut phrases: Vec<Phrase> = vocab
            .keyed()
            .filter(|(key, _)| !key.is_empty())
            .map(|(key, entry)| Phrase {
                chars: key.chars().collect(),
                canonical: entry.word.clone(),
            })
            .collect();
        // Longest first, then alphabetical, so ties resolve the same way every run.
        phrases.sort_by(|a, b| b.chars.len().cmp(&a.chars.len()).then(a.chars.cmp(&b.chars)));
        Self { phrases }
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    pub fn annotate(&self, segment_markup: &str) -> AnnotatedMarkup {
        let tokens = markup::tokenize(segment_markup);
        let mut out = String::with_capacity(segment_markup.len() + 64);
        let mut matches = Vec::new();
        // First token and byte offset of the pending run of text, entities and inline tags.
        let mut run: Option<(usize, usize)> = None;
        let mut offset = 0;
        let mut i = 0;
        while i < tokens.len() {
            let token = tokens[i];
            let start = offset;
            offset += token.raw().len();
            match token {
                Token::Tag(tag) if tag.is_open("span") && tag.has_class(VOCAB_CLASS) => {
                    self.flush_run(segment_markup, &tokens, run.take(), i, &mut out, &mut matches);
                    let stop = pass_through(&tokens, i, tag, &mut out, &mut matches);
                    offset = start + tokens[i..stop].iter().map(|t| t.raw().len()).sum::<usize>();
                    i = stop;
                    continue;
                }
                Token::Tag(tag) if !is_inline(&tag) => {
                    self.flush_run(segment_markup, &tokens, run.take(), i, &mut out, &mut matches);
                    out.push_str(tag.raw);
                }
                _ => {
                    run.get_or_insert((i, start));
                }
            }
            i += 1;
        }
        self.flush_run(segment_markup, &tokens, run, tokens.len(), &mut out, &mut matches);
        AnnotatedMarkup { markup: out, matches }
    }

    /// Annotate `tokens[first..end]`, which start at byte `from` of `source`.
    fn flush_run(
        &self,
        source: &str,
        tokens: &[Token<'_>],
        run: Option<(usize, usize)>,
        end: usize,
        out: &mut String,
        matches: &mut Vec<VocabMatch>,
    ) {
        let Some((first, from)) = run else {
            return;
        };
        let to = from + tokens[first..end].iter().map(|t| t.raw().len()).sum::<usize>();
        if self.phrases.is_empty() {
            out.push_str(&source[from..to]);
            return;
        }
        let mut visible = Vec::new();
        let mut tags = Vec::new();
        let mut offset = from;
        for &token in &tokens[first..end] {
            let start = offset;
            offset += token.raw().len();
            match token {
                Token::Tag(_) => tags.push((start, offset)),
                Token::Text(text) => visible.extend(text.char_indices().map(|(k, c)| Visible {
                    c,
                    start: start + k,
                    end: start + k + c.len_utf8(),
                })),
                Token::Entity(raw) => visible.push(Visible { c: decode_one(raw), start, end: offset }),
            }
        }

        let chars: Vec<char> = visible.iter().map(|v| v.c).collect();
        let mut copied = from;
        let mut pos = 0;
        while pos < chars.len() {
            let word_start = is_word_char(chars[pos]) && (pos == 0 || !is_word_char(chars[pos - 1]));
            if let Some((end, phrase)) = word_start.then(|| self.longest_match(&chars, pos)).flatten() {
                let (start, stop) = (visible[pos].start, visible[end - 1].end);
                out.push_str(&source[copied..start]);
                matches.push(wrap(source, start, stop, &tags, &phrase.canonical, out));
                copied = stop;
                pos = end;
                continue;
            }
            pos += 1;
        }
        out.push_str(&source[copied..to]);
    }

    /// Longest phrase matching at `start` and ending on a word boundary.
    fn longest_match(&self, chars: &[char], start: usize) -> Option<(usize, &Phrase)> {
        let mut best: Option<(usize, &Phrase)> = None;
        for phrase in &self.phrases {
            let Some(end) = match_at(chars, start, &phrase.chars) else {
                continue;
            };
            let bounded = chars.get(end).is_none_or(|&c| !is_word_char(c));
            if bounded && best.is_none_or(|(best_end, _)| end > best_end) {
                best = Some((end, phrase));
            }
        }
        best
    }
}

/// One-shot convenience over [`VocabAnnotator`].
pub fn annotate(segment_markup: &str, vocab: &VocabularyMap) -> AnnotatedMarkup {
    VocabAnnotator::new(vocab).annotate(segment_markup)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_inline(tag: &Tag<'_>) -> bool {
    matches!(tag.kind, TagKind::Open | TagKind::Close) && INLINE_TAGS.iter().any(|name| tag.is(name))
}

fn decode_one(raw: &str) -> char {
    let decoded = markup::decode_entities(raw);
    let mut chars = decoded.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => c,
        _ => OPAQUE,
    }
}

/// Copy an earlier pass's span verbatim. Returns the index after its close tag.
fn pass_through(
    tokens: &[Token<'_>],
    open: usize,
    tag: Tag<'_>,
    out: &mut String,
    matches: &mut Vec<VocabMatch>,
) -> usize {
    let close = markup::matching_close(tokens, open);
    let inner_end = close.unwrap_or(tokens.len());
    let text: String = tokens[open + 1..inner_end]
        .iter()
        .filter(|t| !matches!(t, Token::Tag(_)))
        .map(Token::raw)
        .collect();
    let stop = close.map_or(tokens.len(), |c| c + 1);
    for token in &tokens[open..stop] {
        out.push_str(token.raw());
    }
    match matches.last_mut() {
        Some(last) if tag.attr(CONTINUED_ATTR).is_some() => last.matched_text.push_str(&text),
        _ => {
            let canonical_word = tag
                .attr("data-word")
                .unwrap_or_else(|| markup::decode_entities(&text));
            matches.push(VocabMatch { matched_text: text, canonical_word });
        }
    }
    stop
}

/// Wrap `source[start..stop]`, splitting around the tags inside it.
fn wrap(
    source: &str,
    start: usize,
    stop: usize,
    tags: &[(usize, usize)],
    canonical: &str,
    out: &mut String,
) -> VocabMatch {
    let word = markup::escape_attr(canonical);
    let mut matched_text = String::new();
    let mut piece_start = start;
    let inner = tags.iter().copied().filter(|&(s, e)| s >= start && e <= stop);
    for (tag_start, tag_end) in inner.chain([(stop, stop)]) {
        let piece = &source[piece_start..tag_start];
        if !piece.is_empty() {
            let continued = if matched_text.is_empty() { String::new() } else { format!(" {CONTINUED_ATTR}") };
            out.push_str(&format!(
                "<span class=\"{VOCAB_CLASS}\" data-word=\"{word}\"{continued}>{piece}</span>"
            ));
            matched_text.push_str(piece);
        }
        out.push_str(&source[tag_start..tag_end]);
        piece_start = tag_end;
    }
    VocabMatch { matched_text, canonical_word: canonical.to_string() }
}

/// Index just past `phrase` if it occurs case-insensitively at `start`.
///
/// A phrase space matches any whitespace run, optionally preceded by sentence
/// punctuation. Punctuation inside the phrase may be missing from the text.
fn match_at(chars: &[char], start: usize, phrase: &[char]) -> Option<usize> {
    let mut i = start;
    let mut p = 0;
    while p < phrase.len() {
        let want = phrase[p];
        if want == ' ' {
            while chars.get(i).is_some_and(|c| IGNORED_PUNCTUATION.contains(c)) {
                i += 1;
            }
            if !chars.get(i).is_some_and(|c| c.is_whitespace()) {
                return None;
            }
            while chars.get(i).is_some_and(|c| c.is_whitespace()) {
                i += 1;
            }
            p += 1;
            continue;
        }
        match chars.get(i).and_then(|&c| folds_to(c, &phrase[p..])) {
            Some(n) => {
                p += n;
                i += 1;
            }
            None if !is_word_char(want) => p += 1,
            None => return None,
        }
    }
    Some(i)
}

/// Number of phrase chars `c` covers once lower-cased.
fn folds_to(c: char, phrase: &[char]) -> Option<usize> {
    let mut n = 0;
    for lower in c.to_lowercase() {
        if phrase.get(n) != Some(&lower) {
            return None;
        }
        n += 1;
    }
    Some(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::VocabularyEntry;
    use rstest::rstest;

    fn vocab(words: &[&str]) -> VocabularyMap {
        VocabularyMap::from_entries(words.iter().map(|w| VocabularyEntry {
            word: w.to_string(),
            definition: format!("def of {w}"),
        }))
    }

    fn matched(out: &AnnotatedMarkup) -> Vec<&str> {
        out.matches.iter().map(|m| m.matched_text.as_str()).collect()
    }

    #[test]
    fn wraps_only_the_word() {
        let out = annotate("She brushes her teeth.", &vocab(&["teeth"]));
        assert_eq!(
            out.markup,
            r#"She brushes her <span class="vocab-word" data-word="teeth">teeth</span>."#
        );
        assert_eq!(
            out.matches,
            vec![VocabMatch { matched_text: "teeth".into(), canonical_word: "teeth".into() }]
        );
    }

    #[rstest]
    #[case("concatenate", "cat")]
    #[case("category", "cat")]
    #[case("scat", "cat")]
    #[case("cat_like", "cat")]
    fn no_substring_matches(#[case] text: &str, #[case] word: &str) {
        let out = annotate(text, &vocab(&[word]));
        assert!(out.matches.is_empty());
        assert_eq!(out.markup, text);
    }

    #[rstest]
    #[case("Cat!", "Cat")]
    #[case("(cat)", "cat")]
    #[case("the CAT's toy", "CAT")]
    #[case("well-cat", "cat")]
    fn punctuation_bounds_words(#[case] text: &str, #[case] hit: &str) {
        let out = annotate(text, &vocab(&["cat"]));
        assert_eq!(matched(&out), vec![hit]);
        assert_eq!(out.matches[0].canonical_word, "cat");
    }

    #[test]
    fn prefers_longest_phrase() {
        let out = annotate("please take off your shoes, then take a seat", &vocab(&["take", "take off"]));
        assert_eq!(matched(&out), vec!["take off", "take"]);
        assert_eq!(out.matches[0].canonical_word, "take off");
        assert!(out.markup.contains(r#"<span class="vocab-word" data-word="take off">take off</span> your"#));
    }

    #[test]
    fn phrase_tolerates_whitespace_runs() {
        let out = annotate("Take\n   off now", &vocab(&["take off"]));
        assert_eq!(matched(&out), vec!["Take\n   off"]);
    }

    #[test]
    fn leaves_tags_and_attributes_alone() {
        let src = r#"<b>Teeth</b> <img alt="teeth" src="teeth.png"> &amp; teeth"#;
        let out = annotate(src, &vocab(&["teeth", "amp"]));
        assert_eq!(matched(&out), vec!["Teeth", "teeth"]);
        assert_eq!(
            out.markup,
            r#"<b><span class="vocab-word" data-word="teeth">Teeth</span></b> <img alt="teeth" src="teeth.png"> &amp; <span class="vocab-word" data-word="teeth">teeth</span>"#
        );
    }

    #[test]
    fn entities_are_part_of_the_word() {
        let out = annotate("Un caf&eacute; y dos caf&eacute;s", &vocab(&["café"]));
        assert_eq!(matched(&out), vec!["caf&eacute;"]);
        assert!(out.markup.starts_with(r#"Un <span class="vocab-word" data-word="café">caf&eacute;</span> y"#));

        let prefix = annotate("Un caf&eacute; solo", &vocab(&["caf"]));
        assert!(prefix.matches.is_empty());
        assert_eq!(prefix.markup, "Un caf&eacute; solo");

        let joined = annotate("Tom &amp; Jerry", &vocab(&["Tom & Jerry"]));
        assert_eq!(matched(&joined), vec!["Tom &amp; Jerry"]);
    }

    #[test]
    fn phrase_runs_across_inline_formatting() {
        let v = vocab(&["take off"]);
        let out = annotate("Please take <b>off</b> your shoes", &v);
        assert_eq!(
            out.markup,
            concat!(
                r#"Please <span class="vocab-word" data-word="take off">take </span>"#,
                r#"<b><span class="vocab-word" data-word="take off" data-continued>off</span></b> your shoes"#
            )
        );
        assert_eq!(
            out.matches,
            vec![VocabMatch { matched_text: "take off".into(), canonical_word: "take off".into() }]
        );
        assert_eq!(annotate(&out.markup, &v), out);

        let leading = annotate("<b>Take</b> off", &v);
        assert_eq!(matched(&leading), vec!["Take off"]);
        assert_eq!(annotate(&leading.markup, &v), leading);
    }

    #[test]
    fn block_tags_split_phrases() {
        let out = annotate("take<br>off, take <span>off</span>", &vocab(&["take off"]));
        assert!(out.matches.is_empty());
    }

    #[rstest]
    #[case("¡Hola! amigos", "¡Hola!", "Hola")]
    #[case("Mr. Smith said hi", "Mr. Smith", "Mr. Smith")]
    #[case("then Mr Smith left", "Mr. Smith", "Mr Smith")]
    #[case("Good morning. Class begins", "morning class", "morning. Class")]
    fn punctuation_in_entries(#[case] text: &str, #[case] word: &str, #[case] hit: &str) {
        let out = annotate(text, &vocab(&[word]));
        assert_eq!(matched(&out), vec![hit]);
        assert_eq!(out.matches[0].canonical_word, word);
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let v = vocab(&["teeth", "take off", "take", "brush"]);
        let src = "<b>Brush</b> your teeth, take off your coat and take a bus.";
        let once = annotate(src, &v);
        let twice = annotate(&once.markup, &v);
        assert_eq!(twice, once);
    }

    #[test]
    fn canonical_word_is_escaped_and_recovered() {
        let v = VocabularyMap::from_entries([VocabularyEntry {
            word: "<b>Rock</b> & roll".into(),
            definition: "music".into(),
        }]);
        let once = annotate("I like rock & roll", &v);
        assert!(once.markup.contains(r#"data-word="Rock &amp; roll""#));
        let twice = annotate(&once.markup, &v);
        assert_eq!(twice.matches[0].canonical_word, "Rock & roll");
    }

    #[test]
    fn empty_vocabulary_returns_input() {
        let out = annotate("<b>Hi</b> there", &VocabularyMap::default());
        assert_eq!(out.markup, "<b>Hi</b> there");
        assert!(out.matches.is_empty());
    }

    #[test]
    fn unicode_case_folding() {
        let out = annotate("ÉCOLE et école", &vocab(&["école"]));
        assert_eq!(matched(&out), vec!["ÉCOLE", "école"]);
    }
}
