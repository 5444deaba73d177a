//! Reading, vocabulary and quiz for one (week, grade) selection.
//!
//! Content arrives as three per-week JSON manifests keyed by grade:
//!
//! ```json
//! { "readings":   { "6": { "text": [{ "time": 0.0, "content": "<b>Title</b>" }], "audio": "...", "image": "..." } } }
//! { "vocabulary": { "6": [{ "word": "teeth", "definition": "dientes" }] } }
//! { "quizzes":    { "6": [{ "question": "...", "options": ["..."], "answer": "..." }] } }
//! ```
//!
//! A [`ContentModel`] is built once per selection and replaced wholesale on
//! the next one; nothing in it is mutated after loading.

use std::collections::HashMap;

use serde::Deserialize;

use crate::config::{self, ReaderConfig};
use crate::error::{ContentError, FetchError, MalformedSegments, QuizUnavailable, VocabularyUnavailable};
use crate::markup::{self, Token};
use crate::quiz::{self, QuizQuestion};

/// One timed unit of reading text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Segment {
    /// Start time in seconds.
    pub time: f64,
    /// Markup; may carry inline emphasis such as `<b>`.
    pub content: String,
}

/// Ordered segments of one reading. Construction records whether the times
/// are non-decreasing; highlighting is disabled for readings that are not.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    segments: Vec<Segment>,
    order: Result<(), MalformedSegments>,
}

impl Reading {
    pub fn new(segments: Vec<Segment>) -> Self {
        let order = check_order(&segments);
        Self { segments, order }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn validate(&self) -> Result<(), MalformedSegments> {
        self.order
    }

    /// Whether time lookups are meaningful for this reading.
    pub fn is_playable(&self) -> bool {
        self.order.is_ok()
    }

    /// Text of the first `<b>` run in the first segment, `<br>`s removed.
    pub fn title(&self) -> Option<String> {
        let first = self.segments.first()?;
        let tokens = markup::tokenize(&first.content);
        let open = tokens
            .iter()
            .position(|t| matches!(t, Token::Tag(tag) if tag.is_open("b")))?;
        let close = markup::matching_close(&tokens, open)?;
        let mut title = String::new();
        for token in &tokens[open + 1..close] {
            match token {
                Token::Text(text) => title.push_str(text),
                Token::Entity(raw) => title.push_str(&markup::decode_entities(raw)),
                Token::Tag(_) => {}
            }
        }
        let title = title.trim();
        (!title.is_empty()).then(|| title.to_string())
    }
}

fn check_order(segments: &[Segment]) -> Result<(), MalformedSegments> {
    if segments.is_empty() {
        return Err(MalformedSegments::Empty);
    }
    if segments[0].time.is_nan() {
        return Err(MalformedSegments::OutOfOrder { index: 0 });
    }
    match segments.windows(2).position(|w| !(w[1].time >= w[0].time)) {
        Some(pos) => Err(MalformedSegments::OutOfOrder { index: pos + 1 }),
        None => Ok(()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VocabularyEntry {
    pub word: String,
    pub definition: String,
}

/// Characters ignored when comparing vocabulary words.
/// Sentence punctuation a multi-word entry may be split by in running text.
pub const IGNORED_PUNCTUATION: &[char] = &['.', ',', '!', '?', ';', ':', '"'];

/// Lookup key for a vocabulary word or a clicked word: tags stripped,
/// lower-cased, whitespace collapsed, and anything that is not a letter or
/// digit trimmed from both ends. Inner punctuation (`mr. smith`, `o'clock`) stays.
pub fn normalize_word(word: &str) -> String {
    let text = markup::plain_text(word).to_lowercase();
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.trim_matches(|c: char| !c.is_alphanumeric()).to_string()
}

/// Glossary for one reading. Entries keep their first-seen order; a later
/// entry whose normalized word collides replaces the earlier one in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VocabularyMap {
    entries: Vec<VocabularyEntry>,
    index: HashMap<String, usize>,
}

impl VocabularyMap {
    pub fn from_entries(entries: impl IntoIterator<Item = VocabularyEntry>) -> Self {
        let mut map = Self::default();
        for entry in entries {
            map.insert(entry);
        }
        map
    }

    pub fn insert(&mut self, mut entry: VocabularyEntry) {
        let key = normalize_word(&entry.word);
        if key.is_empty() {
            return;
        }
        entry.word = markup::plain_text(&entry.word).trim().to_string();
        match self.index.get(&key) {
            Some(&slot) => self.entries[slot] = entry,
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    /// Case- and punctuation-insensitive lookup.
    pub fn get(&self, word: &str) -> Option<&VocabularyEntry> {
        self.index
            .get(&normalize_word(word))
            .map(|&slot| &self.entries[slot])
    }

    pub fn entries(&self) -> &[VocabularyEntry] {
        &self.entries
    }

    /// `(normalized key, entry)` pairs, in no particular order.
    pub fn keyed(&self) -> impl Iterator<Item = (&str, &VocabularyEntry)> {
        self.index
            .iter()
            .map(|(key, &slot)| (key.as_str(), &self.entries[slot]))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Selection {
    pub week: u32,
    pub grade: String,
}

impl Selection {
    pub fn new(week: u32, grade: impl Into<String>) -> Self {
        Self { week, grade: grade.into() }
    }
}

/// Source of the per-week manifests, returned as raw JSON text.
#[allow(async_fn_in_trait)]
pub trait ContentStore {
    async fn fetch_reading_manifest(&self, week: u32) -> Result<String, FetchError>;
    async fn fetch_vocabulary_manifest(&self, week: u32) -> Result<String, FetchError>;
    async fn fetch_quiz_manifest(&self, week: u32) -> Result<String, FetchError>;
}

#[derive(Deserialize)]
struct ReadingManifest {
    readings: HashMap<String, GradeReading>,
}

#[derive(Deserialize)]
struct GradeReading {
    text: Vec<Segment>,
    #[serde(default)]
    audio: Option<String>,
    #[serde(default)]
    image: Option<String>,
}

#[derive(Deserialize)]
struct VocabularyManifest {
    vocabulary: HashMap<String, Vec<VocabularyEntry>>,
}

/// Everything loaded for one selection.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentModel {
    pub selection: Selection,
    pub reading: Reading,
    pub vocabulary: VocabularyMap,
    /// Empty when the week has no quiz for this grade.
    pub quiz: Vec<QuizQuestion>,
    pub audio: String,
    pub image: String,
}

impl ContentModel {
    /// Fetch and assemble the content for `selection`. A missing reading is
    /// fatal; a missing vocabulary or quiz degrades to an empty one.
    pub async fn load<C: ContentStore>(
        store: &C,
        config: &ReaderConfig,
        selection: &Selection,
    ) -> Result<Self, ContentError> {
        let Selection { week, grade } = selection;
        let week = *week;
        log::debug!("loading week {week}, grade {grade}");

        let json = store
            .fetch_reading_manifest(week)
            .await
            .map_err(|e| ContentError::not_found(week, grade, e))?;
        let mut manifest: ReadingManifest = serde_json::from_str(&json)
            .map_err(|source| ContentError::InvalidManifest { week, source })?;
        let entry = manifest
            .readings
            .remove(grade)
            .ok_or_else(|| ContentError::not_found(week, grade, "grade missing from manifest"))?;

        let reading = Reading::new(entry.text);
        if let Err(e) = reading.validate() {
            log::warn!("week {week}, grade {grade}: {e}; highlighting disabled");
        }

        let vocabulary = match load_vocabulary(store, selection).await {
            Ok(map) => map,
            Err(e) => {
                log::warn!("{e}");
                VocabularyMap::default()
            }
        };
        let quiz = load_quiz(store, selection).await.unwrap_or_else(|e| {
            log::warn!("{e}");
            Vec::new()
        });

        Ok(Self {
            audio: entry
                .audio
                .unwrap_or_else(|| config::expand(&config.audio_path, week, grade)),
            image: entry
                .image
                .unwrap_or_else(|| config::expand(&config.image_path, week, grade)),
            selection: selection.clone(),
            reading,
            vocabulary,
            quiz,
        })
    }
}

async fn load_vocabulary<C: ContentStore>(
    store: &C,
    selection: &Selection,
) -> Result<VocabularyMap, VocabularyUnavailable> {
    let unavailable = |reason: String| VocabularyUnavailable {
        week: selection.week,
        grade: selection.grade.clone(),
        reason,
    };
    let json = store
        .fetch_vocabulary_manifest(selection.week)
        .await
        .map_err(|e| unavailable(e.to_string()))?;
    let mut manifest: VocabularyManifest =
        serde_json::from_str(&json).map_err(|e| unavailable(e.to_string()))?;
    let entries = manifest
        .vocabulary
        .remove(&selection.grade)
        .ok_or_else(|| unavailable("grade missing from manifest".into()))?;
    Ok(VocabularyMap::from_entries(entries))
}

async fn load_quiz<C: ContentStore>(
    store: &C,
    selection: &Selection,
) -> Result<Vec<QuizQuestion>, QuizUnavailable> {
    let unavailable = |reason: String| QuizUnavailable {
        week: selection.week,
        grade: selection.grade.clone(),
        reason,
    };
    let json = store
        .fetch_quiz_manifest(selection.week)
        .await
        .map_err(|e| unavailable(e.to_string()))?;
    quiz::questions_for_grade(&json, &selection.grade)
        .map_err(|e| unavailable(e.to_string()))?
        .ok_or_else(|| unavailable("grade missing from manifest".into()))
}

/// In-memory [`ContentStore`], keyed by week. Weeks without an entry answer
/// HTTP 404, like the static site does.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    readings: HashMap<u32, String>,
    vocabulary: HashMap<u32, String>,
    quizzes: HashMap<u32, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reading(mut self, week: u32, json: impl Into<String>) -> Self {
        self.readings.insert(week, json.into());
        self
    }

    pub fn with_vocabulary(mut self, week: u32, json: impl Into<String>) -> Self {
        self.vocabulary.insert(week, json.into());
        self
    }

    pub fn with_quiz(mut self, week: u32, json: impl Into<String>) -> Self {
        self.quizzes.insert(week, json.into());
        self
    }
}

impl ContentStore for MemoryStore {
    async fn fetch_reading_manifest(&self, week: u32) -> Result<String, FetchError> {
        self.readings.get(&week).cloned().ok_or(FetchError::Status {
            url: format!("memory://readings/week{week}"),
            status: 404,
        })
    }

    async fn fetch_vocabulary_manifest(&self, week: u32) -> Result<String, FetchError> {
        self.vocabulary.get(&week).cloned().ok_or(FetchError::Status {
            url: format!("memory://vocabulary/week{week}"),
            status: 404,
        })
    }

    async fn fetch_quiz_manifest(&self, week: u32) -> Result<String, FetchError> {
        self.quizzes.get(&week).cloned().ok_or(FetchError::Status {
            url: format!("memory://quizzes/week{week}"),
            status: 404,
        })
    }
}
