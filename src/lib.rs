//! Weekly Reader core crate.
//!
//! Audio-synchronized reading pages: per-week readings whose segments light
//! up as the narration plays, vocabulary words annotated in place with
//! click-to-open definitions, and a self-scored quiz.
//!
//! The pure modules (`content`, `annotate`, `timesync`, `tooltip`, `session`,
//! `quiz`) run anywhere; `web` binds them to the browser page. JS calls
//! [`start`] once the page is ready. The quiz buttons are wired by `start`;
//! [`score_quiz`] and [`clear_quiz`] drive the same actions from script.

use wasm_bindgen::prelude::*;

pub mod annotate;
pub mod config;
pub mod content;
pub mod error;
pub mod markup;
pub mod quiz;
pub mod session;
pub mod timesync;
pub mod tooltip;
pub mod web;

pub use annotate::{AnnotatedMarkup, VocabAnnotator, VocabMatch, annotate};
pub use config::ReaderConfig;
pub use content::{
    ContentModel, ContentStore, MemoryStore, Reading, Segment, Selection, VocabularyEntry,
    VocabularyMap,
};
pub use error::{ContentError, FetchError, MalformedSegments, QuizUnavailable, VocabularyUnavailable};
pub use session::{LoadOutcome, LoadTicket, ReaderSession, RenderSink, RenderedSegment};
pub use timesync::{HighlightState, HighlightTracker, segment_at, word_at};
pub use quiz::{QuizQuestion, QuizScore};
pub use tooltip::{AnchorRect, DismissReason, Placement, TooltipController, TooltipSpec, Viewport};

// Optional small allocator for size (feature gated)
#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn wasm_start() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

// -----------------------------------------------------------------------------
// JS entrypoints
// -----------------------------------------------------------------------------

/// Attach the reader to the page. `config_json` is an optional partial
/// [`ReaderConfig`] override.
#[wasm_bindgen]
pub fn start(config_json: Option<String>) -> Result<(), JsValue> {
    let config = match config_json.as_deref() {
        Some(json) => ReaderConfig::from_json(json).map_err(to_js)?,
        None => ReaderConfig::default(),
    };
    web::start_reader(config)
}

/// Score the answers checked in the rendered quiz and show the feedback.
/// Returns the feedback line; errors when no week is loaded yet.
#[wasm_bindgen]
pub fn score_quiz() -> Result<String, JsValue> {
    web::score_rendered_quiz().ok_or_else(|| JsValue::from_str("no quiz loaded"))
}

/// Uncheck every quiz answer and clear the feedback.
#[wasm_bindgen]
pub fn clear_quiz() {
    web::clear_rendered_quiz();
}

fn to_js(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}
