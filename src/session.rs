//! One page session: the loaded content, its highlight and tooltip state,
//! and the render sink they paint through.
//!
//! Loads are asynchronous and may resolve out of order. Each load takes a
//! [`LoadTicket`] stamped with a generation number; only the ticket from the
//! most recent [`ReaderSession::begin_load`] is allowed to apply its result.

use std::cell::RefCell;

use crate::annotate::{VocabAnnotator, VocabMatch};
use crate::config::ReaderConfig;
use crate::content::{ContentModel, ContentStore, Selection};
use crate::error::ContentError;
use crate::markup;
use crate::quiz::{self, QuizScore};
use crate::timesync::{HighlightState, HighlightTracker};
use crate::tooltip::{AnchorRect, DismissReason, TooltipController, TooltipSpec, Viewport};

pub const UNAVAILABLE_MESSAGE: &str = "Error loading content. Please try again later.";

/// Segment markup ready to paint, plus its click targets.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedSegment {
    pub time: f64,
    pub markup: String,
    pub targets: Vec<VocabMatch>,
    /// Indexed words; zero unless word highlighting is enabled.
    pub word_count: usize,
}

/// Host-side painter. The session never touches the page directly.
pub trait RenderSink {
    fn render_content(&mut self, content: &ContentModel, segments: &[RenderedSegment]);
    fn render_unavailable(&mut self, message: &str);
    fn set_highlight(&mut self, previous: HighlightState, current: HighlightState);
    fn show_tooltip(&mut self, tooltip: &TooltipSpec);
    fn hide_tooltip(&mut self, tooltip: &TooltipSpec, reason: DismissReason);
    fn show_quiz_result(&mut self, score: &QuizScore, feedback: &str);
    /// Uncheck every answer and remove the feedback.
    fn clear_quiz(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
    pub selection: Selection,
}

impl LoadTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied,
    Failed,
    /// A newer load was started; this result was dropped.
    Stale,
}

struct Page {
    content: ContentModel,
    segments: Vec<RenderedSegment>,
    word_counts: Vec<usize>,
}

pub struct ReaderSession<S: RenderSink> {
    config: ReaderConfig,
    sink: S,
    page: Option<Page>,
    highlight: HighlightTracker,
    tooltip: TooltipController,
    generation: u64,
    pending: Option<u64>,
}

impl<S: RenderSink> ReaderSession<S> {
    pub fn new(config: ReaderConfig, sink: S) -> Self {
        let tooltip = TooltipController::new(config.tooltip);
        Self {
            config,
            sink,
            page: None,
            highlight: HighlightTracker::new(),
            tooltip,
            generation: 0,
            pending: None,
        }
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn content(&self) -> Option<&ContentModel> {
        self.page.as_ref().map(|p| &p.content)
    }

    pub fn segments(&self) -> &[RenderedSegment] {
        self.page.as_ref().map(|p| p.segments.as_slice()).unwrap_or(&[])
    }

    pub fn highlight(&self) -> HighlightState {
        self.highlight.current()
    }

    pub fn tooltip(&self) -> Option<&TooltipSpec> {
        self.tooltip.active()
    }

    /// Start a load for `selection`, invalidating every earlier ticket.
    pub fn begin_load(&mut self, selection: Selection) -> LoadTicket {
        self.generation += 1;
        self.pending = Some(self.generation);
        log::debug!(
            "load #{} requested: week {}, grade {}",
            self.generation,
            selection.week,
            selection.grade
        );
        LoadTicket { generation: self.generation, selection }
    }

    /// Apply the result of the load started with `ticket`, unless a newer
    /// load has been started since (or this ticket was already finished).
    pub fn finish_load(
        &mut self,
        ticket: LoadTicket,
        result: Result<ContentModel, ContentError>,
    ) -> LoadOutcome {
        if self.pending != Some(ticket.generation) {
            log::warn!(
                "discarding stale load #{} (week {}, grade {})",
                ticket.generation,
                ticket.selection.week,
                ticket.selection.grade
            );
            return LoadOutcome::Stale;
        }
        self.pending = None;
        self.reset_interaction();
        match result {
            Ok(content) => {
                log::info!(
                    "showing week {}, grade {} ({} segments, {} vocabulary words)",
                    content.selection.week,
                    content.selection.grade,
                    content.reading.len(),
                    content.vocabulary.len()
                );
                let page = self.prepare(content);
                self.sink.render_content(&page.content, &page.segments);
                self.page = Some(page);
                LoadOutcome::Applied
            }
            Err(e) => {
                log::error!("load #{} failed: {e}", ticket.generation);
                self.page = None;
                self.sink.render_unavailable(UNAVAILABLE_MESSAGE);
                LoadOutcome::Failed
            }
        }
    }

    /// Stop accepting results for loads already in flight. Used when the
    /// host replaces this session with a new one.
    pub fn retire(&mut self) {
        if let Some(generation) = self.pending.take() {
            log::debug!("load #{generation} abandoned");
        }
        self.dismiss(DismissReason::Superseded);
    }

    /// Fetch through `store` and finish `ticket`. The session is only
    /// borrowed before and after the await, never across it.
    pub async fn complete_load<C: ContentStore>(
        session: &RefCell<Self>,
        store: &C,
        ticket: LoadTicket,
    ) -> LoadOutcome {
        let config = session.borrow().config.clone();
        let result = ContentModel::load(store, &config, &ticket.selection).await;
        session.borrow_mut().finish_load(ticket, result)
    }

    fn reset_interaction(&mut self) {
        if let Some(old) = self.tooltip.dismiss(DismissReason::Superseded) {
            self.sink.hide_tooltip(&old, DismissReason::Superseded);
        }
        let previous = self.highlight.current();
        self.highlight.reset();
        if previous != HighlightState::NONE {
            self.sink.set_highlight(previous, HighlightState::NONE);
        }
    }

    fn prepare(&self, content: ContentModel) -> Page {
        let annotator = VocabAnnotator::new(&content.vocabulary);
        let segments: Vec<RenderedSegment> = content
            .reading
            .segments()
            .iter()
            .map(|segment| {
                let annotated = annotator.annotate(&segment.content);
                let (markup, word_count) = if self.config.word_highlight {
                    markup::index_words(&annotated.markup)
                } else {
                    (annotated.markup, 0)
                };
                RenderedSegment {
                    time: segment.time,
                    markup,
                    targets: annotated.matches,
                    word_count,
                }
            })
            .collect();
        let word_counts = segments.iter().map(|s| s.word_count).collect();
        Page { content, segments, word_counts }
    }

    /// Playback tick. No-op until content is loaded.
    pub fn on_time_update(&mut self, time: f64, duration: f64) {
        let Some(page) = &self.page else {
            return;
        };
        let word_counts = self.config.word_highlight.then_some(page.word_counts.as_slice());
        let previous = self.highlight.current();
        if let Some(current) =
            self.highlight
                .update(time, &page.content.reading, word_counts, duration)
        {
            self.sink.set_highlight(previous, current);
        }
    }

    /// A vocabulary target was clicked. Returns whether a tooltip is now shown
    /// for it.
    pub fn on_vocab_click(&mut self, word: &str, anchor: AnchorRect, viewport: Viewport) -> bool {
        let Some(page) = &self.page else {
            return false;
        };
        let previous = self.tooltip.active().cloned();
        let Some(spec) = self
            .tooltip
            .activate(word, anchor, &page.content.vocabulary, viewport)
        else {
            return false;
        };
        if let Some(old) = previous {
            self.sink.hide_tooltip(&old, DismissReason::Superseded);
        }
        self.sink.show_tooltip(&spec);
        true
    }

    pub fn on_close_button(&mut self) {
        self.dismiss(DismissReason::CloseButton);
    }

    pub fn on_outside_click(&mut self) {
        self.dismiss(DismissReason::OutsideClick);
    }

    /// Score the picked options (`answers[i]` for question `i`, `None` if left
    /// blank) and show the feedback. `None` when nothing is loaded.
    pub fn submit_quiz(&mut self, answers: &[Option<String>]) -> Option<QuizScore> {
        let page = self.page.as_ref()?;
        let result = quiz::score(&page.content.quiz, answers);
        let message = quiz::feedback(&result);
        log::debug!("quiz scored {}/{}", result.correct, result.total);
        self.sink.show_quiz_result(&result, &message);
        Some(result)
    }

    pub fn clear_quiz(&mut self) {
        self.sink.clear_quiz();
    }

    fn dismiss(&mut self, reason: DismissReason) {
        if let Some(spec) = self.tooltip.dismiss(reason) {
            self.sink.hide_tooltip(&spec, reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{Reading, Segment, VocabularyEntry, VocabularyMap};
    use crate::quiz::QuizQuestion;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Content(u32, usize),
        Unavailable,
        Highlight(HighlightState),
        Show(String),
        Hide(String, DismissReason),
        Quiz(String),
        ClearQuiz,
    }

    #[derive(Default)]
    struct Recorder(Vec<Call>);

    impl RenderSink for Recorder {
        fn render_content(&mut self, content: &ContentModel, segments: &[RenderedSegment]) {
            self.0.push(Call::Content(content.selection.week, segments.len()));
        }
        fn render_unavailable(&mut self, _message: &str) {
            self.0.push(Call::Unavailable);
        }
        fn set_highlight(&mut self, _previous: HighlightState, current: HighlightState) {
            self.0.push(Call::Highlight(current));
        }
        fn show_tooltip(&mut self, tooltip: &TooltipSpec) {
            self.0.push(Call::Show(tooltip.word.clone()));
        }
        fn hide_tooltip(&mut self, tooltip: &TooltipSpec, reason: DismissReason) {
            self.0.push(Call::Hide(tooltip.word.clone(), reason));
        }
        fn show_quiz_result(&mut self, _score: &QuizScore, feedback: &str) {
            self.0.push(Call::Quiz(feedback.to_string()));
        }
        fn clear_quiz(&mut self) {
            self.0.push(Call::ClearQuiz);
        }
    }

    fn model(week: u32) -> ContentModel {
        ContentModel {
            selection: Selection::new(week, "6"),
            reading: Reading::new(vec![
                Segment { time: 0.0, content: "<b>Morning</b>".into() },
                Segment { time: 5.0, content: "I brush my teeth.".into() },
            ]),
            vocabulary: VocabularyMap::from_entries([
                VocabularyEntry { word: "teeth".into(), definition: "dientes".into() },
                VocabularyEntry { word: "brush".into(), definition: "cepillar".into() },
            ]),
            quiz: vec![QuizQuestion {
                question: "What do I brush?".into(),
                options: vec!["Hair".into(), "Teeth".into()],
                answer: "Teeth".into(),
            }],
            audio: String::new(),
            image: String::new(),
        }
    }

    fn session() -> ReaderSession<Recorder> {
        ReaderSession::new(ReaderConfig::default(), Recorder::default())
    }

    fn anchor() -> AnchorRect {
        AnchorRect { top: 300.0, left: 10.0, width: 40.0, height: 18.0 }
    }

    const VIEWPORT: Viewport = Viewport { width: 1024.0, height: 800.0 };

    fn not_found(week: u32) -> ContentError {
        ContentError::NotFound { week, grade: "6".into(), reason: "HTTP 404".into() }
    }

    #[test]
    fn applies_annotated_content() {
        let mut s = session();
        let ticket = s.begin_load(Selection::new(1, "6"));
        assert_eq!(s.finish_load(ticket, Ok(model(1))), LoadOutcome::Applied);
        assert_eq!(s.sink().0, vec![Call::Content(1, 2)]);
        let targets: Vec<_> = s.segments()[1].targets.iter().map(|t| t.canonical_word.as_str()).collect();
        assert_eq!(targets, vec!["brush", "teeth"]);
    }

    #[test]
    fn out_of_order_results_keep_latest_selection() {
        let mut s = session();
        let week2 = s.begin_load(Selection::new(2, "6"));
        let week3 = s.begin_load(Selection::new(3, "6"));
        assert_eq!(s.finish_load(week3, Ok(model(3))), LoadOutcome::Applied);
        assert_eq!(s.finish_load(week2, Ok(model(2))), LoadOutcome::Stale);
        assert_eq!(s.content().map(|c| c.selection.week), Some(3));
    }

    #[test]
    fn ticket_applies_only_once() {
        let mut s = session();
        let ticket = s.begin_load(Selection::new(1, "6"));
        assert_eq!(s.finish_load(ticket.clone(), Ok(model(1))), LoadOutcome::Applied);
        assert_eq!(s.finish_load(ticket, Ok(model(1))), LoadOutcome::Stale);
    }

    #[test]
    fn failure_clears_state_and_shows_fallback() {
        let mut s = session();
        let t = s.begin_load(Selection::new(1, "6"));
        s.finish_load(t, Ok(model(1)));
        s.on_time_update(6.0, 20.0);
        assert!(s.on_vocab_click("teeth", anchor(), VIEWPORT));

        let t = s.begin_load(Selection::new(9, "6"));
        assert_eq!(s.finish_load(t, Err(not_found(9))), LoadOutcome::Failed);
        assert!(s.content().is_none());
        assert!(s.tooltip().is_none());
        assert_eq!(s.highlight(), HighlightState::NONE);
        let tail = &s.sink().0[s.sink().0.len() - 3..];
        assert_eq!(
            tail,
            &[
                Call::Hide("teeth".into(), DismissReason::Superseded),
                Call::Highlight(HighlightState::NONE),
                Call::Unavailable,
            ]
        );

        // Ticks after a failed load are ignored.
        s.on_time_update(7.0, 20.0);
        assert_eq!(s.sink().0.last(), Some(&Call::Unavailable));
    }

    #[test]
    fn ticks_paint_only_changes() {
        let mut s = session();
        s.on_time_update(1.0, 10.0);
        assert!(s.sink().0.is_empty());

        let t = s.begin_load(Selection::new(1, "6"));
        s.finish_load(t, Ok(model(1)));
        s.on_time_update(1.0, 10.0);
        s.on_time_update(2.0, 10.0);
        s.on_time_update(5.5, 10.0);
        let highlights: Vec<_> = s
            .sink()
            .0
            .iter()
            .filter_map(|c| match c {
                Call::Highlight(h) => h.active_segment,
                _ => None,
            })
            .collect();
        assert_eq!(highlights, vec![0, 1]);
    }

    #[test]
    fn word_highlight_uses_indexed_words() {
        let config = ReaderConfig { word_highlight: true, ..ReaderConfig::default() };
        let mut s = ReaderSession::new(config, Recorder::default());
        let t = s.begin_load(Selection::new(1, "6"));
        s.finish_load(t, Ok(model(1)));
        assert_eq!(s.segments()[1].word_count, 4);
        s.on_time_update(9.0, 10.0);
        assert_eq!(s.highlight(), HighlightState { active_segment: Some(1), active_word: Some(3) });
    }

    #[test]
    fn tooltip_lifecycle() {
        let mut s = session();
        assert!(!s.on_vocab_click("teeth", anchor(), VIEWPORT));

        let t = s.begin_load(Selection::new(1, "6"));
        s.finish_load(t, Ok(model(1)));
        assert!(s.on_vocab_click("teeth", anchor(), VIEWPORT));
        assert!(s.on_vocab_click("Brush", anchor(), VIEWPORT));
        assert!(!s.on_vocab_click("shoes", anchor(), VIEWPORT));
        s.on_outside_click();
        s.on_close_button();

        let calls: Vec<_> = s.sink().0.iter().skip(1).cloned().collect();
        assert_eq!(
            calls,
            vec![
                Call::Show("teeth".into()),
                Call::Hide("teeth".into(), DismissReason::Superseded),
                Call::Show("brush".into()),
                Call::Hide("brush".into(), DismissReason::OutsideClick),
            ]
        );
    }

    #[test]
    fn retired_session_ignores_in_flight_loads() {
        let mut s = session();
        let t = s.begin_load(Selection::new(1, "6"));
        s.finish_load(t, Ok(model(1)));
        assert!(s.on_vocab_click("teeth", anchor(), VIEWPORT));

        let in_flight = s.begin_load(Selection::new(2, "6"));
        s.retire();
        assert!(s.tooltip().is_none());
        assert_eq!(s.finish_load(in_flight, Ok(model(2))), LoadOutcome::Stale);
        assert_eq!(s.content().map(|c| c.selection.week), Some(1));
        assert_eq!(
            s.sink().0.last(),
            Some(&Call::Hide("teeth".into(), DismissReason::Superseded))
        );
    }

    #[test]
    fn quiz_is_scored_against_loaded_week() {
        let mut s = session();
        assert_eq!(s.submit_quiz(&[Some("Teeth".into())]), None);

        let t = s.begin_load(Selection::new(1, "6"));
        s.finish_load(t, Ok(model(1)));
        assert_eq!(
            s.submit_quiz(&[None]),
            Some(QuizScore { correct: 0, total: 1, all_answered: false })
        );
        let score = s.submit_quiz(&[Some("Teeth".into())]).unwrap();
        assert_eq!(score.correct, 1);
        s.clear_quiz();

        let calls: Vec<_> = s.sink().0.iter().skip(1).cloned().collect();
        assert_eq!(
            calls,
            vec![
                Call::Quiz(quiz::INCOMPLETE_MESSAGE.into()),
                Call::Quiz("Score: 1/1 - Amazing work! You are the best! (¡Estupendo!)".into()),
                Call::ClearQuiz,
            ]
        );
    }
}
