//! Browser host: paints the session into the page, fetches manifests over
//! HTTP and routes DOM events back into the session.
//!
//! Everything here is glue. Decisions (what to highlight, which tooltip is
//! shown, whether a load result is stale) live in [`crate::session`].

use std::cell::RefCell;
use std::rc::Rc;

use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{JsFuture, spawn_local};
use web_sys::{
    Document, Element, Event, EventTarget, HtmlElement, HtmlImageElement, HtmlInputElement,
    HtmlMediaElement, HtmlOptionElement, HtmlSelectElement, Response, ScrollBehavior,
    ScrollIntoViewOptions, ScrollLogicalPosition, window,
};

use crate::config::{ElementIds, ReaderConfig};
use crate::content::{ContentModel, ContentStore, Selection, VocabularyEntry};
use crate::error::FetchError;
use crate::markup::{escape_attr, escape_text};
use crate::quiz::{self, NO_QUIZ_MESSAGE, QuizQuestion, QuizScore};
use crate::session::{ReaderSession, RenderSink, RenderedSegment};
use crate::timesync::HighlightState;
use crate::tooltip::{AnchorRect, DismissReason, Placement, TooltipSpec, Viewport};

pub const DEFAULT_TITLE: &str = "Weekly Reading";
pub const NO_VOCABULARY: &str = "No vocabulary for this lesson.";
pub const NO_READING_TEXT: &str = "No reading text available.";

const SEGMENT_HIGHLIGHT: &str = "highlight";
const WORD_HIGHLIGHT: &str = "word-highlight";

// --- Listeners -----------------------------------------------------------------

/// An attached event listener. Dropping the handle detaches it.
pub struct ListenerHandle {
    target: EventTarget,
    event: &'static str,
    closure: Closure<dyn FnMut(Event)>,
}

impl ListenerHandle {
    pub fn listen(
        target: &EventTarget,
        event: &'static str,
        f: impl FnMut(Event) + 'static,
    ) -> Result<Self, JsValue> {
        let closure = Closure::wrap(Box::new(f) as Box<dyn FnMut(Event)>);
        target.add_event_listener_with_callback(event, closure.as_ref().unchecked_ref())?;
        Ok(Self {
            target: target.clone(),
            event,
            closure,
        })
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        let _ = self
            .target
            .remove_event_listener_with_callback(self.event, self.closure.as_ref().unchecked_ref());
    }
}

// --- Fetching ------------------------------------------------------------------

/// [`ContentStore`] backed by `window.fetch`, resolving paths from the config.
pub struct HttpContentStore {
    config: ReaderConfig,
}

impl HttpContentStore {
    pub fn new(config: ReaderConfig) -> Self {
        Self { config }
    }
}

impl ContentStore for HttpContentStore {
    async fn fetch_reading_manifest(&self, week: u32) -> Result<String, FetchError> {
        fetch_text(&self.config.reading_url(week)).await
    }

    async fn fetch_vocabulary_manifest(&self, week: u32) -> Result<String, FetchError> {
        fetch_text(&self.config.vocabulary_url(week)).await
    }

    async fn fetch_quiz_manifest(&self, week: u32) -> Result<String, FetchError> {
        fetch_text(&self.config.quiz_url(week)).await
    }
}

/// GET `url` and return the body. Non-2xx statuses are errors.
pub async fn fetch_text(url: &str) -> Result<String, FetchError> {
    let network = |e: JsValue| FetchError::Network {
        url: url.to_string(),
        message: e
            .dyn_ref::<js_sys::Error>()
            .map(|err| String::from(err.message()))
            .or_else(|| e.as_string())
            .unwrap_or_else(|| format!("{e:?}")),
    };
    let win = window().ok_or_else(|| network(JsValue::from_str("no window")))?;
    let response: Response = JsFuture::from(win.fetch_with_str(url))
        .await
        .map_err(network)?
        .dyn_into()
        .map_err(network)?;
    if !response.ok() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: response.status(),
        });
    }
    let body = JsFuture::from(response.text().map_err(network)?)
        .await
        .map_err(network)?;
    body.as_string()
        .ok_or_else(|| network(JsValue::from_str("response body is not text")))
}

// --- Rendering -----------------------------------------------------------------

/// Paints into the page elements named by [`ElementIds`]. Only the text
/// container is required; the others are skipped when absent.
pub struct DomSink {
    document: Document,
    text: HtmlElement,
    vocabulary: Option<Element>,
    audio: Option<HtmlMediaElement>,
    audio_source: Option<Element>,
    image: Option<HtmlImageElement>,
    title: Option<Element>,
    tooltip: Option<Element>,
    quiz: Option<Element>,
    score_feedback: Option<Element>,
    score_button: Option<HtmlElement>,
    timestamp: Option<HtmlElement>,
}

impl DomSink {
    pub fn new(document: &Document, ids: &ElementIds) -> Result<Self, JsValue> {
        let text: HtmlElement = document
            .get_element_by_id(&ids.text_content)
            .ok_or_else(|| JsValue::from_str(&format!("missing #{}", ids.text_content)))?
            .dyn_into()?;
        Ok(Self {
            document: document.clone(),
            text,
            vocabulary: document.get_element_by_id(&ids.vocabulary_content),
            audio: element(document, &ids.audio_player),
            audio_source: document.get_element_by_id(&ids.audio_source),
            image: element(document, &ids.image_frame),
            title: document.get_element_by_id(&ids.title_display),
            tooltip: None,
            quiz: document.get_element_by_id(&ids.quiz_content),
            score_feedback: document.get_element_by_id(&ids.score_feedback),
            score_button: element(document, &ids.score_button),
            timestamp: element(document, &ids.timestamp),
        })
    }

    /// The option checked for each of the first `count` rendered questions.
    pub fn checked_answers(&self, count: usize) -> Vec<Option<String>> {
        let Some(quiz) = &self.quiz else {
            return vec![None; count];
        };
        (0..count)
            .map(|i| {
                quiz.query_selector(&format!("input[name=\"question{i}\"]:checked"))
                    .ok()
                    .flatten()
                    .and_then(|el| el.dyn_into::<HtmlInputElement>().ok())
                    .map(|input| input.value())
            })
            .collect()
    }

    fn segment_element(&self, index: usize) -> Option<Element> {
        self.text
            .query_selector(&format!("[data-segment=\"{index}\"]"))
            .ok()
            .flatten()
    }

    fn word_element(&self, segment: usize, word: usize) -> Option<Element> {
        self.segment_element(segment)?
            .query_selector(&format!("[data-word-index=\"{word}\"]"))
            .ok()
            .flatten()
    }

    fn set_media(&self, audio: &str, image: &str) {
        match (&self.audio_source, &self.audio) {
            (Some(source), audio_el) => {
                if let Err(e) = source.set_attribute("src", audio) {
                    log::warn!("could not set audio source: {e:?}");
                }
                if let Some(audio_el) = audio_el {
                    audio_el.load();
                }
            }
            (None, Some(audio_el)) => audio_el.set_src(audio),
            (None, None) => {}
        }
        if let Some(img) = &self.image {
            img.set_src(image);
        }
    }

    fn build_tooltip(&self, spec: &TooltipSpec) -> Result<Element, JsValue> {
        let tip = self.document.create_element("div")?;
        tip.set_class_name("vocab-tooltip");
        tip.set_inner_html(&tooltip_html(spec));
        tip.set_attribute(
            "style",
            &format!("position:fixed; top:{}px; left:{}px;", spec.top, spec.left),
        )?;
        let placement = match spec.placement {
            Placement::Above => "above",
            Placement::Below => "below",
        };
        tip.set_attribute("data-placement", placement)?;
        self.document
            .body()
            .ok_or_else(|| JsValue::from_str("no body"))?
            .append_child(&tip)?;
        Ok(tip)
    }
}

fn toggle(el: Option<Element>, class: &str, on: bool) {
    let Some(el) = el else { return };
    let list = el.class_list();
    let result = if on { list.add_1(class) } else { list.remove_1(class) };
    if let Err(e) = result {
        log::warn!("could not toggle .{class}: {e:?}");
    }
}

impl RenderSink for DomSink {
    fn render_content(&mut self, content: &ContentModel, segments: &[RenderedSegment]) {
        self.text.set_inner_html(&segments_html(segments));
        if let Some(panel) = &self.vocabulary {
            panel.set_inner_html(&vocabulary_html(content.vocabulary.entries()));
        }
        if let Some(title) = &self.title {
            let text = content.reading.title();
            title.set_text_content(Some(text.as_deref().unwrap_or(DEFAULT_TITLE)));
        }
        self.set_media(&content.audio, &content.image);
        if let Some(panel) = &self.quiz {
            panel.set_inner_html(&quiz_html(&content.quiz));
        }
        self.clear_quiz();
    }

    fn render_unavailable(&mut self, message: &str) {
        self.text.set_text_content(Some(message));
        if let Some(panel) = &self.vocabulary {
            panel.set_inner_html("");
        }
        if let Some(title) = &self.title {
            title.set_text_content(Some(DEFAULT_TITLE));
        }
        self.set_media("", "");
        if let Some(panel) = &self.quiz {
            panel.set_inner_html("");
        }
        self.clear_quiz();
    }

    fn set_highlight(&mut self, previous: HighlightState, current: HighlightState) {
        if let (Some(seg), Some(word)) = (previous.active_segment, previous.active_word) {
            toggle(self.word_element(seg, word), WORD_HIGHLIGHT, false);
        }
        if previous.active_segment != current.active_segment {
            toggle(
                previous.active_segment.and_then(|i| self.segment_element(i)),
                SEGMENT_HIGHLIGHT,
                false,
            );
            if let Some(el) = current.active_segment.and_then(|i| self.segment_element(i)) {
                let options = ScrollIntoViewOptions::new();
                options.set_behavior(ScrollBehavior::Smooth);
                options.set_block(ScrollLogicalPosition::Center);
                el.scroll_into_view_with_scroll_into_view_options(&options);
                toggle(Some(el), SEGMENT_HIGHLIGHT, true);
            }
        }
        if let (Some(seg), Some(word)) = (current.active_segment, current.active_word) {
            toggle(self.word_element(seg, word), WORD_HIGHLIGHT, true);
        }
    }

    fn show_tooltip(&mut self, tooltip: &TooltipSpec) {
        match self.build_tooltip(tooltip) {
            Ok(el) => {
                if let Some(old) = self.tooltip.replace(el) {
                    old.remove();
                }
            }
            Err(e) => log::warn!("could not show tooltip for {}: {e:?}", tooltip.word),
        }
    }

    fn hide_tooltip(&mut self, _tooltip: &TooltipSpec, _reason: DismissReason) {
        if let Some(el) = self.tooltip.take() {
            el.remove();
        }
    }

    fn show_quiz_result(&mut self, score: &QuizScore, feedback: &str) {
        if let Some(el) = &self.score_feedback {
            el.set_text_content(Some(feedback));
        }
        if !score.all_answered {
            return;
        }
        if let Some(button) = &self.score_button {
            button.set_hidden(true);
        }
        if let Some(stamp) = &self.timestamp {
            let now = js_sys::Date::new_0();
            let date = now.to_locale_date_string("en-US", &JsValue::UNDEFINED);
            let time = now.to_locale_time_string("en-US");
            stamp.set_text_content(Some(&format!("Date: {date} / Time: {time}")));
            stamp.set_hidden(false);
        }
    }

    fn clear_quiz(&mut self) {
        if let Some(quiz) = &self.quiz {
            if let Ok(radios) = quiz.query_selector_all("input[type=\"radio\"]") {
                for i in 0..radios.length() {
                    if let Some(input) = radios.get(i).and_then(|n| n.dyn_into::<HtmlInputElement>().ok()) {
                        input.set_checked(false);
                    }
                }
            }
        }
        if let Some(el) = &self.score_feedback {
            el.set_text_content(Some(""));
        }
        if let Some(stamp) = &self.timestamp {
            stamp.set_text_content(Some(""));
            stamp.set_hidden(true);
        }
        if let Some(button) = &self.score_button {
            button.set_hidden(false);
        }
    }
}

pub fn segments_html(segments: &[RenderedSegment]) -> String {
    if segments.is_empty() {
        return format!("<p>{NO_READING_TEXT}</p>");
    }
    segments
        .iter()
        .enumerate()
        .map(|(i, s)| {
            format!(
                "<span class=\"segment\" data-segment=\"{i}\" data-time=\"{}\">{}</span>",
                s.time, s.markup
            )
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn vocabulary_html(entries: &[VocabularyEntry]) -> String {
    if entries.is_empty() {
        return format!("<p>{NO_VOCABULARY}</p>");
    }
    entries
        .iter()
        .map(|e| {
            format!(
                "<div class=\"vocab-item\"><strong>{}:</strong> {}</div>",
                escape_text(&e.word),
                escape_text(&e.definition)
            )
        })
        .collect()
}

/// One `.quiz-question` block per question, radios named `question{i}`.
pub fn quiz_html(questions: &[QuizQuestion]) -> String {
    if questions.is_empty() {
        return format!("<p>{NO_QUIZ_MESSAGE}</p>");
    }
    questions
        .iter()
        .enumerate()
        .map(|(i, q)| {
            let options: String = q
                .options
                .iter()
                .map(|option| {
                    format!(
                        "<li><label><input type=\"radio\" name=\"question{i}\" value=\"{}\"> {}</label></li>",
                        escape_attr(option),
                        escape_text(option)
                    )
                })
                .collect();
            format!(
                "<div class=\"quiz-question\"><p><strong>Question {}:</strong> {}</p><ul>{options}</ul></div>",
                i + 1,
                escape_text(&q.question)
            )
        })
        .collect()
}

fn tooltip_html(spec: &TooltipSpec) -> String {
    format!(
        "<div class=\"tooltip-content\" data-word=\"{}\"><strong>{}</strong>: {}</div>\
         <button class=\"close-tooltip\" aria-label=\"Close\">&times;</button>",
        escape_attr(&spec.word),
        escape_text(&spec.word),
        escape_text(&spec.definition)
    )
}

// --- Wiring --------------------------------------------------------------------

type Session = Rc<RefCell<ReaderSession<DomSink>>>;

struct Reader {
    session: Session,
    _listeners: Vec<ListenerHandle>,
}

thread_local! {
    static READER: RefCell<Option<Reader>> = const { RefCell::new(None) };
}

fn element<T: JsCast>(doc: &Document, id: &str) -> Option<T> {
    doc.get_element_by_id(id)?.dyn_into().ok()
}

/// Attach to the page and load the initially selected week. Calling it again
/// detaches the previous reader first; its loads still in flight are dropped.
pub fn start_reader(config: ReaderConfig) -> Result<(), JsValue> {
    let win = window().ok_or_else(|| JsValue::from_str("no window"))?;
    let doc = win
        .document()
        .ok_or_else(|| JsValue::from_str("no document"))?;

    if let Some(old) = READER.with(|r| r.borrow_mut().take()) {
        old.session.borrow_mut().retire();
    }

    populate_selectors(&doc, &config)?;
    let sink = DomSink::new(&doc, &config.elements)?;
    let store = Rc::new(HttpContentStore::new(config.clone()));
    let session: Session = Rc::new(RefCell::new(ReaderSession::new(config.clone(), sink)));

    let mut listeners = Vec::new();
    if let Some(audio) = element::<HtmlMediaElement>(&doc, &config.elements.audio_player) {
        let session = session.clone();
        let player = audio.clone();
        listeners.push(ListenerHandle::listen(&audio, "timeupdate", move |_| {
            session
                .borrow_mut()
                .on_time_update(player.current_time(), player.duration());
        })?);
    }
    for id in [&config.elements.week_select, &config.elements.grade_select] {
        if let Some(select) = doc.get_element_by_id(id) {
            let session = session.clone();
            let store = store.clone();
            let doc = doc.clone();
            listeners.push(ListenerHandle::listen(&select, "change", move |_| {
                request_load(&doc, &session, &store)
            })?);
        }
    }
    if let Some(button) = doc.get_element_by_id(&config.elements.score_button) {
        let session = session.clone();
        listeners.push(ListenerHandle::listen(&button, "click", move |_| {
            submit_rendered_quiz(&session);
        })?);
    }
    if let Some(button) = doc.get_element_by_id(&config.elements.clear_button) {
        let session = session.clone();
        listeners.push(ListenerHandle::listen(&button, "click", move |_| {
            session.borrow_mut().clear_quiz()
        })?);
    }
    {
        let session = session.clone();
        listeners.push(ListenerHandle::listen(&doc, "click", move |event| {
            on_document_click(&session, &event)
        })?);
    }

    request_load(&doc, &session, &store);
    READER.with(|r| {
        *r.borrow_mut() = Some(Reader {
            session,
            _listeners: listeners,
        })
    });
    log::info!("reader attached ({} weeks)", config.total_weeks);
    Ok(())
}

/// Fill an empty week selector with 1..=total_weeks (latest selected) and
/// reset the grade selector to the default grade.
fn populate_selectors(doc: &Document, config: &ReaderConfig) -> Result<(), JsValue> {
    if let Some(select) = element::<HtmlSelectElement>(doc, &config.elements.week_select) {
        if select.length() == 0 {
            for week in 1..=config.total_weeks {
                let option = HtmlOptionElement::new_with_text_and_value(
                    &format!("Week {week}"),
                    &week.to_string(),
                )?;
                select.append_child(&option)?;
            }
        }
        select.set_value(&config.total_weeks.to_string());
    }
    if let Some(select) = element::<HtmlSelectElement>(doc, &config.elements.grade_select) {
        select.set_value(&config.default_grade);
    }
    Ok(())
}

fn select_value(doc: &Document, id: &str) -> Option<String> {
    element::<HtmlSelectElement>(doc, id)
        .map(|s| s.value())
        .filter(|v| !v.is_empty())
}

fn current_selection(doc: &Document, config: &ReaderConfig) -> Selection {
    let week = select_value(doc, &config.elements.week_select)
        .and_then(|v| v.parse().ok())
        .unwrap_or(config.total_weeks);
    let grade = select_value(doc, &config.elements.grade_select)
        .unwrap_or_else(|| config.default_grade.clone());
    Selection::new(week, grade)
}

fn request_load(doc: &Document, session: &Session, store: &Rc<HttpContentStore>) {
    let selection = current_selection(doc, session.borrow().config());
    let ticket = session.borrow_mut().begin_load(selection);
    let session = session.clone();
    let store = store.clone();
    spawn_local(async move {
        let outcome = ReaderSession::complete_load(&*session, &*store, ticket).await;
        log::debug!("load finished: {outcome:?}");
    });
}

/// Score whatever is checked in the rendered quiz. `None` until a week is loaded.
fn submit_rendered_quiz(session: &Session) -> Option<String> {
    let answers = {
        let session = session.borrow();
        let count = session.content()?.quiz.len();
        session.sink().checked_answers(count)
    };
    let result = session.borrow_mut().submit_quiz(&answers)?;
    Some(quiz::feedback(&result))
}

/// Score the running reader's quiz from the checked radios.
pub fn score_rendered_quiz() -> Option<String> {
    let session = READER.with(|r| r.borrow().as_ref().map(|reader| reader.session.clone()))?;
    submit_rendered_quiz(&session)
}

pub fn clear_rendered_quiz() {
    let session = READER.with(|r| r.borrow().as_ref().map(|reader| reader.session.clone()));
    if let Some(session) = session {
        session.borrow_mut().clear_quiz();
    }
}

fn viewport() -> Viewport {
    let dimension = |value: Result<JsValue, JsValue>| value.ok().and_then(|v| v.as_f64()).unwrap_or(0.0);
    match window() {
        Some(win) => Viewport {
            width: dimension(win.inner_width()),
            height: dimension(win.inner_height()),
        },
        None => Viewport { width: 0.0, height: 0.0 },
    }
}

fn on_document_click(session: &Session, event: &Event) {
    let Some(target) = event.target().and_then(|t| t.dyn_into::<Element>().ok()) else {
        return;
    };
    let closest = |selector: &str| target.closest(selector).ok().flatten();

    if closest(".close-tooltip").is_some() {
        session.borrow_mut().on_close_button();
        return;
    }
    if closest(".vocab-tooltip").is_some() {
        return;
    }
    if let Some(word_el) = closest(".vocab-word") {
        let word = word_el
            .get_attribute("data-word")
            .or_else(|| word_el.text_content())
            .unwrap_or_default();
        let rect = word_el.get_bounding_client_rect();
        let anchor = AnchorRect {
            top: rect.top(),
            left: rect.left(),
            width: rect.width(),
            height: rect.height(),
        };
        session.borrow_mut().on_vocab_click(&word, anchor, viewport());
        return;
    }
    session.borrow_mut().on_outside_click();
}
