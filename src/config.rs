//! Host-tunable settings. Every field has a default matching the deployed site,
//! so a page can pass a partial JSON override (or nothing at all).

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// `{week}` is substituted.
    pub reading_manifest_path: String,
    pub vocabulary_manifest_path: String,
    pub quiz_manifest_path: String,
    /// Fallbacks used when a reading omits `audio` / `image`. `{week}` and `{grade}` are substituted.
    pub audio_path: String,
    pub image_path: String,
    pub total_weeks: u32,
    pub default_grade: String,
    /// Opt-in per-word highlighting (uniform slicing of each segment interval).
    pub word_highlight: bool,
    pub tooltip: TooltipConfig,
    pub elements: ElementIds,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            reading_manifest_path: "data/readings/week{week}_reading.json".into(),
            vocabulary_manifest_path: "data/vocabulary/week{week}_vocabulary.json".into(),
            quiz_manifest_path: "data/quizzes/week{week}_quizzes.json".into(),
            audio_path: "assets/audios/week{week}_audio_grade{grade}.mp3".into(),
            image_path: "assets/images/week{week}_image_grade{grade}.jpg".into(),
            total_weeks: 5,
            default_grade: "6".into(),
            word_highlight: false,
            tooltip: TooltipConfig::default(),
            elements: ElementIds::default(),
        }
    }
}

impl ReaderConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn reading_url(&self, week: u32) -> String {
        expand(&self.reading_manifest_path, week, "")
    }

    pub fn vocabulary_url(&self, week: u32) -> String {
        expand(&self.vocabulary_manifest_path, week, "")
    }

    pub fn quiz_url(&self, week: u32) -> String {
        expand(&self.quiz_manifest_path, week, "")
    }
}

/// Placement tuning for vocabulary popups, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct TooltipConfig {
    /// Space between the anchor word and the popup edge.
    pub gap: f64,
    pub estimated_height: f64,
    pub estimated_width: f64,
}

impl Default for TooltipConfig {
    fn default() -> Self {
        Self {
            gap: 8.0,
            estimated_height: 40.0,
            estimated_width: 240.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ElementIds {
    pub audio_player: String,
    pub audio_source: String,
    pub text_content: String,
    pub image_frame: String,
    pub vocabulary_content: String,
    pub week_select: String,
    pub grade_select: String,
    pub title_display: String,
    pub quiz_content: String,
    pub score_button: String,
    pub clear_button: String,
    pub score_feedback: String,
    pub timestamp: String,
}

impl Default for ElementIds {
    fn default() -> Self {
        Self {
            audio_player: "audioPlayer".into(),
            audio_source: "audioSource".into(),
            text_content: "textContent".into(),
            image_frame: "imageFrame".into(),
            vocabulary_content: "vocabularyContent".into(),
            week_select: "weekSelect".into(),
            grade_select: "gradeSelect".into(),
            title_display: "readingTitleDisplay".into(),
            quiz_content: "quizContent".into(),
            score_button: "scoreButton".into(),
            clear_button: "clearButton".into(),
            score_feedback: "scoreFeedback".into(),
            timestamp: "timestamp".into(),
        }
    }
}

/// Fill `{week}` and `{grade}` placeholders in a path template.
pub fn expand(template: &str, week: u32, grade: &str) -> String {
    template
        .replace("{week}", &week.to_string())
        .replace("{grade}", grade)
}
