//! Self-scored reading quiz.
//!
//! Manifest shape: `{ "quizzes": { "6": [{ "question", "options", "answer" }] } }`.

use std::collections::HashMap;

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub answer: String,
}

#[derive(Deserialize)]
struct QuizManifest {
    quizzes: HashMap<String, Vec<QuizQuestion>>,
}

/// Questions for `grade`, `Ok(None)` when the week has no quiz for it.
pub fn questions_for_grade(
    manifest_json: &str,
    grade: &str,
) -> Result<Option<Vec<QuizQuestion>>, serde_json::Error> {
    let mut manifest: QuizManifest = serde_json::from_str(manifest_json)?;
    Ok(manifest.quizzes.remove(grade))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuizScore {
    pub correct: usize,
    pub total: usize,
    pub all_answered: bool,
}

/// Count exact-match answers. `answers[i]` is the option picked for question
/// `i`, `None` if it was left blank; missing trailing answers count as blank.
pub fn score(questions: &[QuizQuestion], answers: &[Option<String>]) -> QuizScore {
    let mut correct = 0;
    let mut all_answered = true;
    for (i, question) in questions.iter().enumerate() {
        match answers.get(i).and_then(Option::as_deref) {
            Some(picked) if picked == question.answer => correct += 1,
            Some(_) => {}
            None => all_answered = false,
        }
    }
    QuizScore { correct, total: questions.len(), all_answered }
}

pub const NO_QUIZ_MESSAGE: &str = "No quiz data available for this grade.";

pub const INCOMPLETE_MESSAGE: &str = "Please answer all questions to get your score.";

const FEEDBACK: [&str; 5] = [
    "Too low. Try again! (Muy bajito, ¡Intenta de nuevo!)",
    "Getting better. Try again! (Mejorando. ¡Intenta de nuevo!)",
    "Barely made it. Try again! (Pasaste raspadito(a). ¡Intenta de nuevo!)",
    "Good job. (¡Buen trabajo!)",
    "Amazing work! You are the best! (¡Estupendo!)",
];

/// Bilingual feedback line shown under the quiz.
pub fn feedback(result: &QuizScore) -> String {
    if !result.all_answered || result.total == 0 {
        return INCOMPLETE_MESSAGE.to_string();
    }
    // Five bands over the score ratio; zero shares the lowest band.
    let band = (result.correct * FEEDBACK.len()).div_ceil(result.total).clamp(1, FEEDBACK.len());
    format!(
        "Score: {}/{} - {}",
        result.correct,
        result.total,
        FEEDBACK[band - 1]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const MANIFEST: &str = r#"{ "quizzes": { "6": [
        { "question": "Q1", "options": ["a", "b"], "answer": "a" },
        { "question": "Q2", "options": ["a", "b"], "answer": "b" },
        { "question": "Q3", "options": ["a", "b"], "answer": "a" },
        { "question": "Q4", "options": ["a", "b"], "answer": "b" },
        { "question": "Q5", "options": ["a", "b"], "answer": "a" }
    ] } }"#;

    fn answers(picks: &[Option<&str>]) -> Vec<Option<String>> {
        picks.iter().map(|p| p.map(str::to_string)).collect()
    }

    #[test]
    fn parses_grade_and_misses_absent_grade() {
        assert_eq!(questions_for_grade(MANIFEST, "6").unwrap().unwrap().len(), 5);
        assert!(questions_for_grade(MANIFEST, "7").unwrap().is_none());
        assert!(questions_for_grade("{}", "6").is_err());
    }

    #[test]
    fn counts_exact_matches() {
        let qs = questions_for_grade(MANIFEST, "6").unwrap().unwrap();
        let s = score(&qs, &answers(&[Some("a"), Some("a"), Some("a"), Some("b"), Some("A")]));
        assert_eq!(s, QuizScore { correct: 3, total: 5, all_answered: true });
    }

    #[test]
    fn blank_answers_block_feedback() {
        let qs = questions_for_grade(MANIFEST, "6").unwrap().unwrap();
        let s = score(&qs, &answers(&[Some("a"), None]));
        assert!(!s.all_answered);
        assert_eq!(feedback(&s), INCOMPLETE_MESSAGE);
    }

    #[rstest]
    #[case(0, "Too low.")]
    #[case(1, "Too low.")]
    #[case(3, "Barely made it.")]
    #[case(5, "Amazing work!")]
    fn five_question_bands(#[case] correct: usize, #[case] prefix: &str) {
        let text = feedback(&QuizScore { correct, total: 5, all_answered: true });
        assert!(text.starts_with(&format!("Score: {correct}/5 - {prefix}")), "{text}");
    }

    #[test]
    fn bands_scale_with_question_count() {
        let text = feedback(&QuizScore { correct: 8, total: 10, all_answered: true });
        assert!(text.contains("Good job."), "{text}");
    }
}
