// Pure grading and progress arithmetic. Handlers fetch rows and feed the
// values through here so the math stays independent of the storage layer.

use crate::models::QuestionKind;

/// Outcome of grading a single response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Graded {
    pub is_correct: bool,
    pub points_earned: i32,
}

/// Grade one response. Choice kinds are correct iff the selected answer is
/// flagged correct; short answers are correct iff the trimmed text is
/// non-empty (placeholder semantics pending real grading).
pub fn grade_response(
    kind: QuestionKind,
    points: i32,
    selected_is_correct: Option<bool>,
    text_answer: &str,
) -> Graded {
    let is_correct = match kind {
        QuestionKind::MultipleChoice | QuestionKind::TrueFalse => {
            selected_is_correct.unwrap_or(false)
        }
        QuestionKind::ShortAnswer => !text_answer.trim().is_empty(),
    };
    Graded {
        is_correct,
        points_earned: if is_correct { points } else { 0 },
    }
}

/// Percentage score, floored. Zero possible points scores zero.
pub fn score_percent(earned: i32, possible: i32) -> i32 {
    if possible > 0 {
        (earned as i64 * 100 / possible as i64) as i32
    } else {
        0
    }
}

pub fn is_passing(score: i32, passing_score: i32) -> bool {
    score >= passing_score
}

/// Course progress, floored. A course with no lessons sits at zero.
pub fn progress_percent(completed_lessons: i64, total_lessons: i64) -> i32 {
    if total_lessons > 0 {
        (completed_lessons * 100 / total_lessons) as i32
    } else {
        0
    }
}

/// Completion / pass rate as a percentage for analytics. An empty
/// population rates zero.
pub fn rate_percent(part: i64, whole: i64) -> f64 {
    if whole > 0 {
        part as f64 / whole as f64 * 100.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_choice_earns_full_points() {
        let g = grade_response(QuestionKind::MultipleChoice, 10, Some(true), "");
        assert!(g.is_correct);
        assert_eq!(g.points_earned, 10);
    }

    #[test]
    fn wrong_or_missing_choice_earns_nothing() {
        let g = grade_response(QuestionKind::MultipleChoice, 10, Some(false), "");
        assert!(!g.is_correct);
        assert_eq!(g.points_earned, 0);

        let g = grade_response(QuestionKind::TrueFalse, 5, None, "");
        assert!(!g.is_correct);
        assert_eq!(g.points_earned, 0);
    }

    #[test]
    fn short_answer_graded_on_non_empty_text() {
        let g = grade_response(QuestionKind::ShortAnswer, 3, None, "  photosynthesis ");
        assert!(g.is_correct);
        assert_eq!(g.points_earned, 3);

        let g = grade_response(QuestionKind::ShortAnswer, 3, None, "   ");
        assert!(!g.is_correct);
        assert_eq!(g.points_earned, 0);
    }

    #[test]
    fn single_question_pass_and_fail_scenarios() {
        // one 10-point question, passing score 70
        let right = grade_response(QuestionKind::MultipleChoice, 10, Some(true), "");
        let score = score_percent(right.points_earned, 10);
        assert_eq!(score, 100);
        assert!(is_passing(score, 70));

        let wrong = grade_response(QuestionKind::MultipleChoice, 10, Some(false), "");
        let score = score_percent(wrong.points_earned, 10);
        assert_eq!(score, 0);
        assert!(!is_passing(score, 70));
    }

    #[test]
    fn score_floors_and_handles_zero_possible() {
        assert_eq!(score_percent(2, 3), 66);
        assert_eq!(score_percent(0, 0), 0);
        assert_eq!(score_percent(5, 0), 0);
    }

    #[test]
    fn score_is_idempotent_over_same_inputs() {
        assert_eq!(score_percent(7, 9), score_percent(7, 9));
    }

    #[test]
    fn progress_floors_and_guards_empty_course() {
        assert_eq!(progress_percent(1, 2), 50);
        assert_eq!(progress_percent(2, 2), 100);
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(0, 0), 0);
    }

    #[test]
    fn rate_handles_empty_and_full_populations() {
        assert_eq!(rate_percent(0, 0), 0.0);
        assert_eq!(rate_percent(0, 5), 0.0);
        assert_eq!(rate_percent(5, 5), 100.0);
        assert!((rate_percent(1, 3) - 33.333).abs() < 0.01);
    }
}
