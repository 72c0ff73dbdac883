use tracing::debug;

use crate::models::ReportShape;

pub type ShapePredicate = fn(&str) -> bool;

/// Shape detection rules, tried in order. The first match wins, so the
/// order is also the tie-break between overlapping header sets.
pub const CLASSIFICATION_ORDER: [(ShapePredicate, ReportShape); 6] = [
    (is_schedule, ReportShape::Schedule),
    (is_lesson_topics, ReportShape::LessonTopics),
    (is_students, ReportShape::Students),
    (is_attendance, ReportShape::Attendance),
    (is_checked_homework, ReportShape::CheckedHomework),
    (is_submitted_homework, ReportShape::SubmittedHomework),
];

fn is_schedule(text: &str) -> bool {
    text.contains("группа") && text.contains("время") && text.contains("пара")
}

fn is_lesson_topics(text: &str) -> bool {
    text.contains("урок") || text.contains("тема")
}

fn is_students(text: &str) -> bool {
    text.contains("fio") || (text.contains("homework") && text.contains("classroom"))
}

fn is_attendance(text: &str) -> bool {
    text.contains("фио преподавателя") && text.contains("средняя посещаемость")
}

fn is_checked_homework(text: &str) -> bool {
    (text.contains("форма обучения") && text.contains("фио преподавателя"))
        || text.contains("месяц")
        || text.contains("неделя")
        || text.contains("день")
        || text.contains("проверено")
}

fn is_submitted_homework(text: &str) -> bool {
    text.contains("fio") && (text.contains("percentage homework") || text.contains("домашнее"))
}

pub fn header_text(header: &[String]) -> String {
    header.join(" ").to_lowercase()
}

pub fn classify(header: &[String]) -> Option<ReportShape> {
    let text = header_text(header);
    let shape = CLASSIFICATION_ORDER
        .iter()
        .find(|(predicate, _)| predicate(&text))
        .map(|(_, shape)| *shape);
    debug!(header = %text, shape = ?shape, "classified header row");
    shape
}
