use std::fmt::Write;

use crate::models::{Findings, Flag, GroupTally, Measure, ReportShape};

struct Template {
    title: &'static str,
    /// Heading above the flagged list.
    heading: &'static str,
    all_clear: &'static str,
}

fn template(shape: ReportShape) -> Template {
    match shape {
        ReportShape::Schedule => Template {
            title: "📅 ОТЧЕТ ПО РАСПИСАНИЮ ГРУПП",
            heading: "Количество пар по дисциплинам:",
            all_clear: "Пары в расписании не найдены",
        },
        ReportShape::LessonTopics => Template {
            title: "📚 ОТЧЕТ ПО ТЕМАМ ЗАНЯТИЙ",
            heading: "",
            all_clear: "Темы уроков не найдены",
        },
        ReportShape::Students => Template {
            title: "👨‍🎓 ОТЧЕТ ПО СТУДЕНТАМ",
            heading: "Студенты, требующие внимания:",
            all_clear: "✅ Все студенты успешно справляются",
        },
        ReportShape::Attendance => Template {
            title: "👨‍🏫 ОТЧЕТ ПО ПОСЕЩАЕМОСТИ ПРЕПОДАВАТЕЛЕЙ",
            heading: "Преподаватели с посещаемостью ниже 40%:",
            all_clear: "✅ У всех преподавателей посещаемость 40% и выше",
        },
        ReportShape::CheckedHomework => Template {
            title: "📝 ОТЧЕТ ПО ПРОВЕРЕННЫМ ДОМАШНИМ ЗАДАНИЯМ",
            heading: "Преподаватели с проверкой ниже 70%:",
            all_clear: "✅ Все преподаватели проверяют не менее 70% заданий",
        },
        ReportShape::SubmittedHomework => Template {
            title: "📊 ОТЧЕТ ПО СДАННЫМ ДОМАШНИМ ЗАДАНИЯМ",
            heading: "Студенты с выполнением ниже 70%:",
            all_clear: "✅ Все студенты выполнили не менее 70% домашних заданий",
        },
    }
}

pub fn describe_flag(flag: &Flag) -> String {
    match &flag.measure {
        Measure::HomeworkMark { value } => format!("{} (домашняя: {})", flag.name, value),
        Measure::ClassworkGrade { value } => format!("{} (классная: {:.1})", flag.name, value),
        Measure::AttendancePercent { value } => format!("{} ({:.1}%)", flag.name, value),
        Measure::CheckedPercent { value } => {
            format!("{} ({:.1}% проверено)", flag.name, value)
        }
        Measure::SubmittedPercent { value } => format!("{} - {}%", flag.name, value),
    }
}

fn write_tally(output: &mut String, groups: &[GroupTally]) {
    for tally in groups {
        let _ = writeln!(output, "Группа: {}", tally.group);
        for entry in &tally.subjects {
            let _ = writeln!(output, "  {}: {} пар", entry.subject, entry.count);
        }
        let _ = writeln!(output);
    }
}

fn write_topics(output: &mut String, valid: &[String], invalid: &[String]) {
    if !valid.is_empty() {
        let _ = writeln!(output, "✅ Темы в правильном формате:");
        for topic in valid {
            let _ = writeln!(output, "• {topic}");
        }
        let _ = writeln!(output);
    }
    if !invalid.is_empty() {
        let _ = writeln!(output, "❌ Темы в НЕправильном формате:");
        for topic in invalid {
            let _ = writeln!(output, "• {topic}");
        }
    }
}

pub fn render(shape: ReportShape, findings: &Findings) -> String {
    let template = template(shape);
    let mut output = String::new();

    let _ = writeln!(output, "{}", template.title);

    if findings.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "{}", template.all_clear);
        return output;
    }

    match findings {
        Findings::Tally { groups } => {
            let _ = writeln!(output, "{}", template.heading);
            let _ = writeln!(output);
            write_tally(&mut output, groups);
        }
        Findings::Topics { valid, invalid } => {
            let _ = writeln!(output);
            write_topics(&mut output, valid, invalid);
        }
        Findings::Flagged { flags } => {
            let _ = writeln!(output);
            let _ = writeln!(output, "{}", template.heading);
            for (position, flag) in flags.iter().enumerate() {
                let _ = writeln!(output, "{}. {}", position + 1, describe_flag(flag));
            }
        }
    }

    output
}
