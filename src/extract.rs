use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::trace;

use crate::models::{Findings, Flag, GroupTally, Measure, ReportShape, Role, RoleIndex, SubjectCount};

static LESSON_TOPIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^Урок №\s*\d+.*Тема:").unwrap());

pub const CLASSWORK_THRESHOLD: f64 = 3.0;
pub const ATTENDANCE_THRESHOLD: f64 = 40.0;
pub const CHECKED_THRESHOLD: f64 = 70.0;
pub const SUBMITTED_THRESHOLD: i64 = 70;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    Decimal,
    /// Decimal with an optional trailing percent sign.
    Percent,
}

impl Coercion {
    /// Finite decimal value of the cell; "inf" and "NaN" are not numbers here.
    pub fn coerce(self, text: &str) -> Option<f64> {
        let text = match self {
            Coercion::Decimal => text,
            Coercion::Percent => text.strip_suffix('%').unwrap_or(text).trim_end(),
        };
        text.parse::<f64>().ok().filter(|value| value.is_finite())
    }
}

pub enum Check {
    /// Cell text equal to a literal value.
    Equals {
        role: Role,
        literal: &'static str,
        measure: fn(&str) -> Measure,
    },
    Below {
        role: Role,
        coercion: Coercion,
        threshold: f64,
        measure: fn(f64) -> Measure,
    },
    /// Whole number below the threshold; "65.0" does not parse.
    IntegerBelow {
        role: Role,
        threshold: i64,
        measure: fn(i64) -> Measure,
    },
    /// `numerator / denominator * 100` below the threshold; rows with a
    /// non-positive denominator are ignored.
    RatioBelow {
        numerator: Role,
        denominator: Role,
        threshold: f64,
        measure: fn(f64) -> Measure,
    },
}

pub enum RowRule {
    Tally { key: Role, value: Role },
    Pattern { role: Role, pattern: &'static Lazy<Regex> },
    /// Checks are tried in order and the first hit flags the row.
    Flag { name: Role, checks: &'static [Check] },
}

pub struct ShapeDescriptor {
    pub shape: ReportShape,
    pub rule: RowRule,
}

fn homework_mark(value: &str) -> Measure {
    Measure::HomeworkMark {
        value: value.to_string(),
    }
}

fn classwork_grade(value: f64) -> Measure {
    Measure::ClassworkGrade { value }
}

fn attendance_percent(value: f64) -> Measure {
    Measure::AttendancePercent { value }
}

fn checked_percent(value: f64) -> Measure {
    Measure::CheckedPercent { value }
}

fn submitted_percent(value: i64) -> Measure {
    Measure::SubmittedPercent { value }
}

static SCHEDULE: ShapeDescriptor = ShapeDescriptor {
    shape: ReportShape::Schedule,
    rule: RowRule::Tally {
        key: Role::Group,
        value: Role::Subject,
    },
};

static LESSON_TOPICS: ShapeDescriptor = ShapeDescriptor {
    shape: ReportShape::LessonTopics,
    rule: RowRule::Pattern {
        role: Role::Topic,
        pattern: &LESSON_TOPIC_RE,
    },
};

static STUDENTS: ShapeDescriptor = ShapeDescriptor {
    shape: ReportShape::Students,
    rule: RowRule::Flag {
        name: Role::Fio,
        checks: &[
            Check::Equals {
                role: Role::Homework,
                literal: "1",
                measure: homework_mark,
            },
            Check::Below {
                role: Role::Classwork,
                coercion: Coercion::Decimal,
                threshold: CLASSWORK_THRESHOLD,
                measure: classwork_grade,
            },
        ],
    },
};

static ATTENDANCE: ShapeDescriptor = ShapeDescriptor {
    shape: ReportShape::Attendance,
    rule: RowRule::Flag {
        name: Role::Teacher,
        checks: &[Check::Below {
            role: Role::AttendancePercent,
            coercion: Coercion::Percent,
            threshold: ATTENDANCE_THRESHOLD,
            measure: attendance_percent,
        }],
    },
};

static CHECKED_HOMEWORK: ShapeDescriptor = ShapeDescriptor {
    shape: ReportShape::CheckedHomework,
    rule: RowRule::Flag {
        name: Role::Teacher,
        checks: &[Check::RatioBelow {
            numerator: Role::CheckedCount,
            denominator: Role::TotalCount,
            threshold: CHECKED_THRESHOLD,
            measure: checked_percent,
        }],
    },
};

static SUBMITTED_HOMEWORK: ShapeDescriptor = ShapeDescriptor {
    shape: ReportShape::SubmittedHomework,
    rule: RowRule::Flag {
        name: Role::Fio,
        checks: &[Check::IntegerBelow {
            role: Role::HomeworkPercent,
            threshold: SUBMITTED_THRESHOLD,
            measure: submitted_percent,
        }],
    },
};

pub fn descriptor(shape: ReportShape) -> &'static ShapeDescriptor {
    match shape {
        ReportShape::Schedule => &SCHEDULE,
        ReportShape::LessonTopics => &LESSON_TOPICS,
        ReportShape::Students => &STUDENTS,
        ReportShape::Attendance => &ATTENDANCE,
        ReportShape::CheckedHomework => &CHECKED_HOMEWORK,
        ReportShape::SubmittedHomework => &SUBMITTED_HOMEWORK,
    }
}

/// Trimmed cell text for a resolved role; absent when the role was not
/// resolved or the row is too short.
fn cell<'a>(row: &'a [String], index: &RoleIndex, role: Role) -> Option<&'a str> {
    let column = index.get(role)?;
    row.get(column).map(|text| text.trim())
}

fn non_empty<'a>(row: &'a [String], index: &RoleIndex, role: Role) -> Option<&'a str> {
    cell(row, index, role).filter(|text| !text.is_empty())
}

impl Check {
    fn evaluate(&self, row: &[String], index: &RoleIndex) -> Option<Measure> {
        match self {
            Check::Equals {
                role,
                literal,
                measure,
            } => {
                let text = cell(row, index, *role)?;
                (text == *literal).then(|| measure(text))
            }
            Check::Below {
                role,
                coercion,
                threshold,
                measure,
            } => {
                let value = coercion.coerce(non_empty(row, index, *role)?)?;
                (value < *threshold).then(|| measure(value))
            }
            Check::IntegerBelow {
                role,
                threshold,
                measure,
            } => {
                let value = non_empty(row, index, *role)?.parse::<i64>().ok()?;
                (value < *threshold).then(|| measure(value))
            }
            Check::RatioBelow {
                numerator,
                denominator,
                threshold,
                measure,
            } => {
                let done = Coercion::Decimal.coerce(non_empty(row, index, *numerator)?)?;
                let total = Coercion::Decimal.coerce(non_empty(row, index, *denominator)?)?;
                if total <= 0.0 {
                    return None;
                }
                let percent = done / total * 100.0;
                (percent < *threshold).then(|| measure(percent))
            }
        }
    }
}

impl ShapeDescriptor {
    pub fn extract(&self, rows: &[Vec<String>], index: &RoleIndex) -> Findings {
        let width = index.max_column().map_or(0, |column| column + 1);
        let rows = rows.iter().enumerate().filter(|(line, row)| {
            let long_enough = row.len() >= width;
            if !long_enough {
                trace!(shape = %self.shape, line, "skipping short row");
            }
            long_enough
        });

        match &self.rule {
            RowRule::Tally { key, value } => {
                let mut groups: Vec<GroupTally> = Vec::new();
                let mut positions: HashMap<String, usize> = HashMap::new();

                for (_, row) in rows {
                    let (Some(group), Some(subject)) =
                        (non_empty(row, index, *key), non_empty(row, index, *value))
                    else {
                        continue;
                    };

                    let position = *positions.entry(group.to_string()).or_insert_with(|| {
                        groups.push(GroupTally {
                            group: group.to_string(),
                            subjects: Vec::new(),
                        });
                        groups.len() - 1
                    });
                    let subjects = &mut groups[position].subjects;
                    match subjects.iter_mut().find(|entry| entry.subject == subject) {
                        Some(entry) => entry.count += 1,
                        None => subjects.push(SubjectCount {
                            subject: subject.to_string(),
                            count: 1,
                        }),
                    }
                }

                Findings::Tally { groups }
            }
            RowRule::Pattern { role, pattern } => {
                let mut valid = Vec::new();
                let mut invalid = Vec::new();

                for (_, row) in rows {
                    let Some(topic) = non_empty(row, index, *role) else {
                        continue;
                    };
                    if pattern.is_match(topic) {
                        valid.push(topic.to_string());
                    } else {
                        invalid.push(topic.to_string());
                    }
                }

                Findings::Topics { valid, invalid }
            }
            RowRule::Flag { name, checks } => {
                let mut flags = Vec::new();

                for (line, row) in rows {
                    let Some(person) = non_empty(row, index, *name) else {
                        trace!(shape = %self.shape, line, "skipping row without a name");
                        continue;
                    };
                    if let Some(measure) = checks.iter().find_map(|check| check.evaluate(row, index)) {
                        flags.push(Flag {
                            name: person.to_string(),
                            measure,
                        });
                    }
                }

                Findings::Flagged { flags }
            }
        }
    }
}

pub fn extract(shape: ReportShape, rows: &[Vec<String>], index: &RoleIndex) -> Findings {
    descriptor(shape).extract(rows, index)
}
