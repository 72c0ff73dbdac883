use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ProcessingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportShape {
    Schedule,
    LessonTopics,
    Students,
    Attendance,
    CheckedHomework,
    SubmittedHomework,
}

impl ReportShape {
    pub const ALL: [ReportShape; 6] = [
        ReportShape::Schedule,
        ReportShape::LessonTopics,
        ReportShape::Students,
        ReportShape::Attendance,
        ReportShape::CheckedHomework,
        ReportShape::SubmittedHomework,
    ];

    /// Identifier used for operator-selected modes and menu callbacks.
    pub fn mode_id(self) -> &'static str {
        match self {
            ReportShape::Schedule => "schedule",
            ReportShape::LessonTopics => "lessons",
            ReportShape::Students => "students",
            ReportShape::Attendance => "attendance",
            ReportShape::CheckedHomework => "checked_homework",
            ReportShape::SubmittedHomework => "submitted_homework",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ReportShape::Schedule => "Расписание групп",
            ReportShape::LessonTopics => "Темы уроков",
            ReportShape::Students => "Студенты",
            ReportShape::Attendance => "Посещаемость",
            ReportShape::CheckedHomework => "Проверенные ДЗ",
            ReportShape::SubmittedHomework => "Сданные ДЗ",
        }
    }

    /// Row holding the column headers. Homework-check exports carry a title row first.
    pub fn header_row(self) -> usize {
        match self {
            ReportShape::CheckedHomework => 1,
            _ => 0,
        }
    }

    /// Fewest rows a sheet needs before extraction is attempted.
    pub fn min_rows(self) -> usize {
        match self {
            ReportShape::LessonTopics => 1,
            _ => 2,
        }
    }
}

impl fmt::Display for ReportShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mode_id())
    }
}

impl FromStr for ReportShape {
    type Err = ProcessingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let needle = value.trim();
        ReportShape::ALL
            .into_iter()
            .find(|shape| shape.mode_id() == needle)
            .ok_or_else(|| ProcessingError::InvalidMode(value.to_string()))
    }
}

/// Semantic meaning a header column can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Group,
    Subject,
    Topic,
    Fio,
    Homework,
    Classwork,
    Teacher,
    AttendancePercent,
    CheckedCount,
    TotalCount,
    HomeworkPercent,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Group => "группа",
            Role::Subject => "предмет",
            Role::Topic => "тема урока",
            Role::Fio => "ФИО",
            Role::Homework => "homework",
            Role::Classwork => "classwork",
            Role::Teacher => "ФИО преподавателя",
            Role::AttendancePercent => "средняя посещаемость",
            Role::CheckedCount => "проверено",
            Role::TotalCount => "получено",
            Role::HomeworkPercent => "percentage homework",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleIndex {
    columns: HashMap<Role, usize>,
}

impl RoleIndex {
    pub fn get(&self, role: Role) -> Option<usize> {
        self.columns.get(&role).copied()
    }

    pub fn contains(&self, role: Role) -> bool {
        self.columns.contains_key(&role)
    }

    /// Keeps the first column seen for a role.
    pub fn assign(&mut self, role: Role, column: usize) -> bool {
        if self.columns.contains_key(&role) {
            return false;
        }
        self.columns.insert(role, column);
        true
    }

    /// Highest resolved column; rows must be longer than this to be read.
    pub fn max_column(&self) -> Option<usize> {
        self.columns.values().copied().max()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectCount {
    pub subject: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupTally {
    pub group: String,
    pub subjects: Vec<SubjectCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Measure {
    /// Homework mark equal to the literal flag value.
    HomeworkMark { value: String },
    ClassworkGrade { value: f64 },
    AttendancePercent { value: f64 },
    CheckedPercent { value: f64 },
    SubmittedPercent { value: i64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Flag {
    pub name: String,
    pub measure: Measure,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Findings {
    Tally { groups: Vec<GroupTally> },
    Topics { valid: Vec<String>, invalid: Vec<String> },
    Flagged { flags: Vec<Flag> },
}

impl Findings {
    pub fn is_empty(&self) -> bool {
        match self {
            Findings::Tally { groups } => groups.is_empty(),
            Findings::Topics { valid, invalid } => valid.is_empty() && invalid.is_empty(),
            Findings::Flagged { flags } => flags.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_parse_by_identifier() {
        for shape in ReportShape::ALL {
            assert_eq!(shape.mode_id().parse::<ReportShape>().unwrap(), shape);
        }
        assert_eq!(
            " lessons ".parse::<ReportShape>().unwrap(),
            ReportShape::LessonTopics
        );
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let err = "grades".parse::<ReportShape>().unwrap_err();
        assert_eq!(err, ProcessingError::InvalidMode("grades".to_string()));
    }

    #[test]
    fn role_index_keeps_first_column() {
        let mut index = RoleIndex::default();
        assert!(index.assign(Role::Group, 2));
        assert!(!index.assign(Role::Group, 5));
        assert_eq!(index.get(Role::Group), Some(2));
        assert!(index.assign(Role::Subject, 4));
        assert_eq!(index.max_column(), Some(4));
    }
}
