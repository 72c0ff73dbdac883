use std::fmt;

use crate::models::{ReportShape, Role};

/// Why a sheet could not be turned into a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingError {
    /// Fewer rows than the shape needs.
    NoData,
    /// Headers matched no shape and no mode was chosen.
    UnrecognizedShape,
    MissingColumns { shape: ReportShape, roles: Vec<Role> },
    /// Mode text that names none of the six shapes.
    InvalidMode(String),
}

impl fmt::Display for ProcessingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoData => write!(f, "Нет данных в файле"),
            Self::UnrecognizedShape => write!(
                f,
                "Не удалось определить тип файла. Выберите режим обработки через /start."
            ),
            Self::MissingColumns { shape, roles } => {
                let names: Vec<String> = roles.iter().map(|role| format!("'{role}'")).collect();
                write!(
                    f,
                    "Не найдены необходимые колонки для режима «{}»: {}. Проверьте файл или выберите другой режим через /start.",
                    shape.label(),
                    names.join(", ")
                )
            }
            Self::InvalidMode(mode) => write!(
                f,
                "Некорректный режим обработки '{mode}'. Используйте /start для выбора режима."
            ),
        }
    }
}

impl std::error::Error for ProcessingError {}

/// The workbook reader failed before any rows were produced.
#[derive(Debug)]
pub enum ReadError {
    Open { path: String, message: String },
    NoSheets { path: String },
    Sheet { sheet: String, message: String },
    Csv(String),
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open { path, message } => write!(f, "failed to open {path}: {message}"),
            Self::NoSheets { path } => write!(f, "{path} contains no sheets"),
            Self::Sheet { sheet, message } => {
                write!(f, "failed to read sheet '{sheet}': {message}")
            }
            Self::Csv(message) => write!(f, "CSV parse error: {message}"),
        }
    }
}

impl std::error::Error for ReadError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_columns_names_roles() {
        let err = ProcessingError::MissingColumns {
            shape: ReportShape::Attendance,
            roles: vec![Role::Teacher, Role::AttendancePercent],
        };
        let text = err.to_string();
        assert!(text.contains("'ФИО преподавателя', 'средняя посещаемость'"));
        assert!(text.contains("/start"));
    }
}
