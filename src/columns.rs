use tracing::debug;

use crate::models::{ReportShape, Role, RoleIndex};

/// Columns a shape reads. Optional roles are resolved when present but never
/// fail resolution.
pub struct ShapeColumns {
    pub required: &'static [Role],
    pub optional: &'static [Role],
}

pub fn shape_columns(shape: ReportShape) -> ShapeColumns {
    match shape {
        ReportShape::Schedule => ShapeColumns {
            required: &[Role::Group, Role::Subject],
            optional: &[],
        },
        ReportShape::LessonTopics => ShapeColumns {
            required: &[Role::Topic],
            optional: &[],
        },
        ReportShape::Students => ShapeColumns {
            required: &[Role::Fio],
            optional: &[Role::Homework, Role::Classwork],
        },
        ReportShape::Attendance => ShapeColumns {
            required: &[Role::Teacher, Role::AttendancePercent],
            optional: &[],
        },
        ReportShape::CheckedHomework => ShapeColumns {
            required: &[Role::Teacher, Role::CheckedCount, Role::TotalCount],
            optional: &[],
        },
        ReportShape::SubmittedHomework => ShapeColumns {
            required: &[Role::Fio, Role::HomeworkPercent],
            optional: &[],
        },
    }
}

pub fn resolve(header: &[String], shape: ReportShape) -> Result<RoleIndex, Vec<Role>> {
    let columns = shape_columns(shape);
    let mut index = RoleIndex::default();

    for (position, cell) in header.iter().enumerate() {
        let role = columns
            .required
            .iter()
            .chain(columns.optional)
            .copied()
            .find(|role| role.matches(cell));
        if let Some(role) = role {
            index.assign(role, position);
        }
    }

    if shape == ReportShape::Schedule && !index.contains(Role::Subject) {
        if let Some(group) = index.get(Role::Group) {
            if let Some(position) = (0..header.len()).find(|position| *position != group) {
                index.assign(Role::Subject, position);
            }
        }
    }

    let missing: Vec<Role> = columns
        .required
        .iter()
        .copied()
        .filter(|role| !index.contains(*role))
        .collect();

    if missing.is_empty() {
        debug!(%shape, ?index, "resolved columns");
        Ok(index)
    } else {
        debug!(%shape, ?missing, "required columns not found");
        Err(missing)
    }
}
