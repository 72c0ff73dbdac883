use serde::Serialize;
use tracing::{debug, info};

use crate::classify::classify;
use crate::columns::resolve;
use crate::error::ProcessingError;
use crate::extract::extract;
use crate::models::{Findings, ReportShape};
use crate::report::render;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub shape: ReportShape,
    pub findings: Findings,
    pub text: String,
}

/// Picks the shape (forced or detected), resolves its columns, extracts
/// findings and renders them.
pub fn build_report(
    rows: &[Vec<String>],
    forced: Option<ReportShape>,
) -> Result<Report, ProcessingError> {
    let shape = match forced {
        Some(shape) => shape,
        None => {
            let header = rows.first().ok_or(ProcessingError::NoData)?;
            classify(header).ok_or(ProcessingError::UnrecognizedShape)?
        }
    };

    if rows.len() < shape.min_rows() {
        debug!(%shape, rows = rows.len(), "not enough rows");
        return Err(ProcessingError::NoData);
    }

    let header_row = shape.header_row();
    let index = resolve(&rows[header_row], shape)
        .map_err(|roles| ProcessingError::MissingColumns { shape, roles })?;

    let findings = extract(shape, &rows[header_row + 1..], &index);
    let text = render(shape, &findings);
    info!(%shape, forced = forced.is_some(), rows = rows.len(), "report built");

    Ok(Report {
        shape,
        findings,
        text,
    })
}

pub fn classify_and_extract(
    rows: &[Vec<String>],
    forced: Option<ReportShape>,
) -> Result<String, ProcessingError> {
    build_report(rows, forced).map(|report| report.text)
}
