// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Tables handed to external writers: assignments, representatives and the id list.

use crate::report::RunReport;
use repsel_core::{AttributeValue, RecordSet};
use std::collections::BTreeMap;

/// One input series with its cluster, or the exclusion flag, plus every original attribute.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct AssignmentRow {
    pub series_id: String,
    pub cluster: Option<usize>,
    pub excluded: bool,
    /// Attribute values in profile order; `None` when absent.
    pub values: Vec<Option<String>>,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct AssignmentTable {
    pub attributes: Vec<String>,
    pub rows: Vec<AssignmentRow>,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct RepresentativeRow {
    pub series_id: String,
    pub cluster: usize,
    pub distance: f64,
}

fn render_value(value: Option<&AttributeValue>) -> Option<String> {
    match value? {
        AttributeValue::Continuous(v) => v.map(|v| v.to_string()),
        AttributeValue::Categorical(v) => v.clone(),
    }
}

/// Full assignment table in input order. Series left out of the feature space carry
/// `cluster: None` and `excluded: true`.
pub fn assignment_table(records: &RecordSet, report: &RunReport) -> AssignmentTable {
    let attributes: Vec<String> = report.profiles.iter().map(|p| p.name.clone()).collect();
    let clusters: BTreeMap<&str, usize> = report
        .assignments
        .iter()
        .map(|a| (a.series_id.as_str(), a.cluster))
        .collect();

    let rows = records
        .records()
        .iter()
        .map(|record| {
            let cluster = clusters.get(record.id()).copied();
            AssignmentRow {
                series_id: record.id().to_string(),
                cluster,
                excluded: cluster.is_none(),
                values: attributes
                    .iter()
                    .map(|name| render_value(record.attribute(name)))
                    .collect(),
            }
        })
        .collect();

    AssignmentTable { attributes, rows }
}

pub fn representative_rows(report: &RunReport) -> Vec<RepresentativeRow> {
    report
        .representatives
        .representatives
        .iter()
        .map(|r| RepresentativeRow {
            series_id: r.series_id.clone(),
            cluster: r.cluster,
            distance: r.distance,
        })
        .collect()
}

pub fn representative_ids(report: &RunReport) -> Vec<String> {
    report
        .representative_ids()
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

fn push_csv_line<'a>(out: &mut String, fields: impl IntoIterator<Item = &'a str>) {
    let line: Vec<String> = fields.into_iter().map(csv_field).collect();
    out.push_str(&line.join(","));
    out.push('\n');
}

impl AssignmentTable {
    /// `series_id,cluster,excluded,<attributes...>`; absent values and excluded clusters are empty.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        push_csv_line(
            &mut out,
            ["series_id", "cluster", "excluded"]
                .into_iter()
                .chain(self.attributes.iter().map(String::as_str)),
        );
        for row in &self.rows {
            let cluster = row.cluster.map(|c| c.to_string()).unwrap_or_default();
            let excluded = if row.excluded { "true" } else { "false" };
            push_csv_line(
                &mut out,
                [row.series_id.as_str(), cluster.as_str(), excluded]
                    .into_iter()
                    .chain(row.values.iter().map(|v| v.as_deref().unwrap_or(""))),
            );
        }
        out
    }
}

pub fn representatives_csv(rows: &[RepresentativeRow]) -> String {
    let mut out = String::new();
    push_csv_line(&mut out, ["series_id", "cluster", "distance"]);
    for row in rows {
        let cluster = row.cluster.to_string();
        let distance = row.distance.to_string();
        push_csv_line(
            &mut out,
            [row.series_id.as_str(), cluster.as_str(), distance.as_str()],
        );
    }
    out
}

/// One identifier per line.
pub fn id_list(ids: &[String]) -> String {
    ids.iter().fold(String::new(), |mut out, id| {
        out.push_str(id);
        out.push('\n');
        out
    })
}
