// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Staged orchestration of one representative selection run.

pub mod export;
pub mod report;
pub mod run;

pub use export::{
    AssignmentRow, AssignmentTable, RepresentativeRow, assignment_table, id_list,
    representative_ids, representative_rows, representatives_csv,
};
pub use report::{RunReport, VendorTest};
pub use run::execute_pipeline;
