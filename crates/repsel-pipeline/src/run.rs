// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::report::{RunReport, VendorTest};
use repsel_cluster::{
    assign_clusters, characterize_clusters, encode_features, extract_representatives,
    select_cluster_count,
};
use repsel_core::{
    AttributeKind, ExecutionContext, RecordSet, RepselError, RunConfig, RunMetadata, RunWarning,
};
use repsel_stats::{
    AssociationOutcome, Grouping, assess_attributes, categorical_association,
    correlation_matrix, group_comparison, profile_records,
};
use std::time::Instant;

/// Runs every stage over one snapshot of records.
///
/// Stages run strictly in order; the cancel token is checked between them and inside
/// clustering. Non-fatal conditions end up in [`RunMetadata`], never in the error.
pub fn execute_pipeline(
    records: &RecordSet,
    config: &RunConfig,
    ctx: &ExecutionContext<'_>,
) -> Result<RunReport, RepselError> {
    config.validate()?;
    let started = Instant::now();
    let mut metadata = RunMetadata::new(config.seed);
    metadata.record_count = records.len();
    metadata.requested_cluster_range = Some(config.cluster_range);

    ctx.check_cancelled()?;
    let profiles = profile_records(records);
    tracing::debug!(
        records = records.len(),
        attributes = profiles.len(),
        "profiled attributes"
    );

    ctx.check_cancelled()?;
    let continuous = records.attributes_of_kind(AttributeKind::Continuous);
    let assumptions = assess_attributes(records, &continuous, Some(&Grouping::Provenance), config)?;
    for results in assumptions.values() {
        for result in results {
            metadata.extend_warnings(result.warnings());
        }
    }

    ctx.check_cancelled()?;
    let correlations = correlation_matrix(records, &continuous, &assumptions)?;
    for fallback in correlations.fallbacks() {
        metadata.push_warning(RunWarning::ProcedureFallback(fallback.clone()));
    }
    for skipped in &correlations.skipped {
        metadata.push_note(format!(
            "correlation {}~{} skipped: {}",
            skipped.left, skipped.right, skipped.reason
        ));
    }

    ctx.check_cancelled()?;
    let vendor_comparisons = continuous
        .iter()
        .map(|attribute| {
            let evidence = assumptions.get(*attribute).map_or(&[][..], Vec::as_slice);
            vendor_test(
                attribute,
                group_comparison(records, attribute, &Grouping::Provenance, evidence),
                &mut metadata,
            )
        })
        .collect::<Result<Vec<_>, _>>()?;

    let vendor_associations = records
        .attributes_of_kind(AttributeKind::Categorical)
        .into_iter()
        .map(|attribute| {
            vendor_test(
                attribute,
                categorical_association(records, attribute, &Grouping::Provenance),
                &mut metadata,
            )
        })
        .collect::<Result<Vec<_>, _>>()?;

    ctx.check_cancelled()?;
    let features = encode_features(records, &profiles, &assumptions, config)?;
    metadata.extend_warnings(features.warnings.iter().cloned());
    metadata.imputations = features.imputations.clone();
    metadata.feature_count = features.dimension();
    tracing::debug!(
        vectors = features.len(),
        dimension = features.dimension(),
        excluded = features.excluded_records.len(),
        "encoded features"
    );

    ctx.check_cancelled()?;
    let cluster_count = select_cluster_count(&features.vectors, config, ctx)?;
    metadata.extend_warnings(cluster_count.warnings.iter().cloned());
    metadata.selected_k = Some(cluster_count.selected_k);

    ctx.check_cancelled()?;
    let clustering = &cluster_count.clustering;
    let assignments = assign_clusters(&features, clustering)?;
    let clusters = characterize_clusters(records, &assignments, clustering);
    metadata.clustered_count = assignments.len();

    let representatives = extract_representatives(
        &assignments,
        clustering.k,
        config.per_cluster_bounds,
        config.total_bounds,
    )?;
    for note in &representatives.notes {
        metadata.push_note(note.clone());
    }

    metadata.runtime_ms = Some(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX));
    ctx.report_progress(1.0);
    tracing::info!(
        selected_k = cluster_count.selected_k,
        clustered = assignments.len(),
        representatives = representatives.len(),
        warnings = metadata.warnings.len(),
        "pipeline run complete"
    );

    Ok(RunReport {
        config: config.clone(),
        profiles,
        assumptions,
        correlations,
        vendor_comparisons,
        vendor_associations,
        feature_columns: features.columns,
        excluded_series: features.excluded_records,
        cluster_count,
        assignments,
        clusters,
        representatives,
        metadata,
    })
}

fn vendor_test(
    attribute: &str,
    outcome: Result<AssociationOutcome, RepselError>,
    metadata: &mut RunMetadata,
) -> Result<VendorTest, RepselError> {
    match outcome {
        Ok(outcome) => {
            if let Some(fallback) = &outcome.fallback {
                metadata.push_warning(RunWarning::ProcedureFallback(fallback.clone()));
            }
            for note in &outcome.notes {
                metadata.push_note(format!("{attribute}: {note}"));
            }
            Ok(VendorTest {
                attribute: attribute.to_string(),
                outcome: Some(outcome),
                skipped: None,
            })
        }
        Err(err @ (RepselError::InsufficientSample { .. } | RepselError::NumericalIssue(_))) => {
            metadata.push_note(format!("vendor test for '{attribute}' skipped: {err}"));
            Ok(VendorTest {
                attribute: attribute.to_string(),
                outcome: None,
                skipped: Some(err.to_string()),
            })
        }
        Err(err) => Err(err),
    }
}
