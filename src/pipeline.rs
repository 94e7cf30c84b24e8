use crate::cli::{AnnotationQueryArgs, PositionArgs};
use crate::coverage::{CoverageBuilder, CoverageTable};
use crate::errors::Result;
use crate::external_tools::{ExternalTools, TabixLookup};
use crate::federator::{FederatedRows, QueryFederator};
use crate::peptide::{PeptideRecord, Resolution, resolve, split_candidates};
use crate::query::QueryBatch;
use crate::range_index::RangeIndexBuilder;
use crate::sequence_store::SequenceStore;
use crate::table::Table;
use crate::utils::format_decimal;
use crate::writer;
use std::collections::HashSet;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

pub const STATS_COLUMNS: [&str; 6] = [
    "peptide_raw",
    "peptide_pos",
    "modification_pos",
    "protein_seqlen",
    "protein_seqmw",
    "protein_coverage",
];

#[derive(Debug)]
struct ResolvedRow {
    record: PeptideRecord,
    candidates: Vec<String>,
    resolution: Resolution,
}

/// Appends peptide positions, modification positions and protein coverage
/// to the report and writes it out.
pub fn run_position(args: &PositionArgs) -> Result<()> {
    let started = Instant::now();
    info!(input = %args.input, "reading report file");
    let mut report = Table::read(&args.input, args.header_rows())?;
    let level = (!args.single_header).then_some(args.level.as_str());
    let peptide_column = report.column_index(&args.peptide_column, level)?;
    let protein_column = report.column_index(&args.protein_column, level)?;

    let parsed = (0..report.rows.len())
        .map(|row| {
            (
                PeptideRecord::parse(report.cell(row, peptide_column)),
                split_candidates(report.cell(row, protein_column)),
            )
        })
        .collect::<Vec<_>>();

    let wanted = parsed
        .iter()
        .flat_map(|(_, candidates)| candidates.iter().cloned())
        .collect::<HashSet<_>>();
    info!(proteins = wanted.len(), fasta = %args.fasta, "reading fasta file filtered by report proteins");
    let store = SequenceStore::load_filtered(&args.fasta, &wanted)?;
    if store.len() < wanted.len() {
        warn!(
            missing = wanted.len() - store.len(),
            "some report proteins have no sequence in the fasta file"
        );
    }

    info!(rows = parsed.len(), "resolving peptide positions");
    let resolved = parsed
        .into_iter()
        .map(|(record, candidates)| {
            let resolution = resolve(&record, &candidates, &store);
            ResolvedRow {
                record,
                candidates,
                resolution,
            }
        })
        .collect::<Vec<_>>();

    info!("computing protein coverage");
    let mut builder = CoverageBuilder::new();
    for row in &resolved {
        builder.add_hits(&row.resolution.hits);
    }
    let coverage = builder.finish(&store);

    append_stats_columns(&mut report, &resolved, &store, &coverage, args);

    info!(output = %args.output, "writing report");
    writer::write_table(&args.output, &report, &ExternalTools::new(args.tabix.clone()))?;
    info!(
        rows = report.rows.len(),
        covered_proteins = coverage.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "peptide positions added"
    );
    Ok(())
}

fn append_stats_columns(
    report: &mut Table,
    resolved: &[ResolvedRow],
    store: &SequenceStore,
    coverage: &CoverageTable,
    args: &PositionArgs,
) {
    let mut columns: [Vec<String>; 6] = Default::default();
    for row in resolved {
        let cells = stats_cells(row, store, coverage);
        for (column, cell) in columns.iter_mut().zip(cells) {
            column.push(cell);
        }
    }

    for (name, values) in STATS_COLUMNS.iter().zip(columns) {
        let header = if args.single_header {
            vec![*name]
        } else {
            vec![*name, args.stats_level.as_str()]
        };
        report.push_column(&header, values);
    }
}

fn stats_cells(row: &ResolvedRow, store: &SequenceStore, coverage: &CoverageTable) -> [String; 6] {
    let present = row
        .candidates
        .iter()
        .filter_map(|protein_id| store.get(protein_id))
        .collect::<Vec<_>>();

    [
        row.record.raw_peptide.clone(),
        join_cells(row.resolution.hits.iter().map(|hit| hit.occurrence.to_string())),
        join_cells(row.resolution.modifications.iter().map(ToString::to_string)),
        join_cells(present.iter().map(|sequence| sequence.len().to_string())),
        join_cells(
            present
                .iter()
                .filter_map(|sequence| sequence.molecular_weight)
                .map(format_decimal),
        ),
        join_cells(
            coverage
                .ratios_for(&row.candidates)
                .into_iter()
                .map(format_decimal),
        ),
    ]
}

fn join_cells(values: impl Iterator<Item = String>) -> String {
    values.collect::<Vec<_>>().join(";")
}

/// Builds or reuses the annotation index, expands the query table and
/// writes one row per (grouping key, annotation).
pub fn run_annotation_query(args: &AnnotationQueryArgs) -> Result<()> {
    let started = Instant::now();
    let tools = ExternalTools::new(args.tabix.clone());
    if !tools.exists_command(&tools.tabix) {
        warn!(tabix = %tools.tabix, "tabix command was not found in PATH");
    }

    let (index, report) = RangeIndexBuilder::new(tools.clone()).ensure(Path::new(&args.database))?;
    info!(
        archive = %index.archive.display(),
        rebuilt = report.wrote_anything(),
        "annotation index ready"
    );

    info!(input = %args.input, columns = ?args.columns.names(), "reading query table");
    let queries = Table::read(&args.input, 1)?;
    let batch = QueryBatch::from_table(&queries, &args.columns)?;
    info!(
        rows = queries.rows.len(),
        expanded = batch.expanded_len(),
        distinct = batch.len(),
        "expanded query table"
    );

    let lookup = TabixLookup::new(tools.clone(), &index.archive);
    let FederatedRows {
        rows,
        dispatched,
        failed,
    } = QueryFederator::new(&lookup, args.workers)
        .with_policy(args.policy)
        .with_columns(index.header.len())
        .with_progress(args.progress)
        .run(&batch)?;
    if !failed.is_empty() {
        warn!(
            failed = failed.len(),
            dispatched, "some region lookups failed and contributed no rows"
        );
    }

    let mut header = Vec::with_capacity(index.header.len() + 1);
    header.push("query".to_string());
    header.extend(index.header.iter().cloned());

    writer::write_rows(&args.output, &header, &rows, &tools)?;
    info!(
        rows = rows.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "annotations written"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{ResolvedRow, stats_cells};
    use crate::coverage::CoverageBuilder;
    use crate::peptide::{PeptideRecord, resolve, split_candidates};
    use crate::sequence_store::{Sequence, SequenceStore};

    fn resolved(input: &str, proteins: &str, store: &SequenceStore) -> ResolvedRow {
        let record = PeptideRecord::parse(input);
        let candidates = split_candidates(proteins);
        let resolution = resolve(&record, &candidates, store);
        ResolvedRow {
            record,
            candidates,
            resolution,
        }
    }

    #[test]
    fn renders_stats_cells_for_available_and_missing_proteins() {
        let store = SequenceStore::from_sequences([
            Sequence::new("P1", "XXMCDEYYGG"),
            Sequence::new("P2", "MCDE"),
        ]);
        let row = resolved("MCDE__M1(Oxidation)", "P1; P2 ;P9", &store);

        let mut builder = CoverageBuilder::new();
        builder.add_hits(&row.resolution.hits);
        let coverage = builder.finish(&store);

        let cells = stats_cells(&row, &store, &coverage);
        assert_eq!(cells[0], "MCDE");
        assert_eq!(cells[1], "3-6;1-4;0-0");
        assert_eq!(cells[2], "M3;M1");
        assert_eq!(cells[3], "10;4");
        assert_eq!(cells[5], "0.4;1.0");
    }

    #[test]
    fn not_found_peptide_renders_na() {
        let store = SequenceStore::from_sequences([Sequence::new("P1", "GGGG")]);
        let row = resolved("WW", "P1", &store);

        let mut builder = CoverageBuilder::new();
        builder.add_hits(&row.resolution.hits);
        let coverage = builder.finish(&store);

        let cells = stats_cells(&row, &store, &coverage);
        assert_eq!(cells[1], "NA");
        assert_eq!(cells[2], "");
        assert_eq!(cells[5], "0.0");
    }
}
