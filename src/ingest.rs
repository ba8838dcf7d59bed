use tracing::{debug, info};

use crate::db::Database;
use crate::errors::{TrackerError, TrackerResult};
use crate::fetch::JobSource;
use crate::models::IngestReport;
use crate::parse::PostingParser;

/// Runs one search against `source` and stores every posting whose URL is
/// not yet known. Fetch failures and unparseable units never fail the
/// run; they only show up in the counts. A storage error fails the run and
/// nothing from the batch is kept.
pub fn ingest(
    db: &Database,
    source: &dyn JobSource,
    query: &str,
    location: &str,
    max_results: usize,
) -> TrackerResult<IngestReport> {
    let query = query.trim();
    if query.is_empty() {
        return Err(TrackerError::Validation("query must not be empty".to_string()));
    }
    if max_results == 0 {
        return Err(TrackerError::Validation(
            "max_results must be at least 1".to_string(),
        ));
    }

    let raw_postings = source.search(query, location.trim(), max_results);
    info!(
        source = source.name(),
        query,
        fetched = raw_postings.len(),
        "fetched raw postings"
    );

    let parser = PostingParser::new();
    let report = db.transaction(|db| {
        let mut report = IngestReport::default();

        for raw in raw_postings.iter().take(max_results) {
            let Some(posting) = parser.parse(raw) else {
                report.skipped_count += 1;
                continue;
            };

            match db.insert_posting_if_absent(&posting)? {
                Some(stored) => {
                    debug!(id = stored.id, url = %stored.url, "stored posting");
                    report.stored_count += 1;
                    report.stored_items.push(stored);
                }
                None => {
                    debug!(url = %posting.url, "posting already known");
                    report.duplicate_count += 1;
                }
            }
        }
        Ok(report)
    })?;

    info!(
        stored = report.stored_count,
        duplicates = report.duplicate_count,
        skipped = report.skipped_count,
        "ingestion finished"
    );
    Ok(report)
}
