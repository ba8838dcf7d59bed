use tracing::info;

use crate::db::Database;
use crate::errors::{TrackerError, TrackerResult};
use crate::models::{NewApplication, Status, TrackedApplication};

/// Turns a scraped posting into a new tracked application for `owner_id`.
///
/// The posting is left untouched, and converting the same posting again
/// creates another, independent application.
pub fn convert(db: &Database, posting_id: i64, owner_id: i64) -> TrackerResult<TrackedApplication> {
    let posting = db
        .get_posting(posting_id)?
        .ok_or_else(|| TrackerError::not_found("scraped job", posting_id))?;

    let new = NewApplication {
        company: posting.company.clone(),
        position: posting.title.clone(),
        status: Some(Status::Wishlist),
        job_url: Some(posting.url.clone()),
        notes: Some(format!("Imported from {}", posting.source)),
        applied_date: None,
        salary_range: None,
    };

    let app = db.create_application(owner_id, &new)?;
    info!(posting_id, application_id = app.id, owner_id, "converted posting");
    Ok(app)
}
