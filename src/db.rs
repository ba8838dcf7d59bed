use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{
    params, Connection, ErrorCode, OptionalExtension, ToSql, Transaction, TransactionBehavior,
};
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;
use tracing::debug;

use crate::errors::{require_text, TrackerError, TrackerResult};
use crate::models::{
    ApplicationUpdate, NewApplication, ParsedPosting, PostingPage, ScrapedPosting, Status,
    TrackedApplication, User,
};

const APPLICATION_COLUMNS: &str = "id, user_id, company, position, status, job_url, notes,
     applied_date, salary_range, created_at, updated_at";

/// How long a writer waits for another connection's lock before giving up.
const BUSY_TIMEOUT: StdDuration = StdDuration::from_secs(5);

const POSTING_COLUMNS: &str =
    "id, title, company, location, url, description, posted_date, source, scraped_at";

pub struct Database {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Database {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn, path: None })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn init(&self) -> anyhow::Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS applications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                company TEXT NOT NULL,
                position TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'wishlist' CHECK (status IN (
                    'wishlist', 'applied', 'phone_screen', 'interview',
                    'offer', 'rejected', 'accepted'
                )),
                job_url TEXT,
                notes TEXT,
                applied_date TEXT,
                salary_range TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS scraped_jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                company TEXT NOT NULL,
                location TEXT,
                url TEXT NOT NULL UNIQUE,
                description TEXT,
                posted_date TEXT,
                source TEXT NOT NULL,
                scraped_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_applications_user ON applications(user_id);
            CREATE INDEX IF NOT EXISTS idx_scraped_jobs_source ON scraped_jobs(source);
            "#,
        )?;
        Ok(())
    }

    pub fn ensure_initialized(&self) -> anyhow::Result<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='applications'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(anyhow!("Database not initialized. Run 'jobtrack init' first."));
        }
        Ok(())
    }

    /// Runs `f` inside an immediate transaction. Everything `f` wrote is
    /// committed if it returns `Ok` and rolled back otherwise.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&Self) -> TrackerResult<T>,
    ) -> TrackerResult<T> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let value = f(self)?;
        tx.commit()?;
        Ok(value)
    }

    // --- User operations ---

    pub fn create_user(&self, email: &str, password_hash: &str) -> TrackerResult<User> {
        let result = self.conn.execute(
            "INSERT INTO users (email, password_hash, created_at) VALUES (?1, ?2, ?3)",
            params![email, password_hash, Utc::now()],
        );
        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                return Err(TrackerError::Conflict(format!(
                    "email '{}' is already registered",
                    email
                )));
            }
            Err(e) => return Err(e.into()),
        }
        let id = self.conn.last_insert_rowid();
        self.get_user(id)?
            .ok_or_else(|| TrackerError::not_found("user", id))
    }

    pub fn get_user(&self, id: i64) -> TrackerResult<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, email, password_hash, created_at FROM users WHERE id = ?1",
                [id],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn get_user_by_email(&self, email: &str) -> TrackerResult<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, email, password_hash, created_at FROM users WHERE email = ?1",
                [email],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            password_hash: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    // --- Application operations (always scoped by owner) ---

    pub fn create_application(
        &self,
        owner_id: i64,
        new: &NewApplication,
    ) -> TrackerResult<TrackedApplication> {
        let company = require_text("company", &new.company)?;
        let position = require_text("position", &new.position)?;

        if self.get_user(owner_id)?.is_none() {
            return Err(TrackerError::not_found("user", owner_id));
        }

        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO applications (user_id, company, position, status, job_url, notes,
                                       applied_date, salary_range, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            params![
                owner_id,
                company,
                position,
                new.status.unwrap_or_default(),
                new.job_url,
                new.notes,
                new.applied_date,
                new.salary_range,
                now,
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        debug!(id, owner_id, "created application");
        self.get_application(owner_id, id)
    }

    pub fn list_applications(
        &self,
        owner_id: i64,
        status: Option<Status>,
    ) -> TrackerResult<Vec<TrackedApplication>> {
        let mut sql = format!(
            "SELECT {} FROM applications WHERE user_id = ?1",
            APPLICATION_COLUMNS
        );
        let mut params: Vec<&dyn ToSql> = vec![&owner_id as &dyn ToSql];
        if let Some(s) = status.as_ref() {
            sql.push_str(" AND status = ?2");
            params.push(s);
        }
        sql.push_str(" ORDER BY id");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params.as_slice(), Self::row_to_application)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn get_application(&self, owner_id: i64, id: i64) -> TrackerResult<TrackedApplication> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM applications WHERE id = ?1 AND user_id = ?2",
                    APPLICATION_COLUMNS
                ),
                params![id, owner_id],
                Self::row_to_application,
            )
            .optional()?
            .ok_or_else(|| TrackerError::not_found("application", id))
    }

    pub fn update_application(
        &self,
        owner_id: i64,
        id: i64,
        update: &ApplicationUpdate,
    ) -> TrackerResult<TrackedApplication> {
        let mut app = self.get_application(owner_id, id)?;

        if let Some(company) = &update.company {
            app.company = require_text("company", company)?;
        }
        if let Some(position) = &update.position {
            app.position = require_text("position", position)?;
        }
        if let Some(status) = update.status {
            app.status = status;
        }
        if let Some(job_url) = &update.job_url {
            app.job_url = Some(job_url.clone());
        }
        if let Some(notes) = &update.notes {
            app.notes = Some(notes.clone());
        }
        if let Some(applied_date) = update.applied_date {
            app.applied_date = Some(applied_date);
        }
        if let Some(salary_range) = &update.salary_range {
            app.salary_range = Some(salary_range.clone());
        }
        app.updated_at = next_timestamp(app.updated_at);

        let changed = self.conn.execute(
            "UPDATE applications
             SET company = ?1, position = ?2, status = ?3, job_url = ?4, notes = ?5,
                 applied_date = ?6, salary_range = ?7, updated_at = ?8
             WHERE id = ?9 AND user_id = ?10",
            params![
                app.company,
                app.position,
                app.status,
                app.job_url,
                app.notes,
                app.applied_date,
                app.salary_range,
                app.updated_at,
                id,
                owner_id,
            ],
        )?;
        if changed == 0 {
            // Deleted between the read and the write
            return Err(TrackerError::not_found("application", id));
        }
        Ok(app)
    }

    pub fn delete_application(&self, owner_id: i64, id: i64) -> TrackerResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM applications WHERE id = ?1 AND user_id = ?2",
            params![id, owner_id],
        )?;
        if changed == 0 {
            return Err(TrackerError::not_found("application", id));
        }
        Ok(())
    }

    fn row_to_application(row: &rusqlite::Row) -> rusqlite::Result<TrackedApplication> {
        Ok(TrackedApplication {
            id: row.get(0)?,
            user_id: row.get(1)?,
            company: row.get(2)?,
            position: row.get(3)?,
            status: row.get(4)?,
            job_url: row.get(5)?,
            notes: row.get(6)?,
            applied_date: row.get(7)?,
            salary_range: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    // --- Scraped posting operations ---

    /// Stores the posting unless its URL is already known. Returns the new
    /// row, or `None` when the URL collided with an existing posting.
    pub fn insert_posting_if_absent(
        &self,
        posting: &ParsedPosting,
    ) -> TrackerResult<Option<ScrapedPosting>> {
        let inserted = self.conn.execute(
            "INSERT INTO scraped_jobs (title, company, location, url, description,
                                       posted_date, source, scraped_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(url) DO NOTHING",
            params![
                posting.title,
                posting.company,
                posting.location,
                posting.url,
                posting.description,
                posting.posted_date,
                posting.source,
                Utc::now(),
            ],
        )?;
        if inserted == 0 {
            return Ok(None);
        }
        let id = self.conn.last_insert_rowid();
        self.get_posting(id)?
            .map(Some)
            .ok_or_else(|| TrackerError::not_found("scraped job", id))
    }

    pub fn get_posting(&self, id: i64) -> TrackerResult<Option<ScrapedPosting>> {
        let posting = self
            .conn
            .query_row(
                &format!("SELECT {} FROM scraped_jobs WHERE id = ?1", POSTING_COLUMNS),
                [id],
                Self::row_to_posting,
            )
            .optional()?;
        Ok(posting)
    }

    pub fn list_postings(
        &self,
        source: Option<&str>,
        skip: usize,
        limit: usize,
    ) -> TrackerResult<PostingPage> {
        let (filter, filter_params): (&str, Vec<&dyn ToSql>) = match source.as_ref() {
            Some(s) => (" WHERE LOWER(source) = LOWER(?1)", vec![s as &dyn ToSql]),
            None => ("", vec![]),
        };

        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM scraped_jobs{}", filter),
            filter_params.as_slice(),
            |row| row.get(0),
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let skip = i64::try_from(skip).unwrap_or(i64::MAX);
        let n = filter_params.len();
        let sql = format!(
            "SELECT {} FROM scraped_jobs{} ORDER BY scraped_at DESC, id DESC LIMIT ?{} OFFSET ?{}",
            POSTING_COLUMNS,
            filter,
            n + 1,
            n + 2
        );
        let mut params = filter_params;
        params.push(&limit);
        params.push(&skip);

        let mut stmt = self.conn.prepare(&sql)?;
        let items = stmt
            .query_map(params.as_slice(), Self::row_to_posting)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PostingPage {
            count: count as usize,
            items,
        })
    }

    fn row_to_posting(row: &rusqlite::Row) -> rusqlite::Result<ScrapedPosting> {
        Ok(ScrapedPosting {
            id: row.get(0)?,
            title: row.get(1)?,
            company: row.get(2)?,
            location: row.get(3)?,
            url: row.get(4)?,
            description: row.get(5)?,
            posted_date: row.get(6)?,
            source: row.get(7)?,
            scraped_at: row.get(8)?,
        })
    }
}

/// Current time, nudged forward if the clock has not moved past `previous`.
fn next_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();
        db
    }

    pub(crate) fn test_user(db: &Database, email: &str) -> User {
        db.create_user(email, "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA").unwrap()
    }

    /// Makes every insert of `url` into `scraped_jobs` fail.
    pub(crate) fn fail_posting_inserts_for(db: &Database, url: &str) {
        db.conn
            .execute_batch(&format!(
                "CREATE TRIGGER fail_posting_insert BEFORE INSERT ON scraped_jobs
                 WHEN NEW.url = '{}'
                 BEGIN SELECT RAISE(ABORT, 'insert refused'); END;",
                url.replace('\'', "''")
            ))
            .unwrap();
    }

    fn new_app(company: &str, position: &str) -> NewApplication {
        NewApplication {
            company: company.to_string(),
            position: position.to_string(),
            ..Default::default()
        }
    }

    fn parsed(url: &str) -> ParsedPosting {
        ParsedPosting {
            title: "Backend Engineer".to_string(),
            company: "Acme".to_string(),
            location: Some("Remote".to_string()),
            description: None,
            url: url.to_string(),
            posted_date: None,
            source: "mock".to_string(),
        }
    }

    #[test]
    fn test_ensure_initialized_requires_init() {
        let db = Database::open_in_memory().unwrap();
        let err = db.ensure_initialized().unwrap_err();
        assert!(err.to_string().contains("jobtrack init"));
        db.init().unwrap();
        db.init().unwrap(); // idempotent
        assert!(db.ensure_initialized().is_ok());
    }

    #[test]
    fn test_create_user_rejects_duplicate_email() {
        let db = test_db();
        test_user(&db, "a@example.com");
        let err = db.create_user("A@Example.com", "x").unwrap_err();
        assert!(matches!(err, TrackerError::Conflict(_)));
    }

    #[test]
    fn test_create_application_defaults_to_wishlist() {
        let db = test_db();
        let user = test_user(&db, "a@example.com");
        let app = db.create_application(user.id, &new_app("Amazon", "SDE Intern")).unwrap();
        assert_eq!(app.status, Status::Wishlist);
        assert_eq!(app.user_id, user.id);
        assert_eq!(app.created_at, app.updated_at);
        assert!(app.job_url.is_none());
    }

    #[test]
    fn test_create_application_validates_required_fields() {
        let db = test_db();
        let user = test_user(&db, "a@example.com");
        let err = db.create_application(user.id, &new_app("  ", "SDE")).unwrap_err();
        assert!(matches!(err, TrackerError::Validation(_)));
        let err = db.create_application(user.id, &new_app("Amazon", "")).unwrap_err();
        assert!(matches!(err, TrackerError::Validation(_)));
    }

    #[test]
    fn test_create_application_requires_existing_owner() {
        let db = test_db();
        let err = db.create_application(999, &new_app("Amazon", "SDE")).unwrap_err();
        assert!(matches!(err, TrackerError::NotFound(_)));
    }

    #[test]
    fn test_list_applications_is_scoped_to_owner() {
        let db = test_db();
        let alice = test_user(&db, "alice@example.com");
        let bob = test_user(&db, "bob@example.com");
        db.create_application(alice.id, &new_app("Amazon", "SDE")).unwrap();
        db.create_application(alice.id, &new_app("Google", "SWE")).unwrap();
        db.create_application(bob.id, &new_app("Meta", "PE")).unwrap();

        let apps = db.list_applications(alice.id, None).unwrap();
        assert_eq!(apps.len(), 2);
        assert!(apps.iter().all(|a| a.user_id == alice.id));
        assert_eq!(db.list_applications(bob.id, None).unwrap().len(), 1);
    }

    #[test]
    fn test_list_applications_filters_by_status() {
        let db = test_db();
        let user = test_user(&db, "a@example.com");
        db.create_application(user.id, &new_app("Amazon", "SDE")).unwrap();
        let mut applied = new_app("Google", "SWE");
        applied.status = Some(Status::Applied);
        db.create_application(user.id, &applied).unwrap();

        let apps = db.list_applications(user.id, Some(Status::Applied)).unwrap();
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].company, "Google");
    }

    #[test]
    fn test_get_application_hides_foreign_records() {
        let db = test_db();
        let alice = test_user(&db, "alice@example.com");
        let bob = test_user(&db, "bob@example.com");
        let app = db.create_application(alice.id, &new_app("Amazon", "SDE")).unwrap();

        let foreign = db.get_application(bob.id, app.id).unwrap_err();
        let missing = db.get_application(bob.id, app.id + 100).unwrap_err();
        assert!(matches!(foreign, TrackerError::NotFound(_)));
        assert!(matches!(missing, TrackerError::NotFound(_)));
        // Same presentation apart from the id itself
        assert_eq!(
            foreign.to_string().replace(&app.id.to_string(), "N"),
            missing.to_string().replace(&(app.id + 100).to_string(), "N")
        );
    }

    #[test]
    fn test_update_status_only_keeps_other_fields() {
        let db = test_db();
        let user = test_user(&db, "a@example.com");
        let created = db
            .create_application(
                user.id,
                &NewApplication {
                    company: "Amazon".to_string(),
                    position: "SDE Intern".to_string(),
                    status: None,
                    job_url: Some("https://example.com/job1".to_string()),
                    notes: Some("referral from Sam".to_string()),
                    applied_date: Some(Utc::now()),
                    salary_range: Some("$40-50/hr".to_string()),
                },
            )
            .unwrap();

        let update = ApplicationUpdate {
            status: Some(Status::Interview),
            ..Default::default()
        };
        let updated = db.update_application(user.id, created.id, &update).unwrap();

        assert_eq!(updated.status, Status::Interview);
        assert_eq!(updated.company, created.company);
        assert_eq!(updated.position, created.position);
        assert_eq!(updated.job_url, created.job_url);
        assert_eq!(updated.notes, created.notes);
        assert_eq!(updated.applied_date, created.applied_date);
        assert_eq!(updated.salary_range, created.salary_range);
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at > created.updated_at);

        let stored = db.get_application(user.id, created.id).unwrap();
        assert_eq!(stored, updated);
    }

    #[test]
    fn test_update_timestamps_strictly_increase() {
        let db = test_db();
        let user = test_user(&db, "a@example.com");
        let app = db.create_application(user.id, &new_app("Amazon", "SDE")).unwrap();
        let update = ApplicationUpdate {
            notes: Some("ping".to_string()),
            ..Default::default()
        };
        let mut last = app.updated_at;
        for _ in 0..5 {
            let next = db.update_application(user.id, app.id, &update).unwrap();
            assert!(next.updated_at > last);
            last = next.updated_at;
        }
    }

    #[test]
    fn test_update_rejects_empty_company_and_foreign_owner() {
        let db = test_db();
        let alice = test_user(&db, "alice@example.com");
        let bob = test_user(&db, "bob@example.com");
        let app = db.create_application(alice.id, &new_app("Amazon", "SDE")).unwrap();

        let blank = ApplicationUpdate {
            company: Some(" ".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            db.update_application(alice.id, app.id, &blank).unwrap_err(),
            TrackerError::Validation(_)
        ));

        let update = ApplicationUpdate {
            status: Some(Status::Rejected),
            ..Default::default()
        };
        assert!(matches!(
            db.update_application(bob.id, app.id, &update).unwrap_err(),
            TrackerError::NotFound(_)
        ));
        assert_eq!(db.get_application(alice.id, app.id).unwrap().status, Status::Wishlist);
    }

    #[test]
    fn test_delete_application() {
        let db = test_db();
        let alice = test_user(&db, "alice@example.com");
        let bob = test_user(&db, "bob@example.com");
        let app = db.create_application(alice.id, &new_app("Amazon", "SDE")).unwrap();

        // Foreign owner cannot delete
        assert!(matches!(
            db.delete_application(bob.id, app.id).unwrap_err(),
            TrackerError::NotFound(_)
        ));
        assert!(db.get_application(alice.id, app.id).is_ok());

        db.delete_application(alice.id, app.id).unwrap();
        assert!(matches!(
            db.delete_application(alice.id, app.id).unwrap_err(),
            TrackerError::NotFound(_)
        ));
    }

    #[test]
    fn test_status_check_constraint() {
        let db = test_db();
        let user = test_user(&db, "a@example.com");
        let result = db.conn.execute(
            "INSERT INTO applications (user_id, company, position, status, created_at, updated_at)
             VALUES (?1, 'Acme', 'SDE', 'ghosted', ?2, ?2)",
            params![user.id, Utc::now()],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_insert_posting_if_absent_dedups_on_url() {
        let db = test_db();
        let first = db.insert_posting_if_absent(&parsed("https://example.com/job1")).unwrap();
        let stored = first.expect("first insert should store");
        assert_eq!(stored.url, "https://example.com/job1");
        assert_eq!(stored.source, "mock");

        let mut changed = parsed("https://example.com/job1");
        changed.title = "Different Title".to_string();
        assert!(db.insert_posting_if_absent(&changed).unwrap().is_none());

        // Existing record is untouched
        let kept = db.get_posting(stored.id).unwrap().unwrap();
        assert_eq!(kept.title, "Backend Engineer");
    }

    #[test]
    fn test_list_postings_filters_and_pages() {
        let db = test_db();
        for i in 0..5 {
            let mut p = parsed(&format!("https://example.com/job{}", i));
            if i % 2 == 0 {
                p.source = "indeed".to_string();
            }
            db.insert_posting_if_absent(&p).unwrap();
        }

        let all = db.list_postings(None, 0, 100).unwrap();
        assert_eq!(all.count, 5);
        assert_eq!(all.items.len(), 5);

        let indeed = db.list_postings(Some("Indeed"), 0, 100).unwrap();
        assert_eq!(indeed.count, 3);
        assert!(indeed.items.iter().all(|p| p.source == "indeed"));

        let page = db.list_postings(None, 1, 2).unwrap();
        assert_eq!(page.count, 5);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].id, all.items[1].id);

        let past_end = db.list_postings(None, 10, 2).unwrap();
        assert_eq!(past_end.count, 5);
        assert!(past_end.items.is_empty());
    }

    #[test]
    fn test_data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("jobtrack.db");
        {
            let db = Database::open(&path).unwrap();
            db.init().unwrap();
            let user = test_user(&db, "a@example.com");
            db.create_application(user.id, &new_app("Amazon", "SDE")).unwrap();
            assert_eq!(db.path(), Some(path.as_path()));
        }
        let db = Database::open(&path).unwrap();
        db.ensure_initialized().unwrap();
        let user = db.get_user_by_email("a@example.com").unwrap().unwrap();
        assert_eq!(db.list_applications(user.id, None).unwrap().len(), 1);
    }

    #[test]
    fn test_transaction_commits_on_ok() {
        let db = test_db();
        let stored = db
            .transaction(|db| db.insert_posting_if_absent(&parsed("https://example.com/a")))
            .unwrap();
        assert!(stored.is_some());
        assert_eq!(db.list_postings(None, 0, 10).unwrap().count, 1);
    }

    #[test]
    fn test_transaction_rolls_back_on_err() {
        let db = test_db();
        let err = db
            .transaction(|db| {
                db.insert_posting_if_absent(&parsed("https://example.com/a"))?;
                db.insert_posting_if_absent(&parsed("https://example.com/b"))?;
                Err::<(), _>(TrackerError::Validation("stop".to_string()))
            })
            .unwrap_err();
        assert!(matches!(err, TrackerError::Validation(_)));
        assert_eq!(db.list_postings(None, 0, 10).unwrap().count, 0);

        // The connection is usable again afterwards
        assert!(db.insert_posting_if_absent(&parsed("https://example.com/a")).unwrap().is_some());
    }

    #[test]
    fn test_concurrent_writers_store_a_url_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobtrack.db");
        Database::open(&path).unwrap().init().unwrap();

        let barrier = std::sync::Barrier::new(2);
        let (path, barrier) = (&path, &barrier);
        let results: Vec<Option<ScrapedPosting>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    scope.spawn(move || {
                        let db = Database::open(path).unwrap();
                        barrier.wait();
                        db.transaction(|db| {
                            db.insert_posting_if_absent(&parsed("https://example.com/same"))
                        })
                        .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_some()).count(), 1);
        assert_eq!(results.iter().filter(|r| r.is_none()).count(), 1);
        let db = Database::open(path).unwrap();
        assert_eq!(db.list_postings(None, 0, 10).unwrap().count, 1);
    }
}
