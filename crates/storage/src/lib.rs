use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::{
    migrate::MigrateError, sqlite::SqlitePoolOptions, Row, Sqlite, SqlitePool, Transaction,
};
use thiserror::Error;
use uuid::Uuid;

use joblane_core::types::{
    ApplicantProfile, Application, ApplicationStatus, Conversation, Job, JobStatus, Message,
    NoticeKind, Notification, WorkMode,
};

/// Largest number of ids placed into a single `IN (...)` batch query.
pub const MAX_IN_IDS: usize = 30;

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Establishes a new SQLite connection pool for the provided connection string.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(StorageError::Connect)?;

        apply_pragmas(&pool).await?;

        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Returns a handle to operate on job postings.
    pub fn jobs(&self) -> JobRepository {
        JobRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle to operate on applications.
    pub fn applications(&self) -> ApplicationRepository {
        ApplicationRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle to operate on conversations and their messages.
    pub fn conversations(&self) -> ConversationRepository {
        ConversationRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle to operate on notifications.
    pub fn notifications(&self) -> NotificationRepository {
        NotificationRepository {
            pool: self.pool.clone(),
        }
    }

    /// Runs a WAL checkpoint in TRUNCATE mode and reports frame statistics.
    pub async fn wal_checkpoint_truncate(&self) -> Result<CheckpointStats, sqlx::Error> {
        let row = sqlx::query("PRAGMA wal_checkpoint(TRUNCATE);")
            .fetch_one(&self.pool)
            .await?;
        Ok(CheckpointStats {
            busy_frames: row.get::<i64, _>(0),
            log_frames: row.get::<i64, _>(1),
            checkpointed_frames: row.get::<i64, _>(2),
        })
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Frame counters reported by a WAL checkpoint.
#[derive(Debug, Clone, Copy)]
pub struct CheckpointStats {
    pub busy_frames: i64,
    pub log_frames: i64,
    pub checkpointed_frames: i64,
}

async fn apply_pragmas(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query("PRAGMA foreign_keys = ON;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA journal_mode = WAL;")
        .fetch_one(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA synchronous = NORMAL;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA busy_timeout = 5000;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    Ok(())
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to apply pragma: {0}")]
    Pragma(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn is_conflict(db_err: &dyn sqlx::error::DatabaseError) -> bool {
    // 1555 = primary key violation, 2067 = unique index violation.
    matches!(db_err.code().as_deref(), Some("1555") | Some("2067"))
}

fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// Repository for job postings.
#[derive(Clone)]
pub struct JobRepository {
    pool: SqlitePool,
}

const JOB_COLUMNS: &str = "id, employer_id, title, company, category, job_type, location, \
     salary_min, salary_max, description, skills_json, experience_level, education_level, \
     work_mode, industry, deadline, openings, status, applications_count, created_at, updated_at";

impl JobRepository {
    /// Inserts a fresh posting (published or draft).
    pub async fn insert(&self, record: &NewJob<'_>) -> Result<(), JobError> {
        let skills_json = serde_json::to_string(&record.skills)?;
        sqlx::query(
            "INSERT INTO jobs \
             (id, employer_id, title, company, category, job_type, location, salary_min, \
              salary_max, description, skills_json, experience_level, education_level, \
              work_mode, industry, deadline, openings, status, applications_count, \
              created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(&record.id)
        .bind(record.employer_id)
        .bind(&record.title)
        .bind(&record.company)
        .bind(&record.category)
        .bind(&record.job_type)
        .bind(&record.location)
        .bind(record.salary_min)
        .bind(record.salary_max)
        .bind(&record.description)
        .bind(skills_json)
        .bind(&record.experience_level)
        .bind(&record.education_level)
        .bind(record.work_mode.as_str())
        .bind(&record.industry)
        .bind(record.deadline.to_string())
        .bind(record.openings as i64)
        .bind(record.status.as_str())
        .bind(to_rfc3339(record.created_at))
        .bind(to_rfc3339(record.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Replaces the editable fields of an existing posting.
    pub async fn update(&self, job_id: &str, changes: &JobChanges<'_>) -> Result<(), JobError> {
        let skills_json = serde_json::to_string(&changes.skills)?;
        let result = sqlx::query(
            "UPDATE jobs SET title = ?, company = ?, category = ?, job_type = ?, location = ?, \
             salary_min = ?, salary_max = ?, description = ?, skills_json = ?, \
             experience_level = ?, education_level = ?, work_mode = ?, industry = ?, \
             deadline = ?, openings = ?, status = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(&changes.title)
        .bind(&changes.company)
        .bind(&changes.category)
        .bind(&changes.job_type)
        .bind(&changes.location)
        .bind(changes.salary_min)
        .bind(changes.salary_max)
        .bind(&changes.description)
        .bind(skills_json)
        .bind(&changes.experience_level)
        .bind(&changes.education_level)
        .bind(changes.work_mode.as_str())
        .bind(&changes.industry)
        .bind(changes.deadline.to_string())
        .bind(changes.openings as i64)
        .bind(changes.status.as_str())
        .bind(to_rfc3339(changes.updated_at))
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(JobError::NotFound);
        }
        Ok(())
    }

    /// Removes a posting.
    pub async fn delete(&self, job_id: &str) -> Result<(), JobError> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(JobError::NotFound);
        }
        Ok(())
    }

    /// Loads a single posting.
    pub async fn fetch(&self, job_id: &str) -> Result<Option<Job>, JobError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?"
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(JobRow::into_domain).transpose()
    }

    /// All postings owned by the employer, newest first.
    pub async fn list_by_employer(&self, employer_id: &str) -> Result<Vec<Job>, JobError> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE employer_id = ? \
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(employer_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(JobRow::into_domain).collect()
    }

    /// All published postings, newest first. Drafts never appear here.
    pub async fn list_published(&self) -> Result<Vec<Job>, JobError> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE status = 'published' \
             ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(JobRow::into_domain).collect()
    }
}

/// Parameters required to insert a posting.
pub struct NewJob<'a> {
    pub id: String,
    pub employer_id: &'a str,
    pub title: String,
    pub company: String,
    pub category: String,
    pub job_type: String,
    pub location: String,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub description: String,
    pub skills: Vec<String>,
    pub experience_level: String,
    pub education_level: Option<String>,
    pub work_mode: WorkMode,
    pub industry: Option<String>,
    pub deadline: NaiveDate,
    pub openings: u32,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
}

/// Replacement values applied by [`JobRepository::update`].
pub struct JobChanges<'a> {
    pub title: String,
    pub company: String,
    pub category: String,
    pub job_type: String,
    pub location: String,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub description: String,
    pub skills: &'a [String],
    pub experience_level: String,
    pub education_level: Option<String>,
    pub work_mode: WorkMode,
    pub industry: Option<String>,
    pub deadline: NaiveDate,
    pub openings: u32,
    pub status: JobStatus,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    employer_id: String,
    title: String,
    company: String,
    category: String,
    job_type: String,
    location: String,
    salary_min: Option<i64>,
    salary_max: Option<i64>,
    description: String,
    skills_json: String,
    experience_level: String,
    education_level: Option<String>,
    work_mode: String,
    industry: Option<String>,
    deadline: NaiveDate,
    openings: i64,
    status: String,
    applications_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl JobRow {
    fn into_domain(self) -> Result<Job, JobError> {
        let skills: Vec<String> = serde_json::from_str(&self.skills_json)?;
        Ok(Job {
            id: self.id,
            employer_id: self.employer_id,
            title: self.title,
            company: self.company,
            category: self.category,
            job_type: self.job_type,
            location: self.location,
            salary_min: self.salary_min,
            salary_max: self.salary_max,
            description: self.description,
            skills,
            experience_level: self.experience_level,
            education_level: self.education_level,
            work_mode: self.work_mode.parse().unwrap_or(WorkMode::Onsite),
            industry: self.industry,
            deadline: self.deadline,
            openings: self.openings as u32,
            status: self.status.parse().unwrap_or(JobStatus::Draft),
            applications_count: self.applications_count as u32,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Errors that can occur while operating on job postings.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("job not found")]
    NotFound,
    #[error("failed to decode skills json: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

// ---------------------------------------------------------------------------
// Applications
// ---------------------------------------------------------------------------

/// Repository for applications.
#[derive(Clone)]
pub struct ApplicationRepository {
    pool: SqlitePool,
}

const APPLICATION_COLUMNS: &str = "id, seeker_id, job_id, full_name, email, phone, current_role, \
     experience, education, portfolio_url, cover_letter, resume_url, resume_filename, \
     job_title, company, status, applied_at, reviewed_at";

impl ApplicationRepository {
    /// Inserts an application and bumps the job's applicant counter in one
    /// transaction.
    ///
    /// The row id is the deterministic (seeker, job) key, so a concurrent
    /// double submission loses the insert race inside SQLite rather than in
    /// a read-then-write window.
    pub async fn insert(&self, record: &NewApplication<'_>) -> Result<Application, ApplicationError> {
        let id = joblane_core::types::Application::key(record.seeker_id, record.job_id);
        let mut tx = self.pool.begin().await?;

        let insert = sqlx::query(
            "INSERT INTO applications \
             (id, seeker_id, job_id, full_name, email, phone, current_role, experience, \
              education, portfolio_url, cover_letter, resume_url, resume_filename, job_title, \
              company, status, applied_at, reviewed_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL)",
        )
        .bind(&id)
        .bind(record.seeker_id)
        .bind(record.job_id)
        .bind(&record.profile.full_name)
        .bind(&record.profile.email)
        .bind(&record.profile.phone)
        .bind(&record.profile.current_role)
        .bind(&record.profile.experience)
        .bind(&record.profile.education)
        .bind(&record.profile.portfolio_url)
        .bind(&record.cover_letter)
        .bind(record.resume_url)
        .bind(record.resume_filename)
        .bind(record.job_title)
        .bind(record.company)
        .bind(ApplicationStatus::Pending.as_str())
        .bind(to_rfc3339(record.applied_at))
        .execute(&mut *tx)
        .await;

        if let Err(err) = insert {
            return match err {
                sqlx::Error::Database(db_err) if is_conflict(db_err.as_ref()) => {
                    Err(ApplicationError::AlreadyApplied)
                }
                other => Err(ApplicationError::Database(other)),
            };
        }

        sqlx::query("UPDATE jobs SET applications_count = applications_count + 1 WHERE id = ?")
            .bind(record.job_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Application {
            id,
            seeker_id: record.seeker_id.to_string(),
            job_id: record.job_id.to_string(),
            applicant: record.profile.clone(),
            cover_letter: record.cover_letter.clone(),
            resume_url: record.resume_url.to_string(),
            resume_filename: record.resume_filename.to_string(),
            job_title: record.job_title.to_string(),
            company: record.company.to_string(),
            status: ApplicationStatus::Pending,
            applied_at: record.applied_at,
            reviewed_at: None,
        })
    }

    /// Direct key lookup for the (seeker, job) pair.
    pub async fn fetch_for_seeker(
        &self,
        seeker_id: &str,
        job_id: &str,
    ) -> Result<Option<Application>, ApplicationError> {
        let key = joblane_core::types::Application::key(seeker_id, job_id);
        self.fetch(&key).await
    }

    /// Loads a single application by id.
    pub async fn fetch(&self, application_id: &str) -> Result<Option<Application>, ApplicationError> {
        let row = sqlx::query_as::<_, ApplicationRow>(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = ?"
        ))
        .bind(application_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ApplicationRow::into_domain))
    }

    /// Applications for one job, newest first.
    pub async fn list_for_job(&self, job_id: &str) -> Result<Vec<Application>, ApplicationError> {
        let rows = sqlx::query_as::<_, ApplicationRow>(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications WHERE job_id = ? \
             ORDER BY applied_at DESC, id DESC"
        ))
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ApplicationRow::into_domain).collect())
    }

    /// Applications across many jobs. The id list is split into batches of
    /// at most [`MAX_IN_IDS`] which run as concurrently awaited queries;
    /// results are merged and re-sorted by applied time, newest first.
    pub async fn list_for_jobs(
        &self,
        job_ids: &[String],
    ) -> Result<Vec<Application>, ApplicationError> {
        if job_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut batches = tokio::task::JoinSet::new();
        for chunk in job_ids.chunks(MAX_IN_IDS) {
            let pool = self.pool.clone();
            let ids: Vec<String> = chunk.to_vec();
            batches.spawn(async move { fetch_application_batch(&pool, &ids).await });
        }

        let mut merged = Vec::new();
        while let Some(joined) = batches.join_next().await {
            let rows = joined.map_err(|err| ApplicationError::Batch(err.to_string()))??;
            merged.extend(rows);
        }

        merged.sort_by(|a, b| {
            b.applied_at
                .cmp(&a.applied_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(merged)
    }

    /// Sets the review status, stamping `reviewed_at` on every call
    /// whatever the previous status was.
    pub async fn update_status(
        &self,
        application_id: &str,
        status: ApplicationStatus,
        reviewed_at: DateTime<Utc>,
    ) -> Result<Application, ApplicationError> {
        let row = sqlx::query_as::<_, ApplicationRow>(&format!(
            "UPDATE applications SET status = ?, reviewed_at = ? WHERE id = ? \
             RETURNING {APPLICATION_COLUMNS}"
        ))
        .bind(status.as_str())
        .bind(to_rfc3339(reviewed_at))
        .bind(application_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ApplicationError::NotFound)?;
        Ok(row.into_domain())
    }
}

async fn fetch_application_batch(
    pool: &SqlitePool,
    job_ids: &[String],
) -> Result<Vec<Application>, ApplicationError> {
    let placeholders = vec!["?"; job_ids.len()].join(", ");
    let sql = format!(
        "SELECT {APPLICATION_COLUMNS} FROM applications WHERE job_id IN ({placeholders})"
    );
    let mut query = sqlx::query_as::<_, ApplicationRow>(&sql);
    for id in job_ids {
        query = query.bind(id);
    }
    let rows = query.fetch_all(pool).await?;
    Ok(rows.into_iter().map(ApplicationRow::into_domain).collect())
}

/// Parameters required to insert an application.
pub struct NewApplication<'a> {
    pub seeker_id: &'a str,
    pub job_id: &'a str,
    pub profile: ApplicantProfile,
    pub cover_letter: Option<String>,
    pub resume_url: &'a str,
    pub resume_filename: &'a str,
    pub job_title: &'a str,
    pub company: &'a str,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct ApplicationRow {
    id: String,
    seeker_id: String,
    job_id: String,
    full_name: String,
    email: String,
    phone: String,
    current_role: Option<String>,
    experience: Option<String>,
    education: Option<String>,
    portfolio_url: Option<String>,
    cover_letter: Option<String>,
    resume_url: String,
    resume_filename: String,
    job_title: String,
    company: String,
    status: String,
    applied_at: DateTime<Utc>,
    reviewed_at: Option<DateTime<Utc>>,
}

impl ApplicationRow {
    fn into_domain(self) -> Application {
        Application {
            id: self.id,
            seeker_id: self.seeker_id,
            job_id: self.job_id,
            applicant: ApplicantProfile {
                full_name: self.full_name,
                email: self.email,
                phone: self.phone,
                current_role: self.current_role,
                experience: self.experience,
                education: self.education,
                portfolio_url: self.portfolio_url,
            },
            cover_letter: self.cover_letter,
            resume_url: self.resume_url,
            resume_filename: self.resume_filename,
            job_title: self.job_title,
            company: self.company,
            status: self.status.parse().unwrap_or(ApplicationStatus::Pending),
            applied_at: self.applied_at,
            reviewed_at: self.reviewed_at,
        }
    }
}

/// Errors that can occur while operating on applications.
#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("an application for this job already exists")]
    AlreadyApplied,
    #[error("application not found")]
    NotFound,
    #[error("batch query task failed: {0}")]
    Batch(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

// ---------------------------------------------------------------------------
// Conversations and messages
// ---------------------------------------------------------------------------

/// Repository for conversations and their append-only messages.
#[derive(Clone)]
pub struct ConversationRepository {
    pool: SqlitePool,
}

const CONVERSATION_COLUMNS: &str = "id, employer_id, seeker_id, employer_name, seeker_name, \
     job_id, job_title, last_message, last_message_at, created_at";

impl ConversationRepository {
    /// Creates a conversation together with its first message in a single
    /// transaction, so no thread ever exists without an opening entry.
    pub async fn create_with_first_message(
        &self,
        record: &NewConversation<'_>,
    ) -> Result<(Conversation, Message), ConversationError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO conversations \
             (id, employer_id, seeker_id, employer_name, seeker_name, job_id, job_title, \
              last_message, last_message_at, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(record.employer_id)
        .bind(record.seeker_id)
        .bind(record.employer_name)
        .bind(record.seeker_name)
        .bind(record.job_id)
        .bind(record.job_title)
        .bind(record.first_message)
        .bind(to_rfc3339(record.created_at))
        .bind(to_rfc3339(record.created_at))
        .execute(&mut *tx)
        .await?;

        let seq = insert_message(
            &mut tx,
            &record.id,
            record.sender_id,
            record.sender_name,
            record.first_message,
            record.created_at,
        )
        .await?;

        tx.commit().await?;

        let conversation = Conversation {
            id: record.id.clone(),
            employer_id: record.employer_id.to_string(),
            seeker_id: record.seeker_id.to_string(),
            employer_name: record.employer_name.to_string(),
            seeker_name: record.seeker_name.to_string(),
            job_id: record.job_id.map(|v| v.to_string()),
            job_title: record.job_title.map(|v| v.to_string()),
            last_message: record.first_message.to_string(),
            last_message_at: record.created_at,
            created_at: record.created_at,
        };
        let message = Message {
            conversation_id: record.id.clone(),
            seq,
            sender_id: record.sender_id.to_string(),
            sender_name: record.sender_name.to_string(),
            text: record.first_message.to_string(),
            sent_at: record.created_at,
        };
        Ok((conversation, message))
    }

    /// Loads a single conversation.
    pub async fn fetch(
        &self,
        conversation_id: &str,
    ) -> Result<Option<Conversation>, ConversationError> {
        let row = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?"
        ))
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ConversationRow::into_domain))
    }

    /// Appends a message and updates the parent's last-message fields in
    /// the same transaction.
    pub async fn append_message(
        &self,
        record: &NewChatMessage<'_>,
    ) -> Result<Message, ConversationError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE conversations SET last_message = ?, last_message_at = ? WHERE id = ?",
        )
        .bind(record.text)
        .bind(to_rfc3339(record.sent_at))
        .bind(record.conversation_id)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(ConversationError::NotFound);
        }

        let seq = insert_message(
            &mut tx,
            record.conversation_id,
            record.sender_id,
            record.sender_name,
            record.text,
            record.sent_at,
        )
        .await?;

        tx.commit().await?;

        Ok(Message {
            conversation_id: record.conversation_id.to_string(),
            seq,
            sender_id: record.sender_id.to_string(),
            sender_name: record.sender_name.to_string(),
            text: record.text.to_string(),
            sent_at: record.sent_at,
        })
    }

    /// Conversations the user participates in, most recently active first.
    pub async fn list_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Conversation>, ConversationError> {
        let rows = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations \
             WHERE employer_id = ? OR seeker_id = ? \
             ORDER BY last_message_at DESC, id DESC"
        ))
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ConversationRow::into_domain).collect())
    }

    /// Every message of a conversation in send order.
    pub async fn list_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<Message>, ConversationError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT seq, conversation_id, sender_id, sender_name, body, sent_at \
             FROM messages WHERE conversation_id = ? ORDER BY sent_at ASC, seq ASC",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(MessageRow::into_domain).collect())
    }
}

async fn insert_message(
    tx: &mut Transaction<'_, Sqlite>,
    conversation_id: &str,
    sender_id: &str,
    sender_name: &str,
    text: &str,
    sent_at: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        "INSERT INTO messages (conversation_id, sender_id, sender_name, body, sent_at) \
         VALUES (?, ?, ?, ?, ?) RETURNING seq",
    )
    .bind(conversation_id)
    .bind(sender_id)
    .bind(sender_name)
    .bind(text)
    .bind(to_rfc3339(sent_at))
    .fetch_one(&mut **tx)
    .await?;
    Ok(row.get("seq"))
}

/// Parameters required to open a conversation with its first message.
pub struct NewConversation<'a> {
    pub id: String,
    pub employer_id: &'a str,
    pub seeker_id: &'a str,
    pub employer_name: &'a str,
    pub seeker_name: &'a str,
    pub job_id: Option<&'a str>,
    pub job_title: Option<&'a str>,
    pub sender_id: &'a str,
    pub sender_name: &'a str,
    pub first_message: &'a str,
    pub created_at: DateTime<Utc>,
}

/// Parameters required to append a message to an existing conversation.
pub struct NewChatMessage<'a> {
    pub conversation_id: &'a str,
    pub sender_id: &'a str,
    pub sender_name: &'a str,
    pub text: &'a str,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct ConversationRow {
    id: String,
    employer_id: String,
    seeker_id: String,
    employer_name: String,
    seeker_name: String,
    job_id: Option<String>,
    job_title: Option<String>,
    last_message: String,
    last_message_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl ConversationRow {
    fn into_domain(self) -> Conversation {
        Conversation {
            id: self.id,
            employer_id: self.employer_id,
            seeker_id: self.seeker_id,
            employer_name: self.employer_name,
            seeker_name: self.seeker_name,
            job_id: self.job_id,
            job_title: self.job_title,
            last_message: self.last_message,
            last_message_at: self.last_message_at,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    seq: i64,
    conversation_id: String,
    sender_id: String,
    sender_name: String,
    body: String,
    sent_at: DateTime<Utc>,
}

impl MessageRow {
    fn into_domain(self) -> Message {
        Message {
            conversation_id: self.conversation_id,
            seq: self.seq,
            sender_id: self.sender_id,
            sender_name: self.sender_name,
            text: self.body,
            sent_at: self.sent_at,
        }
    }
}

/// Errors that can occur while operating on conversations.
#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("conversation not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Repository for notifications. Rows are only ever created by the
/// application and conversation write paths.
#[derive(Clone)]
pub struct NotificationRepository {
    pool: SqlitePool,
}

impl NotificationRepository {
    /// Inserts a notification with a generated identifier.
    pub async fn insert(
        &self,
        record: &NewNotification<'_>,
    ) -> Result<Notification, NotificationError> {
        let id = Uuid::new_v4().to_string();
        let payload_json = serde_json::to_string(&record.kind)?;
        sqlx::query(
            "INSERT INTO notifications (id, recipient_id, type, payload_json, is_read, created_at) \
             VALUES (?, ?, ?, ?, 0, ?)",
        )
        .bind(&id)
        .bind(record.recipient_id)
        .bind(record.kind.type_str())
        .bind(&payload_json)
        .bind(to_rfc3339(record.created_at))
        .execute(&self.pool)
        .await?;

        Ok(Notification {
            id,
            recipient_id: record.recipient_id.to_string(),
            kind: record.kind.clone(),
            read: false,
            created_at: record.created_at,
        })
    }

    /// Everything addressed to the recipient, newest first.
    pub async fn list_for_user(
        &self,
        recipient_id: &str,
    ) -> Result<Vec<Notification>, NotificationError> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            "SELECT id, recipient_id, payload_json, is_read, created_at FROM notifications \
             WHERE recipient_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(recipient_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(NotificationRow::into_domain).collect()
    }

    /// Marks one notification read, scoped to its recipient. Idempotent:
    /// re-marking a read notification succeeds and changes nothing.
    /// Returns the (post-update) notification, or `None` when no such row
    /// belongs to the recipient.
    pub async fn mark_read(
        &self,
        notification_id: &str,
        recipient_id: &str,
    ) -> Result<Option<Notification>, NotificationError> {
        let row = sqlx::query_as::<_, NotificationRow>(
            "UPDATE notifications SET is_read = 1 WHERE id = ? AND recipient_id = ? \
             RETURNING id, recipient_id, payload_json, is_read, created_at",
        )
        .bind(notification_id)
        .bind(recipient_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(NotificationRow::into_domain).transpose()
    }

    /// Marks every unread notification read; already-read rows are left
    /// untouched. Returns how many rows changed.
    pub async fn mark_all_read(&self, recipient_id: &str) -> Result<u64, NotificationError> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = 1 WHERE recipient_id = ? AND is_read = 0",
        )
        .bind(recipient_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Number of unread notifications for the recipient.
    pub async fn unread_count(&self, recipient_id: &str) -> Result<u64, NotificationError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = ? AND is_read = 0",
        )
        .bind(recipient_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    /// Deletes a bounded batch of read notifications older than the
    /// threshold, returning how many rows went away.
    pub async fn delete_read_older_than_batch(
        &self,
        threshold: DateTime<Utc>,
        limit: i64,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM notifications WHERE id IN (\
                 SELECT id FROM notifications \
                 WHERE is_read = 1 AND created_at < ? LIMIT ?)",
        )
        .bind(to_rfc3339(threshold))
        .bind(limit)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

/// Parameters required to insert a notification.
pub struct NewNotification<'a> {
    pub recipient_id: &'a str,
    pub kind: NoticeKind,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: String,
    recipient_id: String,
    payload_json: String,
    is_read: i64,
    created_at: DateTime<Utc>,
}

impl NotificationRow {
    fn into_domain(self) -> Result<Notification, NotificationError> {
        let kind: NoticeKind = serde_json::from_str(&self.payload_json)?;
        Ok(Notification {
            id: self.id,
            recipient_id: self.recipient_id,
            kind,
            read: self.is_read != 0,
            created_at: self.created_at,
        })
    }
}

/// Errors that can occur while operating on notifications.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("failed to decode notification payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
