use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, params};

use super::models::*;

/// Async-safe handle to the dashboard store.
///
/// Wraps `DashboardDb` behind `Arc<Mutex>` and runs every access on tokio's
/// blocking pool via `spawn_blocking`, so synchronous SQLite I/O never ties
/// up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<DashboardDb>>,
}

impl DbHandle {
    pub fn new(db: DashboardDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&DashboardDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }

    /// Acquire the database mutex synchronously. For startup and tests only.
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, DashboardDb>> {
        self.inner
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))
    }
}

pub struct DashboardDb {
    conn: Connection,
}

impl DashboardDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS contracts (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    value REAL NOT NULL DEFAULT 0,
                    status TEXT NOT NULL,
                    sales_stage TEXT,
                    close_date TEXT,
                    award_date TEXT,
                    contract_date TEXT,
                    notion_page_id TEXT,
                    source TEXT NOT NULL DEFAULT 'manual',
                    stage_entered_at TEXT NOT NULL DEFAULT (datetime('now')),
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS tasks (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    status TEXT NOT NULL DEFAULT 'pending',
                    priority TEXT NOT NULL DEFAULT 'medium',
                    due_date TEXT,
                    contract_id TEXT REFERENCES contracts(id) ON DELETE CASCADE,
                    stage TEXT,
                    template_id TEXT,
                    is_auto_generated INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                    completed_at TEXT
                );

                CREATE TABLE IF NOT EXISTS documents (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    contract_id TEXT NOT NULL REFERENCES contracts(id) ON DELETE CASCADE,
                    doc_type TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'draft',
                    version INTEGER NOT NULL DEFAULT 1,
                    is_current_version INTEGER NOT NULL DEFAULT 1,
                    file_name TEXT NOT NULL,
                    file_size INTEGER,
                    mime_type TEXT,
                    storage_path TEXT,
                    uploaded_by TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS oauth_tokens (
                    provider TEXT PRIMARY KEY,
                    access_token TEXT NOT NULL,
                    refresh_token TEXT,
                    instance_url TEXT,
                    expires_at TEXT,
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS user_roles (
                    email TEXT PRIMARY KEY,
                    role TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_tasks_contract ON tasks(contract_id);
                CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
                CREATE INDEX IF NOT EXISTS idx_documents_contract ON documents(contract_id, doc_type);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Contracts ─────────────────────────────────────────────────────

    pub fn create_contract(&self, input: &NewContract) -> Result<Contract> {
        let id = input
            .id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        self.conn
            .execute(
                "INSERT INTO contracts (id, name, value, status, close_date, award_date, contract_date, notion_page_id, source)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'manual')",
                params![
                    id,
                    input.name,
                    input.value,
                    input.status.as_str(),
                    date_to_sql(input.close_date),
                    date_to_sql(input.award_date),
                    date_to_sql(input.contract_date),
                    input.notion_page_id,
                ],
            )
            .context("Failed to insert contract")?;
        self.get_contract(&id)?
            .context("Contract not found after insert")
    }

    pub fn list_contracts(&self) -> Result<Vec<Contract>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} ORDER BY close_date IS NULL, close_date, name", CONTRACT_SELECT))
            .context("Failed to prepare list_contracts")?;
        let rows = stmt
            .query_map([], ContractRow::from_row)
            .context("Failed to query contracts")?;
        let mut contracts = Vec::new();
        for row in rows {
            contracts.push(row.context("Failed to read contract row")?.into_contract()?);
        }
        Ok(contracts)
    }

    pub fn get_contract(&self, id: &str) -> Result<Option<Contract>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} WHERE id = ?1", CONTRACT_SELECT))
            .context("Failed to prepare get_contract")?;
        let mut rows = stmt
            .query_map(params![id], ContractRow::from_row)
            .context("Failed to query contract")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read contract row")?.into_contract()?)),
            None => Ok(None),
        }
    }

    /// Set a contract's status. Returns `None` for an unknown contract, and
    /// whether the stage actually changed. `stage_entered_at` only moves on a
    /// real change.
    pub fn update_contract_status(
        &self,
        id: &str,
        status: PipelineStage,
    ) -> Result<Option<(Contract, bool)>> {
        let Some(current) = self.get_contract(id)? else {
            return Ok(None);
        };
        if current.status == status {
            return Ok(Some((current, false)));
        }
        self.conn
            .execute(
                "UPDATE contracts SET status = ?1, stage_entered_at = datetime('now'), updated_at = datetime('now') WHERE id = ?2",
                params![status.as_str(), id],
            )
            .context("Failed to update contract status")?;
        let updated = self
            .get_contract(id)?
            .context("Contract not found after status update")?;
        Ok(Some((updated, true)))
    }

    /// Merge a CRM record into the store. CRM-owned fields are overwritten;
    /// the stored status is kept for existing contracts. Returns the contract
    /// and whether it was newly created.
    pub fn upsert_crm_contract(&self, crm: &CrmContract) -> Result<(Contract, bool)> {
        let exists = self.get_contract(&crm.id)?.is_some();
        if exists {
            self.conn
                .execute(
                    "UPDATE contracts SET name = ?1, value = ?2, sales_stage = ?3, close_date = ?4,
                         award_date = ?5, contract_date = ?6, updated_at = datetime('now')
                     WHERE id = ?7",
                    params![
                        crm.name,
                        crm.value,
                        crm.sales_stage,
                        date_to_sql(crm.close_date),
                        date_to_sql(crm.award_date),
                        date_to_sql(crm.contract_date),
                        crm.id,
                    ],
                )
                .context("Failed to update CRM contract")?;
        } else {
            let status = PipelineStage::from_str(&crm.status).unwrap_or_default();
            self.conn
                .execute(
                    "INSERT INTO contracts (id, name, value, status, sales_stage, close_date, award_date, contract_date, source)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'salesforce')",
                    params![
                        crm.id,
                        crm.name,
                        crm.value,
                        status.as_str(),
                        crm.sales_stage,
                        date_to_sql(crm.close_date),
                        date_to_sql(crm.award_date),
                        date_to_sql(crm.contract_date),
                    ],
                )
                .context("Failed to insert CRM contract")?;
        }
        let contract = self
            .get_contract(&crm.id)?
            .context("Contract not found after CRM upsert")?;
        Ok((contract, !exists))
    }

    pub fn delete_contract(&self, id: &str) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM contracts WHERE id = ?1", params![id])
            .context("Failed to delete contract")?;
        Ok(count > 0)
    }

    // ── Tasks ─────────────────────────────────────────────────────────

    pub fn create_task(&self, task: &NewTask) -> Result<Task> {
        self.conn
            .execute(
                "INSERT INTO tasks (title, description, status, priority, due_date, contract_id, stage, template_id, is_auto_generated)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    task.title,
                    task.description,
                    task.status.as_str(),
                    task.priority.as_str(),
                    date_to_sql(task.due_date),
                    task.contract_id,
                    task.stage.map(|s| s.as_str()),
                    task.template_id,
                    task.is_auto_generated,
                ],
            )
            .context("Failed to insert task")?;
        let id = self.conn.last_insert_rowid();
        self.get_task(id)?.context("Task not found after insert")
    }

    /// Persist template-generated tasks, skipping any template already
    /// instantiated for the same contract. Returns only the inserted tasks.
    pub fn insert_generated_tasks(&self, tasks: &[NewTask]) -> Result<Vec<Task>> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let mut inserted = Vec::new();
        for task in tasks {
            if let (Some(contract_id), Some(template_id)) = (&task.contract_id, &task.template_id) {
                let exists: bool = tx
                    .query_row(
                        "SELECT EXISTS(SELECT 1 FROM tasks WHERE contract_id = ?1 AND template_id = ?2)",
                        params![contract_id, template_id],
                        |row| row.get(0),
                    )
                    .context("Failed to check for existing generated task")?;
                if exists {
                    continue;
                }
            }
            inserted.push(self.create_task(task)?);
        }
        tx.commit().context("Failed to commit generated tasks")?;
        Ok(inserted)
    }

    pub fn list_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "{} WHERE (?1 IS NULL OR status = ?1) AND (?2 IS NULL OR contract_id = ?2)
                 ORDER BY due_date IS NULL, due_date, id",
                TASK_SELECT
            ))
            .context("Failed to prepare list_tasks")?;
        let rows = stmt
            .query_map(
                params![query.status.map(|s| s.as_str()), query.contract_id],
                TaskRow::from_row,
            )
            .context("Failed to query tasks")?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row.context("Failed to read task row")?.into_task()?);
        }
        Ok(tasks)
    }

    pub fn get_task(&self, id: i64) -> Result<Option<Task>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} WHERE id = ?1", TASK_SELECT))
            .context("Failed to prepare get_task")?;
        let mut rows = stmt
            .query_map(params![id], TaskRow::from_row)
            .context("Failed to query task")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read task row")?.into_task()?)),
            None => Ok(None),
        }
    }

    /// Apply a partial update. Returns `None` for an unknown task.
    pub fn update_task(&self, id: i64, update: &TaskUpdate) -> Result<Option<Task>> {
        if self.get_task(id)?.is_none() {
            return Ok(None);
        }

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        if let Some(title) = &update.title {
            tx.execute(
                "UPDATE tasks SET title = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![title, id],
            )
            .context("Failed to update task title")?;
        }
        if let Some(description) = &update.description {
            tx.execute(
                "UPDATE tasks SET description = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![description, id],
            )
            .context("Failed to update task description")?;
        }
        if let Some(priority) = update.priority {
            tx.execute(
                "UPDATE tasks SET priority = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![priority.as_str(), id],
            )
            .context("Failed to update task priority")?;
        }
        if let Some(due_date) = update.due_date {
            tx.execute(
                "UPDATE tasks SET due_date = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![date_to_sql(Some(due_date)), id],
            )
            .context("Failed to update task due date")?;
        }
        if let Some(status) = update.status {
            let completed_at = if status == TaskStatus::Completed {
                "datetime('now')"
            } else {
                "NULL"
            };
            tx.execute(
                &format!(
                    "UPDATE tasks SET status = ?1, completed_at = {}, updated_at = datetime('now') WHERE id = ?2",
                    completed_at
                ),
                params![status.as_str(), id],
            )
            .context("Failed to update task status")?;
        }
        tx.commit().context("Failed to commit task update")?;
        self.get_task(id)
    }

    pub fn delete_task(&self, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])
            .context("Failed to delete task")?;
        Ok(count > 0)
    }

    // ── Documents ─────────────────────────────────────────────────────

    /// Attach a document. A new document of an existing type becomes the
    /// current version and supersedes the older ones.
    pub fn add_document(&self, contract_id: &str, doc: &NewDocument) -> Result<Document> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let max_version: i32 = tx
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM documents WHERE contract_id = ?1 AND doc_type = ?2",
                params![contract_id, doc.doc_type.as_str()],
                |row| row.get(0),
            )
            .context("Failed to get max document version")?;
        tx.execute(
            "UPDATE documents SET is_current_version = 0 WHERE contract_id = ?1 AND doc_type = ?2",
            params![contract_id, doc.doc_type.as_str()],
        )
        .context("Failed to supersede document versions")?;
        tx.execute(
            "INSERT INTO documents (contract_id, doc_type, status, version, is_current_version, file_name, file_size, mime_type, storage_path, uploaded_by)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6, ?7, ?8, ?9)",
            params![
                contract_id,
                doc.doc_type.as_str(),
                doc.status.as_str(),
                max_version + 1,
                doc.file_name,
                doc.file_size,
                doc.mime_type,
                doc.storage_path,
                doc.uploaded_by,
            ],
        )
        .context("Failed to insert document")?;
        let id = tx.last_insert_rowid();
        tx.commit().context("Failed to commit document")?;
        self.get_document(id)?
            .context("Document not found after insert")
    }

    pub fn get_document(&self, id: i64) -> Result<Option<Document>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} WHERE id = ?1", DOCUMENT_SELECT))
            .context("Failed to prepare get_document")?;
        let mut rows = stmt
            .query_map(params![id], DocumentRow::from_row)
            .context("Failed to query document")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read document row")?.into_document()?)),
            None => Ok(None),
        }
    }

    pub fn list_documents(&self, contract_id: &str) -> Result<Vec<Document>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "{} WHERE contract_id = ?1 ORDER BY doc_type, version DESC",
                DOCUMENT_SELECT
            ))
            .context("Failed to prepare list_documents")?;
        let rows = stmt
            .query_map(params![contract_id], DocumentRow::from_row)
            .context("Failed to query documents")?;
        let mut documents = Vec::new();
        for row in rows {
            documents.push(row.context("Failed to read document row")?.into_document()?);
        }
        Ok(documents)
    }

    // ── OAuth tokens ──────────────────────────────────────────────────

    pub fn get_token(&self, provider: Provider) -> Result<Option<OAuthToken>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT access_token, refresh_token, instance_url, expires_at FROM oauth_tokens WHERE provider = ?1",
            )
            .context("Failed to prepare get_token")?;
        let mut rows = stmt
            .query_map(params![provider.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })
            .context("Failed to query token")?;
        match rows.next() {
            Some(row) => {
                let (access_token, refresh_token, instance_url, expires_at) =
                    row.context("Failed to read token row")?;
                let expires_at = expires_at
                    .map(|s| {
                        DateTime::parse_from_rfc3339(&s)
                            .map(|d| d.with_timezone(&Utc))
                            .context("Failed to parse token expiry")
                    })
                    .transpose()?;
                Ok(Some(OAuthToken {
                    provider,
                    access_token,
                    refresh_token,
                    instance_url,
                    expires_at,
                }))
            }
            None => Ok(None),
        }
    }

    /// Store the token for its provider, replacing the previous row. A
    /// missing refresh token keeps the stored one.
    pub fn upsert_token(&self, token: &OAuthToken) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO oauth_tokens (provider, access_token, refresh_token, instance_url, expires_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))
                 ON CONFLICT(provider) DO UPDATE SET
                     access_token = excluded.access_token,
                     refresh_token = COALESCE(excluded.refresh_token, oauth_tokens.refresh_token),
                     instance_url = COALESCE(excluded.instance_url, oauth_tokens.instance_url),
                     expires_at = excluded.expires_at,
                     updated_at = datetime('now')",
                params![
                    token.provider.as_str(),
                    token.access_token,
                    token.refresh_token,
                    token.instance_url,
                    token.expires_at.map(|d| d.to_rfc3339()),
                ],
            )
            .context("Failed to upsert token")?;
        Ok(())
    }

    pub fn delete_token(&self, provider: Provider) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM oauth_tokens WHERE provider = ?1",
                params![provider.as_str()],
            )
            .context("Failed to delete token")?;
        Ok(())
    }

    // ── Roles ─────────────────────────────────────────────────────────

    pub fn list_roles(&self) -> Result<Vec<UserRole>> {
        let mut stmt = self
            .conn
            .prepare("SELECT email, role, created_at FROM user_roles ORDER BY email")
            .context("Failed to prepare list_roles")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .context("Failed to query roles")?;
        let mut roles = Vec::new();
        for row in rows {
            let (email, role, created_at) = row.context("Failed to read role row")?;
            roles.push(UserRole {
                email,
                role: parse_enum(&role, "role")?,
                created_at,
            });
        }
        Ok(roles)
    }

    pub fn get_role(&self, email: &str) -> Result<Option<Role>> {
        let mut stmt = self
            .conn
            .prepare("SELECT role FROM user_roles WHERE email = ?1")
            .context("Failed to prepare get_role")?;
        let mut rows = stmt
            .query_map(params![email.to_lowercase()], |row| row.get::<_, String>(0))
            .context("Failed to query role")?;
        match rows.next() {
            Some(row) => Ok(Some(parse_enum(&row.context("Failed to read role")?, "role")?)),
            None => Ok(None),
        }
    }

    pub fn set_role(&self, email: &str, role: Role) -> Result<UserRole> {
        let email = email.trim().to_lowercase();
        self.conn
            .execute(
                "INSERT INTO user_roles (email, role) VALUES (?1, ?2)
                 ON CONFLICT(email) DO UPDATE SET role = excluded.role",
                params![email, role.as_str()],
            )
            .context("Failed to upsert role")?;
        self.list_roles()?
            .into_iter()
            .find(|r| r.email == email)
            .context("Role not found after upsert")
    }
}

// ── Internal row helpers ──────────────────────────────────────────────

const CONTRACT_SELECT: &str = "SELECT id, name, value, status, sales_stage, close_date, award_date, contract_date,
        notion_page_id, source, stage_entered_at, created_at, updated_at
 FROM contracts";

const TASK_SELECT: &str = "SELECT id, title, description, status, priority, due_date, contract_id, stage,
        template_id, is_auto_generated, created_at, updated_at, completed_at
 FROM tasks";

const DOCUMENT_SELECT: &str = "SELECT id, contract_id, doc_type, status, version, is_current_version, file_name,
        file_size, mime_type, storage_path, uploaded_by, created_at
 FROM documents";

fn date_to_sql(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

fn parse_date(value: Option<String>) -> Result<Option<NaiveDate>> {
    value
        .map(|s| {
            NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .with_context(|| format!("Failed to parse date '{}'", s))
        })
        .transpose()
}

fn parse_enum<T: FromStr<Err = String>>(value: &str, what: &str) -> Result<T> {
    T::from_str(value)
        .map_err(|e| anyhow::anyhow!(e))
        .with_context(|| format!("Failed to parse {}", what))
}

/// Intermediate row struct for contracts before converting enum and date
/// strings into typed values.
struct ContractRow {
    id: String,
    name: String,
    value: f64,
    status: String,
    sales_stage: Option<String>,
    close_date: Option<String>,
    award_date: Option<String>,
    contract_date: Option<String>,
    notion_page_id: Option<String>,
    source: String,
    stage_entered_at: String,
    created_at: String,
    updated_at: String,
}

impl ContractRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            value: row.get(2)?,
            status: row.get(3)?,
            sales_stage: row.get(4)?,
            close_date: row.get(5)?,
            award_date: row.get(6)?,
            contract_date: row.get(7)?,
            notion_page_id: row.get(8)?,
            source: row.get(9)?,
            stage_entered_at: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    fn into_contract(self) -> Result<Contract> {
        Ok(Contract {
            id: self.id,
            name: self.name,
            value: self.value,
            status: parse_enum(&self.status, "contract status")?,
            sales_stage: self.sales_stage,
            close_date: parse_date(self.close_date)?,
            award_date: parse_date(self.award_date)?,
            contract_date: parse_date(self.contract_date)?,
            notion_page_id: self.notion_page_id,
            source: parse_enum(&self.source, "contract source")?,
            stage_entered_at: self.stage_entered_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

struct TaskRow {
    id: i64,
    title: String,
    description: String,
    status: String,
    priority: String,
    due_date: Option<String>,
    contract_id: Option<String>,
    stage: Option<String>,
    template_id: Option<String>,
    is_auto_generated: bool,
    created_at: String,
    updated_at: String,
    completed_at: Option<String>,
}

impl TaskRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            status: row.get(3)?,
            priority: row.get(4)?,
            due_date: row.get(5)?,
            contract_id: row.get(6)?,
            stage: row.get(7)?,
            template_id: row.get(8)?,
            is_auto_generated: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
            completed_at: row.get(12)?,
        })
    }

    fn into_task(self) -> Result<Task> {
        Ok(Task {
            id: self.id,
            title: self.title,
            description: self.description,
            status: parse_enum(&self.status, "task status")?,
            priority: parse_enum(&self.priority, "task priority")?,
            due_date: parse_date(self.due_date)?,
            contract_id: self.contract_id,
            stage: self
                .stage
                .as_deref()
                .map(|s| parse_enum(s, "task stage"))
                .transpose()?,
            template_id: self.template_id,
            is_auto_generated: self.is_auto_generated,
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
        })
    }
}

struct DocumentRow {
    id: i64,
    contract_id: String,
    doc_type: String,
    status: String,
    version: i32,
    is_current_version: bool,
    file_name: String,
    file_size: Option<i64>,
    mime_type: Option<String>,
    storage_path: Option<String>,
    uploaded_by: Option<String>,
    created_at: String,
}

impl DocumentRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            contract_id: row.get(1)?,
            doc_type: row.get(2)?,
            status: row.get(3)?,
            version: row.get(4)?,
            is_current_version: row.get(5)?,
            file_name: row.get(6)?,
            file_size: row.get(7)?,
            mime_type: row.get(8)?,
            storage_path: row.get(9)?,
            uploaded_by: row.get(10)?,
            created_at: row.get(11)?,
        })
    }

    fn into_document(self) -> Result<Document> {
        Ok(Document {
            id: self.id,
            contract_id: self.contract_id,
            doc_type: parse_enum(&self.doc_type, "document type")?,
            status: parse_enum(&self.status, "document status")?,
            version: self.version,
            is_current_version: self.is_current_version,
            file_name: self.file_name,
            file_size: self.file_size,
            mime_type: self.mime_type,
            storage_path: self.storage_path,
            uploaded_by: self.uploaded_by,
            created_at: self.created_at,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
