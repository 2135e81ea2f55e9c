use std::sync::Arc;

use api::auth::{AuthConfig, CurrentUser, UserRole};
use api::schema::{build_schema, AppSchema, Uploads};
use api::storage::{FileStore, LocalFileStore};
use async_graphql::{Request, Response, Variables};
use chrono::{Duration, NaiveDate, Utc};
use migration::MigratorTrait;
use sea_orm::{ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, Statement};
use serde_json::Value;
use tempfile::TempDir;
use uuid::Uuid;

pub struct TestEnv {
    pub db: Arc<DatabaseConnection>,
    pub schema: async_graphql::Schema<
        api::schema::QueryRoot,
        api::schema::MutationRoot,
        async_graphql::EmptySubscription,
    >,
    pub store: Arc<dyn FileStore>,
    pub upload_dir: TempDir,
}

pub async fn setup_env() -> TestEnv {
    let conn = Database::connect("sqlite::memory:").await.unwrap();
    let db = Arc::new(conn);
    bootstrap_sqlite(db.as_ref()).await;

    let upload_dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn FileStore> = Arc::new(LocalFileStore::new(upload_dir.path()));
    let uploads = Arc::new(Uploads {
        store: store.clone(),
        public_base: "/uploads".into(),
    });
    let auth = Arc::new(AuthConfig {
        jwt_secret: "test-secret".into(),
        session_ttl_minutes: 30,
    });
    let AppSchema(schema) = build_schema(db.clone(), auth, uploads);

    TestEnv {
        db,
        schema,
        store,
        upload_dir,
    }
}

/// Disposable-database context for tests that need real Postgres semantics
/// (migrations, upsert conflicts). Skipped unless TEST_DATABASE_URL is set.
pub struct PgTestContext {
    pub db: Arc<DatabaseConnection>,
    pub schema: async_graphql::Schema<
        api::schema::QueryRoot,
        api::schema::MutationRoot,
        async_graphql::EmptySubscription,
    >,
    pub seeded: api::schema::SeededRecords,
    pub store: Arc<dyn FileStore>,
    pub upload_dir: TempDir,
    admin_url: String,
    db_name: String,
}

impl PgTestContext {
    pub async fn new_seeded() -> Option<Self> {
        let base = std::env::var("TEST_DATABASE_URL").ok()?;
        let (admin_url, db_name, test_url) = build_urls(&base)?;
        let admin = Database::connect(&admin_url).await.ok()?;
        let drop_sql = format!("DROP DATABASE IF EXISTS \"{}\" WITH (FORCE);", db_name);
        let create_sql = format!("CREATE DATABASE \"{}\";", db_name);
        let _ = admin
            .execute(Statement::from_string(DatabaseBackend::Postgres, drop_sql))
            .await;
        admin
            .execute(Statement::from_string(
                DatabaseBackend::Postgres,
                create_sql,
            ))
            .await
            .ok()?;
        let conn = Database::connect(&test_url).await.ok()?;
        migration::Migrator::up(&conn, None).await.ok()?;
        let seeded = api::schema::seed_demo(&conn).await.ok()?;
        let db = Arc::new(conn);
        let upload_dir = tempfile::tempdir().ok()?;
        let store: Arc<dyn FileStore> = Arc::new(LocalFileStore::new(upload_dir.path()));
        let uploads = Arc::new(Uploads {
            store: store.clone(),
            public_base: "/uploads".into(),
        });
        let auth = Arc::new(AuthConfig {
            jwt_secret: "test-secret".into(),
            session_ttl_minutes: 30,
        });
        let AppSchema(schema) = build_schema(db.clone(), auth, uploads);
        Some(Self {
            db,
            schema,
            seeded,
            store,
            upload_dir,
            admin_url,
            db_name,
        })
    }

    pub async fn cleanup(self) {
        let Self {
            db,
            admin_url,
            db_name,
            ..
        } = self;
        drop(db);
        if let Ok(admin) = Database::connect(&admin_url).await {
            let drop_sql = format!("DROP DATABASE IF EXISTS \"{}\" WITH (FORCE);", db_name);
            let _ = admin
                .execute(Statement::from_string(DatabaseBackend::Postgres, drop_sql))
                .await;
        }
    }
}

fn build_urls(base: &str) -> Option<(String, String, String)> {
    let url = url::Url::parse(base).ok()?;
    let db_path = url.path().trim_start_matches('/').to_string();
    let base_name = if db_path.is_empty() {
        "kegiatan_test".to_string()
    } else {
        db_path
    };
    let db_name = format!("{}_{}", base_name, Uuid::new_v4().simple());
    let mut admin_url = url.clone();
    admin_url.set_path("/postgres");
    let mut test_url = url.clone();
    test_url.set_path(&format!("/{}", db_name));
    Some((admin_url.to_string(), db_name, test_url.to_string()))
}

pub fn employee(user_id: Uuid) -> CurrentUser {
    CurrentUser {
        user_id,
        roles: vec![UserRole::Employee],
    }
}

pub fn supervisor(user_id: Uuid) -> CurrentUser {
    CurrentUser {
        user_id,
        roles: vec![UserRole::Supervisor],
    }
}

pub async fn exec_as(env: &TestEnv, viewer: CurrentUser, query: &str, vars: Value) -> Response {
    let request = Request::new(query)
        .variables(Variables::from_json(vars))
        .data(viewer);
    env.schema.execute(request).await
}

pub async fn exec_anonymous(env: &TestEnv, query: &str, vars: Value) -> Response {
    let request = Request::new(query).variables(Variables::from_json(vars));
    env.schema.execute(request).await
}

pub fn error_code(resp: &Response) -> Option<String> {
    resp.errors.first().and_then(|err| {
        err.extensions
            .as_ref()
            .and_then(|ext| ext.get("code"))
            .map(|code| code.to_string().trim_matches('"').to_string())
    })
}

pub async fn insert_user(db: &DatabaseConnection, email: &str, roles: &[&str]) -> Uuid {
    let id = Uuid::new_v4();
    let now = Utc::now().to_rfc3339();
    db.execute(Statement::from_sql_and_values(
        DatabaseBackend::Sqlite,
        "INSERT INTO \"user\" (id, email, display_name, is_active, created_at, updated_at) VALUES (?, ?, ?, 1, ?, ?)",
        vec![
            id.into(),
            email.into(),
            email.split('@').next().unwrap_or(email).into(),
            now.clone().into(),
            now.into(),
        ],
    ))
    .await
    .unwrap();
    for role in roles {
        db.execute(Statement::from_sql_and_values(
            DatabaseBackend::Sqlite,
            "INSERT INTO user_role (user_id, role) VALUES (?, ?)",
            vec![id.into(), (*role).into()],
        ))
        .await
        .unwrap();
    }
    id
}

pub async fn insert_team(db: &DatabaseConnection, name: &str, member_ids: &[Uuid]) -> Uuid {
    let id = Uuid::new_v4();
    let now = Utc::now().to_rfc3339();
    db.execute(Statement::from_sql_and_values(
        DatabaseBackend::Sqlite,
        "INSERT INTO team (id, name, created_at, updated_at) VALUES (?, ?, ?, ?)",
        vec![id.into(), name.into(), now.clone().into(), now.into()],
    ))
    .await
    .unwrap();
    for member in member_ids {
        db.execute(Statement::from_sql_and_values(
            DatabaseBackend::Sqlite,
            "INSERT INTO team_member (team_id, user_id) VALUES (?, ?)",
            vec![id.into(), (*member).into()],
        ))
        .await
        .unwrap();
    }
    id
}

pub async fn insert_proposal(db: &DatabaseConnection, title: &str, status: &str) -> Uuid {
    let id = Uuid::new_v4();
    let now = Utc::now().to_rfc3339();
    db.execute(Statement::from_sql_and_values(
        DatabaseBackend::Sqlite,
        "INSERT INTO proposal (id, title, proposer_name, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        vec![
            id.into(),
            title.into(),
            "Kelurahan Uji".into(),
            status.into(),
            now.clone().into(),
            now.into(),
        ],
    ))
    .await
    .unwrap();
    id
}

pub struct ActivityRow {
    pub name: String,
    pub stage: String,
    pub start_date: NaiveDate,
    /// Days in the past for created_at and updated_at; lets tests control
    /// list ordering.
    pub age_days: i64,
}

pub async fn insert_activity(db: &DatabaseConnection, team_id: Uuid, row: ActivityRow) -> Uuid {
    let id = Uuid::new_v4();
    let stamp = (Utc::now() - Duration::days(row.age_days)).to_rfc3339();
    db.execute(Statement::from_sql_and_values(
        DatabaseBackend::Sqlite,
        "INSERT INTO activity (id, name, description, stage, final_status, start_date, end_date, team_id, proposal_id, sktl_path, handover_sktl_path, created_by, created_at, updated_at) \
         VALUES (?, ?, NULL, ?, NULL, ?, NULL, ?, NULL, NULL, NULL, NULL, ?, ?)",
        vec![
            id.into(),
            row.name.into(),
            row.stage.into(),
            row.start_date.to_string().into(),
            team_id.into(),
            stamp.clone().into(),
            stamp.into(),
        ],
    ))
    .await
    .unwrap();
    id
}

pub fn pdf_payload(name: &str) -> api::storage::FilePayload {
    api::storage::FilePayload {
        file_name: name.to_string(),
        bytes: b"%PDF-1.4 test".to_vec(),
    }
}

pub fn jpg_payload(name: &str) -> api::storage::FilePayload {
    api::storage::FilePayload {
        file_name: name.to_string(),
        bytes: vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00],
    }
}

async fn bootstrap_sqlite(db: &DatabaseConnection) {
    db.execute(Statement::from_string(
        DatabaseBackend::Sqlite,
        "PRAGMA foreign_keys = ON;",
    ))
    .await
    .unwrap();

    for ddl in [
        r#"
        CREATE TABLE "user" (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            display_name TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
        r#"
        CREATE TABLE user_secret (
            user_id TEXT PRIMARY KEY,
            password_hash TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES "user"(id) ON DELETE CASCADE
        );
        "#,
        r#"
        CREATE TABLE user_role (
            user_id TEXT NOT NULL,
            role TEXT NOT NULL,
            PRIMARY KEY (user_id, role),
            FOREIGN KEY(user_id) REFERENCES "user"(id) ON DELETE CASCADE
        );
        "#,
        r#"
        CREATE TABLE team (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
        r#"
        CREATE TABLE team_member (
            team_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            PRIMARY KEY (team_id, user_id),
            FOREIGN KEY(team_id) REFERENCES team(id) ON DELETE CASCADE,
            FOREIGN KEY(user_id) REFERENCES "user"(id) ON DELETE CASCADE
        );
        "#,
        r#"
        CREATE TABLE proposal (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            proposer_name TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'SUBMITTED',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
        r#"
        CREATE TABLE activity (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            stage TEXT NOT NULL DEFAULT 'AWAITING_CONFIRMATION',
            final_status TEXT,
            start_date TEXT NOT NULL,
            end_date TEXT,
            team_id TEXT NOT NULL,
            proposal_id TEXT,
            sktl_path TEXT,
            handover_sktl_path TEXT,
            created_by TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(team_id) REFERENCES team(id) ON DELETE CASCADE,
            FOREIGN KEY(proposal_id) REFERENCES proposal(id) ON DELETE SET NULL,
            FOREIGN KEY(created_by) REFERENCES "user"(id) ON DELETE SET NULL
        );
        "#,
        r#"
        CREATE TABLE documentation (
            id TEXT PRIMARY KEY,
            activity_id TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            kind TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(activity_id) REFERENCES activity(id) ON DELETE CASCADE
        );
        "#,
        r#"
        CREATE TABLE documentation_photo (
            id TEXT PRIMARY KEY,
            documentation_id TEXT NOT NULL,
            file_path TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(documentation_id) REFERENCES documentation(id) ON DELETE CASCADE
        );
        "#,
        r#"
        CREATE TABLE contract (
            activity_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            file_path TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(activity_id) REFERENCES activity(id) ON DELETE CASCADE
        );
        "#,
        r#"
        CREATE TABLE completion_report (
            activity_id TEXT PRIMARY KEY,
            file_path TEXT NOT NULL,
            note TEXT,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(activity_id) REFERENCES activity(id) ON DELETE CASCADE
        );
        "#,
    ] {
        db.execute(Statement::from_string(DatabaseBackend::Sqlite, ddl))
            .await
            .unwrap();
    }
}
