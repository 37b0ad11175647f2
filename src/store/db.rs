// Cofre — Persistence gateway
//
// A bounded r2d2 pool of SQLite connections. The handle is built once at
// start-up and lent to every component; there is no ambient connection.
// Every connection is opened with foreign keys on, WAL journaling, a busy
// timeout (the statement time bound) and the `fold()` search helper.

use chrono::{DateTime, SecondsFormat, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, OptionalExtension, Params, Row, Transaction, TransactionBehavior};

use crate::config::CofreConfig;

use super::StoreError;

pub type PooledConn = PooledConnection<SqliteConnectionManager>;

/// Tables every healthy database must have.
pub const TABLES: [&str; 5] = [
    "usuarios",
    "localidades",
    "categorias_senha",
    "cofre_senhas",
    "log_atividades",
];

/// Pooled handle to the relational store. Cloning shares the same pool.
#[derive(Clone)]
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    /// Open (or create) the database described by `config` and run migrations.
    pub fn open(config: &CofreConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let busy_timeout = config.statement_timeout;
        let manager = SqliteConnectionManager::file(&config.database_path).with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })?;
            register_functions(conn)
        });

        let pool = Pool::builder()
            .max_size(config.max_connections)
            .min_idle(Some(1))
            .connection_timeout(config.acquire_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .build(manager)?;

        let db = Self { pool };
        db.run_migrations()?;

        tracing::info!(
            path = %config.database_path.display(),
            max_connections = config.max_connections,
            "Database pool ready"
        );
        Ok(db)
    }

    /// Check out a connection, bounded by the acquire timeout.
    pub fn conn(&self) -> Result<PooledConn, StoreError> {
        self.pool.get().map_err(|e| {
            tracing::warn!(error = %e, "Timed out waiting for a database connection");
            StoreError::from(e)
        })
    }

    /// Run one statement on a pooled connection and return the affected row count.
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize, StoreError> {
        Ok(self.conn()?.execute(sql, params)?)
    }

    /// Run a single-row query; `None` when no row matched.
    pub fn query_opt<T, P, F>(&self, sql: &str, params: P, map: F) -> Result<Option<T>, StoreError>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        Ok(self.conn()?.query_row(sql, params, map).optional()?)
    }

    /// Run a query and collect every row.
    pub fn query_all<T, P, F>(&self, sql: &str, params: P, map: F) -> Result<Vec<T>, StoreError>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, map)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Run `work` inside one all-or-nothing transaction.
    ///
    /// The transaction starts with `BEGIN IMMEDIATE`, so it holds the write
    /// lock from its first statement. Check-then-write sequences inside `work`
    /// cannot interleave with another writer.
    pub fn transaction<T, F>(&self, work: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, StoreError>,
    {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = work(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Verify the store answers and that all tables exist.
    pub fn health_check(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;

        let missing: Vec<&str> = TABLES
            .iter()
            .copied()
            .filter(|table| !table_exists(&conn, table).unwrap_or(false))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            tracing::warn!(?missing, "Database is missing tables");
            Err(StoreError::Schema(format!("missing tables: {}", missing.join(", "))))
        }
    }

    /// Create or update the schema. Idempotent.
    fn run_migrations(&self) -> Result<(), StoreError> {
        self.conn()?.execute_batch(SCHEMA)?;
        tracing::debug!("Database migrations completed successfully");
        Ok(())
    }
}

fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get::<_, i64>(0),
    )
    .map(|n| n == 1)
}

/// `fold(text)`: Unicode lower-casing for case-insensitive search.
/// SQLite's own `lower()` and `LIKE` only fold ASCII.
fn register_functions(conn: &mut Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "fold",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| t.to_lowercase()))
        },
    )
}

// ─── Time columns ────────────────────────────────────────────────────────────

/// Timestamps are stored as fixed-width RFC 3339 UTC text so that string
/// comparison in SQL orders them chronologically.
pub fn sql_time(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_time(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub fn column_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_time(idx, &raw)
}

pub fn column_time_opt(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|r| parse_time(idx, &r)).transpose()
}

pub fn column_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<uuid::Uuid> {
    let raw: String = row.get(idx)?;
    uuid::Uuid::parse_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

// ─── Schema ──────────────────────────────────────────────────────────────────

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS usuarios (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid                TEXT NOT NULL UNIQUE,
    nome                TEXT NOT NULL,
    email               TEXT NOT NULL,
    senha               TEXT NOT NULL,
    nivel_acesso        TEXT NOT NULL DEFAULT 'viewer'
                        CHECK (nivel_acesso IN ('admin', 'editor', 'viewer')),
    ultimo_acesso       TEXT,
    ativo               INTEGER NOT NULL DEFAULT 1,
    data_criacao        TEXT NOT NULL,
    data_modificacao    TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_usuarios_email_ativo
    ON usuarios(email) WHERE ativo = 1;

CREATE TABLE IF NOT EXISTS localidades (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    codigo              TEXT NOT NULL,
    nome                TEXT NOT NULL,
    cnpj                TEXT,
    estado              TEXT,
    cidade              TEXT,
    endereco            TEXT,
    telefone            TEXT,
    email               TEXT,
    observacoes         TEXT,
    ativo               INTEGER NOT NULL DEFAULT 1,
    usuario_criacao     INTEGER REFERENCES usuarios(id),
    data_criacao        TEXT NOT NULL,
    data_modificacao    TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_localidades_codigo_ativo
    ON localidades(codigo) WHERE ativo = 1;

CREATE TABLE IF NOT EXISTS categorias_senha (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    nome                TEXT NOT NULL UNIQUE,
    descricao           TEXT,
    cor                 TEXT NOT NULL DEFAULT '#6c757d',
    icone               TEXT,
    ordem               INTEGER NOT NULL DEFAULT 0,
    ativo               INTEGER NOT NULL DEFAULT 1
);

INSERT OR IGNORE INTO categorias_senha (nome, descricao, cor, icone, ordem) VALUES
    ('network',     'Routers, switches, firewalls, VPN',  '#0d6efd', 'router',   1),
    ('server',      'Servers and hypervisors',            '#6610f2', 'server',   2),
    ('database',    'Database accounts',                  '#198754', 'database', 3),
    ('email',       'Mailboxes and mail relays',          '#fd7e14', 'envelope', 4),
    ('application', 'Business applications and portals',  '#20c997', 'window',   5),
    ('cloud',       'Cloud consoles and API keys',        '#0dcaf0', 'cloud',    6),
    ('other',       'Everything else',                    '#6c757d', 'key',      99);

CREATE TABLE IF NOT EXISTS cofre_senhas (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid                TEXT NOT NULL UNIQUE,
    localidade_id       INTEGER NOT NULL REFERENCES localidades(id),
    categoria_id        INTEGER NOT NULL REFERENCES categorias_senha(id),
    titulo              TEXT NOT NULL,
    usuario             TEXT NOT NULL,
    senha               BLOB NOT NULL,
    url                 TEXT,
    observacoes         TEXT,
    tags                TEXT NOT NULL DEFAULT '[]',
    favorito            INTEGER NOT NULL DEFAULT 0,
    usuario_criacao     INTEGER NOT NULL REFERENCES usuarios(id),
    usuario_modificacao INTEGER REFERENCES usuarios(id),
    data_criacao        TEXT NOT NULL,
    data_modificacao    TEXT NOT NULL,
    data_ultimo_acesso  TEXT,
    contador_acessos    INTEGER NOT NULL DEFAULT 0 CHECK (contador_acessos >= 0),
    expira_em           TEXT,
    requer_mudanca      INTEGER NOT NULL DEFAULT 0,
    ativo               INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_cofre_senhas_localidade ON cofre_senhas(localidade_id);
CREATE INDEX IF NOT EXISTS idx_cofre_senhas_categoria ON cofre_senhas(categoria_id);
CREATE INDEX IF NOT EXISTS idx_cofre_senhas_expira_em ON cofre_senhas(expira_em);

CREATE TABLE IF NOT EXISTS log_atividades (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    usuario_id          INTEGER,
    tipo_acao           TEXT NOT NULL
                        CHECK (tipo_acao IN ('CREATE', 'READ', 'UPDATE', 'DELETE', 'LOGIN')),
    tabela_afetada      TEXT NOT NULL,
    registro_id         INTEGER,
    descricao           TEXT NOT NULL,
    ip_address          TEXT,
    user_agent          TEXT,
    dados_anteriores    TEXT,
    dados_novos         TEXT,
    data_acao           TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_log_atividades_registro
    ON log_atividades(tabela_afetada, registro_id);

CREATE TRIGGER IF NOT EXISTS trg_log_atividades_no_update
    BEFORE UPDATE ON log_atividades
BEGIN
    SELECT RAISE(ABORT, 'log_atividades is append-only');
END;

CREATE TRIGGER IF NOT EXISTS trg_log_atividades_no_delete
    BEFORE DELETE ON log_atividades
BEGIN
    SELECT RAISE(ABORT, 'log_atividades is append-only');
END;
";

// ─── Test helpers ────────────────────────────────────────────────────────────

#[cfg(test)]
impl Database {
    /// A file-backed database in a fresh temporary directory.
    /// Keep the returned `TempDir` alive for as long as the database is used.
    pub fn open_temp() -> (tempfile::TempDir, Self) {
        let dir = tempfile::tempdir().unwrap();
        let db = Self::open_at(&dir.path().join("cofre.db"));
        (dir, db)
    }

    pub fn open_at(path: &std::path::Path) -> Self {
        let config = CofreConfig {
            database_path: path.to_path_buf(),
            max_connections: 8,
            password_cost: crate::enclave::PasswordCost::minimal(),
            ..CofreConfig::default()
        };
        Self::open(&config).unwrap()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
