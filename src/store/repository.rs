// Cofre — Vault entry repository
//
// CRUD, search, access tracking and soft-delete over `cofre_senhas`.
// Key design decision: no read returns the secret. The sealed bytes are only
// opened by `reveal_secret()`, which records the access (counter, timestamp
// and a READ activity) before handing the plaintext out.

use chrono::{DateTime, Duration, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::enclave::SecretCipher;

use super::audit::{tables, ActionKind, ActivityRecord, AuditLogger};
use super::db::{column_time, column_time_opt, column_uuid, sql_time, Database};
use super::filters::{expiry_window, EntryFilters};
use super::models::{EntryStats, NewVaultEntry, Page, VaultEntry};
use super::update::{self, Assignment, FieldKind, FieldSpec};
use super::StoreError;

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over vault entry storage operations.
pub trait VaultEntryStore {
    /// Create an entry against an active location and category.
    fn create(&self, entry: NewVaultEntry, actor: i64) -> Result<VaultEntry, StoreError>;

    /// Active entry by surrogate id.
    fn find_by_id(&self, id: i64) -> Result<VaultEntry, StoreError>;

    /// Active entry by public identifier.
    fn find_by_uuid(&self, uuid: &Uuid) -> Result<VaultEntry, StoreError>;

    fn list(&self, limit: u32, offset: u32, filters: &EntryFilters) -> Result<Vec<VaultEntry>, StoreError>;

    /// Number of entries matching exactly the rows `list()` would page through.
    fn count(&self, filters: &EntryFilters) -> Result<i64, StoreError>;

    /// `list()` and `count()` evaluated against the same instant.
    fn page(&self, limit: u32, offset: u32, filters: &EntryFilters) -> Result<Page<VaultEntry>, StoreError>;

    /// Apply the whitelisted keys of `fields`. Unknown keys are ignored.
    fn update(&self, id: i64, fields: &Map<String, JsonValue>, actor: i64) -> Result<VaultEntry, StoreError>;

    /// Count one access of the secret and stamp the access time.
    fn record_access(&self, id: i64, actor: i64, origin: Option<&str>) -> Result<VaultEntry, StoreError>;

    /// The plaintext secret. Records the access first.
    fn reveal_secret(&self, id: i64, actor: i64, origin: Option<&str>) -> Result<Zeroizing<String>, StoreError>;

    fn toggle_favorite(&self, id: i64, actor: i64) -> Result<VaultEntry, StoreError>;

    /// Soft-delete.
    fn deactivate(&self, id: i64, actor: i64) -> Result<(), StoreError>;

    /// Restore a soft-deleted entry.
    fn reactivate(&self, id: i64, actor: i64) -> Result<VaultEntry, StoreError>;

    /// Entries expiring between now and `within_days` from now, soonest first.
    /// Windows past the latest storable time are clamped to it.
    fn find_expiring(&self, within_days: i64) -> Result<Vec<VaultEntry>, StoreError>;

    /// Reveal history from the activity log.
    fn stats(&self, id: i64) -> Result<EntryStats, StoreError>;
}

// ─── Field whitelist ─────────────────────────────────────────────────────────

const LOCATIONS: &str = "localidades";
const CATEGORIES: &str = "categorias_senha";
const USERS: &str = "usuarios";

/// The only fields `update()` may touch.
pub const ENTRY_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("location_id", "localidade_id", FieldKind::Reference { table: LOCATIONS }),
    FieldSpec::new("category_id", "categoria_id", FieldKind::Reference { table: CATEGORIES }),
    FieldSpec::new("title", "titulo", FieldKind::RequiredText),
    FieldSpec::new("login", "usuario", FieldKind::RequiredText),
    FieldSpec::new("url", "url", FieldKind::OptionalText),
    FieldSpec::new("notes", "observacoes", FieldKind::OptionalText),
    FieldSpec::new("tags", "tags", FieldKind::Tags),
    FieldSpec::new("favorite", "favorito", FieldKind::Flag),
    FieldSpec::new("requires_rotation", "requer_mudanca", FieldKind::Flag),
    FieldSpec::new("expires_at", "expira_em", FieldKind::Timestamp),
    FieldSpec::new("secret", "senha", FieldKind::Secret),
];

// ─── SQLite Implementation ──────────────────────────────────────────────────

const ENTRY_COLUMNS: &str = "cs.id, cs.uuid, cs.localidade_id, l.nome, cs.categoria_id, c.nome, c.cor,
       cs.titulo, cs.usuario, cs.url, cs.observacoes, cs.tags, cs.favorito,
       cs.usuario_criacao, u.nome, cs.usuario_modificacao, cs.data_criacao, cs.data_modificacao,
       cs.data_ultimo_acesso, cs.contador_acessos, cs.expira_em, cs.requer_mudanca, cs.ativo";

/// Shared by every entry query, including `count()`.
const ENTRY_FROM: &str = "cofre_senhas cs
       JOIN localidades l ON l.id = cs.localidade_id
       JOIN categorias_senha c ON c.id = cs.categoria_id
       JOIN usuarios u ON u.id = cs.usuario_criacao";

pub struct SqliteVaultStore<'a> {
    db: &'a Database,
    cipher: &'a SecretCipher,
    audit: AuditLogger<'a>,
}

impl<'a> SqliteVaultStore<'a> {
    pub fn new(db: &'a Database, cipher: &'a SecretCipher) -> Self {
        Self {
            db,
            cipher,
            audit: AuditLogger::new(db),
        }
    }

    /// Parse an entry row selected with `ENTRY_COLUMNS`.
    fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<VaultEntry> {
        let tags_json: String = row.get(11)?;
        let tags: Vec<String> = serde_json::from_str(&tags_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(11, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(VaultEntry {
            id: row.get(0)?,
            uuid: column_uuid(row, 1)?,
            location_id: row.get(2)?,
            location_name: row.get(3)?,
            category_id: row.get(4)?,
            category_name: row.get(5)?,
            category_color: row.get(6)?,
            title: row.get(7)?,
            login: row.get(8)?,
            url: row.get(9)?,
            notes: row.get(10)?,
            tags,
            favorite: row.get(12)?,
            created_by: row.get(13)?,
            created_by_name: row.get(14)?,
            modified_by: row.get(15)?,
            created_at: column_time(row, 16)?,
            modified_at: column_time(row, 17)?,
            last_accessed_at: column_time_opt(row, 18)?,
            access_count: row.get(19)?,
            expires_at: column_time_opt(row, 20)?,
            requires_rotation: row.get(21)?,
            active: row.get(22)?,
        })
    }

    /// Active entry by id on an already checked-out connection.
    fn fetch(conn: &Connection, id: i64) -> Result<Option<VaultEntry>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE cs.id = ?1 AND cs.ativo = 1",
            ENTRY_COLUMNS, ENTRY_FROM
        );
        Ok(conn.query_row(&sql, [id], Self::row_to_entry).optional()?)
    }

    fn list_at(
        &self,
        limit: u32,
        offset: u32,
        filters: &EntryFilters,
        now: DateTime<Utc>,
    ) -> Result<Vec<VaultEntry>, StoreError> {
        let predicate = filters.predicate(now);
        let sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY {} LIMIT ? OFFSET ?",
            ENTRY_COLUMNS,
            ENTRY_FROM,
            predicate.clause,
            filters.order_by()
        );

        let mut values = predicate.params;
        values.push(Value::Integer(i64::from(limit)));
        values.push(Value::Integer(i64::from(offset)));
        self.db.query_all(&sql, params_from_iter(values), Self::row_to_entry)
    }

    fn count_at(&self, filters: &EntryFilters, now: DateTime<Utc>) -> Result<i64, StoreError> {
        let predicate = filters.predicate(now);
        let sql = format!("SELECT count(*) FROM {} WHERE {}", ENTRY_FROM, predicate.clause);
        let total: Option<i64> = self
            .db
            .query_opt(&sql, params_from_iter(predicate.params), |row| row.get(0))?;
        Ok(total.unwrap_or(0))
    }

    /// Bump the counter and access time in one statement. Returns the title and
    /// the sealed secret of the touched row.
    fn touch(&self, id: i64, actor: i64, origin: Option<&str>) -> Result<(String, Vec<u8>), StoreError> {
        let now = sql_time(&Utc::now());
        let (title, sealed): (String, Vec<u8>) = self
            .db
            .query_opt(
                "UPDATE cofre_senhas
                 SET contador_acessos = contador_acessos + 1,
                     data_ultimo_acesso = max(coalesce(data_ultimo_acesso, ''), ?1)
                 WHERE id = ?2 AND ativo = 1
                 RETURNING titulo, senha",
                params![now, id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?
            .ok_or_else(|| not_found(id))?;

        self.audit.record(
            ActivityRecord::new(
                actor,
                ActionKind::Read,
                tables::VAULT_ENTRIES,
                id,
                format!("Vault entry accessed: {}", title),
            )
            .origin(origin),
        );
        tracing::info!(entry_id = id, actor = actor, "Vault entry accessed");
        Ok((title, sealed))
    }
}

impl<'a> VaultEntryStore for SqliteVaultStore<'a> {
    fn create(&self, entry: NewVaultEntry, actor: i64) -> Result<VaultEntry, StoreError> {
        let title = required("title", &entry.title)?;
        let login = required("login", &entry.login)?;
        if entry.secret.trim().is_empty() {
            return Err(StoreError::Validation("secret is required".to_string()));
        }

        let sealed = self.cipher.seal(&entry.secret)?;
        let tags = serde_json::to_string(&update::normalize_tags(entry.tags.iter().cloned()))?;
        let url = update::optional_text(entry.url.as_deref().unwrap_or(""));
        let notes = update::optional_text(entry.notes.as_deref().unwrap_or(""));
        let expires_at = entry.expires_at.as_ref().map(sql_time);
        let uuid = Uuid::new_v4();
        let now = sql_time(&Utc::now());

        let created = self.db.transaction(|tx| {
            ensure_active(tx, LOCATIONS, entry.location_id)?;
            ensure_active(tx, CATEGORIES, entry.category_id)?;
            ensure_active(tx, USERS, actor)?;

            tx.execute(
                "INSERT INTO cofre_senhas
                    (uuid, localidade_id, categoria_id, titulo, usuario, senha, url, observacoes,
                     tags, favorito, usuario_criacao, data_criacao, data_modificacao,
                     expira_em, requer_mudanca)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12, ?13, ?14)",
                params![
                    uuid.to_string(),
                    entry.location_id,
                    entry.category_id,
                    title,
                    login,
                    sealed,
                    url,
                    notes,
                    tags,
                    entry.favorite,
                    actor,
                    now,
                    expires_at,
                    entry.requires_rotation,
                ],
            )?;
            let id = tx.last_insert_rowid();
            Self::fetch(tx, id)?.ok_or_else(|| not_found(id))
        })?;

        self.audit.record(
            ActivityRecord::new(
                actor,
                ActionKind::Create,
                tables::VAULT_ENTRIES,
                created.id,
                format!("Vault entry created: {}", created.title),
            )
            .snapshots(None, snapshot(&created)),
        );
        tracing::info!(entry_id = created.id, uuid = %created.uuid, actor = actor, "Vault entry created");
        Ok(created)
    }

    fn find_by_id(&self, id: i64) -> Result<VaultEntry, StoreError> {
        Self::fetch(&*self.db.conn()?, id)?.ok_or_else(|| not_found(id))
    }

    fn find_by_uuid(&self, uuid: &Uuid) -> Result<VaultEntry, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE cs.uuid = ?1 AND cs.ativo = 1",
            ENTRY_COLUMNS, ENTRY_FROM
        );
        self.db
            .query_opt(&sql, [uuid.to_string()], Self::row_to_entry)?
            .ok_or_else(|| StoreError::NotFound(format!("vault entry {}", uuid)))
    }

    fn list(&self, limit: u32, offset: u32, filters: &EntryFilters) -> Result<Vec<VaultEntry>, StoreError> {
        self.list_at(limit, offset, filters, Utc::now())
    }

    fn count(&self, filters: &EntryFilters) -> Result<i64, StoreError> {
        self.count_at(filters, Utc::now())
    }

    fn page(&self, limit: u32, offset: u32, filters: &EntryFilters) -> Result<Page<VaultEntry>, StoreError> {
        let now = Utc::now();
        Ok(Page {
            items: self.list_at(limit, offset, filters, now)?,
            total: self.count_at(filters, now)?,
            limit,
            offset,
        })
    }

    fn update(&self, id: i64, fields: &Map<String, JsonValue>, actor: i64) -> Result<VaultEntry, StoreError> {
        let assignments = update::collect(ENTRY_FIELDS, fields)?;
        if assignments.is_empty() {
            return Err(StoreError::NoOp);
        }

        let mut columns = Vec::with_capacity(assignments.len() + 2);
        let mut references = Vec::new();
        for assignment in assignments {
            match assignment {
                Assignment::Set { column, value } => columns.push((column, value)),
                Assignment::Reference { column, table, id } => {
                    references.push((table, id));
                    columns.push((column, Value::Integer(id)));
                }
                Assignment::Secret { column, plaintext } => {
                    columns.push((column, Value::Blob(self.cipher.seal(&plaintext)?)));
                }
            }
        }
        columns.push(("usuario_modificacao", Value::Integer(actor)));
        columns.push(("data_modificacao", Value::Text(sql_time(&Utc::now()))));

        let (set, mut values) = update::set_clause(columns);
        values.push(Value::Integer(id));
        let sql = format!("UPDATE cofre_senhas SET {} WHERE id = ? AND ativo = 1", set);

        let (before, after) = self.db.transaction(|tx| {
            let before = Self::fetch(tx, id)?.ok_or_else(|| not_found(id))?;
            for (table, ref_id) in &references {
                ensure_active(tx, table, *ref_id)?;
            }
            tx.execute(&sql, params_from_iter(values))?;
            let after = Self::fetch(tx, id)?.ok_or_else(|| not_found(id))?;
            Ok((before, after))
        })?;

        self.audit.record(
            ActivityRecord::new(
                actor,
                ActionKind::Update,
                tables::VAULT_ENTRIES,
                id,
                format!("Vault entry updated: {}", after.title),
            )
            .snapshots(snapshot(&before), snapshot(&after)),
        );
        tracing::info!(entry_id = id, actor = actor, "Vault entry updated");
        Ok(after)
    }

    fn record_access(&self, id: i64, actor: i64, origin: Option<&str>) -> Result<VaultEntry, StoreError> {
        self.touch(id, actor, origin)?;
        self.find_by_id(id)
    }

    fn reveal_secret(&self, id: i64, actor: i64, origin: Option<&str>) -> Result<Zeroizing<String>, StoreError> {
        let (_, sealed) = self.touch(id, actor, origin)?;
        Ok(self.cipher.open(&sealed)?)
    }

    fn toggle_favorite(&self, id: i64, actor: i64) -> Result<VaultEntry, StoreError> {
        let (favorite, title): (bool, String) = self
            .db
            .query_opt(
                "UPDATE cofre_senhas SET favorito = NOT favorito
                 WHERE id = ?1 AND ativo = 1
                 RETURNING favorito, titulo",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?
            .ok_or_else(|| not_found(id))?;

        let description = if favorite {
            format!("Vault entry added to favorites: {}", title)
        } else {
            format!("Vault entry removed from favorites: {}", title)
        };
        self.audit.record(ActivityRecord::new(
            actor,
            ActionKind::Update,
            tables::VAULT_ENTRIES,
            id,
            description,
        ));
        tracing::info!(entry_id = id, favorite = favorite, "Vault entry favorite toggled");
        self.find_by_id(id)
    }

    fn deactivate(&self, id: i64, actor: i64) -> Result<(), StoreError> {
        let before = self.find_by_id(id)?;
        let changed = self.db.execute(
            "UPDATE cofre_senhas
             SET ativo = 0, usuario_modificacao = ?1, data_modificacao = ?2
             WHERE id = ?3 AND ativo = 1",
            params![actor, sql_time(&Utc::now()), id],
        )?;
        if changed == 0 {
            return Err(not_found(id));
        }

        self.audit.record(
            ActivityRecord::new(
                actor,
                ActionKind::Delete,
                tables::VAULT_ENTRIES,
                id,
                format!("Vault entry deactivated: {}", before.title),
            )
            .snapshots(snapshot(&before), None),
        );
        tracing::info!(entry_id = id, actor = actor, "Vault entry deactivated");
        Ok(())
    }

    fn reactivate(&self, id: i64, actor: i64) -> Result<VaultEntry, StoreError> {
        let now = sql_time(&Utc::now());
        let restored = self.db.transaction(|tx| {
            let (location_id, category_id): (i64, i64) = tx
                .query_row(
                    "SELECT localidade_id, categoria_id FROM cofre_senhas WHERE id = ?1 AND ativo = 0",
                    [id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?
                .ok_or_else(|| StoreError::NotFound(format!("inactive vault entry {}", id)))?;

            ensure_active(tx, LOCATIONS, location_id)?;
            ensure_active(tx, CATEGORIES, category_id)?;

            tx.execute(
                "UPDATE cofre_senhas
                 SET ativo = 1, usuario_modificacao = ?1, data_modificacao = ?2
                 WHERE id = ?3",
                params![actor, now, id],
            )?;
            Self::fetch(tx, id)?.ok_or_else(|| not_found(id))
        })?;

        self.audit.record(
            ActivityRecord::new(
                actor,
                ActionKind::Update,
                tables::VAULT_ENTRIES,
                id,
                format!("Vault entry reactivated: {}", restored.title),
            )
            .snapshots(None, snapshot(&restored)),
        );
        tracing::info!(entry_id = id, actor = actor, "Vault entry reactivated");
        Ok(restored)
    }

    fn find_expiring(&self, within_days: i64) -> Result<Vec<VaultEntry>, StoreError> {
        if within_days < 0 {
            return Err(StoreError::Validation("days must not be negative".to_string()));
        }
        let (window, values) = expiry_window(Utc::now(), within_days);
        let sql = format!(
            "SELECT {} FROM {} WHERE cs.ativo = 1 AND {} ORDER BY cs.expira_em ASC, cs.id ASC",
            ENTRY_COLUMNS, ENTRY_FROM, window
        );
        self.db.query_all(&sql, params_from_iter(values), Self::row_to_entry)
    }

    fn stats(&self, id: i64) -> Result<EntryStats, StoreError> {
        let entry = self.find_by_id(id)?;
        let week_ago = sql_time(&(Utc::now() - Duration::days(7)));

        let (total_reads, last_read_at, reads_last_7_days): (i64, Option<DateTime<Utc>>, i64) = self
            .db
            .query_opt(
                "SELECT count(*), max(data_acao),
                        coalesce(sum(CASE WHEN data_acao >= ?3 THEN 1 ELSE 0 END), 0)
                 FROM log_atividades
                 WHERE tabela_afetada = ?1 AND registro_id = ?2 AND tipo_acao = 'READ'",
                params![tables::VAULT_ENTRIES, id, week_ago],
                |row| Ok((row.get(0)?, column_time_opt(row, 1)?, row.get(2)?)),
            )?
            .unwrap_or((0, None, 0));

        Ok(EntryStats {
            total_reads,
            last_read_at,
            reads_last_7_days,
            access_count: entry.access_count,
        })
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn not_found(id: i64) -> StoreError {
    StoreError::NotFound(format!("vault entry {}", id))
}

fn required<'s>(field: &str, value: &'s str) -> Result<&'s str, StoreError> {
    let value = value.trim();
    if value.is_empty() {
        Err(StoreError::Validation(format!("{} is required", field)))
    } else {
        Ok(value)
    }
}

/// `ReferenceError` unless `table` has an active row with this id.
fn ensure_active(conn: &Connection, table: &str, id: i64) -> Result<(), StoreError> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?1 AND ativo = 1", table);
    let found = conn.query_row(&sql, [id], |_| Ok(())).optional()?;
    found.ok_or_else(|| {
        let noun = match table {
            LOCATIONS => "location",
            CATEGORIES => "category",
            USERS => "user",
            other => other,
        };
        StoreError::Reference(format!("{} {} does not exist or is inactive", noun, id))
    })
}

fn snapshot(entry: &VaultEntry) -> Option<JsonValue> {
    serde_json::to_value(entry).ok()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
