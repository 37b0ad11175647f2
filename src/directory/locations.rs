// Cofre — Location directory
//
// Organisational sites that vault entries are filed under. The public code is
// unique among active locations, and a location cannot be retired while any
// active vault entry still points at it.

use chrono::{DateTime, Duration, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::store::audit::tables;
use crate::store::update::{self, FieldKind, FieldSpec};
use crate::store::{
    column_time, column_time_opt, sql_time, ActionKind, ActivityRecord, AuditLogger, Database, StoreError,
};

/// Digits in a Brazilian company tax id (CNPJ).
pub const TAX_ID_DIGITS: usize = 14;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: i64,
    pub code: String,
    pub name: String,
    /// Digits only; see `format_tax_id` for display.
    pub tax_id: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub notes: Option<String>,
    pub active: bool,
    pub created_by: Option<i64>,
    pub created_by_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewLocation {
    pub code: String,
    pub name: String,
    pub tax_id: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub notes: Option<String>,
}

impl NewLocation {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationStats {
    pub active_entries: i64,
    pub favorite_entries: i64,
    pub entries_last_30_days: i64,
    pub last_entry_access: Option<DateTime<Utc>>,
}

const LOCATION_COLUMNS: &str = "l.id, l.codigo, l.nome, l.cnpj, l.estado, l.cidade, l.endereco, l.telefone,
       l.email, l.observacoes, l.ativo, l.usuario_criacao, u.nome, l.data_criacao, l.data_modificacao";

const LOCATION_FROM: &str = "localidades l LEFT JOIN usuarios u ON u.id = l.usuario_criacao";

const LOCATION_FIELDS: &[FieldSpec] = &[
    FieldSpec::new(
        "code",
        "codigo",
        FieldKind::Normalized {
            required: true,
            normalize: normalize_code,
        },
    ),
    FieldSpec::new("name", "nome", FieldKind::RequiredText),
    FieldSpec::new(
        "tax_id",
        "cnpj",
        FieldKind::Normalized {
            required: false,
            normalize: normalize_tax_id,
        },
    ),
    FieldSpec::new("region", "estado", FieldKind::OptionalText),
    FieldSpec::new("city", "cidade", FieldKind::OptionalText),
    FieldSpec::new("address", "endereco", FieldKind::OptionalText),
    FieldSpec::new("phone", "telefone", FieldKind::OptionalText),
    FieldSpec::new("email", "email", FieldKind::OptionalText),
    FieldSpec::new("notes", "observacoes", FieldKind::OptionalText),
];

pub struct LocationDirectory<'a> {
    db: &'a Database,
    audit: AuditLogger<'a>,
}

impl<'a> LocationDirectory<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            audit: AuditLogger::new(db),
        }
    }

    fn row_to_location(row: &rusqlite::Row<'_>) -> rusqlite::Result<Location> {
        Ok(Location {
            id: row.get(0)?,
            code: row.get(1)?,
            name: row.get(2)?,
            tax_id: row.get(3)?,
            region: row.get(4)?,
            city: row.get(5)?,
            address: row.get(6)?,
            phone: row.get(7)?,
            email: row.get(8)?,
            notes: row.get(9)?,
            active: row.get(10)?,
            created_by: row.get(11)?,
            created_by_name: row.get(12)?,
            created_at: column_time(row, 13)?,
            modified_at: column_time(row, 14)?,
        })
    }

    fn fetch(conn: &Connection, id: i64) -> Result<Option<Location>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE l.id = ?1 AND l.ativo = 1",
            LOCATION_COLUMNS, LOCATION_FROM
        );
        Ok(conn.query_row(&sql, [id], Self::row_to_location).optional()?)
    }

    fn select(&self, filter: &str, tail: &str, values: Vec<Value>) -> Result<Vec<Location>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE l.ativo = 1 {} {}",
            LOCATION_COLUMNS, LOCATION_FROM, filter, tail
        );
        self.db.query_all(&sql, params_from_iter(values), Self::row_to_location)
    }

    pub fn create(&self, new: NewLocation, actor: i64) -> Result<Location, StoreError> {
        let code = normalize_code(&new.code)?;
        let name = new.name.trim();
        if name.is_empty() {
            return Err(StoreError::Validation("name is required".to_string()));
        }
        let tax_id = match new.tax_id.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            Some(raw) => Some(normalize_tax_id(raw)?),
            None => None,
        };
        let optional = |v: &Option<String>| update::optional_text(v.as_deref().unwrap_or(""));
        let now = sql_time(&Utc::now());

        let location = self.db.transaction(|tx| {
            ensure_code_free(tx, &code, None)?;
            tx.execute(
                "INSERT INTO localidades
                    (codigo, nome, cnpj, estado, cidade, endereco, telefone, email, observacoes,
                     usuario_criacao, data_criacao, data_modificacao)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
                params![
                    code,
                    name,
                    tax_id,
                    optional(&new.region),
                    optional(&new.city),
                    optional(&new.address),
                    optional(&new.phone),
                    optional(&new.email),
                    optional(&new.notes),
                    actor,
                    now,
                ],
            )?;
            let id = tx.last_insert_rowid();
            Self::fetch(tx, id)?.ok_or_else(|| not_found(id))
        })?;

        self.audit.record(ActivityRecord::new(
            actor,
            ActionKind::Create,
            tables::LOCATIONS,
            location.id,
            format!("Location created: {}", location.name),
        ));
        tracing::info!(location_id = location.id, code = %location.code, actor = actor, "Location created");
        Ok(location)
    }

    pub fn find_by_id(&self, id: i64) -> Result<Location, StoreError> {
        Self::fetch(&*self.db.conn()?, id)?.ok_or_else(|| not_found(id))
    }

    pub fn find_by_code(&self, code: &str) -> Result<Location, StoreError> {
        let code = code.trim().to_string();
        self.select("AND l.codigo = ?", "", vec![Value::Text(code.clone())])?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(format!("location {}", code)))
    }

    /// Active locations ordered by name.
    pub fn list(&self, limit: u32, offset: u32) -> Result<Vec<Location>, StoreError> {
        self.select(
            "",
            "ORDER BY l.nome, l.id LIMIT ? OFFSET ?",
            vec![Value::Integer(i64::from(limit)), Value::Integer(i64::from(offset))],
        )
    }

    pub fn count(&self) -> Result<i64, StoreError> {
        let total: Option<i64> = self
            .db
            .query_opt("SELECT count(*) FROM localidades WHERE ativo = 1", [], |row| row.get(0))?;
        Ok(total.unwrap_or(0))
    }

    /// Case-insensitive substring over code, name, city and tax id.
    pub fn search(&self, term: &str, limit: u32) -> Result<Vec<Location>, StoreError> {
        let term = term.trim().to_lowercase();
        self.select(
            "AND (instr(fold(l.codigo), ?1) > 0 OR instr(fold(l.nome), ?1) > 0
                  OR instr(fold(coalesce(l.cidade, '')), ?1) > 0 OR instr(coalesce(l.cnpj, ''), ?1) > 0)",
            "ORDER BY l.nome, l.id LIMIT ?2",
            vec![Value::Text(term), Value::Integer(i64::from(limit))],
        )
    }

    /// Locations in one region, by city then name.
    pub fn find_by_region(&self, region: &str) -> Result<Vec<Location>, StoreError> {
        self.select(
            "AND l.estado = ?",
            "ORDER BY l.cidade, l.nome",
            vec![Value::Text(region.trim().to_string())],
        )
    }

    /// Locations in one city of a region, by name.
    pub fn find_by_city(&self, region: &str, city: &str) -> Result<Vec<Location>, StoreError> {
        self.select(
            "AND l.estado = ? AND l.cidade = ?",
            "ORDER BY l.nome, l.id",
            vec![
                Value::Text(region.trim().to_string()),
                Value::Text(city.trim().to_string()),
            ],
        )
    }

    /// Distinct regions with at least one active location.
    pub fn regions(&self) -> Result<Vec<String>, StoreError> {
        self.db.query_all(
            "SELECT DISTINCT estado FROM localidades
             WHERE ativo = 1 AND estado IS NOT NULL ORDER BY estado",
            [],
            |row| row.get(0),
        )
    }

    pub fn cities(&self, region: &str) -> Result<Vec<String>, StoreError> {
        self.db.query_all(
            "SELECT DISTINCT cidade FROM localidades
             WHERE ativo = 1 AND estado = ?1 AND cidade IS NOT NULL ORDER BY cidade",
            [region.trim()],
            |row| row.get(0),
        )
    }

    /// Apply the whitelisted keys of `fields`. Unknown keys are ignored.
    pub fn update(&self, id: i64, fields: &Map<String, JsonValue>, actor: i64) -> Result<Location, StoreError> {
        let mut columns: Vec<(&'static str, Value)> = update::collect(LOCATION_FIELDS, fields)?
            .into_iter()
            .filter_map(update::Assignment::into_set)
            .collect();
        if columns.is_empty() {
            return Err(StoreError::NoOp);
        }
        let new_code = columns.iter().find_map(|(column, value)| match (column, value) {
            (&"codigo", Value::Text(code)) => Some(code.clone()),
            _ => None,
        });
        columns.push(("data_modificacao", Value::Text(sql_time(&Utc::now()))));

        let (set, mut values) = update::set_clause(columns);
        values.push(Value::Integer(id));
        let sql = format!("UPDATE localidades SET {} WHERE id = ? AND ativo = 1", set);

        let (before, after) = self.db.transaction(|tx| {
            let before = Self::fetch(tx, id)?.ok_or_else(|| not_found(id))?;
            if let Some(code) = &new_code {
                ensure_code_free(tx, code, Some(id))?;
            }
            tx.execute(&sql, params_from_iter(values))?;
            let after = Self::fetch(tx, id)?.ok_or_else(|| not_found(id))?;
            Ok((before, after))
        })?;

        self.audit.record(
            ActivityRecord::new(
                actor,
                ActionKind::Update,
                tables::LOCATIONS,
                id,
                format!("Location updated: {}", after.name),
            )
            .snapshots(serde_json::to_value(&before).ok(), serde_json::to_value(&after).ok()),
        );
        tracing::info!(location_id = id, actor = actor, "Location updated");
        Ok(after)
    }

    /// Soft-delete. The reference check and the flag flip run in one
    /// transaction holding the write lock, so no entry can be filed under the
    /// location in between.
    pub fn deactivate(&self, id: i64, actor: i64) -> Result<(), StoreError> {
        let now = sql_time(&Utc::now());
        let location = self.db.transaction(|tx| {
            let location = Self::fetch(tx, id)?.ok_or_else(|| not_found(id))?;
            let in_use: i64 = tx.query_row(
                "SELECT count(*) FROM cofre_senhas WHERE localidade_id = ?1 AND ativo = 1",
                [id],
                |row| row.get(0),
            )?;
            if in_use > 0 {
                return Err(StoreError::ReferenceInUse {
                    what: format!("location {}", location.code),
                    count: in_use,
                });
            }
            tx.execute(
                "UPDATE localidades SET ativo = 0, data_modificacao = ?1 WHERE id = ?2",
                params![now, id],
            )?;
            Ok(location)
        })?;

        self.audit.record(ActivityRecord::new(
            actor,
            ActionKind::Delete,
            tables::LOCATIONS,
            id,
            format!("Location deactivated: {}", location.name),
        ));
        tracing::info!(location_id = id, actor = actor, "Location deactivated");
        Ok(())
    }

    /// Restore a deactivated location, unless its code was taken meanwhile.
    pub fn reactivate(&self, id: i64, actor: i64) -> Result<Location, StoreError> {
        let now = sql_time(&Utc::now());
        let location = self.db.transaction(|tx| {
            let code: String = tx
                .query_row("SELECT codigo FROM localidades WHERE id = ?1 AND ativo = 0", [id], |row| row.get(0))
                .optional()?
                .ok_or_else(|| StoreError::NotFound(format!("inactive location {}", id)))?;
            ensure_code_free(tx, &code, Some(id))?;
            tx.execute(
                "UPDATE localidades SET ativo = 1, data_modificacao = ?1 WHERE id = ?2",
                params![now, id],
            )?;
            Self::fetch(tx, id)?.ok_or_else(|| not_found(id))
        })?;

        self.audit.record(ActivityRecord::new(
            actor,
            ActionKind::Update,
            tables::LOCATIONS,
            id,
            format!("Location reactivated: {}", location.name),
        ));
        tracing::info!(location_id = id, actor = actor, "Location reactivated");
        Ok(location)
    }

    /// Figures over the active entries filed under this location.
    pub fn stats(&self, id: i64) -> Result<LocationStats, StoreError> {
        self.find_by_id(id)?;
        let month_ago = sql_time(&(Utc::now() - Duration::days(30)));

        let stats = self.db.query_opt(
            "SELECT count(*),
                    coalesce(sum(favorito), 0),
                    coalesce(sum(CASE WHEN data_criacao >= ?2 THEN 1 ELSE 0 END), 0),
                    max(data_ultimo_acesso)
             FROM cofre_senhas
             WHERE localidade_id = ?1 AND ativo = 1",
            params![id, month_ago],
            |row| {
                Ok(LocationStats {
                    active_entries: row.get(0)?,
                    favorite_entries: row.get(1)?,
                    entries_last_30_days: row.get(2)?,
                    last_entry_access: column_time_opt(row, 3)?,
                })
            },
        )?;
        stats.ok_or_else(|| not_found(id))
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn not_found(id: i64) -> StoreError {
    StoreError::NotFound(format!("location {}", id))
}

fn normalize_code(raw: &str) -> Result<String, StoreError> {
    let code = raw.trim();
    if code.is_empty() {
        Err(StoreError::Validation("code is required".to_string()))
    } else {
        Ok(code.to_string())
    }
}

/// Strip punctuation; the remainder must be exactly 14 digits.
pub fn normalize_tax_id(raw: &str) -> Result<String, StoreError> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    let only_punctuation = raw
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '/' | '-' | ' '));
    if digits.len() == TAX_ID_DIGITS && only_punctuation {
        Ok(digits)
    } else {
        Err(StoreError::Validation(format!(
            "tax id must have {} digits, got '{}'",
            TAX_ID_DIGITS,
            raw.trim()
        )))
    }
}

/// `NN.NNN.NNN/NNNN-NN` for a normalised tax id; anything else is returned as is.
pub fn format_tax_id(tax_id: &str) -> String {
    if tax_id.len() != TAX_ID_DIGITS || !tax_id.chars().all(|c| c.is_ascii_digit()) {
        return tax_id.to_string();
    }
    format!(
        "{}.{}.{}/{}-{}",
        &tax_id[0..2],
        &tax_id[2..5],
        &tax_id[5..8],
        &tax_id[8..12],
        &tax_id[12..14]
    )
}

fn ensure_code_free(conn: &Connection, code: &str, except: Option<i64>) -> Result<(), StoreError> {
    let taken = conn
        .query_row(
            "SELECT 1 FROM localidades WHERE codigo = ?1 AND ativo = 1 AND id != ?2",
            params![code, except.unwrap_or(-1)],
            |_| Ok(()),
        )
        .optional()?;
    match taken {
        Some(()) => Err(StoreError::Duplicate(format!("location code {}", code))),
        None => Ok(()),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{NewVaultEntry, SqliteVaultStore, VaultEntryStore};
    use crate::test_support::{audit_count, category_id, seed_user, test_cipher};
    use serde_json::json;

    fn setup() -> (tempfile::TempDir, Database, i64) {
        let (dir, db) = Database::open_temp();
        let actor = seed_user(&db, "Ana", "ana@example.com", "admin");
        (dir, db, actor)
    }

    fn sao_paulo() -> NewLocation {
        NewLocation {
            tax_id: Some("12.345.678/0001-95".to_string()),
            region: Some("SP".to_string()),
            city: Some("São Paulo".to_string()),
            ..NewLocation::new("SP01", "São Paulo HQ")
        }
    }

    #[test]
    fn test_create_normalizes_tax_id_and_records_creator() {
        let (_dir, db, actor) = setup();
        let location = LocationDirectory::new(&db).create(sao_paulo(), actor).unwrap();

        assert_eq!(location.code, "SP01");
        assert_eq!(location.tax_id.as_deref(), Some("12345678000195"));
        assert_eq!(location.created_by_name.as_deref(), Some("Ana"));
        assert_eq!(format_tax_id(location.tax_id.as_deref().unwrap()), "12.345.678/0001-95");
        assert_eq!(audit_count(&db, tables::LOCATIONS, location.id, "CREATE"), 1);
    }

    #[test]
    fn test_create_rejects_bad_tax_id_and_blank_fields() {
        let (_dir, db, actor) = setup();
        let dir = LocationDirectory::new(&db);

        let mut bad = sao_paulo();
        bad.tax_id = Some("123".to_string());
        assert!(matches!(dir.create(bad, actor), Err(StoreError::Validation(_))));
        assert!(matches!(dir.create(NewLocation::new(" ", "x"), actor), Err(StoreError::Validation(_))));
        assert!(matches!(dir.create(NewLocation::new("X", ""), actor), Err(StoreError::Validation(_))));
    }

    #[test]
    fn test_duplicate_active_code_is_rejected() {
        let (_dir, db, actor) = setup();
        let dir = LocationDirectory::new(&db);
        dir.create(sao_paulo(), actor).unwrap();
        assert!(matches!(
            dir.create(NewLocation::new("SP01", "Other"), actor),
            Err(StoreError::Duplicate(_))
        ));
    }

    #[test]
    fn test_deactivate_blocked_while_entries_reference_location() {
        let (_dir, db, actor) = setup();
        let dir = LocationDirectory::new(&db);
        let location = dir.create(sao_paulo(), actor).unwrap();

        let cipher = test_cipher();
        let store = SqliteVaultStore::new(&db, &cipher);
        let network = category_id(&db, "network");
        let a = store
            .create(NewVaultEntry::new(location.id, network, "Router Admin", "admin", "s3cret"), actor)
            .unwrap();
        let b = store
            .create(NewVaultEntry::new(location.id, network, "Switch", "admin", "s3cret"), actor)
            .unwrap();

        match dir.deactivate(location.id, actor) {
            Err(StoreError::ReferenceInUse { count, .. }) => assert_eq!(count, 2),
            other => panic!("expected ReferenceInUse, got {:?}", other),
        }
        assert!(dir.find_by_id(location.id).is_ok());

        store.deactivate(a.id, actor).unwrap();
        assert!(matches!(
            dir.deactivate(location.id, actor),
            Err(StoreError::ReferenceInUse { count: 1, .. })
        ));

        store.deactivate(b.id, actor).unwrap();
        dir.deactivate(location.id, actor).unwrap();
        assert!(matches!(dir.find_by_id(location.id), Err(StoreError::NotFound(_))));
        assert_eq!(audit_count(&db, tables::LOCATIONS, location.id, "DELETE"), 1);
    }

    #[test]
    fn test_reactivate_fails_when_code_was_taken() {
        let (_dir, db, actor) = setup();
        let dir = LocationDirectory::new(&db);
        let old = dir.create(sao_paulo(), actor).unwrap();
        dir.deactivate(old.id, actor).unwrap();
        let new = dir.create(NewLocation::new("SP01", "New HQ"), actor).unwrap();

        assert!(matches!(dir.reactivate(old.id, actor), Err(StoreError::Duplicate(_))));

        dir.deactivate(new.id, actor).unwrap();
        assert!(dir.reactivate(old.id, actor).unwrap().active);
        assert!(matches!(dir.reactivate(old.id, actor), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_update_whitelist() {
        let (_dir, db, actor) = setup();
        let dir = LocationDirectory::new(&db);
        let location = dir.create(sao_paulo(), actor).unwrap();
        dir.create(NewLocation::new("RJ01", "Rio"), actor).unwrap();

        let body = |v: JsonValue| v.as_object().unwrap().clone();

        let updated = dir
            .update(location.id, &body(json!({"name": "SP Matriz", "tax_id": "", "ativo": 0})), actor)
            .unwrap();
        assert_eq!(updated.name, "SP Matriz");
        assert_eq!(updated.tax_id, None);
        assert!(updated.active);

        assert!(matches!(
            dir.update(location.id, &body(json!({"code": "RJ01"})), actor),
            Err(StoreError::Duplicate(_))
        ));
        assert!(matches!(
            dir.update(location.id, &body(json!({"usuario_criacao": 9})), actor),
            Err(StoreError::NoOp)
        ));
        // Keeping its own code is not a conflict
        assert!(dir.update(location.id, &body(json!({"code": "SP01"})), actor).is_ok());
    }

    #[test]
    fn test_search_region_and_city_queries() {
        let (_dir, db, actor) = setup();
        let dir = LocationDirectory::new(&db);
        dir.create(sao_paulo(), actor).unwrap();
        dir.create(
            NewLocation {
                region: Some("SP".to_string()),
                city: Some("Campinas".to_string()),
                ..NewLocation::new("SP02", "Campinas Branch")
            },
            actor,
        )
        .unwrap();
        dir.create(
            NewLocation {
                region: Some("RJ".to_string()),
                city: Some("Rio de Janeiro".to_string()),
                ..NewLocation::new("RJ01", "Rio Office")
            },
            actor,
        )
        .unwrap();

        assert_eq!(dir.count().unwrap(), 3);
        assert_eq!(dir.search("SÃO", 10).unwrap().len(), 1);
        assert_eq!(dir.search("sp0", 10).unwrap().len(), 2);
        assert_eq!(dir.search("12345678", 10).unwrap().len(), 1);
        assert_eq!(dir.regions().unwrap(), vec!["RJ", "SP"]);
        assert_eq!(dir.cities("SP").unwrap(), vec!["Campinas", "São Paulo"]);
        assert_eq!(
            dir.find_by_region("SP").unwrap().iter().map(|l| l.code.as_str()).collect::<Vec<_>>(),
            vec!["SP02", "SP01"]
        );
        assert_eq!(dir.find_by_code("RJ01").unwrap().name, "Rio Office");
        let names: Vec<_> = dir.list(2, 0).unwrap().into_iter().map(|l| l.name).collect();
        assert_eq!(names, vec!["Campinas Branch", "Rio Office"]);
    }

    #[test]
    fn test_find_by_city_matches_region_and_city() {
        let (_dir, db, actor) = setup();
        let dir = LocationDirectory::new(&db);
        dir.create(sao_paulo(), actor).unwrap();
        let annex = dir
            .create(
                NewLocation {
                    region: Some("SP".to_string()),
                    city: Some("São Paulo".to_string()),
                    ..NewLocation::new("SP03", "Paulista Annex")
                },
                actor,
            )
            .unwrap();
        dir.create(
            NewLocation {
                region: Some("RJ".to_string()),
                city: Some("São Paulo".to_string()),
                ..NewLocation::new("RJ09", "Namesake Office")
            },
            actor,
        )
        .unwrap();

        let codes = |found: Vec<Location>| found.into_iter().map(|l| l.code).collect::<Vec<_>>();
        assert_eq!(codes(dir.find_by_city(" SP ", "São Paulo ").unwrap()), vec!["SP03", "SP01"]);
        assert!(dir.find_by_city("SP", "Campinas").unwrap().is_empty());

        dir.deactivate(annex.id, actor).unwrap();
        assert_eq!(codes(dir.find_by_city("SP", "São Paulo").unwrap()), vec!["SP01"]);
    }

    #[test]
    fn test_stats_over_active_entries() {
        let (_dir, db, actor) = setup();
        let dir = LocationDirectory::new(&db);
        let location = dir.create(sao_paulo(), actor).unwrap();

        let cipher = test_cipher();
        let store = SqliteVaultStore::new(&db, &cipher);
        let network = category_id(&db, "network");
        let a = store
            .create(NewVaultEntry::new(location.id, network, "A", "admin", "pw"), actor)
            .unwrap();
        store
            .create(NewVaultEntry::new(location.id, network, "B", "admin", "pw"), actor)
            .unwrap();
        store.toggle_favorite(a.id, actor).unwrap();
        store.record_access(a.id, actor, None).unwrap();

        let stats = dir.stats(location.id).unwrap();
        assert_eq!(stats.active_entries, 2);
        assert_eq!(stats.favorite_entries, 1);
        assert_eq!(stats.entries_last_30_days, 2);
        assert!(stats.last_entry_access.is_some());
    }

    #[test]
    fn test_format_tax_id_leaves_unexpected_input() {
        assert_eq!(format_tax_id("123"), "123");
        assert_eq!(format_tax_id("11222333000181"), "11.222.333/0001-81");
    }
}
