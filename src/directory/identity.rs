// Cofre — Identity directory
//
// Users, their access level and their password hash. Authentication is
// enumeration-safe: an unknown e-mail and a wrong password fail the same way.
// An unknown e-mail is verified against a decoy hash at the configured cost,
// so both paths cost exactly one verification.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use crate::enclave::{PasswordCost, PasswordHasher};
use crate::store::audit::tables;
use crate::store::update::{self, FieldKind, FieldSpec};
use crate::store::{
    column_time, column_time_opt, column_uuid, sql_time, ActionKind, ActivityRecord, AuditLogger, Database,
    StoreError,
};

/// Shortest password accepted for an identity.
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Admin,
    Editor,
    Viewer,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Admin => "admin",
            AccessLevel::Editor => "editor",
            AccessLevel::Viewer => "viewer",
        }
    }

    pub fn is_admin(&self) -> bool {
        *self == AccessLevel::Admin
    }

    pub fn can_edit(&self) -> bool {
        matches!(self, AccessLevel::Admin | AccessLevel::Editor)
    }

    pub fn is_viewer(&self) -> bool {
        *self == AccessLevel::Viewer
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessLevel {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(AccessLevel::Admin),
            "editor" => Ok(AccessLevel::Editor),
            "viewer" => Ok(AccessLevel::Viewer),
            other => Err(StoreError::Validation(format!(
                "access level must be admin, editor or viewer, got '{}'",
                other
            ))),
        }
    }
}

/// An identity as shown to callers. The password hash is never loaded into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub uuid: Uuid,
    pub name: String,
    pub email: String,
    pub access_level: AccessLevel,
    pub last_login_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl User {
    pub fn can_edit(&self) -> bool {
        self.access_level.can_edit()
    }
}

pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub access_level: AccessLevel,
}

impl fmt::Debug for NewUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewUser")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("access_level", &self.access_level)
            .finish()
    }
}

const USER_COLUMNS: &str = "id, uuid, nome, email, nivel_acesso, ultimo_acesso, ativo, data_criacao, data_modificacao";

const USER_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("name", "nome", FieldKind::RequiredText),
    FieldSpec::new(
        "email",
        "email",
        FieldKind::Normalized {
            required: true,
            normalize: normalize_email,
        },
    ),
    FieldSpec::new(
        "access_level",
        "nivel_acesso",
        FieldKind::Normalized {
            required: true,
            normalize: normalize_level,
        },
    ),
];

pub struct IdentityDirectory<'a> {
    db: &'a Database,
    hasher: PasswordHasher,
    audit: AuditLogger<'a>,
    decoy_hash: String,
}

impl<'a> IdentityDirectory<'a> {
    pub fn new(db: &'a Database, cost: PasswordCost) -> Self {
        let hasher = PasswordHasher::new(cost);
        Self {
            db,
            decoy_hash: hasher.decoy(),
            hasher,
            audit: AuditLogger::new(db),
        }
    }

    fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
        let level: String = row.get(4)?;
        let access_level = level.parse().map_err(|e: StoreError| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(User {
            id: row.get(0)?,
            uuid: column_uuid(row, 1)?,
            name: row.get(2)?,
            email: row.get(3)?,
            access_level,
            last_login_at: column_time_opt(row, 5)?,
            active: row.get(6)?,
            created_at: column_time(row, 7)?,
            modified_at: column_time(row, 8)?,
        })
    }

    fn fetch(conn: &Connection, id: i64) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {} FROM usuarios WHERE id = ?1 AND ativo = 1", USER_COLUMNS);
        Ok(conn.query_row(&sql, [id], Self::row_to_user).optional()?)
    }

    /// Register a user. `actor` is whoever created it; self-registration when `None`.
    pub fn create(&self, new: NewUser, actor: Option<i64>) -> Result<User, StoreError> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(StoreError::Validation("name is required".to_string()));
        }
        let email = normalize_email(&new.email)?;
        check_password(&new.password)?;

        let hash = self.hasher.hash(&new.password)?;
        let now = sql_time(&Utc::now());

        let user = self.db.transaction(|tx| {
            ensure_email_free(tx, &email, None)?;
            tx.execute(
                "INSERT INTO usuarios (uuid, nome, email, senha, nivel_acesso, data_criacao, data_modificacao)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![Uuid::new_v4().to_string(), name, email, hash, new.access_level.as_str(), now],
            )?;
            let id = tx.last_insert_rowid();
            Self::fetch(tx, id)?.ok_or_else(|| not_found(id))
        })?;

        self.audit.record(ActivityRecord::new(
            actor.unwrap_or(user.id),
            ActionKind::Create,
            tables::USERS,
            user.id,
            format!("User created: {}", user.name),
        ));
        tracing::info!(user_id = user.id, level = %user.access_level, "User created");
        Ok(user)
    }

    pub fn find_by_id(&self, id: i64) -> Result<User, StoreError> {
        Self::fetch(&*self.db.conn()?, id)?.ok_or_else(|| not_found(id))
    }

    pub fn find_by_uuid(&self, uuid: &Uuid) -> Result<User, StoreError> {
        let sql = format!("SELECT {} FROM usuarios WHERE uuid = ?1 AND ativo = 1", USER_COLUMNS);
        self.db
            .query_opt(&sql, [uuid.to_string()], Self::row_to_user)?
            .ok_or_else(|| StoreError::NotFound(format!("user {}", uuid)))
    }

    pub fn find_by_email(&self, email: &str) -> Result<User, StoreError> {
        let email = email.trim().to_lowercase();
        let sql = format!("SELECT {} FROM usuarios WHERE email = ?1 AND ativo = 1", USER_COLUMNS);
        self.db
            .query_opt(&sql, [&email], Self::row_to_user)?
            .ok_or_else(|| StoreError::NotFound(format!("user {}", email)))
    }

    /// Active users ordered by name.
    pub fn list(&self, limit: u32, offset: u32) -> Result<Vec<User>, StoreError> {
        let sql = format!(
            "SELECT {} FROM usuarios WHERE ativo = 1 ORDER BY nome, id LIMIT ?1 OFFSET ?2",
            USER_COLUMNS
        );
        self.db.query_all(&sql, params![limit, offset], Self::row_to_user)
    }

    pub fn count(&self) -> Result<i64, StoreError> {
        let total: Option<i64> = self
            .db
            .query_opt("SELECT count(*) FROM usuarios WHERE ativo = 1", [], |row| row.get(0))?;
        Ok(total.unwrap_or(0))
    }

    /// Case-insensitive substring over name and e-mail.
    pub fn search(&self, term: &str, limit: u32) -> Result<Vec<User>, StoreError> {
        let sql = format!(
            "SELECT {} FROM usuarios
             WHERE ativo = 1 AND (instr(fold(nome), ?1) > 0 OR instr(fold(email), ?1) > 0)
             ORDER BY nome, id LIMIT ?2",
            USER_COLUMNS
        );
        self.db
            .query_all(&sql, params![term.trim().to_lowercase(), limit], Self::row_to_user)
    }

    /// Verify credentials and stamp the login. Every failure is `InvalidCredentials`.
    pub fn authenticate(&self, email: &str, password: &str, origin: Option<&str>) -> Result<User, StoreError> {
        let email = email.trim().to_lowercase();
        let stored: Option<(i64, String)> = self.db.query_opt(
            "SELECT id, senha FROM usuarios WHERE email = ?1 AND ativo = 1",
            [&email],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let Some((id, hash)) = stored else {
            self.burn_verification(password);
            tracing::warn!("Login failed");
            return Err(StoreError::InvalidCredentials);
        };
        if !self.hasher.verify(password, &hash) {
            tracing::warn!(user_id = id, "Login failed");
            return Err(StoreError::InvalidCredentials);
        }

        self.db.execute(
            "UPDATE usuarios SET ultimo_acesso = ?1 WHERE id = ?2",
            params![sql_time(&Utc::now()), id],
        )?;
        self.audit.record(
            ActivityRecord::new(id, ActionKind::Login, tables::USERS, id, "Login").origin(origin),
        );
        tracing::info!(user_id = id, "Login succeeded");
        self.find_by_id(id)
    }

    /// Spend the same work on an unknown e-mail as on a wrong password.
    fn burn_verification(&self, password: &str) {
        let _ = self.hasher.verify(password, &self.decoy_hash);
    }

    /// Apply the whitelisted keys of `fields` (`name`, `email`, `access_level`).
    pub fn update(&self, id: i64, fields: &Map<String, JsonValue>, actor: i64) -> Result<User, StoreError> {
        let mut columns: Vec<(&'static str, Value)> = update::collect(USER_FIELDS, fields)?
            .into_iter()
            .filter_map(update::Assignment::into_set)
            .collect();
        if columns.is_empty() {
            return Err(StoreError::NoOp);
        }
        let new_email = columns.iter().find_map(|(column, value)| match (column, value) {
            (&"email", Value::Text(email)) => Some(email.clone()),
            _ => None,
        });
        columns.push(("data_modificacao", Value::Text(sql_time(&Utc::now()))));

        let (set, mut values) = update::set_clause(columns);
        values.push(Value::Integer(id));
        let sql = format!("UPDATE usuarios SET {} WHERE id = ? AND ativo = 1", set);

        let (before, after) = self.db.transaction(|tx| {
            let before = Self::fetch(tx, id)?.ok_or_else(|| not_found(id))?;
            if let Some(email) = &new_email {
                ensure_email_free(tx, email, Some(id))?;
            }
            tx.execute(&sql, params_from_iter(values))?;
            let after = Self::fetch(tx, id)?.ok_or_else(|| not_found(id))?;
            Ok((before, after))
        })?;

        self.audit.record(
            ActivityRecord::new(
                actor,
                ActionKind::Update,
                tables::USERS,
                id,
                format!("User updated: {}", after.name),
            )
            .snapshots(serde_json::to_value(&before).ok(), serde_json::to_value(&after).ok()),
        );
        tracing::info!(user_id = id, actor = actor, "User updated");
        Ok(after)
    }

    /// Replace the password after verifying the current one.
    pub fn change_password(&self, id: i64, current: &str, new: &str, actor: i64) -> Result<(), StoreError> {
        let hash: String = self
            .db
            .query_opt("SELECT senha FROM usuarios WHERE id = ?1 AND ativo = 1", [id], |row| row.get(0))?
            .ok_or_else(|| not_found(id))?;
        if !self.hasher.verify(current, &hash) {
            return Err(StoreError::InvalidCredentials);
        }
        check_password(new)?;

        let rehashed = self.hasher.hash(new)?;
        self.db.execute(
            "UPDATE usuarios SET senha = ?1, data_modificacao = ?2 WHERE id = ?3",
            params![rehashed, sql_time(&Utc::now()), id],
        )?;

        self.audit.record(ActivityRecord::new(
            actor,
            ActionKind::Update,
            tables::USERS,
            id,
            "Password changed",
        ));
        tracing::info!(user_id = id, actor = actor, "Password changed");
        Ok(())
    }

    pub fn deactivate(&self, id: i64, actor: i64) -> Result<(), StoreError> {
        let user = self.find_by_id(id)?;
        let changed = self.db.execute(
            "UPDATE usuarios SET ativo = 0, data_modificacao = ?1 WHERE id = ?2 AND ativo = 1",
            params![sql_time(&Utc::now()), id],
        )?;
        if changed == 0 {
            return Err(not_found(id));
        }

        self.audit.record(ActivityRecord::new(
            actor,
            ActionKind::Delete,
            tables::USERS,
            id,
            format!("User deactivated: {}", user.name),
        ));
        tracing::info!(user_id = id, actor = actor, "User deactivated");
        Ok(())
    }

    /// Restore a deactivated user, unless another active user took the e-mail.
    pub fn reactivate(&self, id: i64, actor: i64) -> Result<User, StoreError> {
        let now = sql_time(&Utc::now());
        let user = self.db.transaction(|tx| {
            let email: String = tx
                .query_row("SELECT email FROM usuarios WHERE id = ?1 AND ativo = 0", [id], |row| row.get(0))
                .optional()?
                .ok_or_else(|| StoreError::NotFound(format!("inactive user {}", id)))?;
            ensure_email_free(tx, &email, Some(id))?;
            tx.execute(
                "UPDATE usuarios SET ativo = 1, data_modificacao = ?1 WHERE id = ?2",
                params![now, id],
            )?;
            Self::fetch(tx, id)?.ok_or_else(|| not_found(id))
        })?;

        self.audit.record(ActivityRecord::new(
            actor,
            ActionKind::Update,
            tables::USERS,
            id,
            format!("User reactivated: {}", user.name),
        ));
        tracing::info!(user_id = id, actor = actor, "User reactivated");
        Ok(user)
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn not_found(id: i64) -> StoreError {
    StoreError::NotFound(format!("user {}", id))
}

/// Trimmed, lower-cased, and shaped like `local@domain`.
pub fn normalize_email(raw: &str) -> Result<String, StoreError> {
    let email = raw.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => Ok(email),
        _ => Err(StoreError::Validation(format!("'{}' is not a valid e-mail address", raw.trim()))),
    }
}

fn normalize_level(raw: &str) -> Result<String, StoreError> {
    raw.parse::<AccessLevel>().map(|level| level.as_str().to_string())
}

fn check_password(password: &str) -> Result<(), StoreError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        Err(StoreError::Validation(format!(
            "password must have at least {} characters",
            MIN_PASSWORD_LEN
        )))
    } else {
        Ok(())
    }
}

fn ensure_email_free(conn: &Connection, email: &str, except: Option<i64>) -> Result<(), StoreError> {
    let taken = conn
        .query_row(
            "SELECT 1 FROM usuarios WHERE email = ?1 AND ativo = 1 AND id != ?2",
            params![email, except.unwrap_or(-1)],
            |_| Ok(()),
        )
        .optional()?;
    match taken {
        Some(()) => Err(StoreError::Duplicate(format!("e-mail {}", email))),
        None => Ok(()),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{audit_count, last_audit_description};
    use serde_json::json;

    fn directory(db: &Database) -> IdentityDirectory<'_> {
        IdentityDirectory::new(db, PasswordCost::minimal())
    }

    fn new_user(email: &str, password: &str) -> NewUser {
        NewUser {
            name: "Ana Souza".to_string(),
            email: email.to_string(),
            password: password.to_string(),
            access_level: AccessLevel::Editor,
        }
    }

    #[test]
    fn test_create_normalizes_email_and_hashes_password() {
        let (_dir, db) = Database::open_temp();
        let user = directory(&db).create(new_user("  Ana@Example.COM ", "pw123456"), None).unwrap();

        assert_eq!(user.email, "ana@example.com");
        assert_eq!(user.access_level, AccessLevel::Editor);

        let stored: String = db
            .conn()
            .unwrap()
            .query_row("SELECT senha FROM usuarios WHERE id = ?1", [user.id], |r| r.get(0))
            .unwrap();
        assert!(stored.starts_with("$argon2id$"));
        assert!(!stored.contains("pw123456"));
        assert_eq!(audit_count(&db, tables::USERS, user.id, "CREATE"), 1);
    }

    #[test]
    fn test_create_validates_input() {
        let (_dir, db) = Database::open_temp();
        let dir = directory(&db);
        assert!(matches!(dir.create(new_user("no-at-sign", "pw123456"), None), Err(StoreError::Validation(_))));
        assert!(matches!(dir.create(new_user("a@b.c", "short"), None), Err(StoreError::Validation(_))));
    }

    #[test]
    fn test_duplicate_active_email_is_rejected() {
        let (_dir, db) = Database::open_temp();
        let dir = directory(&db);
        dir.create(new_user("ana@example.com", "pw123456"), None).unwrap();
        let err = dir.create(new_user("ANA@example.com", "pw654321"), None).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[test]
    fn test_email_is_reusable_after_deactivation() {
        let (_dir, db) = Database::open_temp();
        let dir = directory(&db);
        let old = dir.create(new_user("ana@example.com", "pw123456"), None).unwrap();
        dir.deactivate(old.id, old.id).unwrap();

        let new = dir.create(new_user("ana@example.com", "pw123456"), None).unwrap();
        assert_ne!(new.id, old.id);

        // The old identity cannot come back while the e-mail is taken
        assert!(matches!(dir.reactivate(old.id, new.id), Err(StoreError::Duplicate(_))));
    }

    #[test]
    fn test_authenticate_success_stamps_login() {
        let (_dir, db) = Database::open_temp();
        let dir = directory(&db);
        let user = dir.create(new_user("ana@example.com", "pw123456"), None).unwrap();
        assert!(user.last_login_at.is_none());

        let logged_in = dir.authenticate("ANA@example.com", "pw123456", Some("10.0.0.7")).unwrap();
        assert_eq!(logged_in.id, user.id);
        assert!(logged_in.last_login_at.is_some());
        assert_eq!(audit_count(&db, tables::USERS, user.id, "LOGIN"), 1);
    }

    #[test]
    fn test_authenticate_does_not_reveal_which_part_failed() {
        let (_dir, db) = Database::open_temp();
        let dir = directory(&db);
        dir.create(new_user("ana@example.com", "pw123456"), None).unwrap();

        let wrong_password = dir.authenticate("ana@example.com", "nope-nope", None).unwrap_err();
        let unknown_email = dir.authenticate("bob@example.com", "pw123456", None).unwrap_err();

        assert!(matches!(wrong_password, StoreError::InvalidCredentials));
        assert!(matches!(unknown_email, StoreError::InvalidCredentials));
        assert_eq!(wrong_password.to_string(), unknown_email.to_string());
    }

    #[test]
    fn test_unknown_email_is_checked_against_a_decoy_at_the_configured_cost() {
        let (_dir, db) = Database::open_temp();
        let cost = PasswordCost { memory_kib: 16, iterations: 2, parallelism: 1 };
        let dir = IdentityDirectory::new(&db, cost);
        assert!(dir.decoy_hash.contains("m=16,t=2,p=1"));

        let err = dir.authenticate("nobody@example.com", "pw123456", None).unwrap_err();
        assert!(matches!(err, StoreError::InvalidCredentials));
        let err = dir.authenticate("nobody@example.com", "", None).unwrap_err();
        assert!(matches!(err, StoreError::InvalidCredentials));
    }

    #[test]
    fn test_deactivated_user_cannot_log_in() {
        let (_dir, db) = Database::open_temp();
        let dir = directory(&db);
        let user = dir.create(new_user("ana@example.com", "pw123456"), None).unwrap();
        dir.deactivate(user.id, user.id).unwrap();

        assert!(matches!(
            dir.authenticate("ana@example.com", "pw123456", None),
            Err(StoreError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_update_whitelist_and_email_uniqueness() {
        let (_dir, db) = Database::open_temp();
        let dir = directory(&db);
        let ana = dir.create(new_user("ana@example.com", "pw123456"), None).unwrap();
        dir.create(new_user("bob@example.com", "pw123456"), None).unwrap();

        let updated = dir
            .update(ana.id, &json!({"name": "Ana S.", "access_level": "ADMIN", "senha": "x"}).as_object().unwrap().clone(), ana.id)
            .unwrap();
        assert_eq!(updated.name, "Ana S.");
        assert!(updated.access_level.is_admin());

        let err = dir
            .update(ana.id, &json!({"email": "BOB@example.com"}).as_object().unwrap().clone(), ana.id)
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));

        let err = dir
            .update(ana.id, &json!({"password": "x"}).as_object().unwrap().clone(), ana.id)
            .unwrap_err();
        assert!(matches!(err, StoreError::NoOp));

        let err = dir
            .update(ana.id, &json!({"access_level": "root"}).as_object().unwrap().clone(), ana.id)
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn test_change_password_requires_current() {
        let (_dir, db) = Database::open_temp();
        let dir = directory(&db);
        let user = dir.create(new_user("ana@example.com", "pw123456"), None).unwrap();

        assert!(matches!(
            dir.change_password(user.id, "wrong-pw", "newpass1", user.id),
            Err(StoreError::InvalidCredentials)
        ));
        assert!(matches!(
            dir.change_password(user.id, "pw123456", "tiny", user.id),
            Err(StoreError::Validation(_))
        ));

        dir.change_password(user.id, "pw123456", "newpass1", user.id).unwrap();
        assert!(dir.authenticate("ana@example.com", "newpass1", None).is_ok());
        assert!(dir.authenticate("ana@example.com", "pw123456", None).is_err());
        assert_eq!(last_audit_description(&db, tables::USERS, user.id), "Login");
    }

    #[test]
    fn test_list_search_and_count() {
        let (_dir, db) = Database::open_temp();
        let dir = directory(&db);
        let mut zoe = new_user("zoe@example.com", "pw123456");
        zoe.name = "Zoë Lima".to_string();
        dir.create(zoe, None).unwrap();
        dir.create(new_user("ana@example.com", "pw123456"), None).unwrap();

        let names: Vec<_> = dir.list(10, 0).unwrap().into_iter().map(|u| u.name).collect();
        assert_eq!(names, vec!["Ana Souza", "Zoë Lima"]);
        assert_eq!(dir.count().unwrap(), 2);
        assert_eq!(dir.search("ZOË", 10).unwrap().len(), 1);
        assert_eq!(dir.search("example", 10).unwrap().len(), 2);
    }

    #[test]
    fn test_user_json_has_no_password() {
        let (_dir, db) = Database::open_temp();
        let user = directory(&db).create(new_user("ana@example.com", "pw123456"), None).unwrap();
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2"));
        assert!(!json.contains("pw123456"));
        assert!(!format!("{:?}", new_user("a@b.c", "pw123456")).contains("pw123456"));
    }

    #[test]
    fn test_access_level_parsing() {
        assert_eq!("Editor".parse::<AccessLevel>().unwrap(), AccessLevel::Editor);
        assert!("usuario".parse::<AccessLevel>().is_err());
        assert!(AccessLevel::Editor.can_edit());
        assert!(!AccessLevel::Viewer.can_edit());
        assert!(AccessLevel::Viewer.is_viewer());
    }
}
