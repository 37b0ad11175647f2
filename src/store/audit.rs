// Cofre — Audit logger
//
// Appends activity records to `log_atividades`. Recording is best-effort:
// it runs after the primary operation has committed, on its own pooled
// connection, and a failure is logged locally and dropped. `record()` has no
// error path by construction.

use std::fmt;

use chrono::Utc;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::db::{sql_time, Database};
use super::StoreError;

/// Affected table names as persisted in the log.
pub mod tables {
    pub const USERS: &str = "usuarios";
    pub const LOCATIONS: &str = "localidades";
    pub const VAULT_ENTRIES: &str = "cofre_senhas";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionKind {
    Create,
    Read,
    Update,
    Delete,
    Login,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Create => "CREATE",
            ActionKind::Read => "READ",
            ActionKind::Update => "UPDATE",
            ActionKind::Delete => "DELETE",
            ActionKind::Login => "LOGIN",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One activity to append. Timestamped when it is recorded.
#[derive(Debug, Clone)]
pub struct ActivityRecord {
    pub actor_id: i64,
    pub action: ActionKind,
    pub table: &'static str,
    pub record_id: i64,
    pub description: String,
    pub origin: Option<String>,
    pub user_agent: Option<String>,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

impl ActivityRecord {
    pub fn new(
        actor_id: i64,
        action: ActionKind,
        table: &'static str,
        record_id: i64,
        description: impl Into<String>,
    ) -> Self {
        Self {
            actor_id,
            action,
            table,
            record_id,
            description: description.into(),
            origin: None,
            user_agent: None,
            before: None,
            after: None,
        }
    }

    /// Address the request came from.
    pub fn origin(mut self, origin: Option<&str>) -> Self {
        self.origin = origin.map(str::to_string);
        self
    }

    pub fn user_agent(mut self, user_agent: Option<&str>) -> Self {
        self.user_agent = user_agent.map(str::to_string);
        self
    }

    /// Prior and new state of the affected row.
    pub fn snapshots(mut self, before: Option<Value>, after: Option<Value>) -> Self {
        self.before = before;
        self.after = after;
        self
    }
}

/// Best-effort writer for the activity log.
#[derive(Clone)]
pub struct AuditLogger<'a> {
    db: &'a Database,
}

impl<'a> AuditLogger<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Append `record`. Never fails outward: an error is logged and dropped.
    pub fn record(&self, record: ActivityRecord) {
        if let Err(e) = self.try_record(&record) {
            tracing::error!(
                error = %e,
                action = %record.action,
                table = record.table,
                record_id = record.record_id,
                actor = record.actor_id,
                "Failed to write activity record"
            );
        }
    }

    fn try_record(&self, record: &ActivityRecord) -> Result<(), StoreError> {
        let before = record.before.as_ref().map(serde_json::to_string).transpose()?;
        let after = record.after.as_ref().map(serde_json::to_string).transpose()?;

        self.db.execute(
            "INSERT INTO log_atividades
                (usuario_id, tipo_acao, tabela_afetada, registro_id, descricao,
                 ip_address, user_agent, dados_anteriores, dados_novos, data_acao)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.actor_id,
                record.action.as_str(),
                record.table,
                record.record_id,
                record.description,
                record.origin,
                record.user_agent,
                before,
                after,
                sql_time(&Utc::now()),
            ],
        )?;

        tracing::debug!(
            action = %record.action,
            table = record.table,
            record_id = record.record_id,
            actor = record.actor_id,
            "Activity recorded"
        );
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
