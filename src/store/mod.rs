// Cofre — Store Module
//
// Pooled SQLite persistence, the append-only activity log and the vault entry
// repository. Secrets are sealed with AES-256-GCM before they reach the
// database and every reveal is audit-logged.

pub mod audit;
mod db;
mod error;
mod filters;
mod models;
mod repository;
pub mod update;

pub use audit::{ActionKind, ActivityRecord, AuditLogger};
pub use db::{column_time, column_time_opt, column_uuid, sql_time, Database, TABLES};
pub use error::StoreError;
pub use filters::{EntryFilters, Predicate};
pub use models::{parse_expiry, EntryStats, NewVaultEntry, Page, VaultEntry, EXPIRING_SOON_DAYS};
pub use repository::{SqliteVaultStore, VaultEntryStore, ENTRY_FIELDS};
