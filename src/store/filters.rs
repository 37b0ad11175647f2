// Cofre — Vault entry list filters
//
// One predicate builder shared by `list()` and `count()`. Both queries take the
// WHERE clause and its positional parameters from `EntryFilters::predicate()`,
// so a page and its total can never disagree about which rows match.

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

use super::db::sql_time;
use super::models::{window_end, EXPIRING_SOON_DAYS};

/// The enumerated list filters. All set filters combine with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFilters {
    pub category_id: Option<i64>,
    pub location_id: Option<i64>,
    #[serde(default)]
    pub favorites_only: bool,
    #[serde(default)]
    pub expiring_soon: bool,
    /// Case-insensitive substring over title, login and notes.
    pub search: Option<String>,
}

/// A WHERE clause (without the keyword) and the values for its `?` slots.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub clause: String,
    pub params: Vec<Value>,
}

impl Predicate {
    fn new() -> Self {
        Self {
            clause: String::new(),
            params: Vec::new(),
        }
    }

    fn and(&mut self, condition: &str, params: impl IntoIterator<Item = Value>) {
        if !self.clause.is_empty() {
            self.clause.push_str(" AND ");
        }
        self.clause.push_str(condition);
        self.params.extend(params);
    }
}

impl EntryFilters {
    pub fn category(mut self, id: i64) -> Self {
        self.category_id = Some(id);
        self
    }

    pub fn location(mut self, id: i64) -> Self {
        self.location_id = Some(id);
        self
    }

    pub fn favorites(mut self) -> Self {
        self.favorites_only = true;
        self
    }

    pub fn expiring(mut self) -> Self {
        self.expiring_soon = true;
        self
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    /// Build the predicate over the `cs` (cofre_senhas) alias. Inactive rows
    /// are always excluded.
    pub fn predicate(&self, now: DateTime<Utc>) -> Predicate {
        let mut predicate = Predicate::new();
        predicate.and("cs.ativo = 1", []);

        if let Some(id) = self.category_id {
            predicate.and("cs.categoria_id = ?", [Value::Integer(id)]);
        }
        if let Some(id) = self.location_id {
            predicate.and("cs.localidade_id = ?", [Value::Integer(id)]);
        }
        if self.favorites_only {
            predicate.and("cs.favorito = 1", []);
        }
        if self.expiring_soon {
            let (clause, params) = expiry_window(now, EXPIRING_SOON_DAYS);
            predicate.and(clause, params);
        }
        if let Some(term) = self.search_term() {
            predicate.and(
                "(instr(fold(cs.titulo), ?) > 0 OR instr(fold(cs.usuario), ?) > 0 \
                 OR instr(fold(coalesce(cs.observacoes, '')), ?) > 0)",
                std::iter::repeat(Value::Text(term)).take(3),
            );
        }

        predicate
    }

    /// ORDER BY for the filters in effect. Expiry wins over favorites.
    pub fn order_by(&self) -> &'static str {
        if self.expiring_soon {
            "cs.expira_em ASC, cs.id ASC"
        } else if self.favorites_only {
            "cs.data_ultimo_acesso DESC NULLS LAST, cs.data_criacao DESC, cs.id DESC"
        } else {
            "cs.data_criacao DESC, cs.id DESC"
        }
    }

    fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
    }
}

/// `now <= expira_em <= now + days`, the end clamped to the latest storable
/// time. Rows without an expiry never match.
pub fn expiry_window(now: DateTime<Utc>, days: i64) -> (&'static str, [Value; 2]) {
    (
        "cs.expira_em IS NOT NULL AND cs.expira_em >= ? AND cs.expira_em <= ?",
        [
            Value::Text(sql_time(&now)),
            Value::Text(sql_time(&window_end(now, days))),
        ],
    )
}

// ─── Tests ───────────────────────────────────────────────────────────────────
