// Cofre — Category directory
//
// Read-only reference data. The default set is seeded by the schema migration.

use serde::{Deserialize, Serialize};

use crate::store::{Database, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub color: String,
    pub icon: Option<String>,
    pub position: i64,
}

const CATEGORY_COLUMNS: &str = "id, nome, descricao, cor, icone, ordem";

pub struct CategoryDirectory<'a> {
    db: &'a Database,
}

impl<'a> CategoryDirectory<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    fn row_to_category(row: &rusqlite::Row<'_>) -> rusqlite::Result<Category> {
        Ok(Category {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            color: row.get(3)?,
            icon: row.get(4)?,
            position: row.get(5)?,
        })
    }

    /// Active categories by ordering key, then name.
    pub fn list(&self) -> Result<Vec<Category>, StoreError> {
        let sql = format!(
            "SELECT {} FROM categorias_senha WHERE ativo = 1 ORDER BY ordem, nome",
            CATEGORY_COLUMNS
        );
        self.db.query_all(&sql, [], Self::row_to_category)
    }

    pub fn find_by_id(&self, id: i64) -> Result<Category, StoreError> {
        let sql = format!(
            "SELECT {} FROM categorias_senha WHERE id = ?1 AND ativo = 1",
            CATEGORY_COLUMNS
        );
        self.db
            .query_opt(&sql, [id], Self::row_to_category)?
            .ok_or_else(|| StoreError::NotFound(format!("category {}", id)))
    }

    /// Case-insensitive lookup by name.
    pub fn find_by_name(&self, name: &str) -> Result<Category, StoreError> {
        let sql = format!(
            "SELECT {} FROM categorias_senha WHERE fold(nome) = ?1 AND ativo = 1",
            CATEGORY_COLUMNS
        );
        self.db
            .query_opt(&sql, [name.trim().to_lowercase()], Self::row_to_category)?
            .ok_or_else(|| StoreError::NotFound(format!("category {}", name.trim())))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_categories_in_order() {
        let (_dir, db) = Database::open_temp();
        let names: Vec<_> = CategoryDirectory::new(&db)
            .list()
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(
            names,
            vec!["network", "server", "database", "email", "application", "cloud", "other"]
        );
    }

    #[test]
    fn test_find_by_name_ignores_case() {
        let (_dir, db) = Database::open_temp();
        let dir = CategoryDirectory::new(&db);
        let network = dir.find_by_name(" Network ").unwrap();
        assert_eq!(network.color, "#0d6efd");
        assert_eq!(dir.find_by_id(network.id).unwrap(), network);
        assert!(matches!(dir.find_by_name("printers"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_inactive_category_is_hidden() {
        let (_dir, db) = Database::open_temp();
        db.execute("UPDATE categorias_senha SET ativo = 0 WHERE nome = 'other'", [])
            .unwrap();
        let dir = CategoryDirectory::new(&db);
        assert_eq!(dir.list().unwrap().len(), 6);
        assert!(dir.find_by_name("other").is_err());
    }
}
