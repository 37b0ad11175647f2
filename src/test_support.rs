// Cofre — Shared test fixtures
//
// Rows are seeded with plain SQL so each component's tests depend only on the
// schema, not on the other components' write paths.

use chrono::Utc;
use rusqlite::params;
use uuid::Uuid;

use crate::enclave::{SecretCipher, KEY_LEN};
use crate::store::{sql_time, Database};

pub(crate) const TEST_CIPHER_KEY: [u8; KEY_LEN] = [0x34; KEY_LEN];

pub(crate) fn test_cipher() -> SecretCipher {
    SecretCipher::from_key(&TEST_CIPHER_KEY)
}

/// Insert an active user with an unusable password hash.
pub(crate) fn seed_user(db: &Database, name: &str, email: &str, level: &str) -> i64 {
    let now = sql_time(&Utc::now());
    let conn = db.conn().unwrap();
    conn.execute(
        "INSERT INTO usuarios (uuid, nome, email, senha, nivel_acesso, data_criacao, data_modificacao)
         VALUES (?1, ?2, ?3, '!', ?4, ?5, ?5)",
        params![Uuid::new_v4().to_string(), name, email, level, now],
    )
    .unwrap();
    conn.last_insert_rowid()
}

pub(crate) fn seed_location(db: &Database, code: &str, name: &str, creator: i64) -> i64 {
    let now = sql_time(&Utc::now());
    let conn = db.conn().unwrap();
    conn.execute(
        "INSERT INTO localidades (codigo, nome, usuario_criacao, data_criacao, data_modificacao)
         VALUES (?1, ?2, ?3, ?4, ?4)",
        params![code, name, creator, now],
    )
    .unwrap();
    conn.last_insert_rowid()
}

/// Id of one of the seeded categories.
pub(crate) fn category_id(db: &Database, name: &str) -> i64 {
    db.conn()
        .unwrap()
        .query_row("SELECT id FROM categorias_senha WHERE nome = ?1", [name], |row| row.get(0))
        .unwrap()
}

/// Rows in `log_atividades` for one record and action.
pub(crate) fn audit_count(db: &Database, table: &str, record_id: i64, action: &str) -> i64 {
    db.conn()
        .unwrap()
        .query_row(
            "SELECT count(*) FROM log_atividades
             WHERE tabela_afetada = ?1 AND registro_id = ?2 AND tipo_acao = ?3",
            params![table, record_id, action],
            |row| row.get(0),
        )
        .unwrap()
}

/// Description of the latest activity row for one record.
pub(crate) fn last_audit_description(db: &Database, table: &str, record_id: i64) -> String {
    db.conn()
        .unwrap()
        .query_row(
            "SELECT descricao FROM log_atividades
             WHERE tabela_afetada = ?1 AND registro_id = ?2
             ORDER BY id DESC LIMIT 1",
            params![table, record_id],
            |row| row.get(0),
        )
        .unwrap()
}
