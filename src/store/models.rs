// Cofre — Vault entry data models
//
// SECURITY: no projection defined here carries the secret. `VaultEntry` has no
// secret field at all; the sealed bytes stay inside the repository and the
// plaintext only leaves through `VaultEntryStore::reveal_secret()`.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Window used by the "expiring soon" list filter.
pub const EXPIRING_SOON_DAYS: i64 = 30;

/// A stored credential joined with the names of what it points to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultEntry {
    pub id: i64,
    pub uuid: Uuid,
    pub location_id: i64,
    pub location_name: String,
    pub category_id: i64,
    pub category_name: String,
    pub category_color: String,
    pub title: String,
    pub login: String,
    pub url: Option<String>,
    pub notes: Option<String>,
    pub tags: Vec<String>,
    pub favorite: bool,
    pub created_by: i64,
    pub created_by_name: String,
    pub modified_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub access_count: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub requires_rotation: bool,
    pub active: bool,
}

impl VaultEntry {
    /// True iff the expiry lies strictly before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expiry) if expiry < now)
    }

    /// True iff `now <= expiry <= now + days`.
    pub fn is_expiring_soon_at(&self, days: i64, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expiry) => expiry >= now && expiry <= window_end(now, days),
            None => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expiring_soon(&self, days: i64) -> bool {
        self.is_expiring_soon_at(days, Utc::now())
    }
}

impl fmt::Display for VaultEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}@{}) — {}",
            self.id, self.title, self.login, self.location_name, self.category_name
        )
    }
}

/// Input for creating a vault entry.
pub struct NewVaultEntry {
    pub location_id: i64,
    pub category_id: i64,
    pub title: String,
    pub login: String,
    pub secret: String,
    pub url: Option<String>,
    pub notes: Option<String>,
    pub tags: Vec<String>,
    pub favorite: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub requires_rotation: bool,
}

impl NewVaultEntry {
    /// Required fields only; everything else empty.
    pub fn new(
        location_id: i64,
        category_id: i64,
        title: impl Into<String>,
        login: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            location_id,
            category_id,
            title: title.into(),
            login: login.into(),
            secret: secret.into(),
            url: None,
            notes: None,
            tags: Vec::new(),
            favorite: false,
            expires_at: None,
            requires_rotation: false,
        }
    }
}

/// Custom Debug implementation that NEVER reveals the secret.
impl fmt::Debug for NewVaultEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewVaultEntry")
            .field("location_id", &self.location_id)
            .field("category_id", &self.category_id)
            .field("title", &self.title)
            .field("login", &self.login)
            .field("secret", &"[REDACTED]")
            .field("url", &self.url)
            .field("notes", &self.notes)
            .field("tags", &self.tags)
            .field("favorite", &self.favorite)
            .field("expires_at", &self.expires_at)
            .field("requires_rotation", &self.requires_rotation)
            .finish()
    }
}

/// Reveal history of a single entry, read from the activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryStats {
    pub total_reads: i64,
    pub last_read_at: Option<DateTime<Utc>>,
    pub reads_last_7_days: i64,
    pub access_count: i64,
}

/// One page of results together with the total matching the same filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub limit: u32,
    pub offset: u32,
}

/// `9999-12-31T23:59:59.999999Z`: the last instant whose stored text still has
/// a four-digit year and so still sorts correctly.
pub fn latest_storable_time() -> DateTime<Utc> {
    DateTime::from_timestamp(253_402_300_799, 999_999_000).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `now + days`, clamped to what a time column can hold.
pub fn window_end(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    match TimeDelta::try_days(days).and_then(|d| now.checked_add_signed(d)) {
        Some(end) => end.min(latest_storable_time()),
        None if days < 0 => DateTime::<Utc>::MIN_UTC,
        None => latest_storable_time(),
    }
}

/// Parse a caller-supplied expiry: RFC 3339, or a bare `YYYY-MM-DD` meaning
/// midnight UTC of that day.
pub fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    let parsed = match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(_) => chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc()),
    };
    parsed.filter(|dt| *dt <= latest_storable_time())
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn entry_expiring(expires_at: Option<DateTime<Utc>>) -> VaultEntry {
        let now = Utc::now();
        VaultEntry {
            id: 1,
            uuid: Uuid::new_v4(),
            location_id: 1,
            location_name: "São Paulo HQ".to_string(),
            category_id: 1,
            category_name: "network".to_string(),
            category_color: "#0d6efd".to_string(),
            title: "Router Admin".to_string(),
            login: "admin".to_string(),
            url: None,
            notes: None,
            tags: vec![],
            favorite: false,
            created_by: 1,
            created_by_name: "Ana".to_string(),
            modified_by: None,
            created_at: now,
            modified_at: now,
            last_accessed_at: None,
            access_count: 0,
            expires_at,
            requires_rotation: false,
            active: true,
        }
    }

    #[test]
    fn test_no_expiry_is_never_expired_or_expiring() {
        let entry = entry_expiring(None);
        assert!(!entry.is_expired());
        assert!(!entry.is_expiring_soon(30));
    }

    #[test]
    fn test_is_expired_iff_expiry_before_now() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        assert!(entry_expiring(Some(now - Duration::seconds(1))).is_expired_at(now));
        assert!(!entry_expiring(Some(now)).is_expired_at(now));
        assert!(!entry_expiring(Some(now + Duration::days(1))).is_expired_at(now));
    }

    #[test]
    fn test_is_expiring_soon_window_is_inclusive() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        assert!(entry_expiring(Some(now)).is_expiring_soon_at(30, now));
        assert!(entry_expiring(Some(now + Duration::days(30))).is_expiring_soon_at(30, now));
        assert!(!entry_expiring(Some(now + Duration::days(30) + Duration::seconds(1)))
            .is_expiring_soon_at(30, now));
        assert!(!entry_expiring(Some(now - Duration::seconds(1))).is_expiring_soon_at(30, now));
    }

    #[test]
    fn test_entry_json_has_no_secret_field() {
        let json = serde_json::to_value(entry_expiring(None)).unwrap();
        let object = json.as_object().unwrap();
        assert!(!object.keys().any(|k| k.contains("secret")));
    }

    #[test]
    fn test_new_entry_debug_redacts_secret() {
        let new = NewVaultEntry::new(1, 1, "Router Admin", "admin", "s3cret");
        let debug_output = format!("{:?}", new);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("s3cret"));
    }

    #[test]
    fn test_parse_expiry_accepts_date_and_timestamp() {
        assert_eq!(
            parse_expiry("2026-12-31"),
            Some(Utc.with_ymd_and_hms(2026, 12, 31, 0, 0, 0).unwrap())
        );
        assert_eq!(
            parse_expiry("2026-12-31T10:00:00-03:00"),
            Some(Utc.with_ymd_and_hms(2026, 12, 31, 13, 0, 0).unwrap())
        );
        assert_eq!(parse_expiry("next tuesday"), None);
    }

    #[test]
    fn test_window_end_clamps_huge_windows() {
        let now = Utc::now();
        assert_eq!(window_end(now, 30), now + Duration::days(30));
        assert_eq!(window_end(now, 3_000_000), latest_storable_time());
        assert_eq!(window_end(now, i64::MAX), latest_storable_time());
        assert!(window_end(now, i64::MIN) < now);

        let far = entry_expiring(Some(now + Duration::days(10)));
        assert!(far.is_expiring_soon_at(i64::MAX, now));
        assert!(!far.is_expiring_soon_at(i64::MIN, now));
    }

    #[test]
    fn test_latest_storable_time_keeps_a_four_digit_year() {
        let text = crate::store::sql_time(&latest_storable_time());
        assert!(text.starts_with("9999-12-31T23:59:59"));
    }
}
