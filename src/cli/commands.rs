// Cofre — CLI Command Handlers
//
// Each function handles one CLI subcommand. They open the pooled database,
// derive the secret cipher from the master key and act as the identity given
// by `--as` / `--password`, which is authenticated for every command.

use serde_json::{Map, Value as JsonValue};
use zeroize::Zeroizing;

use crate::config::CofreConfig;
use crate::directory::{
    format_tax_id, AccessLevel, CategoryDirectory, IdentityDirectory, LocationDirectory, NewLocation, NewUser,
    User,
};
use crate::enclave::{EnclaveError, KeyringProvider, MasterKeyProvider, SecretCipher, StaticKeyProvider};
use crate::error::CofreError;
use crate::store::update::{self, FieldKind, FieldSpec};
use crate::store::{
    parse_expiry, Database, EntryFilters, NewVaultEntry, SqliteVaultStore, VaultEntry, VaultEntryStore,
    ENTRY_FIELDS, EXPIRING_SOON_DAYS,
};

use super::{CategoryCommand, Cli, Commands, EntryArgs, EntryCommand, LocationArgs, LocationCommand, UserCommand};

const MASTER_KEY_ENV: &str = "COFRE_MASTER_KEY";

/// Execute the parsed CLI command.
pub fn execute(cli: Cli) -> Result<(), CofreError> {
    let config = CofreConfig::from_env()?;

    if let Commands::Init {
        admin_name,
        admin_email,
        admin_password,
    } = cli.command
    {
        return cmd_init(&config, admin_name, admin_email, admin_password);
    }

    let db = open_db(&config)?;
    let (actor, password) = authenticate(&config, &db, cli.acting_as, cli.password)?;
    let session = Session {
        config: &config,
        db: &db,
        actor,
        password,
    };

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Login => cmd_login(&session),
        Commands::User(command) => cmd_user(&session, command),
        Commands::Location(command) => cmd_location(&session, command),
        Commands::Category(CategoryCommand::List) => cmd_category_list(&session),
        Commands::Entry(command) => cmd_entry(&session, command),
    }
}

/// Everything a command needs once the acting identity is known.
struct Session<'a> {
    config: &'a CofreConfig,
    db: &'a Database,
    actor: User,
    password: Zeroizing<String>,
}

impl Session<'_> {
    fn identities(&self) -> IdentityDirectory<'_> {
        IdentityDirectory::new(self.db, self.config.password_cost)
    }

    fn require_edit(&self) -> Result<(), CofreError> {
        if self.actor.can_edit() {
            Ok(())
        } else {
            Err(CofreError::PermissionDenied(format!(
                "{} has read-only access",
                self.actor.email
            )))
        }
    }

    fn require_admin(&self) -> Result<(), CofreError> {
        if self.actor.access_level.is_admin() {
            Ok(())
        } else {
            Err(CofreError::PermissionDenied(format!(
                "{} is not an administrator",
                self.actor.email
            )))
        }
    }
}

// ─── Init ────────────────────────────────────────────────────────────────────

fn cmd_init(
    config: &CofreConfig,
    admin_name: Option<String>,
    admin_email: Option<String>,
    admin_password: Option<String>,
) -> Result<(), CofreError> {
    // Creates the keyring secret on first use
    let provider = master_key_provider()?;
    provider.master_secret()?;

    let db = open_db(config)?;
    db.health_check()?;

    let identities = IdentityDirectory::new(&db, config.password_cost);
    let users = identities.count()?;

    println!("✓ Cofre initialized successfully");
    println!("  Database: {}", config.database_path.display());

    match (admin_name, admin_email, admin_password) {
        (Some(name), Some(email), Some(password)) if users == 0 => {
            let admin = identities.create(
                NewUser {
                    name,
                    email,
                    password,
                    access_level: AccessLevel::Admin,
                },
                None,
            )?;
            println!("  Administrator: {} <{}>", admin.name, admin.email);
        }
        (Some(_), _, _) => {
            println!("  Users already exist; no administrator was created");
        }
        _ if users == 0 => {
            println!();
            println!("Next: create the first administrator with");
            println!("  cofre init --admin-name <name> --admin-email <email> --admin-password <password>");
        }
        _ => {}
    }

    Ok(())
}

// ─── Login ───────────────────────────────────────────────────────────────────

fn cmd_login(session: &Session<'_>) -> Result<(), CofreError> {
    let user = &session.actor;
    println!("✓ Authenticated as {} <{}>", user.name, user.email);
    println!("  Access level: {}", user.access_level);
    Ok(())
}

// ─── Users ───────────────────────────────────────────────────────────────────

fn cmd_user(session: &Session<'_>, command: UserCommand) -> Result<(), CofreError> {
    let identities = session.identities();

    match command {
        UserCommand::Add {
            name,
            email,
            new_password,
            level,
        } => {
            session.require_admin()?;
            let user = identities.create(
                NewUser {
                    name,
                    email,
                    password: new_password,
                    access_level: level.parse()?,
                },
                Some(session.actor.id),
            )?;
            println!("✓ User created");
            println!("  ID:    {}", user.id);
            println!("  Email: {}", user.email);
            println!("  Level: {}", user.access_level);
        }
        UserCommand::List { limit, offset } => {
            let users = identities.list(limit, offset)?;
            let total = identities.count()?;
            println!("Users ({} of {}):\n", users.len(), total);
            for user in &users {
                let last_login = user
                    .last_login_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "  {:>4} │ {:24} │ {:32} │ {:6} │ last login {}",
                    user.id, user.name, user.email, user.access_level, last_login
                );
            }
        }
        UserCommand::Passwd { new_password } => {
            identities.change_password(session.actor.id, &session.password, &new_password, session.actor.id)?;
            println!("✓ Password changed for {}", session.actor.email);
        }
        UserCommand::Deactivate { id } => {
            session.require_admin()?;
            if id == session.actor.id {
                return Err(CofreError::Other("You cannot deactivate yourself".to_string()));
            }
            identities.deactivate(id, session.actor.id)?;
            println!("✓ User {} deactivated", id);
        }
    }
    Ok(())
}

// ─── Locations ───────────────────────────────────────────────────────────────

fn cmd_location(session: &Session<'_>, command: LocationCommand) -> Result<(), CofreError> {
    let locations = LocationDirectory::new(session.db);
    let actor = session.actor.id;

    match command {
        LocationCommand::Add(args) => {
            session.require_edit()?;
            let location = locations.create(new_location(args), actor)?;
            println!("✓ Location stored");
            println!("  ID:   {}", location.id);
            println!("  Code: {}", location.code);
        }
        LocationCommand::List {
            search,
            region,
            city,
            limit,
            offset,
        } => {
            let found = match (search, region, city) {
                (Some(term), _, _) => locations.search(&term, limit)?,
                (None, Some(region), Some(city)) => locations.find_by_city(&region, &city)?,
                (None, Some(region), None) => locations.find_by_region(&region)?,
                (None, None, _) => locations.list(limit, offset)?,
            };
            if found.is_empty() {
                println!("No locations found.");
                return Ok(());
            }
            println!("Locations ({} of {}):\n", found.len(), locations.count()?);
            for l in &found {
                println!(
                    "  {:>4} │ {:8} │ {:28} │ {} {}",
                    l.id,
                    l.code,
                    l.name,
                    l.city.as_deref().unwrap_or("-"),
                    l.region.as_deref().unwrap_or("")
                );
            }
        }
        LocationCommand::Show { code } => {
            let l = locations.find_by_code(&code)?;
            let stats = locations.stats(l.id)?;
            println!("Location details:\n");
            println!("  ID:       {}", l.id);
            println!("  Code:     {}", l.code);
            println!("  Name:     {}", l.name);
            if let Some(tax_id) = &l.tax_id {
                println!("  Tax ID:   {}", format_tax_id(tax_id));
            }
            println!(
                "  Place:    {}{}",
                l.city.as_deref().unwrap_or("-"),
                l.region.as_deref().map(|r| format!(" / {}", r)).unwrap_or_default()
            );
            for (label, value) in [("Address", &l.address), ("Phone", &l.phone), ("Email", &l.email), ("Notes", &l.notes)] {
                if let Some(value) = value {
                    println!("  {:9} {}", format!("{}:", label), value);
                }
            }
            println!("  Created:  {} by {}", l.created_at.format("%Y-%m-%d %H:%M:%S UTC"), l.created_by_name.as_deref().unwrap_or("-"));
            println!("  Entries:  {} active, {} favorites, {} in the last 30 days", stats.active_entries, stats.favorite_entries, stats.entries_last_30_days);
            if let Some(at) = stats.last_entry_access {
                println!("  Last entry access: {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
            }
        }
        LocationCommand::Deactivate { code } => {
            session.require_edit()?;
            let location = locations.find_by_code(&code)?;
            locations.deactivate(location.id, actor)?;
            println!("✓ Location {} deactivated", location.code);
        }
        LocationCommand::Reactivate { id } => {
            session.require_edit()?;
            let location = locations.reactivate(id, actor)?;
            println!("✓ Location {} reactivated", location.code);
        }
    }
    Ok(())
}

fn new_location(args: LocationArgs) -> NewLocation {
    NewLocation {
        code: args.code,
        name: args.name,
        tax_id: args.tax_id,
        region: args.region,
        city: args.city,
        address: args.address,
        phone: args.phone,
        email: args.email,
        notes: args.notes,
    }
}

// ─── Categories ──────────────────────────────────────────────────────────────

fn cmd_category_list(session: &Session<'_>) -> Result<(), CofreError> {
    for category in CategoryDirectory::new(session.db).list()? {
        println!(
            "  {:>3} │ {:12} │ {} │ {}",
            category.id,
            category.name,
            category.color,
            category.description.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

// ─── Entries ─────────────────────────────────────────────────────────────────

fn cmd_entry(session: &Session<'_>, command: EntryCommand) -> Result<(), CofreError> {
    let cipher = open_cipher()?;
    let store = SqliteVaultStore::new(session.db, &cipher);
    let actor = session.actor.id;

    match command {
        EntryCommand::Add(args) => {
            session.require_edit()?;
            let entry = store.create(new_entry(session, args)?, actor)?;
            println!("✓ Vault entry stored");
            println!("  ID:   {}", entry.id);
            println!("  UUID: {}", entry.uuid);
        }
        EntryCommand::List {
            category,
            location,
            favorites,
            expiring,
            search,
            limit,
            offset,
        } => {
            let mut filters = EntryFilters {
                favorites_only: favorites,
                expiring_soon: expiring,
                search,
                ..EntryFilters::default()
            };
            if let Some(name) = category {
                filters.category_id = Some(CategoryDirectory::new(session.db).find_by_name(&name)?.id);
            }
            if let Some(code) = location {
                filters.location_id = Some(LocationDirectory::new(session.db).find_by_code(&code)?.id);
            }

            let page = store.page(limit, offset, &filters)?;
            if page.items.is_empty() {
                println!("No vault entries found.");
                return Ok(());
            }
            println!("Vault entries ({} of {}):\n", page.items.len(), page.total);
            for entry in &page.items {
                print_entry_line(entry);
            }
        }
        EntryCommand::Get { id } => print_entry(&store.find_by_id(id)?),
        EntryCommand::Reveal { id } => {
            let secret = store.reveal_secret(id, actor, None)?;
            println!("{}", secret.as_str());
        }
        EntryCommand::Update { id, set } => {
            session.require_edit()?;
            let entry = store.update(id, &parse_assignments(ENTRY_FIELDS, &set)?, actor)?;
            println!("✓ Vault entry {} updated", entry.id);
        }
        EntryCommand::Favorite { id } => {
            session.require_edit()?;
            let entry = store.toggle_favorite(id, actor)?;
            if entry.favorite {
                println!("✓ {} added to favorites", entry.title);
            } else {
                println!("✓ {} removed from favorites", entry.title);
            }
        }
        EntryCommand::Delete { id } => {
            session.require_edit()?;
            store.deactivate(id, actor)?;
            println!("✓ Vault entry {} deactivated", id);
        }
        EntryCommand::Restore { id } => {
            session.require_edit()?;
            let entry = store.reactivate(id, actor)?;
            println!("✓ Vault entry {} restored", entry.id);
        }
        EntryCommand::Expiring { days } => {
            let entries = store.find_expiring(days)?;
            if entries.is_empty() {
                println!("Nothing expires in the next {} days.", days);
                return Ok(());
            }
            for entry in &entries {
                print_entry_line(entry);
            }
        }
        EntryCommand::Stats { id } => {
            let stats = store.stats(id)?;
            println!("  Reveals:         {}", stats.total_reads);
            println!("  Last 7 days:     {}", stats.reads_last_7_days);
            println!("  Access counter:  {}", stats.access_count);
            if let Some(at) = stats.last_read_at {
                println!("  Last revealed:   {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
            }
        }
    }
    Ok(())
}

fn new_entry(session: &Session<'_>, args: EntryArgs) -> Result<NewVaultEntry, CofreError> {
    let location = LocationDirectory::new(session.db).find_by_code(&args.location)?;
    let category = CategoryDirectory::new(session.db).find_by_name(&args.category)?;
    let expires_at = match args.expires.as_deref() {
        Some(raw) => Some(parse_expiry(raw).ok_or_else(|| {
            CofreError::Other(format!("'{}' is not a date (YYYY-MM-DD) or RFC 3339 timestamp", raw))
        })?),
        None => None,
    };

    Ok(NewVaultEntry {
        url: args.url,
        notes: args.notes,
        tags: args.tags.split(',').map(str::to_string).collect(),
        favorite: args.favorite,
        expires_at,
        requires_rotation: args.rotate,
        ..NewVaultEntry::new(location.id, category.id, args.title, args.login, args.secret)
    })
}

/// `field=value` pairs into a JSON object. Flags (`true`) and tag lists
/// (`["a","b"]`) are read as JSON; every other field keeps the literal text,
/// so `login=1001` stays the string "1001".
fn parse_assignments(specs: &[FieldSpec], pairs: &[String]) -> Result<Map<String, JsonValue>, CofreError> {
    let mut fields = Map::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| CofreError::Other(format!("expected FIELD=VALUE, got '{}'", pair)))?;
        let key = key.trim();
        let text = || JsonValue::String(raw.to_string());
        let value = match update::kind_of(specs, key) {
            Some(FieldKind::Flag | FieldKind::Tags) => serde_json::from_str(raw).unwrap_or_else(|_| text()),
            _ => text(),
        };
        fields.insert(key.to_string(), value);
    }
    Ok(fields)
}

fn print_entry_line(entry: &VaultEntry) {
    let marker = if entry.favorite { "★" } else { " " };
    let expiry = entry
        .expires_at
        .map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_default();
    println!(
        "  {} {:>5} │ {:28} │ {:16} │ {:12} │ {:10} │ {}",
        marker, entry.id, entry.title, entry.login, entry.location_name, entry.category_name, expiry
    );
}

fn print_entry(entry: &VaultEntry) {
    println!("Vault entry details:\n");
    println!("  ID:        {}", entry.id);
    println!("  UUID:      {}", entry.uuid);
    println!("  Title:     {}", entry.title);
    println!("  Login:     {}", entry.login);
    println!("  Secret:    [REDACTED] (use `cofre entry reveal {}`)", entry.id); // Never print the secret!
    println!("  Location:  {}", entry.location_name);
    println!("  Category:  {}", entry.category_name);
    if let Some(url) = &entry.url {
        println!("  URL:       {}", url);
    }
    if let Some(notes) = &entry.notes {
        println!("  Notes:     {}", notes);
    }
    if !entry.tags.is_empty() {
        println!("  Tags:      {}", entry.tags.join(", "));
    }
    println!("  Favorite:  {}", entry.favorite);
    println!("  Accesses:  {}", entry.access_count);
    if let Some(at) = entry.last_accessed_at {
        println!("  Last used: {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(at) = entry.expires_at {
        let state = if entry.is_expired() {
            " (expired)"
        } else if entry.is_expiring_soon(EXPIRING_SOON_DAYS) {
            " (expiring soon)"
        } else {
            ""
        };
        println!("  Expires:   {}{}", at.format("%Y-%m-%d %H:%M UTC"), state);
    }
    if entry.requires_rotation {
        println!("  Rotation:  required");
    }
    println!("  Created:   {} by {}", entry.created_at.format("%Y-%m-%d %H:%M:%S UTC"), entry.created_by_name);
    println!("  Updated:   {}", entry.modified_at.format("%Y-%m-%d %H:%M:%S UTC"));
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn open_db(config: &CofreConfig) -> Result<Database, CofreError> {
    Ok(Database::open(config)?)
}

/// `COFRE_MASTER_KEY` (hex) when set, otherwise the platform keyring.
fn master_key_provider() -> Result<Box<dyn MasterKeyProvider>, CofreError> {
    match std::env::var(MASTER_KEY_ENV) {
        Ok(hex) => Ok(Box::new(StaticKeyProvider::from_hex(&hex)?)),
        Err(_) => Ok(Box::new(KeyringProvider::new())),
    }
}

fn open_cipher() -> Result<SecretCipher, CofreError> {
    let provider = master_key_provider()?;
    if !provider.has_master_secret()? {
        return Err(EnclaveError::MasterSecretNotFound.into());
    }
    Ok(SecretCipher::from_provider(provider.as_ref())?)
}

fn authenticate(
    config: &CofreConfig,
    db: &Database,
    email: Option<String>,
    password: Option<String>,
) -> Result<(User, Zeroizing<String>), CofreError> {
    let (Some(email), Some(password)) = (email, password) else {
        return Err(CofreError::Other(
            "Set the acting identity with --as <email> and --password (or COFRE_USER / COFRE_PASSWORD)".to_string(),
        ));
    };
    let password = Zeroizing::new(password);
    let user = IdentityDirectory::new(db, config.password_cost).authenticate(&email, &password, None)?;
    Ok((user, password))
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{category_id, seed_location, seed_user, test_cipher};
    use serde_json::json;

    fn pairs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_assignments_types_only_flags_and_tags() {
        let fields = parse_assignments(
            ENTRY_FIELDS,
            &pairs(&[
                "title=Core Router",
                "favorite=true",
                "location_id=4",
                "tags=[\"a\",\"b\"]",
                "notes=",
            ]),
        )
        .unwrap();

        assert_eq!(fields["title"], json!("Core Router"));
        assert_eq!(fields["favorite"], json!(true));
        assert_eq!(fields["location_id"], json!("4"));
        assert_eq!(fields["tags"], json!(["a", "b"]));
        assert_eq!(fields["notes"], json!(""));
    }

    #[test]
    fn test_parse_assignments_keeps_numeric_text_as_text() {
        let fields = parse_assignments(
            ENTRY_FIELDS,
            &pairs(&["login=1001", "secret=123456", "title=2024", "tags=core,vpn"]),
        )
        .unwrap();

        assert_eq!(fields["login"], json!("1001"));
        assert_eq!(fields["secret"], json!("123456"));
        assert_eq!(fields["title"], json!("2024"));
        assert_eq!(fields["tags"], json!("core,vpn"));
    }

    #[test]
    fn test_numeric_login_and_pin_update_through_the_store() {
        let (_dir, db) = Database::open_temp();
        let cipher = test_cipher();
        let actor = seed_user(&db, "Ana", "ana@example.com", "admin");
        let location = seed_location(&db, "SP01", "Sao Paulo", actor);
        let store = SqliteVaultStore::new(&db, &cipher);
        let entry = store
            .create(
                NewVaultEntry::new(location, category_id(&db, "network"), "Router", "admin", "s3cret"),
                actor,
            )
            .unwrap();

        let fields = parse_assignments(
            ENTRY_FIELDS,
            &pairs(&["secret=123456", "login=1001", "title=2024", "favorite=true", "tags=core, vpn"]),
        )
        .unwrap();
        let updated = store.update(entry.id, &fields, actor).unwrap();

        assert_eq!(updated.login, "1001");
        assert_eq!(updated.title, "2024");
        assert!(updated.favorite);
        assert_eq!(updated.tags, vec!["core", "vpn"]);
        assert_eq!(store.reveal_secret(entry.id, actor, None).unwrap().as_str(), "123456");
    }

    #[test]
    fn test_parse_assignments_rejects_missing_equals() {
        assert!(parse_assignments(ENTRY_FIELDS, &pairs(&["title"])).is_err());
    }
}
