// Cofre — CLI Module
//
// Command-line interface using clap derive macros.
// Subcommands: init, login, user, location, category, entry.

mod commands;

use clap::{Args, Parser, Subcommand};

pub use commands::execute;

/// Cofre: shared credential vault for distributed sites.
#[derive(Parser, Debug)]
#[command(name = "cofre")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// E-mail of the identity performing the command.
    #[arg(long = "as", global = true, env = "COFRE_USER")]
    pub acting_as: Option<String>,

    /// Password of the acting identity.
    #[arg(long, global = true, env = "COFRE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the database and cipher key; bootstrap the first administrator.
    Init {
        /// Name of the first administrator (only when no user exists yet).
        #[arg(long, requires_all = ["admin_email", "admin_password"])]
        admin_name: Option<String>,

        #[arg(long)]
        admin_email: Option<String>,

        #[arg(long)]
        admin_password: Option<String>,
    },

    /// Check the acting identity's credentials.
    Login,

    /// Manage identities.
    #[command(subcommand)]
    User(UserCommand),

    /// Manage locations.
    #[command(subcommand)]
    Location(LocationCommand),

    /// Inspect categories.
    #[command(subcommand)]
    Category(CategoryCommand),

    /// Manage vault entries.
    #[command(subcommand)]
    Entry(EntryCommand),
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    /// Register a user (admin only).
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        /// Initial password (at least 6 characters).
        #[arg(long = "new-password")]
        new_password: String,
        /// admin, editor or viewer.
        #[arg(long, default_value = "viewer")]
        level: String,
    },

    /// List active users.
    List {
        #[arg(long, default_value = "50")]
        limit: u32,
        #[arg(long, default_value = "0")]
        offset: u32,
    },

    /// Change the acting identity's password.
    Passwd {
        #[arg(long = "new-password")]
        new_password: String,
    },

    /// Deactivate a user (admin only).
    Deactivate { id: i64 },
}

#[derive(Subcommand, Debug)]
pub enum LocationCommand {
    /// Register a location.
    Add(LocationArgs),

    /// List active locations.
    List {
        /// Case-insensitive filter over code, name, city and tax id.
        #[arg(long)]
        search: Option<String>,
        /// Only locations in this region.
        #[arg(long, conflicts_with = "search")]
        region: Option<String>,
        /// Only locations in this city of `--region`.
        #[arg(long, requires = "region")]
        city: Option<String>,
        #[arg(long, default_value = "50")]
        limit: u32,
        #[arg(long, default_value = "0")]
        offset: u32,
    },

    /// Show one location and its entry figures.
    Show { code: String },

    /// Deactivate a location with no active entries.
    Deactivate { code: String },

    /// Restore a deactivated location.
    Reactivate { id: i64 },
}

#[derive(Args, Debug)]
pub struct LocationArgs {
    #[arg(long)]
    pub code: String,
    #[arg(long)]
    pub name: String,
    /// 14-digit tax id; punctuation is ignored.
    #[arg(long)]
    pub tax_id: Option<String>,
    #[arg(long)]
    pub region: Option<String>,
    #[arg(long)]
    pub city: Option<String>,
    #[arg(long)]
    pub address: Option<String>,
    #[arg(long)]
    pub phone: Option<String>,
    #[arg(long)]
    pub email: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum CategoryCommand {
    /// List categories.
    List,
}

#[derive(Subcommand, Debug)]
pub enum EntryCommand {
    /// Store a new credential.
    Add(EntryArgs),

    /// List entries (metadata only, no secrets).
    List {
        /// Category name.
        #[arg(long)]
        category: Option<String>,
        /// Location code.
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        favorites: bool,
        /// Only entries expiring within 30 days.
        #[arg(long)]
        expiring: bool,
        /// Case-insensitive filter over title, login and notes.
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value = "50")]
        limit: u32,
        #[arg(long, default_value = "0")]
        offset: u32,
    },

    /// Show one entry (metadata only).
    Get { id: i64 },

    /// Print the secret. The access is counted and audit-logged.
    Reveal { id: i64 },

    /// Change fields: --set title="Core Router" --set favorite=true
    Update {
        id: i64,
        #[arg(long = "set", value_name = "FIELD=VALUE", required = true)]
        set: Vec<String>,
    },

    /// Add to or remove from favorites.
    Favorite { id: i64 },

    /// Deactivate an entry.
    Delete { id: i64 },

    /// Restore a deactivated entry.
    Restore { id: i64 },

    /// Entries expiring soon, soonest first.
    Expiring {
        #[arg(long, default_value = "30")]
        days: i64,
    },

    /// Reveal history of an entry.
    Stats { id: i64 },
}

#[derive(Args, Debug)]
pub struct EntryArgs {
    /// Location code.
    #[arg(long)]
    pub location: String,
    /// Category name.
    #[arg(long)]
    pub category: String,
    #[arg(long)]
    pub title: String,
    #[arg(long)]
    pub login: String,
    /// For production use, prefer `COFRE_ENTRY_SECRET` to keep it out of shell history.
    #[arg(long, env = "COFRE_ENTRY_SECRET", hide_env_values = true)]
    pub secret: String,
    #[arg(long)]
    pub url: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
    /// Comma-separated tags.
    #[arg(long, default_value = "")]
    pub tags: String,
    /// Expiry date (YYYY-MM-DD) or RFC 3339 timestamp.
    #[arg(long)]
    pub expires: Option<String>,
    #[arg(long)]
    pub favorite: bool,
    /// Flag the credential for rotation.
    #[arg(long)]
    pub rotate: bool,
}
