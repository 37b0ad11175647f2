// Cofre — Directory Module
//
// Reference data that vault entries point at: identities, locations and
// categories. Each directory owns its table; the vault store only reads them.

mod categories;
mod identity;
mod locations;

pub use categories::{Category, CategoryDirectory};
pub use identity::{normalize_email, AccessLevel, IdentityDirectory, NewUser, User, MIN_PASSWORD_LEN};
pub use locations::{
    format_tax_id, normalize_tax_id, Location, LocationDirectory, LocationStats, NewLocation, TAX_ID_DIGITS,
};
