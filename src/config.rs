//! Process configuration: database DSN and HMAC salts, loaded from CLI
//! flags with environment-variable fallback (flags win on conflict, per
//! clap's own precedence rules when both a flag and its matching `env`
//! are set).

use clap::Parser;

/// A non-secret fallback so the abuse-signal IP hash still works out of the
/// box; unlike `admin_salt`/`slug_salt` this one has no authentication
/// consequence if left unrotated, only weaker abuse-signal unlinkability.
const DEFAULT_IP_SALT: &str = "quickly-pick-default-ip-salt-rotate-in-prod";

#[derive(Debug, Clone, Parser)]
#[command(name = "quickly-pick")]
#[command(about = "Group-decision polling service (Balanced Majority Judgment)")]
pub struct Config {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// HMAC key used to derive admin keys from poll ids. Rotating this
    /// invalidates every previously issued admin key.
    #[arg(long, env = "ADMIN_SALT")]
    pub admin_salt: String,

    /// HMAC key used to derive share slugs from poll ids. Rotating this
    /// invalidates every previously issued slug.
    #[arg(long, env = "SLUG_SALT")]
    pub slug_salt: String,

    /// HMAC key used to hash voter IPs for abuse signals only.
    #[arg(long, env = "IP_SALT", default_value = DEFAULT_IP_SALT)]
    pub ip_salt: String,

    /// HTTP listen port.
    #[arg(long, env = "PORT", default_value_t = 3318)]
    pub port: u16,

    /// Maximum Postgres pool connections.
    #[arg(long, env = "MAX_DB_CONNECTIONS", default_value_t = 10)]
    pub max_db_connections: u32,
}

impl Config {
    pub fn load() -> Self {
        Config::parse()
    }
}
