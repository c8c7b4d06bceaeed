// Correlation window for a tip intent, in seconds
pub const PENDING_TIP_TTL_SECS: i64 = 5 * 60;

pub const DRAW_HISTORY_CAP: usize = 50;

// Stored in place of "no upper bound" so the document stays serializable
pub const UNBOUNDED_MAX_AMOUNT: f64 = 1_000_000.0;

pub const SATOSHI_PER_BTC: f64 = 100_000_000.0;

/// Donation amounts are compared in whole micro-dollars.
pub const MICRO_USD_PER_USD: f64 = 1_000_000.0;

pub const MAX_DRAW_ID_LEN: usize = 32;

pub const SCHEMA_VERSION: u32 = 2;

// Backups kept per guild before the oldest is pruned
pub const BACKUP_RETENTION: usize = 20;

pub const PRICE_CACHE_TTL_SECS: i64 = 60;

// How far ahead of draw_time the scheduler announces an upcoming draw
pub const NOTIFY_AHEAD_SECS: i64 = 30 * 60;

pub const DEFAULT_LEADERBOARD_SIZE: usize = 10;

pub const DEFAULT_ACCEPTED_CURRENCIES: [&str; 7] =
    ["BTC", "ETH", "LTC", "USDT", "USDC", "SOL", "DOGE"];

pub const STABLECOINS: [&str; 4] = ["USDT", "USDC", "DAI", "BUSD"];
