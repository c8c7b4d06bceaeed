pub use document::*;
pub use draw::*;
pub use guild_config::*;
pub use pending_tip::*;
pub use user_account::*;
pub use winner_record::*;

pub mod document;
pub mod draw;
pub mod guild_config;
pub mod pending_tip;
pub mod user_account;
pub mod winner_record;
