pub use allocate_entries::*;
pub use assign_entries::*;
pub use create_draw::*;
pub use draw_status::*;
pub use edit_draw::*;
pub use manage_config::*;
pub use reset_draw::*;
pub use reset_leaderboard::*;
pub use schedule_draw::*;
pub use select_winner::*;

pub mod allocate_entries;
pub mod assign_entries;
pub mod create_draw;
pub mod draw_status;
pub mod edit_draw;
pub mod manage_config;
pub mod reset_draw;
pub mod reset_leaderboard;
pub mod schedule_draw;
pub mod select_winner;
