pub use commands::{execute, parse_command, Command, Invoker};
pub use donation::{DonationOutcome, DonationPipeline};
pub use ledger::GuildLedger;
pub use settings::Settings;

pub mod bot;
pub mod commands;
pub mod constants;
pub mod correlator;
pub mod donation;
pub mod error;
pub mod instructions;
pub mod ledger;
pub mod parser;
pub mod price;
pub mod randomness;
pub mod scheduler;
pub mod settings;
pub mod state;
pub mod store;
pub mod tiers;
