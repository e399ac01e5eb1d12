pub mod bot_store;
pub mod run_store;

pub use bot_store::BotStore;
pub use run_store::RunStore;
