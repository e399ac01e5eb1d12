pub mod bot;
pub mod run;

pub use bot::*;
pub use run::*;
