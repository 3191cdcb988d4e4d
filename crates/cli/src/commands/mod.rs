pub mod config;
pub mod inspect;
pub mod run;

pub use config::*;
pub use inspect::*;
pub use run::*;
