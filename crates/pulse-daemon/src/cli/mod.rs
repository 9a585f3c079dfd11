mod commands;
mod init;
mod run;
mod utils;

pub use commands::{Cli, Commands};
pub use init::{init_node, seed_feeds};
pub use run::run_node;
pub use utils::init_logging;
