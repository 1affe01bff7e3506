//! Command implementations.

pub mod import;
pub mod init;
pub mod passes;
pub mod review;
pub mod stats;
pub mod vocab;

pub use self::import::execute_import;
pub use self::init::execute_init;
pub use self::passes::{execute_conflicts, execute_curate, execute_optimize, execute_run};
pub use self::review::{execute_proposal, execute_resolve, execute_retag, execute_salience};
pub use self::stats::execute_stats;
pub use self::vocab::execute_vocab;
