pub mod config_cmd;
pub mod record;
pub mod sync_cmd;

pub use config_cmd::ConfigCommand;
pub use record::RecordCommand;
pub use sync_cmd::SyncCommand;
