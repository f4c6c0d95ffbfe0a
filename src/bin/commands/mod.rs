pub mod export_cmd;
pub mod inspect_cmd;
pub mod lookup_cmd;

pub use export_cmd::cmd_export;
pub use inspect_cmd::cmd_inspect;
pub use lookup_cmd::cmd_lookup;
