//! 命令定义和实现

pub mod config;
pub mod dump;
pub mod list;
pub mod run_script;
pub mod simulate;

pub use config::ConfigCommand;
pub use dump::DumpCommand;
pub use list::list;
pub use run_script::RunScriptCommand;
pub use simulate::SimulateCommand;
