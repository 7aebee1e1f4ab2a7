pub mod agent;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod invocation;
pub mod lifecycle;

pub use agent::AgentMain;
pub use config::ShellConfig;
pub use dispatch::Shell;
pub use error::ShellError;
pub use invocation::Invocation;
