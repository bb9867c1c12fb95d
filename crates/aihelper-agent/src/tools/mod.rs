//! Tool modules for the agent: the tool contract, registry, argument
//! validation, and the built-in tools.

pub mod base;
pub mod filesystem;
pub mod registry;
pub mod schema;
pub mod shell;
pub mod system;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use aihelper_core::config::ToolsConfig;

pub use base::{optional_bool, optional_i64, optional_string, require_string, Tool};
pub use registry::{describe_specs, RegisteredTool, RegistryError, ToolRegistry};
pub use schema::{validate, SchemaError};

/// Register the built-in tools configured by `config`.
pub fn register_builtin_tools(
    registry: &mut ToolRegistry,
    config: &ToolsConfig,
) -> Result<(), RegistryError> {
    let workspace = if config.workspace.trim().is_empty() {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    } else {
        aihelper_core::utils::expand_home(config.workspace.trim())
    };
    let access = filesystem::FsAccess::new(workspace.clone(), config.restrict_to_workspace);

    registry.register_tool(Arc::new(filesystem::ReadFileTool::new(access.clone())))?;
    registry.register_tool(Arc::new(filesystem::ListDirTool::new(access.clone())))?;
    registry.register_tool(Arc::new(filesystem::SearchFilesTool::new(access.clone())))?;
    registry.register_tool(Arc::new(filesystem::WriteFileTool::new(access.clone())))?;
    registry.register_tool(Arc::new(filesystem::AppendFileTool::new(access)))?;
    registry.register_tool(Arc::new(shell::ExecTool::new(
        workspace,
        Duration::from_secs(config.exec.timeout.max(1)),
        config.restrict_to_workspace,
    )))?;
    registry.register_tool(Arc::new(system::SystemInfoTool::new()))?;
    Ok(())
}
