//! The compiler plugin contract, the loader's plugin table, and two
//! reference plugins (`resource`, `line-script`) used to exercise the
//! loader without a real source-language toolchain.
#![forbid(unsafe_code)]

pub mod compiler;
pub mod error;
pub mod line_script;
pub mod plugin_table;
pub mod resource;

pub use compiler::Compiler;
pub use error::CompileError;
pub use line_script::LineScriptCompiler;
pub use plugin_table::PluginTable;
pub use resource::ResourceCompiler;
