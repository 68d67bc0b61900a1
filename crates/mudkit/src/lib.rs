//! Mudkit - Command shell and ACL-guarded virtual filesystem for MUD drivers
//!
//! Two subsystems make up the core of a multi-user virtual-world driver:
//!
//! - [`parser`] and [`shell`]: a POSIX-like command line grammar with
//!   history references, aliases, variables, pipelines, command lists and
//!   redirection, producing [`parser::ParsedCommand`] trees
//! - [`acl`] and [`fs`]: hierarchical, inheritable access control lists
//!   enforced by a [`fs::FileManager`] over mounted filesystems
//!
//! # Example
//!
//! ```rust
//! use mudkit::acl::{AclEngine, Permission};
//!
//! #[tokio::main]
//! async fn main() -> mudkit::Result<()> {
//!     let cmd = mudkit::parse("look north && say hi", &Default::default())?
//!         .expect("line is not blank");
//!     assert_eq!(cmd.verb, "look");
//!
//!     let engine = AclEngine::builder().build();
//!     engine.set_permissions("/realms", "merlin", Permission::READ | Permission::WRITE).await?;
//!     assert!(engine.check("/realms/oak.c", "merlin", Permission::WRITE).await?);
//!     Ok(())
//! }
//! ```

pub mod acl;
mod error;
pub mod fs;
pub mod logging_impl;
pub mod parser;
pub mod paths;
pub mod shell;

pub use async_trait::async_trait;
pub use error::{Error, Result};
pub use parser::{ParsedCommand, parse};
pub use shell::{Shell, ShellInput, ShellOptions};
