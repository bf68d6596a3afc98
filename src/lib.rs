//! Worldstack
//!
//! Bookkeeping for Stacks and the Worlds they contain.
//!
//! ## Features
//!
//! - **Stack Registry**: A machine-wide, lock-protected list of the Stacks checked
//!   out on this machine and the repository each one was cloned from
//! - **World Definitions**: XML documents declaring the repositories of a World
//!   and the folders they live in, flattened into a validated layout
//! - **Plugin Configuration**: Per-world plugin sections with enable/disable,
//!   committed to the Stack's repository
//!
//! ## Architecture
//!
//! ```text
//! <data_dir>/
//! ├── StackRegistry.txt        # <stack path>*<repository url>, one per line
//! └── StackRegistry.lock
//!
//! /work/dev/MyStack/PublicStack/
//! ├── MyWorld.xml              # world definition
//! └── MyWorld/                 # world root, repositories laid out below it
//!     └── Libraries/
//!         └── core/
//! ```

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod lock;
pub mod normalize;
pub mod registry;
pub mod vcs;
pub mod world;

pub use config::StackConfig;
pub use diagnostics::{Diagnostic, Diagnostics};
pub use error::{Result, StackError};
pub use lock::{FileLock, LockGuard, NamedLock};
pub use normalize::RepoUrl;
pub use registry::{RegistryEntry, StackKind, StackRegistry};
pub use vcs::{GitRepository, VersionControl};
pub use world::layout::{LayoutOrder, RepoLayoutEntry};
pub use world::plugins::PluginConfig;
pub use world::{CompileMode, EditScope, WorldDefinition, WorldOptions};
