//! Engine capability contract for bdl
//!
//! Engines know how to list and fetch the files of one family of remote
//! sites. The core never talks to a site directly: it asks an
//! [`EngineRegistry`] which engine handles a URL and then drives that
//! engine through the [`Engine`] trait.
//!
//! ```text
//!            bdl-core
//!               |
//!        EngineRegistry ── resolve(url) ──> (engine_id, site_id)
//!               |
//!     +---------+---------+
//!     |                   |
//!  LocalEngine     third-party engines
//! ```

pub mod engine;
pub mod error;
pub mod local;
pub mod metadata;
pub mod registry;
pub mod site;

pub use engine::{ByteStream, Engine, ItemDescriptor, RemoteEntry, RepositoryDescriptor};
pub use error::{EngineError, EngineResult, Error, Result};
pub use local::LocalEngine;
pub use metadata::{MetaValue, Metadata};
pub use registry::{EngineRegistry, Resolution, default_repository_name};
pub use site::SiteDefinition;
