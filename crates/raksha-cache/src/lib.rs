//! RakshaNet Cache - offline-resilient caching and request routing
//!
//! Every outbound request of the client passes through a [`CacheAgent`]:
//! - A versioned, content-addressed store holding exactly one live generation
//! - An atomic installer that populates a generation from the shell manifest
//! - A router deciding per request between network and cache
//!
//! # Example
//!
//! ```rust,ignore
//! use raksha_cache::prelude::*;
//! use std::{sync::Arc, time::Duration};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = Arc::new(HttpFetcher::new(Duration::from_secs(5))?);
//! let agent = CacheAgent::new(&CacheConfig::default(), fetcher)?;
//! agent.start().await;
//!
//! let page = agent
//!     .on_request(Request::navigate("http://localhost:8080/pages/journey.html".parse()?))
//!     .await?;
//! println!("{} from {:?}", page.status(), page.source);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod agent;
pub mod config;
pub mod error;
pub mod fetch;
pub mod hash;
pub mod installer;
pub mod manifest;
pub mod request;
pub mod router;
pub mod store;

pub use agent::CacheAgent;
pub use config::{CacheConfig, DEFAULT_CACHE_VERSION};
pub use error::{CacheConfigError, CacheError, CacheResult, FetchError, InstallError, RouteError};
pub use fetch::{Fetcher, HttpFetcher};
pub use hash::ContentHash;
pub use installer::{CacheInstaller, InstallReport};
pub use manifest::{ShellManifest, DEFAULT_SHELL, DEFAULT_SHELL_ROOT};
pub use request::{Destination, Payload, Request, ResourceKey, Response, ResponseSource};
pub use router::{RequestRouter, RoutingDecision, RoutingPolicy};
pub use store::{Activation, CacheGeneration, VersionedCacheStore};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the cache agent
    pub use crate::{
        CacheAgent, CacheConfig, Destination, Fetcher, HttpFetcher, Payload, Request,
        RequestRouter, ResourceKey, Response, ResponseSource, RouteError, RoutingDecision,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
