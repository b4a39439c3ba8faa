//! Registry collaborators.
//!
//! The migration pipeline talks to registries only through the traits in
//! [`source`]. [`gemfury`] and [`npm`] are the HTTP and subprocess backed
//! implementations used by the CLI.

pub mod error;
pub mod gemfury;
pub mod http;
pub mod npm;
pub mod source;

pub use error::{RegistryError, RegistryResult};
pub use gemfury::GemfurySource;
pub use http::HttpClient;
pub use npm::{NpmPublisher, NpmRegistry};
pub use source::{DestinationRegistry, PublishOutcome, Publisher, SourceRegistry};
