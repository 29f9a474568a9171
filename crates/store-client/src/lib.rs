//! Kubernetes store client for the AppService operator
//!
//! Typed get/create/update access to `AppService`, `Deployment` and `Service`
//! objects, with not-found and conflict responses surfaced as distinct errors.
//!
//! # Example
//!
//! ```no_run
//! use store_client::{OptionalExt, StoreClient, StoreClientTrait};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = StoreClient::try_default().await?;
//!
//! if let Some(deployment) = client.get_deployment("default", "web").await.optional()? {
//!     println!("found {:?}", deployment.metadata.name);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod store_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::StoreClient;
pub use error::{Operation, OptionalExt, ResourceKind, StoreError};
pub use store_trait::StoreClientTrait;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockStoreClient;
