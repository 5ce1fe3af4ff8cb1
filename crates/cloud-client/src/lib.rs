//! Cluster-backed vendor adapter
//!
//! Everything the allocation engine reads or writes outside its own process
//! goes through [`CloudClientTrait`]: load-balancer-backed network objects
//! (Services), prewarmed pool resources (DedicatedLoadBalancer / ElasticIP
//! CRs), and workload-set lookups. Vendor-specific object shapes stay behind
//! this seam so the engine itself is cloud-agnostic.
//!
//! # Example
//!
//! ```no_run
//! use cloud_client::{CloudClientTrait, KubeCloudClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let kube = kube::Client::try_default().await?;
//! let client = KubeCloudClient::new(kube, None);
//!
//! // List every network object this system materialized
//! let objects = client.list_network_objects().await?;
//! for obj in objects {
//!     println!("{}: {:?}", obj.spec.name, obj.ingress);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod cloud_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::KubeCloudClient;
pub use cloud_trait::CloudClientTrait;
pub use error::CloudError;
pub use models::*;
#[cfg(feature = "test-util")]
pub use mock::MockCloudClient;
