//! Identification sources and their aggregation.
//!
//! - [`source`]: the [`IdentificationSource`] trait every mechanism
//!   implements.
//! - [`group`]: the [`SourceGroup`] owning all sources, keeping the history
//!   of identified users and fanning events out to subscribers.
//! - [`smart_card`] and [`mass_storage`]: the two mechanisms.
//!
//! Everything here runs on the consumer context, a tokio `LocalSet`.

pub mod error;
pub mod group;
pub mod mass_storage;
pub mod smart_card;
pub mod source;

pub use error::{MarkerError, Result};
pub use group::{SourceGroup, SubscriptionId};
pub use mass_storage::MassStorageSource;
pub use smart_card::SmartCardSource;
pub use source::{IdentificationListener, IdentificationSource, SourceState};
