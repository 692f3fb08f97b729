//! Energy-site access
//!
//! # Module Layout
//!
//! - `client`: the [`EnergyApi`] seam and its owner API implementation
//! - `controller`: backup reserve commands on top of an [`EnergyApi`]

pub mod client;
pub mod controller;

pub use client::{EnergyApi, LiveStatus, OwnerApiClient, SiteId, SiteLookup};
pub use controller::{CommandOutcome, DeviceController, ReserveCommand};
