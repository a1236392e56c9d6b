//! vpcflow Cloud Engine
//!
//! Provisions and tears down a multi-tier network topology: an admin network with a
//! bastion host, application networks peered with it, their zones, security groups and
//! machine instances.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                    vpc CLI                       │
//! │           (setup / create / destroy)             │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                vpcflow-cloud                     │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  Environment (setup, cleanup, ssh, ...)  │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌─────────┐ ┌──────┐ ┌──────────┐ ┌────────┐   │
//! │  │ Network │ │ Zone │ │ Security │ │Peering │   │
//! │  └─────────┘ └──────┘ └──────────┘ └────────┘   │
//! │  ┌──────────┐ ┌──────────────────┐              │
//! │  │ Instance │ │ RemoteExecRelay  │──── ssh      │
//! │  └──────────┘ └──────────────────┘              │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │       trait CloudApi { ... }              │   │
//! │  └──────────────────────────────────────────┘   │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//!           ┌───────▼───────┐
//!           │  vpcflow-     │
//!           │  cloud-aws    │
//!           └───────────────┘
//! ```
//!
//! Resources are identified by tags (`Name`, `Env`, `Network`, `Zone`, `Peering`); there is
//! no local state.

pub mod context;
pub mod environment;
pub mod error;
pub mod instance;
pub mod model;
pub mod network;
pub mod peering;
pub mod provider;
pub mod relay;
pub mod report;
pub mod security;
pub mod wait;
pub mod zone;

// Re-exports
pub use context::{CloudContext, LogPolicy};
pub use environment::{
    ADMIN_CIDR, ADMIN_NETWORK, BASTION_CIDR, BASTION_MACHINE, BASTION_ZONE, Environment,
    EnvironmentStatus, NetworkStatus, SetupOptions, SetupOutcome,
};
pub use error::{CloudError, Result};
pub use instance::{InstanceManager, MachineSpec};
pub use model::{
    InstanceState, Machine, Network, NetworkState, PeeringConnection, PeeringKey, PeeringState,
    SecurityGroup, Zone,
};
pub use network::NetworkManager;
pub use peering::PeeringManager;
pub use provider::CloudApi;
pub use relay::{
    CommandRunner, ConnectionProfile, HostKeyPolicy, RemoteExecRelay, SystemRunner,
};
pub use report::{StepResult, TeardownReport};
pub use security::{EgressPolicy, SecurityPolicyManager};
pub use wait::{WaitConfig, WaitSettings};
pub use zone::ZoneManager;
