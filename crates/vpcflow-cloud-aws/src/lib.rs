//! AWS EC2 provider for vpcflow
//!
//! This crate implements the `CloudApi` trait from `vpcflow-cloud` on top of
//! `aws-sdk-ec2`. Every trait call maps onto one EC2 request; waiting and
//! ordering live in the engine.
//!
//! # Requirements
//!
//! - AWS credentials available through the standard chain
//!   (`AWS_ACCESS_KEY_ID`/`AWS_SECRET_ACCESS_KEY`, `~/.aws/credentials`, or an instance role)
//! - A region from `--region`, `AWS_REGION`, or the shared config
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use vpcflow_cloud::{CloudApi, CloudContext};
//! use vpcflow_cloud_aws::Ec2Provider;
//!
//! let api: Arc<dyn CloudApi> = Arc::new(Ec2Provider::from_env(None).await);
//! let ctx = CloudContext::new("dev", api);
//! let networks = ctx.networks().list_networks().await?;
//! ```

mod convert;
pub mod error;
pub mod provider;

pub use error::{AwsError, Result};
pub use provider::Ec2Provider;
