//! AWS provider error types

use thiserror::Error;
use vpcflow_cloud::CloudError;

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("{operation} failed: {message}")]
    Sdk {
        operation: &'static str,
        message: String,
    },

    #[error("{operation} response is missing '{field}'")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },

    #[error("{operation} returned unknown state '{value}'")]
    UnknownState {
        operation: &'static str,
        value: String,
    },
}

impl AwsError {
    pub(crate) fn missing(operation: &'static str, field: &'static str) -> Self {
        AwsError::MissingField { operation, field }
    }
}

impl From<AwsError> for CloudError {
    fn from(err: AwsError) -> Self {
        CloudError::Api(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AwsError>;

/// Map an SDK error into `AwsError::Sdk`, keeping the full error chain in the message
pub(crate) fn sdk<E>(operation: &'static str) -> impl FnOnce(E) -> AwsError
where
    E: std::error::Error + 'static,
{
    move |err| AwsError::Sdk {
        operation,
        message: aws_sdk_ec2::error::DisplayErrorContext(&err).to_string(),
    }
}
