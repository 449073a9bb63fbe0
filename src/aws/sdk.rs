//! Shared AWS SDK configuration and error mapping.

use std::error::Error as StdError;
use std::fmt::Debug;

use aws_config::SdkConfig;
use aws_sdk_ecs::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use tracing::debug;

use crate::error::{ApiError, Result};

/// Loads the SDK configuration from the default provider chain.
///
/// An explicit `region` takes precedence over the environment and the
/// shared profile.
///
/// # Errors
///
/// Returns an error if no region can be resolved.
pub async fn load_sdk_config(region: Option<&str>) -> Result<SdkConfig> {
    let mut loader = aws_config::from_env();
    if let Some(region) = region {
        loader = loader.region(aws_config::Region::new(region.to_string()));
    }
    let config = loader.load().await;

    match config.region() {
        Some(region) => debug!("AWS clients configured for region {region}"),
        None => {
            return Err(ApiError::Credentials {
                operation: String::from("configure"),
                message: String::from("no AWS region configured"),
            }
            .into());
        }
    }
    Ok(config)
}

/// Maps an SDK error of `operation` (`ecs:UpdateService`) to an [`ApiError`].
pub(crate) fn api_error<E, R>(operation: &str, err: &SdkError<E, R>) -> ApiError
where
    E: ProvideErrorMetadata + StdError + 'static,
    R: Debug,
{
    match err {
        SdkError::ServiceError(service) => {
            let inner = service.err();
            let message = inner
                .message()
                .map_or_else(|| DisplayErrorContext(inner).to_string(), ToString::to_string);
            debug!("{operation} returned {}", inner.code().unwrap_or("an unknown error"));
            ApiError::request_failed(operation, inner.code().unwrap_or("Unknown"), message)
        }
        SdkError::ConstructionFailure(_) => ApiError::Credentials {
            operation: operation.to_string(),
            message: DisplayErrorContext(err).to_string(),
        },
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
            ApiError::network(operation, DisplayErrorContext(err).to_string())
        }
        _ => ApiError::invalid_response(operation, DisplayErrorContext(err).to_string()),
    }
}
