//! AWS error classification
//!
//! Maps AWS SDK errors into the client-neutral [`ApiError`] taxonomy the
//! core depends on, using the `.code()` method via `ProvideErrorMetadata`
//! instead of string matching on Debug output.

use aws_sdk_ec2::error::ProvideErrorMetadata;

use crate::client::ApiError;

/// Known AWS error codes for "not found" conditions across the network
/// resource kinds. Includes already-detached gateways, which are
/// equivalent for teardown purposes.
const NOT_FOUND_CODES: &[&str] = &[
    "InvalidVpcID.NotFound",
    "InvalidSubnetID.NotFound",
    "InvalidRouteTableID.NotFound",
    "InvalidNetworkAclID.NotFound",
    "InvalidGroup.NotFound",
    "InvalidNetworkInterfaceID.NotFound",
    "InvalidInternetGatewayID.NotFound",
    "InvalidAllocationID.NotFound",
    "InvalidAddress.NotFound",
    "InvalidAssociationID.NotFound",
    "NatGatewayNotFound",
    "InvalidVpcEndpointId.NotFound",
    "InvalidVpcPeeringConnectionID.NotFound",
    "InvalidFlowLogId.NotFound",
    "InvalidDhcpOptionsID.NotFound",
    "InvalidCustomerGatewayID.NotFound",
    "InvalidVpnGatewayID.NotFound",
    "InvalidVpnGatewayAttachment.NotFound",
    "Gateway.NotAttached",
];

/// Known AWS error codes for dependency violations (resource still in use)
const DEPENDENCY_CODES: &[&str] = &["DependencyViolation", "InvalidGroup.InUse"];

/// Known AWS error codes for throttling/rate limiting
const THROTTLING_CODES: &[&str] = &["Throttling", "ThrottlingException", "RequestLimitExceeded"];

/// Known AWS error codes for missing permissions
const PERMISSION_CODES: &[&str] = &[
    "UnauthorizedOperation",
    "AuthFailure",
    "AccessDenied",
    "AccessDeniedException",
    "OperationNotPermitted",
];

/// Known AWS error codes for rejected requests
const VALIDATION_CODES: &[&str] = &[
    "InvalidParameterValue",
    "InvalidParameterCombination",
    "MissingParameter",
    "ValidationError",
];

/// Classify an AWS error code into the client error taxonomy.
pub fn classify_code(code: Option<&str>, message: Option<&str>) -> ApiError {
    let message = message.unwrap_or("unknown error").to_string();

    match code {
        Some(c) if NOT_FOUND_CODES.contains(&c) => ApiError::NotFound(message),
        Some(c) if DEPENDENCY_CODES.contains(&c) => ApiError::DependencyViolation(message),
        Some(c) if THROTTLING_CODES.contains(&c) => ApiError::Throttled(message),
        Some(c) if PERMISSION_CODES.contains(&c) => ApiError::PermissionDenied(message),
        Some(c) if VALIDATION_CODES.contains(&c) => ApiError::Validation(message),
        Some(c) => ApiError::Other(format!("{c}: {message}")),
        None => ApiError::Other(message),
    }
}

/// Classify any AWS SDK error carrying error metadata.
///
/// `SdkError<E>` forwards `ProvideErrorMetadata` from its service error,
/// so every EC2/STS operation error funnels through here.
pub fn classify_sdk<E>(err: &E) -> ApiError
where
    E: ProvideErrorMetadata + std::fmt::Debug,
{
    match err.code() {
        Some(_) => classify_code(err.code(), err.message()),
        // No metadata means the request never produced a service answer
        // (connector/timeout); keep the debug form for diagnosis.
        None => ApiError::Other(format!("{err:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_codes() {
        for code in NOT_FOUND_CODES {
            let err = classify_code(Some(code), Some("some message"));
            assert!(err.is_not_found(), "Expected NotFound for code: {code}");
        }
    }

    #[test]
    fn dependency_codes_are_retryable() {
        for code in DEPENDENCY_CODES {
            let err = classify_code(Some(code), Some("msg"));
            assert!(err.is_retryable(), "Expected retryable for code: {code}");
            assert!(matches!(err, ApiError::DependencyViolation(_)));
        }
    }

    #[test]
    fn throttling_codes_are_retryable() {
        for code in THROTTLING_CODES {
            let err = classify_code(Some(code), Some("msg"));
            assert!(err.is_retryable(), "Expected retryable for code: {code}");
            assert!(matches!(err, ApiError::Throttled(_)));
        }
    }

    #[test]
    fn permission_codes_are_fatal() {
        for code in PERMISSION_CODES {
            let err = classify_code(Some(code), Some("msg"));
            assert!(matches!(err, ApiError::PermissionDenied(_)), "code: {code}");
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn validation_codes_are_fatal() {
        for code in VALIDATION_CODES {
            let err = classify_code(Some(code), Some("msg"));
            assert!(matches!(err, ApiError::Validation(_)), "code: {code}");
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn unknown_and_missing_codes() {
        let err = classify_code(Some("SomeNewError"), Some("details"));
        assert!(matches!(err, ApiError::Other(_)));
        let err2 = classify_code(None, Some("something failed"));
        assert!(matches!(err2, ApiError::Other(_)));
    }

    #[test]
    fn detached_gateway_counts_as_gone() {
        let err = classify_code(Some("Gateway.NotAttached"), Some("already detached"));
        assert!(err.is_not_found());
    }
}
