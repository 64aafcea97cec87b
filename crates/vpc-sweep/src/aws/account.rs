//! AWS account validation and identity

use anyhow::{Context, Result, bail};
use tracing::info;

/// Strongly-typed AWS account ID (12-digit string)
///
/// This newtype prevents accidentally mixing account IDs with other
/// strings and ensures account validation happens at specific points in
/// the code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display, derive_more::Deref)]
pub struct AccountId(String);

impl AccountId {
    /// Create an AccountId for testing purposes
    #[cfg(test)]
    pub fn new(s: String) -> Self {
        AccountId(s)
    }
}

/// Fetch the current AWS account ID from credentials via STS
/// GetCallerIdentity
///
/// This operation requires no special permissions - it always succeeds if
/// credentials are valid. Use this to validate credentials and capture
/// the account ID before any mutating operation.
pub async fn get_current_account_id(config: &aws_config::SdkConfig) -> Result<AccountId> {
    let sts = aws_sdk_sts::Client::new(config);
    let identity = sts
        .get_caller_identity()
        .send()
        .await
        .context("Failed to get AWS caller identity - check credentials")?;

    let account = identity
        .account()
        .context("No account ID returned from STS GetCallerIdentity")?;

    info!(account_id = %account, "AWS account validated");

    Ok(AccountId(account.to_string()))
}

/// Require the resolved credentials to belong to the expected account.
///
/// Deleting network resources in the wrong account is unrecoverable, so
/// a profile that resolves elsewhere fails the whole scope before any
/// list or delete call is made.
pub async fn verify_account(config: &aws_config::SdkConfig, expected: &str) -> Result<AccountId> {
    let actual = get_current_account_id(config).await?;
    if actual.as_str() != expected {
        bail!(
            "Credentials resolve to account {actual}, but the scope is configured for {expected}"
        );
    }
    Ok(actual)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_id_display_and_deref() {
        let id = AccountId::new("111111111111".to_string());
        assert_eq!(id.to_string(), "111111111111");
        assert_eq!(id.as_str(), "111111111111");
    }
}
