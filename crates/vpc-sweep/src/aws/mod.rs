//! AWS-backed implementation of the resource client interface
//!
//! - `context`: shared SDK config per (profile, region)
//! - `account`: STS caller-identity validation
//! - `error`: EC2 error-code classification into the client taxonomy
//! - `ec2`: list/delete for all 15 network resource kinds

pub mod account;
pub mod context;
pub mod ec2;
pub mod error;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

pub use account::{AccountId, get_current_account_id, verify_account};
pub use context::AwsContext;
pub use ec2::Ec2ResourceClient;
pub use error::{classify_code, classify_sdk};

use crate::client::{ClientFactory, ResourceClient};
use crate::config::Scope;

/// Builds EC2-backed clients per scope, resolving credentials from the
/// account's profile and refusing scopes whose credentials resolve to a
/// different account than configured.
#[derive(Debug, Default)]
pub struct AwsClientFactory;

#[async_trait]
impl ClientFactory for AwsClientFactory {
    async fn client_for(&self, scope: &Scope) -> Result<Arc<dyn ResourceClient>> {
        let ctx = AwsContext::with_profile(&scope.region, scope.profile.as_deref()).await;
        verify_account(ctx.sdk_config(), &scope.account_id).await?;
        Ok(Arc::new(Ec2ResourceClient::from_context(&ctx)))
    }
}
