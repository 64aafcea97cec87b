//! EC2-backed resource client
//!
//! Implements the narrow list/delete interface over `aws-sdk-ec2`. All 15
//! network resource kinds live behind the EC2 API. Listers populate the
//! attribute keys the classifier and the detach steps rely on; a missing
//! attribute fails classification closed rather than erroring here.

use async_trait::async_trait;
use aws_sdk_ec2::types::{Filter, UnsuccessfulItem, VpcPeeringConnectionStateReasonCode, VpnState};
use tracing::debug;
use vpc_sweep_common::ResourceKind;

use super::context::AwsContext;
use super::error::{classify_code, classify_sdk};
use crate::client::{ApiError, ResourceClient};
use crate::resource::{Association, RawResource, ResourceRecord, StepAction, attr};

/// Resource client for one (account, region), backed by EC2.
pub struct Ec2ResourceClient {
    client: aws_sdk_ec2::Client,
    region: String,
}

impl Ec2ResourceClient {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.ec2_client(),
            region: ctx.region().to_string(),
        }
    }
}

#[async_trait]
impl ResourceClient for Ec2ResourceClient {
    async fn list(&self, kind: ResourceKind) -> Result<Vec<RawResource>, ApiError> {
        let resources = match kind {
            ResourceKind::FlowLog => self.list_flow_logs().await?,
            ResourceKind::NatGateway => self.list_nat_gateways().await?,
            ResourceKind::VpcEndpoint => self.list_vpc_endpoints().await?,
            ResourceKind::VpcPeering => self.list_vpc_peerings().await?,
            ResourceKind::VpnGateway => self.list_vpn_gateways().await?,
            ResourceKind::NetworkInterface => self.list_network_interfaces().await?,
            ResourceKind::ElasticIp => self.list_elastic_ips().await?,
            ResourceKind::CustomerGateway => self.list_customer_gateways().await?,
            ResourceKind::InternetGateway => self.list_internet_gateways().await?,
            ResourceKind::SecurityGroup => self.list_security_groups().await?,
            ResourceKind::Subnet => self.list_subnets().await?,
            ResourceKind::RouteTable => self.list_route_tables().await?,
            ResourceKind::NetworkAcl => self.list_network_acls().await?,
            ResourceKind::Vpc => self.list_vpcs().await?,
            ResourceKind::DhcpOptions => self.list_dhcp_options().await?,
        };
        debug!(region = %self.region, kind = %kind, count = resources.len(), "Listed");
        Ok(resources)
    }

    async fn delete(&self, record: &ResourceRecord, action: StepAction) -> Result<(), ApiError> {
        match (record.kind, action) {
            (ResourceKind::InternetGateway, StepAction::Detach) => {
                let vpc_id = attached_vpc(record)?;
                self.client
                    .detach_internet_gateway()
                    .internet_gateway_id(&record.id)
                    .vpc_id(vpc_id)
                    .send()
                    .await
                    .map_err(|e| classify_sdk(&e))?;
                Ok(())
            }
            (ResourceKind::InternetGateway, StepAction::Delete) => {
                self.client
                    .delete_internet_gateway()
                    .internet_gateway_id(&record.id)
                    .send()
                    .await
                    .map_err(|e| classify_sdk(&e))?;
                Ok(())
            }
            (ResourceKind::VpnGateway, StepAction::Detach) => {
                // An unattached VPN gateway has nothing to detach.
                let Some(vpc_id) = record.attr(attr::VPC_ID) else {
                    return Ok(());
                };
                self.client
                    .detach_vpn_gateway()
                    .vpn_gateway_id(&record.id)
                    .vpc_id(vpc_id)
                    .send()
                    .await
                    .map_err(|e| classify_sdk(&e))?;
                Ok(())
            }
            (ResourceKind::VpnGateway, StepAction::Delete) => {
                self.client
                    .delete_vpn_gateway()
                    .vpn_gateway_id(&record.id)
                    .send()
                    .await
                    .map_err(|e| classify_sdk(&e))?;
                Ok(())
            }
            (ResourceKind::SecurityGroup, StepAction::StripRules) => {
                self.strip_security_group_rules(&record.id).await
            }
            (ResourceKind::SecurityGroup, StepAction::Delete) => {
                self.client
                    .delete_security_group()
                    .group_id(&record.id)
                    .send()
                    .await
                    .map_err(|e| classify_sdk(&e))?;
                Ok(())
            }
            (ResourceKind::FlowLog, StepAction::Delete) => {
                let out = self
                    .client
                    .delete_flow_logs()
                    .flow_log_ids(&record.id)
                    .send()
                    .await
                    .map_err(|e| classify_sdk(&e))?;
                check_unsuccessful(out.unsuccessful())
            }
            (ResourceKind::NatGateway, StepAction::Delete) => {
                self.client
                    .delete_nat_gateway()
                    .nat_gateway_id(&record.id)
                    .send()
                    .await
                    .map_err(|e| classify_sdk(&e))?;
                Ok(())
            }
            (ResourceKind::VpcEndpoint, StepAction::Delete) => {
                let out = self
                    .client
                    .delete_vpc_endpoints()
                    .vpc_endpoint_ids(&record.id)
                    .send()
                    .await
                    .map_err(|e| classify_sdk(&e))?;
                check_unsuccessful(out.unsuccessful())
            }
            (ResourceKind::VpcPeering, StepAction::Delete) => {
                self.client
                    .delete_vpc_peering_connection()
                    .vpc_peering_connection_id(&record.id)
                    .send()
                    .await
                    .map_err(|e| classify_sdk(&e))?;
                Ok(())
            }
            (ResourceKind::NetworkInterface, StepAction::Delete) => {
                self.client
                    .delete_network_interface()
                    .network_interface_id(&record.id)
                    .send()
                    .await
                    .map_err(|e| classify_sdk(&e))?;
                Ok(())
            }
            (ResourceKind::ElasticIp, StepAction::Delete) => {
                self.client
                    .release_address()
                    .allocation_id(&record.id)
                    .send()
                    .await
                    .map_err(|e| classify_sdk(&e))?;
                Ok(())
            }
            (ResourceKind::CustomerGateway, StepAction::Delete) => {
                self.client
                    .delete_customer_gateway()
                    .customer_gateway_id(&record.id)
                    .send()
                    .await
                    .map_err(|e| classify_sdk(&e))?;
                Ok(())
            }
            (ResourceKind::Subnet, StepAction::Delete) => {
                self.client
                    .delete_subnet()
                    .subnet_id(&record.id)
                    .send()
                    .await
                    .map_err(|e| classify_sdk(&e))?;
                Ok(())
            }
            (ResourceKind::RouteTable, StepAction::Delete) => {
                self.delete_route_table(record).await
            }
            (ResourceKind::NetworkAcl, StepAction::Delete) => {
                self.client
                    .delete_network_acl()
                    .network_acl_id(&record.id)
                    .send()
                    .await
                    .map_err(|e| classify_sdk(&e))?;
                Ok(())
            }
            (ResourceKind::Vpc, StepAction::Delete) => {
                self.client
                    .delete_vpc()
                    .vpc_id(&record.id)
                    .send()
                    .await
                    .map_err(|e| classify_sdk(&e))?;
                Ok(())
            }
            (ResourceKind::DhcpOptions, StepAction::Delete) => {
                self.client
                    .delete_dhcp_options()
                    .dhcp_options_id(&record.id)
                    .send()
                    .await
                    .map_err(|e| classify_sdk(&e))?;
                Ok(())
            }
            (kind, action) => Err(ApiError::Validation(format!(
                "unsupported action {action} for {kind}"
            ))),
        }
    }
}

impl Ec2ResourceClient {
    /// Clear a security group's ingress and egress rule sets without
    /// deleting the group. Used to break rule-reference cycles.
    async fn strip_security_group_rules(&self, group_id: &str) -> Result<(), ApiError> {
        let out = self
            .client
            .describe_security_groups()
            .group_ids(group_id)
            .send()
            .await
            .map_err(|e| classify_sdk(&e))?;

        let Some(group) = out.security_groups().first() else {
            return Err(ApiError::NotFound(format!("security group {group_id}")));
        };

        let ingress = group.ip_permissions().to_vec();
        if !ingress.is_empty() {
            self.client
                .revoke_security_group_ingress()
                .group_id(group_id)
                .set_ip_permissions(Some(ingress))
                .send()
                .await
                .map_err(|e| classify_sdk(&e))?;
        }

        let egress = group.ip_permissions_egress().to_vec();
        if !egress.is_empty() {
            self.client
                .revoke_security_group_egress()
                .group_id(group_id)
                .set_ip_permissions(Some(egress))
                .send()
                .await
                .map_err(|e| classify_sdk(&e))?;
        }

        Ok(())
    }

    /// Delete a route table, removing its (non-main) subnet associations
    /// first. The classifier guarantees no main association reaches here.
    async fn delete_route_table(&self, record: &ResourceRecord) -> Result<(), ApiError> {
        for assoc in &record.associations {
            let result = self
                .client
                .disassociate_route_table()
                .association_id(&assoc.id)
                .send()
                .await;
            if let Err(e) = result {
                let classified = classify_sdk(&e);
                // A vanished association is fine; the table is what matters.
                if !classified.is_not_found() {
                    return Err(classified);
                }
            }
        }

        self.client
            .delete_route_table()
            .route_table_id(&record.id)
            .send()
            .await
            .map_err(|e| classify_sdk(&e))?;
        Ok(())
    }

    async fn list_vpcs(&self) -> Result<Vec<RawResource>, ApiError> {
        let out = self
            .client
            .describe_vpcs()
            .send()
            .await
            .map_err(|e| classify_sdk(&e))?;

        let mut resources = Vec::new();
        for vpc in out.vpcs() {
            let Some(id) = vpc.vpc_id() else { continue };
            let mut raw = RawResource::new(ResourceKind::Vpc, id).with_attr(
                attr::IS_DEFAULT,
                vpc.is_default().unwrap_or(false).to_string(),
            );
            if let Some(name) = name_tag(vpc.tags()) {
                raw = raw.with_attr(attr::NAME, name);
            }
            resources.push(raw);
        }
        Ok(resources)
    }

    async fn list_subnets(&self) -> Result<Vec<RawResource>, ApiError> {
        let out = self
            .client
            .describe_subnets()
            .send()
            .await
            .map_err(|e| classify_sdk(&e))?;

        let mut resources = Vec::new();
        for subnet in out.subnets() {
            let Some(id) = subnet.subnet_id() else { continue };
            let mut raw = RawResource::new(ResourceKind::Subnet, id);
            if let Some(vpc_id) = subnet.vpc_id() {
                raw = raw.with_attr(attr::VPC_ID, vpc_id);
            }
            resources.push(raw);
        }
        Ok(resources)
    }

    async fn list_route_tables(&self) -> Result<Vec<RawResource>, ApiError> {
        let out = self
            .client
            .describe_route_tables()
            .send()
            .await
            .map_err(|e| classify_sdk(&e))?;

        let mut resources = Vec::new();
        for table in out.route_tables() {
            let Some(id) = table.route_table_id() else { continue };
            let mut raw = RawResource::new(ResourceKind::RouteTable, id);
            if let Some(vpc_id) = table.vpc_id() {
                raw = raw.with_attr(attr::VPC_ID, vpc_id);
            }
            for assoc in table.associations() {
                if let Some(assoc_id) = assoc.route_table_association_id() {
                    raw = raw.with_association(Association {
                        id: assoc_id.to_string(),
                        main: assoc.main().unwrap_or(false),
                    });
                }
            }
            resources.push(raw);
        }
        Ok(resources)
    }

    async fn list_network_acls(&self) -> Result<Vec<RawResource>, ApiError> {
        let out = self
            .client
            .describe_network_acls()
            .send()
            .await
            .map_err(|e| classify_sdk(&e))?;

        let mut resources = Vec::new();
        for acl in out.network_acls() {
            let Some(id) = acl.network_acl_id() else { continue };
            let mut raw = RawResource::new(ResourceKind::NetworkAcl, id).with_attr(
                attr::IS_DEFAULT,
                acl.is_default().unwrap_or(false).to_string(),
            );
            if let Some(vpc_id) = acl.vpc_id() {
                raw = raw.with_attr(attr::VPC_ID, vpc_id);
            }
            resources.push(raw);
        }
        Ok(resources)
    }

    async fn list_security_groups(&self) -> Result<Vec<RawResource>, ApiError> {
        let out = self
            .client
            .describe_security_groups()
            .send()
            .await
            .map_err(|e| classify_sdk(&e))?;

        let mut resources = Vec::new();
        for group in out.security_groups() {
            let Some(id) = group.group_id() else { continue };
            let mut raw = RawResource::new(ResourceKind::SecurityGroup, id);
            // Leaving group_name unset on a nameless group makes the
            // classifier fail closed, which is what we want.
            if let Some(name) = group.group_name() {
                raw = raw.with_attr(attr::GROUP_NAME, name);
            }
            if let Some(vpc_id) = group.vpc_id() {
                raw = raw.with_attr(attr::VPC_ID, vpc_id);
            }
            for permission in group
                .ip_permissions()
                .iter()
                .chain(group.ip_permissions_egress())
            {
                for pair in permission.user_id_group_pairs() {
                    if let Some(referenced) = pair.group_id() {
                        if referenced != id {
                            raw = raw.with_association(Association::new(referenced));
                        }
                    }
                }
            }
            resources.push(raw);
        }
        Ok(resources)
    }

    async fn list_internet_gateways(&self) -> Result<Vec<RawResource>, ApiError> {
        let out = self
            .client
            .describe_internet_gateways()
            .send()
            .await
            .map_err(|e| classify_sdk(&e))?;

        let mut resources = Vec::new();
        for gateway in out.internet_gateways() {
            let Some(id) = gateway.internet_gateway_id() else {
                continue;
            };
            let mut raw = RawResource::new(ResourceKind::InternetGateway, id);
            if let Some(vpc_id) = gateway.attachments().iter().find_map(|a| a.vpc_id()) {
                raw = raw.with_attr(attr::VPC_ID, vpc_id);
            }
            resources.push(raw);
        }
        Ok(resources)
    }

    async fn list_nat_gateways(&self) -> Result<Vec<RawResource>, ApiError> {
        // Deleted NAT gateways linger in describe output for a while.
        let out = self
            .client
            .describe_nat_gateways()
            .filter(
                Filter::builder()
                    .name("state")
                    .values("pending")
                    .values("available")
                    .build(),
            )
            .send()
            .await
            .map_err(|e| classify_sdk(&e))?;

        let mut resources = Vec::new();
        for gateway in out.nat_gateways() {
            let Some(id) = gateway.nat_gateway_id() else { continue };
            let mut raw = RawResource::new(ResourceKind::NatGateway, id);
            if let Some(vpc_id) = gateway.vpc_id() {
                raw = raw.with_attr(attr::VPC_ID, vpc_id);
            }
            resources.push(raw);
        }
        Ok(resources)
    }

    async fn list_network_interfaces(&self) -> Result<Vec<RawResource>, ApiError> {
        // Only detached interfaces are deletable; in-use ones disappear
        // when their owner (NAT gateway, endpoint, instance) goes away.
        let out = self
            .client
            .describe_network_interfaces()
            .filters(Filter::builder().name("status").values("available").build())
            .send()
            .await
            .map_err(|e| classify_sdk(&e))?;

        let mut resources = Vec::new();
        for interface in out.network_interfaces() {
            let Some(id) = interface.network_interface_id() else {
                continue;
            };
            let mut raw = RawResource::new(ResourceKind::NetworkInterface, id);
            if let Some(vpc_id) = interface.vpc_id() {
                raw = raw.with_attr(attr::VPC_ID, vpc_id);
            }
            resources.push(raw);
        }
        Ok(resources)
    }

    async fn list_elastic_ips(&self) -> Result<Vec<RawResource>, ApiError> {
        let out = self
            .client
            .describe_addresses()
            .send()
            .await
            .map_err(|e| classify_sdk(&e))?;

        let mut resources = Vec::new();
        for address in out.addresses() {
            // Classic addresses have no allocation id and are out of scope.
            let Some(id) = address.allocation_id() else {
                continue;
            };
            let mut raw = RawResource::new(ResourceKind::ElasticIp, id);
            if let Some(public_ip) = address.public_ip() {
                raw = raw.with_attr(attr::NAME, public_ip);
            }
            resources.push(raw);
        }
        Ok(resources)
    }

    async fn list_vpc_endpoints(&self) -> Result<Vec<RawResource>, ApiError> {
        let out = self
            .client
            .describe_vpc_endpoints()
            .send()
            .await
            .map_err(|e| classify_sdk(&e))?;

        let mut resources = Vec::new();
        for endpoint in out.vpc_endpoints() {
            let Some(id) = endpoint.vpc_endpoint_id() else {
                continue;
            };
            let mut raw = RawResource::new(ResourceKind::VpcEndpoint, id);
            if let Some(vpc_id) = endpoint.vpc_id() {
                raw = raw.with_attr(attr::VPC_ID, vpc_id);
            }
            resources.push(raw);
        }
        Ok(resources)
    }

    async fn list_vpc_peerings(&self) -> Result<Vec<RawResource>, ApiError> {
        let out = self
            .client
            .describe_vpc_peering_connections()
            .send()
            .await
            .map_err(|e| classify_sdk(&e))?;

        let mut resources = Vec::new();
        for peering in out.vpc_peering_connections() {
            let Some(id) = peering.vpc_peering_connection_id() else {
                continue;
            };
            let code = peering.status().and_then(|s| s.code());
            if code == Some(&VpcPeeringConnectionStateReasonCode::Deleted)
                || code == Some(&VpcPeeringConnectionStateReasonCode::Deleting)
            {
                continue;
            }
            resources.push(RawResource::new(ResourceKind::VpcPeering, id));
        }
        Ok(resources)
    }

    async fn list_flow_logs(&self) -> Result<Vec<RawResource>, ApiError> {
        let out = self
            .client
            .describe_flow_logs()
            .send()
            .await
            .map_err(|e| classify_sdk(&e))?;

        let mut resources = Vec::new();
        for flow_log in out.flow_logs() {
            let Some(id) = flow_log.flow_log_id() else { continue };
            let mut raw = RawResource::new(ResourceKind::FlowLog, id);
            if let Some(resource_id) = flow_log.resource_id() {
                raw = raw.with_attr(attr::VPC_ID, resource_id);
            }
            resources.push(raw);
        }
        Ok(resources)
    }

    async fn list_dhcp_options(&self) -> Result<Vec<RawResource>, ApiError> {
        // The region's default VPC decides which option set is the
        // protected default.
        let vpcs = self
            .client
            .describe_vpcs()
            .filters(Filter::builder().name("isDefault").values("true").build())
            .send()
            .await
            .map_err(|e| classify_sdk(&e))?;
        let default_set: Option<String> = vpcs
            .vpcs()
            .first()
            .and_then(|v| v.dhcp_options_id())
            .map(str::to_string);

        let out = self
            .client
            .describe_dhcp_options()
            .send()
            .await
            .map_err(|e| classify_sdk(&e))?;

        let mut resources = Vec::new();
        for options in out.dhcp_options() {
            let Some(id) = options.dhcp_options_id() else { continue };
            let region_default = default_set.as_deref() == Some(id);
            resources.push(
                RawResource::new(ResourceKind::DhcpOptions, id)
                    .with_attr(attr::REGION_DEFAULT, region_default.to_string()),
            );
        }
        Ok(resources)
    }

    async fn list_vpn_gateways(&self) -> Result<Vec<RawResource>, ApiError> {
        let out = self
            .client
            .describe_vpn_gateways()
            .send()
            .await
            .map_err(|e| classify_sdk(&e))?;

        let mut resources = Vec::new();
        for gateway in out.vpn_gateways() {
            let Some(id) = gateway.vpn_gateway_id() else { continue };
            if gateway.state() == Some(&VpnState::Deleted)
                || gateway.state() == Some(&VpnState::Deleting)
            {
                continue;
            }
            let mut raw = RawResource::new(ResourceKind::VpnGateway, id);
            if let Some(vpc_id) = gateway.vpc_attachments().iter().find_map(|a| a.vpc_id()) {
                raw = raw.with_attr(attr::VPC_ID, vpc_id);
            }
            resources.push(raw);
        }
        Ok(resources)
    }

    async fn list_customer_gateways(&self) -> Result<Vec<RawResource>, ApiError> {
        let out = self
            .client
            .describe_customer_gateways()
            .send()
            .await
            .map_err(|e| classify_sdk(&e))?;

        let mut resources = Vec::new();
        for gateway in out.customer_gateways() {
            let Some(id) = gateway.customer_gateway_id() else {
                continue;
            };
            if gateway.state() == Some("deleted") || gateway.state() == Some("deleting") {
                continue;
            }
            resources.push(RawResource::new(ResourceKind::CustomerGateway, id));
        }
        Ok(resources)
    }
}

/// The VPC a gateway detach targets; its absence is a malformed record.
fn attached_vpc(record: &ResourceRecord) -> Result<&str, ApiError> {
    record.attr(attr::VPC_ID).ok_or_else(|| {
        ApiError::Validation(format!(
            "{} {} has no attached VPC recorded",
            record.kind, record.id
        ))
    })
}

/// Surface the first per-item failure of a batch delete call.
fn check_unsuccessful(items: &[UnsuccessfulItem]) -> Result<(), ApiError> {
    if let Some(item) = items.first() {
        let (code, message) = item
            .error()
            .map(|e| (e.code(), e.message()))
            .unwrap_or((None, None));
        return Err(classify_code(code, message));
    }
    Ok(())
}

fn name_tag(tags: &[aws_sdk_ec2::types::Tag]) -> Option<&str> {
    tags.iter()
        .find(|t| t.key() == Some("Name"))
        .and_then(|t| t.value())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_ec2::types::{Tag, UnsuccessfulItemError};

    #[test]
    fn name_tag_lookup() {
        let tags = vec![
            Tag::builder().key("env").value("prod").build(),
            Tag::builder().key("Name").value("edge-vpc").build(),
        ];
        assert_eq!(name_tag(&tags), Some("edge-vpc"));
        assert_eq!(name_tag(&[]), None);
    }

    #[test]
    fn unsuccessful_items_classify_by_code() {
        let items = vec![
            UnsuccessfulItem::builder()
                .resource_id("fl-1")
                .error(
                    UnsuccessfulItemError::builder()
                        .code("InvalidFlowLogId.NotFound")
                        .message("gone")
                        .build(),
                )
                .build(),
        ];
        let err = check_unsuccessful(&items).unwrap_err();
        assert!(err.is_not_found());

        assert!(check_unsuccessful(&[]).is_ok());
    }

    #[test]
    fn detach_requires_recorded_vpc() {
        let record = ResourceRecord::from_raw(
            RawResource::new(ResourceKind::InternetGateway, "igw-1"),
            "prod",
            "us-east-2",
            false,
        );
        assert!(matches!(
            attached_vpc(&record),
            Err(ApiError::Validation(_))
        ));
    }
}
