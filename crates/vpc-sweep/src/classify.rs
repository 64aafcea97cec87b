//! Protected-vs-eligible resource classification
//!
//! All protection logic lives here so it can be audited in one place.
//! Classification is a pure function over a raw record; any rule that
//! cannot be evaluated (missing attribute) is a classification error and
//! the caller treats the record as protected. Never delete on an
//! ambiguous classification.

use thiserror::Error;
use vpc_sweep_common::ResourceKind;

use crate::resource::{RawResource, attr};

/// Verdict for one discovered resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Default/system-owned; never targeted for deletion.
    Protected { reason: &'static str },
    /// Custom resource, safe to include in the deletion plan.
    Eligible,
}

impl Classification {
    pub fn is_protected(&self) -> bool {
        matches!(self, Classification::Protected { .. })
    }
}

/// A record that could not be classified.
#[derive(Debug, Error)]
#[error("cannot classify {kind} {id}: missing attribute `{missing}`")]
pub struct ClassifyError {
    pub kind: ResourceKind,
    pub id: String,
    pub missing: &'static str,
}

/// Classify one raw record as protected or eligible.
///
/// Each rule is independently sufficient to protect a record:
/// - default VPCs
/// - security groups named `default`
/// - route tables with a main association
/// - default network ACLs
/// - the region's currently-associated default DHCP option set
///
/// Kinds without a protection rule are always eligible.
pub fn classify(raw: &RawResource) -> Result<Classification, ClassifyError> {
    let verdict = match raw.kind {
        ResourceKind::Vpc => {
            if bool_attr(raw, attr::IS_DEFAULT)? {
                protected("default VPC")
            } else {
                Classification::Eligible
            }
        }
        ResourceKind::SecurityGroup => {
            let name = required_attr(raw, attr::GROUP_NAME)?;
            if name == "default" {
                protected("default security group")
            } else {
                Classification::Eligible
            }
        }
        ResourceKind::RouteTable => {
            if raw.associations.iter().any(|a| a.main) {
                protected("main route table")
            } else {
                Classification::Eligible
            }
        }
        ResourceKind::NetworkAcl => {
            if bool_attr(raw, attr::IS_DEFAULT)? {
                protected("default network ACL")
            } else {
                Classification::Eligible
            }
        }
        ResourceKind::DhcpOptions => {
            if bool_attr(raw, attr::REGION_DEFAULT)? {
                protected("region's default DHCP option set")
            } else {
                Classification::Eligible
            }
        }
        _ => Classification::Eligible,
    };

    Ok(verdict)
}

fn protected(reason: &'static str) -> Classification {
    Classification::Protected { reason }
}

fn required_attr<'a>(raw: &'a RawResource, key: &'static str) -> Result<&'a str, ClassifyError> {
    raw.attrs
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| ClassifyError {
            kind: raw.kind,
            id: raw.id.clone(),
            missing: key,
        })
}

fn bool_attr(raw: &RawResource, key: &'static str) -> Result<bool, ClassifyError> {
    Ok(required_attr(raw, key)? == "true")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Association;

    #[test]
    fn default_vpc_is_protected() {
        let raw = RawResource::new(ResourceKind::Vpc, "vpc-default").with_attr(attr::IS_DEFAULT, "true");
        assert!(classify(&raw).unwrap().is_protected());
    }

    #[test]
    fn custom_vpc_is_eligible() {
        let raw = RawResource::new(ResourceKind::Vpc, "vpc-custom").with_attr(attr::IS_DEFAULT, "false");
        assert_eq!(classify(&raw).unwrap(), Classification::Eligible);
    }

    #[test]
    fn default_security_group_is_protected() {
        let raw = RawResource::new(ResourceKind::SecurityGroup, "sg-1")
            .with_attr(attr::GROUP_NAME, "default");
        assert!(classify(&raw).unwrap().is_protected());
    }

    #[test]
    fn named_security_group_is_eligible() {
        let raw =
            RawResource::new(ResourceKind::SecurityGroup, "sg-2").with_attr(attr::GROUP_NAME, "web");
        assert_eq!(classify(&raw).unwrap(), Classification::Eligible);
    }

    #[test]
    fn main_route_table_is_protected() {
        let raw = RawResource::new(ResourceKind::RouteTable, "rtb-1")
            .with_association(Association::main("rtbassoc-1"));
        assert!(classify(&raw).unwrap().is_protected());
    }

    #[test]
    fn custom_route_table_is_eligible() {
        let raw = RawResource::new(ResourceKind::RouteTable, "rtb-2")
            .with_association(Association::new("rtbassoc-2"));
        assert_eq!(classify(&raw).unwrap(), Classification::Eligible);
    }

    #[test]
    fn default_network_acl_is_protected() {
        let raw =
            RawResource::new(ResourceKind::NetworkAcl, "acl-1").with_attr(attr::IS_DEFAULT, "true");
        assert!(classify(&raw).unwrap().is_protected());
    }

    #[test]
    fn associated_default_dhcp_options_protected() {
        let raw = RawResource::new(ResourceKind::DhcpOptions, "dopt-1")
            .with_attr(attr::REGION_DEFAULT, "true");
        assert!(classify(&raw).unwrap().is_protected());
    }

    #[test]
    fn kinds_without_rules_are_eligible() {
        for kind in [
            ResourceKind::FlowLog,
            ResourceKind::NatGateway,
            ResourceKind::VpcEndpoint,
            ResourceKind::VpcPeering,
            ResourceKind::VpnGateway,
            ResourceKind::NetworkInterface,
            ResourceKind::ElasticIp,
            ResourceKind::CustomerGateway,
            ResourceKind::InternetGateway,
            ResourceKind::Subnet,
        ] {
            let raw = RawResource::new(kind, "id");
            assert_eq!(classify(&raw).unwrap(), Classification::Eligible, "{kind}");
        }
    }

    #[test]
    fn malformed_record_is_an_error() {
        // VPC without the is_default attribute cannot be classified.
        let raw = RawResource::new(ResourceKind::Vpc, "vpc-odd");
        let err = classify(&raw).unwrap_err();
        assert_eq!(err.missing, attr::IS_DEFAULT);
        assert_eq!(err.id, "vpc-odd");
    }

    #[test]
    fn malformed_security_group_is_an_error() {
        let raw = RawResource::new(ResourceKind::SecurityGroup, "sg-odd");
        assert!(classify(&raw).is_err());
    }
}
