//! Network resource kinds and deletion-order dependency edges
//!
//! Resources must be deleted in dependency order to avoid provider-side
//! failures. The edge set below is fixed and encodes AWS-style ownership:
//! an edge `(A, B)` means every `A` must be deleted (or detached) before
//! any `B` may be deleted.

use serde::{Deserialize, Serialize};

/// Kinds of virtual-network resources managed by vpc-sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    /// VPC flow log (must go before its VPC)
    FlowLog,
    /// NAT gateway (holds an elastic IP and lives in a subnet)
    NatGateway,
    /// VPC endpoint (interface endpoints own network interfaces,
    /// gateway endpoints add routes)
    VpcEndpoint,
    /// VPC peering connection (peering routes reference route tables)
    VpcPeering,
    /// VPN gateway (detach from VPC, then delete)
    VpnGateway,
    /// Elastic network interface (attached to a subnet and security groups)
    NetworkInterface,
    /// Elastic IP address (public addresses block IGW detachment)
    ElasticIp,
    /// Customer gateway (deletable once VPN gateways are gone)
    CustomerGateway,
    /// Internet gateway (detach from VPC, then delete)
    InternetGateway,
    /// Security group (rules may reference other groups)
    SecurityGroup,
    /// Subnet (contains interfaces and NAT gateways)
    Subnet,
    /// Route table (associated with subnets; the main table is protected)
    RouteTable,
    /// Network ACL (associated with subnets; the default ACL is protected)
    NetworkAcl,
    /// The VPC itself
    Vpc,
    /// DHCP option set (deletable only after no VPC references it)
    DhcpOptions,
}

/// Fixed dependency edge set over kinds.
///
/// `(from, to)`: `from` must reach a terminal deletion state before any
/// `to` deletion starts.
pub const DEPENDENCY_EDGES: &[(ResourceKind, ResourceKind)] = &[
    (ResourceKind::FlowLog, ResourceKind::Vpc),
    (ResourceKind::NatGateway, ResourceKind::ElasticIp),
    (ResourceKind::NatGateway, ResourceKind::Subnet),
    (ResourceKind::VpcEndpoint, ResourceKind::RouteTable),
    (ResourceKind::VpcEndpoint, ResourceKind::NetworkInterface),
    (ResourceKind::VpcPeering, ResourceKind::RouteTable),
    (ResourceKind::VpnGateway, ResourceKind::CustomerGateway),
    (ResourceKind::VpnGateway, ResourceKind::Vpc),
    (ResourceKind::NetworkInterface, ResourceKind::SecurityGroup),
    (ResourceKind::NetworkInterface, ResourceKind::Subnet),
    (ResourceKind::ElasticIp, ResourceKind::InternetGateway),
    (ResourceKind::InternetGateway, ResourceKind::Vpc),
    (ResourceKind::SecurityGroup, ResourceKind::Vpc),
    (ResourceKind::Subnet, ResourceKind::RouteTable),
    (ResourceKind::Subnet, ResourceKind::NetworkAcl),
    (ResourceKind::RouteTable, ResourceKind::Vpc),
    (ResourceKind::NetworkAcl, ResourceKind::Vpc),
    (ResourceKind::Vpc, ResourceKind::DhcpOptions),
];

impl ResourceKind {
    /// All kinds, in declaration order.
    pub const ALL: [ResourceKind; 15] = [
        ResourceKind::FlowLog,
        ResourceKind::NatGateway,
        ResourceKind::VpcEndpoint,
        ResourceKind::VpcPeering,
        ResourceKind::VpnGateway,
        ResourceKind::NetworkInterface,
        ResourceKind::ElasticIp,
        ResourceKind::CustomerGateway,
        ResourceKind::InternetGateway,
        ResourceKind::SecurityGroup,
        ResourceKind::Subnet,
        ResourceKind::RouteTable,
        ResourceKind::NetworkAcl,
        ResourceKind::Vpc,
        ResourceKind::DhcpOptions,
    ];

    /// Stable string name, used in logs, reports, and JSON keys.
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::FlowLog => "flow-log",
            ResourceKind::NatGateway => "nat-gateway",
            ResourceKind::VpcEndpoint => "vpc-endpoint",
            ResourceKind::VpcPeering => "vpc-peering",
            ResourceKind::VpnGateway => "vpn-gateway",
            ResourceKind::NetworkInterface => "network-interface",
            ResourceKind::ElasticIp => "elastic-ip",
            ResourceKind::CustomerGateway => "customer-gateway",
            ResourceKind::InternetGateway => "internet-gateway",
            ResourceKind::SecurityGroup => "security-group",
            ResourceKind::Subnet => "subnet",
            ResourceKind::RouteTable => "route-table",
            ResourceKind::NetworkAcl => "network-acl",
            ResourceKind::Vpc => "vpc",
            ResourceKind::DhcpOptions => "dhcp-options",
        }
    }

    /// Kinds that must be detached from their VPC before they can be
    /// deleted. The detach step always precedes the delete step for the
    /// same instance.
    pub fn needs_detach(self) -> bool {
        matches!(
            self,
            ResourceKind::InternetGateway | ResourceKind::VpnGateway
        )
    }

    /// Kinds whose deletion eligibility is decided by a protection rule
    /// (default/system-owned instances exist for these kinds).
    pub fn has_protected_default(self) -> bool {
        matches!(
            self,
            ResourceKind::Vpc
                | ResourceKind::SecurityGroup
                | ResourceKind::RouteTable
                | ResourceKind::NetworkAcl
                | ResourceKind::DhcpOptions
        )
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    fn edges_into(kind: ResourceKind) -> Vec<ResourceKind> {
        DEPENDENCY_EDGES
            .iter()
            .filter(|(_, to)| *to == kind)
            .map(|(from, _)| *from)
            .collect()
    }

    #[test]
    fn interfaces_before_subnets() {
        assert!(edges_into(ResourceKind::Subnet).contains(&ResourceKind::NetworkInterface));
    }

    #[test]
    fn subnets_before_vpc() {
        assert!(edges_into(ResourceKind::Vpc).contains(&ResourceKind::Subnet));
    }

    #[test]
    fn nat_gateways_before_elastic_ips() {
        assert!(edges_into(ResourceKind::ElasticIp).contains(&ResourceKind::NatGateway));
    }

    #[test]
    fn flow_logs_before_vpc() {
        assert!(edges_into(ResourceKind::Vpc).contains(&ResourceKind::FlowLog));
    }

    #[test]
    fn vpc_before_dhcp_options() {
        assert!(edges_into(ResourceKind::DhcpOptions).contains(&ResourceKind::Vpc));
    }

    #[test]
    fn all_kinds_enumerated_once() {
        let set: HashSet<_> = ResourceKind::ALL.iter().collect();
        assert_eq!(set.len(), 15);
    }

    #[test]
    fn edge_set_is_acyclic() {
        // Kahn's algorithm must consume every kind.
        let mut in_degree: HashMap<ResourceKind, usize> =
            ResourceKind::ALL.iter().map(|k| (*k, 0)).collect();
        for (_, to) in DEPENDENCY_EDGES {
            *in_degree.get_mut(to).unwrap() += 1;
        }

        let mut ready: Vec<ResourceKind> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(k, _)| *k)
            .collect();
        let mut seen = 0;
        while let Some(kind) = ready.pop() {
            seen += 1;
            for (from, to) in DEPENDENCY_EDGES {
                if *from == kind {
                    let d = in_degree.get_mut(to).unwrap();
                    *d -= 1;
                    if *d == 0 {
                        ready.push(*to);
                    }
                }
            }
        }
        assert_eq!(seen, ResourceKind::ALL.len(), "dependency edges contain a cycle");
    }

    #[test]
    fn detach_kinds() {
        assert!(ResourceKind::InternetGateway.needs_detach());
        assert!(ResourceKind::VpnGateway.needs_detach());
        assert!(!ResourceKind::Subnet.needs_detach());
    }
}
