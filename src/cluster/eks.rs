//! Amazon EKS

use super::managed::ManagedProperties;
use crate::model::{ClusterKind, EksProperties, NodePool, ProviderRecord};

impl ManagedProperties for EksProperties {
    const KIND: ClusterKind = ClusterKind::Eks;

    fn into_record(self) -> ProviderRecord {
        ProviderRecord::Eks(self)
    }

    fn kubernetes_version(&self) -> &str {
        &self.kubernetes_version
    }

    fn kubernetes_version_mut(&mut self) -> &mut String {
        &mut self.kubernetes_version
    }

    fn node_pools(&self) -> &[NodePool] {
        &self.node_pools
    }

    fn node_pools_mut(&mut self) -> &mut Vec<NodePool> {
        &mut self.node_pools
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "vpcId": self.vpc_id,
            "subnets": self.subnets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EksSubnet;

    #[test]
    fn test_parameters_carry_network() {
        let props = EksProperties {
            vpc_id: "vpc-1".to_string(),
            subnets: vec![EksSubnet {
                subnet_id: String::new(),
                cidr: "192.168.64.0/20".to_string(),
                availability_zone: "eu-west-1a".to_string(),
            }],
            ..Default::default()
        };
        let params = props.parameters();
        assert_eq!(params["vpcId"], "vpc-1");
        assert_eq!(params["subnets"][0]["cidr"], "192.168.64.0/20");
        assert_eq!(params["subnets"][0]["availabilityZone"], "eu-west-1a");
    }
}
