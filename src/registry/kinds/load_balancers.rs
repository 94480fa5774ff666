use crate::registry::{Column, Relation, ResourceTypeDescriptor};

pub static LOAD_BALANCERS: ResourceTypeDescriptor = ResourceTypeDescriptor {
    kind: "load-balancers",
    canonical: "load balancers",
    aliases: &["lb", "elbv2", "loadbalancing"],
    service: "loadbalancing",
    id_path: "LoadBalancerArn",
    columns: &[
        Column { name: "name", path: "LoadBalancerName", width: 24 },
        Column { name: "type", path: "Type", width: 12 },
        Column { name: "scheme", path: "Scheme", width: 16 },
        Column { name: "dns", path: "DNSName", width: 40 },
    ],
    relations: &[
        Relation { target: "vpcs", label: "vpc", path: "VpcId" },
        Relation { target: "security-groups", label: "security groups", path: "SecurityGroups[]" },
        Relation { target: "subnets", label: "subnets", path: "AvailabilityZones[].SubnetId" },
    ],
    actions: &[],
};
