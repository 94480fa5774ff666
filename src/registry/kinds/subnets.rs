use crate::registry::{Column, Relation, ResourceTypeDescriptor};

pub static SUBNETS: ResourceTypeDescriptor = ResourceTypeDescriptor {
    kind: "subnets",
    canonical: "subnets",
    aliases: &["subnet"],
    service: "compute",
    id_path: "SubnetId",
    columns: &[
        Column { name: "name", path: "Tags[Key=Name].Value", width: 24 },
        Column { name: "vpc", path: "VpcId", width: 22 },
        Column { name: "cidr", path: "CidrBlock", width: 18 },
        Column { name: "zone", path: "AvailabilityZone", width: 12 },
        Column { name: "free_ips", path: "AvailableIpAddressCount", width: 8 },
    ],
    relations: &[Relation { target: "vpcs", label: "vpc", path: "VpcId" }],
    actions: &[],
};
