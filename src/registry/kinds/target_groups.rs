use crate::registry::{Column, Relation, ResourceTypeDescriptor};

pub static TARGET_GROUPS: ResourceTypeDescriptor = ResourceTypeDescriptor {
    kind: "target-groups",
    canonical: "target groups",
    aliases: &["tg", "targetgroup"],
    service: "loadbalancing",
    id_path: "TargetGroupArn",
    columns: &[
        Column { name: "name", path: "TargetGroupName", width: 24 },
        Column { name: "protocol", path: "Protocol", width: 8 },
        Column { name: "port", path: "Port", width: 6 },
        Column { name: "vpc", path: "VpcId", width: 22 },
    ],
    relations: &[
        Relation { target: "vpcs", label: "vpc", path: "VpcId" },
        Relation { target: "load-balancers", label: "load balancers", path: "LoadBalancerArns[]" },
    ],
    actions: &[],
};
