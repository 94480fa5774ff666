use crate::registry::{Column, Relation, ResourceTypeDescriptor};

pub static SECURITY_GROUPS: ResourceTypeDescriptor = ResourceTypeDescriptor {
    kind: "security-groups",
    canonical: "security groups",
    aliases: &["sg", "securitygroup"],
    service: "compute",
    id_path: "GroupId",
    columns: &[
        Column { name: "name", path: "GroupName", width: 24 },
        Column { name: "vpc", path: "VpcId", width: 22 },
        Column { name: "description", path: "Description", width: 40 },
    ],
    relations: &[Relation { target: "vpcs", label: "vpc", path: "VpcId" }],
    actions: &[],
};
