use crate::registry::{Column, ResourceTypeDescriptor};

pub static VPCS: ResourceTypeDescriptor = ResourceTypeDescriptor {
    kind: "vpcs",
    canonical: "vpcs",
    aliases: &["vpc"],
    service: "compute",
    id_path: "VpcId",
    columns: &[
        Column { name: "name", path: "Tags[Key=Name].Value", width: 24 },
        Column { name: "cidr", path: "CidrBlock", width: 18 },
        Column { name: "state", path: "State", width: 10 },
        Column { name: "default", path: "IsDefault", width: 8 },
    ],
    relations: &[],
    actions: &[],
};
