use crate::registry::{Column, ResourceTypeDescriptor};

pub static IMAGES: ResourceTypeDescriptor = ResourceTypeDescriptor {
    kind: "images",
    canonical: "images",
    aliases: &["ami", "image"],
    service: "compute",
    id_path: "ImageId",
    columns: &[
        Column { name: "name", path: "Name", width: 32 },
        Column { name: "state", path: "State", width: 10 },
        Column { name: "owner", path: "OwnerId", width: 14 },
        Column { name: "created", path: "CreationDate", width: 24 },
    ],
    relations: &[],
    actions: &[],
};
