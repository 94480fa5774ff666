use crate::registry::{
    ActionDef, ActionParams, Column, Precondition, Relation, ResourceTypeDescriptor,
};

pub static VOLUMES: ResourceTypeDescriptor = ResourceTypeDescriptor {
    kind: "volumes",
    canonical: "volumes",
    aliases: &["ebs", "volume"],
    service: "compute",
    id_path: "VolumeId",
    columns: &[
        Column { name: "size", path: "Size", width: 6 },
        Column { name: "type", path: "VolumeType", width: 6 },
        Column { name: "state", path: "State", width: 10 },
        Column { name: "zone", path: "AvailabilityZone", width: 12 },
    ],
    relations: &[Relation {
        target: "instances",
        label: "attached to",
        path: "Attachments[].InstanceId",
    }],
    actions: &[ActionDef {
        name: "delete",
        label: "Delete",
        hotkey: 'D',
        confirm: true,
        params: ActionParams::None,
        preconditions: &[Precondition::StateIs { attr: "state", allowed: &["available"] }],
        steps: &["delete"],
        best_effort: false,
    }],
};
