use crate::registry::{
    ActionDef, ActionParams, Column, Precondition, Relation, ResourceTypeDescriptor,
};

pub static INSTANCES: ResourceTypeDescriptor = ResourceTypeDescriptor {
    kind: "instances",
    canonical: "instances",
    aliases: &["i", "ec2", "instance", "vm"],
    service: "compute",
    id_path: "InstanceId",
    columns: &[
        Column { name: "name", path: "Tags[Key=Name].Value", width: 24 },
        Column { name: "state", path: "State.Name", width: 12 },
        Column { name: "type", path: "InstanceType", width: 12 },
        Column { name: "public_ip", path: "PublicIpAddress", width: 16 },
        Column { name: "private_ip", path: "PrivateIpAddress", width: 16 },
        Column { name: "key", path: "KeyName", width: 16 },
    ],
    relations: &[
        Relation { target: "security-groups", label: "security groups", path: "SecurityGroups[].GroupId" },
        Relation { target: "vpcs", label: "vpc", path: "VpcId" },
        Relation { target: "subnets", label: "subnet", path: "SubnetId" },
        Relation { target: "volumes", label: "volumes", path: "BlockDeviceMappings[].Ebs.VolumeId" },
        Relation { target: "images", label: "image", path: "ImageId" },
        Relation { target: "key-pairs", label: "key pair", path: "KeyName" },
    ],
    actions: &[
        ActionDef {
            name: "start",
            label: "Start",
            hotkey: 's',
            confirm: false,
            params: ActionParams::None,
            preconditions: &[Precondition::StateIs { attr: "state", allowed: &["stopped"] }],
            steps: &["start"],
            best_effort: false,
        },
        ActionDef {
            name: "stop",
            label: "Stop",
            hotkey: 'x',
            confirm: true,
            params: ActionParams::None,
            preconditions: &[Precondition::StateIs { attr: "state", allowed: &["running"] }],
            steps: &["stop"],
            best_effort: false,
        },
        ActionDef {
            name: "reboot",
            label: "Reboot",
            hotkey: 'b',
            confirm: true,
            params: ActionParams::None,
            preconditions: &[Precondition::StateIs { attr: "state", allowed: &["running"] }],
            steps: &["reboot"],
            best_effort: false,
        },
        ActionDef {
            name: "terminate",
            label: "Terminate",
            hotkey: 'T',
            confirm: true,
            params: ActionParams::None,
            preconditions: &[Precondition::StateIsNot {
                attr: "state",
                denied: &["terminated", "shutting-down"],
            }],
            steps: &["terminate"],
            best_effort: false,
        },
        ActionDef {
            name: "connect",
            label: "Connect (ssh)",
            hotkey: 'c',
            confirm: false,
            params: ActionParams::SshUser,
            preconditions: &[
                Precondition::StateIs { attr: "state", allowed: &["running"] },
                Precondition::Optional { attr: "public_ip" },
            ],
            steps: &["send-ssh-public-key", "open-ssh-session"],
            best_effort: true,
        },
    ],
};
