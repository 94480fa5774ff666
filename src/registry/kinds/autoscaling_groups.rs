use crate::model::ResourceRecord;
use crate::registry::{
    ActionDef, ActionParams, Column, Precondition, Relation, ResourceTypeDescriptor,
};

pub static AUTOSCALING_GROUPS: ResourceTypeDescriptor = ResourceTypeDescriptor {
    kind: "autoscaling-groups",
    canonical: "autoscaling groups",
    aliases: &["asg", "autoscaling"],
    service: "autoscaling",
    id_path: "AutoScalingGroupName",
    columns: &[
        Column { name: "desired", path: "DesiredCapacity", width: 8 },
        Column { name: "min", path: "MinSize", width: 5 },
        Column { name: "max", path: "MaxSize", width: 5 },
        Column { name: "launch_template", path: "LaunchTemplate.LaunchTemplateName", width: 24 },
        Column { name: "health_check", path: "HealthCheckType", width: 8 },
    ],
    relations: &[
        Relation { target: "instances", label: "instances", path: "Instances[].InstanceId" },
        Relation { target: "target-groups", label: "target groups", path: "TargetGroupARNs[]" },
    ],
    actions: &[ActionDef {
        name: "scale",
        label: "Scale",
        hotkey: 'S',
        confirm: false,
        params: ActionParams::DesiredCapacity,
        preconditions: &[Precondition::Check(has_capacity_bounds)],
        steps: &["set-desired-capacity"],
        best_effort: false,
    }],
};

fn has_capacity_bounds(record: &ResourceRecord) -> Result<(), String> {
    match (record.attr_i64("min"), record.attr_i64("max")) {
        (Some(min), Some(max)) if min <= max => Ok(()),
        (Some(_), Some(_)) => Err("group has min above max".to_string()),
        _ => Err("group capacity limits are unknown".to_string()),
    }
}
