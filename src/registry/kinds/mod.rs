//! Built-in resource kinds, one descriptor per file.

use super::ResourceTypeDescriptor;

mod autoscaling_groups;
mod images;
mod instances;
mod key_pairs;
mod load_balancers;
mod security_groups;
mod subnets;
mod target_groups;
mod volumes;
mod vpcs;

pub use self::autoscaling_groups::AUTOSCALING_GROUPS;
pub use self::images::IMAGES;
pub use self::instances::INSTANCES;
pub use self::key_pairs::KEY_PAIRS;
pub use self::load_balancers::LOAD_BALANCERS;
pub use self::security_groups::SECURITY_GROUPS;
pub use self::subnets::SUBNETS;
pub use self::target_groups::TARGET_GROUPS;
pub use self::volumes::VOLUMES;
pub use self::vpcs::VPCS;

pub(super) fn all() -> Vec<&'static ResourceTypeDescriptor> {
    vec![
        &INSTANCES,
        &AUTOSCALING_GROUPS,
        &SECURITY_GROUPS,
        &VPCS,
        &SUBNETS,
        &VOLUMES,
        &LOAD_BALANCERS,
        &TARGET_GROUPS,
        &IMAGES,
        &KEY_PAIRS,
    ]
}
