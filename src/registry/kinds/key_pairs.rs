use crate::registry::{Column, ResourceTypeDescriptor};

pub static KEY_PAIRS: ResourceTypeDescriptor = ResourceTypeDescriptor {
    kind: "key-pairs",
    canonical: "key pairs",
    aliases: &["key", "keypair"],
    service: "compute",
    id_path: "KeyName",
    columns: &[
        Column { name: "type", path: "KeyType", width: 8 },
        Column { name: "fingerprint", path: "KeyFingerprint", width: 48 },
    ],
    relations: &[],
    actions: &[],
};
