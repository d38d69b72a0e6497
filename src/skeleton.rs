use std::collections::BTreeMap;

use crate::{
    animation::AnimationClip,
    error::{ForgeError, ForgeResult},
    parts::PartsMetadata,
    presets::BonePreset,
};

/// Spine version tag written into every generated document.
pub const SPINE_VERSION: &str = "4.1";

/// Default canvas extent for generated skeletons.
pub const CANVAS_SIZE: u32 = 512;

/// Top-level `skeleton` block of the document.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SkeletonMeta {
    pub hash: String,
    pub spine: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Default for SkeletonMeta {
    fn default() -> Self {
        Self {
            hash: String::new(),
            spine: SPINE_VERSION.to_string(),
            x: 0,
            y: 0,
            width: CANVAS_SIZE,
            height: CANVAS_SIZE,
        }
    }
}

/// A bone in the hierarchy. `parent: None` marks the root.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Bone {
    pub name: String,
    pub parent: Option<String>,
}

/// A named attachment point holding one renderable part.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Slot {
    pub name: String,
    pub bone: String,
    pub attachment: String,
}

/// Structurally Spine-compatible skeleton document. Bone and slot order is
/// significant and preserved through serialization.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SkeletonDoc {
    pub skeleton: SkeletonMeta,
    pub bones: Vec<Bone>,
    pub slots: Vec<Slot>,
    pub skins: BTreeMap<String, serde_json::Value>,
    pub animations: BTreeMap<String, AnimationClip>,
}

impl SkeletonDoc {
    /// Slots whose bone is not present in the bone list. Tolerated here;
    /// callers may warn, downstream consumers may reject.
    pub fn dangling_slots(&self) -> Vec<&Slot> {
        self.slots
            .iter()
            .filter(|slot| !self.bones.iter().any(|b| b.name == slot.bone))
            .collect()
    }

    /// Number of bones with no parent. Exactly 1 for every synthesized
    /// document.
    pub fn root_count(&self) -> usize {
        self.bones.iter().filter(|b| b.parent.is_none()).count()
    }
}

/// Builds a skeleton from segmented parts and a bone preset.
///
/// Bone 0 of the preset is the root; every other bone parents directly to
/// `root`, a flat one-level hierarchy (the preset name list carries no chain
/// structure). Each part becomes a slot in part order via the fixed part→bone
/// table; parts with no table entry land on `root`. Total over well-formed
/// input: zero parts is a valid skeleton with no slots.
pub fn synthesize_skeleton(parts: &PartsMetadata, preset: &BonePreset) -> SkeletonDoc {
    let bones: Vec<Bone> = preset
        .bones
        .iter()
        .map(|name| Bone {
            name: name.clone(),
            parent: (name != "root").then(|| "root".to_string()),
        })
        .collect();

    let slots: Vec<Slot> = parts
        .parts
        .iter()
        .map(|part| Slot {
            name: part.name.clone(),
            bone: map_part_to_bone(&part.name).to_string(),
            attachment: part.name.clone(),
        })
        .collect();

    let mut skins = BTreeMap::new();
    skins.insert(
        "default".to_string(),
        serde_json::Value::Object(serde_json::Map::new()),
    );

    let mut doc = SkeletonDoc {
        skeleton: SkeletonMeta::default(),
        bones,
        slots,
        skins,
        animations: BTreeMap::new(),
    };
    doc.skeleton.hash = structure_hash(&doc);
    doc
}

/// Merges `clips` into a raw skeleton document's `animations` map,
/// last-write-wins per animation name. Operating on raw JSON keeps every
/// top-level key this crate doesn't model intact across the round-trip.
pub fn merge_animations_into(
    doc: &mut serde_json::Value,
    clips: &BTreeMap<String, AnimationClip>,
) -> ForgeResult<()> {
    let obj = doc
        .as_object_mut()
        .ok_or_else(|| ForgeError::serde("skeleton document is not a JSON object"))?;
    let animations = obj
        .entry("animations")
        .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
    let animations = animations
        .as_object_mut()
        .ok_or_else(|| ForgeError::serde("'animations' is not a JSON object"))?;

    for (name, clip) in clips {
        let value = serde_json::to_value(clip)
            .map_err(|e| ForgeError::serde(format!("encode animation '{name}': {e}")))?;
        animations.insert(name.clone(), value);
    }
    Ok(())
}

/// Fixed part-name → bone-name table. The lookup ignores which bones the
/// preset actually contains, so a slot may reference an absent bone.
fn map_part_to_bone(part_name: &str) -> &'static str {
    match part_name {
        "head" => "head",
        "body" => "body",
        "arm_L" => "arm_L",
        "arm_R" => "arm_R",
        "leg_L" => "thigh_L",
        "leg_R" => "thigh_R",
        "weapon" => "hand_R",
        _ => "root",
    }
}

/// FNV-1a fingerprint of the bone and slot structure, hex-encoded. The same
/// parts and preset always produce the same hash; animations are excluded so
/// the hash survives incremental animation merges.
fn structure_hash(doc: &SkeletonDoc) -> String {
    let mut h = Fnv1a64::new();
    h.write_u64(doc.bones.len() as u64);
    for bone in &doc.bones {
        h.write_str(&bone.name);
        match &bone.parent {
            Some(parent) => {
                h.write_u8(1);
                h.write_str(parent);
            }
            None => h.write_u8(0),
        }
    }
    h.write_u64(doc.slots.len() as u64);
    for slot in &doc.slots {
        h.write_str(&slot.name);
        h.write_str(&slot.bone);
        h.write_str(&slot.attachment);
    }
    format!("{:016x}", h.finish())
}

struct Fnv1a64(u64);

impl Fnv1a64 {
    fn new() -> Self {
        Self(0xcbf29ce484222325)
    }

    fn write_u8(&mut self, v: u8) {
        self.write_bytes(&[v]);
    }

    fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_str(&mut self, s: &str) {
        self.write_u64(s.len() as u64);
        self.write_bytes(s.as_bytes());
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        let mut h = self.0;
        for &b in bytes {
            h ^= b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        self.0 = h;
    }

    fn finish(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parts::PartRecord;

    fn parts(names: &[&str]) -> PartsMetadata {
        PartsMetadata {
            source: "illustration.png".to_string(),
            method: "template".to_string(),
            parts: names
                .iter()
                .map(|name| PartRecord {
                    name: name.to_string(),
                    file: format!("{name}.png"),
                    region: [0.0, 0.0, 10.0, 10.0],
                })
                .collect(),
        }
    }

    fn humanoid() -> BonePreset {
        BonePreset {
            bones: ["root", "body", "head", "arm_L", "arm_R", "thigh_L", "thigh_R", "hand_R"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    #[test]
    fn hierarchy_is_flat_with_single_root() {
        let doc = synthesize_skeleton(&parts(&["head", "body"]), &humanoid());
        assert_eq!(doc.root_count(), 1);
        assert_eq!(doc.bones[0].name, "root");
        assert!(doc.bones[0].parent.is_none());
        for bone in &doc.bones[1..] {
            assert_eq!(bone.parent.as_deref(), Some("root"));
        }
    }

    #[test]
    fn slots_follow_part_order_and_mapping_table() {
        let doc = synthesize_skeleton(
            &parts(&["head", "leg_L", "weapon", "tail"]),
            &humanoid(),
        );
        let got: Vec<(&str, &str)> = doc
            .slots
            .iter()
            .map(|s| (s.name.as_str(), s.bone.as_str()))
            .collect();
        assert_eq!(
            got,
            vec![
                ("head", "head"),
                ("leg_L", "thigh_L"),
                ("weapon", "hand_R"),
                ("tail", "root"),
            ]
        );
        assert_eq!(doc.slots[0].attachment, "head");
    }

    #[test]
    fn dangling_bone_references_are_tolerated() {
        let simple = BonePreset {
            bones: vec!["root".to_string(), "body".to_string()],
        };
        let doc = synthesize_skeleton(&parts(&["head", "arm_L"]), &simple);
        // Slots still reference head/arm_L even though the preset lacks them.
        assert_eq!(doc.slots.len(), 2);
        assert_eq!(doc.dangling_slots().len(), 2);
    }

    #[test]
    fn no_parts_yields_valid_empty_slot_list() {
        let doc = synthesize_skeleton(&parts(&[]), &humanoid());
        assert!(doc.slots.is_empty());
        assert_eq!(doc.root_count(), 1);
        assert_eq!(doc.skins.len(), 1);
        assert!(doc.skins.contains_key("default"));
    }

    #[test]
    fn synthesis_is_idempotent_including_hash() {
        let p = parts(&["head", "body", "arm_R"]);
        let a = synthesize_skeleton(&p, &humanoid());
        let b = synthesize_skeleton(&p, &humanoid());
        assert_eq!(a, b);
        assert!(!a.skeleton.hash.is_empty());
    }

    #[test]
    fn hash_tracks_structure_not_animations() {
        let a = synthesize_skeleton(&parts(&["head"]), &humanoid());
        let b = synthesize_skeleton(&parts(&["body"]), &humanoid());
        assert_ne!(a.skeleton.hash, b.skeleton.hash);
    }

    #[test]
    fn merge_into_rejects_non_object_documents() {
        let mut doc = serde_json::json!([1, 2]);
        assert!(merge_animations_into(&mut doc, &BTreeMap::new()).is_err());
    }

    #[test]
    fn merge_into_creates_a_missing_animations_map() {
        let mut doc = serde_json::json!({"skeleton": {}});
        let mut clips = BTreeMap::new();
        clips.insert(
            "idle".to_string(),
            crate::animation::synthesize(crate::animation::AnimationKind::Idle, None),
        );
        merge_animations_into(&mut doc, &clips).unwrap();
        assert!(doc["animations"]["idle"]["bones"]["body"].is_object());
    }

    #[test]
    fn document_serializes_with_spine_shape() {
        let doc = synthesize_skeleton(&parts(&["head"]), &humanoid());
        let v = serde_json::to_value(&doc).unwrap();
        assert_eq!(v["skeleton"]["spine"], "4.1");
        assert_eq!(v["skeleton"]["width"], 512);
        assert_eq!(v["bones"][0]["parent"], serde_json::Value::Null);
        assert_eq!(v["slots"][0]["bone"], "head");
        assert_eq!(v["skins"]["default"], serde_json::json!({}));
    }
}
