use std::{collections::BTreeMap, fs::File, io::BufReader, path::Path};

use crate::error::{ForgeError, ForgeResult};

/// Named bone layout. The first bone is the implicit root.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BonePreset {
    pub bones: Vec<String>,
}

impl BonePreset {
    /// The documented fallback layout used whenever a preset cannot be
    /// resolved by name.
    pub fn fallback() -> Self {
        Self {
            bones: vec!["root".to_string(), "body".to_string(), "head".to_string()],
        }
    }
}

/// Named bone-layout and animation-name presets, loaded once from a JSON
/// store. Lookups never fail: an unknown name resolves to a safe default.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct PresetCatalog {
    #[serde(default)]
    animations: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    rig_types: BTreeMap<String, BonePreset>,
}

impl PresetCatalog {
    /// Loads the catalog from `path`. An absent store file is not an error
    /// (every lookup then hits the defaults); a malformed one is.
    pub fn load(path: &Path) -> ForgeResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let file = File::open(path).map_err(|e| {
            ForgeError::serde(format!("open preset store '{}': {e}", path.display()))
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            ForgeError::serde(format!("parse preset store '{}': {e}", path.display()))
        })
    }

    /// Animation names for `preset_name`, or `["idle"]` when unknown.
    pub fn animation_preset(&self, preset_name: &str) -> Vec<String> {
        self.animations
            .get(preset_name)
            .cloned()
            .unwrap_or_else(|| vec!["idle".to_string()])
    }

    /// Bone layout for `preset_name`, or the root/body/head fallback when
    /// unknown.
    pub fn bone_preset(&self, preset_name: &str) -> BonePreset {
        self.rig_types
            .get(preset_name)
            .cloned()
            .unwrap_or_else(BonePreset::fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> PresetCatalog {
        serde_json::from_str(
            r#"{
                "animations": {
                    "combat": ["idle", "run", "attack", "die"],
                    "npc": ["idle", "talk", "gesture"]
                },
                "rig_types": {
                    "humanoid": {"bones": ["root", "body", "head", "arm_L", "arm_R", "thigh_L", "thigh_R", "hand_R"]},
                    "simple": {"bones": ["root", "body"]}
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn known_names_resolve() {
        let c = catalog();
        assert_eq!(c.animation_preset("npc"), vec!["idle", "talk", "gesture"]);
        assert_eq!(c.bone_preset("simple").bones, vec!["root", "body"]);
    }

    #[test]
    fn unknown_names_fall_back_without_error() {
        let c = catalog();
        assert_eq!(c.animation_preset("no_such_preset"), vec!["idle"]);
        assert_eq!(
            c.bone_preset("no_such_preset").bones,
            vec!["root", "body", "head"]
        );
    }

    #[test]
    fn absent_store_loads_as_empty_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let c = PresetCatalog::load(&dir.path().join("presets.json")).unwrap();
        assert_eq!(c.animation_preset("combat"), vec!["idle"]);
    }

    #[test]
    fn malformed_store_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("presets.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(PresetCatalog::load(&path).is_err());
    }
}
