use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use chrono::{DateTime, Utc};

use crate::{
    animation::AnimationClip,
    error::{ForgeError, ForgeResult},
    roster::CharacterSpec,
    skeleton::SkeletonDoc,
};

/// How far a character has progressed through the pipeline. Ordering follows
/// stage order, so `>= Stage::Rigged` means "rigged or later".
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Pending,
    Illustrated,
    Segmented,
    Rigged,
    Animated,
    Exported,
}

/// Persisted per-character progress record (`status.json`). The driver reads
/// this instead of inferring state from file presence alone; presence of the
/// stage's artifact remains a secondary consistency check.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CharacterStatus {
    pub stage: Stage,
    pub updated_at: DateTime<Utc>,
}

/// Manifest consumed by the game engine's asset loader. Derived from the
/// spine directory on every export, never hand-edited.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Manifest {
    pub character_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub files: Vec<FileEntry>,
    pub animations: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
}

/// Path-addressed store for all per-character artifacts under one output
/// root:
///
/// ```text
/// {root}/{character_id}/config.json
///                       illustration.png
///                       parts/{part}.png
///                       parts/metadata.json
///                       spine/skeleton.json
///                       spine/manifest.json
///                       status.json
///                       export/...
/// ```
///
/// All stages hand artifacts to each other through this layout. No locking:
/// a single batch run never touches one character directory from two places,
/// and concurrent runs over the same root are documented as unsafe.
#[derive(Clone, Debug)]
pub struct AssetRepository {
    root: PathBuf,
}

impl AssetRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn character_dir(&self, character_id: &str) -> PathBuf {
        self.root.join(character_id)
    }

    pub fn config_path(&self, character_id: &str) -> PathBuf {
        self.character_dir(character_id).join("config.json")
    }

    pub fn illustration_path(&self, character_id: &str) -> PathBuf {
        self.character_dir(character_id).join("illustration.png")
    }

    pub fn parts_dir(&self, character_id: &str) -> PathBuf {
        self.character_dir(character_id).join("parts")
    }

    pub fn parts_metadata_path(&self, character_id: &str) -> PathBuf {
        self.parts_dir(character_id).join("metadata.json")
    }

    pub fn spine_dir(&self, character_id: &str) -> PathBuf {
        self.character_dir(character_id).join("spine")
    }

    pub fn skeleton_path(&self, character_id: &str) -> PathBuf {
        self.spine_dir(character_id).join("skeleton.json")
    }

    pub fn manifest_path(&self, character_id: &str) -> PathBuf {
        self.spine_dir(character_id).join("manifest.json")
    }

    pub fn export_dir(&self, character_id: &str) -> PathBuf {
        self.character_dir(character_id).join("export")
    }

    pub fn status_path(&self, character_id: &str) -> PathBuf {
        self.character_dir(character_id).join("status.json")
    }

    /// Writes the character's full spec (extras included) as `config.json`,
    /// creating the character directory.
    pub fn write_config(&self, spec: &CharacterSpec) -> ForgeResult<()> {
        let dir = self.character_dir(&spec.character_id);
        fs::create_dir_all(&dir)
            .with_context(|| format!("create character dir '{}'", dir.display()))?;
        write_json(&self.config_path(&spec.character_id), spec)
    }

    pub fn write_illustration(&self, character_id: &str, png_bytes: &[u8]) -> ForgeResult<()> {
        let path = self.illustration_path(character_id);
        fs::write(&path, png_bytes)
            .with_context(|| format!("write illustration '{}'", path.display()))?;
        Ok(())
    }

    /// Reads `parts/metadata.json`. An absent file reads as empty metadata
    /// (zero parts), matching the zero-parts tolerance of the rig stage.
    pub fn read_parts_metadata(&self, character_id: &str) -> ForgeResult<crate::parts::PartsMetadata> {
        let path = self.parts_metadata_path(character_id);
        if !path.exists() {
            return Ok(crate::parts::PartsMetadata::default());
        }
        read_json(&path)
    }

    pub fn write_parts_metadata(
        &self,
        character_id: &str,
        metadata: &crate::parts::PartsMetadata,
    ) -> ForgeResult<()> {
        let dir = self.parts_dir(character_id);
        fs::create_dir_all(&dir)
            .with_context(|| format!("create parts dir '{}'", dir.display()))?;
        write_json(&self.parts_metadata_path(character_id), metadata)
    }

    /// Full-document write of `spine/skeleton.json` (the rig stage replaces
    /// any previous rig wholesale).
    pub fn write_skeleton(&self, character_id: &str, doc: &SkeletonDoc) -> ForgeResult<()> {
        let dir = self.spine_dir(character_id);
        fs::create_dir_all(&dir)
            .with_context(|| format!("create spine dir '{}'", dir.display()))?;
        write_json(&self.skeleton_path(character_id), doc)
    }

    /// Merges `clips` into the existing skeleton document's `animations` map.
    ///
    /// Last-write-wins per animation name; every other top-level key of the
    /// document is preserved untouched (the merge operates on raw JSON so
    /// keys this crate doesn't model survive a round-trip).
    pub fn merge_animations(
        &self,
        character_id: &str,
        clips: &BTreeMap<String, AnimationClip>,
    ) -> ForgeResult<()> {
        let path = self.skeleton_path(character_id);
        if !path.exists() {
            return Err(ForgeError::missing_input(format!(
                "skeleton document '{}'",
                path.display()
            )));
        }

        let mut doc: serde_json::Value = read_json(&path)?;
        crate::skeleton::merge_animations_into(&mut doc, clips)?;
        write_json(&path, &doc)
    }

    /// Regenerates `spine/manifest.json` from the spine directory contents
    /// and the skeleton's animation names. The manifest never lists itself.
    pub fn write_manifest(&self, character_id: &str) -> ForgeResult<Manifest> {
        let spine_dir = self.spine_dir(character_id);
        if !spine_dir.exists() {
            return Err(ForgeError::missing_input(format!(
                "spine dir '{}'",
                spine_dir.display()
            )));
        }

        let mut files = Vec::new();
        let entries = fs::read_dir(&spine_dir)
            .with_context(|| format!("list spine dir '{}'", spine_dir.display()))?;
        for entry in entries {
            let entry = entry.with_context(|| "read spine dir entry")?;
            let meta = entry.metadata().with_context(|| "stat spine dir entry")?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if meta.is_file() && name != "manifest.json" {
                files.push(FileEntry {
                    name,
                    size: meta.len(),
                });
            }
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));

        let mut animations = Vec::new();
        let skeleton_path = self.skeleton_path(character_id);
        if skeleton_path.exists() {
            let doc: serde_json::Value = read_json(&skeleton_path)?;
            if let Some(map) = doc.get("animations").and_then(|a| a.as_object()) {
                animations = map.keys().cloned().collect();
            }
        }

        let manifest = Manifest {
            character_id: character_id.to_string(),
            kind: "spine".to_string(),
            files,
            animations,
        };
        write_json(&self.manifest_path(character_id), &manifest)?;
        Ok(manifest)
    }

    /// Flat-copies every file in `spine/` into the export directory
    /// (`{char}/export` unless overridden). Returns the copied file names.
    pub fn export(&self, character_id: &str, target: Option<&Path>) -> ForgeResult<Vec<String>> {
        let spine_dir = self.spine_dir(character_id);
        if !spine_dir.exists() {
            return Err(ForgeError::missing_input(format!(
                "spine dir '{}'",
                spine_dir.display()
            )));
        }

        let target = target
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.export_dir(character_id));
        fs::create_dir_all(&target)
            .with_context(|| format!("create export dir '{}'", target.display()))?;

        let mut copied = Vec::new();
        let entries = fs::read_dir(&spine_dir)
            .with_context(|| format!("list spine dir '{}'", spine_dir.display()))?;
        for entry in entries {
            let entry = entry.with_context(|| "read spine dir entry")?;
            if !entry.file_type().with_context(|| "stat spine dir entry")?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            fs::copy(entry.path(), target.join(&name))
                .with_context(|| format!("copy '{name}' to '{}'", target.display()))?;
            copied.push(name);
        }
        copied.sort();
        Ok(copied)
    }

    /// Reads `status.json`; `None` when the character has never been touched.
    pub fn read_status(&self, character_id: &str) -> ForgeResult<Option<CharacterStatus>> {
        let path = self.status_path(character_id);
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    /// Records that `character_id` reached `stage` now.
    pub fn record_stage(&self, character_id: &str, stage: Stage) -> ForgeResult<()> {
        let dir = self.character_dir(character_id);
        fs::create_dir_all(&dir)
            .with_context(|| format!("create character dir '{}'", dir.display()))?;
        write_json(
            &self.status_path(character_id),
            &CharacterStatus {
                stage,
                updated_at: Utc::now(),
            },
        )
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> ForgeResult<T> {
    let bytes = fs::read(path).with_context(|| format!("read '{}'", path.display()))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ForgeError::serde(format!("parse '{}': {e}", path.display())))
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> ForgeResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| ForgeError::serde(format!("encode '{}': {e}", path.display())))?;
    fs::write(path, text).with_context(|| format!("write '{}'", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        animation::{self, AnimationKind},
        parts::PartsMetadata,
        presets::BonePreset,
        skeleton::synthesize_skeleton,
    };

    fn repo() -> (tempfile::TempDir, AssetRepository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = AssetRepository::new(dir.path());
        (dir, repo)
    }

    fn rigged(repo: &AssetRepository, id: &str) {
        let doc = synthesize_skeleton(&PartsMetadata::default(), &BonePreset::fallback());
        repo.write_skeleton(id, &doc).unwrap();
    }

    #[test]
    fn layout_matches_contract() {
        let (_tmp, repo) = repo();
        let base = repo.character_dir("c1");
        assert_eq!(repo.config_path("c1"), base.join("config.json"));
        assert_eq!(repo.skeleton_path("c1"), base.join("spine/skeleton.json"));
        assert_eq!(
            repo.parts_metadata_path("c1"),
            base.join("parts/metadata.json")
        );
        assert_eq!(repo.manifest_path("c1"), base.join("spine/manifest.json"));
    }

    #[test]
    fn merge_is_last_write_wins_per_name() {
        let (_tmp, repo) = repo();
        rigged(&repo, "c1");

        let mut first = BTreeMap::new();
        first.insert("a".to_string(), animation::synthesize(AnimationKind::Idle, None));
        first.insert("b".to_string(), animation::synthesize(AnimationKind::Idle, None));
        repo.merge_animations("c1", &first).unwrap();

        let mut second = BTreeMap::new();
        second.insert("b".to_string(), animation::synthesize(AnimationKind::Run, None));
        second.insert("c".to_string(), animation::synthesize(AnimationKind::Die, None));
        repo.merge_animations("c1", &second).unwrap();

        let doc: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(repo.skeleton_path("c1")).unwrap()).unwrap();
        let animations = doc["animations"].as_object().unwrap();
        let names: Vec<&str> = animations.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        // "b" must come from the second merge (run keys legs, idle keys body).
        assert!(animations["b"]["bones"].get("leg_L").is_some());
        assert!(animations["b"]["bones"].get("body").is_none());
        // Untouched top-level keys survive.
        assert_eq!(doc["skeleton"]["spine"], "4.1");
    }

    #[test]
    fn merge_preserves_foreign_top_level_keys() {
        let (_tmp, repo) = repo();
        fs::create_dir_all(repo.spine_dir("c1")).unwrap();
        fs::write(
            repo.skeleton_path("c1"),
            r#"{"skeleton": {"spine": "4.1"}, "ik": [{"name": "leg"}], "animations": {}}"#,
        )
        .unwrap();

        let mut clips = BTreeMap::new();
        clips.insert("idle".to_string(), animation::synthesize(AnimationKind::Idle, None));
        repo.merge_animations("c1", &clips).unwrap();

        let doc: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(repo.skeleton_path("c1")).unwrap()).unwrap();
        assert_eq!(doc["ik"][0]["name"], "leg");
        assert!(doc["animations"]["idle"].is_object());
    }

    #[test]
    fn merge_without_skeleton_is_missing_input() {
        let (_tmp, repo) = repo();
        let err = repo.merge_animations("ghost", &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, ForgeError::MissingInput(_)));
    }

    #[test]
    fn manifest_lists_files_and_animations_but_not_itself() {
        let (_tmp, repo) = repo();
        rigged(&repo, "c1");
        let mut clips = BTreeMap::new();
        clips.insert("idle".to_string(), animation::synthesize(AnimationKind::Idle, None));
        clips.insert("run".to_string(), animation::synthesize(AnimationKind::Run, None));
        repo.merge_animations("c1", &clips).unwrap();

        let first = repo.write_manifest("c1").unwrap();
        assert_eq!(first.kind, "spine");
        assert_eq!(first.animations, vec!["idle", "run"]);
        assert_eq!(first.files.len(), 1);
        assert_eq!(first.files[0].name, "skeleton.json");

        // Regenerating after the manifest exists must not pick it up.
        let second = repo.write_manifest("c1").unwrap();
        assert_eq!(second.files.len(), 1);
    }

    #[test]
    fn export_copies_spine_files_flat() {
        let (_tmp, repo) = repo();
        rigged(&repo, "c1");
        repo.write_manifest("c1").unwrap();

        let copied = repo.export("c1", None).unwrap();
        assert_eq!(copied, vec!["manifest.json", "skeleton.json"]);
        assert!(repo.export_dir("c1").join("skeleton.json").exists());
    }

    #[test]
    fn status_roundtrip_and_ordering() {
        let (_tmp, repo) = repo();
        assert!(repo.read_status("c1").unwrap().is_none());
        repo.record_stage("c1", Stage::Rigged).unwrap();
        let status = repo.read_status("c1").unwrap().unwrap();
        assert_eq!(status.stage, Stage::Rigged);
        assert!(status.stage >= Stage::Segmented);
        assert!(status.stage < Stage::Exported);
    }

    #[test]
    fn absent_parts_metadata_reads_as_empty() {
        let (_tmp, repo) = repo();
        let meta = repo.read_parts_metadata("c1").unwrap();
        assert!(meta.parts.is_empty());
    }
}
