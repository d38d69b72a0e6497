#![forbid(unsafe_code)]

pub mod animation;
pub mod error;
pub mod parts;
pub mod pipeline;
pub mod presets;
pub mod repository;
pub mod roster;
pub mod services;
pub mod skeleton;

pub use animation::{AnimationClip, AnimationKind, BoneTimeline, Keyframe};
pub use error::{ForgeError, ForgeResult};
pub use parts::{PartRecord, PartsMetadata};
pub use pipeline::{BatchReport, CharacterOutcome, PipelineDriver, PipelineOptions, StageStatus};
pub use presets::{BonePreset, PresetCatalog};
pub use repository::{AssetRepository, CharacterStatus, Manifest, Stage};
pub use roster::{CharacterSpec, load_roster};
pub use services::{IllustrationRequest, ServiceOutcome, Services};
pub use skeleton::{Bone, SkeletonDoc, Slot, synthesize_skeleton};
