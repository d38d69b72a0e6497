use std::collections::BTreeMap;

use crate::error::{ForgeError, ForgeResult};

/// Nominal keyframe sample rate. Output is defined purely by keyframe times,
/// so this only feeds derived metadata such as [`frame_count`].
pub const SAMPLE_RATE: u32 = 30;

/// A (time, angle) sample on a bone's rotate channel. Angles are degrees.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Keyframe {
    pub time: f64,
    pub angle: f64,
}

/// Per-bone channel data. Only the rotate channel is generated procedurally.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BoneTimeline {
    #[serde(default)]
    pub rotate: Vec<Keyframe>,
}

/// One named animation: bone name -> channel keyframes.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AnimationClip {
    #[serde(default)]
    pub bones: BTreeMap<String, BoneTimeline>,
}

/// The closed set of animations the procedural synthesizer can produce.
///
/// Most kinds are aliases of one of four base curves at a different duration
/// (`hit` is a short `idle`, `walk` a slow `run`, and so on).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AnimationKind {
    Idle,
    Run,
    Attack,
    Attack1,
    Attack2,
    Hit,
    Die,
    Walk,
    Talk,
    Gesture,
    Move,
    Happy,
    Sad,
    Surprised,
}

impl AnimationKind {
    /// Resolves an animation name. Unknown names are an explicit error the
    /// caller is expected to log and skip; they never abort a batch.
    pub fn parse(name: &str) -> ForgeResult<Self> {
        match name {
            "idle" => Ok(Self::Idle),
            "run" => Ok(Self::Run),
            "attack" => Ok(Self::Attack),
            "attack1" => Ok(Self::Attack1),
            "attack2" => Ok(Self::Attack2),
            "hit" => Ok(Self::Hit),
            "die" => Ok(Self::Die),
            "walk" => Ok(Self::Walk),
            "talk" => Ok(Self::Talk),
            "gesture" => Ok(Self::Gesture),
            "move" => Ok(Self::Move),
            "happy" => Ok(Self::Happy),
            "sad" => Ok(Self::Sad),
            "surprised" => Ok(Self::Surprised),
            other => Err(ForgeError::UnsupportedAnimation(other.to_string())),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Run => "run",
            Self::Attack => "attack",
            Self::Attack1 => "attack1",
            Self::Attack2 => "attack2",
            Self::Hit => "hit",
            Self::Die => "die",
            Self::Walk => "walk",
            Self::Talk => "talk",
            Self::Gesture => "gesture",
            Self::Move => "move",
            Self::Happy => "happy",
            Self::Sad => "sad",
            Self::Surprised => "surprised",
        }
    }

    /// Duration in seconds used when the caller does not override it.
    pub fn default_duration(self) -> f64 {
        match self {
            Self::Idle | Self::Happy | Self::Sad | Self::Die => 1.0,
            Self::Run => 0.6,
            Self::Attack | Self::Attack1 | Self::Attack2 | Self::Move | Self::Talk => 0.5,
            Self::Hit | Self::Surprised => 0.3,
            Self::Walk | Self::Gesture => 0.8,
        }
    }

    fn base(self) -> BaseCurve {
        match self {
            Self::Idle | Self::Hit | Self::Talk | Self::Happy | Self::Sad | Self::Surprised => {
                BaseCurve::Sway
            }
            Self::Run | Self::Walk | Self::Move => BaseCurve::Gait,
            Self::Attack | Self::Attack1 | Self::Attack2 | Self::Gesture => BaseCurve::Swing,
            Self::Die => BaseCurve::Topple,
        }
    }
}

/// The four closed-form curve shapes behind every [`AnimationKind`].
enum BaseCurve {
    /// Gentle body oscillation (idle and friends).
    Sway,
    /// Mirrored leg swing (run and friends).
    Gait,
    /// Windup/strike/recoil/reset on the weapon arm (attack and friends).
    Swing,
    /// Root keels over (die).
    Topple,
}

/// Builds the deterministic keyframe timeline for `kind`.
///
/// Same (kind, duration) always yields identical keyframe data: no randomness,
/// no external state.
pub fn synthesize(kind: AnimationKind, duration_override: Option<f64>) -> AnimationClip {
    let d = duration_override.unwrap_or_else(|| kind.default_duration());
    let mut bones = BTreeMap::new();

    match kind.base() {
        BaseCurve::Sway => {
            bones.insert("body".to_string(), rotate(&[(0.0, 0.0), (d / 2.0, 2.0), (d, 0.0)]));
        }
        BaseCurve::Gait => {
            bones.insert(
                "leg_L".to_string(),
                rotate(&[(0.0, -30.0), (d / 2.0, 30.0), (d, -30.0)]),
            );
            bones.insert(
                "leg_R".to_string(),
                rotate(&[(0.0, 30.0), (d / 2.0, -30.0), (d, 30.0)]),
            );
        }
        BaseCurve::Swing => {
            bones.insert(
                "arm_R".to_string(),
                rotate(&[(0.0, 0.0), (d * 0.3, -90.0), (d * 0.5, 45.0), (d, 0.0)]),
            );
        }
        BaseCurve::Topple => {
            bones.insert("root".to_string(), rotate(&[(0.0, 0.0), (d, 90.0)]));
        }
    }

    AnimationClip { bones }
}

/// Whole frames covered at the nominal sample rate; derived metadata only,
/// the clip itself is never resampled.
pub fn frame_count(duration: f64) -> u64 {
    (duration * f64::from(SAMPLE_RATE)).max(0.0) as u64
}

/// Synthesizes every known name in `names` at default durations. Unknown
/// names are logged and skipped, never fatal. Returns the clips plus the
/// names actually synthesized, in request order.
pub fn synthesize_all(names: &[String]) -> (BTreeMap<String, AnimationClip>, Vec<String>) {
    let mut clips = BTreeMap::new();
    let mut added = Vec::new();
    for name in names {
        match AnimationKind::parse(name) {
            Ok(kind) => {
                let duration = kind.default_duration();
                tracing::debug!(
                    animation = %name,
                    frames = frame_count(duration),
                    "synthesized clip"
                );
                clips.insert(name.clone(), synthesize(kind, None));
                added.push(name.clone());
            }
            Err(e) => tracing::warn!("skipping animation: {e}"),
        }
    }
    (clips, added)
}

fn rotate(keys: &[(f64, f64)]) -> BoneTimeline {
    BoneTimeline {
        rotate: keys
            .iter()
            .map(|&(time, angle)| Keyframe { time, angle })
            .collect(),
    }
}
