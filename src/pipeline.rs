use tracing::{info, warn};

use crate::{
    animation,
    error::ForgeResult,
    parts,
    presets::PresetCatalog,
    repository::{AssetRepository, Stage},
    roster::CharacterSpec,
    services::{IllustrationRequest, ServiceOutcome, Services},
    skeleton,
};

/// Batch policy knobs. Service timeouts are configured where the services
/// are built; the driver itself never blocks on anything but them.
#[derive(Clone, Copy, Debug, Default)]
pub struct PipelineOptions {
    /// Skip characters whose status record says rigged-or-later (and whose
    /// skeleton document actually exists on disk).
    pub skip_existing: bool,
}

/// Terminal status of one stage attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StageStatus {
    Completed,
    /// The previous stage's expected output was absent; nothing was run.
    SkippedMissingInput(String),
    /// The stage ran and failed. Later stages are still attempted.
    Failed(String),
}

/// What happened to one character across the stage chain.
#[derive(Clone, Debug)]
pub struct CharacterOutcome {
    pub character_id: String,
    /// Terminal skip: the character was already rigged and `skip_existing`
    /// was set. No stages were attempted.
    pub skipped: bool,
    /// Stage results in execution order.
    pub stages: Vec<(Stage, StageStatus)>,
    /// Animation names actually merged during the animate stage, in request
    /// order (unknown preset entries are absent here).
    pub animations_added: Vec<String>,
}

impl CharacterOutcome {
    pub fn stage_status(&self, stage: Stage) -> Option<&StageStatus> {
        self.stages
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, status)| status)
    }
}

/// Aggregate result of a batch run. `succeeded` counts characters that were
/// *attempted* end-to-end, independent of per-stage outcomes (lenient by
/// design; the per-stage data carries the strict view).
#[derive(Debug, Default)]
pub struct BatchReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub outcomes: Vec<CharacterOutcome>,
}

/// Sequences the five stages per character and applies the
/// skip/continue-on-partial-failure policy.
///
/// Stage N runs only if stage N−1's expected artifact exists on disk at
/// invocation time, so a batch can be re-run to resume or repair earlier
/// output. No error escapes a character: every stage body is caught at its
/// boundary and recorded, and the loop moves on.
pub struct PipelineDriver<'a> {
    repo: &'a AssetRepository,
    catalog: &'a PresetCatalog,
    services: &'a Services,
    options: PipelineOptions,
}

impl<'a> PipelineDriver<'a> {
    pub fn new(
        repo: &'a AssetRepository,
        catalog: &'a PresetCatalog,
        services: &'a Services,
        options: PipelineOptions,
    ) -> Self {
        Self {
            repo,
            catalog,
            services,
            options,
        }
    }

    /// Runs every character in input order, sequentially.
    pub fn run_batch(&self, roster: &[CharacterSpec]) -> BatchReport {
        info!(characters = roster.len(), "starting batch");

        let mut report = BatchReport {
            attempted: roster.len(),
            ..BatchReport::default()
        };

        for spec in roster {
            if self.options.skip_existing && self.already_rigged(&spec.character_id) {
                info!(character_id = %spec.character_id, "skipping, already rigged");
                report.outcomes.push(CharacterOutcome {
                    character_id: spec.character_id.clone(),
                    skipped: true,
                    stages: Vec::new(),
                    animations_added: Vec::new(),
                });
                continue;
            }

            report.outcomes.push(self.process_character(spec));
            report.succeeded += 1;
        }

        info!(
            succeeded = report.succeeded,
            attempted = report.attempted,
            "batch finished"
        );
        report
    }

    /// Terminal-skip test: the status record must say rigged-or-later AND
    /// the skeleton document must actually be on disk (the record alone is
    /// not trusted if the artifact vanished).
    fn already_rigged(&self, character_id: &str) -> bool {
        match self.repo.read_status(character_id) {
            Ok(Some(status)) if status.stage >= Stage::Rigged => {
                self.repo.skeleton_path(character_id).exists()
            }
            Ok(_) => false,
            Err(e) => {
                warn!(character_id = %character_id, "unreadable status record: {e}");
                false
            }
        }
    }

    fn process_character(&self, spec: &CharacterSpec) -> CharacterOutcome {
        let id = spec.character_id.clone();
        info!(character_id = %id, "processing character");

        let mut outcome = CharacterOutcome {
            character_id: id.clone(),
            skipped: false,
            stages: Vec::new(),
            animations_added: Vec::new(),
        };

        // Prologue: persist the spec itself. If this fails the stages below
        // will mostly skip on their input gates, which is the right shape.
        if let Err(e) = self.repo.write_config(spec) {
            warn!(character_id = %id, "writing config failed: {e}");
        }
        if matches!(self.repo.read_status(&id), Ok(None)) {
            self.record(&id, Stage::Pending);
        }

        self.run_stage(&mut outcome, Stage::Illustrated, |o| self.illustrate(spec, o));
        self.run_stage(&mut outcome, Stage::Segmented, |o| self.segment(spec, o));
        self.run_stage(&mut outcome, Stage::Rigged, |o| self.rig(spec, o));
        self.run_stage(&mut outcome, Stage::Animated, |o| self.animate(spec, o));
        self.run_stage(&mut outcome, Stage::Exported, |o| self.export(spec, o));

        outcome
    }

    /// Catches everything at the stage boundary: an `Err` becomes a recorded
    /// failure and the next stage still runs.
    fn run_stage<F>(&self, outcome: &mut CharacterOutcome, stage: Stage, body: F)
    where
        F: FnOnce(&mut CharacterOutcome) -> ForgeResult<StageStatus>,
    {
        let status = match body(outcome) {
            Ok(status) => status,
            Err(e) => {
                warn!(
                    character_id = %outcome.character_id,
                    stage = ?stage,
                    "stage failed: {e}"
                );
                StageStatus::Failed(e.to_string())
            }
        };
        if let StageStatus::SkippedMissingInput(input) = &status {
            warn!(
                character_id = %outcome.character_id,
                stage = ?stage,
                "stage skipped, missing {input}"
            );
        }
        outcome.stages.push((stage, status));
    }

    fn illustrate(&self, spec: &CharacterSpec, _: &mut CharacterOutcome) -> ForgeResult<StageStatus> {
        let id = &spec.character_id;
        let request = IllustrationRequest::from_spec(spec);
        info!(character_id = %id, prompt = %request.prompt, "generating illustration");

        match self.services.illustration.generate(&request) {
            ServiceOutcome::Success(png_bytes) => {
                self.repo.write_illustration(id, &png_bytes)?;
                self.record(id, Stage::Illustrated);
                Ok(StageStatus::Completed)
            }
            ServiceOutcome::Failure(msg) => {
                // No local fallback can paint a character; the stage fails
                // and segmentation will gate on the missing image.
                warn!(character_id = %id, "illustration unavailable: {msg}");
                Ok(StageStatus::Failed(msg))
            }
            ServiceOutcome::TimedOut => {
                warn!(character_id = %id, "illustration service timed out");
                Ok(StageStatus::Failed("timed out".to_string()))
            }
        }
    }

    fn segment(&self, spec: &CharacterSpec, _: &mut CharacterOutcome) -> ForgeResult<StageStatus> {
        let id = &spec.character_id;
        let illustration = self.repo.illustration_path(id);
        if !illustration.exists() {
            return Ok(StageStatus::SkippedMissingInput(
                illustration.display().to_string(),
            ));
        }

        let parts_dir = self.repo.parts_dir(id);
        let metadata = match self.services.segmentation.segment(&illustration, &parts_dir) {
            ServiceOutcome::Success(metadata) => metadata,
            ServiceOutcome::Failure(_) | ServiceOutcome::TimedOut => {
                info!(character_id = %id, "segmentation service unavailable, using template split");
                parts::split_template(&illustration, &parts_dir)?
            }
        };

        self.repo.write_parts_metadata(id, &metadata)?;
        self.record(id, Stage::Segmented);
        info!(character_id = %id, parts = metadata.parts.len(), "parts written");
        Ok(StageStatus::Completed)
    }

    fn rig(&self, spec: &CharacterSpec, _: &mut CharacterOutcome) -> ForgeResult<StageStatus> {
        let id = &spec.character_id;
        let parts_dir = self.repo.parts_dir(id);
        if !parts_dir.exists() {
            return Ok(StageStatus::SkippedMissingInput(
                parts_dir.display().to_string(),
            ));
        }

        let metadata = self.repo.read_parts_metadata(id)?;
        let preset = self.catalog.bone_preset(&spec.rig_preset);

        let doc = match self.services.rigging.rig(&metadata, &preset) {
            ServiceOutcome::Success(doc) => doc,
            ServiceOutcome::Failure(_) | ServiceOutcome::TimedOut => {
                info!(character_id = %id, "rigging service unavailable, synthesizing locally");
                skeleton::synthesize_skeleton(&metadata, &preset)
            }
        };

        for slot in doc.dangling_slots() {
            warn!(
                character_id = %id,
                slot = %slot.name,
                bone = %slot.bone,
                "slot references a bone absent from the preset"
            );
        }

        self.repo.write_skeleton(id, &doc)?;
        self.record(id, Stage::Rigged);
        info!(
            character_id = %id,
            bones = doc.bones.len(),
            slots = doc.slots.len(),
            "rig written"
        );
        Ok(StageStatus::Completed)
    }

    fn animate(
        &self,
        spec: &CharacterSpec,
        outcome: &mut CharacterOutcome,
    ) -> ForgeResult<StageStatus> {
        let id = &spec.character_id;
        let skeleton_path = self.repo.skeleton_path(id);
        if !skeleton_path.exists() {
            return Ok(StageStatus::SkippedMissingInput(
                skeleton_path.display().to_string(),
            ));
        }

        let names = self.catalog.animation_preset(&spec.animation_preset);
        let (clips, added) = animation::synthesize_all(&names);
        self.repo.merge_animations(id, &clips)?;
        self.record(id, Stage::Animated);
        info!(character_id = %id, added = ?added, "animations merged");
        outcome.animations_added = added;
        Ok(StageStatus::Completed)
    }

    fn export(&self, spec: &CharacterSpec, _: &mut CharacterOutcome) -> ForgeResult<StageStatus> {
        let id = &spec.character_id;
        let spine_dir = self.repo.spine_dir(id);
        if !spine_dir.exists() {
            return Ok(StageStatus::SkippedMissingInput(
                spine_dir.display().to_string(),
            ));
        }

        let manifest = self.repo.write_manifest(id)?;
        let copied = self.repo.export(id, None)?;
        self.record(id, Stage::Exported);
        info!(
            character_id = %id,
            files = copied.len(),
            animations = manifest.animations.len(),
            "exported"
        );
        Ok(StageStatus::Completed)
    }

    fn record(&self, character_id: &str, stage: Stage) {
        if let Err(e) = self.repo.record_stage(character_id, stage) {
            warn!(character_id = %character_id, "writing status record failed: {e}");
        }
    }
}
