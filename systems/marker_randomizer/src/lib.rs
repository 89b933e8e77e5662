#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! One-shot marker randomizer.
//!
//! At load time the randomizer draws a random ordered subset of marker
//! identities. On the first pre-render callback where the host scene is
//! available it resolves every target slot (model, link, then visual),
//! assigns the corresponding marker material, and disconnects itself. Slots
//! that fail to resolve are reported and skipped; the remaining slots are
//! still processed.

mod selection;

use fiducial_sim_core::{
    HookControl, MarkerId, PreRenderHook, SceneGraph, SceneSource, SlotNaming, TargetSlot,
    Visual, WorldQuery, MARKER_POOL_SIZE, TARGET_SLOT_COUNT,
};
use rand::Rng;
use tracing::{info, warn};

pub use selection::MarkerSelection;

/// Parameters required to construct the randomizer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RandomizerConfig {
    /// Number of marker identities to choose from, `0..pool_size`.
    pub pool_size: u8,
    /// Number of target slots, `1..=slot_count`.
    pub slot_count: u8,
    /// Naming scheme for models, links, and materials.
    pub naming: SlotNaming,
}

impl Default for RandomizerConfig {
    fn default() -> Self {
        Self {
            pool_size: MARKER_POOL_SIZE,
            slot_count: TARGET_SLOT_COUNT,
            naming: SlotNaming::default(),
        }
    }
}

impl RandomizerConfig {
    /// Checks that every slot can receive a distinct marker.
    pub fn validate(&self) -> Result<(), RandomizerError> {
        selection::validate_sizes(self.pool_size, self.slot_count)
    }
}

/// Errors raised while constructing the randomizer.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RandomizerError {
    /// The slot count is zero or exceeds the marker pool.
    #[error("cannot assign {slot_count} distinct markers from a pool of {pool_size}")]
    InvalidSizes {
        /// Configured pool size.
        pool_size: u8,
        /// Configured slot count.
        slot_count: u8,
    },
    /// A marker appears more than once in an explicit selection.
    #[error("marker {marker} selected more than once")]
    DuplicateMarker {
        /// Repeated marker.
        marker: MarkerId,
    },
    /// A marker in an explicit selection lies outside the pool.
    #[error("marker {marker} lies outside the pool of {pool_size}")]
    MarkerOutOfPool {
        /// Offending marker.
        marker: MarkerId,
        /// Configured pool size.
        pool_size: u8,
    },
    /// An explicit selection does not provide one marker per slot.
    #[error("selection holds {selected} markers but {slot_count} slots are configured")]
    SelectionMismatch {
        /// Number of markers in the selection.
        selected: usize,
        /// Configured slot count.
        slot_count: u8,
    },
}

/// Result of attempting to apply a marker to a single slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlotOutcome {
    /// The marker material was assigned to the slot's visual.
    Applied {
        /// Marker assigned to the slot.
        marker: MarkerId,
        /// Material script set on the visual.
        material: String,
    },
    /// No model with the slot's name exists in the world.
    ModelMissing {
        /// Model name that failed to resolve.
        model: String,
    },
    /// The model exists but does not own the slot's link.
    LinkMissing {
        /// Link name that failed to resolve.
        link: String,
    },
    /// The scene has no visual for the slot's link.
    VisualMissing {
        /// Scoped visual name that failed to resolve.
        visual: String,
    },
}

impl SlotOutcome {
    /// Returns `true` when the slot received its marker.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Outcome for every slot visited during the application pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplyReport {
    slots: Vec<(TargetSlot, SlotOutcome)>,
}

impl ApplyReport {
    /// Per-slot outcomes in slot order.
    #[must_use]
    pub fn slots(&self) -> &[(TargetSlot, SlotOutcome)] {
        &self.slots
    }

    /// Outcome recorded for the provided slot.
    #[must_use]
    pub fn outcome(&self, slot: TargetSlot) -> Option<&SlotOutcome> {
        self.slots
            .iter()
            .find(|(candidate, _)| *candidate == slot)
            .map(|(_, outcome)| outcome)
    }

    /// Number of slots that received their marker.
    #[must_use]
    pub fn applied_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|(_, outcome)| outcome.is_applied())
            .count()
    }

    /// Number of slots that failed to resolve.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.slots.len() - self.applied_count()
    }
}

/// State reported after an application attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApplyStatus {
    /// The scene was not ready; nothing was modified and the attempt will repeat.
    SceneNotReady,
    /// Every slot was attempted exactly once during this call.
    Completed(ApplyReport),
    /// A previous call already completed; nothing was modified.
    AlreadyCompleted,
}

/// Randomizer bound to a host world and scene.
#[derive(Debug)]
pub struct MarkerRandomizer<W, S> {
    naming: SlotNaming,
    slot_count: u8,
    selection: Option<MarkerSelection>,
    report: Option<ApplyReport>,
    world: W,
    scene: S,
}

impl<W, S> MarkerRandomizer<W, S>
where
    W: WorldQuery,
    S: SceneSource,
{
    /// Draws a fresh marker selection and binds it to the provided host.
    pub fn load<R>(
        config: RandomizerConfig,
        world: W,
        scene: S,
        rng: &mut R,
    ) -> Result<Self, RandomizerError>
    where
        R: Rng + ?Sized,
    {
        config.validate()?;
        let selection = MarkerSelection::draw(config.pool_size, config.slot_count, rng)?;
        info!(
            markers = ?selection.markers(),
            "marker randomizer loaded"
        );
        Self::with_selection(config, selection, world, scene)
    }

    /// Binds an explicit marker selection to the provided host.
    pub fn with_selection(
        config: RandomizerConfig,
        selection: MarkerSelection,
        world: W,
        scene: S,
    ) -> Result<Self, RandomizerError> {
        config.validate()?;
        if selection.len() != usize::from(config.slot_count) {
            return Err(RandomizerError::SelectionMismatch {
                selected: selection.len(),
                slot_count: config.slot_count,
            });
        }

        Ok(Self {
            naming: config.naming,
            slot_count: config.slot_count,
            selection: Some(selection),
            report: None,
            world,
            scene,
        })
    }

    /// Selection awaiting application; `None` once it has been consumed.
    #[must_use]
    pub fn selection(&self) -> Option<&MarkerSelection> {
        self.selection.as_ref()
    }

    /// Reports whether the one-shot application already ran.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.selection.is_none()
    }

    /// Report produced by the completed application pass.
    #[must_use]
    pub fn report(&self) -> Option<&ApplyReport> {
        self.report.as_ref()
    }

    /// Releases the host handles.
    pub fn into_parts(self) -> (W, S) {
        (self.world, self.scene)
    }

    /// Attempts to apply the selection to every target slot.
    ///
    /// Succeeds at most once. While the scene is unavailable the call is a
    /// no-op that leaves the selection pending.
    pub fn apply(&mut self) -> ApplyStatus {
        let Some(selection) = self.selection.as_ref() else {
            return ApplyStatus::AlreadyCompleted;
        };
        let Some(scene) = self.scene.scene() else {
            warn!("scene is not ready yet, waiting");
            return ApplyStatus::SceneNotReady;
        };

        let slots = TargetSlot::all(self.slot_count)
            .zip(selection.markers().iter().copied())
            .map(|(slot, marker)| {
                let outcome = apply_slot(&self.world, &mut *scene, &self.naming, slot, marker);
                (slot, outcome)
            })
            .collect();
        let report = ApplyReport { slots };

        self.selection = None;
        self.report = Some(report.clone());
        info!(
            applied = report.applied_count(),
            failed = report.failed_count(),
            "marker randomization finished"
        );
        ApplyStatus::Completed(report)
    }
}

impl<W, S> PreRenderHook for MarkerRandomizer<W, S>
where
    W: WorldQuery,
    S: SceneSource,
{
    fn on_pre_render(&mut self) -> HookControl {
        match self.apply() {
            ApplyStatus::SceneNotReady => HookControl::Keep,
            ApplyStatus::Completed(_) | ApplyStatus::AlreadyCompleted => HookControl::Disconnect,
        }
    }
}

fn apply_slot<W, G>(
    world: &W,
    scene: &mut G,
    naming: &SlotNaming,
    slot: TargetSlot,
    marker: MarkerId,
) -> SlotOutcome
where
    W: WorldQuery,
    G: SceneGraph,
{
    let model = slot.model_name(naming);
    let Some(scoped_model) = world.model_scoped_name(&model) else {
        warn!(%slot, %model, "model not found");
        return SlotOutcome::ModelMissing { model };
    };

    let link = slot.link_name(naming);
    if !world.model_has_link(&model, &link) {
        warn!(%slot, %link, "link not found");
        return SlotOutcome::LinkMissing { link };
    }

    let visual_name = slot.visual_name(&scoped_model, naming);
    let Some(visual) = scene.visual_mut(&visual_name) else {
        warn!(%slot, visual = %visual_name, "visual not found");
        return SlotOutcome::VisualMissing {
            visual: visual_name,
        };
    };

    let material = marker.material_name(naming);
    visual.set_material(&material);
    info!(%model, %material, "changed marker");

    SlotOutcome::Applied { marker, material }
}
