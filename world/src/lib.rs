#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! In-memory simulation host for Fiducial Sim.
//!
//! The host owns the physics-side [`SimWorld`] (models and their links), the
//! render-side [`SimScene`] (visuals keyed by scoped name), a [`SceneSlot`]
//! that withholds the scene until it is ready, and a [`RenderLoop`] that
//! dispatches pre-render subscriptions each frame.

mod render_loop;

use std::collections::{BTreeMap, BTreeSet};

use fiducial_sim_core::{
    scoped_visual_name, SceneGraph, SceneSource, SlotNaming, TargetSlot, Visual, WorldQuery,
};

pub use render_loop::{ConnectionId, RenderLoop};

/// Physics-side model with a set of named links.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimModel {
    scoped_name: String,
    links: BTreeSet<String>,
}

impl SimModel {
    /// Fully scoped name of the model.
    #[must_use]
    pub fn scoped_name(&self) -> &str {
        &self.scoped_name
    }

    /// Names of the links owned by the model.
    pub fn links(&self) -> impl Iterator<Item = &str> {
        self.links.iter().map(String::as_str)
    }
}

/// Physics-side world that resolves models and links by name.
#[derive(Clone, Debug, Default)]
pub struct SimWorld {
    models: BTreeMap<String, SimModel>,
}

impl SimWorld {
    /// Creates an empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a top-level model with the provided links.
    pub fn insert_model<I, L>(&mut self, name: &str, links: I)
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        let model = SimModel {
            scoped_name: name.to_owned(),
            links: links.into_iter().map(Into::into).collect(),
        };
        if self.models.insert(name.to_owned(), model).is_some() {
            tracing::debug!(model = name, "replaced existing model");
        }
    }

    /// Removes a model, returning it when it existed.
    pub fn remove_model(&mut self, name: &str) -> Option<SimModel> {
        self.models.remove(name)
    }

    /// Removes a link from a model, returning `true` when it existed.
    pub fn remove_link(&mut self, model: &str, link: &str) -> bool {
        self.models
            .get_mut(model)
            .is_some_and(|model| model.links.remove(link))
    }
}

impl WorldQuery for SimWorld {
    fn model_scoped_name(&self, model: &str) -> Option<String> {
        self.models
            .get(model)
            .map(|model| model.scoped_name.clone())
    }

    fn model_has_link(&self, model: &str, link: &str) -> bool {
        self.models
            .get(model)
            .is_some_and(|model| model.links.contains(link))
    }
}

/// Render-side visual that tracks its material history.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SimVisual {
    material: Option<String>,
    material_changes: u32,
}

impl SimVisual {
    /// Creates a visual rendered with the provided initial material.
    #[must_use]
    pub fn with_material(material: impl Into<String>) -> Self {
        Self {
            material: Some(material.into()),
            material_changes: 0,
        }
    }

    /// Number of times the material has been replaced since creation.
    #[must_use]
    pub const fn material_changes(&self) -> u32 {
        self.material_changes
    }
}

impl Visual for SimVisual {
    fn set_material(&mut self, material: &str) {
        self.material = Some(material.to_owned());
        self.material_changes = self.material_changes.saturating_add(1);
    }

    fn material(&self) -> Option<&str> {
        self.material.as_deref()
    }
}

/// Render-side scene graph keyed by fully scoped visual names.
#[derive(Clone, Debug, Default)]
pub struct SimScene {
    visuals: BTreeMap<String, SimVisual>,
}

impl SimScene {
    /// Creates an empty scene.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a visual under the provided scoped name.
    pub fn insert_visual(&mut self, name: impl Into<String>, visual: SimVisual) {
        let name = name.into();
        if self.visuals.insert(name.clone(), visual).is_some() {
            tracing::debug!(visual = %name, "replaced existing visual");
        }
    }

    /// Removes a visual, returning it when it existed.
    pub fn remove_visual(&mut self, name: &str) -> Option<SimVisual> {
        self.visuals.remove(name)
    }
}

impl SceneGraph for SimScene {
    type Visual = SimVisual;

    fn visual_mut(&mut self, name: &str) -> Option<&mut SimVisual> {
        self.visuals.get_mut(name)
    }
}

/// Holds the scene and releases it only once the host reports it ready.
#[derive(Debug)]
pub struct SceneSlot {
    scene: SimScene,
    readiness: Readiness,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Readiness {
    Ready,
    Pending,
    AfterPolls(u32),
}

impl SceneSlot {
    /// Wraps a scene that is available immediately.
    #[must_use]
    pub fn ready(scene: SimScene) -> Self {
        Self {
            scene,
            readiness: Readiness::Ready,
        }
    }

    /// Wraps a scene that stays unavailable until [`SceneSlot::mark_ready`].
    #[must_use]
    pub fn pending(scene: SimScene) -> Self {
        Self {
            scene,
            readiness: Readiness::Pending,
        }
    }

    /// Wraps a scene that refuses the first `polls` requests before becoming ready.
    #[must_use]
    pub fn ready_after_polls(scene: SimScene, polls: u32) -> Self {
        let readiness = if polls == 0 {
            Readiness::Ready
        } else {
            Readiness::AfterPolls(polls)
        };
        Self { scene, readiness }
    }

    /// Makes the scene available to subsequent requests.
    pub fn mark_ready(&mut self) {
        self.readiness = Readiness::Ready;
    }

    /// Reports whether the next request will be served.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.readiness == Readiness::Ready
    }

    /// Read-only access to the wrapped scene regardless of readiness.
    #[must_use]
    pub fn inspect(&self) -> &SimScene {
        &self.scene
    }
}

impl SceneSource for SceneSlot {
    type Scene = SimScene;

    fn scene(&mut self) -> Option<&mut SimScene> {
        match self.readiness {
            Readiness::Ready => Some(&mut self.scene),
            Readiness::Pending => None,
            Readiness::AfterPolls(remaining) => {
                self.readiness = if remaining <= 1 {
                    Readiness::Ready
                } else {
                    Readiness::AfterPolls(remaining - 1)
                };
                None
            }
        }
    }
}

/// Material shown on marker visuals before any marker is assigned.
pub const PLACEHOLDER_MATERIAL: &str = "material/blank";

/// Builds a world and scene containing `slot_count` marker-bearing models.
///
/// Every slot receives a model, its marker link, and a visual rendered with
/// [`PLACEHOLDER_MATERIAL`].
#[must_use]
pub fn marker_arena(naming: &SlotNaming, slot_count: u8) -> (SimWorld, SimScene) {
    let mut world = SimWorld::new();
    let mut scene = SimScene::new();

    for slot in TargetSlot::all(slot_count) {
        let model = slot.model_name(naming);
        let link = slot.link_name(naming);
        scene.insert_visual(
            scoped_visual_name(&model, &link),
            SimVisual::with_material(PLACEHOLDER_MATERIAL),
        );
        world.insert_model(&model, [link]);
    }

    (world, scene)
}

/// Query functions that provide read-only access to host state.
pub mod query {
    use fiducial_sim_core::Visual;

    use super::{SimScene, SimVisual, SimWorld};

    /// Names of all models in ascending order.
    #[must_use]
    pub fn model_names(world: &SimWorld) -> Vec<&str> {
        world.models.keys().map(String::as_str).collect()
    }

    /// Material currently assigned to the named visual.
    #[must_use]
    pub fn material<'scene>(scene: &'scene SimScene, visual: &str) -> Option<&'scene str> {
        scene.visuals.get(visual).and_then(|visual| visual.material())
    }

    /// Read-only access to the named visual.
    #[must_use]
    pub fn visual<'scene>(scene: &'scene SimScene, visual: &str) -> Option<&'scene SimVisual> {
        scene.visuals.get(visual)
    }

    /// Total number of material replacements performed across the scene.
    #[must_use]
    pub fn total_material_changes(scene: &SimScene) -> u32 {
        scene
            .visuals
            .values()
            .map(SimVisual::material_changes)
            .sum()
    }
}
