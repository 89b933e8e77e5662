#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Fiducial Sim utilities.
//!
//! This crate defines the vocabulary that connects the host simulation, the
//! marker randomizer, and the line-coefficient service. Hosts implement the
//! query traits ([`WorldQuery`], [`SceneGraph`], [`SceneSource`]) and drive
//! [`PreRenderHook`] subscribers once per frame. Services implement
//! [`Service`] and report unrecoverable input through [`ServiceError::Fatal`],
//! leaving the actual shutdown to whichever node hosts them.

use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Number of marker identities available for selection.
pub const MARKER_POOL_SIZE: u8 = 16;

/// Number of statically named target slots that receive a marker.
pub const TARGET_SLOT_COUNT: u8 = 8;

/// Name of the endpoint that serves straight-line coefficients.
pub const LINE_COEFFICIENTS_ENDPOINT: &str = "/straight_line_coefficients";

/// Prefix of the model names that carry a marker, followed by the slot index.
pub const DEFAULT_MODEL_PREFIX: &str = "poly_";

/// Prefix of the link names that carry a marker, followed by the slot index.
pub const DEFAULT_LINK_PREFIX: &str = "tag";

/// Prefix of the material scripts for each marker, followed by the marker id.
pub const DEFAULT_MATERIAL_PREFIX: &str = "material/artag";

/// Separator used by hosts when composing scoped entity names.
pub const SCOPE_SEPARATOR: &str = "::";

/// Name of the visual attached to every marker link.
pub const VISUAL_SUFFIX: &str = "visual";

/// Identity of a single fiducial marker texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarkerId(u8);

impl MarkerId {
    /// Creates a marker identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the marker.
    #[must_use]
    pub const fn get(&self) -> u8 {
        self.0
    }

    /// Composes the material script name that renders this marker.
    #[must_use]
    pub fn material_name(&self, naming: &SlotNaming) -> String {
        format!("{}{}", naming.material_prefix, self.0)
    }
}

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Naming scheme that maps target slots and markers onto host entity names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotNaming {
    /// Prefix of the model owning a slot; the one-based slot index is appended.
    pub model_prefix: String,
    /// Prefix of the link carrying the marker; the one-based slot index is appended.
    pub link_prefix: String,
    /// Prefix of the marker material scripts; the marker id is appended.
    pub material_prefix: String,
}

impl Default for SlotNaming {
    fn default() -> Self {
        Self {
            model_prefix: DEFAULT_MODEL_PREFIX.to_owned(),
            link_prefix: DEFAULT_LINK_PREFIX.to_owned(),
            material_prefix: DEFAULT_MATERIAL_PREFIX.to_owned(),
        }
    }
}

/// One of the statically named entities that receives a marker.
///
/// Slots are indexed from one, matching the host's entity names. Slot `i`
/// receives the marker selected at position `i - 1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetSlot(u8);

impl TargetSlot {
    /// Creates a slot from its one-based index, rejecting zero.
    #[must_use]
    pub const fn new(index: u8) -> Option<Self> {
        if index == 0 {
            None
        } else {
            Some(Self(index))
        }
    }

    /// Enumerates slots `1..=count` in ascending order.
    pub fn all(count: u8) -> impl Iterator<Item = TargetSlot> {
        (1..=count).map(Self)
    }

    /// One-based index of the slot.
    #[must_use]
    pub const fn index(&self) -> u8 {
        self.0
    }

    /// Zero-based position of the marker assigned to this slot.
    #[must_use]
    pub const fn position(&self) -> usize {
        (self.0 - 1) as usize
    }

    /// Name of the model that owns the slot.
    #[must_use]
    pub fn model_name(&self, naming: &SlotNaming) -> String {
        format!("{}{}", naming.model_prefix, self.0)
    }

    /// Name of the link that carries the marker.
    #[must_use]
    pub fn link_name(&self, naming: &SlotNaming) -> String {
        format!("{}{}", naming.link_prefix, self.0)
    }

    /// Fully scoped name of the visual given the model's scoped name.
    #[must_use]
    pub fn visual_name(&self, scoped_model: &str, naming: &SlotNaming) -> String {
        scoped_visual_name(scoped_model, &self.link_name(naming))
    }
}

impl fmt::Display for TargetSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {}", self.0)
    }
}

/// Joins a model scope and link name into the host's `model::link::visual` form.
#[must_use]
pub fn scoped_visual_name(scoped_model: &str, link: &str) -> String {
    format!("{scoped_model}{SCOPE_SEPARATOR}{link}{SCOPE_SEPARATOR}{VISUAL_SUFFIX}")
}

/// Read-only lookup of simulated models and their links.
pub trait WorldQuery {
    /// Resolves a model by name, returning its fully scoped name when present.
    fn model_scoped_name(&self, model: &str) -> Option<String>;

    /// Reports whether the named model owns a link with the provided name.
    fn model_has_link(&self, model: &str, link: &str) -> bool;
}

impl<T: WorldQuery + ?Sized> WorldQuery for &T {
    fn model_scoped_name(&self, model: &str) -> Option<String> {
        (**self).model_scoped_name(model)
    }

    fn model_has_link(&self, model: &str, link: &str) -> bool {
        (**self).model_has_link(model, link)
    }
}

/// Renderable representation of a link.
pub trait Visual {
    /// Replaces the material script used to render the visual.
    fn set_material(&mut self, material: &str);

    /// Material script currently assigned, if any.
    fn material(&self) -> Option<&str>;
}

/// Render-side scene graph exposing visuals by scoped name.
pub trait SceneGraph {
    /// Concrete visual type stored by the scene.
    type Visual: Visual;

    /// Resolves a visual by its fully scoped name.
    fn visual_mut(&mut self, name: &str) -> Option<&mut Self::Visual>;
}

/// Provides the render scene once the host has finished loading it.
pub trait SceneSource {
    /// Scene graph type handed out once ready.
    type Scene: SceneGraph;

    /// Returns the scene, or `None` while the host is still preparing it.
    fn scene(&mut self) -> Option<&mut Self::Scene>;
}

impl<T: SceneSource + ?Sized> SceneSource for &mut T {
    type Scene = T::Scene;

    fn scene(&mut self) -> Option<&mut Self::Scene> {
        (**self).scene()
    }
}

/// Tells the host whether a pre-render subscription should stay connected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookControl {
    /// Invoke the hook again before the next frame.
    Keep,
    /// Drop the subscription; the hook will not be invoked again.
    Disconnect,
}

/// Callback invoked by the host immediately before each frame is rendered.
pub trait PreRenderHook {
    /// Runs the hook for the upcoming frame.
    fn on_pre_render(&mut self) -> HookControl;
}

impl<T: PreRenderHook + ?Sized> PreRenderHook for &mut T {
    fn on_pre_render(&mut self) -> HookControl {
        (**self).on_pre_render()
    }
}

impl<T: PreRenderHook + ?Sized> PreRenderHook for Box<T> {
    fn on_pre_render(&mut self) -> HookControl {
        (**self).on_pre_render()
    }
}

/// Request accepted by the line-coefficient endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoeffsRequest {
    /// Caller acknowledgement; must be `true` for the request to be served.
    pub ready: bool,
}

/// Response produced by the line-coefficient endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoeffsResponse {
    /// Slope followed by intercept.
    pub coeffs: [f32; 2],
}

impl CoeffsResponse {
    /// Slope of the generated line.
    #[must_use]
    pub const fn slope(&self) -> f32 {
        self.coeffs[0]
    }

    /// Intercept of the generated line.
    #[must_use]
    pub const fn intercept(&self) -> f32 {
        self.coeffs[1]
    }
}

/// Slope and intercept describing a straight line `y = slope * x + intercept`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Coefficients {
    /// Slope of the line.
    pub slope: f32,
    /// Intercept of the line.
    pub intercept: f32,
}

impl From<Coefficients> for CoeffsResponse {
    fn from(coefficients: Coefficients) -> Self {
        Self {
            coeffs: [coefficients.slope, coefficients.intercept],
        }
    }
}

/// Failures reported by a [`Service`] to the node hosting it.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// The request is unrecoverable; the hosting node must shut down.
    #[error("fatal service failure: {reason}")]
    Fatal {
        /// Human readable description of the failure.
        reason: String,
    },
}

impl ServiceError {
    /// Returns `true` when the hosting node is expected to shut down.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }
}

/// Request/response handler that can be advertised on a named endpoint.
pub trait Service {
    /// Decoded request payload.
    type Request: DeserializeOwned;
    /// Response payload returned to the caller.
    type Response: Serialize;

    /// Handles a single request.
    fn call(&mut self, request: Self::Request) -> Result<Self::Response, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_names_follow_host_convention() {
        let naming = SlotNaming::default();
        let slot = TargetSlot::new(3).expect("non-zero index");

        assert_eq!(slot.model_name(&naming), "poly_3");
        assert_eq!(slot.link_name(&naming), "tag3");
        assert_eq!(slot.visual_name("poly_3", &naming), "poly_3::tag3::visual");
        assert_eq!(slot.position(), 2);
    }

    #[test]
    fn slot_zero_is_rejected() {
        assert!(TargetSlot::new(0).is_none());
    }

    #[test]
    fn all_slots_enumerate_in_order() {
        let indices: Vec<u8> = TargetSlot::all(TARGET_SLOT_COUNT)
            .map(|slot| slot.index())
            .collect();

        assert_eq!(indices, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn marker_material_uses_prefix() {
        let naming = SlotNaming::default();

        assert_eq!(MarkerId::new(11).material_name(&naming), "material/artag11");
    }

    #[test]
    fn coeffs_response_serializes_as_ordered_pair() {
        let response = CoeffsResponse::from(Coefficients {
            slope: 2.5,
            intercept: 0.25,
        });
        let json = serde_json::to_string(&response).expect("serialize response");

        assert_eq!(json, r#"{"coeffs":[2.5,0.25]}"#);
        assert_eq!(response.slope(), 2.5);
        assert_eq!(response.intercept(), 0.25);
    }

    #[test]
    fn coeffs_request_round_trips_ready_flag() {
        let request: CoeffsRequest =
            serde_json::from_str(r#"{"ready":true}"#).expect("decode request");

        assert!(request.ready);
    }

    #[test]
    fn fatal_error_reports_fatal() {
        let error = ServiceError::Fatal {
            reason: "ready is false".to_owned(),
        };

        assert!(error.is_fatal());
        assert_eq!(error.to_string(), "fatal service failure: ready is false");
    }
}
