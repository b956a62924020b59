//! Worker protocol: requests, results and the values they carry.
//!
//! Field names follow the worker's wire format (camelCase) so results can be
//! deserialized straight from its JSON replies.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parameter values keyed by name, in declaration order.
pub type ParamValues = IndexMap<String, Value>;

/// Logical module name -> resolved project path, for the worker's resolver.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    pub name: String,
    pub path: String,
}

/// What to evaluate. Constructed per call, never retained.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub base: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<ParamValues>,
}

impl ExecutionRequest {
    /// Evaluate inline source; `url` names it for module resolution.
    pub fn script(script: impl Into<String>, url: impl Into<String>, base: impl Into<String>) -> Self {
        Self {
            script: Some(script.into()),
            url: Some(url.into()),
            base: base.into(),
            ..Default::default()
        }
    }

    /// Evaluate a project file the worker fetches itself.
    pub fn url(url: impl Into<String>, base: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            base: base.into(),
            ..Default::default()
        }
    }

    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = Some(root.into());
        self
    }
}

/// Axis-aligned bounding box in model space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Aabb {
    pub fn union(self, other: Aabb) -> Aabb {
        let mut out = self;
        for i in 0..3 {
            out.min[i] = out.min[i].min(other.min[i]);
            out.max[i] = out.max[i].max(other.max[i]);
        }
        out
    }
}

/// Renderable output of a script, already converted by the worker.
/// The payload is opaque to orchestration; only bounds are inspected.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Aabb>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

/// A script may return one entity or many.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Entities {
    Many(Vec<Entity>),
    One(Entity),
}

impl Default for Entities {
    fn default() -> Self {
        Entities::Many(Vec::new())
    }
}

impl Entities {
    /// Normalize to a homogeneous sequence.
    pub fn into_vec(self) -> Vec<Entity> {
        match self {
            Entities::Many(list) => list,
            Entities::One(entity) => vec![entity],
        }
    }
}

/// How an animated slider behaves when it runs past `max`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    /// Stop at the end
    #[default]
    Once,
    /// Jump back to `min`
    Restart,
    /// Bounce between `min` and `max`
    Reverse,
}

/// One control in the parameter panel, as declared by the script.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    /// Frame rate of the attached animation, sliders only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    #[serde(default)]
    pub autostart: bool,
    #[serde(default, rename = "loop")]
    pub loop_mode: LoopMode,
}

impl ParameterDefinition {
    pub fn is_slider(&self) -> bool {
        self.kind == "slider"
    }

    pub fn is_animated(&self) -> bool {
        self.is_slider() && self.fps.is_some_and(|fps| fps > 0.0)
    }

    /// Slider with an animation that should start as soon as it is shown.
    pub fn auto_animates(&self) -> bool {
        self.is_animated() && self.autostart
    }
}

/// Reply to `runScript` / `runWithParams`. Consumed exactly once.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    #[serde(default)]
    pub entities: Entities,
    #[serde(default)]
    pub def: Vec<ParameterDefinition>,
    #[serde(default)]
    pub params: ParamValues,
    #[serde(default)]
    pub main_time: Option<f64>,
    #[serde(default)]
    pub convert_time: Option<f64>,
}

/// Calls understood by the worker.
#[derive(Clone, Debug, PartialEq)]
pub enum WorkerRequest {
    /// Configure module resolution
    Init {
        bundles: IndexMap<String, String>,
        alias: Vec<Alias>,
    },
    /// Evaluate a script or project file
    RunScript(ExecutionRequest),
    /// Re-evaluate the last loaded script with new parameter values
    RunWithParams { params: ParamValues },
    /// Invalidate cached dependency entries
    ClearFileCache { files: Vec<String>, root: String },
    /// Invalidate all per-project temporary state
    ClearTempCache,
}

impl WorkerRequest {
    pub fn method(&self) -> &'static str {
        match self {
            WorkerRequest::Init { .. } => "init",
            WorkerRequest::RunScript(_) => "runScript",
            WorkerRequest::RunWithParams { .. } => "runWithParams",
            WorkerRequest::ClearFileCache { .. } => "clearFileCache",
            WorkerRequest::ClearTempCache => "clearTempCache",
        }
    }
}

/// Successful worker reply.
#[derive(Clone, Debug, PartialEq)]
pub enum WorkerReply {
    Done,
    Executed(ExecutionResult),
}
