//! Workflow templates and per-request materialization.
//!
//! A ComfyUI API-format workflow is a JSON object keyed by node id, each
//! node carrying an `inputs` object. The materializer does not understand
//! the graph; it only knows a set of slot addresses (`node id` + `input
//! name`) and writes request fields into them.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::CoreError;
use crate::request::GenerationRequest;

/// Template shipped with the service.
pub const BUNDLED_TEMPLATE: &str = include_str!("../workflows/flux-dev-simple.json");
/// Name reported for [`BUNDLED_TEMPLATE`].
pub const BUNDLED_TEMPLATE_NAME: &str = "flux-dev-simple";

/// Location of one input inside the workflow graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotAddress {
    pub node: String,
    pub input: String,
}

impl SlotAddress {
    pub fn new(node: &str, input: &str) -> Self {
        Self {
            node: node.to_string(),
            input: input.to_string(),
        }
    }
}

/// Slot addresses for every request-derived field.
///
/// `checkpoint` and `filename_prefix` are optional: templates without a
/// checkpoint loader or save node simply skip those substitutions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowSlots {
    pub prompt: SlotAddress,
    pub seed: SlotAddress,
    pub steps: SlotAddress,
    pub cfg: SlotAddress,
    pub denoise: SlotAddress,
    pub width: SlotAddress,
    pub height: SlotAddress,
    #[serde(default)]
    pub checkpoint: Option<SlotAddress>,
    #[serde(default)]
    pub filename_prefix: Option<SlotAddress>,
}

impl Default for WorkflowSlots {
    /// Slots of the bundled `flux-dev-simple` template.
    fn default() -> Self {
        Self {
            prompt: SlotAddress::new("6", "text"),
            seed: SlotAddress::new("31", "seed"),
            steps: SlotAddress::new("31", "steps"),
            cfg: SlotAddress::new("31", "cfg"),
            denoise: SlotAddress::new("31", "denoise"),
            width: SlotAddress::new("5", "width"),
            height: SlotAddress::new("5", "height"),
            checkpoint: Some(SlotAddress::new("4", "ckpt_name")),
            filename_prefix: Some(SlotAddress::new("9", "filename_prefix")),
        }
    }
}

impl WorkflowSlots {
    pub fn from_json_str(text: &str) -> Result<Self, CoreError> {
        serde_json::from_str(text)
            .map_err(|e| CoreError::Workflow(format!("invalid slot map: {e}")))
    }

    fn all(&self) -> impl Iterator<Item = &SlotAddress> {
        [
            Some(&self.prompt),
            Some(&self.seed),
            Some(&self.steps),
            Some(&self.cfg),
            Some(&self.denoise),
            Some(&self.width),
            Some(&self.height),
            self.checkpoint.as_ref(),
            self.filename_prefix.as_ref(),
        ]
        .into_iter()
        .flatten()
    }
}

/// A template after substitution, ready to hand to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedWorkflow {
    pub graph: Value,
    /// Filename prefix written into the save node, if the template has one.
    pub output_prefix: Option<String>,
}

/// A parsed workflow template with its slot map. Loaded once at startup.
#[derive(Debug, Clone)]
pub struct WorkflowTemplate {
    name: String,
    graph: Map<String, Value>,
    slots: WorkflowSlots,
}

impl WorkflowTemplate {
    /// The bundled template with its default slots.
    pub fn bundled() -> Result<Self, CoreError> {
        Self::from_json_str(BUNDLED_TEMPLATE_NAME, BUNDLED_TEMPLATE, WorkflowSlots::default())
    }

    /// Parse a template and check that every slot points at an existing
    /// node with an `inputs` object.
    pub fn from_json_str(name: &str, text: &str, slots: WorkflowSlots) -> Result<Self, CoreError> {
        let graph = match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                return Err(CoreError::Workflow(format!(
                    "template '{name}' is not a JSON object"
                )))
            }
            Err(e) => {
                return Err(CoreError::Workflow(format!(
                    "template '{name}' is not valid JSON: {e}"
                )))
            }
        };

        for slot in slots.all() {
            let has_inputs = graph
                .get(&slot.node)
                .and_then(|node| node.get("inputs"))
                .is_some_and(Value::is_object);
            if !has_inputs {
                return Err(CoreError::Workflow(format!(
                    "template '{name}' has no node '{}' with inputs (slot '{}')",
                    slot.node, slot.input
                )));
            }
        }

        Ok(Self {
            name: name.to_string(),
            graph,
            slots,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slots(&self) -> &WorkflowSlots {
        &self.slots
    }

    /// Substitute request fields into a copy of the template.
    ///
    /// `checkpoint` replaces the checkpoint name when both it and the
    /// checkpoint slot are present. `output_prefix` is written into the
    /// save node so the produced file can be matched to this job.
    pub fn materialize(
        &self,
        request: &GenerationRequest,
        checkpoint: Option<&str>,
        output_prefix: &str,
    ) -> Result<MaterializedWorkflow, CoreError> {
        let mut graph = self.graph.clone();
        let slots = &self.slots;

        set_slot(&mut graph, &slots.seed, json!(request.seed))?;
        set_slot(&mut graph, &slots.steps, json!(request.steps))?;
        set_slot(&mut graph, &slots.denoise, json!(request.denoise))?;
        set_slot(&mut graph, &slots.cfg, json!(request.cfg))?;
        set_slot(&mut graph, &slots.prompt, json!(request.prompt))?;
        set_slot(&mut graph, &slots.width, json!(request.width))?;
        set_slot(&mut graph, &slots.height, json!(request.height))?;

        if let (Some(slot), Some(name)) = (&slots.checkpoint, checkpoint) {
            set_slot(&mut graph, slot, json!(name))?;
        }

        let output_prefix = match &slots.filename_prefix {
            Some(slot) => {
                set_slot(&mut graph, slot, json!(output_prefix))?;
                Some(output_prefix.to_string())
            }
            None => None,
        };

        Ok(MaterializedWorkflow {
            graph: Value::Object(graph),
            output_prefix,
        })
    }
}

/// Read a slot value from a materialized graph.
pub fn slot_value<'a>(graph: &'a Value, slot: &SlotAddress) -> Option<&'a Value> {
    graph.get(&slot.node)?.get("inputs")?.get(&slot.input)
}

fn set_slot(
    graph: &mut Map<String, Value>,
    slot: &SlotAddress,
    value: Value,
) -> Result<(), CoreError> {
    let inputs = graph
        .get_mut(&slot.node)
        .and_then(|node| node.get_mut("inputs"))
        .and_then(Value::as_object_mut)
        .ok_or_else(|| {
            CoreError::Workflow(format!(
                "node '{}' has no inputs for slot '{}'",
                slot.node, slot.input
            ))
        })?;
    inputs.insert(slot.input.clone(), value);
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
