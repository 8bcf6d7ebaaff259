use serde::Serialize;

/// A validated image-generation request with every default applied.
///
/// Built only by [`crate::schema::RequestSchema::validate`], so every
/// field is known to be within the schema's bounds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub seed: u64,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    /// Classifier-free guidance scale.
    pub cfg: f64,
    pub denoise: f64,
}
