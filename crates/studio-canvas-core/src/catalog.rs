//! Built-in node catalog.
//!
//! The catalog is data: port schemas, default parameters and accent colors
//! for every node type the studio knows about. It is built once and never
//! mutated.

use crate::graph::{ParamValue, Params};
use peniko::Color;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Port type tag for raster images.
pub const PORT_IMAGE: &str = "image";
/// Port type tag for text prompts.
pub const PORT_STRING: &str = "string";
/// Port type tag for 3D meshes.
pub const PORT_MESH: &str = "mesh";

/// Accent color for node types the catalog does not know.
pub const FALLBACK_NODE_COLOR: Color = Color::from_rgba8(128, 128, 128, 255);

/// A typed connection point declared by a node definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub port_type: String,
}

impl Port {
    fn new(id: &str, name: &str, port_type: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            port_type: port_type.to_string(),
        }
    }
}

/// Immutable description of a node type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    #[serde(rename = "type")]
    pub node_type: String,
    pub name: String,
    pub category: String,
    /// Input ports in display order (top to bottom).
    pub inputs: Vec<Port>,
    /// Output ports in display order (top to bottom).
    pub outputs: Vec<Port>,
    pub default_params: Params,
    #[serde(skip)]
    color: [u8; 4],
}

impl NodeDefinition {
    /// Ports on one side of the node.
    pub fn ports(&self, is_output: bool) -> &[Port] {
        if is_output { &self.outputs } else { &self.inputs }
    }

    /// Look up a port by id on one side.
    pub fn port(&self, port_id: &str, is_output: bool) -> Option<&Port> {
        self.ports(is_output).iter().find(|p| p.id == port_id)
    }

    pub fn color(&self) -> Color {
        let [r, g, b, a] = self.color;
        Color::from_rgba8(r, g, b, a)
    }
}

fn params<const N: usize>(entries: [(&str, ParamValue); N]) -> Params {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn builtin_definitions() -> Vec<NodeDefinition> {
    vec![
        NodeDefinition {
            node_type: "image_input".into(),
            name: "Image Input".into(),
            category: "input".into(),
            inputs: vec![],
            outputs: vec![Port::new("image", "Image", PORT_IMAGE)],
            default_params: params([("asset_id", "".into())]),
            color: [74, 144, 226, 255],
        },
        NodeDefinition {
            node_type: "prompt".into(),
            name: "Prompt".into(),
            category: "input".into(),
            inputs: vec![],
            outputs: vec![Port::new("prompt", "Prompt", PORT_STRING)],
            default_params: params([("text", "".into())]),
            color: [245, 166, 35, 255],
        },
        NodeDefinition {
            node_type: "img2img".into(),
            name: "Image to Image".into(),
            category: "generation".into(),
            inputs: vec![
                Port::new("image", "Image", PORT_IMAGE),
                Port::new("prompt", "Prompt", PORT_STRING),
            ],
            outputs: vec![Port::new("image", "Image", PORT_IMAGE)],
            default_params: params([
                ("positive_prompt", "".into()),
                ("negative_prompt", "".into()),
                ("seed", 42i64.into()),
                ("steps", 20i64.into()),
                ("cfg", 7.5f64.into()),
                ("sampler_name", "euler".into()),
                ("scheduler", "normal".into()),
                ("denoise", 0.75f64.into()),
                ("width", 512i64.into()),
                ("height", 512i64.into()),
            ]),
            color: [155, 89, 182, 255],
        },
        NodeDefinition {
            node_type: "triposr".into(),
            name: "Image to 3D".into(),
            category: "generation".into(),
            inputs: vec![Port::new("image", "Image", PORT_IMAGE)],
            outputs: vec![Port::new("mesh", "Mesh", PORT_MESH)],
            default_params: params([
                ("foreground_ratio", 0.85f64.into()),
                ("mc_resolution", 256i64.into()),
                ("remove_bg", true.into()),
                ("chunk_size", 8192i64.into()),
                ("bake_texture", false.into()),
                ("texture_resolution", 2048i64.into()),
            ]),
            color: [26, 188, 156, 255],
        },
        NodeDefinition {
            node_type: "image_output".into(),
            name: "Image Output".into(),
            category: "output".into(),
            inputs: vec![Port::new("image", "Image", PORT_IMAGE)],
            outputs: vec![Port::new("image", "Image", PORT_IMAGE)],
            default_params: Params::new(),
            color: [46, 204, 113, 255],
        },
        NodeDefinition {
            node_type: "mesh_output".into(),
            name: "Mesh Output".into(),
            category: "output".into(),
            inputs: vec![Port::new("mesh", "Mesh", PORT_MESH)],
            outputs: vec![],
            default_params: Params::new(),
            color: [52, 73, 94, 255],
        },
    ]
}

static CATALOG: LazyLock<Vec<NodeDefinition>> = LazyLock::new(builtin_definitions);

/// Look up the definition for a node type.
pub fn get_node_definition(node_type: &str) -> Option<&'static NodeDefinition> {
    CATALOG.iter().find(|def| def.node_type == node_type)
}

/// Accent color for a node type, falling back to neutral grey.
pub fn get_node_color(node_type: &str) -> Color {
    get_node_definition(node_type)
        .map(NodeDefinition::color)
        .unwrap_or(FALLBACK_NODE_COLOR)
}

/// Accent color as normalized RGBA, ready for a GPU uniform.
pub fn node_color_rgba(node_type: &str) -> [f32; 4] {
    get_node_color(node_type).components
}

/// All definitions in catalog order.
pub fn all_definitions() -> &'static [NodeDefinition] {
    &CATALOG
}

/// Definitions belonging to one category, in catalog order.
pub fn definitions_in_category(category: &str) -> impl Iterator<Item = &'static NodeDefinition> {
    CATALOG.iter().filter(move |def| def.category == category)
}
