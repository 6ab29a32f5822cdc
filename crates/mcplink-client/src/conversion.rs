//! Conversion from MCP protocol types to capability descriptors

use mcplink_core::{AdvertisedCapabilities, PromptArgumentInfo, PromptInfo, ResourceInfo, ToolInfo};
use rmcp::model::{Prompt, Resource, ServerCapabilities, Tool};

pub trait ToDescriptor {
    type Descriptor;

    fn to_descriptor(&self) -> Self::Descriptor;
}

impl ToDescriptor for Tool {
    type Descriptor = ToolInfo;

    fn to_descriptor(&self) -> ToolInfo {
        ToolInfo {
            name: self.name.to_string(),
            description: self.description.as_ref().map(|d| d.to_string()),
            input_schema: serde_json::Value::Object(self.input_schema.as_ref().clone()),
        }
    }
}

/// Resource needs special handling (nested .raw structure)
impl ToDescriptor for Resource {
    type Descriptor = ResourceInfo;

    fn to_descriptor(&self) -> ResourceInfo {
        ResourceInfo {
            uri: self.raw.uri.clone(),
            name: self.raw.name.clone(),
            description: self.raw.description.clone(),
            mime_type: self.raw.mime_type.clone(),
        }
    }
}

impl ToDescriptor for Prompt {
    type Descriptor = PromptInfo;

    fn to_descriptor(&self) -> PromptInfo {
        PromptInfo {
            name: self.name.to_string(),
            description: self.description.as_ref().map(|d| d.to_string()),
            arguments: self
                .arguments
                .iter()
                .flatten()
                .map(|arg| PromptArgumentInfo {
                    name: arg.name.clone(),
                    description: arg.description.clone(),
                    required: arg.required.unwrap_or(false),
                })
                .collect(),
        }
    }
}

pub fn to_descriptors<T: ToDescriptor>(items: &[T]) -> Vec<T::Descriptor> {
    items.iter().map(ToDescriptor::to_descriptor).collect()
}

pub fn advertised_capabilities(capabilities: &ServerCapabilities) -> AdvertisedCapabilities {
    AdvertisedCapabilities {
        tools: capabilities.tools.is_some(),
        resources: capabilities.resources.is_some(),
        prompts: capabilities.prompts.is_some(),
    }
}
