//! ParameterBindingResolver - StaticBinding を RuntimeBinding に解決する
//!
//! # 解決ルール
//! - override 文字列（空でない）はテンプレートより優先
//! - item セグメントを持たないテンプレートは container-level match:
//!   trigger を発火させたリソース自身の名前をそのまま使う
//! - それ以外はテンプレートのプレースホルダを trigger inputs で置換
//! - 名前は正規化してから検証（I/O の前に失敗させる）

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::BindingError;
use super::path::{BlobPath, normalize, validate_container_name};
use super::template::BindingTemplate;

/// Whether the bound resource is read or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Input,
    Output,
}

/// Declarative, input-independent binding rule (`container/{name}.txt`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticBinding {
    container: BindingTemplate,
    item: Option<BindingTemplate>,
    direction: Direction,
    parameter_names: Vec<String>,
}

impl StaticBinding {
    /// Parse `pattern` as `container[/item]`.
    ///
    /// A pattern without an item part (`images` or `images/`) is a
    /// container-level binding. A literal container name is validated here,
    /// at registration time.
    pub fn parse(pattern: &str, direction: Direction) -> Result<Self, BindingError> {
        let normalized = normalize(pattern);
        let (container, item) = match normalized.split_once('/') {
            Some((container, item)) if !item.is_empty() => (container, Some(item)),
            Some((container, _)) => (container, None),
            None => (normalized.as_str(), None),
        };

        let container = BindingTemplate::parse(container)?;
        if !container.has_parameters() {
            validate_container_name(container.pattern())?;
        }
        let item = item.map(BindingTemplate::parse).transpose()?;

        let mut parameter_names: Vec<String> = Vec::new();
        for name in container
            .parameter_names()
            .into_iter()
            .chain(item.iter().flat_map(|t| t.parameter_names()))
        {
            if !parameter_names.iter().any(|n| n == name) {
                parameter_names.push(name.to_string());
            }
        }

        Ok(Self {
            container,
            item,
            direction,
            parameter_names,
        })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// True when the binding has no item segment.
    pub fn is_container_level(&self) -> bool {
        self.item.is_none()
    }

    pub fn parameter_names(&self) -> &[String] {
        &self.parameter_names
    }

    /// Extract route-derived names by matching `path` against this binding
    /// (used for the trigger parameter itself). `None` when it does not match.
    pub fn capture(&self, path: &BlobPath) -> Option<HashMap<String, String>> {
        let mut names = self.container.capture(&path.container)?;
        if let Some(item) = &self.item {
            for (name, value) in item.capture(&path.blob)? {
                match names.get(&name) {
                    Some(existing) if *existing != value => return None,
                    _ => {
                        names.insert(name, value);
                    }
                }
            }
        }
        Some(names)
    }
}

/// Data available from one trigger event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerInputs {
    /// The resource whose change fired the trigger.
    pub resource: Option<BlobPath>,
    /// Names captured from the trigger route plus event data.
    pub values: HashMap<String, String>,
}

impl TriggerInputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inputs for a trigger fired by `resource`, with names captured by
    /// matching it against the trigger's own binding.
    pub fn from_trigger(trigger: &StaticBinding, resource: BlobPath) -> Self {
        let values = trigger.capture(&resource).unwrap_or_default();
        Self {
            resource: Some(resource),
            values,
        }
    }

    pub fn with_resource(mut self, resource: BlobPath) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

/// Fully resolved resource reference for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeBinding {
    pub path: BlobPath,
    pub direction: Direction,
}

impl RuntimeBinding {
    pub fn container(&self) -> &str {
        &self.path.container
    }

    pub fn blob(&self) -> &str {
        &self.path.blob
    }
}

/// Resolves one parameter's `StaticBinding` per invocation.
#[derive(Debug, Clone)]
pub struct ParameterBindingResolver {
    binding: StaticBinding,
}

impl ParameterBindingResolver {
    pub fn new(binding: StaticBinding) -> Self {
        Self { binding }
    }

    pub fn static_binding(&self) -> &StaticBinding {
        &self.binding
    }

    /// Names the trigger must provide, independent of any trigger instance.
    pub fn parameter_names(&self) -> &[String] {
        self.binding.parameter_names()
    }

    pub fn resolve(&self, inputs: &TriggerInputs) -> Result<RuntimeBinding, BindingError> {
        let container = self.binding.container.bind(&inputs.values)?;
        let blob = match &self.binding.item {
            Some(item) => item.bind(&inputs.values)?,
            None => inputs
                .resource
                .as_ref()
                .map(|resource| resource.blob.clone())
                .ok_or_else(|| {
                    BindingError::MissingTriggerResource(self.binding.container.pattern().to_string())
                })?,
        };

        Ok(RuntimeBinding {
            path: BlobPath::new(&container, &blob)?,
            direction: self.binding.direction,
        })
    }

    /// A non-empty `override_path` replaces the template entirely and is taken
    /// literally; an empty one falls back to `resolve`.
    pub fn resolve_from_override(
        &self,
        override_path: &str,
        inputs: &TriggerInputs,
    ) -> Result<RuntimeBinding, BindingError> {
        if override_path.trim().is_empty() {
            return self.resolve(inputs);
        }
        Ok(RuntimeBinding {
            path: BlobPath::parse(override_path)?,
            direction: self.binding.direction,
        })
    }
}
