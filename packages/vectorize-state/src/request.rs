//! Vectorization requests
//!
//! A [`VectorizationRequest`] is one unit of work against one piece of
//! content: an ordered list of configured steps plus the completed/remaining
//! bookkeeping that makes interrupted runs resumable. The request maintains
//! the invariant `completed ∩ remaining = ∅` and
//! `completed ∪ remaining = configured steps`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::content::ContentIdentifier;
use crate::error::{Result, StateError};

/// How a request is driven through its steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingType {
    /// Caller blocks while all remaining steps are attempted once, in order
    Synchronous,
    /// Step attempts are triggered independently by external events
    Asynchronous,
}

impl ProcessingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingType::Synchronous => "synchronous",
            ProcessingType::Asynchronous => "asynchronous",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "synchronous" => Ok(ProcessingType::Synchronous),
            "asynchronous" => Ok(ProcessingType::Asynchronous),
            _ => Err(StateError::config(format!(
                "Invalid processing type: {}",
                s
            ))),
        }
    }
}

/// Pipeline step identifier (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    Extract,
    Partition,
    Embed,
    Index,
}

impl StepName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::Extract => "extract",
            StepName::Partition => "partition",
            StepName::Embed => "embed",
            StepName::Index => "index",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "extract" => Ok(StepName::Extract),
            "partition" => Ok(StepName::Partition),
            "embed" => Ok(StepName::Embed),
            "index" => Ok(StepName::Index),
            _ => Err(StateError::config(format!("Unknown step name: {}", s))),
        }
    }
}

impl std::fmt::Display for StepName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One configured pipeline step: a name plus its string parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorizationStep {
    pub name: StepName,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

impl VectorizationStep {
    pub fn new(name: StepName) -> Self {
        Self {
            name,
            parameters: HashMap::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

fn required_parameter(parameters: &HashMap<String, String>, key: &str) -> Result<String> {
    parameters.get(key).cloned().ok_or_else(|| {
        StateError::config(format!("Missing required step parameter: {}", key))
    })
}

/// Typed configuration for the extraction step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractConfig {
    /// Overrides the identifier's content source profile when set
    pub content_source_profile_name: Option<String>,
}

impl ExtractConfig {
    pub fn from_parameters(parameters: &HashMap<String, String>) -> Self {
        Self {
            content_source_profile_name: parameters.get("content_source_profile_name").cloned(),
        }
    }
}

/// Typed configuration for the partitioning step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionConfig {
    pub text_partitioning_profile_name: String,
}

impl PartitionConfig {
    pub fn from_parameters(parameters: &HashMap<String, String>) -> Result<Self> {
        Ok(Self {
            text_partitioning_profile_name: required_parameter(
                parameters,
                "text_partitioning_profile_name",
            )?,
        })
    }
}

/// Typed configuration for the embedding step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedConfig {
    pub text_embedding_profile_name: String,
}

impl EmbedConfig {
    pub fn from_parameters(parameters: &HashMap<String, String>) -> Result<Self> {
        Ok(Self {
            text_embedding_profile_name: required_parameter(
                parameters,
                "text_embedding_profile_name",
            )?,
        })
    }
}

/// Typed configuration for the indexing step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    pub indexing_profile_name: String,
}

impl IndexConfig {
    pub fn from_parameters(parameters: &HashMap<String, String>) -> Result<Self> {
        Ok(Self {
            indexing_profile_name: required_parameter(parameters, "indexing_profile_name")?,
        })
    }
}

/// One unit of vectorization work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorizationRequest {
    /// Request id (well-formed UUID string)
    pub id: String,
    pub content_identifier: ContentIdentifier,
    pub processing_type: ProcessingType,
    /// Ordered configured steps
    pub steps: Vec<VectorizationStep>,
    /// Steps finished so far, in completion order
    pub completed_steps: Vec<StepName>,
    /// Steps still to run, in configured order
    pub remaining_steps: Vec<StepName>,
}

impl VectorizationRequest {
    /// Create a new request with all configured steps remaining.
    pub fn new(
        id: impl Into<String>,
        content_identifier: ContentIdentifier,
        processing_type: ProcessingType,
        steps: Vec<VectorizationStep>,
    ) -> Self {
        let remaining_steps = steps.iter().map(|s| s.name).collect();
        Self {
            id: id.into(),
            content_identifier,
            processing_type,
            steps,
            completed_steps: Vec::new(),
            remaining_steps,
        }
    }

    /// Validate the request is well-formed and the step bookkeeping
    /// invariant holds.
    pub fn validate(&self) -> Result<()> {
        if Uuid::parse_str(&self.id).is_err() {
            return Err(StateError::config(format!(
                "Request id is not a well-formed UUID: {}",
                self.id
            )));
        }
        self.content_identifier.validate()?;
        if self.steps.is_empty() {
            return Err(StateError::config("Request has no configured steps"));
        }

        for completed in &self.completed_steps {
            if self.remaining_steps.contains(completed) {
                return Err(StateError::config(format!(
                    "Step {} is both completed and remaining",
                    completed
                )));
            }
        }
        for step in &self.steps {
            let tracked = self.completed_steps.contains(&step.name)
                || self.remaining_steps.contains(&step.name);
            if !tracked {
                return Err(StateError::config(format!(
                    "Configured step {} is neither completed nor remaining",
                    step.name
                )));
            }
        }
        let tracked_count = self.completed_steps.len() + self.remaining_steps.len();
        if tracked_count != self.steps.len() {
            return Err(StateError::config(
                "Completed and remaining step lists do not cover the configured steps",
            ));
        }
        Ok(())
    }

    /// Look up a configured step by name.
    pub fn step(&self, name: StepName) -> Option<&VectorizationStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Move a step from remaining to completed.
    pub fn mark_complete(&mut self, name: StepName) -> Result<()> {
        let idx = self
            .remaining_steps
            .iter()
            .position(|s| *s == name)
            .ok_or_else(|| {
                StateError::config(format!("Step {} is not in the remaining list", name))
            })?;
        self.remaining_steps.remove(idx);
        self.completed_steps.push(name);
        Ok(())
    }

    /// True when no steps remain.
    pub fn is_complete(&self) -> bool {
        self.remaining_steps.is_empty()
    }
}
