use std::collections::BTreeMap;

use crate::description::ArtifactDescription;
use crate::expression::Expression;

/// Identifies an artifact anywhere it is referenced from a target or an
/// action: inputs, declared outputs, runfiles. Aliased rather than
/// newtype-wrapped since `ArtifactDescription` already carries full identity.
pub type ArtifactId = ArtifactDescription;

/// A dependency-graph action node (§3 "Action (graph node)"). `may_fail`
/// converts a non-zero exit into a soft failure (§7); `no_cache` suppresses
/// action-cache writes.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub id: String,
    pub command: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub inputs: BTreeMap<String, ArtifactId>,
    pub output_files: Vec<String>,
    pub output_dirs: Vec<String>,
    pub may_fail: bool,
    pub no_cache: bool,
    pub timeout_scale: f64,
    pub execution_properties: BTreeMap<String, String>,
}

impl Action {
    pub fn is_tree_action(&self) -> bool {
        self.command.is_empty()
    }
}

/// Output of evaluating an entity in a given configuration (§3 "Analysed
/// Target"). `blobs` and `trees` are ordered lists so that two structurally
/// identical evaluations produce byte-identical serialisations.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnalysedTarget {
    pub artifacts: BTreeMap<String, ArtifactId>,
    pub runfiles: BTreeMap<String, ArtifactId>,
    pub provides: BTreeMap<String, Expression>,
    pub actions: Vec<Action>,
    pub blobs: Vec<String>,
    pub trees: Vec<ArtifactId>,
}

impl AnalysedTarget {
    pub fn new() -> Self {
        Self::default()
    }
}
