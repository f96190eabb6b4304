//! The explicit node list of a pipeline, built in full before anything runs.

use std::fmt;

use crate::config::{ConfigError, PipelineConfig, StageParams};
use crate::stages::{Stage, StageContext, StageError};
use crate::toolshed::{StageKind, Toolshed};

/// A stage name resolved against the toolshed, not yet built
#[derive(Debug, Clone)]
pub struct ResolvedStage {
    pub rank: usize,
    pub kind: StageKind,
    pub params: StageParams,
}

impl ResolvedStage {
    pub fn name(&self) -> &str {
        self.params.stage()
    }
}

/// Look up every stage of `config` in chain order.
///
/// # Errors
///
/// Returns `ConfigError::NoStages` if only reserved keys are present and
/// `ConfigError::UnknownStage` for the first name the toolshed lacks.
pub fn resolve(config: &PipelineConfig, toolshed: &Toolshed) -> Result<Vec<ResolvedStage>, ConfigError> {
    let params = config.stage_params();
    if params.is_empty() {
        return Err(ConfigError::NoStages);
    }

    params
        .into_iter()
        .enumerate()
        .map(|(rank, params)| {
            let descriptor = toolshed
                .get(params.stage())
                .ok_or_else(|| ConfigError::UnknownStage(params.stage().to_string()))?;
            Ok(ResolvedStage {
                rank,
                kind: descriptor.kind,
                params,
            })
        })
        .collect()
}

/// A built stage and its position in the chain
#[derive(Debug)]
pub struct StageNode {
    pub rank: usize,
    pub name: String,
    pub stage: Stage,
}

impl fmt::Display for StageNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.name, self.rank)
    }
}

#[derive(Debug)]
pub struct PipelinePlan {
    nodes: Vec<StageNode>,
}

impl PipelinePlan {
    /// Build every resolved stage, in order. Nothing is launched; a failure
    /// leaves no partially started chain behind.
    ///
    /// # Errors
    ///
    /// Returns the failing node's label together with its build error.
    pub fn build(resolved: Vec<ResolvedStage>, ctx: &StageContext) -> Result<Self, (String, StageError)> {
        let mut nodes = Vec::with_capacity(resolved.len());

        for entry in resolved {
            let label = format!("{}[{}]", entry.name(), entry.rank);
            let stage = Stage::build(entry.kind, &entry.params, &ctx.with_rank(entry.rank))
                .map_err(|e| (label, e))?;
            nodes.push(StageNode {
                rank: entry.rank,
                name: entry.name().to_string(),
                stage,
            });
        }

        Ok(Self { nodes })
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[StageNode] {
        &self.nodes
    }

    pub fn into_nodes(self) -> Vec<StageNode> {
        self.nodes
    }
}
