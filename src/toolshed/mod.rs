//! The toolshed: the registry of every stage a pipeline can chain.
//!
//! The registry is built once per process and never changes afterwards.
//! Stage dispatch goes through the closed [`StageKind`] enumeration, so
//! adding a stage means adding a variant and a descriptor here.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

/// Entry point of a registered stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    AlnContext,
    AccStats,
    Listing,
}

/// A registered stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: StageKind,
}

/// Immutable name -> descriptor table
#[derive(Debug)]
pub struct Toolshed {
    stages: BTreeMap<&'static str, StageDescriptor>,
}

const DESCRIPTORS: &[StageDescriptor] = &[
    StageDescriptor {
        name: "AlnContext",
        description: "filter records by the sequence context at start and end",
        kind: StageKind::AlnContext,
    },
    StageDescriptor {
        name: "AccStats",
        description: "calculates mean accuracy weighted by alignment lengths",
        kind: StageKind::AccStats,
    },
    StageDescriptor {
        name: "help",
        description: "list all tools with description",
        kind: StageKind::Listing,
    },
];

/// The process-wide registry
pub fn toolshed() -> &'static Toolshed {
    static TOOLSHED: OnceLock<Toolshed> = OnceLock::new();
    TOOLSHED.get_or_init(|| Toolshed::new(DESCRIPTORS))
}

impl Toolshed {
    fn new(descriptors: &[StageDescriptor]) -> Self {
        Self {
            stages: descriptors.iter().map(|d| (d.name, d.clone())).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&StageDescriptor> {
        self.stages.get(name)
    }

    /// Descriptors sorted by name
    pub fn iter(&self) -> impl Iterator<Item = &StageDescriptor> {
        self.stages.values()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Two-column table of every stage, sorted by name
    pub fn listing(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Toolshed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Tool\tDescription")?;
        writeln!(f, "----\t-----------")?;
        for stage in self.iter() {
            writeln!(f, "{}\t{}", stage.name, stage.description)?;
        }
        Ok(())
    }
}
