use std::fmt;

/// Optional backend features a query may depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Geospatial functions and R-tree indexing
    Spatial,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Spatial => "spatial",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Availability view of the storage engine that executes queries.
///
/// The executor never runs queries through this trait; query functions
/// capture their own handle. It only answers whether running one makes sense.
pub trait QueryBackend: Send + Sync {
    /// Whether the backend can currently take queries
    fn is_available(&self) -> bool {
        true
    }

    /// Whether an optional capability was loaded
    fn supports(&self, capability: Capability) -> bool;
}

/// Backend with a fixed set of capabilities
#[derive(Debug, Clone, Default)]
pub struct StaticBackend {
    pub available: bool,
    pub capabilities: Vec<Capability>,
}

impl StaticBackend {
    pub fn new(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            available: true,
            capabilities: capabilities.into_iter().collect(),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            capabilities: Vec::new(),
        }
    }
}

impl QueryBackend for StaticBackend {
    fn is_available(&self) -> bool {
        self.available
    }

    fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}
