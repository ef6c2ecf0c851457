//! Opaque handles to compiled output.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Handle to one compiled unit's output.
///
/// The engine never looks inside an artifact; it stores them, republishes
/// them and hands them back to callers. How a host executes or hot-swaps a
/// fresh artifact in place of an old one is the host's concern. Cloning is
/// cheap (shared handle).
#[derive(Clone)]
pub struct Artifact(Arc<dyn Any + Send + Sync>);

impl Artifact {
    /// Wraps a host-defined compiled value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Artifact(Arc::new(value))
    }

    /// Recovers the concrete artifact type, if it matches.
    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Whether two handles refer to the same published artifact. Hosts use
    /// this to detect that a resolve produced a fresh artifact rather than
    /// returning the cached one.
    pub fn handle_eq(&self, other: &Artifact) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Artifact(opaque)")
    }
}
