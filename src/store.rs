//! Authoritative MMU state, mutated only through [`MmuStore::apply`].

use mmu_shared::{MmuDelta, MmuState};

#[derive(Debug, Default)]
pub struct MmuStore {
    state: MmuState,
}

impl MmuStore {
    pub fn new() -> Self {
        Self { state: MmuState::new() }
    }

    pub fn state(&self) -> &MmuState {
        &self.state
    }

    /// Merges `delta` and reports whether any visible field changed.
    ///
    /// Bookkeeping fields (`last_line`, `last_action`) are always stored,
    /// but only a visible change is worth notifying subscribers about.
    pub fn apply(&mut self, delta: &MmuDelta) -> (MmuState, bool) {
        let next = self.state.merged(delta);
        let changed = !next.same_visible(&self.state);
        if changed {
            tracing::info!(
                "MMU {} -> {} (tool {:?}, previous {:?})",
                self.state.state,
                next.state,
                next.tool.map(|t| t.index()),
                next.previous_tool.map(|t| t.index())
            );
        }
        self.state = next;
        (self.state.clone(), changed)
    }
}
