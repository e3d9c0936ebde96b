//! Observable sync progress and the aggregated pass report

/// Snapshot of an in-flight sync pass, published through a watch channel.
/// Readers must tolerate coalesced updates; this is not a queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncProgress {
    pub is_syncing: bool,
    pub current_platform: Option<String>,
    pub platforms_total: usize,
    pub platforms_done: usize,
    pub games_total: usize,
    pub games_done: usize,
}

/// Outcome of a sync pass. A non-empty `errors` list with non-zero
/// counters means partial success: everything that could be synced was.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub platforms_synced: usize,
    pub games_added: usize,
    pub games_updated: usize,
    pub games_deleted: usize,
    pub errors: Vec<String>,
}

impl SyncReport {
    /// A report that carries a single failure and zero counters
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
            ..Default::default()
        }
    }

    /// Returned to a caller arriving while another pass holds the lock
    pub fn already_running() -> Self {
        Self::failed("Sync already in progress")
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}
