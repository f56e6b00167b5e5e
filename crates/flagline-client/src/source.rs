// crates/flagline-client/src/source.rs
// ============================================================================
// Module: Data Source Handle
// Description: A small object-safe trait unifying the streaming and polling
//              data sources so the client core can hold whichever one was
//              configured behind a single field.
// Purpose: `PollingDataSource` and `StreamingDataSource` share an identical
//          `status`/`stop` shape but no common trait of their own; this
//          crate is the seam that chooses between them, so it defines the
//          trait that lets it treat either uniformly.
// Dependencies: flagline-core, flagline-datasource
// ============================================================================

use flagline_core::DataSourceStatus;
use flagline_datasource::PollingDataSource;
use flagline_datasource::StreamingDataSource;

/// A running data source replicator, abstracted over its transport.
pub trait DataSourceHandle: Send {
    /// Returns the current lifecycle status.
    fn status(&self) -> DataSourceStatus;

    /// Signals the replicator to stop and waits for its background thread
    /// to exit.
    fn stop(self: Box<Self>);
}

impl DataSourceHandle for PollingDataSource {
    fn status(&self) -> DataSourceStatus {
        Self::status(self)
    }

    fn stop(self: Box<Self>) {
        (*self).stop();
    }
}

impl DataSourceHandle for StreamingDataSource {
    fn status(&self) -> DataSourceStatus {
        Self::status(self)
    }

    fn stop(self: Box<Self>) {
        (*self).stop();
    }
}
