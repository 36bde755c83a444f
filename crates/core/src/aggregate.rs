//! Aggregate root trait.

/// Aggregate root marker + minimal interface.
///
/// Ledger aggregates are state-stored (not event-sourced): the version is the
/// number of committed writes, used by stores as an optimistic concurrency token.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Monotonically increasing version of the aggregate's state.
    fn version(&self) -> u64;
}
