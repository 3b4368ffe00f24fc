/// Lock table for exclusive (pessimistic) row access.
pub mod lock_table;
/// Committed rows and the overlay of published uncommitted writes.
pub mod txn_buffer;
/// Committed account paired with the commit timestamp that installed it.
pub mod versioned_value;
