pub const IMPORT_STATES_COLLECTION: &str = "import_states";
/// Attempts at a transactional merge before giving up on write conflicts.
pub const MAX_TRANSACTION_ATTEMPTS: u32 = 5;
