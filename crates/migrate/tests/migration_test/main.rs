/// Integration tests for the two-phase migration: snapshot isolation, forward
/// repair, version monotonicity, the deletion gap, idempotent replay, the
/// end-to-end checkpoint scenario and failure handling.

mod failures;
mod helpers;
mod properties;
mod scenario;
