//! Unique identifiers for Meridian entities.
//!
//! This module provides strongly-typed UUID identifiers using
//! [`domain-key`](https://crates.io/crates/domain-key) `Uuid<D>` wrappers.
//! Each identifier type is parameterized by a unique domain marker, providing
//! compile-time type safety that prevents mixing different ID types.
//!
//! All ID types are `Copy` (16 bytes, stack-allocated) and support:
//! - `v4()` for random UUID generation
//! - `nil()` for zero-valued default
//! - `parse(&str)` for string parsing
//! - Full serde support (serializes as UUID string)
//! - `Display`, `FromStr`, `Eq`, `Ord`, `Hash`

use domain_key::define_uuid;

// Re-export for downstream parse error handling
pub use domain_key::UuidParseError;

// Entity identifiers — UUID-based, Copy, 16 bytes each
define_uuid!(pub RunIdDomain => RunId);
define_uuid!(pub TaskIdDomain => TaskId);
define_uuid!(pub DispatchIdDomain => DispatchId);
define_uuid!(pub SessionIdDomain => SessionId);
define_uuid!(pub CommandIdDomain => CommandId);
define_uuid!(pub UserIdDomain => UserId);
define_uuid!(pub TenantIdDomain => TenantId);
define_uuid!(pub WorkflowRecordIdDomain => WorkflowRecordId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_v4_creates_non_nil_uuid() {
        let id = RunId::v4();
        assert!(!id.is_nil());
    }

    #[test]
    fn task_id_v4_creates_non_nil_uuid() {
        let id = TaskId::v4();
        assert!(!id.is_nil());
    }

    #[test]
    fn dispatch_id_v4_creates_non_nil_uuid() {
        let id = DispatchId::v4();
        assert!(!id.is_nil());
    }

    #[test]
    fn session_id_v4_creates_non_nil_uuid() {
        let id = SessionId::v4();
        assert!(!id.is_nil());
    }

    #[test]
    fn id_nil_creates_zero_valued_uuid() {
        let id = RunId::nil();
        assert!(id.is_nil());
        assert_eq!(id.to_string(), "00000000-0000-0000-0000-000000000000");
    }

    #[test]
    fn id_parse_valid_uuid_string_succeeds() {
        let id = RunId::parse("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert!(!id.is_nil());
        assert_eq!(id.to_string(), "550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn id_parse_invalid_string_returns_error() {
        let result = RunId::parse("not-a-uuid");
        assert!(result.is_err());
    }

    #[test]
    fn id_copy_semantics_both_copies_usable() {
        let id1 = SessionId::v4();
        let id2 = id1; // Copy, not move
        assert_eq!(id1, id2);
    }

    #[test]
    fn id_serde_json_roundtrip() {
        let id = DispatchId::v4();
        let json = serde_json::to_string(&id).unwrap();
        let deserialized: DispatchId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, deserialized);
    }

    #[test]
    fn different_id_types_are_incompatible() {
        // RunId and TaskId are distinct types — passing one where the other
        // is expected would be a compile error.
        fn accepts_run(_id: RunId) {}
        fn accepts_task(_id: TaskId) {}

        let run = RunId::v4();
        let task = TaskId::v4();
        accepts_run(run);
        accepts_task(task);
        // accepts_run(task); // Would not compile
        // accepts_task(run); // Would not compile
    }

    #[test]
    fn id_from_uuid_roundtrips() {
        let raw = uuid::Uuid::new_v4();
        let typed = RunId::from(raw);
        let back: uuid::Uuid = typed.into();
        assert_eq!(raw, back);
    }

    #[test]
    fn id_ordering_is_consistent() {
        let a = RunId::nil();
        let b = RunId::parse("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert!(a < b);
    }

    #[test]
    fn id_hash_is_consistent() {
        use std::collections::HashSet;
        let id = WorkflowRecordId::v4();
        let mut set = HashSet::new();
        set.insert(id);
        assert!(set.contains(&id));
    }
}
