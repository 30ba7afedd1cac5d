//! Property-based test generators using proptest.

use crate::fixtures::Task;
use concord_storage::RunnableRecord;
use concord_sync_engine::{Change, ChangeType};
use proptest::prelude::*;

/// Strategy for generating record ids.
pub fn record_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9-]{1,24}").expect("Invalid regex")
}

/// Strategy for generating type tags.
pub fn kind_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z_]{1,16}").expect("Invalid regex")
}

/// Strategy for generating small JSON payloads.
pub fn payload_strategy() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        Just(serde_json::Value::Null),
        any::<i64>().prop_map(serde_json::Value::from),
        "[a-zA-Z0-9 ]{0,32}".prop_map(serde_json::Value::from),
        prop::collection::btree_map("[a-z]{1,8}", any::<i32>(), 0..4)
            .prop_map(|map| serde_json::json!(map)),
    ]
}

/// Strategy for generating queue records.
pub fn record_strategy() -> impl Strategy<Value = RunnableRecord> {
    (record_id_strategy(), kind_strategy(), payload_strategy())
        .prop_map(|(id, kind, payload)| RunnableRecord::new(id, kind, payload))
}

/// Strategy for generating queues with unique ids.
pub fn queue_strategy() -> impl Strategy<Value = Vec<RunnableRecord>> {
    prop::collection::vec(record_strategy(), 0..16).prop_map(|records| {
        let mut seen = std::collections::HashSet::new();
        records
            .into_iter()
            .filter(|r| seen.insert(r.id.clone()))
            .collect()
    })
}

/// Strategy for generating tasks.
pub fn task_strategy() -> impl Strategy<Value = Task> {
    ("[a-z0-9]{1,8}", "[a-zA-Z ]{0,24}", any::<bool>()).prop_map(|(id, title, done)| Task {
        id,
        title,
        done,
    })
}

/// Strategy for generating change types.
pub fn change_type_strategy() -> impl Strategy<Value = ChangeType> {
    prop_oneof![
        Just(ChangeType::Sync),
        Just(ChangeType::Insert),
        Just(ChangeType::Update),
        Just(ChangeType::Delete),
    ]
}

/// Strategy for generating well-formed changes.
pub fn change_strategy() -> impl Strategy<Value = Change<Task>> {
    (change_type_strategy(), task_strategy()).prop_map(|(change_type, task)| match change_type {
        ChangeType::Sync => Change::sync(task),
        ChangeType::Insert => Change::insert(task),
        ChangeType::Update => Change::update(task, None),
        ChangeType::Delete => Change::delete(task),
    })
}
