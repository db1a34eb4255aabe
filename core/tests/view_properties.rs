//! Property tests for the derived views and batch builders.

use proptest::prelude::*;
use shared_todos_core::batch::{TodoBatches, toggle_all_target};
use shared_todos_core::remote::Operation;
use shared_todos_core::todo::TodoId;
use shared_todos_core::view::TodoViews;
use shared_todos_testing::properties::arb_snapshot;

proptest! {
    #[test]
    fn groups_partition_the_snapshot(todos in arb_snapshot()) {
        let views = TodoViews::build(&todos);

        prop_assert_eq!(views.grouped.len(), todos.len());
        prop_assert!(views.grouped.with_deadline.iter().all(|t| t.deadline.is_some()));
        prop_assert!(views.grouped.without_deadline.iter().all(|t| t.deadline.is_none()));
    }

    #[test]
    fn deadline_group_is_sorted_and_stable(todos in arb_snapshot()) {
        let views = TodoViews::build(&todos);
        let position = |id: &TodoId| todos.iter().position(|t| &t.id == id);

        for pair in views.grouped.with_deadline.windows(2) {
            prop_assert!(pair[0].deadline <= pair[1].deadline);
            if pair[0].deadline == pair[1].deadline {
                prop_assert!(position(&pair[0].id) < position(&pair[1].id));
            }
        }
    }

    #[test]
    fn undated_group_keeps_snapshot_order(todos in arb_snapshot()) {
        let views = TodoViews::build(&todos);
        let expected: Vec<_> = todos.iter().filter(|t| t.deadline.is_none()).cloned().collect();
        prop_assert_eq!(views.grouped.without_deadline, expected);
    }

    #[test]
    fn counts_add_up(todos in arb_snapshot()) {
        let views = TodoViews::build(&todos);
        prop_assert_eq!(views.remaining_count + views.completed_count, todos.len());
        prop_assert_eq!(views.remaining_count, todos.iter().filter(|t| !t.done).count());
    }

    #[test]
    fn build_is_deterministic(todos in arb_snapshot()) {
        prop_assert_eq!(TodoViews::build(&todos), TodoViews::build(&todos));
    }

    #[test]
    fn toggle_all_targets_every_todo(todos in arb_snapshot()) {
        let target = toggle_all_target(&todos);
        let batch = TodoBatches::toggle_all(&todos);

        prop_assert_eq!(batch.len(), todos.len());
        for op in batch.operations() {
            let is_target = matches!(op, Operation::Update { patch, .. } if patch.done == Some(target));
            prop_assert!(is_target);
        }
    }

    #[test]
    fn delete_completed_targets_exactly_the_done_todos(todos in arb_snapshot()) {
        let batch = TodoBatches::delete_completed(&todos);
        let done: Vec<_> = todos.iter().filter(|t| t.done).map(|t| t.id.clone()).collect();
        let targeted: Vec<_> = batch.operations().iter().map(|op| op.id().clone()).collect();
        prop_assert_eq!(targeted, done);
    }
}
