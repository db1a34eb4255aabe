//! Property-based testing utilities using proptest.

use proptest::prelude::*;
use shared_todos_core::todo::{Color, Deadline, Todo, TodoId};
use uuid::Uuid;

/// Any palette color, `None` included
pub fn arb_color() -> impl Strategy<Value = Color> {
    proptest::sample::select(Color::ALL.to_vec())
}

/// A valid calendar date between 2000 and 2099
pub fn arb_deadline() -> impl Strategy<Value = Deadline> {
    (2000i32..2100, 1u32..=12, 1u32..=31)
        .prop_filter_map("invalid calendar date", |(year, month, day)| {
            Deadline::from_ymd(year, month, day)
        })
}

/// A todo with arbitrary fields
pub fn arb_todo() -> impl Strategy<Value = Todo> {
    (
        any::<u128>(),
        "[a-zA-Z0-9 ]{0,24}",
        any::<bool>(),
        0i64..4_102_444_800_000,
        arb_color(),
        proptest::option::of(arb_deadline()),
    )
        .prop_map(|(id, text, done, created_at, color, deadline)| {
            let mut todo = Todo::new(TodoId::from_uuid(Uuid::from_u128(id)), text, created_at)
                .with_color(color)
                .with_done(done);
            todo.deadline = deadline;
            todo
        })
}

/// A snapshot of up to 32 todos with distinct ids
pub fn arb_snapshot() -> impl Strategy<Value = Vec<Todo>> {
    proptest::collection::vec(arb_todo(), 0..32).prop_map(|mut todos| {
        for (index, todo) in (1u128..).zip(todos.iter_mut()) {
            todo.id = TodoId::from_uuid(Uuid::from_u128(index));
        }
        todos
    })
}
