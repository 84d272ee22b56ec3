//! Property-based test generators using proptest.
//!
//! Steps are drawn from a tiny alphabet so that generated positions are
//! often on one path, which is where merging gets interesting.

use aether_protocol::Flags;
use aether_server::Operation;
use aether_tree::{Datum, Delta, Dimension, Value};
use proptest::prelude::*;

/// Strategy for a single step name.
pub fn step_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["a", "b", "c"]).prop_map(String::from)
}

/// Strategy for dimensions of at most `max_depth` steps.
pub fn dimension_strategy(max_depth: usize) -> impl Strategy<Value = Dimension> {
    prop::collection::vec(step_strategy(), 0..=max_depth)
        .prop_map(|steps| Dimension::from_steps(steps).expect("steps are valid"))
}

/// Strategy for node data.
pub fn datum_strategy() -> impl Strategy<Value = Datum> {
    prop_oneof![
        any::<bool>().prop_map(Datum::Bool),
        (-100i64..100).prop_map(Datum::Integer),
        "[a-z]{0,4}".prop_map(Datum::Text),
    ]
}

/// Strategy for subtree values up to three levels deep.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop::option::of(datum_strategy()).prop_map(|datum| {
        let mut value = Value::empty();
        value.set_data(datum);
        value
    });
    leaf.prop_recursive(3, 24, 3, |inner| {
        (
            prop::option::of(datum_strategy()),
            prop::collection::btree_map(step_strategy(), inner, 0..3),
        )
            .prop_map(|(datum, children)| {
                let mut value = Value::empty();
                value.set_data(datum);
                children
                    .into_iter()
                    .fold(value, |value, (step, child)| value.with_child(step, child))
            })
    })
}

/// Strategy for deltas up to three levels deep.
pub fn delta_strategy() -> impl Strategy<Value = Delta> {
    let leaf = prop_oneof![
        Just(Delta::new()),
        datum_strategy().prop_map(|datum| Delta::set(datum)),
        Just(Delta::clear()),
        Just(Delta::clear_base()),
        value_strategy().prop_map(|value| Delta::replace(&value)),
    ];
    leaf.prop_recursive(3, 24, 3, |inner| {
        (
            prop_oneof![
                Just(Delta::new()),
                datum_strategy().prop_map(|datum| Delta::set(datum)),
                Just(Delta::clear()),
            ],
            prop::collection::btree_map(step_strategy(), inner, 0..3),
        )
            .prop_map(|(base, children)| {
                children
                    .into_iter()
                    .fold(base, |delta, (step, child)| delta.with_child(step, child))
            })
    })
}

/// Strategy for asynchronous operations.
pub fn operation_strategy() -> impl Strategy<Value = Operation> {
    prop_oneof![
        value_strategy().prop_map(Operation::Assign),
        delta_strategy().prop_map(Operation::Apply),
        Just(Operation::Clear),
    ]
}

/// Strategy for fence and notify flags.
pub fn flags_strategy() -> impl Strategy<Value = Flags> {
    prop_oneof![
        4 => Just(Flags::NONE),
        1 => Just(Flags::PRE_FENCE),
        1 => Just(Flags::POST_FENCE),
        1 => Just(Flags::FENCED),
    ]
}

/// Strategy for a targeted operation with flags.
pub fn targeted_operation_strategy(
    max_depth: usize,
) -> impl Strategy<Value = (Dimension, Operation, Flags)> {
    (
        dimension_strategy(max_depth),
        operation_strategy(),
        flags_strategy(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn dimensions_respect_depth(dimension in dimension_strategy(3)) {
            prop_assert!(dimension.len() <= 3);
        }

        #[test]
        fn values_survive_assign_and_snapshot(value in value_strategy()) {
            let mut root = Value::empty();
            root.assign_at(&Dimension::from_steps(["x"]).unwrap(), value.clone());
            prop_assert_eq!(root.snapshot(&Dimension::from_steps(["x"]).unwrap()), value);
        }
    }
}
