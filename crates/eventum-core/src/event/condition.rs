//! Condition events: wait-for-all and wait-for-any composition.
//!
//! A condition aggregates child events under a predicate over the number
//! of triggered children. Observer callbacks on the children keep the
//! condition's recorded outcomes current; the first failing child
//! short-circuits the whole condition with its failure.
//!
//! The result mapping deliberately assembles late, when the condition is
//! *processed* rather than when its predicate first holds: children that
//! fire in the same instant still contribute, and the mapping iterates in
//! declared child order regardless of firing order.

use std::fmt;

use crate::event::{Event, EventPayload, Outcome};
use crate::simulation::Environment;
use crate::value::Value;

/// Predicate over `(child count, triggered count)`.
pub type ConditionPredicate = fn(usize, usize) -> bool;

/// All children triggered.
pub(crate) fn all_events(total: usize, triggered: usize) -> bool {
    triggered == total
}

/// At least one child triggered (vacuously true without children).
pub(crate) fn any_events(total: usize, triggered: usize) -> bool {
    triggered > 0 || total == 0
}

pub(crate) struct ConditionState {
    children: Vec<Event>,
    evaluate: ConditionPredicate,
    recorded: Vec<Option<Outcome>>,
}

impl ConditionState {
    fn triggered_count(&self) -> usize {
        self.recorded.iter().filter(|slot| slot.is_some()).count()
    }
}

/// The result mapping of a condition: `(child, value)` pairs for every
/// child that had triggered when the condition was processed, iterating
/// in declared child order. A child that is itself a condition
/// contributes its own pairs in place of itself.
#[derive(Clone, Default)]
pub struct ConditionValue {
    pairs: Vec<(Event, Value)>,
}

impl ConditionValue {
    /// Value contributed by `event`, if it had triggered.
    #[must_use]
    pub fn get(&self, event: &Event) -> Option<&Value> {
        self.pairs
            .iter()
            .find(|(child, _)| child == event)
            .map(|(_, value)| value)
    }

    /// Iterate `(child, value)` pairs in declared order.
    pub fn iter(&self) -> impl Iterator<Item = (&Event, &Value)> {
        self.pairs.iter().map(|(child, value)| (child, value))
    }

    /// Iterate values in declared order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.pairs.iter().map(|(_, value)| value)
    }

    /// Number of contributing children.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// `true` when no child had triggered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl fmt::Debug for ConditionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConditionValue(len={})", self.pairs.len())
    }
}

/// Build a condition event over `children` with the given predicate.
///
/// # Panics
///
/// Panics if a child belongs to a different environment.
pub(crate) fn new_condition(
    env: &Environment,
    children: Vec<Event>,
    evaluate: ConditionPredicate,
) -> Event {
    for child in &children {
        assert!(
            env.same(&child.env()),
            "cannot mix events from different environments"
        );
    }

    let total = children.len();
    let condition = Event::new(
        env.clone(),
        "condition",
        EventPayload::Condition(ConditionState {
            children: children.clone(),
            evaluate,
            recorded: vec![None; total],
        }),
    );

    // First callback: assemble the final mapping once processed. Runs
    // before any waiter observes the value.
    {
        let this = condition.clone();
        condition.add_callback(move |_| collect(&this));
    }

    // Pre-populate children that are already over; observe the rest.
    let mut first_failure = None;
    for (index, child) in children.iter().enumerate() {
        if child.is_processed() {
            let outcome = child.outcome();
            if let Some(Err(failure)) = &outcome {
                if first_failure.is_none() {
                    first_failure = Some(failure.clone());
                }
            }
            with_state(&condition, |state| state.recorded[index] = outcome);
        } else {
            let condition = condition.clone();
            child.add_callback(move |fired| check(&condition, index, fired));
        }
    }

    if let Some(failure) = first_failure {
        condition.fail(failure);
        return condition;
    }

    let holds = with_state(&condition, |state| {
        (state.evaluate)(total, state.triggered_count())
    });
    if holds {
        condition.succeed(Value::new(ConditionValue::default()));
    }

    condition
}

/// Observer invoked when a not-yet-processed child is processed.
fn check(condition: &Event, index: usize, child: &Event) {
    let Some(outcome) = child.outcome() else {
        return;
    };
    let failed = outcome.is_err();
    with_state(condition, |state| state.recorded[index] = Some(outcome));

    if condition.is_triggered() {
        return;
    }

    if failed {
        // Short-circuit: the condition takes over the failure.
        child.defuse();
        if let Some(Err(failure)) = child.outcome() {
            condition.fail(failure);
        }
    } else {
        let holds = with_state(condition, |state| {
            (state.evaluate)(state.children.len(), state.triggered_count())
        });
        if holds {
            condition.succeed(Value::new(ConditionValue::default()));
        }
    }
}

/// Assemble the final result mapping. Runs as the condition's first
/// callback, at processed-time.
fn collect(condition: &Event) {
    if condition.ok() != Some(true) {
        return;
    }
    let mut pairs = Vec::new();
    with_state(condition, |state| {
        for (child, slot) in state.children.iter().zip(&state.recorded) {
            let Some(Ok(value)) = slot else { continue };
            // Nested conditions contribute their own mapping in place.
            if child.is_condition() {
                if let Some(nested) = value.downcast::<ConditionValue>() {
                    pairs.extend(nested.pairs.iter().cloned());
                    continue;
                }
            }
            pairs.push((child.clone(), value.clone()));
        }
    });
    condition.replace_value(Value::new(ConditionValue { pairs }));
}

fn with_state<R>(condition: &Event, f: impl FnOnce(&mut ConditionState) -> R) -> R {
    let mut inner = condition.borrow_inner_mut();
    match &mut inner.payload {
        EventPayload::Condition(state) => f(state),
        _ => unreachable!("condition payload on a non-condition event"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::Environment;

    #[test]
    fn test_all_of_empty_succeeds_immediately() {
        let env = Environment::new();
        let cond = env.all_of([]);
        assert!(cond.is_triggered());
    }

    #[test]
    fn test_any_of_empty_succeeds_immediately() {
        let env = Environment::new();
        let cond = env.any_of([]);
        assert!(cond.is_triggered());
    }

    #[test]
    fn test_result_mapping_keeps_declared_order() {
        let env = Environment::new();
        let t1 = env.timeout_value(2.0, Value::new("late"));
        let t2 = env.timeout_value(1.0, Value::new("early"));
        let cond = env.all_of([t1.clone(), t2.clone()]);

        env.run(3.0).unwrap();
        assert!(cond.is_processed());

        let result = cond.value().unwrap().downcast::<ConditionValue>().unwrap();
        let order: Vec<Event> = result.iter().map(|(child, _)| child.clone()).collect();
        // t2 fired first; the mapping still iterates t1 before t2.
        assert_eq!(order, vec![t1, t2]);
    }

    #[test]
    fn test_prepopulated_processed_child() {
        let env = Environment::new();
        let done = env.event();
        done.succeed(Value::new(1u8));
        env.step().unwrap();
        assert!(done.is_processed());

        let pending = env.timeout(1.0);
        let cond = env.all_of([done.clone(), pending]);
        assert!(!cond.is_triggered());

        env.run(2.0).unwrap();
        let result = cond.value().unwrap().downcast::<ConditionValue>().unwrap();
        assert_eq!(result.len(), 2);
        assert!(result.get(&done).is_some());
    }

    #[test]
    #[should_panic(expected = "different environments")]
    fn test_mixed_environments_panic() {
        let env1 = Environment::new();
        let env2 = Environment::new();
        let foreign = env2.event();
        let _ = env1.all_of([foreign]);
    }
}
