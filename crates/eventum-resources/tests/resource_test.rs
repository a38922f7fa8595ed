//! Capacity resources end to end: contention, priorities, preemption,
//! cancellation.

use std::cell::RefCell;
use std::rc::Rc;

use eventum_core::{Environment, Failure, Value};
use eventum_resources::{Preempted, PreemptiveResource, PriorityResource, Resource};

type Log = Rc<RefCell<Vec<String>>>;

fn new_log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

#[test]
fn test_charging_station_with_two_slots() {
    let env = Environment::new();
    let station = Rc::new(Resource::new(&env, 2));
    let log = new_log();

    for (i, arrival) in [0.0, 2.0, 4.0, 6.0].into_iter().enumerate() {
        let station = station.clone();
        let log = log.clone();
        env.process(move |ctx| async move {
            ctx.sleep(arrival).await?;
            log.borrow_mut().push(format!("car{i} arriving at {}", ctx.now()));
            let slot = station.request();
            ctx.wait(&slot).await?;
            log.borrow_mut()
                .push(format!("car{i} starting to charge at {}", ctx.now()));
            ctx.sleep(5.0).await?;
            log.borrow_mut().push(format!("car{i} leaving at {}", ctx.now()));
            station.release(&slot);
            Ok(Value::unit())
        });
    }

    env.run_until_idle().unwrap();
    assert_eq!(
        *log.borrow(),
        vec![
            "car0 arriving at 0",
            "car0 starting to charge at 0",
            "car1 arriving at 2",
            "car1 starting to charge at 2",
            "car2 arriving at 4",
            "car0 leaving at 5",
            "car2 starting to charge at 5",
            "car3 arriving at 6",
            "car1 leaving at 7",
            "car3 starting to charge at 7",
            "car2 leaving at 10",
            "car3 leaving at 12",
        ]
    );
}

#[test]
fn test_release_transfers_the_slot_in_the_same_instant() {
    let env = Environment::new();
    let res = Rc::new(Resource::new(&env, 1));
    let granted_at = Rc::new(RefCell::new(None));

    let res2 = res.clone();
    env.process(move |ctx| async move {
        let slot = res2.request();
        ctx.wait(&slot).await?;
        ctx.sleep(3.0).await?;
        res2.release(&slot);
        Ok(Value::unit())
    });

    let res3 = res.clone();
    let granted = granted_at.clone();
    env.process(move |ctx| async move {
        ctx.sleep(1.0).await?;
        let slot = res3.request();
        ctx.wait(&slot).await?;
        *granted.borrow_mut() = Some(ctx.now());
        res3.release(&slot);
        Ok(Value::unit())
    });

    env.run_until_idle().unwrap();
    // Handover happens in the releasing instant, not later.
    assert_eq!(*granted_at.borrow(), Some(3.0));
    assert_eq!(res.count(), 0);
}

#[test]
fn test_priority_resource_serves_lower_values_first() {
    let env = Environment::new();
    let res = PriorityResource::new(&env, 1);

    let holder = res.request_priority(0);
    assert!(holder.is_triggered());

    let low = res.request_priority(5);
    let high = res.request_priority(1);
    let mid = res.request_priority(3);

    res.release(&holder);
    env.run_until_idle().unwrap();
    assert!(high.is_triggered());
    assert!(!mid.is_triggered());
    assert!(!low.is_triggered());

    res.release(&high);
    env.run_until_idle().unwrap();
    assert!(mid.is_triggered());
    assert!(!low.is_triggered());
}

#[test]
fn test_equal_priorities_are_fifo() {
    let env = Environment::new();
    let res = PriorityResource::new(&env, 1);

    let holder = res.request_priority(0);
    let first = res.request_priority(2);
    let second = res.request_priority(2);

    res.release(&holder);
    env.run_until_idle().unwrap();
    assert!(first.is_triggered());
    assert!(!second.is_triggered());
}

#[test]
fn test_preemption_interrupts_the_worst_user() {
    let env = Environment::new();
    let res = Rc::new(PreemptiveResource::new(&env, 1));
    let log = new_log();

    let res_a = res.clone();
    let log_a = log.clone();
    env.process(move |ctx| async move {
        let slot = res_a.request_priority(0, true);
        ctx.wait(&slot).await?;
        log_a.borrow_mut().push(format!("A got it at {}", ctx.now()));
        match ctx.sleep(10.0).await {
            Err(Failure::Interrupted(interrupt)) => {
                let cause = interrupt
                    .cause()
                    .and_then(|value| value.downcast::<Preempted>())
                    .expect("a preemption cause");
                log_a.borrow_mut().push(format!(
                    "A preempted at {} (in service since {})",
                    ctx.now(),
                    cause.usage_since
                ));
                assert!(cause.by.is_some());
            }
            Ok(_) => log_a.borrow_mut().push("A finished".into()),
            Err(other) => return Err(other),
        }
        Ok(Value::unit())
    });

    let res_c = res.clone();
    let log_c = log.clone();
    env.process(move |ctx| async move {
        ctx.sleep(1.0).await?;
        let slot = res_c.request_priority(-1, true);
        ctx.wait(&slot).await?;
        log_c.borrow_mut().push(format!("C got it at {}", ctx.now()));
        res_c.release(&slot);
        Ok(Value::unit())
    });

    env.run_until_idle().unwrap();
    assert_eq!(
        *log.borrow(),
        vec![
            "A got it at 0",
            "A preempted at 1 (in service since 0)",
            "C got it at 1",
        ]
    );
}

#[test]
fn test_preemption_cannot_cheat_past_the_queue_head() {
    let env = Environment::new();
    let res = Rc::new(PreemptiveResource::new(&env, 1));
    let log = new_log();

    let spawn_user = |name: &'static str, arrival: f64, priority: i64, preempt: bool| {
        let res = res.clone();
        let log = log.clone();
        env.process(move |ctx| async move {
            ctx.sleep(arrival).await?;
            let slot = res.request_priority(priority, preempt);
            ctx.wait(&slot).await?;
            log.borrow_mut().push(format!("{name} got it at {}", ctx.now()));
            match ctx.sleep(3.0).await {
                Ok(_) => {}
                Err(Failure::Interrupted(_)) => {
                    log.borrow_mut().push(format!("{name} preempted at {}", ctx.now()));
                    return Ok(Value::unit());
                }
                Err(other) => return Err(other),
            }
            res.release(&slot);
            Ok(Value::unit())
        });
    };

    spawn_user("A", 0.0, 0, true);
    // B cannot preempt, but queues ahead of C with a better priority.
    spawn_user("B", 1.0, -2, false);
    // C would preempt A, but may not slip past B.
    spawn_user("C", 1.0, -1, true);

    env.run_until_idle().unwrap();
    assert_eq!(
        *log.borrow(),
        vec!["A got it at 0", "B got it at 3", "C got it at 6"]
    );
}

#[test]
fn test_renege_with_a_timeout_race() {
    let env = Environment::new();
    let res = Rc::new(Resource::new(&env, 1));
    let log = new_log();

    let res_a = res.clone();
    env.process(move |ctx| async move {
        let slot = res_a.request();
        ctx.wait(&slot).await?;
        ctx.sleep(5.0).await?;
        res_a.release(&slot);
        Ok(Value::unit())
    });

    let res_b = res.clone();
    let log_b = log.clone();
    let env2 = env.clone();
    env.process(move |ctx| async move {
        let slot = res_b.request();
        let patience = env2.timeout(1.0);
        let first = env2.any_of([(*slot).clone(), patience.clone()]);
        ctx.wait(&first).await?;
        if slot.is_triggered() {
            log_b.borrow_mut().push(format!("B served at {}", ctx.now()));
            res_b.release(&slot);
        } else {
            log_b.borrow_mut().push(format!("B reneged at {}", ctx.now()));
            drop(slot);
            assert!(res_b.queue().is_empty());
        }
        Ok(Value::unit())
    });

    env.run_until_idle().unwrap();
    assert_eq!(*log.borrow(), vec!["B reneged at 1"]);
    assert_eq!(res.count(), 0);
}

#[test]
fn test_queue_inspection() {
    let env = Environment::new();
    let res = Resource::new(&env, 1);

    let holder = res.request();
    let waiting = res.request();

    assert_eq!(res.count(), 1);
    assert_eq!(res.capacity(), 1);
    assert_eq!(res.users(), vec![(*holder).clone()]);
    assert_eq!(res.queue(), vec![(*waiting).clone()]);
}
