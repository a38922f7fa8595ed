//! Process lifecycle, interaction and interrupt delivery.

use std::cell::RefCell;
use std::rc::Rc;

use eventum_core::{start_delayed, Environment, Failure, Process, SimError, Value};

type Log = Rc<RefCell<Vec<String>>>;

fn new_log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

#[test]
fn test_waiter_observes_process_return_value() {
    let env = Environment::new();
    let worker = env.process(|ctx| async move {
        ctx.sleep(2.0).await?;
        Ok(Value::new(42u32))
    });

    let log = new_log();
    let log2 = log.clone();
    let observer = env.process(move |ctx| async move {
        let value = ctx.wait(&worker).await?;
        log2.borrow_mut().push(format!(
            "got {} at {}",
            value.downcast::<u32>().unwrap(),
            ctx.now()
        ));
        Ok(Value::unit())
    });

    env.run(&observer).unwrap();
    assert_eq!(*log.borrow(), vec!["got 42 at 2"]);
}

#[test]
fn test_interrupt_during_charge() {
    let env = Environment::new();
    let log = new_log();

    let ev_log = log.clone();
    let ev = env.process(move |ctx| async move {
        // First charge attempt, cut short by the driver.
        match ctx.sleep(5.0).await {
            Ok(_) => ev_log.borrow_mut().push(format!("charged at {}", ctx.now())),
            Err(Failure::Interrupted(_)) => ev_log
                .borrow_mut()
                .push(format!("interrupted at {}", ctx.now())),
            Err(other) => return Err(other),
        }
        // Drive for a while, then charge again.
        ctx.sleep(2.0).await?;
        ev_log
            .borrow_mut()
            .push(format!("charging again at {}", ctx.now()));
        Ok(Value::unit())
    });

    let victim = ev.clone();
    env.process(move |ctx| async move {
        ctx.sleep(3.0).await?;
        victim.interrupt(None);
        Ok(Value::unit())
    });

    env.run_until_idle().unwrap();
    assert_eq!(
        *log.borrow(),
        vec!["interrupted at 3", "charging again at 5"]
    );
}

#[test]
fn test_interrupt_cause_is_delivered() {
    let env = Environment::new();
    let seen = Rc::new(RefCell::new(None));

    let seen2 = seen.clone();
    let victim = env.process(move |ctx| async move {
        match ctx.sleep(10.0).await {
            Err(Failure::Interrupted(interrupt)) => {
                let cause = interrupt
                    .cause()
                    .and_then(|value| value.downcast::<&str>())
                    .map(|s| *s);
                *seen2.borrow_mut() = cause;
            }
            _ => {}
        }
        Ok(Value::unit())
    });

    let v2 = victim.clone();
    env.process(move |ctx| async move {
        ctx.sleep(1.0).await?;
        v2.interrupt(Some(Value::new("maintenance")));
        Ok(Value::unit())
    });

    env.run(&victim).unwrap();
    assert_eq!(*seen.borrow(), Some("maintenance"));
}

#[test]
fn test_same_instant_interrupts_deliver_in_order() {
    let env = Environment::new();
    let log = new_log();

    let vlog = log.clone();
    let victim = env.process(move |ctx| async move {
        for _ in 0..2 {
            match ctx.sleep(100.0).await {
                Err(Failure::Interrupted(interrupt)) => {
                    let n = interrupt
                        .cause()
                        .and_then(|value| value.downcast::<u32>())
                        .unwrap();
                    vlog.borrow_mut()
                        .push(format!("interrupt {n} at {}", ctx.now()));
                }
                Ok(_) => vlog.borrow_mut().push("slept through".into()),
                Err(other) => return Err(other),
            }
        }
        Ok(Value::unit())
    });

    let v2 = victim.clone();
    env.process(move |ctx| async move {
        ctx.sleep(1.0).await?;
        v2.interrupt(Some(Value::new(1u32)));
        v2.interrupt(Some(Value::new(2u32)));
        Ok(Value::unit())
    });

    env.run(&victim).unwrap();
    assert_eq!(
        *log.borrow(),
        vec!["interrupt 1 at 1", "interrupt 2 at 1"]
    );
}

#[test]
fn test_interrupt_after_target_completed_in_same_instant() {
    let env = Environment::new();
    let log = new_log();

    let vlog = log.clone();
    let victim = env.process(move |ctx| async move {
        ctx.sleep(1.0).await?;
        vlog.borrow_mut().push(format!("slept at {}", ctx.now()));
        match ctx.sleep(5.0).await {
            Err(Failure::Interrupted(_)) => vlog
                .borrow_mut()
                .push(format!("interrupted at {}", ctx.now())),
            Ok(_) => vlog.borrow_mut().push("finished".into()),
            Err(other) => return Err(other),
        }
        Ok(Value::unit())
    });

    // The driver's interrupt lands at the same instant as the victim's
    // first timeout; the victim gets exactly one normal resumption and
    // one interrupt, in that order.
    let v2 = victim.clone();
    env.process(move |ctx| async move {
        ctx.sleep(1.0).await?;
        v2.interrupt(None);
        Ok(Value::unit())
    });

    env.run(&victim).unwrap();
    assert_eq!(*log.borrow(), vec!["slept at 1", "interrupted at 1"]);
    assert_eq!(env.now(), 1.0);
}

#[test]
fn test_interrupting_a_dead_process_is_a_noop() {
    let env = Environment::new();
    let short = env.process(|_ctx| async move { Ok(Value::new("done")) });

    env.run(&short).unwrap();
    assert!(!short.is_alive());

    short.interrupt(None);
    env.run_until_idle().unwrap();
    assert_eq!(*short.value().unwrap().downcast::<&str>().unwrap(), "done");
}

#[test]
fn test_process_failure_propagates_to_waiter() {
    let env = Environment::new();
    let log = new_log();

    let child = env.process(|ctx| async move {
        ctx.sleep(1.0).await?;
        Err(Failure::fault("boom"))
    });

    let plog = log.clone();
    let child2 = child.clone();
    let parent = env.process(move |ctx| async move {
        match ctx.wait(&child2).await {
            Err(Failure::Fault(fault)) => plog
                .borrow_mut()
                .push(format!("handled {} at {}", fault.message(), ctx.now())),
            other => plog.borrow_mut().push(format!("unexpected {other:?}")),
        }
        Ok(Value::unit())
    });

    // The parent consumed the failure, so the run completes cleanly.
    env.run(&parent).unwrap();
    assert_eq!(*log.borrow(), vec!["handled boom at 1"]);
    assert_eq!(child.ok(), Some(false));
}

#[test]
fn test_unawaited_process_failure_surfaces() {
    let env = Environment::new();
    let _lonely = env.process(|ctx| async move {
        ctx.sleep(1.0).await?;
        Err(Failure::fault("lost"))
    });

    match env.run_until_idle() {
        Err(SimError::UnhandledFailure { now, failure }) => {
            assert_eq!(now, 1.0);
            assert_eq!(failure.to_string(), "lost");
        }
        other => panic!("expected an unhandled failure, got {other:?}"),
    }
}

#[test]
fn test_active_process_is_set_during_execution() {
    let env = Environment::new();
    assert!(env.active_process().is_none());

    let matched = Rc::new(RefCell::new(false));
    let matched2 = matched.clone();
    let env2 = env.clone();
    let proc = env.process(move |ctx| async move {
        let active = env2.active_process().expect("a process is running");
        *matched2.borrow_mut() = active == *ctx.process();
        Ok(Value::unit())
    });

    env.run(&proc).unwrap();
    assert!(*matched.borrow());
    assert!(env.active_process().is_none());
}

#[test]
fn test_start_delayed_value_is_the_started_process() {
    let env = Environment::new();
    let starter = start_delayed(&env, 2.0, |ctx| async move {
        ctx.sleep(1.0).await?;
        Ok(Value::new("inner done"))
    });

    env.run_until_idle().unwrap();
    let inner = starter.value().unwrap().downcast::<Process>().unwrap();
    assert!(!inner.is_alive());
    assert_eq!(
        *inner.value().unwrap().downcast::<&str>().unwrap(),
        "inner done"
    );
    assert_eq!(env.now(), 3.0);
}
