//! Error classification and routing through real commands.

use std::cell::{Cell, RefCell};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use futures::StreamExt;
use futures::executor::{LocalPool, block_on};
use sortie::{
    AwaitError, Command, CommandHub, ErrorReaction, FilterChain, GlobalError, HubConfig,
    SortieError,
};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("quota exceeded")]
struct Quota;

#[derive(Debug, Error)]
#[error("timeout after {0}ms")]
struct Timeout(u32);

#[derive(Debug, Error)]
enum Remote {
    #[error("rejected with status {0}")]
    Rejected(u16),
}

fn failing(hub: &CommandHub, reaction: ErrorReaction) -> Command<i32, i32> {
    Command::sync(hub, 0, |_: i32| Err::<i32, _>(Quota))
        .name("upload")
        .error_filter(reaction)
        .build()
}

fn count_global(hub: &CommandHub) -> Rc<RefCell<Vec<GlobalError>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let s = Rc::clone(&seen);
    hub.set_global_handler(move |e| s.borrow_mut().push(e.clone()));
    seen
}

#[test]
fn local_only_stays_local() {
    let hub = CommandHub::new();
    let global = count_global(&hub);
    let cmd = failing(&hub, ErrorReaction::LocalOnly);
    let local = Rc::new(RefCell::new(Vec::new()));
    let l = Rc::clone(&local);
    let _sub = cmd.errors().subscribe(move |e| {
        if let Some(e) = e {
            l.borrow_mut().push(e.clone());
        }
    });

    cmd.run(1);

    let local = local.borrow();
    assert_eq!(local.len(), 1);
    assert!(local[0].error.is::<Quota>());
    assert_eq!(local[0].command.as_deref(), Some("upload"));
    assert_eq!(local[0].reaction, ErrorReaction::LocalOnly);
    assert!(global.borrow().is_empty());

    let record = cmd.results().get();
    assert!(record.has_error());
    assert_eq!(record.param, Some(1));
}

#[test]
fn global_only_skips_local_cells() {
    let hub = CommandHub::new();
    let global = count_global(&hub);
    let mut stream = hub.global_errors();
    let cmd = failing(&hub, ErrorReaction::GlobalOnly);
    let _sub = cmd.errors().subscribe(|_| {});

    cmd.run(7);

    assert!(cmd.errors().get().is_none());
    assert_eq!(global.borrow().len(), 1);
    assert_eq!(global.borrow()[0].param_as::<i32>(), Some(&7));
    let streamed = block_on(stream.next()).unwrap();
    assert!(streamed.error.is::<Quota>());
    assert!(!cmd.is_running_now());
}

#[test]
fn default_filter_falls_back_to_global() {
    let hub = CommandHub::new();
    let global = count_global(&hub);
    let cmd: Command<(), ()> = Command::sync(&hub, (), |_: ()| Err::<(), _>(Quota)).build();

    cmd.run(());
    assert_eq!(global.borrow().len(), 1);
    assert_eq!(
        global.borrow()[0].reaction,
        ErrorReaction::LocalThenGlobalFallback
    );

    let _sub = cmd.errors().subscribe(|_| {});
    cmd.run(());
    assert_eq!(global.borrow().len(), 1);
    assert!(cmd.errors().get().is_some());
}

#[test]
fn local_and_global_reaches_both() {
    let hub = CommandHub::new();
    let global = count_global(&hub);
    let cmd = failing(&hub, ErrorReaction::LocalAndGlobal);
    let _sub = cmd.errors().subscribe(|_| {});

    cmd.run(1);
    assert!(cmd.errors().get().is_some());
    assert_eq!(global.borrow().len(), 1);
}

#[test]
#[should_panic(expected = "requires a listener")]
fn local_only_without_listener_panics() {
    let hub = CommandHub::new();
    let cmd = failing(&hub, ErrorReaction::LocalOnly);
    cmd.run(1);
}

#[test]
#[should_panic(expected = "requires a global error handler")]
fn local_and_global_without_handler_panics() {
    let hub = CommandHub::new();
    let cmd = failing(&hub, ErrorReaction::LocalAndGlobal);
    let _sub = cmd.errors().subscribe(|_| {});
    cmd.run(1);
}

#[test]
#[should_panic(expected = "failed with an unhandled error")]
fn rethrow_without_awaiter_panics() {
    let hub = CommandHub::new();
    let cmd = failing(&hub, ErrorReaction::Rethrow);
    cmd.run(1);
}

#[test]
#[should_panic(expected = "failed with an unhandled error")]
fn throw_if_unhandled_with_nobody_listening() {
    let hub = CommandHub::new();
    let cmd = failing(&hub, ErrorReaction::ThrowIfUnhandled);
    cmd.run(1);
}

#[test]
fn throw_if_unhandled_prefers_listeners() {
    let hub = CommandHub::new();
    let global = count_global(&hub);
    let cmd = failing(&hub, ErrorReaction::ThrowIfUnhandled);
    cmd.run(1);
    assert_eq!(global.borrow().len(), 1);
}

#[test]
fn rethrow_reaches_awaiter() {
    let mut pool = LocalPool::new();
    let hub = CommandHub::with_spawner(pool.spawner());
    let cmd: Command<(), ()> = Command::future(&hub, (), |_: ()| async { Err::<(), _>(Timeout(50)) })
        .error_filter(ErrorReaction::Rethrow)
        .build();

    match pool.run_until(cmd.run_and_await(())) {
        Err(AwaitError::Failed(error)) => {
            assert_eq!(error.downcast_ref::<Timeout>().map(|t| t.0), Some(50));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
#[should_panic(expected = "swallowed error cannot complete")]
fn swallow_with_awaiter_is_a_defect() {
    let hub = CommandHub::new();
    let cmd = failing(&hub, ErrorReaction::Swallow);
    let _ = block_on(cmd.run_and_await(1));
}

#[test]
fn swallow_is_silent() {
    let hub = CommandHub::new();
    let global = count_global(&hub);
    let mut stream = hub.global_errors();
    let cmd = failing(&hub, ErrorReaction::Swallow);
    let _sub = cmd.errors().subscribe(|_| {});

    cmd.run(1);
    assert!(cmd.errors().get().is_none());
    assert!(global.borrow().is_empty());
    assert!(!cmd.is_running_now());
    assert!(stream.try_next().is_err());
}

#[test]
fn filter_chain_routes_by_type() {
    let hub = CommandHub::new();
    let global = count_global(&hub);
    let attempt = Rc::new(Cell::new(0u32));
    let a = Rc::clone(&attempt);
    let cmd: Command<(), ()> = Command::sync(&hub, (), move |_: ()| {
        a.set(a.get() + 1);
        Err(if a.get() == 1 { Remote::Rejected(429) } else { Remote::Rejected(503) })
    })
    .error_filter(
        FilterChain::new()
            .matching::<Remote>(|e| matches!(e, Remote::Rejected(c) if *c < 500), ErrorReaction::LocalOnly)
            .on_type::<Quota>(ErrorReaction::Swallow)
            .otherwise(ErrorReaction::GlobalOnly),
    )
    .build();
    let _sub = cmd.errors().subscribe(|_| {});

    cmd.run(());
    assert!(cmd.errors().get().is_some());
    assert!(global.borrow().is_empty());

    cmd.run(());
    assert!(cmd.errors().get().is_none());
    assert_eq!(global.borrow().len(), 1);
}

#[test]
#[should_panic(expected = "must not return ErrorReaction::Defer")]
fn deferring_default_filter_panics() {
    let hub = CommandHub::new();
    hub.set_default_filter(ErrorReaction::Defer);
    let cmd: Command<(), ()> = Command::sync(&hub, (), |_: ()| Err::<(), _>(Quota)).build();
    cmd.run(());
}

// ── Hub switches ─────────────────────────────────────────────────────

#[test]
#[should_panic(expected = "failed with an unhandled error")]
fn rethrow_all_overrides_filters() {
    let hub = CommandHub::new().with_config(HubConfig {
        rethrow_all: true,
        ..HubConfig::default()
    });
    let cmd = failing(&hub, ErrorReaction::LocalOnly);
    let _sub = cmd.errors().subscribe(|_| {});
    cmd.run(1);
}

#[test]
fn report_all_adds_global_delivery() {
    let hub = CommandHub::new().with_config(HubConfig {
        report_all_errors: true,
        ..HubConfig::default()
    });
    let global = count_global(&hub);
    let cmd = failing(&hub, ErrorReaction::LocalOnly);
    let _sub = cmd.errors().subscribe(|_| {});

    cmd.run(1);
    assert!(cmd.errors().get().is_some());
    assert_eq!(global.borrow().len(), 1);

    let quiet = failing(&hub, ErrorReaction::Swallow);
    quiet.run(1);
    assert_eq!(global.borrow().len(), 1);
}

#[test]
fn panicking_listener_is_reported_globally() {
    let hub = CommandHub::new();
    let global = count_global(&hub);
    let cmd = failing(&hub, ErrorReaction::LocalOnly);
    let _sub = cmd.errors().subscribe(|e| {
        if e.is_some() {
            panic!("listener exploded");
        }
    });

    cmd.run(1);

    let global = global.borrow();
    assert_eq!(global.len(), 1);
    match global[0].error.downcast_ref::<SortieError>() {
        Some(SortieError::HandlerPanicked { message, original }) => {
            assert_eq!(message, "listener exploded");
            assert!(original.is::<Quota>());
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(!cmd.is_running_now());
}

#[test]
fn panicking_listener_propagates_when_not_reported() {
    let hub = CommandHub::new().with_config(HubConfig {
        report_handler_failures: false,
        ..HubConfig::default()
    });
    let cmd = failing(&hub, ErrorReaction::LocalOnly);
    let _sub = cmd.errors().subscribe(|e| {
        if e.is_some() {
            panic!("listener exploded");
        }
    });

    assert!(catch_unwind(AssertUnwindSafe(|| cmd.run(1))).is_err());
}

#[test]
fn traces_follow_configuration() {
    let hub = CommandHub::new();
    let cmd = failing(&hub, ErrorReaction::LocalOnly);
    let _sub = cmd.errors().subscribe(|_| {});
    cmd.run(1);
    assert!(cmd.errors().get().unwrap().trace.is_some());

    hub.set_config(HubConfig {
        capture_traces: false,
        ..HubConfig::default()
    });
    cmd.run(1);
    assert!(cmd.errors().get().unwrap().trace.is_none());
}

#[test]
fn routing_is_repeatable() {
    let hub = CommandHub::new();
    let global = count_global(&hub);
    let cmd = failing(&hub, ErrorReaction::GlobalOnly);

    cmd.run(1);
    cmd.run(1);

    let global = global.borrow();
    assert_eq!(global.len(), 2);
    assert_eq!(global[0].reaction, global[1].reaction);
    assert_eq!(global[0].command, global[1].command);
}
