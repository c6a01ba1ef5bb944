use std::{
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Mutex,
    },
    thread,
    time::{Duration, Instant},
};
use tickloop::{task_fn, DefaultTickRate, Loop, Task, Ticks};
use tickloop_port_std::{Clock, Driver, StdPort};

fn init_logger() {
    // `is_test(true)` would drop log messages from other threads
    let _ = env_logger::try_init();
}

#[test]
fn dispatch_in_due_order() {
    init_logger();

    let dispatched = Mutex::new(Vec::new());
    let record = task_fn::<StdPort, _>(|now, task| {
        dispatched.lock().unwrap().push((now, task.flags()));
    });

    let clock = Clock::new();
    let lp = Loop::new(StdPort::new());
    let tasks = [(); 3].map(|_| Task::new(&lp));

    let start = clock.now();
    for (task, ms) in tasks.iter().zip([30, 10, 20]) {
        task.schedule(start + DefaultTickRate::ms_to_ticks(ms), &record, ms);
    }

    let driver = Driver::new(&lp, clock);
    driver.run_until(|| dispatched.lock().unwrap().len() == 3);

    let dispatched = dispatched.lock().unwrap().clone();
    log::debug!("dispatched = {dispatched:?}");

    let flags: Vec<u32> = dispatched.iter().map(|&(_, flags)| flags).collect();
    assert_eq!(flags, [10, 20, 30]);

    // Never dispatched early
    for &(now, ms) in &dispatched {
        assert!(!tickloop::is_before(now, start + DefaultTickRate::ms_to_ticks(ms)));
    }
    assert!(lp.is_empty());
}

#[test]
fn periodic_task() {
    init_logger();

    let count = AtomicU32::new(0);
    let period = DefaultTickRate::ms_to_ticks(5);
    let tick = task_fn::<StdPort, _>(|now, task| {
        if count.fetch_add(1, Ordering::Relaxed) < 9 {
            task.reschedule(now.wrapping_add(period));
        }
    });

    // Cross the wraparound point while running
    let clock = Clock::new().starting_at(u64::from(u32::MAX - 100));
    let lp = Loop::new(StdPort::new());
    let task = Task::new(&lp);
    task.schedule(clock.now(), &tick, 0);

    let start = Instant::now();
    let driver = Driver::new(&lp, clock);
    driver.run_until(|| driver.event_loop().is_empty());

    assert_eq!(count.load(Ordering::Relaxed), 10);
    assert!(start.elapsed() >= Duration::from_millis(40));
}

#[test]
fn schedule_from_another_thread_wakes_driver() {
    init_logger();

    let fired = AtomicBool::new(false);
    let on_fire = task_fn::<StdPort, _>(|_: Ticks, _| {
        fired.store(true, Ordering::Release);
    });

    let clock = Clock::new();
    let lp = Loop::new(StdPort::new());
    let task = Task::new(&lp);
    let driver = Driver::new(&lp, clock);

    let start = Instant::now();
    thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(Duration::from_millis(50));
            // Due immediately; the driver is sleeping on an empty queue
            task.schedule(clock.now(), &on_fire, 0);
        });

        driver.run_until(|| fired.load(Ordering::Acquire));
    });

    assert!(start.elapsed() < Duration::from_secs(30));
    assert!(!task.is_scheduled());
}

#[test]
fn cancel_from_another_thread() {
    init_logger();

    let fired = AtomicBool::new(false);
    let on_fire = task_fn::<StdPort, _>(|_, _| {
        fired.store(true, Ordering::Release);
    });
    let stop = AtomicBool::new(false);

    let clock = Clock::new();
    let lp = Loop::new(StdPort::new());
    let task = Task::new(&lp);
    task.schedule(clock.now() + DefaultTickRate::ms_to_ticks(500), &on_fire, 0);

    let driver = Driver::new(&lp, clock);
    thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(Duration::from_millis(20));
            assert!(task.cancel());
            stop.store(true, Ordering::Release);
            lp.port().notify();
        });

        driver.run_until(|| stop.load(Ordering::Acquire));
    });

    assert!(!fired.load(Ordering::Acquire));
    assert!(lp.is_empty());
}

#[test]
fn schedule_relative_to_driver_clock() {
    init_logger();

    let fired_at = Mutex::new(None);
    let on_fire = task_fn::<StdPort, _>(|now, _| {
        *fired_at.lock().unwrap() = Some(now);
    });

    let lp = Loop::new(StdPort::new());
    let task = Task::new(&lp);
    let driver = Driver::new(&lp, Clock::new());
    assert!(std::ptr::eq(driver.event_loop(), &lp));

    let due = driver.clock().now() + DefaultTickRate::ms_to_ticks(20);
    task.schedule(due, &on_fire, 0);
    assert_eq!(driver.event_loop().next_due(), Some(due));

    driver.run_until(|| fired_at.lock().unwrap().is_some());

    let fired_at = fired_at.lock().unwrap().unwrap();
    assert!(!tickloop::is_before(fired_at, due));
    assert!(!tickloop::is_before(driver.clock().now(), fired_at));
    assert!(driver.event_loop().is_empty());
}
