//! Says hello every second.
//!
//! ```text
//! RUST_LOG=trace cargo run -p tickloop_port_std --example hello
//! ```
use tickloop::{DefaultTickRate, Loop, Task, Ticks};
use tickloop_port_std::{Clock, Driver, StdPort};

fn say_hello<'a>(now: Ticks, task: &'a Task<'a, StdPort>) {
    println!(
        "Hello world, the time is {now} ticks ({} s)",
        DefaultTickRate::ticks_to_secs(now)
    );

    task.reschedule(now.wrapping_add(DefaultTickRate::secs_to_ticks(1)));
}

fn main() {
    env_logger::init();

    let clock = Clock::new();
    let lp = Loop::new(StdPort::new());
    let task = Task::new(&lp);

    task.schedule(clock.now(), &say_hello, 0);
    log::debug!("starting the loop at {:?}", clock);

    Driver::new(&lp, clock).run();
}
