pub mod async_task;
pub mod time;

mod scoped_timer;
pub(crate) use scoped_timer::ScopedTimer;

#[cfg(test)]
mod time_test;
