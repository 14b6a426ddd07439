//! Worker-side execution.
//!
//! A [`Launcher`] wraps one worker host. It turns a thread request into
//! running jobs without exceeding the host's free RAM, and drives the job
//! lifecycle through start, wait, finish and kill. All waiting is
//! cooperative: polling sleeps on the tokio timer, so paused-clock tests
//! advance through it instantly.

pub mod launcher;

pub use launcher::Launcher;
