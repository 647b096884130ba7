//! Platform abstraction traits for Trellis runtime services.
//!
//! The runtime never drives itself: it asks the host to schedule a frame
//! (the next cooperative turn) and the host calls back into the runtime
//! when that turn runs.

/// Schedules turns for the Trellis runtime.
pub trait RuntimeScheduler {
    /// Request that the host run a turn soon.
    ///
    /// Called at most once per dirty transition of a component, so hosts
    /// may treat repeated calls as idempotent.
    fn schedule_frame(&self);
}
