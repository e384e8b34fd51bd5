//! FRR configuration rendering and pushing for the speaker.

mod debouncer;
mod pusher;
mod render;

pub use debouncer::debounce;
pub use pusher::FrrPusher;
pub use render::desired_spec;
#[cfg(test)]
pub(crate) use render::HOSTNAME_LABEL;
