//! Thin indirection over `tracing` so the parser can emit spans and events
//! when the `tracing` feature is enabled, and compile to nothing otherwise.

#[cfg(feature = "tracing")]
pub(crate) use ::tracing::{event, span, Level};

#[cfg(feature = "tracing")]
#[allow(dead_code)]
pub fn init_subscriber() {
    ::tracing_subscriber::fmt::init()
}

#[cfg(not(feature = "tracing"))]
mod noop {
    pub struct Span;

    impl Span {
        pub fn entered(&self) -> Self {
            Span
        }
    }

    macro_rules! span {
        ($($any:tt)*) => {{
            use crate::tracing::Span;
            Span
        }};
    }

    macro_rules! event {
        ($($any:tt)*) => {
            ()
        };
    }

    pub(crate) use {event, span};
}

#[cfg(not(feature = "tracing"))]
pub(crate) use noop::*;

#[cfg(not(feature = "tracing"))]
#[allow(dead_code)]
pub fn init_subscriber() {}
