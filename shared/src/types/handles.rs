//! Opaque driver handle types
//!
//! The tracer never dereferences driver objects; it only keys bookkeeping
//! tables by their handles. Each handle is an opaque 64-bit value supplied by
//! the driver shim, wrapped in its own newtype so the different object kinds
//! cannot be mixed up at a call site.

use serde::{Deserialize, Serialize};

macro_rules! handle_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub u64);

        impl $name {
            /// Wrap a raw driver handle value.
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// The raw handle value.
            pub const fn raw(self) -> u64 {
                self.0
            }
        }
    };
}

handle_type!(
    /// A physical device or one of its sub-devices.
    DeviceHandle
);
handle_type!(
    /// A driver context owning command lists and signals.
    ContextHandle
);
handle_type!(
    /// A command list (batched or immediate).
    CommandListHandle
);
handle_type!(
    /// A command queue accepting command-list submissions.
    QueueHandle
);
handle_type!(
    /// A completion signal attached to a submitted operation.
    SignalHandle
);
handle_type!(
    /// A compiled kernel object.
    KernelHandle
);
handle_type!(
    /// An image object.
    ImageHandle
);

impl CommandListHandle {
    /// An immediate command list submits directly to the device and doubles
    /// as the queue identity for the calls it produces.
    pub const fn as_queue(self) -> QueueHandle {
        QueueHandle(self.0)
    }
}
