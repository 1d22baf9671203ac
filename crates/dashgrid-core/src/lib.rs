#![forbid(unsafe_code)]

//! Core primitives for dashgrid.
//!
//! # Role in dashgrid
//! `dashgrid-core` holds the pieces every other crate agrees on: grid-cell
//! geometry, the widget-type registry that owns size bounds, device classes,
//! and the time primitives (clocks and the keyed debouncer) that make the
//! asynchronous parts of the engine testable without sleeping.

pub mod clock;
pub mod debounce;
pub mod device;
pub mod geometry;
pub mod widget_type;

pub use clock::{Clock, ManualClock, SystemClock};
pub use debounce::Debouncer;
pub use device::DeviceClass;
pub use geometry::{GridRect, bounding_box};
pub use widget_type::{
    FALLBACK_MIN, WidgetTypeRegistry, WidgetTypeSpec, next_instance_id, split_instance_id,
    widget_type_of,
};
pub use web_time::Instant;
