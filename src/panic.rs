//! Utilities for rendering opaque payloads.
//!
//! Panics caught around the application task and unexpected values returned
//! by it are both `Box<dyn Any + Send>`; these helpers turn them into
//! something loggable.

use std::{any::Any, fmt};

/// Wrapper that formats an opaque payload when logged or displayed.
///
/// The payload is downcast to `String` or `&'static str` if possible and falls
/// back to `Debug` formatting otherwise.
///
/// ```
/// use wsbridge::panic::format_payload;
/// let boom: Box<dyn std::any::Any + Send> = Box::new("boom");
/// assert_eq!(format_payload(boom.as_ref()).to_string(), "boom");
/// let owned: Box<dyn std::any::Any + Send> = Box::new(String::from("boom"));
/// assert_eq!(format_payload(owned.as_ref()).to_string(), "boom");
/// let number: Box<dyn std::any::Any + Send> = Box::new(5_u32);
/// assert!(format_payload(number.as_ref()).to_string().contains("Any"));
/// ```
#[derive(Debug)]
#[must_use]
pub struct PayloadMessage<'a>(&'a (dyn Any + Send));

impl fmt::Display for PayloadMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.0.downcast_ref::<String>() {
            f.write_str(s)
        } else if let Some(s) = self.0.downcast_ref::<&'static str>() {
            f.write_str(s)
        } else {
            write!(f, "{:?}", self.0)
        }
    }
}

/// Create a [`PayloadMessage`] for the given payload.
pub fn format_payload(payload: &(dyn Any + Send)) -> PayloadMessage<'_> { PayloadMessage(payload) }
