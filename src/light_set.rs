//! The abstract lamp inventory the machine acts on.
//!
//! Discovery and the concrete network transport live outside this crate;
//! the machine only sees these traits. Implementations own their thread
//! safety: a background refresh may repopulate the inventory while a
//! script runs, which is why lamps are looked up by name at the moment of
//! use and handed out as shared references.
//!
//! Collaborator settings such as `use_fakes`, `single_light_discover`,
//! `refresh_sleep_time`, `failure_sleep_time`, and `light_gc_time` are
//! consumed by the discovery and refresh implementations behind these
//! traits, not by the machine.

use std::sync::Arc;

/// A device color in raw units: `[hue, saturation, brightness, kelvin]`.
pub type Color = [u16; 4];

/// One addressable lamp. Durations are milliseconds, power levels are the
/// device's 0/65535 encoding, zone ranges are end-exclusive.
pub trait Lamp {
    fn name(&self) -> &str;
    fn group(&self) -> &str;
    fn location(&self) -> &str;
    fn multizone(&self) -> bool;
    /// Seconds since the lamp last responded to discovery.
    fn age(&self) -> f64;
    fn set_color(&self, color: Color, duration_ms: u32);
    fn set_power(&self, level: u16, duration_ms: u32);
    fn set_zone_color(&self, start: usize, end: usize, color: Color, duration_ms: u32);
    fn get_color(&self) -> Color;
    fn get_color_zones(&self, start: usize, end: usize) -> Vec<Color>;
    fn get_power(&self) -> u16;
}

/// The lamp inventory, including the implicit sets formed by group and
/// location labels.
pub trait LightSet {
    /// Populate or refresh the inventory. Returns false when discovery
    /// failed entirely.
    fn discover(&mut self) -> bool;
    fn light_names(&self) -> Vec<String>;
    fn group_names(&self) -> Vec<String>;
    fn location_names(&self) -> Vec<String>;
    fn get_light(&self, name: &str) -> Option<Arc<dyn Lamp>>;
    fn get_group(&self, name: &str) -> Option<Vec<Arc<dyn Lamp>>>;
    fn get_location(&self, name: &str) -> Option<Vec<Arc<dyn Lamp>>>;
    /// Broadcast to every lamp at once.
    fn set_color(&self, color: Color, duration_ms: u32);
    fn set_power(&self, level: u16, duration_ms: u32);
}
