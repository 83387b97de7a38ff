//! Recording fakes for the external collaborators.
//!
//! `FakeLamp` keeps the exact list of device calls it received, which is
//! what the end-to-end tests assert on. The fake clock and terminal input
//! record instead of blocking, so scripts with `wait` and `pause` run
//! instantly under test.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::clock::Clock;
use crate::console::TermInput;
use crate::light_set::{Color, Lamp, LightSet};
use crate::time_pattern::TimePattern;

/// One recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum LampCall {
    SetColor(Color, u32),
    SetPower(u16, u32),
    SetZoneColor(usize, usize, Color, u32),
}

pub struct FakeLamp {
    name: String,
    group: String,
    location: String,
    zone_count: usize,
    color: Mutex<Color>,
    power: Mutex<u16>,
    calls: Mutex<Vec<LampCall>>,
}

impl FakeLamp {
    pub fn new(name: &str, group: &str, location: &str) -> Self {
        FakeLamp {
            name: name.to_string(),
            group: group.to_string(),
            location: location.to_string(),
            zone_count: 0,
            color: Mutex::new([0; 4]),
            power: Mutex::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_zones(name: &str, group: &str, location: &str, zone_count: usize) -> Self {
        FakeLamp {
            zone_count,
            ..FakeLamp::new(name, group, location)
        }
    }

    /// Seed the color reported by `get_color`.
    pub fn set_current_color(&self, color: Color) {
        *self.color.lock() = color;
    }

    /// The device calls received so far, in order.
    pub fn calls(&self) -> Vec<LampCall> {
        self.calls.lock().clone()
    }
}

impl Lamp for FakeLamp {
    fn name(&self) -> &str {
        &self.name
    }

    fn group(&self) -> &str {
        &self.group
    }

    fn location(&self) -> &str {
        &self.location
    }

    fn multizone(&self) -> bool {
        self.zone_count > 0
    }

    fn age(&self) -> f64 {
        0.0
    }

    fn set_color(&self, color: Color, duration_ms: u32) {
        *self.color.lock() = color;
        self.calls.lock().push(LampCall::SetColor(color, duration_ms));
    }

    fn set_power(&self, level: u16, duration_ms: u32) {
        *self.power.lock() = level;
        self.calls.lock().push(LampCall::SetPower(level, duration_ms));
    }

    fn set_zone_color(&self, start: usize, end: usize, color: Color, duration_ms: u32) {
        self.calls
            .lock()
            .push(LampCall::SetZoneColor(start, end, color, duration_ms));
    }

    fn get_color(&self) -> Color {
        *self.color.lock()
    }

    fn get_color_zones(&self, start: usize, end: usize) -> Vec<Color> {
        vec![*self.color.lock(); end.saturating_sub(start)]
    }

    fn get_power(&self) -> u16 {
        *self.power.lock()
    }
}

/// A fixed inventory of fake lamps. Group and location membership comes
/// from the lamp labels, like the real discovery does.
#[derive(Default)]
pub struct FakeLightSet {
    lamps: Vec<Arc<FakeLamp>>,
}

impl FakeLightSet {
    pub fn new() -> Self {
        FakeLightSet::default()
    }

    pub fn add(&mut self, lamp: FakeLamp) {
        self.lamps.push(Arc::new(lamp));
    }

    /// The standard test inventory: a three-lamp pole, two pieces of
    /// furniture, and a multi-zone strip, all at home.
    pub fn test_inventory() -> Self {
        let mut lights = FakeLightSet::new();
        lights.add(FakeLamp::new("Top", "Pole", "Home"));
        lights.add(FakeLamp::new("Middle", "Pole", "Home"));
        lights.add(FakeLamp::new("Bottom", "Pole", "Home"));
        lights.add(FakeLamp::new("Table", "Furniture", "Home"));
        lights.add(FakeLamp::new("Chair", "Furniture", "Home"));
        lights.add(FakeLamp::with_zones("Strip", "Furniture", "Home", 16));
        lights
    }

    pub fn lamp(&self, name: &str) -> Option<&Arc<FakeLamp>> {
        self.lamps.iter().find(|lamp| lamp.name() == name)
    }

    /// Shorthand for the call list of one lamp.
    pub fn calls_for(&self, name: &str) -> Vec<LampCall> {
        self.lamp(name).map(|lamp| lamp.calls()).unwrap_or_default()
    }
}

impl LightSet for FakeLightSet {
    fn discover(&mut self) -> bool {
        true
    }

    fn light_names(&self) -> Vec<String> {
        self.lamps.iter().map(|lamp| lamp.name().to_string()).collect()
    }

    fn group_names(&self) -> Vec<String> {
        let names: BTreeSet<String> = self
            .lamps
            .iter()
            .map(|lamp| lamp.group().to_string())
            .collect();
        names.into_iter().collect()
    }

    fn location_names(&self) -> Vec<String> {
        let names: BTreeSet<String> = self
            .lamps
            .iter()
            .map(|lamp| lamp.location().to_string())
            .collect();
        names.into_iter().collect()
    }

    fn get_light(&self, name: &str) -> Option<Arc<dyn Lamp>> {
        self.lamp(name).map(|lamp| lamp.clone() as Arc<dyn Lamp>)
    }

    fn get_group(&self, name: &str) -> Option<Vec<Arc<dyn Lamp>>> {
        let members: Vec<Arc<dyn Lamp>> = self
            .lamps
            .iter()
            .filter(|lamp| lamp.group() == name)
            .map(|lamp| lamp.clone() as Arc<dyn Lamp>)
            .collect();
        if members.is_empty() {
            None
        } else {
            Some(members)
        }
    }

    fn get_location(&self, name: &str) -> Option<Vec<Arc<dyn Lamp>>> {
        let members: Vec<Arc<dyn Lamp>> = self
            .lamps
            .iter()
            .filter(|lamp| lamp.location() == name)
            .map(|lamp| lamp.clone() as Arc<dyn Lamp>)
            .collect();
        if members.is_empty() {
            None
        } else {
            Some(members)
        }
    }

    fn set_color(&self, color: Color, duration_ms: u32) {
        for lamp in &self.lamps {
            lamp.set_color(color, duration_ms);
        }
    }

    fn set_power(&self, level: u16, duration_ms: u32) {
        for lamp in &self.lamps {
            lamp.set_power(level, duration_ms);
        }
    }
}

/// Records sleep requests instead of sleeping.
#[derive(Debug, Default)]
pub struct FakeClock {
    pub started: bool,
    pub stopped: bool,
    pub pauses: Vec<f64>,
    pub waits: Vec<TimePattern>,
}

impl Clock for FakeClock {
    fn start(&mut self) {
        self.started = true;
    }

    fn stop(&mut self) {
        self.stopped = true;
    }

    fn pause_for(&mut self, seconds: f64) {
        self.pauses.push(seconds);
    }

    fn wait_until(&mut self, pattern: &TimePattern) {
        self.waits.push(pattern.clone());
    }
}

/// Yields a scripted character sequence.
#[derive(Debug, Default)]
pub struct FakeTermInput {
    chars: Vec<char>,
    next: usize,
}

impl FakeTermInput {
    pub fn new(input: &str) -> Self {
        FakeTermInput {
            chars: input.chars().collect(),
            next: 0,
        }
    }
}

impl TermInput for FakeTermInput {
    fn read_char(&mut self) -> Option<char> {
        let c = self.chars.get(self.next).copied();
        self.next += 1;
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_from_labels() {
        let lights = FakeLightSet::test_inventory();
        let pole = lights.get_group("Pole").unwrap();
        assert_eq!(pole.len(), 3);
        assert!(lights.get_group("Attic").is_none());
        assert_eq!(lights.get_location("Home").unwrap().len(), 6);
        assert_eq!(lights.group_names(), vec!["Furniture", "Pole"]);
    }

    #[test]
    fn test_lamp_records_calls() {
        let lights = FakeLightSet::test_inventory();
        let lamp = lights.get_light("Top").unwrap();
        lamp.set_color([1, 2, 3, 4], 5);
        lamp.set_power(65535, 0);
        assert_eq!(
            lights.calls_for("Top"),
            vec![
                LampCall::SetColor([1, 2, 3, 4], 5),
                LampCall::SetPower(65535, 0),
            ]
        );
        assert_eq!(lights.calls_for("Bottom"), vec![]);
    }

    #[test]
    fn test_broadcast_reaches_every_lamp() {
        let lights = FakeLightSet::test_inventory();
        lights.set_power(65535, 0);
        for name in lights.light_names() {
            assert_eq!(lights.calls_for(&name), vec![LampCall::SetPower(65535, 0)]);
        }
    }
}
