//! Snapshot exporters: capture the current lamp state as text.
//!
//! These consume only the lamp-set traits, never the machine.
//! `ScriptSnapshot` produces a runnable script that restores what it saw;
//! `TextSnapshot` produces a human-readable table with the group and
//! location rosters.

use crate::instruction::Register;
use crate::light_set::{Color, Lamp, LightSet};
use crate::units;
use crate::value::Value;

/// Visitor over the lamp inventory. `generate` walks every lamp and feeds
/// the hooks.
pub trait Snapshot {
    fn start_snapshot(&mut self) {}
    fn start_light(&mut self, _light: &dyn Lamp) {}
    fn handle_color(&mut self, _color: Color) {}
    fn handle_power(&mut self, _power: u16) {}
    fn end_light(&mut self) {}
    fn end_snapshot(&mut self, _lights: &dyn LightSet) {}

    fn generate(&mut self, lights: &dyn LightSet)
    where
        Self: Sized,
    {
        self.start_snapshot();
        for name in lights.light_names() {
            if let Some(light) = lights.get_light(&name) {
                self.start_light(light.as_ref());
                self.handle_color(light.get_color());
                self.handle_power(light.get_power());
                self.end_light();
            }
        }
        self.end_snapshot(lights);
    }
}

fn logical_component(reg: Register, raw: u16) -> f64 {
    units::as_logical(reg, &Value::Integer(raw as i64))
        .as_f64()
        .unwrap_or(0.0)
}

/// Emits a script that reproduces each lamp's color and power.
#[derive(Debug, Default)]
pub struct ScriptSnapshot {
    light_name: String,
    power: u16,
    script: String,
}

impl ScriptSnapshot {
    pub fn new() -> Self {
        ScriptSnapshot::default()
    }

    pub fn text(&self) -> &str {
        &self.script
    }
}

impl Snapshot for ScriptSnapshot {
    fn start_snapshot(&mut self) {
        self.script = "duration 1500\n".to_string();
    }

    fn start_light(&mut self, light: &dyn Lamp) {
        self.light_name = light.name().to_string();
    }

    fn handle_color(&mut self, color: Color) {
        for (reg, raw) in [
            (Register::Hue, color[0]),
            (Register::Saturation, color[1]),
            (Register::Brightness, color[2]),
        ] {
            self.script
                .push_str(&format!("{} {:.2} ", reg, logical_component(reg, raw)));
        }
        self.script.push_str(&format!("kelvin {} ", color[3]));
    }

    fn handle_power(&mut self, power: u16) {
        self.power = power;
    }

    fn end_light(&mut self) {
        self.script.push_str(&format!("set \"{}\"\n", self.light_name));
        let command = if self.power > 0 { "on" } else { "off" };
        self.script
            .push_str(&format!("{} \"{}\"\n", command, self.light_name));
    }
}

const FIELD_WIDTH: usize = 12;

/// Emits an aligned table of lamp state plus the group and location
/// rosters.
#[derive(Debug, Default)]
pub struct TextSnapshot {
    text: String,
}

impl TextSnapshot {
    pub fn new() -> Self {
        TextSnapshot::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    fn add_field(&mut self, data: &str) {
        self.text.push_str(&format!("{:<width$}", data, width = FIELD_WIDTH));
    }
}

impl Snapshot for TextSnapshot {
    fn start_snapshot(&mut self) {
        self.text.clear();
        for heading in ["name", "hue", "saturation", "brightness", "kelvin", "power"] {
            self.add_field(heading);
        }
        self.text.push('\n');
        self.text.push_str(&"-".repeat(FIELD_WIDTH * 6));
        self.text.push('\n');
    }

    fn start_light(&mut self, light: &dyn Lamp) {
        let name = light.name().to_string();
        self.add_field(&name);
    }

    fn handle_color(&mut self, color: Color) {
        for (reg, raw) in [
            (Register::Hue, color[0]),
            (Register::Saturation, color[1]),
            (Register::Brightness, color[2]),
        ] {
            let text = format!("{:>6.2}", logical_component(reg, raw));
            self.add_field(&text);
        }
        let kelvin = format!("{:>6}", color[3]);
        self.add_field(&kelvin);
    }

    fn handle_power(&mut self, power: u16) {
        let text = format!("{:>5}", power);
        self.add_field(&text);
    }

    fn end_light(&mut self) {
        self.text.push('\n');
    }

    fn end_snapshot(&mut self, lights: &dyn LightSet) {
        for (heading, names) in [
            ("Groups", lights.group_names()),
            ("Locations", lights.location_names()),
        ] {
            self.text.push_str(&format!("\n{}\n", heading));
            self.text.push_str(&"-".repeat(17));
            self.text.push('\n');
            for name in names {
                self.text.push_str(&format!("{}\n", name));
                let members = match heading {
                    "Groups" => lights.get_group(&name),
                    _ => lights.get_location(&name),
                };
                for light in members.unwrap_or_default() {
                    self.text.push_str(&format!("   {}\n", light.name()));
                }
            }
        }
    }
}
