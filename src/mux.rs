//! Antenna multiplexer selecting the active shelf

use std::process::Command;

use log::{trace, warn};

/// Selects which shelf's antennas are connected to the reader
pub trait Multiplexer {
    /// Route the reader to `shelf` (1-based)
    fn select_shelf(&mut self, shelf: u8);
}

/// A GPIO line driving one RF switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchLine {
    pub chip: u8,
    pub line: u32,
}

/// States of the two RF switches for a shelf, `None` for unknown shelves
pub fn switch_states(shelf: u8) -> Option<(u8, u8)> {
    match shelf {
        1 => Some((0, 0)),
        2 => Some((0, 1)),
        3 => Some((1, 0)),
        4 => Some((1, 1)),
        _ => None,
    }
}

/// Multiplexer driven through the `gpioset` command line tool
#[derive(Debug, Clone)]
pub struct GpiosetMultiplexer {
    program: String,
    first: SwitchLine,
    second: SwitchLine,
}

impl GpiosetMultiplexer {
    pub fn new(first: SwitchLine, second: SwitchLine) -> Self {
        Self {
            program: "gpioset".into(),
            first,
            second,
        }
    }

    /// Use a different `gpioset` binary, e.g. `/system/bin/gpioset`
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn set_line(&self, switch: SwitchLine, value: u8) {
        let result = Command::new(&self.program)
            .arg(format!("gpiochip{}", switch.chip))
            .arg(format!("{}={}", switch.line, value))
            .status();

        match result {
            Ok(status) if status.success() => {}
            Ok(status) => warn!(
                "{} gpiochip{} {}={} exited with {}",
                self.program, switch.chip, switch.line, value, status
            ),
            Err(e) => warn!("Failed to run {}: {}", self.program, e),
        }
    }
}

impl Multiplexer for GpiosetMultiplexer {
    fn select_shelf(&mut self, shelf: u8) {
        trace!("Set shelf to {}", shelf);

        match switch_states(shelf) {
            Some((first, second)) => {
                self.set_line(self.first, first);
                self.set_line(self.second, second);
            }
            None => warn!("No switch mapping for shelf {}", shelf),
        }
    }
}
