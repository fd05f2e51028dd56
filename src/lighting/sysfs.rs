//! Lighting outputs through the kernel's sysfs GPIO and PWM interfaces.
//!
//! Paths are rooted at a configurable directory (normally `/sys/class`)
//! so the layout can be exercised against a temporary directory.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{DigitalPin, PwmChannel};
use crate::{Result, RigError};

fn write_attr(path: &Path, value: &str) -> Result<()> {
    fs::write(path, value).map_err(|e| RigError::lighting(path.display().to_string(), e))
}

/// Export a line through `<dir>/export` unless `node` already exists.
fn export(dir: &Path, index: u32, node: &Path) -> Result<()> {
    if node.exists() {
        return Ok(());
    }
    debug!(dir = %dir.display(), index, "exporting sysfs line");
    write_attr(&dir.join("export"), &index.to_string())
}

/// A GPIO line driven through `/sys/class/gpio`.
pub struct SysfsPin {
    line: u32,
    node: PathBuf,
}

impl SysfsPin {
    /// Export `pin + base` and set it as an output.
    ///
    /// `base` is the sysfs number of the first line of the header's GPIO chip.
    pub fn open(root: &Path, pin: u32, base: u32) -> Result<Self> {
        let line = pin + base;
        let dir = root.join("gpio");
        let node = dir.join(format!("gpio{line}"));
        export(&dir, line, &node)?;
        write_attr(&node.join("direction"), "out")?;
        Ok(Self { line, node })
    }
}

impl DigitalPin for SysfsPin {
    fn set(&mut self, high: bool) -> Result<()> {
        write_attr(&self.node.join("value"), if high { "1" } else { "0" })
    }

    fn label(&self) -> String {
        format!("gpio{}", self.line)
    }
}

/// One channel of a hardware PWM chip through `/sys/class/pwm`.
pub struct SysfsPwm {
    chip: u32,
    channel: u32,
    node: PathBuf,
    period_ns: u64,
}

impl SysfsPwm {
    pub fn open(root: &Path, chip: u32, channel: u32, frequency_hz: u32) -> Result<Self> {
        let dir = root.join("pwm").join(format!("pwmchip{chip}"));
        let node = dir.join(format!("pwm{channel}"));
        export(&dir, channel, &node)?;
        let period_ns = 1_000_000_000 / u64::from(frequency_hz.max(1));
        Ok(Self { chip, channel, node, period_ns })
    }

    fn duty_ns(&self, duty: f64) -> u64 {
        let duty = duty.clamp(0.0, 100.0);
        (self.period_ns as f64 * duty / 100.0).round() as u64
    }
}

impl PwmChannel for SysfsPwm {
    fn start(&mut self, duty: f64) -> Result<()> {
        // duty_cycle may never exceed period, so clear it before changing period
        write_attr(&self.node.join("duty_cycle"), "0")?;
        write_attr(&self.node.join("period"), &self.period_ns.to_string())?;
        write_attr(&self.node.join("duty_cycle"), &self.duty_ns(duty).to_string())?;
        write_attr(&self.node.join("enable"), "1")
    }

    fn change_duty_cycle(&mut self, duty: f64) -> Result<()> {
        write_attr(&self.node.join("duty_cycle"), &self.duty_ns(duty).to_string())
    }

    fn stop(&mut self) -> Result<()> {
        write_attr(&self.node.join("enable"), "0")
    }

    fn label(&self) -> String {
        format!("pwmchip{}/pwm{}", self.chip, self.channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(path: PathBuf) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn pin_exports_and_writes_value() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("gpio")).unwrap();
        // Pretend the kernel created the node on export
        fs::create_dir_all(root.path().join("gpio/gpio529")).unwrap();

        let mut pin = SysfsPin::open(root.path(), 17, 512).unwrap();
        assert_eq!(pin.label(), "gpio529");
        assert_eq!(read(root.path().join("gpio/gpio529/direction")), "out");
        pin.set(true).unwrap();
        assert_eq!(read(root.path().join("gpio/gpio529/value")), "1");
    }

    #[test]
    fn missing_gpio_tree_is_a_lighting_error() {
        let root = tempfile::tempdir().unwrap();
        let err = SysfsPin::open(root.path(), 17, 0).err().unwrap();
        assert!(matches!(err, RigError::Lighting { .. }));
    }

    #[test]
    fn pwm_duty_is_a_share_of_the_period() {
        let root = tempfile::tempdir().unwrap();
        let node = root.path().join("pwm/pwmchip0/pwm2");
        fs::create_dir_all(&node).unwrap();

        let mut pwm = SysfsPwm::open(root.path(), 0, 2, 10_000).unwrap();
        pwm.start(0.0).unwrap();
        assert_eq!(read(node.join("period")), "100000");
        assert_eq!(read(node.join("enable")), "1");
        pwm.change_duty_cycle(25.0).unwrap();
        assert_eq!(read(node.join("duty_cycle")), "25000");
        pwm.change_duty_cycle(150.0).unwrap();
        assert_eq!(read(node.join("duty_cycle")), "100000");
        pwm.stop().unwrap();
        assert_eq!(read(node.join("enable")), "0");
    }
}
