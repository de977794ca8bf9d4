//! Linux I2C transport implementation

use super::RegisterBus;
use crate::error::Result;
use i2cdev::core::I2CDevice;
use i2cdev::linux::LinuxI2CDevice;

/// Register bus over a Linux i2c-dev character device
pub struct I2cBus {
    dev: LinuxI2CDevice,
    address: u16,
}

impl I2cBus {
    /// Open an I2C bus device node
    ///
    /// # Arguments
    /// * `path` - Bus device node (e.g., "/dev/i2c-1")
    /// * `address` - 7-bit device address (e.g., 0x68)
    pub fn open(path: &str, address: u16) -> Result<Self> {
        let dev = LinuxI2CDevice::new(path, address)?;

        log::info!("Opened I2C bus: {} at address {:#04x}", path, address);

        Ok(I2cBus { dev, address })
    }
}

impl RegisterBus for I2cBus {
    fn write_registers(&mut self, reg: u8, data: &[u8]) -> Result<()> {
        // The bus is shared; restate our slave address every transaction.
        self.dev.set_slave_address(self.address)?;

        let mut frame = Vec::with_capacity(1 + data.len());
        frame.push(reg);
        frame.extend_from_slice(data);
        self.dev.write(&frame)?;
        Ok(())
    }

    fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> Result<()> {
        self.dev.set_slave_address(self.address)?;

        self.dev.write(&[reg])?;
        self.dev.read(buf)?;
        Ok(())
    }
}
