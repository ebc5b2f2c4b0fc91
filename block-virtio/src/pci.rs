//! Legacy PCI configuration-space access (port I/O at 0xCF8/0xCFC). Used
//! only for device discovery and BAR0/command-register setup; the device
//! itself is then driven entirely through its I/O-space BAR.

use x86_64::instructions::port::Port;

const CONFIG_ADDRESS: u16 = 0xCF8;
const CONFIG_DATA: u16 = 0xCFC;

fn address(bus: u8, device: u8, function: u8, offset: u8) -> u32 {
    (1u32 << 31)
        | ((bus as u32) << 16)
        | ((device as u32) << 11)
        | ((function as u32) << 8)
        | (offset as u32 & 0xFC)
}

pub fn read32(bus: u8, device: u8, function: u8, offset: u8) -> u32 {
    let mut addr_port: Port<u32> = Port::new(CONFIG_ADDRESS);
    let mut data_port: Port<u32> = Port::new(CONFIG_DATA);
    unsafe {
        addr_port.write(address(bus, device, function, offset));
        data_port.read()
    }
}

pub fn write32(bus: u8, device: u8, function: u8, offset: u8, value: u32) {
    let mut addr_port: Port<u32> = Port::new(CONFIG_ADDRESS);
    let mut data_port: Port<u32> = Port::new(CONFIG_DATA);
    unsafe {
        addr_port.write(address(bus, device, function, offset));
        data_port.write(value);
    }
}

pub fn read16(bus: u8, device: u8, function: u8, offset: u8) -> u16 {
    let value = read32(bus, device, function, offset);
    ((value >> ((offset & 2) * 8)) & 0xFFFF) as u16
}

pub fn write16(bus: u8, device: u8, function: u8, offset: u8, value: u16) {
    let original = read32(bus, device, function, offset);
    let shift = (offset & 2) * 8;
    let mask = 0xFFFFu32 << shift;
    let new_value = (original & !mask) | ((value as u32) << shift);
    write32(bus, device, function, offset, new_value);
}

/// Scans every bus/device/function for a device matching `vendor`/`device_id`.
/// Returns its `(bus, device, function)` triple.
pub fn find_device(vendor: u16, device_id: u16) -> Option<(u8, u8, u8)> {
    for bus in 0..32u8 {
        for device in 0..32u8 {
            for function in 0..8u8 {
                let v = read16(bus, device, function, 0x00);
                if v == 0xFFFF {
                    continue;
                }
                let d = read16(bus, device, function, 0x02);
                if v == vendor && d == device_id {
                    return Some((bus, device, function));
                }
            }
        }
    }
    None
}
