#![no_std]

pub mod port_dbg;
