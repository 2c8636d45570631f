//! In-memory I2C bus for driver tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::hw_trait::i2c::{I2c, I2cError};
use crate::hw_trait::Result;

/// One bus operation as seen by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Access {
    Write { addr: u8, data: Vec<u8> },
    Read { addr: u8, len: usize },
    WriteRead { addr: u8, write: Vec<u8>, len: usize },
}

#[derive(Default)]
struct State {
    /// Register file per (device, register).
    regs: HashMap<(u8, u8), u8>,
    /// Register pointer per device.
    pointer: HashMap<u8, u8>,
    /// Fixed replies per (device, command), for command-oriented devices
    /// such as PMBus regulators whose data words overlap.
    responses: HashMap<(u8, u8), Vec<u8>>,
    /// Devices with a single control register and no pointer.
    single_register: HashSet<u8>,
    failing: HashSet<u8>,
    /// Fail the n-th access (0-based), counting all devices.
    fail_at: Option<usize>,
    log: Vec<Access>,
}

/// Register-file backed bus.
///
/// A write sets the device's register pointer from its first byte and
/// stores the remaining bytes from there on, incrementing the pointer.
/// Reads return bytes from the pointer on. Clones share state, so a test
/// can keep one handle while a driver owns another.
#[derive(Clone, Default)]
pub(crate) struct MockI2c {
    bus: u8,
    state: Arc<Mutex<State>>,
}

impl MockI2c {
    pub(crate) fn new(bus: u8) -> Self {
        Self {
            bus,
            state: Arc::default(),
        }
    }

    pub(crate) fn set_reg(&self, addr: u8, reg: u8, value: u8) {
        self.state.lock().unwrap().regs.insert((addr, reg), value);
    }

    pub(crate) fn set_regs(&self, addr: u8, start: u8, values: &[u8]) {
        for (i, v) in values.iter().enumerate() {
            self.set_reg(addr, start.wrapping_add(i as u8), *v);
        }
    }

    pub(crate) fn reg(&self, addr: u8, reg: u8) -> u8 {
        self.state
            .lock()
            .unwrap()
            .regs
            .get(&(addr, reg))
            .copied()
            .unwrap_or(0)
    }

    /// Answer reads after command `code` with `bytes`.
    pub(crate) fn set_response(&self, addr: u8, code: u8, bytes: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .responses
            .insert((addr, code), bytes.to_vec());
    }

    /// Treat `addr` as a device with one register and no pointer byte.
    pub(crate) fn single_register(&self, addr: u8) {
        self.state.lock().unwrap().single_register.insert(addr);
    }

    /// Make every access to `addr` fail.
    pub(crate) fn fail_device(&self, addr: u8) {
        self.state.lock().unwrap().failing.insert(addr);
    }

    /// Make the n-th access from now fail.
    pub(crate) fn fail_access(&self, n: usize) {
        let mut state = self.state.lock().unwrap();
        state.fail_at = Some(state.log.len() + n);
    }

    pub(crate) fn log(&self) -> Vec<Access> {
        self.state.lock().unwrap().log.clone()
    }

    pub(crate) fn access_count(&self) -> usize {
        self.state.lock().unwrap().log.len()
    }

    /// Payloads of all plain writes, in order.
    pub(crate) fn writes(&self) -> Vec<Vec<u8>> {
        self.log()
            .into_iter()
            .filter_map(|a| match a {
                Access::Write { data, .. } => Some(data),
                _ => None,
            })
            .collect()
    }

    fn check(&self, state: &mut State, access: Access) -> Result<()> {
        let addr = match &access {
            Access::Write { addr, .. } | Access::Read { addr, .. } | Access::WriteRead { addr, .. } => *addr,
        };
        let index = state.log.len();
        state.log.push(access);
        if state.failing.contains(&addr) || state.fail_at == Some(index) {
            return Err(I2cError::Bus {
                port: self.bus,
                response: format!("ERROR: Error flags from I2C the master {}: 0x00000004", self.bus),
            }
            .into());
        }
        Ok(())
    }
}

fn store(state: &mut State, addr: u8, data: &[u8]) {
    if state.single_register.contains(&addr) {
        if let Some(v) = data.first() {
            state.regs.insert((addr, 0), *v);
        }
        return;
    }
    let Some((&pointer, values)) = data.split_first() else {
        return;
    };
    let mut reg = pointer;
    for v in values {
        state.regs.insert((addr, reg), *v);
        reg = reg.wrapping_add(1);
    }
    state.pointer.insert(addr, reg);
}

fn load(state: &mut State, addr: u8, buffer: &mut [u8]) {
    if state.single_register.contains(&addr) {
        buffer.fill(state.regs.get(&(addr, 0)).copied().unwrap_or(0));
        return;
    }
    let mut reg = state.pointer.get(&addr).copied().unwrap_or(0);
    if let Some(reply) = state.responses.get(&(addr, reg)) {
        for (i, b) in buffer.iter_mut().enumerate() {
            *b = reply.get(i).copied().unwrap_or(0);
        }
        return;
    }
    for b in buffer.iter_mut() {
        *b = state.regs.get(&(addr, reg)).copied().unwrap_or(0);
        reg = reg.wrapping_add(1);
    }
    state.pointer.insert(addr, reg);
}

#[async_trait]
impl I2c for MockI2c {
    fn bus_index(&self) -> u8 {
        self.bus
    }

    async fn write(&mut self, addr: u8, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        self.check(&mut state, Access::Write { addr, data: data.to_vec() })?;
        store(&mut state, addr, data);
        Ok(())
    }

    async fn read(&mut self, addr: u8, buffer: &mut [u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        self.check(&mut state, Access::Read { addr, len: buffer.len() })?;
        load(&mut state, addr, buffer);
        Ok(())
    }

    async fn write_read(&mut self, addr: u8, write: &[u8], read: &mut [u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        self.check(
            &mut state,
            Access::WriteRead {
                addr,
                write: write.to_vec(),
                len: read.len(),
            },
        )?;
        store(&mut state, addr, write);
        load(&mut state, addr, read);
        Ok(())
    }
}
