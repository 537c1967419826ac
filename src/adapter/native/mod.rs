//! In-process backend: the adapter executes the debugee itself and controls it with `ptrace`.

mod breakpoint;

use crate::adapter::native::breakpoint::Breakpoint;
use crate::adapter::{DebugAdapter, StopReason};
use crate::error::Error;
use crate::error::Error::{Ptrace, Waitpid};
use crate::ld_info;
use crate::register::{self, Register, RegisterMap};
use nix::libc::{c_long, c_void};
use nix::sys;
use nix::sys::ptrace::Options;
use nix::sys::signal::{Signal, SIGTRAP};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::mem;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Command;

const WORD: usize = mem::size_of::<c_long>();

/// Adapter that owns a ptrace-d debugee.
pub struct NativeAdapter {
    pid: Pid,
    breakpoints: HashMap<u64, Breakpoint>,
    last_stop: Option<StopReason>,
}

impl NativeAdapter {
    /// Execute `program` under ptrace, debugee is stopped right after `exec`.
    pub fn exec(program: &Path) -> Result<Self, Error> {
        let mut debugee_cmd = Command::new(program);
        unsafe {
            debugee_cmd.pre_exec(|| {
                sys::ptrace::traceme()?;
                Ok(())
            });
        }
        let child = debugee_cmd.spawn().map_err(|source| Error::SpawnFailed {
            path: program.to_path_buf(),
            source,
        })?;
        let pid = Pid::from_raw(child.id() as i32);

        match waitpid(pid, None).map_err(Waitpid)? {
            WaitStatus::Stopped(_, SIGTRAP) => {}
            WaitStatus::Exited(_, code) => return Err(Error::ProcessExited(code)),
            status => {
                return Err(Error::Protocol(format!(
                    "unexpected debugee status after exec: {status:?}"
                )))
            }
        }
        sys::ptrace::setoptions(pid, Options::PTRACE_O_EXITKILL).map_err(Ptrace)?;
        ld_info!("debugee {} started with pid {pid}", program.display());

        Ok(Self {
            pid,
            breakpoints: HashMap::new(),
            last_stop: Some(StopReason::Signal(SIGTRAP as i32)),
        })
    }

    fn ensure_alive(&self) -> Result<(), Error> {
        match self.last_stop {
            Some(StopReason::Exited(code)) => Err(Error::ProcessExited(code)),
            Some(StopReason::Terminated(_)) => Err(Error::ProcessExited(-1)),
            _ => Ok(()),
        }
    }

    fn enabled_breakpoint_at(&self, addr: u64) -> Option<&Breakpoint> {
        self.breakpoints.get(&addr).filter(|b| b.is_enabled())
    }

    fn wait(&mut self, rewind_breakpoint: bool) -> Result<StopReason, Error> {
        let stop = match waitpid(self.pid, None).map_err(Waitpid)? {
            WaitStatus::Exited(_, code) => StopReason::Exited(code),
            WaitStatus::Signaled(_, signal, _) => StopReason::Terminated(signal as i32),
            WaitStatus::Stopped(_, SIGTRAP) if rewind_breakpoint => {
                // pc points after executed int3
                let pc = self.read_register(Register::Rip)?;
                let brkpt_addr = pc.wrapping_sub(1);
                if self.enabled_breakpoint_at(brkpt_addr).is_some() {
                    self.write_register(Register::Rip, brkpt_addr)?;
                }
                StopReason::Signal(SIGTRAP as i32)
            }
            WaitStatus::Stopped(_, signal) => StopReason::Signal(signal as i32),
            _ => StopReason::Signal(SIGTRAP as i32),
        };
        self.last_stop = Some(stop);
        Ok(stop)
    }

    /// Execute one instruction, temporarily removing a breakpoint at current pc.
    fn single_step(&mut self) -> Result<StopReason, Error> {
        let pc = self.read_register(Register::Rip)?;
        let Some(brkpt) = self.enabled_breakpoint_at(pc) else {
            sys::ptrace::step(self.pid, None).map_err(Ptrace)?;
            return self.wait(false);
        };

        brkpt.disable().map_err(Ptrace)?;
        sys::ptrace::step(self.pid, None).map_err(Ptrace)?;
        let stop = self.wait(false)?;
        if !stop.is_terminal() {
            if let Some(brkpt) = self.breakpoints.get(&pc) {
                brkpt.enable().map_err(Ptrace)?;
            }
        }
        Ok(stop)
    }
}

impl DebugAdapter for NativeAdapter {
    fn pid(&self) -> Option<u32> {
        Some(self.pid.as_raw() as u32)
    }

    fn read_memory(&mut self, addr: u64, len: usize) -> Result<Vec<u8>, Error> {
        self.ensure_alive()?;
        let mut result = Vec::with_capacity(len);
        while result.len() < len {
            let word_addr = addr.wrapping_add(result.len() as u64);
            let value = match sys::ptrace::read(self.pid, word_addr as usize as *mut c_void) {
                Ok(value) => value,
                // tail of the range is unmapped
                Err(_) if !result.is_empty() => break,
                Err(e) => return Err(Ptrace(e)),
            };
            let remain = len - result.len();
            result.extend(value.to_ne_bytes().into_iter().take(remain));
        }

        // show original code instead of int3
        let end = addr.wrapping_add(result.len() as u64);
        for brkpt in self.breakpoints.values() {
            if brkpt.is_enabled() && brkpt.addr >= addr && brkpt.addr < end {
                result[(brkpt.addr - addr) as usize] = brkpt.saved_byte();
            }
        }
        Ok(result)
    }

    fn write_memory(&mut self, addr: u64, data: &[u8]) -> Result<(), Error> {
        self.ensure_alive()?;
        for (i, chunk) in data.chunks(WORD).enumerate() {
            let word_addr = (addr + (i * WORD) as u64) as usize as *mut c_void;
            let mut bytes = sys::ptrace::read(self.pid, word_addr)
                .map_err(Ptrace)?
                .to_ne_bytes();
            bytes[..chunk.len()].copy_from_slice(chunk);
            let word = c_long::from_ne_bytes(bytes);
            unsafe {
                sys::ptrace::write(self.pid, word_addr, word as *mut c_void).map_err(Ptrace)?;
            }
        }

        // code under an active breakpoint changed, save new byte and restore int3
        let end = addr + data.len() as u64;
        for brkpt in self.breakpoints.values() {
            if brkpt.is_enabled() && brkpt.addr >= addr && brkpt.addr < end {
                brkpt.enable().map_err(Ptrace)?;
            }
        }
        Ok(())
    }

    fn registers(&mut self) -> Result<RegisterMap, Error> {
        self.ensure_alive()?;
        let regs = sys::ptrace::getregs(self.pid).map_err(Ptrace)?;
        Ok(regs.into())
    }

    fn write_register(&mut self, register: Register, value: u64) -> Result<(), Error> {
        self.ensure_alive()?;
        let mut regs = sys::ptrace::getregs(self.pid).map_err(Ptrace)?;
        register::patch_user_regs(&mut regs, register, value);
        sys::ptrace::setregs(self.pid, regs).map_err(Ptrace)
    }

    fn cont(&mut self) -> Result<StopReason, Error> {
        self.ensure_alive()?;
        let pc = self.read_register(Register::Rip)?;
        if self.enabled_breakpoint_at(pc).is_some() {
            let stop = self.single_step()?;
            if stop.is_terminal() {
                return Ok(stop);
            }
        }
        sys::ptrace::cont(self.pid, None).map_err(Ptrace)?;
        self.wait(true)
    }

    fn step(&mut self) -> Result<StopReason, Error> {
        self.ensure_alive()?;
        self.single_step()
    }

    fn kill(&mut self) -> Result<(), Error> {
        if self.ensure_alive().is_err() {
            return Ok(());
        }
        sys::signal::kill(self.pid, Signal::SIGKILL).map_err(Ptrace)?;
        self.wait(false)?;
        Ok(())
    }

    fn set_breakpoint(&mut self, addr: u64) -> Result<(), Error> {
        self.ensure_alive()?;
        let pid = self.pid;
        let brkpt = self
            .breakpoints
            .entry(addr)
            .or_insert_with(|| Breakpoint::new(addr, pid));
        if !brkpt.is_enabled() {
            brkpt.enable().map_err(Ptrace)?;
        }
        Ok(())
    }

    fn remove_breakpoint(&mut self, addr: u64) -> Result<(), Error> {
        if let Some(brkpt) = self.breakpoints.remove(&addr) {
            if brkpt.is_enabled() && self.ensure_alive().is_ok() {
                brkpt.disable().map_err(Ptrace)?;
            }
        }
        Ok(())
    }

    fn last_stop(&self) -> Option<StopReason> {
        self.last_stop
    }
}

#[cfg(test)]
mod test {
    use super::NativeAdapter;
    use crate::adapter::{DebugAdapter, StopReason};
    use serial_test::serial;
    use std::path::Path;

    #[test]
    #[serial]
    fn test_breakpoint_is_hidden_from_reads() {
        let mut adapter = NativeAdapter::exec(Path::new("/bin/true")).unwrap();
        assert!(adapter.pid().is_some());

        let pc = adapter.pc().unwrap();
        let code = adapter.read_memory(pc, 8).unwrap();
        assert_eq!(code.len(), 8);

        adapter.set_breakpoint(pc).unwrap();
        assert_eq!(adapter.read_memory(pc, 8).unwrap(), code);
        adapter.remove_breakpoint(pc).unwrap();
        assert_eq!(adapter.read_memory(pc, 8).unwrap(), code);

        assert_eq!(adapter.cont().unwrap(), StopReason::Exited(0));
        assert!(adapter.read_memory(pc, 1).is_err());
        adapter.kill().unwrap();
    }
}
