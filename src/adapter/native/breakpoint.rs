use nix::libc::c_void;
use nix::sys;
use nix::unistd::Pid;
use std::cell::Cell;

const INT3: u64 = 0xCC;

/// Software breakpoint installed directly into debugee text.
pub struct Breakpoint {
    pub addr: u64,
    pid: Pid,
    saved_data: Cell<u8>,
    enabled: Cell<bool>,
}

impl Breakpoint {
    pub fn new(addr: u64, pid: Pid) -> Self {
        Self {
            addr,
            pid,
            saved_data: Default::default(),
            enabled: Default::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    /// Original byte replaced by `int3`.
    pub fn saved_byte(&self) -> u8 {
        self.saved_data.get()
    }

    fn as_ptr(&self) -> *mut c_void {
        self.addr as usize as *mut c_void
    }

    pub fn enable(&self) -> nix::Result<()> {
        let data = sys::ptrace::read(self.pid, self.as_ptr())?;
        self.saved_data.set((data & 0xff) as u8);
        let data_with_pb = (data & !0xff) as u64 | INT3;
        unsafe {
            sys::ptrace::write(self.pid, self.as_ptr(), data_with_pb as *mut c_void)?;
        }
        self.enabled.set(true);

        Ok(())
    }

    pub fn disable(&self) -> nix::Result<()> {
        let data = sys::ptrace::read(self.pid, self.as_ptr())? as u64;
        let restored: u64 = (data & !0xff) | self.saved_data.get() as u64;
        unsafe {
            sys::ptrace::write(self.pid, self.as_ptr(), restored as *mut c_void)?;
        }
        self.enabled.set(false);

        Ok(())
    }
}
