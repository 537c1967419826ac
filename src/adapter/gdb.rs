use crate::adapter::rsp::{parse_stop_reply, RspClient};
use crate::adapter::{DebugAdapter, StopReason};
use crate::disasm::Arch;
use crate::error::Error;
use crate::ld_debug;
use crate::muted_error;
use crate::register::{Register, RegisterMap, GDB_X86_64_LAYOUT};

/// Adapter over a `gdbserver` stub.
pub struct GdbAdapter {
    rsp: RspClient,
    arch: Arch,
    pid: Option<u32>,
    last_stop: Option<StopReason>,
}

/// Parse `qC` reply: `QCp<pid>.<tid>` in multiprocess mode or `QC<tid>`.
fn parse_current_thread(reply: &str) -> Option<u32> {
    let id = reply.strip_prefix("QC")?;
    let pid = match id.strip_prefix('p') {
        Some(multiprocess) => multiprocess.split('.').next()?,
        None => id,
    };
    u32::from_str_radix(pid, 16).ok()
}

impl GdbAdapter {
    pub fn connect(host: &str, port: u16, arch: Arch) -> Result<Self, Error> {
        let mut rsp = RspClient::connect(host, port)?;
        let features = rsp.request("qSupported:multiprocess+;swbreak+;hwbreak+")?;
        ld_debug!("gdbserver features: {features}");

        let last_stop = parse_stop_reply(&rsp.request("?")?)?;
        let pid = muted_error!(rsp.request("qC"), "qC:").and_then(|r| parse_current_thread(&r));

        Ok(Self {
            rsp,
            arch,
            pid,
            last_stop: Some(last_stop),
        })
    }

    fn check_layout(&self) -> Result<(), Error> {
        if self.arch != Arch::X86_64 {
            return Err(Error::Unsupported("gdbserver register layout of this architecture"));
        }
        Ok(())
    }

    fn resume(&mut self, packet: &str) -> Result<StopReason, Error> {
        let stop = self.rsp.resume(packet)?;
        self.last_stop = Some(stop);
        Ok(stop)
    }
}

impl DebugAdapter for GdbAdapter {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn read_memory(&mut self, addr: u64, len: usize) -> Result<Vec<u8>, Error> {
        self.rsp.read_memory(addr, len)
    }

    fn write_memory(&mut self, addr: u64, data: &[u8]) -> Result<(), Error> {
        self.rsp.write_memory(addr, data)
    }

    fn registers(&mut self) -> Result<RegisterMap, Error> {
        self.check_layout()?;
        let reply = self.rsp.request("g")?;
        let block =
            hex::decode(&reply).map_err(|e| Error::Protocol(format!("register reply: {e}")))?;
        Ok(RegisterMap::from_block(&block, &GDB_X86_64_LAYOUT))
    }

    fn write_register(&mut self, register: Register, value: u64) -> Result<(), Error> {
        self.check_layout()?;
        let (regno, size) = GDB_X86_64_LAYOUT
            .iter()
            .enumerate()
            .find_map(|(n, (r, size))| (*r == register).then_some((n, *size)))
            .ok_or_else(|| Error::RegisterNotFound(register.to_string()))?;
        let bytes = &value.to_le_bytes()[..size];
        self.rsp
            .request_ok(&format!("P{regno:x}={}", hex::encode(bytes)), "register write")
    }

    fn cont(&mut self) -> Result<StopReason, Error> {
        self.resume("c")
    }

    fn step(&mut self) -> Result<StopReason, Error> {
        self.resume("s")
    }

    fn kill(&mut self) -> Result<(), Error> {
        self.rsp.kill()?;
        self.last_stop = Some(StopReason::Terminated(9));
        Ok(())
    }

    fn set_breakpoint(&mut self, addr: u64) -> Result<(), Error> {
        self.rsp.insert_breakpoint(addr, self.arch.breakpoint_kind())
    }

    fn remove_breakpoint(&mut self, addr: u64) -> Result<(), Error> {
        self.rsp.remove_breakpoint(addr, self.arch.breakpoint_kind())
    }

    fn last_stop(&self) -> Option<StopReason> {
        self.last_stop
    }
}
