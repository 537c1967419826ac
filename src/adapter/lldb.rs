use crate::adapter::rsp::{parse_key_values, parse_stop_reply, RspClient};
use crate::adapter::{DebugAdapter, StopReason};
use crate::disasm::Arch;
use crate::error::Error;
use crate::register::{le_value, Register, RegisterMap};
use crate::{ld_debug, muted_error};

/// Upper bound of `qRegisterInfo` queries, debugserver answers `E45` much earlier.
const MAX_REGISTERS: u32 = 512;

/// Register description reported by `qRegisterInfo<n>`.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterInfo {
    pub number: u32,
    pub name: String,
    pub bitsize: u32,
    pub generic: Option<String>,
}

impl RegisterInfo {
    fn parse(number: u32, reply: &str) -> Option<Self> {
        let kv = parse_key_values(reply);
        Some(Self {
            number,
            name: kv.get("name")?.to_string(),
            bitsize: kv.get("bitsize")?.parse().ok()?,
            generic: kv.get("generic").map(|g| g.to_string()),
        })
    }

    fn byte_size(&self) -> usize {
        (self.bitsize as usize).div_ceil(8)
    }
}

/// Adapter over lldb `debugserver` stub.
pub struct LldbAdapter {
    rsp: RspClient,
    arch: Arch,
    pid: Option<u32>,
    registers: Vec<RegisterInfo>,
    last_stop: Option<StopReason>,
}

impl LldbAdapter {
    pub fn connect(host: &str, port: u16, arch: Arch) -> Result<Self, Error> {
        let mut rsp = RspClient::connect(host, port)?;
        if rsp.request("QStartNoAckMode")? == "OK" {
            rsp.disable_ack();
        }

        let last_stop = parse_stop_reply(&rsp.request("?")?)?;
        let pid = muted_error!(rsp.request("qProcessInfo"), "qProcessInfo:").and_then(|reply| {
            let kv = parse_key_values(&reply);
            u32::from_str_radix(kv.get("pid")?, 16).ok()
        });

        let mut registers = vec![];
        for n in 0..MAX_REGISTERS {
            match rsp.request(&format!("qRegisterInfo{n:x}")) {
                Ok(reply) => match RegisterInfo::parse(n, &reply) {
                    Some(info) => registers.push(info),
                    None => break,
                },
                Err(Error::RemoteError(_)) => break,
                Err(e) => return Err(e),
            }
        }
        ld_debug!("debugserver reports {} registers", registers.len());

        Ok(Self {
            rsp,
            arch,
            pid,
            registers,
            last_stop: Some(last_stop),
        })
    }

    fn info_for(&self, register: Register) -> Result<&RegisterInfo, Error> {
        self.registers
            .iter()
            .find(|info| Register::from_stub_name(&info.name) == Some(register))
            .ok_or_else(|| Error::RegisterNotFound(register.to_string()))
    }

    fn read_by_number(&mut self, number: u32) -> Result<u64, Error> {
        let reply = self.rsp.request(&format!("p{number:x}"))?;
        let bytes =
            hex::decode(&reply).map_err(|e| Error::Protocol(format!("register reply: {e}")))?;
        Ok(le_value(&bytes))
    }

    fn resume(&mut self, packet: &str) -> Result<StopReason, Error> {
        let stop = self.rsp.resume(packet)?;
        self.last_stop = Some(stop);
        Ok(stop)
    }
}

impl DebugAdapter for LldbAdapter {
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
        let known: Vec<_> = self
            .registers
            .iter()
            .filter_map(|info| Some((Register::from_stub_name(&info.name)?, info.number)))
            .collect();

        let mut map = RegisterMap::default();
        for (register, number) in known {
            map.update(register, self.read_by_number(number)?);
        }
        Ok(map)
    }

    fn read_register(&mut self, register: Register) -> Result<u64, Error> {
        let number = self.info_for(register)?.number;
        self.read_by_number(number)
    }

    fn write_register(&mut self, register: Register, value: u64) -> Result<(), Error> {
        let info = self.info_for(register)?;
        let size = info.byte_size().min(8);
        let packet = format!(
            "P{:x}={}",
            info.number,
            hex::encode(&value.to_le_bytes()[..size])
        );
        self.rsp.request_ok(&packet, "register write")
    }

    fn pc(&mut self) -> Result<u64, Error> {
        let generic_pc = self
            .registers
            .iter()
            .find(|info| info.generic.as_deref() == Some("pc"))
            .map(|info| info.number);
        match generic_pc {
            Some(number) => self.read_by_number(number),
            None => self.read_register(Register::Rip),
        }
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

#[cfg(test)]
mod test {
    use super::RegisterInfo;

    #[test]
    fn test_register_info_parsing() {
        let info = RegisterInfo::parse(
            0x10,
            "name:rip;alt-name:pc;bitsize:64;offset:128;encoding:uint;format:hex;set:General Purpose Registers;gcc:16;dwarf:16;generic:pc;",
        )
        .unwrap();
        assert_eq!(info.number, 0x10);
        assert_eq!(info.name, "rip");
        assert_eq!(info.byte_size(), 8);
        assert_eq!(info.generic.as_deref(), Some("pc"));

        assert!(RegisterInfo::parse(0, "bitsize:64;").is_none());
    }
}
