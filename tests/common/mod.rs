#![allow(dead_code)]

use livedis::adapter::rsp::frame;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Start of the memory region served by [`FakeStub`].
pub const MEMORY_BASE: u64 = 0x1000;
/// push rbp; mov rbp, rsp; nop; nop; ret
pub const CODE: [u8; 7] = [0x55, 0x48, 0x89, 0xe5, 0x90, 0x90, 0xc3];

/// Packets received by the stub, in order.
pub type PacketLog = Arc<Mutex<Vec<String>>>;

/// Minimal `gdbserver` (and `debugserver`) imitation serving a single client.
pub struct FakeStub {
    pub port: u16,
    pub log: PacketLog,
    handle: JoinHandle<()>,
}

impl FakeStub {
    /// Listen on a free localhost port right now.
    pub fn start(pid: u32) -> Self {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        Self::serve(listener, pid)
    }

    /// Start listening on `port` after `delay`.
    pub fn start_delayed(port: u16, delay: Duration, pid: u32) -> JoinHandle<PacketLog> {
        thread::spawn(move || {
            thread::sleep(delay);
            let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port)).unwrap();
            let stub = Self::serve(listener, pid);
            stub.handle.join().unwrap();
            stub.log
        })
    }

    fn serve(listener: TcpListener, pid: u32) -> Self {
        let port = listener.local_addr().unwrap().port();
        let log = PacketLog::default();
        let thread_log = log.clone();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut state = StubState::new(pid);
            serve_client(stream, &mut state, &thread_log);
        });
        Self { port, log, handle }
    }

    /// Wait until client disconnects, return received packets.
    pub fn join(self) -> Vec<String> {
        self.handle.join().unwrap();
        let log = self.log.lock().unwrap();
        log.clone()
    }
}

struct StubState {
    pid: u32,
    /// Set after `QStartNoAckMode`, no `+` is sent from then on.
    no_ack: bool,
    memory: Vec<u8>,
    breakpoints: BTreeMap<u64, u8>,
    rip: u64,
}

impl StubState {
    fn new(pid: u32) -> Self {
        let mut memory = CODE.to_vec();
        memory.resize(0x100, 0x90);
        Self {
            pid,
            no_ack: false,
            memory,
            breakpoints: BTreeMap::new(),
            rip: MEMORY_BASE,
        }
    }

    fn offset(&self, addr: u64) -> Option<usize> {
        let offset = addr.checked_sub(MEMORY_BASE)? as usize;
        (offset < self.memory.len()).then_some(offset)
    }

    fn registers(&self) -> String {
        let mut block = vec![0u8; 16 * 8];
        block.extend_from_slice(&self.rip.to_le_bytes());
        block.extend_from_slice(&[0u8; 7 * 4]);
        hex::encode(block)
    }

    /// Reply to a packet, [`None`] closes the connection.
    fn reply(&mut self, packet: &str) -> Option<String> {
        let reply = match packet.as_bytes().first()? {
            b'q' if packet.starts_with("qSupported") => "PacketSize=4000;swbreak+".to_string(),
            b'q' if packet == "qC" => format!("QCp{:x}.{:x}", self.pid, self.pid),
            b'q' if packet == "qProcessInfo" => {
                format!("pid:{:x};parent-pid:1;ostype:macosx;ptrsize:8;", self.pid)
            }
            b'q' if packet.starts_with("qRegisterInfo") => {
                match u32::from_str_radix(&packet["qRegisterInfo".len()..], 16).ok()? {
                    0 => "name:rax;bitsize:64;offset:0;encoding:uint;format:hex;set:General Purpose Registers;".to_string(),
                    1 => "name:rip;alt-name:pc;bitsize:64;offset:128;encoding:uint;format:hex;set:General Purpose Registers;generic:pc;".to_string(),
                    _ => "E45".to_string(),
                }
            }
            b'Q' if packet == "QStartNoAckMode" => "OK".to_string(),
            b'?' => "S05".to_string(),
            b'g' => self.registers(),
            b'p' => match u32::from_str_radix(&packet[1..], 16).ok()? {
                0 => hex::encode(0u64.to_le_bytes()),
                1 => hex::encode(self.rip.to_le_bytes()),
                _ => "E45".to_string(),
            },
            b'm' => {
                let (addr, len) = packet[1..].split_once(',')?;
                let addr = u64::from_str_radix(addr, 16).ok()?;
                let len = usize::from_str_radix(len, 16).ok()?;
                match self.offset(addr) {
                    Some(start) => {
                        let end = (start + len).min(self.memory.len());
                        hex::encode(&self.memory[start..end])
                    }
                    None => "E14".to_string(),
                }
            }
            b'M' => {
                let (header, data) = packet[1..].split_once(':')?;
                let (addr, _) = header.split_once(',')?;
                let addr = u64::from_str_radix(addr, 16).ok()?;
                let data = hex::decode(data).ok()?;
                match self.offset(addr) {
                    Some(start) if start + data.len() <= self.memory.len() => {
                        self.memory[start..start + data.len()].copy_from_slice(&data);
                        "OK".to_string()
                    }
                    _ => "E14".to_string(),
                }
            }
            b'Z' | b'z' => {
                let addr = packet[3..].split(',').next()?;
                let addr = u64::from_str_radix(addr, 16).ok()?;
                if packet.starts_with('Z') {
                    self.breakpoints.insert(addr, 1);
                } else {
                    self.breakpoints.remove(&addr);
                }
                "OK".to_string()
            }
            b'c' => match self.breakpoints.keys().find(|&&bp| bp > self.rip) {
                Some(&bp) => {
                    self.rip = bp;
                    "T05thread:1;".to_string()
                }
                None => "W00".to_string(),
            },
            b's' => {
                self.rip += 1;
                "S05".to_string()
            }
            b'k' => "X09".to_string(),
            _ => String::new(),
        };
        Some(reply)
    }
}

fn serve_client(stream: TcpStream, state: &mut StubState, log: &PacketLog) {
    let mut writer = stream.try_clone().unwrap();
    let mut reader = BufReader::new(stream);

    loop {
        // skip acknowledgements
        let mut byte = [0u8; 1];
        loop {
            if reader.read_exact(&mut byte).is_err() {
                return;
            }
            if byte[0] == b'$' {
                break;
            }
        }

        let mut body = Vec::new();
        if reader.read_until(b'#', &mut body).is_err() {
            return;
        }
        body.pop();
        let mut sum = [0u8; 2];
        if reader.read_exact(&mut sum).is_err() {
            return;
        }

        let packet = String::from_utf8_lossy(&body).into_owned();
        log.lock().unwrap().push(packet.clone());
        if !state.no_ack && writer.write_all(b"+").is_err() {
            return;
        }

        let Some(reply) = state.reply(&packet) else {
            return;
        };
        if writer.write_all(frame(&reply).as_bytes()).is_err() {
            return;
        }
        if packet == "QStartNoAckMode" {
            state.no_ack = true;
        }
        if packet == "k" {
            return;
        }
    }
}
