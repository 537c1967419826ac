//! GDB remote serial protocol client.
//! Both `gdbserver` and lldb `debugserver` speak it, backends differ only in negotiation details.

use crate::adapter::StopReason;
use crate::error::Error;
use crate::muted_error;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::iter;
use std::net::TcpStream;
use std::time::Duration;

/// Maximum number of memory bytes requested in a single `m` packet.
const MEMORY_CHUNK: usize = 0x400;
const MAX_RETRANSMIT: usize = 3;
const KILL_REPLY_TIMEOUT: Duration = Duration::from_millis(500);

/// Calculate packet checksum (modulo 256 sum of payload bytes).
pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Wrap payload into `$payload#xx` frame.
pub fn frame(payload: &str) -> String {
    format!("${payload}#{:02x}", checksum(payload.as_bytes()))
}

/// Undo binary escaping and run-length encoding of a packet body.
pub fn decode_payload(body: &[u8]) -> Result<Vec<u8>, Error> {
    let truncated = || Error::Protocol("truncated escape sequence".to_string());

    let mut out = Vec::with_capacity(body.len());
    let mut bytes = body.iter().copied();
    while let Some(b) = bytes.next() {
        match b {
            b'}' => {
                let escaped = bytes.next().ok_or_else(truncated)?;
                out.push(escaped ^ 0x20);
            }
            b'*' => {
                let count = bytes.next().ok_or_else(truncated)?;
                let last = *out
                    .last()
                    .ok_or_else(|| Error::Protocol("run-length without a value".to_string()))?;
                let repeat = count
                    .checked_sub(29)
                    .ok_or_else(|| Error::Protocol(format!("bad run-length count {count}")))?;
                out.extend(iter::repeat(last).take(repeat as usize));
            }
            _ => out.push(b),
        }
    }
    Ok(out)
}

/// Parse a stop reply packet (`S`, `T`, `W` or `X`).
pub fn parse_stop_reply(reply: &str) -> Result<StopReason, Error> {
    let code = |s: &str| -> Result<i32, Error> {
        let digits = s.get(1..3).unwrap_or_else(|| s.get(1..).unwrap_or_default());
        i32::from_str_radix(digits, 16)
            .map_err(|_| Error::Protocol(format!("malformed stop reply `{reply}`")))
    };

    match reply.as_bytes().first() {
        Some(b'S') | Some(b'T') => Ok(StopReason::Signal(code(reply)?)),
        Some(b'W') => Ok(StopReason::Exited(code(reply)?)),
        Some(b'X') => Ok(StopReason::Terminated(code(reply)?)),
        _ => Err(Error::Protocol(format!("unexpected stop reply `{reply}`"))),
    }
}

/// Split `key:value;key:value;` reply into pairs.
pub fn parse_key_values(reply: &str) -> HashMap<&str, &str> {
    reply
        .split(';')
        .filter_map(|pair| pair.split_once(':'))
        .collect()
}

fn remote_error(reply: &str) -> Option<u8> {
    let code = reply.strip_prefix('E')?;
    if code.len() != 2 {
        return None;
    }
    u8::from_str_radix(code, 16).ok()
}

/// Connection to a remote stub.
pub struct RspClient {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
    ack_mode: bool,
}

impl RspClient {
    /// Open a connection to the stub at `host:port`.
    /// Fails with [`Error::IO`] of kind `ConnectionRefused` while nothing listens there.
    pub fn connect(host: &str, port: u16) -> Result<Self, Error> {
        let stream = TcpStream::connect((host, port))?;
        stream.set_nodelay(true)?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self {
            stream,
            reader,
            ack_mode: true,
        })
    }

    /// Stop sending and expecting `+`/`-` acknowledgements.
    pub fn disable_ack(&mut self) {
        self.ack_mode = false;
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), Error> {
        Ok(self.stream.set_read_timeout(timeout)?)
    }

    fn read_byte(&mut self) -> Result<u8, Error> {
        let mut byte = [0u8; 1];
        self.reader.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    /// Send a packet, retransmit it if the stub asks so.
    pub fn send(&mut self, payload: &str) -> Result<(), Error> {
        let packet = frame(payload);
        for _ in 0..MAX_RETRANSMIT {
            self.stream.write_all(packet.as_bytes())?;
            self.stream.flush()?;
            if !self.ack_mode {
                return Ok(());
            }
            match self.read_byte()? {
                b'+' => return Ok(()),
                b'-' => continue,
                other => {
                    return Err(Error::Protocol(format!(
                        "expect acknowledgement, got {:?}",
                        other as char
                    )))
                }
            }
        }
        Err(Error::Protocol(format!("packet `{payload}` rejected by stub")))
    }

    /// Receive next packet payload, verifying its checksum.
    pub fn recv(&mut self) -> Result<Vec<u8>, Error> {
        for _ in 0..MAX_RETRANSMIT {
            // skip stray acknowledgements before packet start
            while self.read_byte()? != b'$' {}

            let mut body = Vec::new();
            self.reader.read_until(b'#', &mut body)?;
            if body.pop() != Some(b'#') {
                return Err(Error::Protocol("connection closed inside packet".to_string()));
            }

            let mut sum = [0u8; 2];
            self.reader.read_exact(&mut sum)?;
            let expected = std::str::from_utf8(&sum)
                .ok()
                .and_then(|s| u8::from_str_radix(s, 16).ok())
                .ok_or_else(|| Error::Protocol("malformed checksum".to_string()))?;

            if checksum(&body) != expected {
                if !self.ack_mode {
                    return Err(Error::Protocol("checksum mismatch".to_string()));
                }
                self.stream.write_all(b"-")?;
                continue;
            }
            if self.ack_mode {
                self.stream.write_all(b"+")?;
            }
            return decode_payload(&body);
        }
        Err(Error::Protocol("too many corrupted packets".to_string()))
    }

    /// Send a packet and return the reply as text.
    /// `Exx` replies become [`Error::RemoteError`].
    pub fn request(&mut self, payload: &str) -> Result<String, Error> {
        self.send(payload)?;
        let reply = String::from_utf8_lossy(&self.recv()?).into_owned();
        if let Some(code) = remote_error(&reply) {
            return Err(Error::RemoteError(code));
        }
        Ok(reply)
    }

    /// Send a packet expecting an `OK` reply.
    /// An empty reply means the stub does not know this packet.
    pub fn request_ok(&mut self, payload: &str, what: &'static str) -> Result<(), Error> {
        match self.request(payload)?.as_str() {
            "OK" => Ok(()),
            "" => Err(Error::Unsupported(what)),
            other => Err(Error::Protocol(format!("unexpected reply to {what}: `{other}`"))),
        }
    }

    pub fn read_memory(&mut self, addr: u64, len: usize) -> Result<Vec<u8>, Error> {
        let mut data = Vec::with_capacity(len);
        while data.len() < len {
            let chunk = (len - data.len()).min(MEMORY_CHUNK);
            let chunk_addr = addr.wrapping_add(data.len() as u64);
            let reply = match self.request(&format!("m{chunk_addr:x},{chunk:x}")) {
                Ok(reply) => reply,
                // partially readable region, return what was read
                Err(Error::RemoteError(_)) if !data.is_empty() => break,
                Err(e) => return Err(e),
            };
            let bytes = hex::decode(&reply)
                .map_err(|e| Error::Protocol(format!("memory reply: {e}")))?;
            let short = bytes.len() < chunk;
            data.extend(bytes);
            if short {
                break;
            }
        }
        Ok(data)
    }

    pub fn write_memory(&mut self, addr: u64, data: &[u8]) -> Result<(), Error> {
        for (i, chunk) in data.chunks(MEMORY_CHUNK).enumerate() {
            let chunk_addr = addr.wrapping_add((i * MEMORY_CHUNK) as u64);
            self.request_ok(
                &format!("M{chunk_addr:x},{:x}:{}", chunk.len(), hex::encode(chunk)),
                "memory write",
            )?;
        }
        Ok(())
    }

    /// Send resume packet (`c`, `s`, ...) and wait for the stop reply.
    pub fn resume(&mut self, packet: &str) -> Result<StopReason, Error> {
        self.send(packet)?;
        let reply = String::from_utf8_lossy(&self.recv()?).into_owned();
        parse_stop_reply(&reply)
    }

    pub fn insert_breakpoint(&mut self, addr: u64, kind: u8) -> Result<(), Error> {
        self.request_ok(&format!("Z0,{addr:x},{kind}"), "software breakpoints")
    }

    pub fn remove_breakpoint(&mut self, addr: u64, kind: u8) -> Result<(), Error> {
        self.request_ok(&format!("z0,{addr:x},{kind}"), "software breakpoints")
    }

    /// Kill debugee. Stubs may close connection without a reply, so the reply is optional.
    pub fn kill(&mut self) -> Result<(), Error> {
        self.send("k")?;
        self.set_read_timeout(Some(KILL_REPLY_TIMEOUT))?;
        muted_error!(self.recv(), "kill reply:");
        Ok(())
    }
}
