mod common;

use common::{FakeStub, CODE, MEMORY_BASE};
use livedis::adapter::{Backend, StopReason};
use livedis::disasm::Arch;
use livedis::error::Error;
use livedis::launch::connect::Connector;
use livedis::launch::port::find_free_port;
use livedis::register::Register;
use serial_test::serial;
use std::time::Duration;

fn connector() -> Connector {
    Connector::new(Backend::Gdb, Arch::X86_64).with_retry(4, Duration::from_millis(100))
}

#[test]
#[serial]
fn test_connect_refused_after_all_attempts() {
    let port = find_free_port(31337, 256).unwrap();
    let err = Connector::new(Backend::Gdb, Arch::X86_64)
        .with_retry(2, Duration::from_millis(10))
        .connect("127.0.0.1", port)
        .err()
        .unwrap();

    assert!(err.is_connection_refused());
    assert!(err.is_fatal());
    assert_eq!(
        err.to_string(),
        format!("connection to 127.0.0.1:{port} refused after 2 attempts")
    );
}

#[test]
#[serial]
fn test_connect_to_late_listener() {
    let port = find_free_port(31337, 256).unwrap();
    let stub = FakeStub::start_delayed(port, Duration::from_millis(150), std::process::id());

    let adapter = connector().connect("127.0.0.1", port).unwrap();
    assert_eq!(adapter.backend(), Backend::Gdb);
    assert_eq!(adapter.pid(), Some(std::process::id()));
    assert_eq!(adapter.last_stop(), Some(StopReason::Signal(5)));
    drop(adapter);

    let log = stub.join().unwrap();
    let log = log.lock().unwrap();
    assert_eq!(log[0], "qSupported:multiprocess+;swbreak+;hwbreak+");
    assert_eq!(log[1], "?");
    assert_eq!(log[2], "qC");
}

#[test]
#[serial]
fn test_memory_registers_and_breakpoints() {
    let stub = FakeStub::start(std::process::id());
    let mut adapter = connector().connect("127.0.0.1", stub.port).unwrap();

    assert_eq!(adapter.read_memory(MEMORY_BASE, CODE.len()).unwrap(), CODE);
    // tail of the region is unreadable
    assert_eq!(adapter.read_memory(MEMORY_BASE + 0xfe, 0x10).unwrap().len(), 2);
    assert!(matches!(
        adapter.read_memory(0x10, 4),
        Err(Error::RemoteError(0x14))
    ));

    adapter.write_memory(MEMORY_BASE + 4, &[0xcc]).unwrap();
    assert_eq!(adapter.read_memory(MEMORY_BASE + 4, 1).unwrap(), [0xcc]);

    assert_eq!(adapter.pc().unwrap(), MEMORY_BASE);
    assert_eq!(adapter.read_register(Register::Rax).unwrap(), 0);

    adapter.set_breakpoint(MEMORY_BASE + 5).unwrap();
    assert_eq!(adapter.cont().unwrap(), StopReason::Signal(5));
    assert_eq!(adapter.pc().unwrap(), MEMORY_BASE + 5);
    assert_eq!(adapter.step().unwrap(), StopReason::Signal(5));
    assert_eq!(adapter.pc().unwrap(), MEMORY_BASE + 6);

    adapter.remove_breakpoint(MEMORY_BASE + 5).unwrap();
    assert_eq!(adapter.cont().unwrap(), StopReason::Exited(0));
    assert!(adapter.last_stop().unwrap().is_terminal());
    drop(adapter);

    let log = stub.join();
    assert!(log.contains(&"Z0,1005,1".to_string()));
    assert!(log.contains(&"z0,1005,1".to_string()));
    assert!(log.contains(&"M1004,1:cc".to_string()));
}

#[test]
#[serial]
fn test_lldb_negotiation_and_registers() {
    let stub = FakeStub::start(std::process::id());
    let mut adapter = Connector::new(Backend::Lldb, Arch::X86_64)
        .with_retry(4, Duration::from_millis(100))
        .connect("127.0.0.1", stub.port)
        .unwrap();

    assert_eq!(adapter.backend(), Backend::Lldb);
    assert_eq!(adapter.pid(), Some(std::process::id()));
    assert_eq!(adapter.last_stop(), Some(StopReason::Signal(5)));

    // all traffic below goes without acknowledgements
    assert_eq!(adapter.read_memory(MEMORY_BASE, CODE.len()).unwrap(), CODE);
    assert_eq!(adapter.pc().unwrap(), MEMORY_BASE);
    assert_eq!(adapter.read_register(Register::Rax).unwrap(), 0);
    assert!(matches!(
        adapter.read_register(Register::Rbx),
        Err(Error::RegisterNotFound(_))
    ));

    let registers = adapter.registers().unwrap();
    assert_eq!(registers.value(Register::Rip).unwrap(), MEMORY_BASE);

    assert_eq!(adapter.step().unwrap(), StopReason::Signal(5));
    assert_eq!(adapter.pc().unwrap(), MEMORY_BASE + 1);
    drop(adapter);

    let log = stub.join();
    assert_eq!(log[0], "QStartNoAckMode");
    assert_eq!(log[1], "?");
    assert_eq!(log[2], "qProcessInfo");
    assert_eq!(
        &log[3..6],
        ["qRegisterInfo0", "qRegisterInfo1", "qRegisterInfo2"]
    );
    assert!(log.contains(&"p1".to_string()));
}
