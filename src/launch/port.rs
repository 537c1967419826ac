use crate::ld_debug;
use std::net::{Ipv4Addr, TcpListener};

/// Find the first port of `start..start + size` a listener can bind to on localhost.
/// The port is released before return, so another process may still take it.
pub fn find_free_port(start: u16, size: u16) -> Option<u16> {
    let end = (start as u32 + size as u32).min(u16::MAX as u32 + 1);
    (start as u32..end).map(|p| p as u16).find(|&port| {
        match TcpListener::bind((Ipv4Addr::LOCALHOST, port)) {
            Ok(_) => true,
            Err(e) => {
                ld_debug!("port {port} is busy: {e}");
                false
            }
        }
    })
}

#[cfg(test)]
mod test {
    use super::find_free_port;
    use serial_test::serial;
    use std::net::{Ipv4Addr, TcpListener};

    #[test]
    #[serial]
    fn test_occupied_port_skipped() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let busy = listener.local_addr().unwrap().port();

        assert_eq!(find_free_port(busy, 1), None);
        assert_eq!(find_free_port(busy, 0), None);
    }

    #[test]
    #[serial]
    fn test_free_port_is_bindable() {
        let port = find_free_port(31337, 256).expect("free port in default range");
        assert!((31337..31337 + 256).contains(&port));
        TcpListener::bind((Ipv4Addr::LOCALHOST, port)).unwrap();
    }

    #[test]
    fn test_range_clipped_at_max_port() {
        if let Some(port) = find_free_port(u16::MAX, 10) {
            assert_eq!(port, u16::MAX);
        }
    }
}
