use super::connection::ConnectionIndex;
use crate::address::Protocol;

/// Vendor-specific AT command strings, kept pluggable so a real command
/// table (SIM7070, BG95, Thingy91x) can be supplied without touching the AT
/// engine (`spec.md` §4.9; `SPEC_FULL.md` §4.12). Concrete vendor tables are
/// out of scope here as *data*; [`GenericAtCommandSet`] below is an
/// illustrative fixture, not a vendor port.
pub trait ModemCommandSet {
    /// Ordered commands run by `Start(apn)`'s init pipeline; each is
    /// expected to complete with a plain `OK`.
    fn init_sequence(&self, apn: &str) -> Vec<String>;
    fn open_socket_command(&self, protocol: Protocol, host: &str, port: u16) -> String;
    fn close_socket_command(&self, index: ConnectionIndex) -> String;
    fn write_packet_command(&self, index: ConnectionIndex, len: usize) -> String;
    fn read_pending_command(&self, index: ConnectionIndex) -> String;
    fn read_pending_prefix(&self) -> String;
    fn read_command(&self, index: ConnectionIndex, max_len: usize) -> String;
    fn read_prefix(&self) -> String;
    fn power_save_command(&self, param: &str) -> String;
    fn power_off_command(&self) -> String;
    fn mtu(&self) -> usize;
}

/// Plain `AT`/`ATE0`/`AT+CREG?`-style commands, used as the default and test
/// fixture. Not modeled on any specific cellular module.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericAtCommandSet;

impl ModemCommandSet for GenericAtCommandSet {
    fn init_sequence(&self, apn: &str) -> Vec<String> {
        vec![
            "ATE0".to_string(),
            "AT+CMEE=1".to_string(),
            "AT+CPIN?".to_string(),
            "AT+CREG?".to_string(),
            format!("AT+CGDCONT=1,\"IP\",\"{apn}\""),
            "AT+CGACT=1,1".to_string(),
        ]
    }

    fn open_socket_command(&self, protocol: Protocol, host: &str, port: u16) -> String {
        let proto = match protocol {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        };
        format!("AT+COPEN={proto},\"{host}\",{port}")
    }

    fn close_socket_command(&self, index: ConnectionIndex) -> String {
        format!("AT+CCLOSE={}", index.value())
    }

    fn write_packet_command(&self, index: ConnectionIndex, len: usize) -> String {
        format!("AT+CSEND={},{len}", index.value())
    }

    fn read_pending_command(&self, index: ConnectionIndex) -> String {
        format!("AT+CRECVLEN={}", index.value())
    }

    fn read_pending_prefix(&self) -> String {
        "+CRECVLEN".to_string()
    }

    fn read_command(&self, index: ConnectionIndex, max_len: usize) -> String {
        format!("AT+CRECV={},{max_len}", index.value())
    }

    fn read_prefix(&self) -> String {
        "+CRECV".to_string()
    }

    fn power_save_command(&self, param: &str) -> String {
        format!("AT+CPSMS={param}")
    }

    fn power_off_command(&self) -> String {
        "AT+CPOF".to_string()
    }

    fn mtu(&self) -> usize {
        1024
    }
}
