//! Client for the VICE emulator's binary monitor protocol (API version 2).
//!
//! Start VICE with `-binarymonitor` (default port 6502). Every monitor command
//! pauses the emulated machine, so each bus operation is followed by an `exit`
//! command that resumes it.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, warn};

use crate::error::BusError;
use crate::memory::{check_range, MemoryBus};

const STX: u8 = 0x02;
const API_VERSION: u8 = 0x02;
const RESPONSE_HEADER_LEN: usize = 12;
const MAX_RESPONSE_BODY: usize = 1 << 20;

const CMD_MEMORY_GET: u8 = 0x01;
const CMD_MEMORY_SET: u8 = 0x02;
const CMD_PING: u8 = 0x81;
const CMD_EXIT: u8 = 0xaa;

const MEMSPACE_MAIN: u8 = 0x00;
const BANK_DEFAULT: u16 = 0x0000;

pub const DEFAULT_PORT: u16 = 6502;

pub struct ViceMonitor {
    endpoint: String,
    timeout: Duration,
    stream: Option<TcpStream>,
    next_request_id: u32,
}

impl ViceMonitor {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            endpoint: format!("{}:{}", host, port),
            timeout: Duration::from_secs(5),
            stream: None,
            next_request_id: 1,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Round-trip a ping and resume the machine; used to check connectivity at startup.
    pub fn ping(&mut self) -> Result<(), BusError> {
        blocking(|| -> Result<(), BusError> {
            self.command(CMD_PING, &[])?;
            self.resume()
        })
    }

    /// Leave the monitor so the emulated machine keeps running.
    pub fn resume(&mut self) -> Result<(), BusError> {
        self.command(CMD_EXIT, &[]).map(|_| ())
    }

    fn stream(&mut self) -> Result<&mut TcpStream, BusError> {
        if self.stream.is_none() {
            debug!(endpoint = %self.endpoint, "connecting to VICE binary monitor");
            let stream = TcpStream::connect(&self.endpoint)
                .map_err(|e| BusError::io("connecting", self.endpoint.clone(), e))?;
            stream
                .set_read_timeout(Some(self.timeout))
                .and_then(|_| stream.set_write_timeout(Some(self.timeout)))
                .and_then(|_| stream.set_nodelay(true))
                .map_err(|e| BusError::io("configuring", self.endpoint.clone(), e))?;
            self.stream = Some(stream);
        }
        self.stream
            .as_mut()
            .ok_or_else(|| BusError::Malformed("monitor connection missing".to_string()))
    }

    fn command(&mut self, command: u8, body: &[u8]) -> Result<Vec<u8>, BusError> {
        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1).max(1);

        let result = self.exchange(request_id, command, body);
        if let Err(BusError::Io { .. }) = &result {
            // Force a reconnect on the next command.
            self.stream = None;
        }
        result
    }

    fn exchange(&mut self, request_id: u32, command: u8, body: &[u8]) -> Result<Vec<u8>, BusError> {
        let endpoint = self.endpoint.clone();
        let request = encode_request(request_id, command, body);
        let stream = self.stream()?;
        stream
            .write_all(&request)
            .map_err(|e| BusError::io("writing request", endpoint.clone(), e))?;

        loop {
            let mut header = [0u8; RESPONSE_HEADER_LEN];
            stream
                .read_exact(&mut header)
                .map_err(|e| BusError::io("reading response header", endpoint.clone(), e))?;
            let response = parse_response_header(&header)?;

            let mut payload = vec![0u8; response.body_len];
            stream
                .read_exact(&mut payload)
                .map_err(|e| BusError::io("reading response body", endpoint.clone(), e))?;

            if response.request_id != request_id {
                // Unsolicited event (stopped/resumed/checkpoint); not ours.
                debug!(
                    response_type = response.response_type,
                    "skipping monitor event"
                );
                continue;
            }
            if response.error_code != 0 {
                warn!(command, code = response.error_code, "monitor command failed");
                return Err(BusError::Monitor {
                    command,
                    code: response.error_code,
                });
            }
            return Ok(payload);
        }
    }

    fn memory_get(&mut self, address: u16, length: usize) -> Result<Vec<u8>, BusError> {
        let end = address + (length - 1) as u16;
        let body = memory_request_body(address, end);
        let payload = self.command(CMD_MEMORY_GET, &body)?;

        if payload.len() < 2 {
            return Err(BusError::Malformed("memory get response too short".to_string()));
        }
        let count = u16::from_le_bytes([payload[0], payload[1]]) as usize;
        let data = &payload[2..];
        if count != length || data.len() < count {
            return Err(BusError::Malformed(format!(
                "asked for {} bytes at ${:04X}, monitor returned {}",
                length, address, count
            )));
        }
        Ok(data[..count].to_vec())
    }

    fn memory_set(&mut self, address: u16, bytes: &[u8]) -> Result<(), BusError> {
        let end = address + (bytes.len() - 1) as u16;
        let mut body = memory_request_body(address, end);
        body.extend_from_slice(bytes);
        self.command(CMD_MEMORY_SET, &body).map(|_| ())
    }
}

/// Run a blocking socket exchange. On a multi-thread runtime the worker is
/// handed off first so other tasks keep running while VICE answers.
fn blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

impl MemoryBus for ViceMonitor {
    fn read_bytes(&mut self, address: u16, length: usize) -> Result<Vec<u8>, BusError> {
        check_range(address, length)?;
        if length == 0 {
            return Ok(Vec::new());
        }
        blocking(|| -> Result<Vec<u8>, BusError> {
            let data = self.memory_get(address, length)?;
            self.resume()?;
            Ok(data)
        })
    }

    fn write_bytes(&mut self, address: u16, bytes: &[u8]) -> Result<(), BusError> {
        check_range(address, bytes.len())?;
        if bytes.is_empty() {
            return Ok(());
        }
        blocking(|| -> Result<(), BusError> {
            self.memory_set(address, bytes)?;
            self.resume()
        })
    }
}

struct ResponseHeader {
    body_len: usize,
    response_type: u8,
    error_code: u8,
    request_id: u32,
}

fn encode_request(request_id: u32, command: u8, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(11 + body.len());
    out.push(STX);
    out.push(API_VERSION);
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(&request_id.to_le_bytes());
    out.push(command);
    out.extend_from_slice(body);
    out
}

fn parse_response_header(header: &[u8; RESPONSE_HEADER_LEN]) -> Result<ResponseHeader, BusError> {
    if header[0] != STX {
        return Err(BusError::Malformed(format!(
            "expected STX, got {:#04x}",
            header[0]
        )));
    }
    let body_len = u32::from_le_bytes([header[2], header[3], header[4], header[5]]) as usize;
    if body_len > MAX_RESPONSE_BODY {
        return Err(BusError::Malformed(format!(
            "response body of {} bytes is too large",
            body_len
        )));
    }
    Ok(ResponseHeader {
        body_len,
        response_type: header[6],
        error_code: header[7],
        request_id: u32::from_le_bytes([header[8], header[9], header[10], header[11]]),
    })
}

fn memory_request_body(start: u16, end: u16) -> Vec<u8> {
    let mut body = Vec::with_capacity(8);
    body.push(0); // no side effects
    body.extend_from_slice(&start.to_le_bytes());
    body.extend_from_slice(&end.to_le_bytes());
    body.push(MEMSPACE_MAIN);
    body.extend_from_slice(&BANK_DEFAULT.to_le_bytes());
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn response(request_id: u32, response_type: u8, error_code: u8, body: &[u8]) -> Vec<u8> {
        let mut out = vec![STX, API_VERSION];
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.push(response_type);
        out.push(error_code);
        out.extend_from_slice(&request_id.to_le_bytes());
        out.extend_from_slice(body);
        out
    }

    fn read_request(stream: &mut TcpStream) -> (u32, u8, Vec<u8>) {
        let mut header = [0u8; 11];
        stream.read_exact(&mut header).unwrap();
        let len = u32::from_le_bytes([header[2], header[3], header[4], header[5]]) as usize;
        let id = u32::from_le_bytes([header[6], header[7], header[8], header[9]]);
        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).unwrap();
        (id, header[10], body)
    }

    #[test]
    fn test_encode_memory_get_request() {
        let body = memory_request_body(0xC100, 0xC100);
        let request = encode_request(7, CMD_MEMORY_GET, &body);
        assert_eq!(
            request,
            vec![
                0x02, 0x02, 8, 0, 0, 0, 7, 0, 0, 0, 0x01, 0x00, 0x00, 0xC1, 0x00, 0xC1, 0x00,
                0x00, 0x00
            ]
        );
    }

    #[test]
    fn test_read_skips_events_and_resumes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();

            let (id, cmd, body) = read_request(&mut stream);
            assert_eq!(cmd, CMD_MEMORY_GET);
            assert_eq!(&body[1..5], &[0x00, 0xC1, 0x02, 0xC1]);
            // A "stopped" event arrives before the real answer.
            stream.write_all(&response(0xffff_ffff, 0x62, 0, &[0, 0])).unwrap();
            stream
                .write_all(&response(id, CMD_MEMORY_GET, 0, &[3, 0, b'A', b'B', b'C']))
                .unwrap();

            let (id, cmd, _) = read_request(&mut stream);
            assert_eq!(cmd, CMD_EXIT);
            stream.write_all(&response(id, CMD_EXIT, 0, &[])).unwrap();
        });

        let mut monitor = ViceMonitor::new("127.0.0.1", port);
        assert_eq!(monitor.read_bytes(0xC100, 3).unwrap(), b"ABC");
        server.join().unwrap();
    }

    /// Serves one memory read of "HI" followed by the resume.
    fn serve_one_read(listener: TcpListener) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let (id, _, _) = read_request(&mut stream);
            stream
                .write_all(&response(id, CMD_MEMORY_GET, 0, &[2, 0, b'H', b'I']))
                .unwrap();
            let (id, _, _) = read_request(&mut stream);
            stream.write_all(&response(id, CMD_EXIT, 0, &[])).unwrap();
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_read_inside_multi_thread_runtime() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = serve_one_read(listener);

        let ticker = tokio::spawn(async {
            tokio::time::sleep(Duration::from_millis(1)).await;
            true
        });
        let mut monitor = ViceMonitor::new("127.0.0.1", port);
        assert_eq!(monitor.read_bytes(0xC100, 2).unwrap(), b"HI");
        assert!(ticker.await.unwrap());
        server.join().unwrap();
    }

    #[tokio::test]
    async fn test_read_inside_current_thread_runtime() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = serve_one_read(listener);

        let mut monitor = ViceMonitor::new("127.0.0.1", port);
        assert_eq!(monitor.read_bytes(0xC100, 2).unwrap(), b"HI");
        server.join().unwrap();
    }

    #[test]
    fn test_monitor_error_code_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let (id, _, _) = read_request(&mut stream);
            stream.write_all(&response(id, CMD_MEMORY_SET, 0x81, &[])).unwrap();
        });

        let mut monitor = ViceMonitor::new("127.0.0.1", port);
        let err = monitor.write_bytes(0xC000, &[0]).unwrap_err();
        assert!(matches!(
            err,
            BusError::Monitor {
                command: CMD_MEMORY_SET,
                code: 0x81
            }
        ));
        server.join().unwrap();
    }

    #[test]
    fn test_unreachable_monitor_is_io_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut monitor = ViceMonitor::new("127.0.0.1", port);
        assert!(matches!(monitor.ping(), Err(BusError::Io { .. })));
    }
}
