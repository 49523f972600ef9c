//! OSC over UDP.
//!
//! [`OscClient`] sends automation outputs. [`OscControlServer`] listens for
//! `/ontime/...` control messages and forwards them to the runtime thread.

use anyhow::Result;
use crossbeam_channel::Sender;
use rosc::{encoder, OscMessage, OscPacket, OscType};
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::control::parse_osc;
use crate::state::EngineMessage;

const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// UDP-based OSC client for one target.
#[derive(Clone)]
pub struct OscClient {
    sock: Arc<UdpSocket>,
    /// Target address in "host:port" format.
    pub addr: String,
}

impl OscClient {
    /// Create a client bound to an ephemeral port.
    pub fn new<A: Into<String>>(addr: A) -> Result<Self> {
        let sock = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self {
            sock: Arc::new(sock),
            addr: addr.into(),
        })
    }

    /// Send a message with the given address and arguments.
    pub fn send_msg(&self, path: &str, args: Vec<OscType>) -> Result<()> {
        self.send_packet(&Self::msg(path, args))
    }

    pub fn send_packet(&self, packet: &OscPacket) -> Result<()> {
        let buf = encoder::encode(packet)?;
        self.sock.send_to(&buf, &self.addr)?;
        Ok(())
    }

    /// Create a message packet (for use in bundles).
    pub fn msg(path: &str, args: Vec<OscType>) -> OscPacket {
        OscPacket::Message(OscMessage {
            addr: path.into(),
            args,
        })
    }
}

impl std::fmt::Debug for OscClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OscClient")
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}

/// Split OSC arguments on whitespace and type each one.
///
/// Double-quoted runs keep their spaces and are always strings.
pub fn parse_args(args: &str) -> Vec<OscType> {
    let mut out = Vec::new();
    let mut chars = args.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '"' {
            chars.next();
            let quoted: String = chars.by_ref().take_while(|&c| c != '"').collect();
            out.push(OscType::String(quoted));
            continue;
        }
        let mut word = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                break;
            }
            word.push(c);
            chars.next();
        }
        out.push(type_arg(&word));
    }
    out
}

fn type_arg(word: &str) -> OscType {
    if let Ok(v) = word.parse::<i32>() {
        OscType::Int(v)
    } else if let Ok(v) = word.parse::<f32>() {
        OscType::Float(v)
    } else if let Ok(v) = word.parse::<bool>() {
        OscType::Bool(v)
    } else {
        OscType::String(word.to_string())
    }
}

/// Flatten bundles into their messages, in order.
pub fn unpack(packet: OscPacket, out: &mut Vec<OscMessage>) {
    match packet {
        OscPacket::Message(msg) => out.push(msg),
        OscPacket::Bundle(bundle) => {
            for packet in bundle.content {
                unpack(packet, out);
            }
        }
    }
}

/// Background listener for inbound control messages.
pub struct OscControlServer {
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl OscControlServer {
    /// Bind `bind` (e.g. "0.0.0.0:8888") and start forwarding to `tx`.
    pub fn start(bind: &str, tx: Sender<EngineMessage>) -> Result<Self> {
        let sock = UdpSocket::bind(bind)?;
        sock.set_read_timeout(Some(READ_TIMEOUT))?;
        let local_addr = sock.local_addr()?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = shutdown.clone();
        let thread = thread::Builder::new()
            .name("showrun-osc".to_string())
            .spawn(move || serve(sock, tx, thread_shutdown))?;
        log::info!("[OSC] Listening on {}", local_addr);
        Ok(Self {
            local_addr,
            shutdown,
            thread: Some(thread),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for OscControlServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn serve(sock: UdpSocket, tx: Sender<EngineMessage>, shutdown: Arc<AtomicBool>) {
    let mut buf = [0u8; 65536];
    while !shutdown.load(Ordering::Relaxed) {
        let size = match sock.recv_from(&mut buf) {
            Ok((size, _)) => size,
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                continue
            }
            Err(e) => {
                log::error!("[OSC] Receive failed: {}", e);
                continue;
            }
        };
        let packet = match rosc::decoder::decode_udp(&buf[..size]) {
            Ok((_, packet)) => packet,
            Err(e) => {
                log::warn!("[OSC] Failed to decode packet: {}", e);
                continue;
            }
        };
        let mut messages = Vec::new();
        unpack(packet, &mut messages);
        for msg in messages {
            match parse_osc(&msg.addr, &msg.args) {
                Ok(action) => {
                    log::debug!("[OSC] {} -> {}", msg.addr, action);
                    let sent = tx.send(EngineMessage::Control {
                        action,
                        reply: None,
                    });
                    if sent.is_err() {
                        log::info!("[OSC] Runtime gone, stopping listener");
                        return;
                    }
                }
                Err(e) => log::warn!("[OSC] Ignoring {}: {}", msg.addr, e),
            }
        }
    }
}
