//! Transport boundary between raw packets and the frame assembler.
//!
//! A listener decodes whatever its transport delivers into [`OscMessage`]s and
//! invokes the registered [`MessageHandler`] once per message. The handler is
//! `FnMut`, so a listener must never call it from two threads at once.

use std::{
    io::{self, ErrorKind},
    net::{SocketAddr, ToSocketAddrs, UdpSocket},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{osc, osc::OscMessage, CaptureError, Result};

/// Callback invoked once per decoded message with the sender's address.
pub type MessageHandler = Box<dyn FnMut(&OscMessage, SocketAddr) + Send + 'static>;

/// How long the receive thread blocks before re-checking for shutdown.
pub const RECV_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Largest UDP payload we accept.
const MAX_DATAGRAM_SIZE: usize = 65_536;

/// A message source that can be bound, started and stopped.
pub trait OscListener: Send {
    /// Installs the handler for subsequent deliveries, replacing any previous
    /// one. On a running listener the new handler takes over from the next
    /// delivered packet.
    fn register_handler(&mut self, handler: MessageHandler);

    /// Binds to `(bind_name, bind_port)` and begins delivering messages.
    /// Returns the bound local address.
    fn start(&mut self, bind_name: &str, bind_port: u16) -> Result<SocketAddr>;

    /// Stops delivery. Must be safe to call repeatedly.
    fn stop(&mut self);
}

/// Factory for fresh listeners.
pub trait OscTransport {
    type Listener: OscListener;

    /// Returns a stopped listener with no handler.
    fn create_listener(&self) -> Self::Listener;
}

/// Transport that receives OSC datagrams over UDP.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpTransport;

impl OscTransport for UdpTransport {
    type Listener = UdpListener;

    fn create_listener(&self) -> UdpListener {
        UdpListener::new()
    }
}

/// UDP listener backed by one dedicated receive thread.
#[derive(Default)]
pub struct UdpListener {
    handler: Option<MessageHandler>,
    running: Option<RunningListener>,
}

struct RunningListener {
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    /// Replacement handlers, picked up by the receive thread before each
    /// dispatch.
    handler_tx: mpsc::Sender<MessageHandler>,
    thread: JoinHandle<MessageHandler>,
}

impl UdpListener {
    /// Creates a stopped listener with no handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Address the socket is bound to while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|running| running.local_addr)
    }

    /// Whether a receive thread is active.
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    fn bind(bind_name: &str, bind_port: u16) -> Result<UdpSocket> {
        let host = if bind_name.is_empty() {
            "0.0.0.0"
        } else {
            bind_name
        };
        let bind_error = |source: io::Error| CaptureError::Bind {
            address: host.to_string(),
            port: bind_port,
            source,
        };

        let addrs: Vec<SocketAddr> = (host, bind_port)
            .to_socket_addrs()
            .map_err(bind_error)?
            .collect();
        let socket = UdpSocket::bind(&addrs[..]).map_err(bind_error)?;
        socket
            .set_read_timeout(Some(RECV_POLL_INTERVAL))
            .map_err(bind_error)?;
        Ok(socket)
    }
}

impl OscListener for UdpListener {
    fn register_handler(&mut self, handler: MessageHandler) {
        let handler = match &self.running {
            Some(running) => match running.handler_tx.send(handler) {
                Ok(()) => {
                    tracing::debug!(local_addr = %running.local_addr, "OSC handler replaced");
                    return;
                }
                // Receive thread is gone; keep the handler for the next start.
                Err(mpsc::SendError(handler)) => handler,
            },
            None => handler,
        };
        self.handler = Some(handler);
    }

    fn start(&mut self, bind_name: &str, bind_port: u16) -> Result<SocketAddr> {
        self.stop();

        let socket = Self::bind(bind_name, bind_port)?;
        let local_addr = socket.local_addr()?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let (handler_tx, handler_rx) = mpsc::channel();
        let handler = self
            .handler
            .take()
            .unwrap_or_else(|| Box::new(|_: &OscMessage, _: SocketAddr| {}) as MessageHandler);

        let thread = {
            let shutdown = Arc::clone(&shutdown);
            thread::Builder::new()
                .name(format!("vmc-rx-{}", local_addr.port()))
                .spawn(move || receive_loop(socket, shutdown, handler, handler_rx))?
        };

        tracing::info!(%local_addr, "OSC listener started");
        self.running = Some(RunningListener {
            local_addr,
            shutdown,
            handler_tx,
            thread,
        });
        Ok(local_addr)
    }

    fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.shutdown.store(true, Ordering::Release);
        match running.thread.join() {
            // Keep the handler so a restart resumes delivery to it. A handler
            // registered after the thread died takes precedence.
            Ok(handler) => {
                if self.handler.is_none() {
                    self.handler = Some(handler);
                }
            }
            Err(_) => tracing::warn!(local_addr = %running.local_addr, "OSC receive thread panicked"),
        }
        tracing::info!(local_addr = %running.local_addr, "OSC listener stopped");
    }
}

impl Drop for UdpListener {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for UdpListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpListener")
            .field("local_addr", &self.local_addr())
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

fn receive_loop(
    socket: UdpSocket,
    shutdown: Arc<AtomicBool>,
    mut handler: MessageHandler,
    replacements: mpsc::Receiver<MessageHandler>,
) -> MessageHandler {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    while !shutdown.load(Ordering::Acquire) {
        let (len, from) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "OSC receive failed");
                continue;
            }
        };

        if let Some(latest) = replacements.try_iter().last() {
            handler = latest;
        }

        match osc::decode_packet(&buf[..len]) {
            Ok(messages) => {
                for message in &messages {
                    handler(message, from);
                }
            }
            Err(e) => tracing::debug!(error = %e, %from, len, "dropping malformed OSC packet"),
        }
    }

    replacements.try_iter().last().unwrap_or(handler)
}
