use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::SystemTime,
};

use crate::{
    assembler::FrameAssembler,
    config::{self, ReceiverConfig},
    frame::Frame,
    osc::OscMessage,
    store::{Diagnostics, FrameStore},
    transport::{OscListener, OscTransport, UdpTransport},
    Result,
};

/// Receives VMC motion-capture streams and exposes the latest complete frame.
///
/// The receiver owns at most one listener. Messages are assembled on the
/// listener's delivery thread; consumers on any thread call
/// [`VmcReceiver::copy_out`] to obtain a consistent snapshot.
pub struct VmcReceiver<T: OscTransport = UdpTransport> {
    transport: T,
    listener: Option<T::Listener>,
    store: Arc<FrameStore>,
    force_update: Arc<AtomicBool>,
    server_name: String,
    port: u16,
}

impl VmcReceiver<UdpTransport> {
    /// Creates a stopped receiver that listens over UDP once started.
    pub fn new() -> Self {
        Self::with_transport(UdpTransport)
    }

    /// Creates a UDP receiver from configuration and starts it.
    pub fn from_config(config: &ReceiverConfig) -> Result<Self> {
        config::set_debug_enabled(config.debug);
        let mut receiver = Self::new();
        receiver.set_force_update(config.force_update);
        receiver.start(&config.bind_name, config.port)?;
        Ok(receiver)
    }
}

impl Default for VmcReceiver<UdpTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: OscTransport> VmcReceiver<T> {
    /// Creates a stopped receiver over a custom transport.
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            listener: None,
            store: Arc::new(FrameStore::new()),
            force_update: Arc::new(AtomicBool::new(false)),
            server_name: String::new(),
            port: 0,
        }
    }

    /// Starts listening on `(name, port)`, replacing any active listener.
    ///
    /// On failure the receiver is left stopped. When `port` is 0 the port
    /// chosen by the transport is recorded.
    pub fn start(&mut self, name: &str, port: u16) -> Result<()> {
        self.stop();

        let mut listener = self.transport.create_listener();
        let mut assembler = FrameAssembler::for_server(
            Arc::clone(&self.store),
            Arc::clone(&self.force_update),
            name,
            port,
        );
        listener.register_handler(Box::new(move |message: &OscMessage, sender: SocketAddr| {
            assembler.handle_message(message, sender);
        }));

        let local_addr = match listener.start(name, port) {
            Ok(addr) => addr,
            Err(err) => {
                tracing::warn!(
                    name,
                    port,
                    error = %err,
                    "VMC: failed to create OSC server; check whether the port is in use or blocked"
                );
                return Err(err);
            }
        };

        if config::debug_enabled() {
            tracing::info!(name, port = local_addr.port(), "VMC: created OSC server");
        }

        self.listener = Some(listener);
        self.server_name = name.to_string();
        self.port = local_addr.port();
        Ok(())
    }

    /// Stops the active listener, if any. Calling this when stopped is a
    /// no-op.
    pub fn stop(&mut self) {
        if let Some(mut listener) = self.listener.take() {
            listener.stop();
            tracing::debug!(name = %self.server_name, port = self.port, "VMC: destroyed OSC server");
        }
        self.server_name.clear();
        self.port = 0;
    }

    /// Whether a listener is bound and delivering.
    pub fn is_running(&self) -> bool {
        self.listener.is_some()
    }

    /// Bind name of the active listener, empty when stopped.
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Bound port of the active listener, 0 when stopped.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// When enabled every sample message publishes immediately instead of
    /// waiting for a frame boundary.
    pub fn set_force_update(&self, enabled: bool) {
        self.force_update.store(enabled, Ordering::Relaxed);
    }

    /// Current force-update setting.
    pub fn force_update(&self) -> bool {
        self.force_update.load(Ordering::Relaxed)
    }

    /// Returns a handle that consumers on other threads can read frames
    /// through.
    pub fn handle(&self) -> FrameHandle {
        FrameHandle::new(Arc::clone(&self.store))
    }

    /// Returns a copy of the most recently published frame.
    pub fn copy_out(&self) -> Frame {
        self.store.copy_out()
    }

    /// Like [`VmcReceiver::copy_out`] but reuses `dst`'s allocations.
    pub fn copy_into(&self, dst: &mut Frame) {
        self.store.copy_into(dst);
    }

    /// Empties the working and published frames. Diagnostics are unaffected.
    pub fn clear(&self) {
        self.store.clear();
    }

    /// Zeroes every counter and the root-seen flag. Frames are unaffected.
    pub fn reset_diagnostics(&self) {
        self.store.reset_diagnostics();
    }

    /// All diagnostic counters, read together under one lock.
    pub fn diagnostics(&self) -> Diagnostics {
        self.store.diagnostics()
    }

    /// Number of frames published since creation or the last reset.
    pub fn total_packets_received(&self) -> u64 {
        self.store.diagnostics().total_packets_received
    }

    /// Wall-clock time of the most recent publish.
    pub fn last_packet_received_at(&self) -> Option<SystemTime> {
        self.store.diagnostics().last_packet_received_at
    }

    /// Set as soon as a well-formed `/VMC/Ext/Root/Pos` sample arrives,
    /// before any publish.
    pub fn has_received_root_translation(&self) -> bool {
        self.store.diagnostics().has_received_root_translation
    }

    /// Bone count of the most recent publish.
    pub fn last_bone_count(&self) -> usize {
        self.store.diagnostics().last_bone_count
    }

    /// Curve count of the most recent publish.
    pub fn last_curve_count(&self) -> usize {
        self.store.diagnostics().last_curve_count
    }
}

impl<T: OscTransport> Drop for VmcReceiver<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<T: OscTransport> std::fmt::Debug for VmcReceiver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VmcReceiver")
            .field("server_name", &self.server_name)
            .field("port", &self.port)
            .field("running", &self.is_running())
            .field("force_update", &self.force_update())
            .finish()
    }
}

/// Shared, thread-safe view over the frames published by a [`VmcReceiver`].
///
/// Handles stay valid after the receiver stops; they then keep returning the
/// last published frame.
#[derive(Clone)]
pub struct FrameHandle {
    store: Arc<FrameStore>,
}

impl FrameHandle {
    pub(crate) fn new(store: Arc<FrameStore>) -> Self {
        Self { store }
    }

    /// Returns a copy of the most recently published frame.
    pub fn copy_out(&self) -> Frame {
        self.store.copy_out()
    }

    /// Copies the most recently published frame into `dst`.
    pub fn copy_into(&self, dst: &mut Frame) {
        self.store.copy_into(dst);
    }

    /// Snapshot of the receiver's diagnostic counters.
    pub fn diagnostics(&self) -> Diagnostics {
        self.store.diagnostics()
    }
}

impl std::fmt::Debug for FrameHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameHandle").finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        net::UdpSocket,
        thread,
        time::{Duration, Instant},
    };

    use super::*;
    use crate::osc;

    fn send_all(port: u16, messages: &[OscMessage]) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .send_to(&osc::encode_bundle(messages).unwrap(), ("127.0.0.1", port))
            .unwrap();
    }

    fn wait_for_packets(receiver: &VmcReceiver, count: u64) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while receiver.total_packets_received() < count {
            assert!(Instant::now() < deadline, "timed out waiting for publish");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn receives_frames_over_udp() {
        let mut receiver = VmcReceiver::new();
        receiver.start("127.0.0.1", 0).unwrap();
        assert!(receiver.is_running());
        assert_ne!(receiver.port(), 0);
        assert_eq!(receiver.server_name(), "127.0.0.1");

        send_all(
            receiver.port(),
            &[
                OscMessage::new("/VMC/Ext/Root/Pos")
                    .with_string("root")
                    .with_floats([0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0]),
                OscMessage::new("/VMC/Ext/Blend/Val")
                    .with_string("Blink")
                    .with_floats([0.5]),
                OscMessage::new("/VMC/Ext/OK"),
            ],
        );
        wait_for_packets(&receiver, 1);

        let frame = receiver.copy_out();
        assert_eq!(frame.curve("Blink"), Some(0.5));
        assert_eq!(frame.bone("root").unwrap().translation.z, 100.0);
        assert!(receiver.has_received_root_translation());
        assert_eq!(receiver.last_bone_count(), 1);
        assert_eq!(receiver.last_curve_count(), 1);
        assert!(receiver.last_packet_received_at().is_some());
    }

    #[test]
    fn handle_reads_from_another_thread() {
        let mut receiver = VmcReceiver::new();
        receiver.set_force_update(true);
        receiver.start("127.0.0.1", 0).unwrap();
        let handle = receiver.handle();

        send_all(
            receiver.port(),
            &[OscMessage::new("/VMC/Ext/Bone/Pos")
                .with_string("Hips")
                .with_floats([0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0])],
        );
        wait_for_packets(&receiver, 1);
        receiver.stop();

        let frame = thread::spawn(move || handle.copy_out()).join().unwrap();
        assert!(frame.bone("Hips").is_some());
    }

    #[test]
    fn stop_resets_active_configuration() {
        let mut receiver = VmcReceiver::new();
        receiver.stop();
        receiver.start("127.0.0.1", 0).unwrap();
        receiver.stop();
        receiver.stop();

        assert!(!receiver.is_running());
        assert_eq!(receiver.server_name(), "");
        assert_eq!(receiver.port(), 0);
    }

    #[test]
    fn failed_start_leaves_receiver_stopped() {
        let taken = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let mut receiver = VmcReceiver::new();
        receiver.start("127.0.0.1", 0).unwrap();
        let err = receiver.start("127.0.0.1", port).unwrap_err();

        assert!(err.is_addr_in_use());
        assert!(!receiver.is_running());
        assert_eq!(receiver.port(), 0);
    }

    #[test]
    fn restart_releases_previous_port() {
        let mut receiver = VmcReceiver::new();
        receiver.start("127.0.0.1", 0).unwrap();
        let first = receiver.port();

        receiver.start("127.0.0.1", 0).unwrap();
        // The first socket must be closed, so it can be bound again.
        let rebound = UdpSocket::bind(("127.0.0.1", first));
        assert!(rebound.is_ok());
    }

    #[test]
    fn from_config_applies_flags() {
        let config = ReceiverConfig {
            bind_name: "127.0.0.1".into(),
            port: 0,
            force_update: true,
            debug: false,
        };
        let receiver = VmcReceiver::from_config(&config).unwrap();
        assert!(receiver.force_update());
        assert!(receiver.is_running());

        send_all(
            receiver.port(),
            &[OscMessage::new("/VMC/Ext/Blend/Val")
                .with_string("A")
                .with_floats([1.0])],
        );
        wait_for_packets(&receiver, 1);
        assert_eq!(receiver.copy_out().curve("A"), Some(1.0));
    }
}
