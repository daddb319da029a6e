use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::SystemTime,
};

use crate::{
    config,
    frame::Frame,
    message::{Payload, VmcAddress},
    osc::OscMessage,
    store::{DiagnosticsDelta, FrameStore, PublishReport},
};

/// Publish summaries are logged for packet 1, 101, 201, ...
const DEBUG_LOG_INTERVAL: u64 = 100;

/// Builds frames from a stream of VMC messages and publishes them to a
/// shared [`FrameStore`] when the sender marks a frame as complete.
///
/// The working frame is owned exclusively by the assembler. `handle_message`
/// takes `&mut self`, so delivery must be serialized by whoever drives it.
pub struct FrameAssembler {
    working: Frame,
    dirty: bool,
    /// Diagnostics epoch in which root-seen was last reported to the store.
    root_reported: Option<u64>,
    seen_epoch: u64,
    store: Arc<FrameStore>,
    force_update: Arc<AtomicBool>,
}

impl FrameAssembler {
    /// Creates an assembler with an untagged working frame.
    pub fn new(store: Arc<FrameStore>, force_update: Arc<AtomicBool>) -> Self {
        Self::for_server(store, force_update, "", 0)
    }

    /// Creates an assembler whose frames are tagged with the listener's bind
    /// configuration.
    pub fn for_server(
        store: Arc<FrameStore>,
        force_update: Arc<AtomicBool>,
        server_address: &str,
        port: u16,
    ) -> Self {
        let seen_epoch = store.clear_epoch();
        Self {
            working: Frame::for_server(server_address, port),
            dirty: false,
            root_reported: None,
            seen_epoch,
            store,
            force_update,
        }
    }

    /// Applies one decoded message to the working frame and publishes it if
    /// the message completes a frame.
    pub fn handle_message(&mut self, message: &OscMessage, sender: SocketAddr) {
        self.sync_clear_epoch();

        let address = VmcAddress::parse(&message.address);
        let payload = Payload::decode(&message.floats);
        let name = message.strings.first();

        match (address, payload, name) {
            (VmcAddress::RootPos, Payload::Bone(bone), Some(name)) => {
                self.working.bones.insert(name.clone(), bone);
                self.dirty = true;
                self.report_root_seen();
            }
            (VmcAddress::BonePos, Payload::Bone(bone), Some(name)) => {
                self.working.bones.insert(name.clone(), bone);
                self.dirty = true;
            }
            (VmcAddress::BlendVal, Payload::Curve(weight), Some(name)) => {
                self.working.curves.insert(name.clone(), weight);
                self.dirty = true;
            }
            (VmcAddress::RootPos | VmcAddress::BonePos | VmcAddress::BlendVal, _, _) => {
                if config::debug_enabled() {
                    tracing::trace!(
                        address = %message.address,
                        strings = message.strings.len(),
                        floats = message.floats.len(),
                        %sender,
                        "VMC: ignoring malformed sample"
                    );
                }
            }
            _ => {}
        }

        if !self.dirty {
            return;
        }

        if self.force_update.load(Ordering::Relaxed) || address.is_boundary() {
            if let Some(report) = self.publish() {
                log_publish(&report, sender);
            }
        }
    }

    /// Whether the working frame holds samples that have not been published.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Samples received since the last clear, published or not.
    pub fn working_frame(&self) -> &Frame {
        &self.working
    }

    /// Returns `None` when a clear raced with this message. The working
    /// frame then holds pre-clear samples and is dropped.
    fn publish(&mut self) -> Option<PublishReport> {
        let delta = DiagnosticsDelta {
            received_at: SystemTime::now(),
        };
        let report = self.store.publish(&self.working, self.seen_epoch, delta);
        if report.is_none() {
            self.sync_clear_epoch();
        }
        self.dirty = false;
        report
    }

    /// Sets the store's sticky root flag once per diagnostics epoch.
    fn report_root_seen(&mut self) {
        let epoch = self.store.diagnostics_epoch();
        if self.root_reported != Some(epoch) {
            self.store.mark_root_seen();
            self.root_reported = Some(epoch);
        }
    }

    fn sync_clear_epoch(&mut self) {
        let epoch = self.store.clear_epoch();
        if epoch != self.seen_epoch {
            self.seen_epoch = epoch;
            self.working.clear_data();
            self.dirty = false;
        }
    }
}

fn should_log_publish(total_packets: u64) -> bool {
    total_packets % DEBUG_LOG_INTERVAL == 1
}

fn log_publish(report: &PublishReport, sender: SocketAddr) {
    if config::debug_enabled() && should_log_publish(report.total_packets_received) {
        tracing::info!(
            packet = report.total_packets_received,
            %sender,
            bones = report.bone_count,
            curves = report.curve_count,
            has_root = report.has_received_root_translation,
            "VMC: received packet"
        );
    }
}

impl std::fmt::Debug for FrameAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameAssembler")
            .field("bones", &self.working.bones.len())
            .field("curves", &self.working.curves.len())
            .field("dirty", &self.dirty)
            .finish()
    }
}
