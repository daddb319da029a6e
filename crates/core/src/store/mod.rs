use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, MutexGuard, PoisonError,
    },
    time::SystemTime,
};

use crate::frame::Frame;

/// Lifetime statistics about published frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub total_packets_received: u64,
    pub last_packet_received_at: Option<SystemTime>,
    pub has_received_root_translation: bool,
    pub last_bone_count: usize,
    pub last_curve_count: usize,
}

/// Diagnostic facts the assembler contributes alongside a published frame.
#[derive(Debug, Clone, Copy)]
pub struct DiagnosticsDelta {
    pub received_at: SystemTime,
}

/// Values captured inside the publish critical section, returned so callers
/// can log after the lock is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    pub total_packets_received: u64,
    pub bone_count: usize,
    pub curve_count: usize,
    pub has_received_root_translation: bool,
}

#[derive(Debug, Default)]
struct Published {
    frame: Frame,
    diagnostics: Diagnostics,
}

/// Holds the most recently completed frame behind a single lock.
///
/// The lock only ever spans a clone or an assignment. A poisoned lock is
/// recovered because the slot holds plain values that are never left
/// half-written.
///
/// Both epochs are only bumped while the lock is held, so a check made under
/// the lock cannot race with [`FrameStore::clear`] or
/// [`FrameStore::reset_diagnostics`].
#[derive(Debug, Default)]
pub struct FrameStore {
    published: Mutex<Published>,
    clear_epoch: AtomicU64,
    diagnostics_epoch: AtomicU64,
}

impl FrameStore {
    /// Creates a store with an empty published frame and zeroed diagnostics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the published frame and records diagnostics in one critical
    /// section.
    ///
    /// `clear_epoch` is the epoch the caller assembled `frame` under. If a
    /// [`FrameStore::clear`] happened since, nothing is published and `None`
    /// is returned; the caller's frame holds cleared data.
    pub fn publish(
        &self,
        frame: &Frame,
        clear_epoch: u64,
        delta: DiagnosticsDelta,
    ) -> Option<PublishReport> {
        let mut published = self.lock();
        if self.clear_epoch.load(Ordering::Acquire) != clear_epoch {
            return None;
        }
        published.frame.clone_from(frame);

        let diagnostics = &mut published.diagnostics;
        diagnostics.total_packets_received += 1;
        diagnostics.last_packet_received_at = Some(delta.received_at);
        diagnostics.last_bone_count = frame.bones.len();
        diagnostics.last_curve_count = frame.curves.len();

        Some(PublishReport {
            total_packets_received: diagnostics.total_packets_received,
            bone_count: diagnostics.last_bone_count,
            curve_count: diagnostics.last_curve_count,
            has_received_root_translation: diagnostics.has_received_root_translation,
        })
    }

    /// Records that a root-position sample has arrived. The flag stays set
    /// until [`FrameStore::reset_diagnostics`].
    pub fn mark_root_seen(&self) {
        self.lock().diagnostics.has_received_root_translation = true;
    }

    /// Returns a copy of the latest published frame, or an empty frame if
    /// nothing has been published yet.
    pub fn copy_out(&self) -> Frame {
        self.lock().frame.clone()
    }

    /// Copies the latest published frame into `dst`, reusing its allocations.
    pub fn copy_into(&self, dst: &mut Frame) {
        dst.clone_from(&self.lock().frame);
    }

    /// Returns a consistent snapshot of all diagnostic counters.
    pub fn diagnostics(&self) -> Diagnostics {
        self.lock().diagnostics
    }

    /// Empties the published frame and asks the assembler to drop its working
    /// frame. Diagnostics are kept.
    pub fn clear(&self) {
        let mut published = self.lock();
        published.frame.clear_data();
        self.clear_epoch.fetch_add(1, Ordering::Release);
    }

    /// Zeroes every diagnostic counter, including the root-seen flag. The
    /// published frame is kept.
    pub fn reset_diagnostics(&self) {
        let mut published = self.lock();
        published.diagnostics = Diagnostics::default();
        self.diagnostics_epoch.fetch_add(1, Ordering::Release);
    }

    /// Counter bumped by every [`FrameStore::clear`].
    pub fn clear_epoch(&self) -> u64 {
        self.clear_epoch.load(Ordering::Acquire)
    }

    /// Counter bumped by every [`FrameStore::reset_diagnostics`].
    pub fn diagnostics_epoch(&self) -> u64 {
        self.diagnostics_epoch.load(Ordering::Acquire)
    }

    fn lock(&self) -> MutexGuard<'_, Published> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
