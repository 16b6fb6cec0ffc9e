//! Pending asynchronous events, polled once per command-loop iteration.

use std::time::{Duration, Instant};

use bitflags::bitflags;
use tracing::{debug, trace};

use crate::document_model::SessionFlags;
use crate::editor::Editor;
use crate::recover::SyncFlags;

bitflags! {
    /// Events raised since the last poll.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Events: u8 {
        /// The user asked to stop the running command.
        const INTERRUPT = 0x1;
        /// The terminal changed size.
        const RESIZE    = 0x2;
        /// The recovery sync timer fired.
        const ALARM     = 0x4;
    }
}

/// Pending events and the periodic sync timer.
#[derive(Debug, Clone)]
pub struct EventState {
    pending: Events,
    period: Duration,
    last_alarm: Instant,
}

impl EventState {
    /// A timer firing every `period_secs` seconds; 0 disables it.
    pub fn new(period_secs: u64) -> Self {
        Self {
            pending: Events::empty(),
            period: Duration::from_secs(period_secs),
            last_alarm: Instant::now(),
        }
    }

    pub fn raise(&mut self, events: Events) {
        trace!(?events, "event raised");
        self.pending |= events;
    }

    pub fn pending(&self) -> Events {
        self.pending
    }

    pub fn interrupted(&self) -> bool {
        self.pending.contains(Events::INTERRUPT)
    }

    /// Raise the alarm if a full period has passed since it last fired.
    pub fn check_timer(&mut self, now: Instant) {
        if self.period.is_zero() {
            return;
        }
        if now.duration_since(self.last_alarm) >= self.period {
            self.last_alarm = now;
            self.raise(Events::ALARM);
        }
    }

    pub fn take(&mut self) -> Events {
        std::mem::take(&mut self.pending)
    }
}

impl Editor {
    /// Raise an event for the next poll.
    pub fn raise(&mut self, events: Events) {
        self.events.raise(events);
    }

    /// Handle pending events. The alarm syncs every session that changed
    /// since its last sync; everything else is handed back to the caller.
    pub fn poll_events(&mut self) -> Events {
        self.events.check_timer(Instant::now());
        let mut events = self.events.take();
        if events.contains(Events::ALARM) {
            events.remove(Events::ALARM);
            self.sync_all();
        }
        events
    }

    /// Sync the backing file of every session flagged for it.
    pub(crate) fn sync_all(&mut self) {
        let due: Vec<usize> = self
            .files
            .iter()
            .filter(|(_, ep)| ep.flags.contains(SessionFlags::RCV_SYNC))
            .map(|(fid, _)| fid)
            .collect();
        for fid in due {
            debug!(fid, "periodic recovery sync");
            if let Err(e) = self.rcv_sync(fid, SyncFlags::empty()) {
                debug!(error = %e, "periodic sync failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document_model::ScreenMode;
    use crate::editor::test_support::editor_with;

    #[test]
    fn test_raise_and_take() {
        let mut state = EventState::new(0);
        state.raise(Events::INTERRUPT);
        state.raise(Events::RESIZE);
        assert!(state.interrupted());
        assert_eq!(state.take(), Events::INTERRUPT | Events::RESIZE);
        assert!(state.pending().is_empty());
    }

    #[test]
    fn test_timer() {
        let start = Instant::now();
        let mut state = EventState::new(10);
        state.check_timer(start);
        assert!(state.pending().is_empty());
        state.check_timer(start + Duration::from_secs(11));
        assert_eq!(state.pending(), Events::ALARM);

        let mut off = EventState::new(0);
        off.check_timer(start + Duration::from_secs(1000));
        assert!(off.pending().is_empty());
    }

    #[test]
    fn test_alarm_syncs_dirty_sessions() {
        let (mut ed, sid, _dir) = editor_with("a\n", ScreenMode::Ex);
        ed.append_line(sid, 1, b"b").unwrap();
        assert!(ed.session(sid).unwrap().flags().contains(SessionFlags::RCV_SYNC));

        ed.raise(Events::ALARM | Events::RESIZE);
        assert_eq!(ed.poll_events(), Events::RESIZE);
        assert!(!ed.session(sid).unwrap().flags().contains(SessionFlags::RCV_SYNC));
    }
}
