//! Lueckenlose Wiedergabe-Planung
//!
//! Der Scheduler reiht dekodierte Fragmente entlang eines Zeit-Cursors
//! auf der Sink-Uhr auf: jedes Fragment startet genau dort, wo das
//! vorige endet. Bei einer Unterbrechung wird alles Geplante gestoppt
//! und der Cursor auf die aktuelle Uhrzeit zurueckgesetzt.

use tracing::debug;

use crate::pcm::AudioFragment;
use crate::playback::{PlaybackHandle, PlaybackSink};

/// Plant Fragmente lueckenlos hintereinander auf einem Sink
pub struct PlaybackScheduler<S> {
    sink: S,
    /// Zeitpunkt auf der Sink-Uhr, an dem das naechste Fragment beginnt
    next_start: f64,
    active: Vec<Box<dyn PlaybackHandle>>,
}

impl<S: PlaybackSink> PlaybackScheduler<S> {
    pub fn new(sink: S) -> Self {
        let next_start = sink.now();
        Self {
            sink,
            next_start,
            active: Vec::new(),
        }
    }

    /// Haengt ein Fragment an die Wiedergabe-Kette an
    ///
    /// Startet sofort, falls die Kette bereits abgelaufen ist, sonst
    /// nahtlos am Ende des zuletzt geplanten Fragments. Gibt den
    /// Startzeitpunkt auf der Sink-Uhr zurueck.
    pub fn enqueue(&mut self, fragment: AudioFragment) -> f64 {
        self.reap();

        let start = self.next_start.max(self.sink.now());
        let duration = fragment.duration();
        let handle = self.sink.schedule(fragment, start);
        self.active.push(handle);
        self.next_start = start + duration;
        start
    }

    /// Stoppt alles Geplante und setzt den Cursor auf jetzt zurueck
    pub fn interrupt(&mut self) {
        for handle in &self.active {
            handle.stop();
        }
        let cleared = self.active.len();
        self.active.clear();
        self.next_start = self.sink.now();
        if cleared > 0 {
            debug!("Wiedergabe unterbrochen, {} Fragmente verworfen", cleared);
        }
    }

    /// Anzahl der noch nicht fertig gespielten Fragmente
    pub fn pending(&mut self) -> usize {
        self.reap();
        self.active.len()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn reap(&mut self) {
        self.active.retain(|h| !h.is_finished());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct FakeState {
        now: f64,
        scheduled: Vec<(f64, f64)>, // (start, dauer)
        handles: Vec<Rc<RefCell<FakeHandleState>>>,
    }

    #[derive(Default)]
    struct FakeHandleState {
        stopped: bool,
        finished: bool,
    }

    struct FakeHandle(Rc<RefCell<FakeHandleState>>);

    impl PlaybackHandle for FakeHandle {
        fn stop(&self) {
            let mut state = self.0.borrow_mut();
            if !state.finished {
                state.stopped = true;
                state.finished = true;
            }
        }

        fn is_finished(&self) -> bool {
            self.0.borrow().finished
        }
    }

    #[derive(Clone, Default)]
    struct FakeSink(Rc<RefCell<FakeState>>);

    impl FakeSink {
        fn advance(&self, seconds: f64) {
            self.0.borrow_mut().now += seconds;
        }

        fn starts(&self) -> Vec<f64> {
            self.0.borrow().scheduled.iter().map(|(s, _)| *s).collect()
        }

        fn stopped_count(&self) -> usize {
            self.0
                .borrow()
                .handles
                .iter()
                .filter(|h| h.borrow().stopped)
                .count()
        }
    }

    impl PlaybackSink for FakeSink {
        fn now(&self) -> f64 {
            self.0.borrow().now
        }

        fn schedule(&self, fragment: AudioFragment, start_at: f64) -> Box<dyn PlaybackHandle> {
            let handle_state = Rc::new(RefCell::new(FakeHandleState::default()));
            let mut state = self.0.borrow_mut();
            state.scheduled.push((start_at, fragment.duration()));
            state.handles.push(Rc::clone(&handle_state));
            Box::new(FakeHandle(handle_state))
        }
    }

    fn fragment_mit_dauer(seconds: f64) -> AudioFragment {
        AudioFragment {
            samples: vec![0.0; (seconds * 24_000.0).round() as usize],
            sample_rate: 24_000,
            channels: 1,
        }
    }

    #[test]
    fn fragmente_starten_nahtlos_hintereinander() {
        let sink = FakeSink::default();
        let mut scheduler = PlaybackScheduler::new(sink.clone());

        let s1 = scheduler.enqueue(fragment_mit_dauer(1.0));
        let s2 = scheduler.enqueue(fragment_mit_dauer(0.5));

        assert_eq!(s1, 0.0);
        assert_eq!(s2, 1.0);
        assert_eq!(sink.starts(), vec![0.0, 1.0]);
    }

    #[test]
    fn abgelaufene_kette_startet_sofort() {
        let sink = FakeSink::default();
        let mut scheduler = PlaybackScheduler::new(sink.clone());

        scheduler.enqueue(fragment_mit_dauer(0.5));
        // Uhr laeuft ueber das Ende der Kette hinaus
        sink.advance(2.0);
        let start = scheduler.enqueue(fragment_mit_dauer(0.5));
        assert_eq!(start, 2.0);
    }

    #[test]
    fn unterbrechung_stoppt_alles_und_setzt_cursor_zurueck() {
        let sink = FakeSink::default();
        let mut scheduler = PlaybackScheduler::new(sink.clone());

        scheduler.enqueue(fragment_mit_dauer(1.0));
        scheduler.enqueue(fragment_mit_dauer(0.5));

        // Nach 0.2 Sekunden unterbricht der Sprecher
        sink.advance(0.2);
        scheduler.interrupt();
        assert_eq!(sink.stopped_count(), 2);
        assert_eq!(scheduler.pending(), 0);

        // Das naechste Fragment startet bei 0.2, nicht am alten Ketten-Ende 1.5
        let start = scheduler.enqueue(fragment_mit_dauer(0.5));
        assert!((start - 0.2).abs() < 1e-9);
    }

    #[test]
    fn doppelte_unterbrechung_ist_harmlos() {
        let sink = FakeSink::default();
        let mut scheduler = PlaybackScheduler::new(sink.clone());
        scheduler.enqueue(fragment_mit_dauer(0.5));
        scheduler.interrupt();
        scheduler.interrupt();
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn fertige_fragmente_werden_ausgebucht() {
        let sink = FakeSink::default();
        let mut scheduler = PlaybackScheduler::new(sink.clone());
        scheduler.enqueue(fragment_mit_dauer(0.5));
        assert_eq!(scheduler.pending(), 1);

        sink.0.borrow().handles[0].borrow_mut().finished = true;
        assert_eq!(scheduler.pending(), 0);
    }
}
