//! Frame-Bildung aus dem Aufnahme-Ring-Buffer
//!
//! Ein dedizierter Thread zieht Samples aus dem Ring-Buffer, schneidet sie
//! in Frames fester Groesse und reicht die PCM16-kodierten Frames an den
//! Versand weiter. Die Warteschlange ist begrenzt: kommt der Versand nicht
//! hinterher, werden Frames verworfen statt die Aufnahme zu stauen.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use ringbuf::traits::Consumer;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;
use tracing::{debug, warn};

use tandem_protocol::wire::FRAME_SAMPLES;

use crate::capture::CaptureConsumer;
use crate::error::AudioResult;
use crate::pcm::encode_pcm16;

/// Wartezeit wenn der Ring-Buffer gerade leer ist
const IDLE_SLEEP: Duration = Duration::from_millis(5);

// ---------------------------------------------------------------------------
// Statistik
// ---------------------------------------------------------------------------

/// Zaehler des Frame-Threads, lesbar von aussen
#[derive(Debug, Default)]
pub struct FramePumpStats {
    frames_sent: AtomicU64,
    frames_dropped: AtomicU64,
}

impl FramePumpStats {
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// FramePump
// ---------------------------------------------------------------------------

/// Thread der den Aufnahme-Ring-Buffer in PCM16-Frames umsetzt
///
/// Jeder Frame umfasst [`FRAME_SAMPLES`] Samples und wird unabhaengig
/// kodiert und versendet. Beim Stopp wird ein angefangener Rest verworfen.
pub struct FramePump {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    stats: Arc<FramePumpStats>,
}

impl FramePump {
    /// Startet den Frame-Thread auf dem gegebenen Consumer
    pub fn spawn(mut consumer: CaptureConsumer, tx: Sender<Vec<u8>>) -> AudioResult<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(FramePumpStats::default());

        let thread_stop = Arc::clone(&stop);
        let thread_stats = Arc::clone(&stats);
        let handle = std::thread::Builder::new()
            .name("frame-pump".into())
            .spawn(move || {
                let mut pending: Vec<f32> = Vec::with_capacity(FRAME_SAMPLES * 2);
                let mut scratch = vec![0.0f32; FRAME_SAMPLES];

                loop {
                    if thread_stop.load(Ordering::Relaxed) {
                        break;
                    }

                    let read = consumer.pop_slice(&mut scratch);
                    if read == 0 {
                        std::thread::sleep(IDLE_SLEEP);
                        continue;
                    }
                    pending.extend_from_slice(&scratch[..read]);

                    while pending.len() >= FRAME_SAMPLES {
                        let frame: Vec<f32> = pending.drain(..FRAME_SAMPLES).collect();
                        let encoded = encode_pcm16(&frame);
                        match tx.try_send(encoded) {
                            Ok(()) => {
                                thread_stats.frames_sent.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(TrySendError::Full(_)) => {
                                thread_stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
                                warn!("Sende-Warteschlange voll, Frame verworfen");
                            }
                            Err(TrySendError::Closed(_)) => {
                                debug!("Sende-Warteschlange geschlossen, Frame-Thread endet");
                                return;
                            }
                        }
                    }
                }
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
            stats,
        })
    }

    pub fn stats(&self) -> Arc<FramePumpStats> {
        Arc::clone(&self.stats)
    }

    /// Stoppt den Thread und wartet auf sein Ende
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FramePump {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use ringbuf::traits::{Producer, Split};
    use ringbuf::HeapRb;
    use std::time::Instant;

    #[test]
    fn frames_werden_unabhaengig_geschnitten_und_kodiert() {
        let rb = HeapRb::<f32>::new(FRAME_SAMPLES * 4);
        let (mut producer, consumer) = rb.split();

        // Zwei volle Frames plus ein Rest, der liegen bleiben muss
        let samples: Vec<f32> = (0..FRAME_SAMPLES * 2 + 100)
            .map(|i| ((i % 100) as f32 - 50.0) / 64.0)
            .collect();
        producer.push_slice(&samples);

        let (tx, mut rx) = tokio::sync::mpsc::channel::<Vec<u8>>(32);
        let mut pump = FramePump::spawn(consumer, tx).unwrap();

        let first = rx.blocking_recv().expect("erster Frame fehlt");
        let second = rx.blocking_recv().expect("zweiter Frame fehlt");
        assert_eq!(first.len(), FRAME_SAMPLES * 2);
        assert_eq!(second.len(), FRAME_SAMPLES * 2);
        assert_eq!(first, encode_pcm16(&samples[..FRAME_SAMPLES]));
        assert_eq!(
            second,
            encode_pcm16(&samples[FRAME_SAMPLES..FRAME_SAMPLES * 2])
        );

        // Der Rest von 100 Samples ergibt keinen dritten Frame
        assert!(rx.try_recv().is_err());
        pump.stop();
        assert_eq!(pump.stats().frames_sent(), 2);
    }

    #[test]
    fn volle_warteschlange_verwirft_statt_zu_blockieren() {
        let rb = HeapRb::<f32>::new(FRAME_SAMPLES * 4);
        let (mut producer, consumer) = rb.split();
        producer.push_slice(&vec![0.1f32; FRAME_SAMPLES * 3]);

        // Kapazitaet 1 und niemand liest: ab dem zweiten Frame wird verworfen
        let (tx, _rx) = tokio::sync::mpsc::channel::<Vec<u8>>(1);
        let mut pump = FramePump::spawn(consumer, tx).unwrap();

        let stats = pump.stats();
        let deadline = Instant::now() + Duration::from_secs(2);
        while stats.frames_dropped() < 2 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        pump.stop();

        assert_eq!(stats.frames_sent(), 1);
        assert_eq!(stats.frames_dropped(), 2);
    }

    #[test]
    fn stop_beendet_den_thread() {
        let rb = HeapRb::<f32>::new(FRAME_SAMPLES);
        let (_producer, consumer) = rb.split();
        let (tx, _rx) = tokio::sync::mpsc::channel::<Vec<u8>>(4);
        let mut pump = FramePump::spawn(consumer, tx).unwrap();
        pump.stop();
        // Zweiter Aufruf ist ein No-op
        pump.stop();
    }
}
