//! Microphone capture through cpal.
//!
//! cpal delivers audio on its own callback thread in whatever block size the
//! backend prefers. The callback converts to i16 and pushes into a ring
//! buffer; `read_frame` blocks on the consumer side until a full frame is
//! available, which turns the push model into the blocking read the capture
//! loop expects.

use crossbeam_channel::{Receiver, TryRecvError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{info, warn};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use splmeter_core::constants::CHANNELS;
use splmeter_core::{AudioSource, CaptureConfig, MeterError, SampleFrame};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Ring buffer holds this many frames before the callback starts dropping.
const BUFFERED_FRAMES: usize = 4;

/// Poll interval while waiting for a frame to fill up.
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Pushes converted samples into the ring buffer and returns how many did
/// not fit.
fn push_samples(producer: &mut HeapProd<i16>, data: &[f32]) -> usize {
    data.iter()
        .filter(|&&sample| producer.try_push(to_i16(sample)).is_err())
        .count()
}

/// Consumer side of the capture ring buffer.
struct FrameReader {
    consumer: HeapCons<i16>,
    dropped: Arc<AtomicUsize>,
    errors: Receiver<cpal::StreamError>,
    frame_size: usize,
    timeout: Duration,
    open: bool,
}

impl FrameReader {
    fn new(
        consumer: HeapCons<i16>,
        dropped: Arc<AtomicUsize>,
        errors: Receiver<cpal::StreamError>,
        frame_size: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            consumer,
            dropped,
            errors,
            frame_size,
            timeout,
            open: true,
        }
    }

    /// Waits up to `timeout` for `frame_size` samples.
    ///
    /// Stream errors and overflow are checked first, so a glitch is reported
    /// before the frame it damaged.
    fn read_frame(&mut self) -> Result<SampleFrame, MeterError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if !self.open {
                return Err(MeterError::DeviceLost("capture session closed".into()));
            }

            match self.errors.try_recv() {
                Ok(err) => return Err(classify(err)),
                Err(TryRecvError::Disconnected) => {
                    return Err(MeterError::DeviceLost("audio stream went away".into()))
                }
                Err(TryRecvError::Empty) => {}
            }

            let lost = self.dropped.swap(0, Ordering::Relaxed);
            if lost > 0 {
                return Err(MeterError::TransientRead(format!(
                    "input overflowed, {} samples dropped",
                    lost
                )));
            }

            if self.consumer.occupied_len() >= self.frame_size {
                let mut frame = vec![0i16; self.frame_size];
                self.consumer.pop_slice(&mut frame);
                return Ok(frame);
            }

            if Instant::now() >= deadline {
                return Err(MeterError::TransientRead(format!(
                    "no full frame within {} ms",
                    self.timeout.as_millis()
                )));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Returns whether the reader was still open.
    fn close(&mut self) -> bool {
        std::mem::replace(&mut self.open, false)
    }
}

pub struct CpalSource {
    config: CaptureConfig,
    device_name: String,
    stream: Option<cpal::Stream>,
    reader: FrameReader,
}

impl CpalSource {
    /// Opens `device_name` ("default" for the system default input) and
    /// starts capturing.
    pub fn open(device_name: &str, config: CaptureConfig) -> Result<Self, MeterError> {
        config.validate()?;

        let host = cpal::default_host();
        info!("Audio host: {}", host.id().name());

        let device = if device_name == "default" {
            host.default_input_device()
                .ok_or_else(|| MeterError::DeviceUnavailable("no default input device".into()))?
        } else {
            host.input_devices()
                .map_err(|e| MeterError::DeviceUnavailable(e.to_string()))?
                .find(|d| d.name().ok().as_deref() == Some(device_name))
                .ok_or_else(|| {
                    MeterError::DeviceUnavailable(format!("input device '{}' not found", device_name))
                })?
        };
        let name = device.name().unwrap_or_default();
        info!("Using input device: {}", name);

        let stream_config = cpal::StreamConfig {
            channels: CHANNELS,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let rb = HeapRb::<i16>::new(config.frame_size * BUFFERED_FRAMES);
        let (mut producer, consumer) = rb.split();

        let dropped = Arc::new(AtomicUsize::new(0));
        let dropped_writer = dropped.clone();
        let (err_tx, err_rx) = crossbeam_channel::unbounded();

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let lost = push_samples(&mut producer, data);
                    if lost > 0 {
                        dropped_writer.fetch_add(lost, Ordering::Relaxed);
                    }
                },
                move |err| {
                    let _ = err_tx.send(err);
                },
                None,
            )
            .map_err(|e| MeterError::DeviceUnavailable(format!("{}: {}", name, e)))?;

        stream
            .play()
            .map_err(|e| MeterError::DeviceUnavailable(format!("{}: {}", name, e)))?;

        // A frame plus generous slack for slow backends
        let timeout = config.frame_duration() * 2 + Duration::from_secs(1);

        Ok(Self {
            config,
            device_name: name,
            stream: Some(stream),
            reader: FrameReader::new(consumer, dropped, err_rx, config.frame_size, timeout),
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

impl AudioSource for CpalSource {
    fn config(&self) -> CaptureConfig {
        self.config
    }

    fn read_frame(&mut self) -> Result<SampleFrame, MeterError> {
        self.reader.read_frame()
    }

    fn close(&mut self) {
        if !self.reader.close() {
            return;
        }
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                warn!("Failed to pause input stream: {}", e);
            }
        }
        info!("Released input device: {}", self.device_name);
    }
}

impl Drop for CpalSource {
    fn drop(&mut self) {
        self.close();
    }
}

fn classify(err: cpal::StreamError) -> MeterError {
    match err {
        cpal::StreamError::DeviceNotAvailable => {
            MeterError::DeviceLost("input device is no longer available".into())
        }
        other => MeterError::TransientRead(other.to_string()),
    }
}

/// Converts a cpal float sample to signed 16-bit, clamping out-of-range input.
fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

/// Prints the input devices of the default host.
pub fn list_devices() -> anyhow::Result<()> {
    let host = cpal::default_host();
    println!("Audio Host: {}", host.id().name());
    let default = host
        .default_input_device()
        .and_then(|d| d.name().ok())
        .unwrap_or_default();
    println!("\nInput Devices:");
    for device in host.input_devices()? {
        let name = device.name().unwrap_or("Unknown".to_string());
        let marker = if name == default { " (default)" } else { "" };
        println!("  - {}{}", name, marker);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_i16_full_scale() {
        assert_eq!(to_i16(0.0), 0);
        assert_eq!(to_i16(1.0), i16::MAX);
        assert_eq!(to_i16(-1.0), -i16::MAX);
        assert_eq!(to_i16(0.5), 16384);
    }

    #[test]
    fn test_to_i16_clamps() {
        assert_eq!(to_i16(3.0), i16::MAX);
        assert_eq!(to_i16(-3.0), -i16::MAX);
    }

    struct Harness {
        producer: HeapProd<i16>,
        dropped: Arc<AtomicUsize>,
        err_tx: crossbeam_channel::Sender<cpal::StreamError>,
        reader: FrameReader,
    }

    fn harness(frame_size: usize, capacity: usize) -> Harness {
        let (producer, consumer) = HeapRb::<i16>::new(capacity).split();
        let dropped = Arc::new(AtomicUsize::new(0));
        let (err_tx, err_rx) = crossbeam_channel::unbounded();
        let reader = FrameReader::new(
            consumer,
            dropped.clone(),
            err_rx,
            frame_size,
            Duration::from_millis(20),
        );
        Harness {
            producer,
            dropped,
            err_tx,
            reader,
        }
    }

    #[test]
    fn test_partial_frame_times_out_then_completes() {
        let mut h = harness(4, 16);
        h.producer.push_slice(&[1, 2, 3]);

        match h.reader.read_frame() {
            Err(MeterError::TransientRead(msg)) => assert!(msg.contains("no full frame")),
            other => panic!("expected timeout, got {:?}", other),
        }

        h.producer.push_slice(&[4, 5, 6]);
        assert_eq!(h.reader.read_frame().unwrap(), vec![1, 2, 3, 4]);

        // Leftover samples start the next frame
        h.producer.push_slice(&[7, 8]);
        assert_eq!(h.reader.read_frame().unwrap(), vec![5, 6, 7, 8]);
    }

    #[test]
    fn test_frames_have_exact_length() {
        let mut h = harness(3, 16);
        h.producer.push_slice(&[10, 20, 30, 40, 50, 60, 70]);
        assert_eq!(h.reader.read_frame().unwrap().len(), 3);
        assert_eq!(h.reader.read_frame().unwrap(), vec![40, 50, 60]);
    }

    #[test]
    fn test_overflow_reported_once_then_reads_resume() {
        let mut h = harness(2, 4);
        let lost = push_samples(&mut h.producer, &[0.0, 0.5, -0.5, 1.0, 0.25, 0.25]);
        assert_eq!(lost, 2);
        h.dropped.fetch_add(lost, Ordering::Relaxed);

        match h.reader.read_frame() {
            Err(MeterError::TransientRead(msg)) => assert!(msg.contains("2 samples dropped")),
            other => panic!("expected overflow, got {:?}", other),
        }
        assert_eq!(h.reader.read_frame().unwrap(), vec![0, 16384]);
        assert_eq!(h.reader.read_frame().unwrap(), vec![-16384, i16::MAX]);
    }

    #[test]
    fn test_stream_errors_are_classified() {
        let mut h = harness(2, 8);
        h.producer.push_slice(&[1, 2]);
        h.err_tx
            .send(cpal::StreamError::BackendSpecific {
                err: cpal::BackendSpecificError {
                    description: "xrun".into(),
                },
            })
            .unwrap();
        assert!(matches!(
            h.reader.read_frame(),
            Err(MeterError::TransientRead(_))
        ));
        assert_eq!(h.reader.read_frame().unwrap(), vec![1, 2]);

        h.err_tx.send(cpal::StreamError::DeviceNotAvailable).unwrap();
        assert!(matches!(
            h.reader.read_frame(),
            Err(MeterError::DeviceLost(_))
        ));
    }

    #[test]
    fn test_disconnected_stream_is_fatal() {
        let Harness {
            mut producer,
            err_tx,
            mut reader,
            ..
        } = harness(2, 8);
        producer.push_slice(&[1, 2]);
        drop(err_tx);
        assert!(matches!(reader.read_frame(), Err(MeterError::DeviceLost(_))));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut h = harness(2, 8);
        h.producer.push_slice(&[1, 2]);

        assert!(h.reader.close());
        assert!(!h.reader.close());
        assert!(matches!(
            h.reader.read_frame(),
            Err(MeterError::DeviceLost(_))
        ));
    }

    #[test]
    fn test_device_loss_is_fatal() {
        assert!(matches!(
            classify(cpal::StreamError::DeviceNotAvailable),
            MeterError::DeviceLost(_)
        ));
    }
}
