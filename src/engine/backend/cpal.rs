//! CPAL-based audio backend for desktop platforms (Linux, macOS, Windows)
//!
//! `cpal::Stream` is not `Send`, so each session's stream lives on a dedicated
//! thread. The thread opens the default output device, reports the open/play
//! result back over a channel so `start()` fails synchronously, then parks
//! until `stop()` signals it to drop the stream.

use std::sync::mpsc;
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::audio::FrameSource;
use crate::error::AudioError;

use super::AudioBackend;

/// Handle to the thread owning the live stream
struct StreamWorker {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Default-output-device backend
pub struct CpalBackend {
    worker: Mutex<Option<StreamWorker>>,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self {
            worker: Mutex::new(None),
        }
    }

    fn default_device() -> Result<cpal::Device, AudioError> {
        cpal::default_host()
            .default_output_device()
            .ok_or_else(|| AudioError::HardwareError {
                details: "No default output device found".to_string(),
            })
    }

    fn default_config(device: &cpal::Device) -> Result<cpal::SupportedStreamConfig, AudioError> {
        device
            .default_output_config()
            .map_err(|e| AudioError::StreamOpenFailed {
                reason: format!("Failed to get default output config: {:?}", e),
            })
    }

    fn open_stream(mut source: Box<dyn FrameSource>) -> Result<cpal::Stream, AudioError> {
        let device = Self::default_device()?;
        let config = Self::default_config(&device)?;

        let stream_config: cpal::StreamConfig = config.clone().into();
        let channels = stream_config.channels as usize;

        let err_fn = |err| tracing::error!("[CpalBackend] Output stream error: {}", err);

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => device.build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    source.render(data, channels);
                },
                err_fn,
                None,
            ),
            other => {
                return Err(AudioError::UnsupportedSampleFormat {
                    format: format!("{:?}", other),
                })
            }
        }
        .map_err(|e| AudioError::StreamOpenFailed {
            reason: format!("{:?}", e),
        })?;

        stream.play().map_err(|e| AudioError::HardwareError {
            details: format!("Output start failed: {}", e),
        })?;

        tracing::info!(
            "[CpalBackend] Output stream running: {} Hz, {} channels",
            stream_config.sample_rate.0,
            channels
        );
        Ok(stream)
    }

    fn lock_worker(&self) -> Result<std::sync::MutexGuard<'_, Option<StreamWorker>>, AudioError> {
        self.worker.lock().map_err(|_| AudioError::LockPoisoned {
            component: "cpal_worker".to_string(),
        })
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for CpalBackend {
    fn sample_rate(&self) -> Result<u32, AudioError> {
        let device = Self::default_device()?;
        let config = Self::default_config(&device)?;
        Ok(config.sample_rate().0)
    }

    fn start(&self, source: Box<dyn FrameSource>) -> Result<(), AudioError> {
        let mut worker = self.lock_worker()?;
        if let Some(previous) = worker.take() {
            Self::shutdown(previous);
        }

        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), AudioError>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("beep-cpal-stream".to_string())
            .spawn(move || match Self::open_stream(source) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    // Parks until stop() sends or drops the sender
                    let _ = shutdown_rx.recv();
                    drop(stream);
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                }
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                *worker = Some(StreamWorker {
                    shutdown_tx,
                    handle,
                });
                Ok(())
            }
            Ok(Err(err)) => {
                let _ = handle.join();
                Err(err)
            }
            Err(_) => {
                let _ = handle.join();
                Err(AudioError::StreamFailure {
                    reason: "Stream thread exited before reporting".to_string(),
                })
            }
        }
    }

    fn stop(&self) -> Result<(), AudioError> {
        if let Some(worker) = self.lock_worker()?.take() {
            Self::shutdown(worker);
            tracing::info!("[CpalBackend] Output stream stopped");
        }
        Ok(())
    }
}

impl CpalBackend {
    fn shutdown(worker: StreamWorker) {
        let _ = worker.shutdown_tx.send(());
        if worker.handle.join().is_err() {
            tracing::warn!("[CpalBackend] Stream thread panicked during shutdown");
        }
    }
}
